//! Process roles.

use std::fmt;
use std::str::FromStr;

/// What this process does on the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Coordinator only (headless).
    Server,
    /// Participant only.
    Client,
    /// Coordinator and participant in one process.
    Host,
}

impl Role {
    /// Runs the coordinator loop and owns the id allocator.
    #[must_use]
    pub const fn is_coordinator(self) -> bool {
        matches!(self, Self::Server | Self::Host)
    }

    /// Runs the participant loop.
    #[must_use]
    pub const fn is_participant(self) -> bool {
        matches!(self, Self::Client | Self::Host)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Server => "server",
            Self::Client => "client",
            Self::Host => "host",
        })
    }
}

/// Unrecognized role name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role `{0}` (expected server, client or host)")]
pub struct ParseRoleError(String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "server" => Ok(Self::Server),
            "client" => Ok(Self::Client),
            "host" => Ok(Self::Host),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_capabilities() {
        assert!(Role::Server.is_coordinator() && !Role::Server.is_participant());
        assert!(!Role::Client.is_coordinator() && Role::Client.is_participant());
        assert!(Role::Host.is_coordinator() && Role::Host.is_participant());
    }

    #[test]
    fn test_parse() {
        assert_eq!("Host".parse::<Role>(), Ok(Role::Host));
        assert_eq!("server".parse::<Role>().unwrap().to_string(), "server");
        assert!("peer".parse::<Role>().is_err());
    }
}
