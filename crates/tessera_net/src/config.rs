//! # Network Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file (or no file) yields a working LAN setup on ports 9050/9051.
//!
//! ```toml
//! gameplay_port = 9050
//! discovery_port = 9051
//! server_ip = "192.168.1.20"   # omit to use discovery
//! tick_interval_ms = 33
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use tessera_shared::constants::{
    DEFAULT_DISCOVERY_PORT, DEFAULT_GAMEPLAY_PORT, DISCOVERY_POLL_MS, DISCOVERY_TIMEOUT_MS,
    MAX_DATAGRAM_SIZE, TICK_INTERVAL_MS,
};

use crate::error::ConfigError;
use crate::protocol::{BATCH_HEADER_SIZE, RECORD_SIZE};

/// Default wait for the scene-ready signal.
pub const DEFAULT_SCENE_READY_TIMEOUT_MS: u64 = 10_000;

/// Default smoothing rate for passive entities (per second).
pub const DEFAULT_SMOOTHING_RATE: f32 = 10.0;

/// Runtime parameters for a replication session.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetConfig {
    /// Local interface for the coordinator and discovery sockets.
    pub bind_ip: IpAddr,
    /// Gameplay (batches and commands) port.
    pub gameplay_port: u16,
    /// Discovery rendezvous port.
    pub discovery_port: u16,
    /// Coordinator address. `None` means "find it by broadcast".
    pub server_ip: Option<IpAddr>,
    /// Where discovery probes are sent.
    pub discovery_target: IpAddr,
    /// Pause after each loop iteration.
    pub tick_interval_ms: u64,
    /// Receive poll timeout for loop sockets.
    pub poll_timeout_ms: u64,
    /// Overall discovery deadline.
    pub discovery_timeout_ms: u64,
    /// Largest datagram the batch encoder may produce.
    pub max_datagram: usize,
    /// How long `start` waits for the scene.
    pub scene_ready_timeout_ms: u64,
    /// Convergence rate for passive entity smoothing.
    pub smoothing_rate: f32,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            gameplay_port: DEFAULT_GAMEPLAY_PORT,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            server_ip: None,
            discovery_target: IpAddr::V4(Ipv4Addr::BROADCAST),
            tick_interval_ms: TICK_INTERVAL_MS,
            poll_timeout_ms: DISCOVERY_POLL_MS,
            discovery_timeout_ms: DISCOVERY_TIMEOUT_MS,
            max_datagram: MAX_DATAGRAM_SIZE,
            scene_ready_timeout_ms: DEFAULT_SCENE_READY_TIMEOUT_MS,
            smoothing_rate: DEFAULT_SMOOTHING_RATE,
        }
    }
}

impl NetConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise
    /// the same errors as [`NetConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Port 0 asks the OS for an ephemeral port, so two zeros never clash.
        if self.gameplay_port != 0 && self.gameplay_port == self.discovery_port {
            return Err(invalid(
                "discovery_port",
                format!("must differ from gameplay_port ({})", self.gameplay_port),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(invalid("tick_interval_ms", "must be at least 1".into()));
        }
        if self.poll_timeout_ms == 0 {
            return Err(invalid("poll_timeout_ms", "must be at least 1".into()));
        }
        if self.max_datagram > MAX_DATAGRAM_SIZE {
            return Err(invalid(
                "max_datagram",
                format!("exceeds the UDP payload limit of {MAX_DATAGRAM_SIZE}"),
            ));
        }
        if self.max_datagram < BATCH_HEADER_SIZE + RECORD_SIZE {
            return Err(invalid(
                "max_datagram",
                format!("must fit at least one record ({} bytes)", BATCH_HEADER_SIZE + RECORD_SIZE),
            ));
        }
        if !self.smoothing_rate.is_finite() || self.smoothing_rate <= 0.0 {
            return Err(invalid("smoothing_rate", "must be a positive number".into()));
        }
        Ok(())
    }

    /// Address the coordinator's gameplay socket binds to.
    #[must_use]
    pub const fn gameplay_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.gameplay_port)
    }

    /// Address the discovery responder binds to.
    #[must_use]
    pub const fn discovery_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.discovery_port)
    }

    /// Destination for discovery probes.
    #[must_use]
    pub const fn discovery_target_addr(&self) -> SocketAddr {
        SocketAddr::new(self.discovery_target, self.discovery_port)
    }

    /// Pause between loop iterations.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Socket receive timeout.
    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Discovery deadline.
    #[must_use]
    pub const fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    /// Scene-ready deadline.
    #[must_use]
    pub const fn scene_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.scene_ready_timeout_ms)
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
