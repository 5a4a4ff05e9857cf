use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub auto_switch: bool,
    pub active_profile: Option<String>,
    pub profiles: Vec<Profile>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auto_switch: true,
            active_profile: None,
            profiles: Vec::new(),
        }
    }
}

/// A named launch configuration for the tunnel client. Profiles are
/// immutable value objects; the supervisor only reads them.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub enabled: bool,
    /// Explicit client binary; resolved through the cache and $PATH
    /// when absent.
    pub binary: Option<PathBuf>,
    /// The client's own config file, passed through `-c`.
    pub config: Option<PathBuf>,
    /// Remote reference synced into the cache by an external
    /// collaborator; only the cache location matters here.
    pub remote_config: Option<String>,
    pub server_addr: Option<String>,
    pub server_port: Option<u16>,
    /// Local ports that must already be listening before launch.
    pub local_check_ports: Vec<u16>,
    pub start_timeout: Option<Duration>,
    /// One knob for preflight dials and the status probe; each site
    /// applies its own default when unset.
    pub health_timeout: Option<Duration>,
    pub require_status: bool,
    pub status_timeout: Option<Duration>,
    pub status_interval: Option<Duration>,
    pub extra_args: Vec<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            binary: None,
            config: None,
            remote_config: None,
            server_addr: None,
            server_port: None,
            local_check_ports: Vec::new(),
            start_timeout: None,
            health_timeout: None,
            require_status: false,
            status_timeout: None,
            status_interval: None,
            extra_args: Vec::new(),
        }
    }
}

impl Profile {
    /// The declared remote endpoint, when both halves are present.
    pub fn server_endpoint(&self) -> Option<(&str, u16)> {
        match (self.server_addr.as_deref(), self.server_port) {
            (Some(addr), Some(port)) if !addr.is_empty() && port > 0 => Some((addr, port)),
            _ => None,
        }
    }
}
