use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub auto_switch: Option<bool>,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default, rename = "profile")]
    pub profiles: Vec<RawProfile>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawProfile {
    pub name: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default)]
    pub config: Option<String>,
    #[serde(default)]
    pub remote_config: Option<String>,
    #[serde(default)]
    pub server_addr: Option<String>,
    #[serde(default)]
    pub server_port: Option<u16>,
    #[serde(default)]
    pub local_check_ports: Vec<u16>,
    #[serde(default)]
    pub start_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub health_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub require_status: Option<bool>,
    #[serde(default)]
    pub status_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub status_interval_seconds: Option<u64>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}
