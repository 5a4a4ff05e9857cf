use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use super::{
    error::{ConfigError, ConfigResult},
    model::{AppConfig, Profile},
    raw::{RawConfig, RawProfile},
};

pub fn load_from_path<P: AsRef<Path>>(path: P) -> ConfigResult<AppConfig> {
    let path_ref = path.as_ref();
    let raw_contents = fs::read_to_string(path_ref).map_err(|source| ConfigError::ReadFailure {
        path: path_ref.to_path_buf(),
        source,
    })?;
    load_from_str(path_ref, &raw_contents)
}

pub fn load_from_str(config_path: &Path, contents: &str) -> ConfigResult<AppConfig> {
    let raw: RawConfig = toml::from_str(contents)?;
    convert_raw_config(config_path, raw)
}

fn convert_raw_config(config_path: &Path, raw: RawConfig) -> ConfigResult<AppConfig> {
    let mut seen = HashSet::new();
    let mut profiles = Vec::with_capacity(raw.profiles.len());
    for (index, raw_profile) in raw.profiles.into_iter().enumerate() {
        let profile = convert_profile(config_path, index, raw_profile)?;
        if !seen.insert(profile.name.clone()) {
            return Err(ConfigError::DuplicateProfile { name: profile.name });
        }
        profiles.push(profile);
    }

    Ok(AppConfig {
        auto_switch: raw.auto_switch.unwrap_or(true),
        active_profile: raw.active_profile.filter(|name| !name.is_empty()),
        profiles,
    })
}

fn convert_profile(config_path: &Path, index: usize, raw: RawProfile) -> ConfigResult<Profile> {
    let name = raw
        .name
        .filter(|name| !name.trim().is_empty())
        .ok_or(ConfigError::MissingProfileName { index })?;

    Ok(Profile {
        name,
        enabled: raw.enabled.unwrap_or(true),
        binary: raw
            .binary
            .map(|value| resolve_relative_path(config_path, value)),
        config: raw
            .config
            .map(|value| resolve_relative_path(config_path, value)),
        remote_config: raw.remote_config.filter(|value| !value.is_empty()),
        server_addr: raw.server_addr.filter(|value| !value.is_empty()),
        server_port: raw.server_port,
        local_check_ports: raw.local_check_ports,
        start_timeout: seconds(raw.start_timeout_seconds),
        health_timeout: seconds(raw.health_timeout_seconds),
        require_status: raw.require_status.unwrap_or(false),
        status_timeout: seconds(raw.status_timeout_seconds),
        status_interval: seconds(raw.status_interval_seconds),
        extra_args: raw.extra_args,
    })
}

// Zero means unset, as the per-site defaults are applied later.
fn seconds(value: Option<u64>) -> Option<Duration> {
    value.filter(|v| *v > 0).map(Duration::from_secs)
}

fn resolve_relative_path(config_path: &Path, value: String) -> PathBuf {
    let candidate = PathBuf::from(value);
    if candidate.is_absolute() {
        candidate
    } else {
        config_path
            .parent()
            .map(|parent| parent.join(&candidate))
            .unwrap_or(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(contents: &str) -> ConfigResult<AppConfig> {
        load_from_str(Path::new("/etc/tunvisor/tunvisor.toml"), contents)
    }

    #[test]
    fn parses_full_profile() -> ConfigResult<()> {
        let config = load(
            r#"
            auto_switch = false
            active_profile = "home"

            [[profile]]
            name = "home"
            config = "frpc-home.toml"
            binary = "/opt/frp/frpc"
            server_addr = "203.0.113.7"
            server_port = 7000
            local_check_ports = [8000, 8001]
            start_timeout_seconds = 12
            health_timeout_seconds = 4
            require_status = true
            status_timeout_seconds = 20
            status_interval_seconds = 10
            extra_args = ["--strict"]
            "#,
        )?;

        assert!(!config.auto_switch);
        assert_eq!(config.active_profile.as_deref(), Some("home"));
        assert_eq!(config.profiles.len(), 1);

        let profile = &config.profiles[0];
        assert_eq!(profile.name, "home");
        assert!(profile.enabled);
        assert_eq!(
            profile.config.as_deref(),
            Some(Path::new("/etc/tunvisor/frpc-home.toml"))
        );
        assert_eq!(profile.binary.as_deref(), Some(Path::new("/opt/frp/frpc")));
        assert_eq!(profile.server_endpoint(), Some(("203.0.113.7", 7000)));
        assert_eq!(profile.local_check_ports, vec![8000, 8001]);
        assert_eq!(profile.start_timeout, Some(Duration::from_secs(12)));
        assert_eq!(profile.health_timeout, Some(Duration::from_secs(4)));
        assert!(profile.require_status);
        assert_eq!(profile.status_timeout, Some(Duration::from_secs(20)));
        assert_eq!(profile.status_interval, Some(Duration::from_secs(10)));
        assert_eq!(profile.extra_args, vec!["--strict".to_string()]);
        Ok(())
    }

    #[test]
    fn applies_defaults() -> ConfigResult<()> {
        let config = load(
            r#"
            [[profile]]
            name = "only"
            config = "frpc.toml"
            "#,
        )?;

        assert!(config.auto_switch);
        assert!(config.active_profile.is_none());

        let profile = &config.profiles[0];
        assert!(profile.enabled);
        assert!(!profile.require_status);
        assert!(profile.start_timeout.is_none());
        assert!(profile.server_endpoint().is_none());
        assert!(profile.extra_args.is_empty());
        Ok(())
    }

    #[test]
    fn zero_timeouts_are_unset() -> ConfigResult<()> {
        let config = load(
            r#"
            [[profile]]
            name = "zero"
            start_timeout_seconds = 0
            status_interval_seconds = 0
            "#,
        )?;

        let profile = &config.profiles[0];
        assert!(profile.start_timeout.is_none());
        assert!(profile.status_interval.is_none());
        Ok(())
    }

    #[test]
    fn rejects_missing_profile_name() {
        let err = load(
            r#"
            [[profile]]
            config = "frpc.toml"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingProfileName { index: 0 }));
    }

    #[test]
    fn rejects_duplicate_profile_names() {
        let err = load(
            r#"
            [[profile]]
            name = "twin"

            [[profile]]
            name = "twin"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateProfile { name } if name == "twin"));
    }
}
