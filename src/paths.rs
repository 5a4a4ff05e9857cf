use std::path::PathBuf;

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tunvisor")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("tunvisor.toml")
}

pub fn cache_dir() -> PathBuf {
    config_dir().join("cache")
}

/// Cached client binaries dropped here by an external installer.
pub fn bin_dir() -> PathBuf {
    cache_dir().join("bin")
}

/// Client config files synced from remote references land here, one per
/// profile.
pub fn profiles_cache_dir() -> PathBuf {
    cache_dir().join("profiles")
}

pub fn sanitize_profile_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '.') {
            sanitized.push(ch);
        } else {
            sanitized.push('_');
        }
    }
    sanitized
}

pub fn cached_profile_config(name: &str) -> PathBuf {
    profiles_cache_dir().join(format!("{}.toml", sanitize_profile_name(name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_profile_names_for_filenames() {
        assert_eq!(sanitize_profile_name("Home Office"), "home_office");
        assert_eq!(sanitize_profile_name("eu-1.backup"), "eu-1.backup");
        assert_eq!(sanitize_profile_name("a/b"), "a_b");
    }

    #[test]
    fn cached_config_path_uses_sanitized_name() {
        let path = cached_profile_config("Home Office");
        assert!(path.ends_with("profiles/home_office.toml"));
    }
}
