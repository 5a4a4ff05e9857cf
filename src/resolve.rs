//! Locates the client binary and the per-profile client config file.

use std::{
    env,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{config::Profile, paths};

/// Binary name looked up in the cache and on $PATH when a profile does
/// not pin an explicit path.
pub const CLIENT_BINARY_NAME: &str = "frpc";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("client binary '{}' does not exist", path.display())]
    BinaryMissing { path: PathBuf },
    #[error("no client binary configured and no 'frpc' found in the cache or on PATH")]
    BinaryNotFound,
    #[error("profile '{profile}' has no config path")]
    ConfigUnset { profile: String },
    #[error("config file '{}' does not exist", path.display())]
    ConfigMissing { path: PathBuf },
}

/// Explicit path, else the cache `bin/` drop location, else $PATH.
pub fn client_binary(explicit: Option<&Path>) -> Result<PathBuf, ResolveError> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(ResolveError::BinaryMissing {
            path: path.to_path_buf(),
        });
    }

    let cached = paths::bin_dir().join(CLIENT_BINARY_NAME);
    if cached.is_file() {
        return Ok(cached);
    }

    search_path(CLIENT_BINARY_NAME).ok_or(ResolveError::BinaryNotFound)
}

fn search_path(name: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// The profile's configured path, or the cache location its remote
/// reference syncs into; the file must already exist either way.
pub fn profile_config(profile: &Profile) -> Result<PathBuf, ResolveError> {
    let candidate = match &profile.config {
        Some(path) => path.clone(),
        None if profile.remote_config.is_some() => paths::cached_profile_config(&profile.name),
        None => {
            return Err(ResolveError::ConfigUnset {
                profile: profile.name.clone(),
            });
        }
    };

    if !candidate.is_file() {
        return Err(ResolveError::ConfigMissing { path: candidate });
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn explicit_binary_must_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frpc");
        let err = client_binary(Some(&path)).unwrap_err();
        assert!(matches!(err, ResolveError::BinaryMissing { .. }));

        fs::write(&path, "#!/bin/sh\n").expect("write binary");
        assert_eq!(client_binary(Some(&path)).expect("resolved"), path);
    }

    #[test]
    fn profile_without_config_is_rejected() {
        let profile = Profile {
            name: "bare".to_string(),
            ..Profile::default()
        };
        let err = profile_config(&profile).unwrap_err();
        assert!(matches!(err, ResolveError::ConfigUnset { profile } if profile == "bare"));
    }

    #[test]
    fn configured_path_must_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frpc.toml");
        let profile = Profile {
            name: "home".to_string(),
            config: Some(path.clone()),
            ..Profile::default()
        };

        let err = profile_config(&profile).unwrap_err();
        assert!(matches!(err, ResolveError::ConfigMissing { .. }));

        fs::write(&path, "serverAddr = \"203.0.113.7\"\n").expect("write config");
        assert_eq!(profile_config(&profile).expect("resolved"), path);
    }

    #[test]
    fn remote_reference_falls_back_to_cache_location() {
        let profile = Profile {
            name: "Synced Profile".to_string(),
            remote_config: Some("profiles/synced.toml".to_string()),
            ..Profile::default()
        };

        // Nothing has synced the file yet, so resolution points at the
        // cache location and reports it missing.
        let err = profile_config(&profile).unwrap_err();
        match err {
            ResolveError::ConfigMissing { path } => {
                assert!(path.ends_with("profiles/synced_profile.toml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
