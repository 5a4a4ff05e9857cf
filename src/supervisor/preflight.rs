//! Reachability probes run before the client process is spawned.

use std::time::Duration;

use thiserror::Error;
use tokio::{net::TcpStream, time::timeout};

use crate::config::Profile;

const DEFAULT_SERVER_DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_LOCAL_DIAL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("server connect failed: {addr}: {reason}")]
    ServerUnreachable { addr: String, reason: String },
    #[error("local service not reachable on {port}: {reason}")]
    LocalPortClosed { port: u16, reason: String },
}

/// Best-effort reachability, not protocol validation: a bounded TCP
/// dial to the declared server endpoint, then to every local port the
/// tunnel expects to find listening.
pub async fn check(profile: &Profile) -> Result<(), PreflightError> {
    if let Some((addr, port)) = profile.server_endpoint() {
        let target = format!("{addr}:{port}");
        let limit = profile
            .health_timeout
            .unwrap_or(DEFAULT_SERVER_DIAL_TIMEOUT);
        dial(&target, limit)
            .await
            .map_err(|reason| PreflightError::ServerUnreachable {
                addr: target.clone(),
                reason,
            })?;
    }

    let limit = profile.health_timeout.unwrap_or(DEFAULT_LOCAL_DIAL_TIMEOUT);
    for &port in &profile.local_check_ports {
        dial(&format!("127.0.0.1:{port}"), limit)
            .await
            .map_err(|reason| PreflightError::LocalPortClosed { port, reason })?;
    }

    Ok(())
}

async fn dial(target: &str, limit: Duration) -> Result<(), String> {
    match timeout(limit, TcpStream::connect(target)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err(format!("connect timed out after {limit:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn probe_profile() -> Profile {
        Profile {
            name: "probe".to_string(),
            health_timeout: Some(Duration::from_secs(1)),
            ..Profile::default()
        }
    }

    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        listener.local_addr().expect("addr").port()
        // Listener dropped here; the port is closed again.
    }

    #[tokio::test]
    async fn passes_with_no_declared_checks() {
        let profile = probe_profile();
        check(&profile).await.expect("nothing to probe");
    }

    #[tokio::test]
    async fn reachable_local_port_passes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let mut profile = probe_profile();
        profile.local_check_ports = vec![port];
        check(&profile).await.expect("port is listening");
    }

    #[tokio::test]
    async fn closed_local_port_names_the_port() {
        let port = free_port().await;
        let mut profile = probe_profile();
        profile.local_check_ports = vec![port];

        let err = check(&profile).await.unwrap_err();
        match err {
            PreflightError::LocalPortClosed { port: reported, .. } => {
                assert_eq!(reported, port);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn reachable_server_endpoint_passes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let mut profile = probe_profile();
        profile.server_addr = Some("127.0.0.1".to_string());
        profile.server_port = Some(port);
        check(&profile).await.expect("server is listening");
    }

    #[tokio::test]
    async fn unreachable_server_endpoint_fails() {
        let port = free_port().await;
        let mut profile = probe_profile();
        profile.server_addr = Some("127.0.0.1".to_string());
        profile.server_port = Some(port);

        let err = check(&profile).await.unwrap_err();
        assert!(matches!(err, PreflightError::ServerUnreachable { .. }));
    }
}
