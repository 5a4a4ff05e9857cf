//! Pure classification of client output lines.

/// What a single output line says about the tunnel, if anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Ready,
    Failure(String),
    Inconclusive,
}

const READY_MARKERS: &[&str] = &[
    "login to server success",
    "start proxy success",
    "proxy added",
];

const FAILURE_MARKERS: &[&str] = &[
    "port already used",
    "proxy name already exists",
    "connect to local service",
    "connection refused",
    "i/o timeout",
    "timeout",
    "login to server failed",
    "authentication failed",
    "invalid token",
    "failed to",
];

/// Case-insensitive substring matching; ready markers win when a line
/// matches both tables. Lines matching neither are inconclusive and
/// only ever recorded.
pub fn classify_line(line: &str) -> Verdict {
    let lowered = line.to_lowercase();

    if READY_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return Verdict::Ready;
    }

    if FAILURE_MARKERS.iter().any(|marker| lowered.contains(marker))
        || (lowered.contains("error") && lowered.contains("proxy"))
    {
        return Verdict::Failure(line.trim().to_string());
    }

    Verdict::Inconclusive
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_ready_markers_case_insensitively() {
        for line in [
            "2024-01-01 12:00:00 [I] login to server success",
            "Start Proxy Success for [web]",
            "proxy added: [ssh]",
            "PROXY ADDED",
        ] {
            assert_eq!(classify_line(line), Verdict::Ready, "line: {line}");
        }
    }

    #[test]
    fn ready_wins_over_failure_markers() {
        let line = "login to server success after timeout retry";
        assert_eq!(classify_line(line), Verdict::Ready);
    }

    #[test]
    fn failure_message_is_the_trimmed_line() {
        let line = "  [W] connect to local service 127.0.0.1:8000 refused  ";
        match classify_line(line) {
            Verdict::Failure(message) => {
                assert_eq!(
                    message,
                    "[W] connect to local service 127.0.0.1:8000 refused"
                );
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[test]
    fn matches_every_failure_marker() {
        for line in [
            "port already used by another process",
            "proxy name already exists on the server",
            "connect to local service failed",
            "dial tcp: connection refused",
            "read tcp: i/o timeout",
            "control connection timeout",
            "login to server failed: EOF",
            "authentication failed for user",
            "invalid token supplied",
            "failed to open tunnel",
        ] {
            assert!(
                matches!(classify_line(line), Verdict::Failure(_)),
                "line: {line}"
            );
        }
    }

    #[test]
    fn error_and_proxy_together_are_a_failure() {
        assert!(matches!(
            classify_line("unexpected error while registering proxy [web]"),
            Verdict::Failure(_)
        ));
        // Either word alone is not enough.
        assert_eq!(
            classify_line("an error occurred, retrying"),
            Verdict::Inconclusive
        );
        assert_eq!(
            classify_line("proxy configuration loaded"),
            Verdict::Inconclusive
        );
    }

    #[test]
    fn ordinary_lines_are_inconclusive() {
        for line in [
            "",
            "2024-01-01 12:00:00 [I] start frpc service for config file",
            "try to reconnect to server...",
        ] {
            assert_eq!(classify_line(line), Verdict::Inconclusive, "line: {line}");
        }
    }
}
