use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Installed location of the twping output encoder.
pub const DEFAULT_ENCODER_BIN: &str = "/opt/vyatta/bin/twping-output-to-json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub encoder_bin: PathBuf,
    /// How long each process may take to exit on its own once the encoder's
    /// output has ended, before it is signalled.
    #[serde(with = "humantime_serde")]
    pub settle_timeout: Duration,
    /// Escalate to SIGKILL when a process survives SIGTERM this long.
    /// `None` waits for the process indefinitely.
    #[serde(with = "humantime_serde")]
    pub kill_after: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            encoder_bin: PathBuf::from(DEFAULT_ENCODER_BIN),
            settle_timeout: Duration::from_secs(2),
            kill_after: Some(Duration::from_secs(10)),
        }
    }
}

/// Options forwarded to the encoder for a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderOptions {
    /// Only emit JSON encoded lines (errors still come through).
    pub json_only: bool,
    /// Accumulate statistics across the whole test.
    pub accumulate: bool,
}

impl EncoderOptions {
    /// Flags appended to the encoder's argv, in a fixed order.
    pub fn flags(self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.json_only {
            flags.push("--json-only");
        }
        if self.accumulate {
            flags.push("--accumulate");
        }
        flags
    }
}

/// Authentication mode a TWAMP control session was negotiated in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    Open,
    Mixed,
    Authenticated,
    Encrypted,
    Other(String),
}

impl AuthMode {
    /// Decode the single letter code the server writes to its session files.
    pub fn from_code(code: &str) -> Self {
        match code {
            "O" => AuthMode::Open,
            "M" => AuthMode::Mixed,
            "A" => AuthMode::Authenticated,
            "E" => AuthMode::Encrypted,
            other => AuthMode::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AuthMode::Open => "Open",
            AuthMode::Mixed => "Mixed",
            AuthMode::Authenticated => "Authenticated",
            AuthMode::Encrypted => "Encrypted",
            AuthMode::Other(s) => s,
        }
    }
}

/// A `[host]:port` endpoint as written by the TWAMP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: String,
}

impl Endpoint {
    /// Parse `[host]:port`. Returns `None` when either bracket or the
    /// `]:` separator is missing.
    pub fn parse(addr: &str) -> Option<Self> {
        let (_, rest) = addr.split_once('[')?;
        let host = rest.split(']').next()?;
        let (_, port) = rest.split_once("]:")?;
        Some(Self {
            host: host.to_string(),
            port: port.to_string(),
        })
    }

    pub fn unknown() -> Self {
        Self {
            host: "unknown".into(),
            port: "0".into(),
        }
    }

    pub fn parse_or_unknown(addr: &str) -> Self {
        Self::parse(addr).unwrap_or_else(Self::unknown)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSession {
    pub sid: String,
    pub sender: Endpoint,
    pub reflector: Endpoint,
    pub status: String,
    pub dscp: String,
}

impl TestSession {
    pub fn is_active(&self) -> bool {
        self.status == "ACTIVE"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSession {
    pub pid: String,
    /// Raw origin address; kept as written so `--client` matching sees
    /// exactly what the server recorded.
    pub origin: String,
    pub auth_mode: AuthMode,
    pub test_sessions: Vec<TestSession>,
}

impl ControlSession {
    pub fn new(pid: String, origin: String, auth_mode: AuthMode) -> Self {
        Self {
            pid,
            origin,
            auth_mode,
            test_sessions: Vec::new(),
        }
    }

    pub fn origin_endpoint(&self) -> Endpoint {
        Endpoint::parse_or_unknown(&self.origin)
    }

    pub fn active_count(&self) -> usize {
        self.test_sessions.iter().filter(|t| t.is_active()).count()
    }

    pub fn inactive_count(&self) -> usize {
        self.test_sessions.len() - self.active_count()
    }

    /// True when the control session was initiated from `ip`.
    pub fn initiated_by(&self, ip: &str) -> bool {
        Endpoint::parse(&self.origin).is_some_and(|e| e.host == ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_flags_follow_options() {
        assert!(EncoderOptions::default().flags().is_empty());
        let both = EncoderOptions {
            json_only: true,
            accumulate: true,
        };
        assert_eq!(both.flags(), vec!["--json-only", "--accumulate"]);
        let acc = EncoderOptions {
            json_only: false,
            accumulate: true,
        };
        assert_eq!(acc.flags(), vec!["--accumulate"]);
    }

    #[test]
    fn config_deserializes_humantime_with_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"kill_after": "500ms", "settle_timeout": "1m"}"#).unwrap();
        assert_eq!(cfg.encoder_bin, PathBuf::from(DEFAULT_ENCODER_BIN));
        assert_eq!(cfg.kill_after, Some(Duration::from_millis(500)));
        assert_eq!(cfg.settle_timeout, Duration::from_secs(60));

        let cfg: PipelineConfig = serde_json::from_str(r#"{"kill_after": null}"#).unwrap();
        assert_eq!(cfg.kill_after, None);
    }

    #[test]
    fn endpoint_parsing() {
        let e = Endpoint::parse("[2001:db8::1]:862").unwrap();
        assert_eq!(e.host, "2001:db8::1");
        assert_eq!(e.port, "862");
        assert_eq!(e.to_string(), "[2001:db8::1]:862");

        assert!(Endpoint::parse("10.0.0.1:862").is_none());
        assert!(Endpoint::parse("[10.0.0.1]").is_none());
        assert_eq!(
            Endpoint::parse_or_unknown("garbage").to_string(),
            "[unknown]:0"
        );
    }

    #[test]
    fn auth_mode_codes() {
        assert_eq!(AuthMode::from_code("O").as_str(), "Open");
        assert_eq!(AuthMode::from_code("M").as_str(), "Mixed");
        assert_eq!(AuthMode::from_code("A").as_str(), "Authenticated");
        assert_eq!(AuthMode::from_code("E").as_str(), "Encrypted");
        assert_eq!(AuthMode::from_code("X").as_str(), "X");
    }
}
