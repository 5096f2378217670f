//! Pairing configuration and CLI arguments.

use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

/// Default base protocol; the handshake runs on `"{protocol}/pair"`.
pub const DEFAULT_PROTOCOL: &str = "/gossip/artifacts/1.0.0";

/// Default bound on every control byte read or write.
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_CONTROL_TIMEOUT_MS: u64 = DEFAULT_CONTROL_TIMEOUT.as_millis() as u64;

/// Configuration for the pairing protocol.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PairingConfig {
    /// Base protocol identifier.
    pub protocol: String,

    /// Bound on each control byte read or write.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "control-timeout-ms")]
    pub control_timeout: Duration,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_PROTOCOL.to_string(),
            control_timeout: DEFAULT_CONTROL_TIMEOUT,
        }
    }
}

impl PairingConfig {
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }

    /// Protocol identifier of the pairing sub-protocol.
    pub fn pair_protocol(&self) -> String {
        format!("{}/pair", self.protocol)
    }
}

/// Pairing protocol parameters.
#[derive(Debug, Clone, Args, PartialEq, Eq)]
#[command(next_help_heading = "Pairing")]
pub struct PairingArgs {
    /// Base protocol identifier; pairing runs on `<PROTOCOL>/pair`.
    #[arg(long = "pairing.protocol", value_name = "PROTOCOL", default_value = DEFAULT_PROTOCOL)]
    pub protocol: String,

    /// Control byte timeout in milliseconds.
    #[arg(
        long = "pairing.timeout",
        value_name = "MS",
        default_value_t = DEFAULT_CONTROL_TIMEOUT_MS
    )]
    pub control_timeout_ms: u64,
}

impl Default for PairingArgs {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_PROTOCOL.to_string(),
            control_timeout_ms: DEFAULT_CONTROL_TIMEOUT_MS,
        }
    }
}

impl From<&PairingArgs> for PairingConfig {
    fn from(args: &PairingArgs) -> Self {
        PairingConfig::default()
            .with_protocol(args.protocol.clone())
            .with_control_timeout(Duration::from_millis(args.control_timeout_ms))
    }
}
