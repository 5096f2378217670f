//! Latency ring CLI arguments.

use std::time::Duration;

use clap::Args;

use crate::config::{
    DEFAULT_BASE_LATENCY, DEFAULT_GROWTH_FACTOR, DEFAULT_RING_COUNT, DEFAULT_SAMPLE_PERIOD,
    DEFAULT_SAMPLE_SIZE, RingsConfig,
};

const DEFAULT_BASE_LATENCY_MS: u64 = DEFAULT_BASE_LATENCY.as_millis() as u64;
const DEFAULT_SAMPLE_PERIOD_SECS: u64 = DEFAULT_SAMPLE_PERIOD.as_secs();

/// Parameters for the latency-ring routing table.
#[derive(Debug, Clone, Args, PartialEq)]
#[command(next_help_heading = "Latency Rings")]
pub struct RingsArgs {
    /// Number of latency rings.
    #[arg(
        long = "rings.count",
        value_name = "COUNT",
        default_value_t = DEFAULT_RING_COUNT
    )]
    pub ring_count: usize,

    /// Lower latency bound of the second ring, in milliseconds.
    #[arg(
        long = "rings.base-latency",
        value_name = "MS",
        default_value_t = DEFAULT_BASE_LATENCY_MS
    )]
    pub base_latency_ms: u64,

    /// Ratio between consecutive ring boundaries.
    #[arg(
        long = "rings.growth-factor",
        value_name = "FACTOR",
        default_value_t = DEFAULT_GROWTH_FACTOR
    )]
    pub growth_factor: f64,

    /// Peers re-probed per refresh cycle.
    #[arg(
        long = "rings.sample-size",
        value_name = "COUNT",
        default_value_t = DEFAULT_SAMPLE_SIZE
    )]
    pub sample_size: usize,

    /// Seconds between refresh cycles.
    #[arg(
        long = "rings.sample-period",
        value_name = "SECS",
        default_value_t = DEFAULT_SAMPLE_PERIOD_SECS
    )]
    pub sample_period_secs: u64,
}

impl Default for RingsArgs {
    fn default() -> Self {
        Self {
            ring_count: DEFAULT_RING_COUNT,
            base_latency_ms: DEFAULT_BASE_LATENCY_MS,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            sample_size: DEFAULT_SAMPLE_SIZE,
            sample_period_secs: DEFAULT_SAMPLE_PERIOD_SECS,
        }
    }
}

impl From<&RingsArgs> for RingsConfig {
    fn from(args: &RingsArgs) -> Self {
        RingsConfig::default()
            .with_ring_count(args.ring_count)
            .with_base_latency(Duration::from_millis(args.base_latency_ms))
            .with_growth_factor(args.growth_factor)
            .with_sample_size(args.sample_size)
            .with_sample_period(Duration::from_secs(args.sample_period_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        rings: RingsArgs,
    }

    #[test]
    fn test_defaults_match_config() {
        let cli = TestCli::try_parse_from(["test"]).expect("defaults parse");
        assert_eq!(cli.rings, RingsArgs::default());
        assert_eq!(RingsConfig::from(&cli.rings), RingsConfig::default());
    }

    #[test]
    fn test_overrides() {
        let cli = TestCli::try_parse_from([
            "test",
            "--rings.count",
            "4",
            "--rings.base-latency",
            "10",
            "--rings.growth-factor",
            "3",
            "--rings.sample-size",
            "2",
            "--rings.sample-period",
            "5",
        ])
        .expect("overrides parse");

        let config = RingsConfig::from(&cli.rings);
        assert_eq!(config.ring_count, 4);
        assert_eq!(config.base_latency, Duration::from_millis(10));
        assert_eq!(config.growth_factor, 3.0);
        assert_eq!(config.sample_size, 2);
        assert_eq!(config.sample_period, Duration::from_secs(5));
    }
}
