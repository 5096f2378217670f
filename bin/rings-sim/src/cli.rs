//! Simulator command line.

use clap::{Args, Parser};
use vertex_net_pairing::PairingArgs;
use vertex_net_rings::RingsArgs;

/// Simulate a gossip overlay: admit peers into a latency-ring routing table
/// and pair with a recommended fanout each round.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) logs: LogArgs,

    #[command(flatten)]
    pub(crate) rings: RingsArgs,

    #[command(flatten)]
    pub(crate) pairing: PairingArgs,

    #[command(flatten)]
    pub(crate) sim: SimArgs,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Args)]
#[command(next_help_heading = "Logging")]
pub(crate) struct LogArgs {
    /// Silence all output.
    #[arg(short, long)]
    pub(crate) quiet: bool,

    /// Verbose mode (-v, -vv, -vvv, etc.).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub(crate) verbosity: u8,

    /// Log filter directive (e.g., "vertex_net_rings=trace").
    #[arg(long = "log.filter", value_name = "DIRECTIVE")]
    pub(crate) filter: Option<String>,

    /// Use JSON format for log output.
    #[arg(long = "log.json")]
    pub(crate) json: bool,
}

/// Shape of the simulated overlay.
#[derive(Debug, Clone, Args)]
#[command(next_help_heading = "Simulation")]
pub(crate) struct SimArgs {
    /// Number of remote peers.
    #[arg(long = "sim.peers", value_name = "COUNT", default_value_t = 32)]
    pub(crate) peers: u32,

    /// Peers to pair with per round.
    #[arg(long = "sim.fanout", value_name = "COUNT", default_value_t = 8)]
    pub(crate) fanout: usize,

    /// Number of pairing rounds.
    #[arg(long = "sim.rounds", value_name = "COUNT", default_value_t = 3)]
    pub(crate) rounds: usize,

    /// Peers that leave the network after being admitted.
    #[arg(long = "sim.offline", value_name = "COUNT", default_value_t = 2)]
    pub(crate) offline: u32,

    /// Highest synthetic round-trip latency in milliseconds.
    #[arg(long = "sim.max-latency", value_name = "MS", default_value_t = 400)]
    pub(crate) max_latency_ms: u64,
}
