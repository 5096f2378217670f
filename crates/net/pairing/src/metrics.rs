//! Pairing metrics.

use crate::Direction;

/// Terminal state of one pairing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Paired,
    Rejected,
    Failed,
}

impl Outcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Paired => "paired",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

/// Counts pairing outcomes by direction.
#[derive(Clone, Debug, Default)]
pub(crate) struct PairingMetrics;

impl PairingMetrics {
    pub(crate) fn record(&self, direction: Direction, outcome: Outcome) {
        metrics::counter!(
            "pairing.outcomes_total",
            "direction" => direction.as_str(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
    }
}
