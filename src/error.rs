//! Crate-wide error kinds.
//!
//! Only [`SimError::ConfigInvalid`] is meant to propagate out of the
//! driver; the rest are recovered locally and surface only as
//! [`crate::tracker::Tracker`] counters.

use thiserror::Error;

/// Errors produced across the simulator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// Bad CLI input; the process aborts before the run starts.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A decoded packet's advertised body length didn't match the
    /// container; the packet is silently dropped.
    #[error("malformed packet")]
    MalformedPacket,

    /// Attempted to tune or transmit while the radio was already busy.
    #[error("radio busy")]
    RadioBusy,

    /// Data-Collection reached `DCP_TIMEOUT` without the node learning the
    /// next Accept-Join time.
    #[error("phase timeout")]
    PhaseTimeout,

    /// Parent discovery exhausted its candidate set without finding a
    /// parent passing the quality gate.
    #[error("no parent found")]
    NoParent,

    /// The channel selector's counters were all equal; fell back to
    /// channel 0.
    #[error("no channel available, falling back to channel 0")]
    ChannelUnavailable,
}
