//! Phase timings and protocol constants.
//!
//! One `Default`-able struct gathers every concern, fields documented
//! individually, timings expressed in the unit the protocol actually uses
//! and converted to scheduler ticks at the call site.

use crate::channel_selector::ChannelAlgorithm;
use crate::mac::energy::CurrentDraw;
use crate::scheduler::{secs, Time};

/// Which table [`crate::mac::backoff::window`] consults.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum BackoffMode {
    Adaptive,
    Static3,
    Static12,
}

impl Default for BackoffMode {
    fn default() -> Self {
        BackoffMode::Adaptive
    }
}

/// Governs how `tx_power_dbm` behaves during parent discovery, grounded on
/// `original_source/model/cottoncandy-mac.h`'s `CottonCandyDiscoveryMode`
/// (`STATIC_TX_PWR` / `ADAPTIVE_TX_PWR`).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum DiscoveryMode {
    /// `tx_power_dbm` is fixed at `static_tx_power_dbm` for the whole run.
    Static,
    /// `tx_power_dbm` starts at `min_tx_power_dbm` and climbs by
    /// `tx_power_increment_dbm` on each failed join attempt, resetting on
    /// self-heal.
    Adaptive,
}

impl Default for DiscoveryMode {
    fn default() -> Self {
        DiscoveryMode::Adaptive
    }
}

/// All of the protocol's global timings and constants, gathered into one
/// config object handed to every `Mac` at construction.
#[derive(Clone, Debug)]
pub struct MacConfig {
    pub accept_join: Time,
    pub seek_join: Time,
    pub duty_cycle: Time,
    pub dcp_timeout: Time,
    pub short_hibernation: Time,
    pub join_ack_timeout: Time,
    pub max_backoff_join: Time,
    pub min_backoff: Time,

    pub max_num_children: u8,
    pub max_num_candidate_parent: u8,
    pub max_num_hops: u8,
    pub max_empty_rounds: u8,
    pub rssi_threshold_dbm: i16,
    pub min_tx_power_dbm: i16,
    pub max_tx_power_dbm: i16,
    pub tx_power_increment_dbm: i16,

    pub backoff_mode: BackoffMode,
    /// Passed straight through to the per-node [`ChannelSelector`]
    /// (`crate::channel_selector`) built in `Mac::new`.
    pub channel_algorithm: ChannelAlgorithm,
    pub num_channels: u8,
    pub reply_len: u8,

    /// Discovery tx-power policy; see [`DiscoveryMode`]. `--mode 1`
    /// ("static-tx-only") and the proximity-only presets pin this to
    /// `Static`.
    pub discovery_mode: DiscoveryMode,
    /// The fixed power used under `DiscoveryMode::Static`.
    pub static_tx_power_dbm: i16,
    /// Whether the RSSI proximity gate in `on_seek_join_overheard` applies
    /// at all. `--mode 5` ("baseline") disables it to admit every candidate
    /// regardless of observed signal strength.
    pub proximity_gate_enabled: bool,

    /// Milliamp draw for the non-transmit energy segments; transmit current
    /// is looked up per power level via
    /// [`crate::mac::energy::tx_current_ma`] instead.
    pub current_draw: CurrentDraw,
}

impl Default for MacConfig {
    fn default() -> Self {
        MacConfig {
            accept_join: secs(6.0),
            seek_join: secs(120.0),
            duty_cycle: secs(3600.0),
            dcp_timeout: secs(900.0),
            short_hibernation: secs(10.0),
            join_ack_timeout: secs(1.0),
            max_backoff_join: secs(1.0),
            min_backoff: secs(0.1),

            max_num_children: 3,
            max_num_candidate_parent: 3,
            max_num_hops: 10,
            max_empty_rounds: 5,
            rssi_threshold_dbm: -115,
            min_tx_power_dbm: 8,
            max_tx_power_dbm: 17,
            tx_power_increment_dbm: 1,

            backoff_mode: BackoffMode::default(),
            channel_algorithm: ChannelAlgorithm::default(),
            num_channels: 64,
            reply_len: 2,

            discovery_mode: DiscoveryMode::default(),
            static_tx_power_dbm: 17,
            proximity_gate_enabled: true,
            current_draw: CurrentDraw::default(),
        }
    }
}
