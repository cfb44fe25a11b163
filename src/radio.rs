//! Per-node half-duplex transceiver abstraction.
//!
//! One radio per node with three modes and a small set of MAC-facing
//! callbacks. The cross-node question of *which* radios actually hear a
//! given transmission, and whether two overlapping transmissions collide,
//! is the shared medium's job ([`crate::sim::medium`]) — this module only
//! owns what a single radio knows about itself: its tuned channel, whether
//! it is currently transmitting or locked onto an incoming frame, and the
//! on-air-time formula used throughout.

use crate::channel::Channel;
use crate::error::SimError;
use crate::frame::Frame;
use crate::scheduler::{Time, US};

/// LoRa-style modulation parameters used for every Cottoncandy transmission:
/// spreading factor 7, bandwidth 125 kHz, coding rate 4/5, preamble 8
/// symbols.
#[derive(Copy, Clone, Debug)]
pub struct TxParams {
    pub spreading_factor: u8,
    pub bandwidth_hz: u32,
    pub coding_rate_denominator: u8,
    pub preamble_symbols: u8,
}

impl Default for TxParams {
    fn default() -> Self {
        TxParams {
            spreading_factor: 7,
            bandwidth_hz: 125_000,
            coding_rate_denominator: 5,
            preamble_symbols: 8,
        }
    }
}

/// Semtech-formula on-air time for a payload of `payload_len` bytes, in
/// scheduler ticks (microseconds).
pub fn airtime(payload_len: usize, params: &TxParams) -> Time {
    let sf = params.spreading_factor as f64;
    let bw = params.bandwidth_hz as f64;
    let cr = params.coding_rate_denominator as f64 - 4.0;

    let t_sym = (2f64.powf(sf)) / bw; // seconds per symbol
    let t_preamble = (params.preamble_symbols as f64 + 4.25) * t_sym;

    // Low data rate optimization is not used at SF7, so DE = 0; header is
    // always present (explicit header mode).
    let payload_symb_nb = 8.0
        + (((8.0 * payload_len as f64 - 4.0 * sf + 28.0 + 16.0) / (4.0 * sf)).ceil() * (cr + 4.0))
            .max(0.0);
    let t_payload = payload_symb_nb * t_sym;

    crate::scheduler::secs(t_preamble + t_payload)
}

/// What the radio is doing right now.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum RadioMode {
    Standby,
    Tx,
    RxLocked,
}

/// A reception the radio has locked onto: the earliest-arriving
/// transmission on the tuned channel that hasn't completed yet.
#[derive(Clone, Debug)]
pub struct IncomingLock {
    pub frame: Frame,
    pub start: Time,
    pub end: Time,
    pub rx_power_dbm: i16,
    /// Set once a second, overlapping transmission is detected; the
    /// eventual completion callback becomes `on_rx_failed` instead of
    /// `on_rx_ok`.
    pub collided: bool,
}

/// Per-node radio state.
pub struct Radio {
    channel: Channel,
    mode: RadioMode,
    tx_params: TxParams,
    incoming: Option<IncomingLock>,
}

impl Radio {
    pub fn new() -> Self {
        Radio {
            channel: Channel::public(),
            mode: RadioMode::Standby,
            tx_params: TxParams::default(),
            incoming: None,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    pub fn tx_params(&self) -> &TxParams {
        &self.tx_params
    }

    /// Tune to a new channel. Only legal while in standby.
    pub fn set_frequency(&mut self, channel: Channel) -> Result<(), SimError> {
        if self.mode != RadioMode::Standby {
            return Err(SimError::RadioBusy);
        }
        self.channel = channel;
        Ok(())
    }

    /// Force the tuned channel regardless of current mode. Used by the
    /// driver immediately before [`Radio::begin_transmit`] when the radio
    /// was mid-reception on a different channel — that reception is about
    /// to be aborted anyway, so the `Standby`-only guard on
    /// [`Radio::set_frequency`] would only get in the way.
    pub fn force_channel(&mut self, channel: Channel) {
        self.channel = channel;
    }

    /// Begin transmitting `len_bytes`. Returns the duration (for the caller
    /// to schedule a completion event) and, if a reception was in progress,
    /// the aborted frame (half-duplex).
    ///
    /// A reception in progress is aborted (half-duplex). The caller decides
    /// whether to actually fire `on_half_duplex` (only for frames destined
    /// to this node); this method just reports what was aborted.
    pub fn begin_transmit(&mut self, len_bytes: usize) -> (Time, Option<Frame>) {
        let aborted = self.incoming.take().map(|lock| lock.frame);
        self.mode = RadioMode::Tx;
        (airtime(len_bytes, &self.tx_params), aborted)
    }

    /// Finish the current transmission, returning to standby.
    pub fn finish_transmit(&mut self) {
        self.mode = RadioMode::Standby;
    }

    /// Start listening. Idempotent.
    pub fn start_receive(&mut self) {
        if self.mode == RadioMode::Standby {
            self.mode = RadioMode::Standby;
        }
    }

    /// Lock onto an incoming transmission. Only possible while not
    /// transmitting; if already locked onto an earlier one, this is a
    /// collision on both.
    pub fn lock_incoming(
        &mut self,
        frame: Frame,
        start: Time,
        end: Time,
        rx_power_dbm: i16,
    ) -> Result<(), SimError> {
        if self.mode == RadioMode::Tx {
            return Err(SimError::RadioBusy);
        }
        if let Some(existing) = self.incoming.as_mut() {
            existing.collided = true;
            return Err(SimError::RadioBusy);
        }
        self.mode = RadioMode::RxLocked;
        self.incoming = Some(IncomingLock {
            frame,
            start,
            end,
            rx_power_dbm,
            collided: false,
        });
        Ok(())
    }

    /// Complete the currently locked reception (called by the medium at the
    /// lock's `end` time), returning the frame, its received power, and
    /// whether it collided.
    pub fn complete_receive(&mut self) -> Option<(Frame, i16, bool)> {
        let lock = self.incoming.take()?;
        self.mode = RadioMode::Standby;
        Some((lock.frame, lock.rx_power_dbm, lock.collided))
    }

    /// True if this radio is mid-reception of a frame that hasn't completed.
    pub fn is_receiving(&self) -> bool {
        self.incoming.is_some()
    }
}

impl Default for Radio {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    #[test]
    fn airtime_is_positive_and_grows_with_payload() {
        let params = TxParams::default();
        let small = airtime(5, &params);
        let large = airtime(60, &params);
        assert!(small > 0);
        assert!(large > small);
    }

    #[test]
    fn set_frequency_rejected_while_transmitting() {
        let mut radio = Radio::new();
        radio.begin_transmit(10);
        assert_eq!(
            radio.set_frequency(Channel(3)),
            Err(SimError::RadioBusy)
        );
    }

    #[test]
    fn transmit_aborts_in_progress_reception() {
        let mut radio = Radio::new();
        let frame = Frame::join(Address::new(1));
        radio.lock_incoming(frame.clone(), 0, 1000, -80).unwrap();
        let (_dur, aborted) = radio.begin_transmit(5);
        assert_eq!(aborted, Some(frame));
        assert_eq!(radio.mode(), RadioMode::Tx);
    }

    #[test]
    fn second_lock_marks_collision() {
        let mut radio = Radio::new();
        let f1 = Frame::join(Address::new(1));
        let f2 = Frame::join(Address::new(2));
        radio.lock_incoming(f1, 0, 1000, -80).unwrap();
        assert_eq!(
            radio.lock_incoming(f2, 100, 900, -90),
            Err(SimError::RadioBusy)
        );
        let (_frame, _rx_power_dbm, collided) = radio.complete_receive().unwrap();
        assert!(collided);
    }
}
