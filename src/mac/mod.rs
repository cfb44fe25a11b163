//! The Cottoncandy MAC state machine — the core of this simulator.
//!
//! A `match` on received events drives the state machine; Cottoncandy's MAC
//! is itself event-driven, so every transition is a call to
//! [`Mac::on_event`] or [`Mac::on_rx`]. `Effect` takes the place of direct
//! radio/timer calls: `Mac` never touches a `Scheduler` or `Radio` itself,
//! it only describes what it wants done. [`crate::sim::driver`] is the only
//! thing that holds both a live `Scheduler` and the node arena, and it is
//! the one that turns `Effect`s into scheduled events and radio calls, and
//! events back into `Mac` method calls — this keeps `Mac` unit-testable
//! with no simulated clock at all.

pub mod backoff;
pub mod child;
pub mod config;
pub mod energy;
pub mod parent;
pub mod state;

use std::collections::{HashMap, VecDeque};

use log::{debug, info, trace, warn};
use rand::Rng;

use crate::address::Address;
use crate::channel::Channel;
use crate::channel_selector::ChannelSelector;
use crate::codec::{
    EmbeddedMiniReply, GatewayReqHeader, JoinAckHeader, NodeReplyHeader, SeekJoinHeader,
};
use crate::frame::{Frame, Message};
use crate::radio::{airtime, TxParams};
use crate::scheduler::{secs, EventHandle, Time};
use crate::tracker::Tracker;

use child::ChildTable;
use config::MacConfig;
use energy::{tx_current_ma, EnergyAccumulator};
use parent::{Candidate, CandidateSet, ParentRecord};
use state::MacState;

/// Maximum payload, in bytes, of an aggregated Node-Reply before a relay
/// must stop packing in more embedded replies.
const MAX_AGGREGATE_PAYLOAD: usize = 64;

/// A deadline the MAC may need to cancel early. Kept small and named by
/// purpose rather than by event, since at most one of each is ever live per
/// node at a time.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum DeadlineSlot {
    Observation,
    JoinAck,
    ReceiveWindow,
    DcpTimeout,
}

/// Internal alarms the MAC schedules against itself. The driver's only job
/// with these is to hand them back to [`Mac::on_event`] unchanged at the
/// requested time.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MacEvent {
    EnterObserve,
    ObservationDeadline,
    EnterJoinWindow,
    SendJoin(usize),
    JoinAckTimeout(usize),
    EnterAcceptJoin,
    AcceptJoinEnd,
    SeekJoinEmit,
    SeekJoinEnd,
    ForwardBackoffFire,
    DataCollectionRoundStart,
    ReceiveWindowTimeout,
    DcpTimeout,
}

/// What the driver must actually do in response to a `Mac` call.
pub enum Effect {
    Schedule {
        slot: Option<DeadlineSlot>,
        delay: Time,
        event: MacEvent,
    },
    CancelSlot(DeadlineSlot),
    SetChannel(Channel),
    Transmit {
        frame: Frame,
        channel: Channel,
        tx_power_dbm: i16,
    },
}

type Effects = Vec<Effect>;

fn schedule(effects: &mut Effects, delay: Time, event: MacEvent) {
    effects.push(Effect::Schedule { slot: None, delay, event });
}

fn schedule_slot(effects: &mut Effects, slot: DeadlineSlot, delay: Time, event: MacEvent) {
    effects.push(Effect::Schedule { slot: Some(slot), delay, event });
}

/// One node's Cottoncandy protocol state.
pub struct Mac {
    pub address: Address,
    is_gateway: bool,
    config: MacConfig,

    state: MacState,
    tx_power_dbm: i16,

    parent: Option<ParentRecord>,
    candidates: CandidateSet,
    join_cursor: usize,
    best_candidate: Option<usize>,
    best_quality: Option<(u8, u8, i16)>,

    children: ChildTable,
    pending_data: VecDeque<Frame>,

    channel_selector: ChannelSelector,
    private_channel: u8,

    duty_cycle_start: Time,
    next_accept_join_at: Option<Time>,
    /// Absolute time the Join attempt sequence should begin, latched by
    /// `close_observation` and consumed by the first `EnterJoinWindow`
    /// dispatch (see `on_event`): the candidate's announced Accept-Join
    /// start is an absolute time, but `Mac` only schedules relative to the
    /// `now` it's handed, so this field bridges the one event that needs it.
    pending_join_window_target: Option<Time>,
    learned_fresh_this_dcp: bool,
    empty_rounds: u8,
    received_any_this_window: bool,

    energy: EnergyAccumulator,
    /// `now` at which this node entered `ListenToParent`, latched so the
    /// eventual Gateway-Req (or a DCP timeout with none arriving) can charge
    /// the elapsed time as a receiving segment.
    listen_to_parent_start: Option<Time>,
    handles: HashMap<DeadlineSlot, EventHandle>,
}

impl Mac {
    fn new(address: Address, is_gateway: bool, config: MacConfig) -> Self {
        let num_channels = config.num_channels;
        let channel_algorithm = config.channel_algorithm;
        let tx_power_dbm = match config.discovery_mode {
            config::DiscoveryMode::Static => config.static_tx_power_dbm,
            config::DiscoveryMode::Adaptive => config.min_tx_power_dbm,
        };
        Mac {
            address,
            is_gateway,
            children: ChildTable::new(config.max_num_children),
            candidates: CandidateSet::new(config.max_num_candidate_parent),
            tx_power_dbm,
            config,
            state: MacState::Disconnected,
            parent: None,
            join_cursor: 0,
            best_candidate: None,
            best_quality: None,
            pending_data: VecDeque::new(),
            channel_selector: ChannelSelector::new(channel_algorithm, num_channels),
            private_channel: crate::channel::PUBLIC_CHANNEL,
            duty_cycle_start: 0,
            next_accept_join_at: None,
            pending_join_window_target: None,
            learned_fresh_this_dcp: false,
            empty_rounds: 0,
            received_any_this_window: false,
            energy: EnergyAccumulator::default(),
            listen_to_parent_start: None,
            handles: HashMap::new(),
        }
    }

    pub fn new_gateway(address: Address, config: MacConfig) -> Self {
        let mut mac = Mac::new(address, true, config);
        mac.tx_power_dbm = mac.config.max_tx_power_dbm;
        mac
    }

    pub fn new_node(address: Address, config: MacConfig) -> Self {
        Mac::new(address, false, config)
    }

    pub fn state(&self) -> MacState {
        self.state
    }

    pub fn tx_power_dbm(&self) -> i16 {
        self.tx_power_dbm
    }

    pub fn parent(&self) -> Option<&ParentRecord> {
        self.parent.as_ref()
    }

    pub fn num_children(&self) -> u8 {
        self.children.num_children()
    }

    /// Kick the node off: the gateway goes straight into Accept-Join, every
    /// other node starts Observing, at whatever jittered `now` the driver
    /// chose for it.
    pub fn start(&mut self, now: Time) -> Effects {
        let mut effects = Vec::new();
        if self.is_gateway {
            self.duty_cycle_start = now;
            self.next_accept_join_at = Some(now + self.config.duty_cycle);
            schedule(&mut effects, 0, MacEvent::EnterAcceptJoin);
        } else {
            schedule(&mut effects, 0, MacEvent::EnterObserve);
        }
        effects
    }

    fn accepts(&self, dst: Address) -> bool {
        dst.is_broadcast() || dst == self.address
    }

    /// Charge one transmit segment at the frame's on-air time and the
    /// current draw for `self.tx_power_dbm`.
    fn charge_tx(&mut self, frame: &Frame) {
        let ticks = airtime(frame.len(), &TxParams::default());
        let seconds = ticks as f64 / crate::scheduler::S as f64;
        self.energy.add_segment(tx_current_ma(self.tx_power_dbm), seconds);
    }

    /// Charge one non-transmit segment at the given rate from
    /// `self.config.current_draw`.
    fn charge_segment(&mut self, current_ma: f64, seconds: f64) {
        self.energy.add_segment(current_ma, seconds);
    }

    /// Close out a `ListenToParent` receiving segment, if one is open,
    /// charging the elapsed time at `rx_ma`.
    fn charge_listen_to_parent(&mut self, now: Time) {
        if let Some(start) = self.listen_to_parent_start.take() {
            let seconds = now.saturating_sub(start) as f64 / crate::scheduler::S as f64;
            self.charge_segment(self.config.current_draw.rx_ma, seconds);
        }
    }

    /// Record the scheduler handle the driver obtained for a slotted
    /// `Effect::Schedule`, so a later `Effect::CancelSlot` can retrieve it.
    pub fn note_handle(&mut self, slot: DeadlineSlot, handle: EventHandle) {
        self.handles.insert(slot, handle);
    }

    /// Take back the handle for `slot`, if one is outstanding, for the
    /// driver to pass to `Scheduler::cancel`.
    pub fn take_handle(&mut self, slot: DeadlineSlot) -> Option<EventHandle> {
        self.handles.remove(&slot)
    }

    // ---- Observe / Join -------------------------------------------------

    fn enter_observe(&mut self, effects: &mut Effects) {
        debug!("{} entering Observe", self.address);
        self.listen_to_parent_start = None;
        self.state = MacState::Observe;
        self.parent = None;
        self.candidates.clear();
        self.join_cursor = 0;
        self.best_candidate = None;
        self.best_quality = None;
        effects.push(Effect::SetChannel(Channel::public()));
    }

    fn on_seek_join_overheard(
        &mut self,
        now: Time,
        src: Address,
        header: SeekJoinHeader,
        rx_power_dbm: i16,
        effects: &mut Effects,
    ) {
        // Accumulate channel-selector evidence regardless of MAC state;
        // every overheard Seek-Join is useful for the next decision.
        self.channel_selector.observe(header.private_channel, header.parent_channel);

        if self.state != MacState::Observe {
            return;
        }
        if header.num_children >= self.config.max_num_children {
            trace!("{} ignoring Seek-Join from {src}: parent full", self.address);
            return;
        }
        let proximity_ok = !self.config.proximity_gate_enabled
            || rx_power_dbm >= self.config.rssi_threshold_dbm
            || self.tx_power_dbm >= self.config.max_tx_power_dbm;
        if !proximity_ok {
            trace!("{} ignoring Seek-Join from {src}: proximity gate, rx={rx_power_dbm} dBm", self.address);
            return;
        }

        let before = self.candidates.len();
        let was_first = self.candidates.admit(Candidate {
            address: src,
            private_channel: header.private_channel,
            num_children: header.num_children,
            next_accept_join_s: header.next_accept_join_s,
        });
        if self.candidates.len() > before {
            debug!("{} admitted candidate parent {src} on channel {}", self.address, header.private_channel);
        }
        if was_first {
            schedule_slot(effects, DeadlineSlot::Observation, secs(10.0), MacEvent::ObservationDeadline);
        }
        if self.candidates.is_full() {
            effects.push(Effect::CancelSlot(DeadlineSlot::Observation));
            self.close_observation(effects);
        }
    }

    fn close_observation(&mut self, effects: &mut Effects) {
        if let Some(target_s) = self.candidates.earliest_accept_join_s() {
            let target = secs(target_s as f64);
            // target is an absolute epoch second count; the caller supplies
            // `now` via the scheduled event, so we express this as a
            // schedule-at via a zero-or-positive delay computed by the
            // driver's `EnterJoinWindow` dispatch (see `on_event`).
            self.pending_join_window_target = Some(target);
        }
        schedule(effects, 0, MacEvent::EnterJoinWindow);
    }

    fn begin_join_attempt(
        &mut self,
        now: Time,
        idx: usize,
        rng: &mut impl Rng,
        tracker: &mut Tracker,
        effects: &mut Effects,
    ) {
        let Some(candidate) = self.candidates.get(idx).copied() else {
            self.conclude_join(now, tracker, effects);
            return;
        };
        trace!("{} trying candidate {} ({}/{})", self.address, candidate.address, idx + 1, self.candidates.len());
        self.join_cursor = idx;
        effects.push(Effect::SetChannel(Channel(candidate.private_channel)));
        let backoff = (rng.gen_range(0.0..=1.0)) * self.config.max_backoff_join as f64;
        self.charge_segment(self.config.current_draw.backoff_ma, backoff / crate::scheduler::S as f64);
        schedule(effects, backoff as Time, MacEvent::SendJoin(idx));
    }

    fn send_join(&mut self, idx: usize, effects: &mut Effects) {
        let Some(candidate) = self.candidates.get(idx).copied() else {
            return;
        };
        let frame = Frame::join(self.address);
        self.charge_tx(&frame);
        effects.push(Effect::Transmit {
            frame,
            channel: Channel(candidate.private_channel),
            tx_power_dbm: self.tx_power_dbm,
        });
        schedule_slot(
            effects,
            DeadlineSlot::JoinAck,
            self.config.join_ack_timeout,
            MacEvent::JoinAckTimeout(idx),
        );
    }

    fn on_join_ack(
        &mut self,
        now: Time,
        src: Address,
        header: JoinAckHeader,
        rx_power_dbm: i16,
        rng: &mut impl Rng,
        tracker: &mut Tracker,
        effects: &mut Effects,
    ) {
        let Some(candidate) = self.candidates.get(self.join_cursor) else {
            return;
        };
        if candidate.address != src {
            return;
        }
        effects.push(Effect::CancelSlot(DeadlineSlot::JoinAck));

        let link_quality = header.rssi_dbm().min(rx_power_dbm);
        let passes = link_quality > self.config.rssi_threshold_dbm && header.hops < self.config.max_num_hops;
        if passes {
            let better = match self.best_quality {
                None => true,
                Some((best_hops, best_children, best_quality)) => {
                    (header.hops, header.num_children, -link_quality)
                        < (best_hops, best_children, -best_quality)
                }
            };
            if better {
                self.best_quality = Some((header.hops, header.num_children, link_quality));
                self.best_candidate = Some(self.join_cursor);
            }
        } else if self.tx_power_dbm >= self.config.max_tx_power_dbm {
            // Last-resort candidate: remember it even failing the gate, but
            // never overwrite an already-passing best candidate.
            if self.best_candidate.is_none() {
                self.best_candidate = Some(self.join_cursor);
            }
        }

        self.advance_join(now, rng, tracker, effects);
    }

    fn advance_join(&mut self, now: Time, rng: &mut impl Rng, tracker: &mut Tracker, effects: &mut Effects) {
        let next = self.join_cursor + 1;
        if next < self.candidates.len() {
            self.begin_join_attempt(now, next, rng, tracker, effects);
        } else {
            self.conclude_join(now, tracker, effects);
        }
    }

    fn conclude_join(&mut self, now: Time, tracker: &mut Tracker, effects: &mut Effects) {
        match self.best_candidate.and_then(|i| self.candidates.get(i).copied()) {
            Some(candidate) => {
                let (hops, num_children, link_quality) =
                    self.best_quality.unwrap_or((255, 0, self.config.rssi_threshold_dbm));
                self.parent = Some(ParentRecord {
                    address: candidate.address,
                    hops_to_gateway: hops.saturating_add(1).min(self.config.max_num_hops),
                    num_children_of_parent: num_children,
                    link_quality_dbm: link_quality,
                    uplink_channel: candidate.private_channel,
                });
                let frame = Frame::join_cfm(self.address, candidate.address);
                self.charge_tx(&frame);
                effects.push(Effect::Transmit {
                    frame,
                    channel: Channel(candidate.private_channel),
                    tx_power_dbm: self.tx_power_dbm,
                });
                info!(
                    "{} joined parent {} at {} hops, tx_power={} dBm",
                    self.address, candidate.address, hops, self.tx_power_dbm
                );
                tracker.on_connection(now, self.address, candidate.address, self.tx_power_dbm);
                self.state = MacState::Connected;
                schedule(effects, 0, MacEvent::EnterAcceptJoin);
            }
            None => {
                if self.config.discovery_mode == config::DiscoveryMode::Adaptive
                    && self.tx_power_dbm < self.config.max_tx_power_dbm
                {
                    self.tx_power_dbm =
                        (self.tx_power_dbm + self.config.tx_power_increment_dbm).min(self.config.max_tx_power_dbm);
                }
                warn!("{} found no parent, raising tx_power to {} dBm and restarting Observe", self.address, self.tx_power_dbm);
                self.enter_observe(effects);
            }
        }
    }

    // ---- Accept-Join -----------------------------------------------------

    fn enter_accept_join(&mut self, now: Time, effects: &mut Effects) {
        trace!("{} entering Accept-Join at t={now}", self.address);
        self.duty_cycle_start = now;
        self.state = MacState::AcceptJoin;
        effects.push(Effect::SetChannel(Channel::public()));
        schedule(effects, self.config.accept_join, MacEvent::AcceptJoinEnd);
    }

    fn on_join_request(&mut self, now: Time, src: Address, rx_power_dbm: i16, effects: &mut Effects) {
        if self.state != MacState::AcceptJoin {
            return;
        }
        if !self.children.has_free_slot() {
            debug!("{} rejecting Join from {src}: no free child slot", self.address);
            return;
        }
        self.children.reserve(src, now);
        let hops = if self.is_gateway { 1 } else { self.parent.map(|p| p.hops_to_gateway + 1).unwrap_or(1) };
        let header = JoinAckHeader::from_rssi_dbm(hops, self.children.num_children(), rx_power_dbm);
        let frame = Frame::join_ack(self.address, src, header);
        self.charge_tx(&frame);
        effects.push(Effect::Transmit {
            frame,
            channel: Channel(self.private_channel),
            tx_power_dbm: self.tx_power_dbm,
        });
    }

    fn on_join_cfm(&mut self, src: Address, effects: &mut Effects) {
        let _ = effects;
        if self.children.confirm(src) {
            debug!("{} confirmed child {src}", self.address);
        }
    }

    fn on_accept_join_end(&mut self, effects: &mut Effects) {
        self.children.expire_pending();
        self.state = MacState::SeekJoinWindow;
        trace!("{} {} -> {}", self.address, MacState::AcceptJoin, self.state);
        let offset = if self.is_gateway { secs(3.0) } else { secs(1.0) };
        schedule(effects, offset, MacEvent::SeekJoinEmit);
        schedule(effects, self.config.seek_join, MacEvent::SeekJoinEnd);
    }

    // ---- Seek-Join ---------------------------------------------------------

    fn on_seek_join_emit(&mut self, rng: &mut impl Rng, effects: &mut Effects) {
        self.private_channel = self.channel_selector.select(rng);
        let parent_channel = self.parent.map(|p| p.uplink_channel).unwrap_or(self.private_channel);
        let next_accept_join_s = self
            .next_accept_join_at
            .map(|t| (t / crate::scheduler::S) as u32)
            .unwrap_or(0);
        let header = SeekJoinHeader {
            private_channel: self.private_channel,
            parent_channel,
            num_children: self.children.num_children(),
            max_backoff: backoff::window_seconds(self.config.backoff_mode, self.children.num_children()),
            next_accept_join_s,
        };
        let frame = Frame::seek_join(self.address, header);
        self.charge_tx(&frame);
        effects.push(Effect::Transmit {
            frame,
            channel: Channel::public(),
            tx_power_dbm: self.tx_power_dbm,
        });
    }

    fn on_seek_join_end(&mut self, now: Time, effects: &mut Effects) {
        self.learned_fresh_this_dcp = false;
        self.empty_rounds = 0;
        schedule_slot(effects, DeadlineSlot::DcpTimeout, self.config.dcp_timeout, MacEvent::DcpTimeout);

        if self.is_gateway {
            self.state = MacState::TalkToChildren;
            self.start_talk_to_children(now, effects);
        } else {
            self.pending_data.push_back(Frame::node_reply_leaf(
                self.address,
                self.parent.map(|p| p.address).unwrap_or(self.address),
                self.config.reply_len,
            ));
            self.state = MacState::ListenToParent;
            self.listen_to_parent_start = Some(now);
            effects.push(Effect::SetChannel(Channel(self.parent.map(|p| p.uplink_channel).unwrap_or(self.private_channel))));
        }
    }

    // ---- Data Collection --------------------------------------------------

    fn on_gateway_req(
        &mut self,
        now: Time,
        src: Address,
        header: GatewayReqHeader,
        rng: &mut impl Rng,
        tracker: &mut Tracker,
        effects: &mut Effects,
    ) {
        if self.is_gateway || self.state != MacState::ListenToParent {
            return;
        }
        let Some(parent) = self.parent else { return };
        if parent.address != src {
            return;
        }
        tracker.on_gateway_req_received(self.address);
        self.charge_listen_to_parent(now);
        self.learned_fresh_this_dcp = true;
        self.next_accept_join_at = Some(secs(header.next_req_time_s as f64));

        let backoff = self.config.min_backoff
            + (rng.gen_range(0.0..=1.0) * secs(header.max_backoff as f64) as f64) as Time;
        self.charge_segment(self.config.current_draw.backoff_ma, backoff as f64 / crate::scheduler::S as f64);
        schedule(effects, backoff, MacEvent::ForwardBackoffFire);
    }

    fn on_forward_backoff_fire(&mut self, now: Time, effects: &mut Effects) {
        let Some(parent) = self.parent else {
            self.start_talk_to_children(now, effects);
            return;
        };
        if let Some(frame) = self.build_forward_frame(parent.address) {
            self.charge_tx(&frame);
            effects.push(Effect::Transmit {
                frame,
                channel: Channel(parent.uplink_channel),
                tx_power_dbm: self.tx_power_dbm,
            });
        }
        if !self.pending_data.is_empty() {
            schedule(effects, self.config.min_backoff, MacEvent::ForwardBackoffFire);
        } else {
            self.start_talk_to_children(now, effects);
        }
    }

    /// Pop outgoing frames off `pending_data` and build exactly one frame to
    /// send upstream, aggregating as many as fit under the payload cap.
    fn build_forward_frame(&mut self, dst: Address) -> Option<Frame> {
        if self.pending_data.len() == 1 {
            let mut frame = self.pending_data.pop_front()?;
            frame.set_dst(dst);
            return Some(frame);
        }
        if self.pending_data.is_empty() {
            return None;
        }

        let mut payload = Vec::new();
        while let Some(next) = self.pending_data.front() {
            let Ok(msg) = crate::frame::decode(next.as_bytes()) else {
                self.pending_data.pop_front();
                continue;
            };
            let Message::NodeReply { src, header, payload: body, .. } = msg else {
                self.pending_data.pop_front();
                continue;
            };
            let addition_len = if header.is_aggregated() {
                body.len()
            } else {
                EmbeddedMiniReply::HEADER_LEN + body.len()
            };
            if payload.len() + addition_len > MAX_AGGREGATE_PAYLOAD && !payload.is_empty() {
                break;
            }
            self.pending_data.pop_front();
            if header.is_aggregated() {
                payload.extend_from_slice(&body);
            } else {
                EmbeddedMiniReply { src, data: body }.serialize(&mut payload);
            }
        }

        let more_pending = !self.pending_data.is_empty();
        let replies = crate::codec::decode_embedded_replies(&payload).ok()?;
        Some(Frame::node_reply_aggregated(self.address, dst, &replies, more_pending))
    }

    fn start_talk_to_children(&mut self, now: Time, effects: &mut Effects) {
        let _ = now;
        self.received_any_this_window = false;
        effects.push(Effect::SetChannel(Channel(self.private_channel)));
        let next_accept_join_s = self
            .next_accept_join_at
            .map(|t| (t / crate::scheduler::S) as u32)
            .unwrap_or(0);
        let max_backoff = backoff::window_seconds(self.config.backoff_mode, self.children.num_children());
        let header = GatewayReqHeader {
            option: 0,
            channel: self.private_channel,
            next_req_time_s: next_accept_join_s,
            max_backoff,
        };
        let frame = Frame::gateway_req(self.address, header);
        self.charge_tx(&frame);
        effects.push(Effect::Transmit {
            frame,
            channel: Channel(self.private_channel),
            tx_power_dbm: self.tx_power_dbm,
        });
        let window = secs(1.0) + secs(max_backoff as f64) + secs(0.5);
        self.charge_segment(self.config.current_draw.rx_ma, window as f64 / crate::scheduler::S as f64);
        schedule_slot(effects, DeadlineSlot::ReceiveWindow, window, MacEvent::ReceiveWindowTimeout);
    }

    fn on_node_reply(
        &mut self,
        src: Address,
        header: NodeReplyHeader,
        payload: Vec<u8>,
        tracker: &mut Tracker,
    ) {
        if self.state != MacState::TalkToChildren {
            return;
        }
        self.received_any_this_window = true;
        self.children.mark_replied(src);

        if self.is_gateway {
            if header.is_aggregated() {
                if let Ok(replies) = crate::codec::decode_embedded_replies(&payload) {
                    for reply in replies {
                        tracker.on_reply_delivered(reply.src);
                    }
                }
            } else {
                tracker.on_reply_delivered(src);
            }
        } else {
            let mut frame = if header.is_aggregated() {
                Frame::node_reply_aggregated(
                    src,
                    self.address,
                    &crate::codec::decode_embedded_replies(&payload).unwrap_or_default(),
                    header.has_more_data(),
                )
            } else {
                Frame::node_reply_leaf(src, self.address, payload.len() as u8)
            };
            frame.set_dst(self.address);
            self.pending_data.push_back(frame);
        }
    }

    fn on_receive_window_timeout(&mut self, now: Time, rng: &mut impl Rng, tracker: &mut Tracker, effects: &mut Effects) {
        if self.received_any_this_window {
            self.empty_rounds = 0;
        } else {
            self.empty_rounds += 1;
        }
        let _ = rng;

        if self.empty_rounds >= self.config.max_empty_rounds {
            debug!("{} ending Data-Collection after {} empty rounds", self.address, self.empty_rounds);
            self.end_data_collection(now, tracker, effects);
        } else {
            self.charge_segment(
                self.config.current_draw.short_hibernation_ma,
                self.config.short_hibernation as f64 / crate::scheduler::S as f64,
            );
            schedule(effects, self.config.short_hibernation, MacEvent::DataCollectionRoundStart);
        }
    }

    fn end_data_collection(&mut self, now: Time, tracker: &mut Tracker, effects: &mut Effects) {
        self.children.end_of_round(3);
        tracker.on_energy_used(self.address, self.energy.total_mas());
        self.energy.reset();
        effects.push(Effect::CancelSlot(DeadlineSlot::DcpTimeout));
        self.state = MacState::Hibernate;

        let target = self.next_accept_join_at.unwrap_or(now + self.config.duty_cycle);
        let delay = target.saturating_sub(now);
        self.charge_segment(
            self.config.current_draw.deep_hibernation_ma,
            delay as f64 / crate::scheduler::S as f64,
        );
        schedule(effects, delay, MacEvent::EnterAcceptJoin);
    }

    fn on_dcp_timeout(&mut self, now: Time, tracker: &mut Tracker, effects: &mut Effects) {
        if self.is_gateway {
            return;
        }
        if !self.learned_fresh_this_dcp {
            warn!("{} desynchronized, self-healing back to Observe", self.address);
            self.charge_listen_to_parent(now);
            self.parent = None;
            if self.config.discovery_mode == config::DiscoveryMode::Adaptive {
                self.tx_power_dbm = self.config.min_tx_power_dbm;
            }
            self.enter_observe(effects);
        } else {
            self.end_data_collection(now, tracker, effects);
        }
    }

    // ---- Event / frame entry points ---------------------------------------

    pub fn on_event(
        &mut self,
        now: Time,
        event: MacEvent,
        rng: &mut impl Rng,
        tracker: &mut Tracker,
    ) -> Effects {
        let mut effects = Vec::new();
        match event {
            MacEvent::EnterObserve => self.enter_observe(&mut effects),
            MacEvent::ObservationDeadline => self.close_observation(&mut effects),
            MacEvent::EnterJoinWindow => {
                if let Some(target) = self.pending_join_window_target.take() {
                    if target > now {
                        schedule(&mut effects, target - now, MacEvent::EnterJoinWindow);
                        self.pending_join_window_target = Some(target);
                        return effects;
                    }
                }
                self.begin_join_attempt(now, 0, rng, tracker, &mut effects);
            }
            MacEvent::SendJoin(idx) => self.send_join(idx, &mut effects),
            MacEvent::JoinAckTimeout(idx) => {
                if idx == self.join_cursor {
                    self.advance_join(now, rng, tracker, &mut effects);
                }
            }
            MacEvent::EnterAcceptJoin => self.enter_accept_join(now, &mut effects),
            MacEvent::AcceptJoinEnd => self.on_accept_join_end(&mut effects),
            MacEvent::SeekJoinEmit => self.on_seek_join_emit(rng, &mut effects),
            MacEvent::SeekJoinEnd => self.on_seek_join_end(now, &mut effects),
            MacEvent::ForwardBackoffFire => self.on_forward_backoff_fire(now, &mut effects),
            MacEvent::DataCollectionRoundStart => self.start_talk_to_children(now, &mut effects),
            MacEvent::ReceiveWindowTimeout => self.on_receive_window_timeout(now, rng, tracker, &mut effects),
            MacEvent::DcpTimeout => self.on_dcp_timeout(now, tracker, &mut effects),
        }
        effects
    }

    pub fn on_rx(
        &mut self,
        now: Time,
        msg: Message,
        rx_power_dbm: i16,
        rng: &mut impl Rng,
        tracker: &mut Tracker,
    ) -> Effects {
        let mut effects = Vec::new();
        if !self.accepts(msg.dst()) {
            return effects;
        }
        match msg {
            Message::Join { src } => self.on_join_request(now, src, rx_power_dbm, &mut effects),
            Message::JoinAck { src, header, .. } => {
                self.on_join_ack(now, src, header, rx_power_dbm, rng, tracker, &mut effects)
            }
            Message::JoinCfm { src, .. } => self.on_join_cfm(src, &mut effects),
            Message::SeekJoin { src, header } => {
                self.on_seek_join_overheard(now, src, header, rx_power_dbm, &mut effects)
            }
            Message::GatewayReq { src, header } => {
                self.on_gateway_req(now, src, header, rng, tracker, &mut effects)
            }
            Message::NodeReply { src, header, payload, .. } => {
                self.on_node_reply(src, header, payload, tracker)
            }
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{GatewayReqHeader, SeekJoinHeader};
    use crate::tracker::Position;
    use config::DiscoveryMode;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn gateway_start_schedules_accept_join_immediately() {
        let mut mac = Mac::new_gateway(Address::new(0x8000), MacConfig::default());
        let effects = mac.start(0);
        assert_eq!(effects.len(), 1);
        assert!(matches!(
            effects[0],
            Effect::Schedule { delay: 0, event: MacEvent::EnterAcceptJoin, slot: None }
        ));
    }

    #[test]
    fn node_start_schedules_enter_observe() {
        let mut mac = Mac::new_node(Address::new(1), MacConfig::default());
        let effects = mac.start(0);
        assert!(matches!(
            effects[0],
            Effect::Schedule { delay: 0, event: MacEvent::EnterObserve, slot: None }
        ));
    }

    #[test]
    fn weak_seek_join_rejected_under_proximity_gate() {
        let mut config = MacConfig::default();
        config.proximity_gate_enabled = true;
        config.rssi_threshold_dbm = -100;
        let mut mac = Mac::new_node(Address::new(1), config);
        let mut tracker = Tracker::new(2);
        let mut rng = rng();
        mac.on_event(0, MacEvent::EnterObserve, &mut rng, &mut tracker);

        let header = SeekJoinHeader {
            private_channel: 1,
            parent_channel: 64,
            num_children: 0,
            max_backoff: 5,
            next_accept_join_s: 100,
        };
        let msg = Message::SeekJoin { src: Address::new(2), header };
        let effects = mac.on_rx(secs(1.0), msg, -150, &mut rng, &mut tracker);
        assert!(effects.is_empty());
        assert!(mac.candidates.is_empty());
    }

    #[test]
    fn disabling_proximity_gate_admits_weak_signal_candidate() {
        let mut config = MacConfig::default();
        config.proximity_gate_enabled = false;
        config.rssi_threshold_dbm = -100;
        let mut mac = Mac::new_node(Address::new(1), config);
        let mut tracker = Tracker::new(2);
        let mut rng = rng();
        mac.on_event(0, MacEvent::EnterObserve, &mut rng, &mut tracker);

        let header = SeekJoinHeader {
            private_channel: 1,
            parent_channel: 64,
            num_children: 0,
            max_backoff: 5,
            next_accept_join_s: 100,
        };
        let msg = Message::SeekJoin { src: Address::new(2), header };
        mac.on_rx(secs(1.0), msg, -150, &mut rng, &mut tracker);
        assert_eq!(mac.candidates.len(), 1);
    }

    #[test]
    fn adaptive_discovery_climbs_tx_power_after_failed_join() {
        let mut config = MacConfig::default();
        config.discovery_mode = DiscoveryMode::Adaptive;
        config.min_tx_power_dbm = 8;
        config.tx_power_increment_dbm = 1;
        let mut mac = Mac::new_node(Address::new(1), config);
        let mut tracker = Tracker::new(2);
        assert_eq!(mac.tx_power_dbm(), 8);
        let mut effects = Vec::new();
        mac.conclude_join(secs(1.0), &mut tracker, &mut effects);
        assert_eq!(mac.tx_power_dbm(), 9);
    }

    #[test]
    fn static_discovery_keeps_tx_power_fixed_after_failed_join() {
        let mut config = MacConfig::default();
        config.discovery_mode = DiscoveryMode::Static;
        config.static_tx_power_dbm = 14;
        let mut mac = Mac::new_node(Address::new(1), config);
        let mut tracker = Tracker::new(2);
        assert_eq!(mac.tx_power_dbm(), 14);
        let mut effects = Vec::new();
        mac.conclude_join(secs(1.0), &mut tracker, &mut effects);
        assert_eq!(mac.tx_power_dbm(), 14);
    }

    #[test]
    fn transmitting_a_join_charges_energy() {
        let mut mac = Mac::new_node(Address::new(1), MacConfig::default());
        mac.candidates.admit(Candidate {
            address: Address::new(2),
            private_channel: 1,
            num_children: 0,
            next_accept_join_s: 0,
        });
        assert_eq!(mac.energy.total_mas(), 0.0);
        let mut effects = Vec::new();
        mac.send_join(0, &mut effects);
        assert!(mac.energy.total_mas() > 0.0);
        assert!(matches!(effects[0], Effect::Transmit { .. }));
    }

    #[test]
    fn join_request_ignored_once_child_table_full() {
        let mut config = MacConfig::default();
        config.max_num_children = 1;
        let mut mac = Mac::new_gateway(Address::new(0x8000), config);
        let mut effects = Vec::new();
        mac.enter_accept_join(0, &mut effects);
        effects.clear();
        mac.on_join_request(0, Address::new(1), -50, &mut effects);
        assert_eq!(effects.len(), 1);
        effects.clear();
        mac.on_join_request(0, Address::new(2), -50, &mut effects);
        assert!(effects.is_empty());
    }

    #[test]
    fn gateway_req_increments_tracker_counter_and_charges_backoff() {
        let mut mac = Mac::new_node(Address::new(1), MacConfig::default());
        mac.state = MacState::ListenToParent;
        mac.parent = Some(ParentRecord {
            address: Address::new(0x8000),
            hops_to_gateway: 1,
            num_children_of_parent: 0,
            link_quality_dbm: -50,
            uplink_channel: 3,
        });
        let mut tracker = Tracker::new(2);
        tracker.register(Address::new(1), Position { x: 0.0, y: 0.0 });
        let mut rng = rng();
        let header = GatewayReqHeader { option: 0, channel: 3, next_req_time_s: 3600, max_backoff: 5 };
        let mut effects = Vec::new();
        mac.on_gateway_req(0, Address::new(0x8000), header, &mut rng, &mut tracker, &mut effects);
        assert_eq!(tracker.status(Address::new(1)).unwrap().num_req_received, 1);
        assert!(mac.energy.total_mas() > 0.0);
    }
}
