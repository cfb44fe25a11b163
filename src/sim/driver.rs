//! The simulator driver: owns every node's `Mac` and `Radio`, the one
//! `Scheduler`, the shared `Medium`, and the `Tracker`, and is the only
//! thing that turns a `Mac`'s `Effect`s into scheduled events and radio
//! calls (and events back into `Mac` calls). Structural counterpart of
//! `original_source/examples/cottoncandy-sim.cc`'s `main()`, which wires
//! together ns-3's node container, mobility model, and applications the
//! same way.

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::address::Address;
use crate::channel::Channel;
use crate::frame::{self, Frame};
use crate::mac::config::MacConfig;
use crate::mac::{Effect, Mac, MacEvent};
use crate::radio::Radio;
use crate::scheduler::{Scheduler, Time};
use crate::sim::cli::{Cli, PositionModel};
use crate::sim::medium::Medium;
use crate::sim::placement;
use crate::tracker::{Position, Tracker};

pub type NodeId = usize;

struct Node {
    mac: Mac,
    radio: Radio,
    position: Position,
}

/// Driver-internal scheduler payload. The MAC's own `MacEvent` only ever
/// reaches [`Mac::on_event`] again; `TxDone`/`RxLockEnd` are the driver's
/// own bookkeeping for the shared medium and never seen by a `Mac`.
#[derive(Copy, Clone, Debug)]
enum Event {
    Mac(NodeId, MacEvent),
    TxDone(NodeId),
    RxLockEnd(NodeId),
}

pub struct Driver {
    nodes: Vec<Node>,
    gateway: NodeId,
    tracker: Tracker,
    medium: Medium,
    mac_config: MacConfig,
    rng: StdRng,
}

impl Driver {
    pub fn build(cli: &Cli) -> Self {
        let mac_config = cli.mac_config();
        let mut rng = StdRng::seed_from_u64(cli.seed);

        let positions = match cli.position_model {
            PositionModel::Grid => placement::grid_positions(cli.num_nodes, cli.grid_delta),
            PositionModel::Disk => placement::disk_positions(cli.num_nodes, cli.radius, &mut rng),
        };

        let mut addr_gen = crate::address_generator::AddressGenerator::default();
        let mut tracker = Tracker::new(cli.num_nodes as usize + 1);

        let gateway_position = Position { x: 0.0, y: 0.0 };
        let gateway_addr = addr_gen.next_gateway();
        tracker.mark_gateway_ready(gateway_addr, gateway_position);
        let mut nodes = vec![Node {
            mac: Mac::new_gateway(gateway_addr, mac_config.clone()),
            radio: Radio::new(),
            position: gateway_position,
        }];

        for position in positions {
            let addr = addr_gen.next_device();
            tracker.register(addr, position);
            nodes.push(Node {
                mac: Mac::new_node(addr, mac_config.clone()),
                radio: Radio::new(),
                position,
            });
        }

        let medium = Medium {
            shadowing_sigma_db: cli.shadowing_sigma_db,
            ..Medium::default()
        };

        Driver {
            nodes,
            gateway: 0,
            tracker,
            medium,
            mac_config,
            rng,
        }
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Start every node — the gateway at t=0, every other node with an
    /// independent uniform jitter up to one Accept-Join phase — then run
    /// the scheduler to `stop_at`.
    pub fn run(&mut self, stop_at: Time) {
        debug!("starting run: {} nodes, stop at t={stop_at}", self.nodes.len());
        let mut scheduler: Scheduler<Event> = Scheduler::new();
        let jitter_max = self.mac_config.accept_join.max(1);

        for id in 0..self.nodes.len() {
            let start_at = if id == self.gateway {
                0
            } else {
                self.rng.gen_range(0..jitter_max)
            };
            let effects = self.nodes[id].mac.start(start_at);
            self.apply_effects(&mut scheduler, id, start_at, effects);
        }

        scheduler.run_until(stop_at, |sched, now, event| {
            self.dispatch(sched, now, event);
        });
        debug!("run finished at t={}", scheduler.now());
    }

    fn dispatch(&mut self, sched: &mut Scheduler<Event>, now: Time, event: Event) {
        match event {
            Event::Mac(id, mac_event) => {
                let effects =
                    self.nodes[id]
                        .mac
                        .on_event(now, mac_event, &mut self.rng, &mut self.tracker);
                self.apply_effects(sched, id, now, effects);
            }
            Event::TxDone(id) => {
                self.nodes[id].radio.finish_transmit();
            }
            Event::RxLockEnd(id) => self.complete_receive(sched, id, now),
        }
    }

    fn complete_receive(&mut self, sched: &mut Scheduler<Event>, id: NodeId, now: Time) {
        let Some((frame, rx_power_dbm, collided)) = self.nodes[id].radio.complete_receive() else {
            return;
        };
        if collided {
            trace!("node {id} collision, {} hops remaining", self.hops_remaining(id));
            self.tracker.on_collision(self.hops_remaining(id));
            return;
        }
        // Malformed decode failures are dropped silently: no retransmission,
        // no counter.
        let Ok(msg) = frame::decode(frame.as_bytes()) else {
            debug!("node {id} dropping malformed frame");
            return;
        };
        let effects = self.nodes[id]
            .mac
            .on_rx(now, msg, rx_power_dbm, &mut self.rng, &mut self.tracker);
        self.apply_effects(sched, id, now, effects);
    }

    /// The node's own hop count to the gateway, the only "remaining hops"
    /// figure locally available to the node that detected the collision.
    fn hops_remaining(&self, id: NodeId) -> u8 {
        self.nodes[id].mac.parent().map(|p| p.hops_to_gateway).unwrap_or(0)
    }

    fn apply_effects(&mut self, sched: &mut Scheduler<Event>, id: NodeId, now: Time, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Schedule { slot, delay, event } => {
                    let handle = sched.schedule_after(delay, Event::Mac(id, event));
                    if let Some(slot) = slot {
                        self.nodes[id].mac.note_handle(slot, handle);
                    }
                }
                Effect::CancelSlot(slot) => {
                    if let Some(handle) = self.nodes[id].mac.take_handle(slot) {
                        sched.cancel(handle);
                    }
                }
                Effect::SetChannel(channel) => {
                    let _ = self.nodes[id].radio.set_frequency(channel);
                }
                Effect::Transmit { frame, channel, tx_power_dbm } => {
                    self.transmit(sched, id, now, frame, channel, tx_power_dbm);
                }
            }
        }
    }

    /// Put `id`'s radio into Tx, queue its own `TxDone`, and deliver the
    /// transmission to every other node tuned to `channel` via the shared
    /// `Medium`'s path-loss model.
    fn transmit(
        &mut self,
        sched: &mut Scheduler<Event>,
        id: NodeId,
        now: Time,
        frame: Frame,
        channel: Channel,
        tx_power_dbm: i16,
    ) {
        self.nodes[id].radio.force_channel(channel);
        let (duration, aborted) = self.nodes[id].radio.begin_transmit(frame.len());
        if let Some(aborted_frame) = aborted {
            self.maybe_report_half_duplex(id, &aborted_frame);
        }
        sched.schedule_after(duration, Event::TxDone(id));

        let end = now + duration;
        let tx_position = self.nodes[id].position;
        for other in 0..self.nodes.len() {
            if other == id {
                continue;
            }
            if self.nodes[other].radio.channel() != channel {
                continue;
            }
            let distance = Medium::distance_m(tx_position, self.nodes[other].position);
            let rx_power_dbm = self.medium.rx_power_dbm(tx_power_dbm, distance, &mut self.rng);
            if self.nodes[other]
                .radio
                .lock_incoming(frame.clone(), now, end, rx_power_dbm)
                .is_ok()
            {
                sched.schedule_after(duration, Event::RxLockEnd(other));
            }
        }
    }

    /// A half-duplex abort only counts when the aborted frame was a
    /// Node-Reply actually addressed to this node (§4.C).
    fn maybe_report_half_duplex(&mut self, id: NodeId, aborted: &Frame) {
        let Ok(msg) = frame::decode(aborted.as_bytes()) else {
            return;
        };
        let mine: Address = self.nodes[id].mac.address;
        if msg.is_node_reply() && msg.dst() == mine {
            self.tracker.on_half_duplex(mine);
        }
    }
}

/// Build a driver from `cli`, run it to `--simulationTime`, and return the
/// finished tracker for the caller to report.
pub fn run(cli: &Cli) -> Tracker {
    let mut driver = Driver::build(cli);
    driver.run(cli.simulation_time_ticks());
    driver.tracker
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with(num_nodes: u32, hours: u32) -> Cli {
        use clap::Parser;
        Cli::parse_from([
            "cottoncandy",
            "--numNodes",
            &num_nodes.to_string(),
            "--simulationTime",
            &hours.to_string(),
            "--gridDelta",
            "200",
        ])
    }

    #[test]
    fn small_run_converges_and_reports_no_collisions_required() {
        let cli = cli_with(2, 2);
        let tracker = run(&cli);
        // With 2 close-by nodes plus the gateway, every node should have
        // joined well within the configured two-hour run.
        assert!(tracker.join_completion_time().is_some());
    }

    #[test]
    fn gateway_is_registered_at_the_origin() {
        let cli = cli_with(1, 1);
        let driver = Driver::build(&cli);
        let gateway_status = driver
            .tracker()
            .nodes()
            .find(|(_, status)| status.time_first_join == Some(0))
            .expect("gateway pre-registered");
        assert_eq!(gateway_status.1.position, Position { x: 0.0, y: 0.0 });
    }
}
