//! Topology file and stdout report emission.

use std::io::{self, Write};

use crate::tracker::Tracker;

/// One line per node: `hex(addr) x y hex(parent_addr) reqs replies heals tx_power`.
/// A childless/unjoined node's `parent_addr` prints as `0000`.
pub fn write_topology<W: Write>(tracker: &Tracker, mut out: W) -> io::Result<()> {
    for (addr, status) in tracker.nodes() {
        let parent = status.parent_addr.map(|a| a.raw()).unwrap_or(0);
        writeln!(
            out,
            "{:04x} {} {} {:04x} {} {} {} {}",
            addr.raw(),
            status.position.x,
            status.position.y,
            parent,
            status.num_req_received,
            status.num_reply_delivered,
            status.num_self_healing,
            status.tx_power_dbm,
        )?;
    }
    Ok(())
}

/// `"Join Completion at <seconds> seconds"` plus the collision histogram.
pub fn write_summary<W: Write>(tracker: &Tracker, mut out: W) -> io::Result<()> {
    let join_seconds = tracker
        .join_completion_time()
        .map(|t| t as f64 / crate::scheduler::S as f64)
        .unwrap_or(f64::NAN);
    writeln!(out, "Join Completion at {} seconds", join_seconds)?;
    writeln!(out, "Total number of collisions: {}", tracker.total_collisions())?;
    for (hops, count) in tracker.collisions_by_hops_remaining() {
        writeln!(out, "At {} hops left: {}", hops, count)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::tracker::Position;

    #[test]
    fn topology_line_format() {
        let mut tracker = Tracker::new(2);
        tracker.mark_gateway_ready(Address::new(0x8000), Position { x: 0.0, y: 0.0 });
        tracker.register(Address::new(1), Position { x: 10.0, y: 20.0 });
        tracker.on_connection(5_000_000, Address::new(1), Address::new(0x8000), 14);
        let mut buf = Vec::new();
        write_topology(&tracker, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("0001 10 20 8000 0 0 0 14"));
    }

    #[test]
    fn summary_includes_join_completion_and_collisions() {
        let mut tracker = Tracker::new(1);
        tracker.mark_gateway_ready(Address::new(0x8000), Position { x: 0.0, y: 0.0 });
        tracker.on_collision(3);
        let mut buf = Vec::new();
        write_summary(&tracker, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Join Completion at 0 seconds"));
        assert!(text.contains("Total number of collisions: 1"));
        assert!(text.contains("At 3 hops left: 1"));
    }
}
