//! Per-node private-channel selection.
//!
//! The interface shape — accumulate evidence during a phase, then decide and
//! reset — is grounded on
//! `original_source/model/cottoncandy-channel-selector.{h,cc}`; that file's
//! threshold/hysteresis algorithm is an older variant, so the actual
//! selection rule here is per-channel interference counters with argmin and
//! a random tie-break.

use rand::Rng;

/// Which heuristic `ChannelSelector::select` uses to pick a private channel.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ChannelAlgorithm {
    /// Always the public channel; effectively disables private channels.
    SingleChannel,
    /// Uniform over `[0, num_channels)`.
    RandomChannel,
    /// Minimum-count channel, ties broken at random. Default.
    ChannelAnnouncement,
}

impl Default for ChannelAlgorithm {
    fn default() -> Self {
        ChannelAlgorithm::ChannelAnnouncement
    }
}

/// Accumulates overheard Seek-Join evidence for one node across a Seek-Join
/// phase, then picks the next private channel.
pub struct ChannelSelector {
    algorithm: ChannelAlgorithm,
    counts: Vec<u32>,
}

impl ChannelSelector {
    pub fn new(algorithm: ChannelAlgorithm, num_channels: u8) -> Self {
        ChannelSelector {
            algorithm,
            counts: vec![0; num_channels as usize],
        }
    }

    pub fn num_channels(&self) -> u8 {
        self.counts.len() as u8
    }

    /// Record an overheard Seek-Join's advertised private and parent
    /// channels. Channels `>= num_channels` (i.e. the public channel) are
    /// ignored.
    pub fn observe(&mut self, private_channel: u8, parent_channel: u8) {
        for ch in [private_channel, parent_channel] {
            if let Some(count) = self.counts.get_mut(ch as usize) {
                *count += 1;
            }
        }
    }

    /// Choose the next private channel and reset the counters for the next
    /// phase.
    pub fn select(&mut self, rng: &mut impl Rng) -> u8 {
        let channel = match self.algorithm {
            ChannelAlgorithm::SingleChannel => crate::channel::PUBLIC_CHANNEL,
            ChannelAlgorithm::RandomChannel => rng.gen_range(0..self.counts.len() as u8),
            ChannelAlgorithm::ChannelAnnouncement => self.argmin(rng),
        };
        self.counts.iter_mut().for_each(|c| *c = 0);
        channel
    }

    fn argmin(&self, rng: &mut impl Rng) -> u8 {
        let min = *self.counts.iter().min().unwrap_or(&0);
        let candidates: Vec<u8> = self
            .counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == min)
            .map(|(i, _)| i as u8)
            .collect();
        candidates[rng.gen_range(0..candidates.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn single_channel_always_public() {
        let mut sel = ChannelSelector::new(ChannelAlgorithm::SingleChannel, 4);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(sel.select(&mut rng), crate::channel::PUBLIC_CHANNEL);
    }

    #[test]
    fn announcement_picks_least_observed() {
        let mut sel = ChannelSelector::new(ChannelAlgorithm::ChannelAnnouncement, 4);
        sel.observe(0, 0);
        sel.observe(0, 1);
        sel.observe(1, 1);
        // counts: ch0=3, ch1=3, ch2=0, ch3=0 -> min is 0, tie between 2 and 3
        let mut rng = StdRng::seed_from_u64(1);
        let picked = sel.select(&mut rng);
        assert!(picked == 2 || picked == 3);
    }

    #[test]
    fn counters_reset_after_decision() {
        let mut sel = ChannelSelector::new(ChannelAlgorithm::ChannelAnnouncement, 2);
        sel.observe(0, 0);
        let mut rng = StdRng::seed_from_u64(2);
        sel.select(&mut rng);
        assert!(sel.counts.iter().all(|&c| c == 0));
    }

    #[test]
    fn out_of_range_channel_is_ignored() {
        let mut sel = ChannelSelector::new(ChannelAlgorithm::ChannelAnnouncement, 2);
        sel.observe(64, 64);
        assert_eq!(sel.counts, vec![0, 0]);
    }
}
