//! Seek-Join / Gateway-Req back-off window table.
//!
//! A small pure function over a mode enum rather than a lookup struct,
//! since the table itself is tiny and exhaustively specified.

use crate::mac::config::BackoffMode;
use crate::scheduler::{secs, Time};

/// The announced back-off window, in whole seconds, for a node currently
/// holding `num_children` confirmed children, under `mode`.
pub fn window_seconds(mode: BackoffMode, num_children: u8) -> u8 {
    match (mode, num_children) {
        (BackoffMode::Adaptive, 0) => 1,
        (BackoffMode::Adaptive, 1) => 3,
        (BackoffMode::Adaptive, 2) => 5,
        (BackoffMode::Adaptive, _) => 9,

        (BackoffMode::Static3, _) => 3,

        (BackoffMode::Static12, 0) => 1,
        (BackoffMode::Static12, 1) => 3,
        (BackoffMode::Static12, _) => 12,
    }
}

/// The same window as a scheduler duration.
pub fn window(mode: BackoffMode, num_children: u8) -> Time {
    secs(window_seconds(mode, num_children) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_matches_table() {
        assert_eq!(window_seconds(BackoffMode::Adaptive, 0), 1);
        assert_eq!(window_seconds(BackoffMode::Adaptive, 1), 3);
        assert_eq!(window_seconds(BackoffMode::Adaptive, 2), 5);
        assert_eq!(window_seconds(BackoffMode::Adaptive, 3), 9);
        assert_eq!(window_seconds(BackoffMode::Adaptive, 10), 9);
    }

    #[test]
    fn static3_is_flat() {
        for n in 0..6 {
            assert_eq!(window_seconds(BackoffMode::Static3, n), 3);
        }
    }

    #[test]
    fn static12_ramps_once() {
        assert_eq!(window_seconds(BackoffMode::Static12, 0), 1);
        assert_eq!(window_seconds(BackoffMode::Static12, 1), 3);
        assert_eq!(window_seconds(BackoffMode::Static12, 2), 12);
        assert_eq!(window_seconds(BackoffMode::Static12, 9), 12);
    }
}
