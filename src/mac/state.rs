//! The Cottoncandy MAC's top-level state.
//!
//! An eight-state enum driven by scheduled events rather than a polled
//! `tick()`.

/// One of the eight states a Cottoncandy node can be in.
#[derive(Copy, Clone, Eq, PartialEq, Debug, strum::Display)]
pub enum MacState {
    /// Initial state for every non-gateway node: no parent, not listening.
    Disconnected,
    /// Listening on the public channel, building a candidate-parent set.
    Observe,
    /// Has a parent and a home in the tree; about to enter Seek-Join.
    Connected,
    /// Advertising self, accumulating channel-selector evidence.
    SeekJoinWindow,
    /// Data-Collection: waiting on / reacting to the parent's Gateway-Req.
    ListenToParent,
    /// Data-Collection: this node is the one soliciting its children.
    TalkToChildren,
    /// Between Data-Collection and the next Accept-Join.
    Hibernate,
    /// Answering Join requests from prospective children.
    AcceptJoin,
}

impl MacState {
    pub fn is_data_collection(&self) -> bool {
        matches!(self, MacState::ListenToParent | MacState::TalkToChildren)
    }
}
