//! Discrete-event simulator for the Cottoncandy tree-forming LPWAN MAC
//! protocol.
//!
//! The crate is organized the way the protocol itself is layered: wire
//! types at the bottom ([`address`], [`codec`], [`frame`]), a per-node
//! radio model and scheduler above that ([`radio`], [`scheduler`],
//! [`channel`]), the MAC state machine itself ([`mac`]), and the
//! multi-node driver that ties them together ([`sim`]). [`tracker`]
//! collects the topology and statistics every run reports.

pub mod address;
pub mod address_generator;
pub mod channel;
pub mod channel_selector;
pub mod codec;
pub mod error;
pub mod frame;
pub mod mac;
pub mod radio;
pub mod scheduler;
pub mod sim;
pub mod tracker;

pub use error::SimError;
