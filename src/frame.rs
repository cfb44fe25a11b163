//! Complete on-wire frames: a [`MacHeader`] plus whatever sub-header and
//! payload its `msg_type` calls for, and the decoded [`Message`] tagged
//! union the MAC state machine actually switches on — per-frame dispatch is
//! a plain `match`, no runtime polymorphism involved.
//!
//! A [`Frame`] keeps its raw encoded bytes around rather than an owned
//! struct-of-structs, because the relay role's pending-data buffer takes an
//! already-framed Node-Reply and rewrites only its destination field before
//! resending.

use crate::address::Address;
use crate::codec::{
    self, EmbeddedMiniReply, GatewayReqHeader, JoinAckHeader, MacHeader, MsgType, NodeReplyHeader,
    NodeReplyOption, SeekJoinHeader,
};
use crate::error::SimError;

/// A fully encoded on-wire frame (MAC header + sub-header/payload).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Peek the MAC header without consuming the frame.
    pub fn mac_header(&self) -> Result<MacHeader, SimError> {
        Ok(MacHeader::deserialize(&self.bytes)?.0)
    }

    /// Overwrite the destination address in place, keeping everything else.
    /// Used when relaying a pending Node-Reply to a new parent.
    pub fn set_dst(&mut self, dst: Address) {
        let raw = dst.serialize();
        self.bytes[3..5].copy_from_slice(&raw);
    }

    pub fn join(src: Address) -> Self {
        let mut bytes = Vec::with_capacity(MacHeader::LEN);
        MacHeader {
            msg_type: MsgType::Join,
            src,
            dst: crate::address::BROADCAST,
        }
        .serialize(&mut bytes);
        Frame { bytes }
    }

    pub fn join_ack(src: Address, dst: Address, header: JoinAckHeader) -> Self {
        let mut bytes = Vec::with_capacity(MacHeader::LEN + JoinAckHeader::LEN);
        MacHeader {
            msg_type: MsgType::JoinAck,
            src,
            dst,
        }
        .serialize(&mut bytes);
        header.serialize(&mut bytes);
        Frame { bytes }
    }

    pub fn join_cfm(src: Address, dst: Address) -> Self {
        let mut bytes = Vec::with_capacity(MacHeader::LEN);
        MacHeader {
            msg_type: MsgType::JoinCfm,
            src,
            dst,
        }
        .serialize(&mut bytes);
        Frame { bytes }
    }

    pub fn seek_join(src: Address, header: SeekJoinHeader) -> Self {
        let mut bytes = Vec::with_capacity(MacHeader::LEN + SeekJoinHeader::LEN);
        MacHeader {
            msg_type: MsgType::SeekJoin,
            src,
            dst: crate::address::BROADCAST,
        }
        .serialize(&mut bytes);
        header.serialize(&mut bytes);
        Frame { bytes }
    }

    pub fn gateway_req(src: Address, header: GatewayReqHeader) -> Self {
        let mut bytes = Vec::with_capacity(MacHeader::LEN + GatewayReqHeader::LEN);
        MacHeader {
            msg_type: MsgType::GatewayReq,
            src,
            dst: crate::address::BROADCAST,
        }
        .serialize(&mut bytes);
        header.serialize(&mut bytes);
        Frame { bytes }
    }

    /// A leaf's own Node-Reply: `option = 0x20`, a zero-filled payload of
    /// `reply_len` bytes.
    pub fn node_reply_leaf(src: Address, dst: Address, reply_len: u8) -> Self {
        let mut bytes =
            Vec::with_capacity(MacHeader::LEN + NodeReplyHeader::LEN + reply_len as usize);
        MacHeader {
            msg_type: MsgType::NodeReply,
            src,
            dst,
        }
        .serialize(&mut bytes);
        NodeReplyHeader {
            option: NodeReplyOption::LEAF,
            data_len: reply_len,
        }
        .serialize(&mut bytes);
        bytes.extend(std::iter::repeat(0u8).take(reply_len as usize));
        Frame { bytes }
    }

    /// An aggregated Node-Reply packing `replies` in order, option `0xA0`
    /// plus `0x40` if `more_pending` is set.
    pub fn node_reply_aggregated(
        src: Address,
        dst: Address,
        replies: &[EmbeddedMiniReply],
        more_pending: bool,
    ) -> Self {
        let payload_len: usize = replies.iter().map(|r| r.encoded_len()).sum();
        let mut bytes = Vec::with_capacity(MacHeader::LEN + NodeReplyHeader::LEN + payload_len);
        MacHeader {
            msg_type: MsgType::NodeReply,
            src,
            dst,
        }
        .serialize(&mut bytes);
        let mut option = NodeReplyOption::AGGREGATED | NodeReplyOption::LEAF;
        if more_pending {
            option |= NodeReplyOption::MORE_DATA;
        }
        NodeReplyHeader {
            option,
            data_len: payload_len as u8,
        }
        .serialize(&mut bytes);
        for r in replies {
            r.serialize(&mut bytes);
        }
        Frame { bytes }
    }

    /// Wrap raw bytes already known to be a valid frame (used when relaying
    /// a single pending frame verbatim after `set_dst`).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Frame { bytes }
    }
}

/// The tagged union the MAC state machine actually switches on.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Message {
    Join {
        src: Address,
    },
    JoinAck {
        src: Address,
        dst: Address,
        header: JoinAckHeader,
    },
    JoinCfm {
        src: Address,
        dst: Address,
    },
    SeekJoin {
        src: Address,
        header: SeekJoinHeader,
    },
    GatewayReq {
        src: Address,
        header: GatewayReqHeader,
    },
    NodeReply {
        src: Address,
        dst: Address,
        header: NodeReplyHeader,
        payload: Vec<u8>,
    },
}

impl Message {
    pub fn src(&self) -> Address {
        match self {
            Message::Join { src } => *src,
            Message::JoinAck { src, .. } => *src,
            Message::JoinCfm { src, .. } => *src,
            Message::SeekJoin { src, .. } => *src,
            Message::GatewayReq { src, .. } => *src,
            Message::NodeReply { src, .. } => *src,
        }
    }

    pub fn dst(&self) -> Address {
        match self {
            Message::Join { .. } => crate::address::BROADCAST,
            Message::JoinAck { dst, .. } => *dst,
            Message::JoinCfm { dst, .. } => *dst,
            Message::SeekJoin { .. } => crate::address::BROADCAST,
            Message::GatewayReq { .. } => crate::address::BROADCAST,
            Message::NodeReply { dst, .. } => *dst,
        }
    }

    pub fn is_node_reply(&self) -> bool {
        matches!(self, Message::NodeReply { .. })
    }
}

/// Decode a complete frame into the tagged union the MAC dispatches on.
/// Silently-droppable decode errors are all folded into
/// `SimError::MalformedPacket`.
pub fn decode(bytes: &[u8]) -> Result<Message, SimError> {
    let (mac, used) = MacHeader::deserialize(bytes)?;
    let body = &bytes[used..];
    let message = match mac.msg_type {
        MsgType::Join => Message::Join { src: mac.src },
        MsgType::JoinAck => {
            let (header, _) = JoinAckHeader::deserialize(body)?;
            Message::JoinAck {
                src: mac.src,
                dst: mac.dst,
                header,
            }
        }
        MsgType::JoinCfm => Message::JoinCfm {
            src: mac.src,
            dst: mac.dst,
        },
        MsgType::SeekJoin => {
            let (header, _) = SeekJoinHeader::deserialize(body)?;
            Message::SeekJoin {
                src: mac.src,
                header,
            }
        }
        MsgType::GatewayReq => {
            let (header, _) = GatewayReqHeader::deserialize(body)?;
            Message::GatewayReq {
                src: mac.src,
                header,
            }
        }
        MsgType::NodeReply => {
            let (header, used2) = NodeReplyHeader::deserialize(body)?;
            let payload = &body[used2..];
            if payload.len() != header.data_len as usize {
                return Err(SimError::MalformedPacket);
            }
            Message::NodeReply {
                src: mac.src,
                dst: mac.dst,
                header,
                payload: payload.to_vec(),
            }
        }
    };
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_round_trips() {
        let frame = Frame::join(Address::new(5));
        let msg = decode(frame.as_bytes()).unwrap();
        assert_eq!(msg, Message::Join { src: Address::new(5) });
    }

    #[test]
    fn set_dst_rewrites_in_place() {
        let mut frame = Frame::node_reply_leaf(Address::new(1), Address::new(2), 4);
        frame.set_dst(Address::new(9));
        let msg = decode(frame.as_bytes()).unwrap();
        assert_eq!(msg.dst(), Address::new(9));
        assert_eq!(msg.src(), Address::new(1));
    }

    #[test]
    fn node_reply_leaf_has_correct_option_and_len() {
        let frame = Frame::node_reply_leaf(Address::new(1), Address::new(2), 6);
        match decode(frame.as_bytes()).unwrap() {
            Message::NodeReply { header, payload, .. } => {
                assert_eq!(header.option, NodeReplyOption::LEAF);
                assert_eq!(payload.len(), 6);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn aggregated_node_reply_round_trips() {
        let replies = vec![
            EmbeddedMiniReply { src: Address::new(1), data: vec![0; 10] },
            EmbeddedMiniReply { src: Address::new(2), data: vec![0; 20] },
        ];
        let frame = Frame::node_reply_aggregated(Address::new(3), Address::new(4), &replies, true);
        match decode(frame.as_bytes()).unwrap() {
            Message::NodeReply { header, payload, .. } => {
                assert!(header.is_aggregated());
                assert!(header.has_more_data());
                let decoded = codec::decode_embedded_replies(&payload).unwrap();
                assert_eq!(decoded, replies);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn truncated_frame_is_malformed() {
        let mut bytes = Vec::new();
        MacHeader {
            msg_type: MsgType::JoinAck,
            src: Address::new(1),
            dst: Address::new(2),
        }
        .serialize(&mut bytes);
        // Missing the 3-byte Join-Ack sub-header entirely.
        assert_eq!(decode(&bytes), Err(SimError::MalformedPacket));
    }

    #[test]
    fn node_reply_with_inconsistent_len_is_malformed() {
        let mut bytes = Vec::new();
        MacHeader {
            msg_type: MsgType::NodeReply,
            src: Address::new(1),
            dst: Address::new(2),
        }
        .serialize(&mut bytes);
        NodeReplyHeader { option: NodeReplyOption::empty(), data_len: 5 }.serialize(&mut bytes);
        bytes.extend_from_slice(&[0, 0]); // only 2 bytes, claims 5
        assert_eq!(decode(&bytes), Err(SimError::MalformedPacket));
    }
}
