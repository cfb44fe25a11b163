//! Fixed-layout wire headers.
//!
//! Every decoder returns `(value, bytes_read)` or
//! `Err(SimError::MalformedPacket)`; none of them panic on malformed input.
//!
//! All integers are big-endian.

use byteorder::{BigEndian, ByteOrder};

use crate::address::Address;
use crate::error::SimError;

type DecodeResult<T> = Result<(T, usize), SimError>;

fn need(buf: &[u8], len: usize) -> Result<(), SimError> {
    if buf.len() < len {
        Err(SimError::MalformedPacket)
    } else {
        Ok(())
    }
}

/// MAC header message types.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum MsgType {
    Join = 1,
    JoinAck = 2,
    JoinCfm = 3,
    SeekJoin = 4,
    GatewayReq = 6,
    NodeReply = 7,
}

impl MsgType {
    fn from_u8(v: u8) -> Result<Self, SimError> {
        match v {
            1 => Ok(MsgType::Join),
            2 => Ok(MsgType::JoinAck),
            3 => Ok(MsgType::JoinCfm),
            4 => Ok(MsgType::SeekJoin),
            6 => Ok(MsgType::GatewayReq),
            7 => Ok(MsgType::NodeReply),
            _ => Err(SimError::MalformedPacket),
        }
    }
}

/// MAC header (5 bytes, always present): `type:u8, src:u16, dst:u16`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct MacHeader {
    pub msg_type: MsgType,
    pub src: Address,
    pub dst: Address,
}

impl MacHeader {
    pub const LEN: usize = 5;

    pub fn serialize(&self, buf: &mut Vec<u8>) {
        buf.push(self.msg_type as u8);
        buf.extend_from_slice(&self.src.serialize());
        buf.extend_from_slice(&self.dst.serialize());
    }

    pub fn deserialize(buf: &[u8]) -> DecodeResult<Self> {
        need(buf, Self::LEN)?;
        let msg_type = MsgType::from_u8(buf[0])?;
        let src = Address::new(BigEndian::read_u16(&buf[1..3]));
        let dst = Address::new(BigEndian::read_u16(&buf[3..5]));
        Ok((MacHeader { msg_type, src, dst }, Self::LEN))
    }
}

/// Join-Ack header (3 bytes, follows the MAC header when `type == JOIN_ACK`).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct JoinAckHeader {
    pub hops: u8,
    pub num_children: u8,
    /// Magnitude of the received RSSI; the real value is `-rssi_magnitude`.
    pub rssi_magnitude: u8,
}

impl JoinAckHeader {
    pub const LEN: usize = 3;

    /// Build from a signed dBm value, storing its magnitude.
    pub fn from_rssi_dbm(hops: u8, num_children: u8, rssi_dbm: i16) -> Self {
        JoinAckHeader {
            hops,
            num_children,
            rssi_magnitude: rssi_dbm.unsigned_abs().min(u8::MAX as u16) as u8,
        }
    }

    /// The signed RSSI this header carries, in dBm.
    pub fn rssi_dbm(&self) -> i16 {
        -(self.rssi_magnitude as i16)
    }

    pub fn serialize(&self, buf: &mut Vec<u8>) {
        buf.push(self.hops);
        buf.push(self.num_children);
        buf.push(self.rssi_magnitude);
    }

    pub fn deserialize(buf: &[u8]) -> DecodeResult<Self> {
        need(buf, Self::LEN)?;
        Ok((
            JoinAckHeader {
                hops: buf[0],
                num_children: buf[1],
                rssi_magnitude: buf[2],
            },
            Self::LEN,
        ))
    }
}

/// Seek-Join header (8 bytes).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct SeekJoinHeader {
    pub private_channel: u8,
    pub parent_channel: u8,
    pub num_children: u8,
    pub max_backoff: u8,
    pub next_accept_join_s: u32,
}

impl SeekJoinHeader {
    pub const LEN: usize = 8;

    pub fn serialize(&self, buf: &mut Vec<u8>) {
        buf.push(self.private_channel);
        buf.push(self.parent_channel);
        buf.push(self.num_children);
        buf.push(self.max_backoff);
        let mut tmp = [0u8; 4];
        BigEndian::write_u32(&mut tmp, self.next_accept_join_s);
        buf.extend_from_slice(&tmp);
    }

    pub fn deserialize(buf: &[u8]) -> DecodeResult<Self> {
        need(buf, Self::LEN)?;
        Ok((
            SeekJoinHeader {
                private_channel: buf[0],
                parent_channel: buf[1],
                num_children: buf[2],
                max_backoff: buf[3],
                next_accept_join_s: BigEndian::read_u32(&buf[4..8]),
            },
            Self::LEN,
        ))
    }
}

/// Gateway-Req header (7 bytes). `option` is an opaque bit-field carried
/// verbatim; no new meaning is assigned to its bits here.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct GatewayReqHeader {
    pub option: u8,
    pub channel: u8,
    pub next_req_time_s: u32,
    pub max_backoff: u8,
}

impl GatewayReqHeader {
    pub const LEN: usize = 7;

    pub fn serialize(&self, buf: &mut Vec<u8>) {
        buf.push(self.option);
        buf.push(self.channel);
        let mut tmp = [0u8; 4];
        BigEndian::write_u32(&mut tmp, self.next_req_time_s);
        buf.extend_from_slice(&tmp);
        buf.push(self.max_backoff);
    }

    pub fn deserialize(buf: &[u8]) -> DecodeResult<Self> {
        need(buf, Self::LEN)?;
        Ok((
            GatewayReqHeader {
                option: buf[0],
                channel: buf[1],
                next_req_time_s: BigEndian::read_u32(&buf[2..6]),
                max_backoff: buf[6],
            },
            Self::LEN,
        ))
    }
}

bitflags::bitflags! {
    /// Node-Reply option bits.
    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    pub struct NodeReplyOption: u8 {
        /// Payload is an aggregation of embedded mini-replies.
        const AGGREGATED = 0x80;
        /// More pending data follows in the next round.
        const MORE_DATA = 0x40;
        /// A single leaf's own reply (not a relay/aggregate).
        const LEAF = 0x20;
    }
}

/// Node-Reply header (2 bytes): `option:u8, data_len:u8`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct NodeReplyHeader {
    pub option: NodeReplyOption,
    pub data_len: u8,
}

impl NodeReplyHeader {
    pub const LEN: usize = 2;

    pub fn is_aggregated(&self) -> bool {
        self.option.contains(NodeReplyOption::AGGREGATED)
    }

    pub fn has_more_data(&self) -> bool {
        self.option.contains(NodeReplyOption::MORE_DATA)
    }

    pub fn serialize(&self, buf: &mut Vec<u8>) {
        buf.push(self.option.bits());
        buf.push(self.data_len);
    }

    pub fn deserialize(buf: &[u8]) -> DecodeResult<Self> {
        need(buf, Self::LEN)?;
        Ok((
            NodeReplyHeader {
                option: NodeReplyOption::from_bits_truncate(buf[0]),
                data_len: buf[1],
            },
            Self::LEN,
        ))
    }
}

/// Embedded Mini-Reply header (3 bytes), repeated inside an aggregated
/// Node-Reply payload: `src:u16, data_len:u8`, followed by `data_len` opaque
/// bytes.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct EmbeddedMiniReply {
    pub src: Address,
    pub data: Vec<u8>,
}

impl EmbeddedMiniReply {
    pub const HEADER_LEN: usize = 3;

    pub fn serialize(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.src.serialize());
        buf.push(self.data.len() as u8);
        buf.extend_from_slice(&self.data);
    }

    pub fn encoded_len(&self) -> usize {
        Self::HEADER_LEN + self.data.len()
    }

    /// Decode one embedded mini-reply, returning the bytes consumed. Fails
    /// if the advertised `data_len` doesn't fit in what's left of `buf`.
    pub fn deserialize(buf: &[u8]) -> DecodeResult<Self> {
        need(buf, Self::HEADER_LEN)?;
        let src = Address::new(BigEndian::read_u16(&buf[0..2]));
        let data_len = buf[2] as usize;
        need(buf, Self::HEADER_LEN + data_len)?;
        let data = buf[Self::HEADER_LEN..Self::HEADER_LEN + data_len].to_vec();
        Ok((EmbeddedMiniReply { src, data }, Self::HEADER_LEN + data_len))
    }
}

/// Decode every embedded mini-reply packed into an aggregated Node-Reply
/// payload, in order. Fails the whole decode (dropping the frame) if any
/// individual mini-reply is malformed or the trailing bytes don't form a
/// whole number of mini-replies.
pub fn decode_embedded_replies(mut body: &[u8]) -> Result<Vec<EmbeddedMiniReply>, SimError> {
    let mut replies = Vec::new();
    while !body.is_empty() {
        let (reply, used) = EmbeddedMiniReply::deserialize(body)?;
        body = &body[used..];
        replies.push(reply);
    }
    Ok(replies)
}
