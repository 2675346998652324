//! Fixed-layout link-control packet.
//!
//! Header byte bits: `[7:4]` port, `[1:0]` channel, bit 2 safelink-down
//! parity, bit 1 safelink-up parity (overwritten by the worker in safelink
//! mode right before transmission, see [`crate::dongle_worker`]).

use std::cmp::Ordering;

use crate::error::{LinkError, Result};

pub const MAX_PAYLOAD_LEN: usize = 30;

/// Default priority assigned to packets that don't specify one.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Port/channel reserved by the target for RSSI reports riding on an ack.
pub const RSSI_PORT: u8 = 15;
pub const RSSI_CHANNEL: u8 = 3;

const SAFELINK_UP_MASK: u8 = 0x02;
const SAFELINK_DOWN_MASK: u8 = 0x04;

/// One link-layer packet: a header byte plus up to 30 bytes of payload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
pub struct Packet {
    header: u8,
    payload: Vec<u8>,
    /// Enqueue sequence number, assigned by whichever queue first accepts
    /// this packet. Used as a tiebreaker when priorities are equal.
    pub seq: u64,
    /// Caller-assigned rank; higher sorts first. Defaults to
    /// [`DEFAULT_PRIORITY`].
    pub priority: i32,
}

impl Packet {
    /// Builds a packet from a port (0..=15), channel (0..=3) and payload
    /// (at most [`MAX_PAYLOAD_LEN`] bytes).
    pub fn new(port: u8, channel: u8, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(LinkError::PayloadTooLarge(payload.len()));
        }
        let header = ((port & 0x0F) << 4) | (channel & 0x03);
        Ok(Packet {
            header,
            payload,
            seq: 0,
            priority: DEFAULT_PRIORITY,
        })
    }

    /// An empty packet (header 0, no payload), returned by non-blocking
    /// `recv` calls when no packet is ready. Not a valid wire frame; never
    /// transmitted.
    pub fn empty() -> Self {
        Packet {
            header: 0,
            payload: Vec::new(),
            seq: 0,
            priority: DEFAULT_PRIORITY,
        }
    }

    /// The one-byte `{0xFF}` ping frame used to elicit an ack when the send
    /// queue is empty.
    pub fn ping() -> Self {
        Packet {
            header: 0xFF,
            payload: Vec::new(),
            seq: 0,
            priority: DEFAULT_PRIORITY,
        }
    }

    /// The three-byte `{0xFF, 0x05, 0x01}` safelink handshake frame.
    pub fn safelink_enable() -> Self {
        Packet {
            header: 0xFF,
            payload: vec![0x05, 0x01],
            seq: 0,
            priority: DEFAULT_PRIORITY,
        }
    }

    /// Parses a raw frame (a radio ack payload, or bytes read off the direct
    /// USB endpoint) into a `Packet`.
    pub fn from_wire_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Packet {
                header: 0,
                payload: Vec::new(),
                seq: 0,
                priority: DEFAULT_PRIORITY,
            });
        }
        if bytes.len() - 1 > MAX_PAYLOAD_LEN {
            return Err(LinkError::PayloadTooLarge(bytes.len() - 1));
        }
        Ok(Packet {
            header: bytes[0],
            payload: bytes[1..].to_vec(),
            seq: 0,
            priority: DEFAULT_PRIORITY,
        })
    }

    pub fn port(&self) -> u8 {
        self.header >> 4
    }

    pub fn channel(&self) -> u8 {
        self.header & 0x03
    }

    /// The two safelink parity bits as `(down << 1) | up`.
    pub fn safelink_bits(&self) -> u8 {
        let up = (self.header & SAFELINK_UP_MASK != 0) as u8;
        let down = (self.header & SAFELINK_DOWN_MASK != 0) as u8;
        (down << 1) | up
    }

    pub fn safelink_up_bit(&self) -> bool {
        self.header & SAFELINK_UP_MASK != 0
    }

    pub fn safelink_down_bit(&self) -> bool {
        self.header & SAFELINK_DOWN_MASK != 0
    }

    /// Overwrites the header's safelink parity bits with `(up << 1) | down`.
    pub fn set_safelink_bits(&mut self, up: bool, down: bool) {
        self.header &= !(SAFELINK_DOWN_MASK | SAFELINK_UP_MASK);
        if up {
            self.header |= SAFELINK_UP_MASK;
        }
        if down {
            self.header |= SAFELINK_DOWN_MASK;
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// True iff this packet is a reserved RSSI report (port 15, channel 3),
    /// rather than application data.
    pub fn is_rssi_report(&self) -> bool {
        self.port() == RSSI_PORT && self.channel() == RSSI_CHANNEL
    }

    /// Wire representation: header byte followed by payload.
    pub fn raw(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.payload.len());
        out.push(self.header);
        out.extend_from_slice(&self.payload);
        out
    }
}

impl PartialOrd for Packet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Packet {
    /// `self < other` iff `self.priority < other.priority`, or priorities
    /// are equal and `self.seq > other.seq`. A `BinaryHeap<Packet>` therefore
    /// pops in (priority desc, seq asc) order.
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}
