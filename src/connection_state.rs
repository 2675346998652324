//! Per-logical-connection state shared between a [`crate::connection::Connection`]
//! facade and the [`crate::dongle_worker::DongleWorker`] that services it.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Condvar, Mutex};

use crate::packet::Packet;
use crate::radio::{Channel, Datarate};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity for a `ConnectionState`, used as the key inside a
/// [`crate::dongle_worker::DongleWorker`]'s connection set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Monotonic counters a caller can poll to infer liveness.
#[derive(Debug, Default)]
pub struct Statistics {
    pub enqueued_count: AtomicU64,
    pub sent_count: AtomicU64,
    pub ack_count: AtomicU64,
    pub receive_count: AtomicU64,
    pub rssi_latest: AtomicU8,
}

/// A read-only snapshot of [`Statistics`], taken with relaxed loads. Tearing
/// across fields (one counter reflecting a slightly newer pass than another)
/// is expected and tolerated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub enqueued_count: u64,
    pub sent_count: u64,
    pub ack_count: u64,
    pub receive_count: u64,
    pub rssi_latest: u8,
}

impl Statistics {
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            enqueued_count: self.enqueued_count.load(Ordering::Relaxed),
            sent_count: self.sent_count.load(Ordering::Relaxed),
            ack_count: self.ack_count.load(Ordering::Relaxed),
            receive_count: self.receive_count.load(Ordering::Relaxed),
            rssi_latest: self.rssi_latest.load(Ordering::Relaxed),
        }
    }
}

/// Safelink sliding-bit state. Mutated only by the owning `DongleWorker`.
#[derive(Debug, Default)]
pub struct SafelinkState {
    pub initialized: bool,
    pub up: bool,
    pub down: bool,
}

/// A bounded (or unbounded) priority queue of packets guarded by a mutex,
/// and for the receive side a condvar so `recv(blocking=true)` can wait
/// without polling.
#[derive(Debug, Default)]
pub struct PacketQueue {
    pub heap: Mutex<BinaryHeap<Packet>>,
    pub not_empty: Condvar,
}

impl PacketQueue {
    pub fn push_notify(&self, packet: Packet) {
        let mut heap = self.heap.lock().unwrap();
        heap.push(packet);
        self.not_empty.notify_one();
    }

    pub fn len(&self) -> usize {
        self.heap.lock().unwrap().len()
    }
}

/// Per-logical-connection state. `address`, `channel`, `datarate` and
/// `use_safelink` are fixed at construction; everything else evolves under
/// the locks documented on each field.
pub struct ConnectionState {
    pub id: ConnectionId,
    pub address: [u8; 5],
    pub channel: Channel,
    pub datarate: Datarate,
    pub use_safelink: bool,

    pub safelink: Mutex<SafelinkState>,
    pub send_queue: PacketQueue,
    pub recv_queue: PacketQueue,
    pub statistics: Statistics,

    /// Set by the worker on transient USB errors; a persistently dead
    /// dongle surfaces `LinkError::DeviceLost` to the facade.
    pub device_lost: AtomicBool,

    /// Send-queue bound from `Settings::send_queue_bound`; `None` means
    /// unbounded, the default.
    pub send_queue_bound: Option<usize>,
}

impl ConnectionState {
    pub fn new(
        address: [u8; 5],
        channel: Channel,
        datarate: Datarate,
        use_safelink: bool,
        send_queue_bound: Option<usize>,
    ) -> Self {
        ConnectionState {
            id: ConnectionId::next(),
            address,
            channel,
            datarate,
            use_safelink,
            safelink: Mutex::new(SafelinkState::default()),
            send_queue: PacketQueue::default(),
            recv_queue: PacketQueue::default(),
            statistics: Statistics::default(),
            device_lost: AtomicBool::new(false),
            send_queue_bound,
        }
    }

    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionState")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("channel", &self.channel)
            .field("datarate", &self.datarate)
            .field("use_safelink", &self.use_safelink)
            .finish()
    }
}
