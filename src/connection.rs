//! Public handle for callers: construct from a URI, send/recv packets, read
//! statistics.

use std::sync::Arc;
use std::time::Duration;

use crate::connection_state::{ConnectionState, StatisticsSnapshot};
use crate::device_manager::DeviceManager;
use crate::error::{LinkError, Result};
use crate::packet::Packet;
use crate::radio::Channel;
use crate::uri::{self, AddressSelector, DongleSelector, ParsedUri};
use crate::usb_target::DirectUSBTarget;

/// Options for opening a radio connection. `use_safelink` defaults to
/// `false`; `send_queue_bound` defaults to unbounded (no back-pressure).
#[derive(Debug, Clone, Copy, Default)]
pub struct Settings {
    pub use_safelink: bool,
    pub send_queue_bound: Option<usize>,
}

enum Backend {
    Usb(DirectUSBTarget),
    Radio {
        dongle_index: usize,
        state: Arc<ConnectionState>,
    },
}

/// One logical link to one target, over USB-direct or a shared radio
/// dongle.
pub struct Connection {
    uri: String,
    backend: Backend,
}

impl Connection {
    /// Opens `uri` with default settings.
    pub fn open(uri: &str) -> Result<Self> {
        Self::open_with_settings(uri, Settings::default())
    }

    /// Opens `uri`. For `radio://` uris, `settings` controls safelink and
    /// the send-queue bound.
    pub fn open_with_settings(uri_str: &str, settings: Settings) -> Result<Self> {
        let parsed = uri::parse(uri_str)?;

        let backend = match parsed {
            ParsedUri::Usb { index } => {
                let manager = DeviceManager::instance().lock().unwrap();
                let target = manager.open_usb_target(index)?;
                Backend::Usb(target)
            }
            ParsedUri::Radio {
                dongle,
                channel,
                datarate,
                address,
            } => {
                let address = match address {
                    AddressSelector::Explicit(a) => a,
                    // A bare broadcast/sniffing address; same default the
                    // original scan() substitutes when none is given.
                    AddressSelector::Any => [0xE7; 5],
                };
                let channel = Channel::from_number(channel)?;
                let state = Arc::new(ConnectionState::new(
                    address,
                    channel,
                    datarate.to_datarate(),
                    settings.use_safelink,
                    settings.send_queue_bound,
                ));

                let dongle_index = {
                    let mut manager = DeviceManager::instance().lock().unwrap();
                    let requested = match dongle {
                        DongleSelector::Index(i) => Some(i),
                        DongleSelector::Any => None,
                    };
                    manager.attach_radio(state.clone(), requested)?
                };

                Backend::Radio {
                    dongle_index,
                    state,
                }
            }
        };

        Ok(Connection {
            uri: uri_str.to_string(),
            backend,
        })
    }

    /// Enumerates direct-USB targets as `usb://i`, then probes every
    /// (datarate, channel) pair in parallel for a live target at `address`
    /// (defaulting to `E7E7E7E7E7`), returning the URIs that acked.
    pub fn scan(address: Option<&str>) -> Result<Vec<String>> {
        crate::scan::scan(address)
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Enqueues (radio) or synchronously writes (USB-direct) one packet.
    /// Never blocks on the dongle worker.
    pub fn send(&self, mut packet: Packet) -> Result<()> {
        match &self.backend {
            Backend::Usb(target) => target.send(&packet),
            Backend::Radio { state, .. } => {
                if state.is_device_lost() {
                    return Err(LinkError::DeviceLost);
                }
                let mut queue = state.send_queue.heap.lock().unwrap();
                if let Some(limit) = state.send_queue_bound {
                    if queue.len() >= limit {
                        return Err(LinkError::QueueBoundExceeded { limit });
                    }
                }
                packet.seq = state
                    .statistics
                    .enqueued_count
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                queue.push(packet);
                Ok(())
            }
        }
    }

    /// Receives one packet. If `blocking`, waits until one is available
    /// (radio) or indefinitely (USB); otherwise returns an empty packet
    /// when none is ready.
    pub fn recv(&self, blocking: bool) -> Result<Packet> {
        match &self.backend {
            Backend::Usb(target) => target.recv(blocking),
            Backend::Radio { state, .. } => {
                if state.is_device_lost() {
                    return Err(LinkError::DeviceLost);
                }
                let queue = &state.recv_queue;
                if blocking {
                    let mut heap = queue.heap.lock().unwrap();
                    while heap.is_empty() {
                        heap = queue.not_empty.wait(heap).unwrap();
                    }
                    Ok(heap.pop().unwrap())
                } else {
                    let mut heap = queue.heap.lock().unwrap();
                    Ok(heap.pop().unwrap_or_else(Packet::empty))
                }
            }
        }
    }

    /// Receives one packet, giving up after `timeout` if none arrives.
    /// Radio-only convenience built from the blocking primitive in
    /// `recv`; USB-direct already has its own short-timeout semantics.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Packet> {
        match &self.backend {
            Backend::Usb(target) => target.recv(false),
            Backend::Radio { state, .. } => {
                if state.is_device_lost() {
                    return Err(LinkError::DeviceLost);
                }
                let queue = &state.recv_queue;
                let heap = queue.heap.lock().unwrap();
                let (mut heap, result) = queue
                    .not_empty
                    .wait_timeout_while(heap, timeout, |h| h.is_empty())
                    .unwrap();
                if result.timed_out() {
                    Ok(Packet::empty())
                } else {
                    Ok(heap.pop().unwrap())
                }
            }
        }
    }

    /// Statistics for this connection. USB-direct connections don't keep
    /// per-packet counters and report a zeroed snapshot.
    pub fn statistics(&self) -> StatisticsSnapshot {
        match &self.backend {
            Backend::Usb(_) => StatisticsSnapshot::default(),
            Backend::Radio { state, .. } => state.statistics.snapshot(),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Backend::Usb needs no explicit handling here: it owns its
        // DirectUSBTarget outright (not shared via DeviceManager), so the
        // struct's own field drop closes the USB handle.
        if let Backend::Radio { dongle_index, state } = &self.backend {
            let mut manager = DeviceManager::instance().lock().unwrap();
            manager.detach_radio(*dongle_index, state.id);
        }
    }
}
