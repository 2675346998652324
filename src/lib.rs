//! Host-side link layer for a fleet of small flying robots reachable either
//! directly over USB or multiplexed over a handful of Crazyradio USB
//! dongles.
//!
//! [`Radio`] drives one physical dongle. [`DongleWorkerHandle`] owns a
//! worker thread that time-division multiplexes every attached connection
//! that shares a dongle, drives the safelink sliding-bit protocol, and
//! mediates the per-connection send/receive queues. [`DeviceManager`] is the
//! process-wide registry that starts/stops workers on demand and routes new
//! connections to the right dongle. [`Connection`] is the facade
//! application code uses.
//!
//! ```no_run
//! use crazyflie_link::{Connection, Packet};
//!
//! let con = Connection::open("radio://0/80/2M/E7E7E7E7E7")?;
//! con.send(Packet::ping())?;
//! let reply = con.recv(true)?;
//! println!("{:?}", reply);
//! # Ok::<(), crazyflie_link::LinkError>(())
//! ```

#[cfg(feature = "packet_capture")]
pub mod capture;
mod connection;
mod connection_state;
mod device_manager;
mod dongle_worker;
mod error;
mod packet;
pub mod radio;
mod scan;
mod uri;
mod usb_target;

pub use connection::{Connection, Settings};
pub use connection_state::{ConnectionId, Statistics, StatisticsSnapshot};
pub use device_manager::DeviceManager;
pub use dongle_worker::DongleWorkerHandle;
pub use error::{LinkError, Result};
pub use packet::{Packet, DEFAULT_PRIORITY, MAX_PAYLOAD_LEN, RSSI_CHANNEL, RSSI_PORT};
pub use radio::{Ack, Channel, Datarate, Power, Radio, RadioTransport};
pub use usb_target::DirectUSBTarget;
