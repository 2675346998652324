//! A target connected directly over USB (CRTP-over-USB), bypassing the
//! radio entirely. Not multiplexed: one `DirectUSBTarget` is exclusively
//! owned by one [`crate::connection::Connection`].

use core::time::Duration;

use crate::error::{LinkError, Result};
use crate::packet::Packet;

const CRTP_MAXSIZE: usize = 32;
const BULK_OUT_ENDPOINT: u8 = 0x01;
const BULK_IN_ENDPOINT: u8 = 0x81;

pub struct DirectUSBTarget {
    index: usize,
    device_handle: rusb::DeviceHandle<rusb::GlobalContext>,
}

impl DirectUSBTarget {
    pub(crate) fn open(device: rusb::Device<rusb::GlobalContext>, index: usize) -> Result<Self> {
        let device_handle = device.open()?;
        Ok(DirectUSBTarget {
            index,
            device_handle,
        })
    }

    pub fn uri(&self) -> String {
        format!("usb://{}", self.index)
    }

    /// Synchronously writes the packet's wire bytes to the USB endpoint.
    pub fn send(&self, packet: &Packet) -> Result<()> {
        self.device_handle
            .write_bulk(BULK_OUT_ENDPOINT, &packet.raw(), Duration::from_secs(1))?;
        Ok(())
    }

    /// Reads one packet. `blocking` selects an indefinite wait (modeled here
    /// as a long timeout, since `rusb` has no infinite-timeout sentinel)
    /// versus the short ~100ms timeout used for non-blocking polling.
    pub fn recv(&self, blocking: bool) -> Result<Packet> {
        let timeout = if blocking {
            Duration::from_secs(3600)
        } else {
            Duration::from_millis(100)
        };

        let mut buf = [0u8; CRTP_MAXSIZE];
        match self.device_handle.read_bulk(BULK_IN_ENDPOINT, &mut buf, timeout) {
            Ok(n) => Packet::from_wire_bytes(&buf[..n]),
            Err(rusb::Error::Timeout) => Ok(Packet::empty()),
            Err(rusb::Error::NoDevice) => Err(LinkError::DeviceLost),
            Err(e) => Err(LinkError::Usb(e)),
        }
    }
}
