//! Thin driver over one physical Crazyradio USB dongle.
//!
//! `Radio` caches the last value it set for address/channel/datarate/ack so
//! [`crate::dongle_worker::DongleWorker`] can skip redundant USB control
//! transfers, and implements [`RadioTransport`] so the worker can be tested
//! against a fake.

use core::time::Duration;
use std::fmt;

#[cfg(feature = "packet_capture")]
use crate::capture;
use crate::error::{LinkError, Result};

const CRAZYRADIO_VID: u16 = 0x1915;
const CRAZYRADIO_PID: u16 = 0x7777;

enum UsbCommand {
    SetRadioChannel = 0x01,
    SetRadioAddress = 0x02,
    SetDataRate = 0x03,
    SetRadioPower = 0x04,
    SetRadioArd = 0x05,
    SetRadioArc = 0x06,
    AckEnable = 0x10,
    SetContCarrier = 0x20,
    LaunchBootloader = 0xff,
}

/// A radio channel, 0..=125.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Channel(pub(crate) u8);

impl Channel {
    pub fn from_number(channel: u8) -> Result<Self> {
        if channel <= 125 {
            Ok(Channel(channel))
        } else {
            Err(LinkError::InvalidUri(format!(
                "channel {} out of range 0..=125",
                channel
            )))
        }
    }

    pub fn number(&self) -> u8 {
        self.0
    }
}

/// Over-the-air bit rate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Datarate {
    Dr250K = 0,
    Dr1M = 1,
    Dr2M = 2,
}

impl Datarate {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "250K" => Ok(Datarate::Dr250K),
            "1M" => Ok(Datarate::Dr1M),
            "2M" => Ok(Datarate::Dr2M),
            other => Err(LinkError::InvalidUri(format!("unknown datarate {}", other))),
        }
    }
}

impl fmt::Display for Datarate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Datarate::Dr250K => "250K",
            Datarate::Dr1M => "1M",
            Datarate::Dr2M => "2M",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Power {
    Pm18dBm = 0,
    Pm12dBm = 1,
    Pm6dBm = 2,
    P0dBm = 3,
}

/// Result of one `send_packet` transmission.
#[derive(Debug, Clone, Default)]
pub struct Ack {
    /// Whether an ack was received for this transmission.
    pub received: bool,
    /// Ack payload bytes, if any.
    pub data: Vec<u8>,
    /// Number of retries the dongle performed before getting the ack (or
    /// exhausting its retry budget).
    pub retry: usize,
    /// Whether the dongle's power detector tripped on the ack (carrier
    /// detect). Not all firmware versions report this.
    pub power_detector: bool,
    /// RSSI of the ack packet in dBm, if the firmware reports it.
    pub rssi_dbm: Option<u8>,
}

impl Ack {
    pub fn length(&self) -> usize {
        self.data.len()
    }
}

/// Operations a [`crate::dongle_worker::DongleWorker`] needs from a radio.
///
/// Implemented by [`Radio`] for the real hardware and by a `FakeRadio` test
/// double in the test suite, so the multiplexing state machine can be
/// exercised without a physical dongle.
pub trait RadioTransport {
    fn set_channel(&mut self, channel: Channel) -> Result<()>;
    fn set_datarate(&mut self, datarate: Datarate) -> Result<()>;
    fn set_address(&mut self, address: [u8; 5]) -> Result<()>;
    fn set_ack_enabled(&mut self, enabled: bool) -> Result<()>;

    fn channel(&self) -> Option<Channel>;
    fn datarate(&self) -> Option<Datarate>;
    fn address(&self) -> Option<[u8; 5]>;
    fn ack_enabled(&self) -> Option<bool>;

    fn send_packet(&mut self, bytes: &[u8]) -> Result<Ack>;
}

/// Holds the USB connection to a Crazyradio dongle.
///
/// The connection is closed when this object goes out of scope.
pub struct Radio {
    device_handle: rusb::DeviceHandle<rusb::GlobalContext>,
    serial_hint: String,
    last_channel: Option<Channel>,
    last_datarate: Option<Datarate>,
    last_address: Option<[u8; 5]>,
    last_ack_enabled: Option<bool>,
}

fn find_crazyradios() -> Result<Vec<rusb::Device<rusb::GlobalContext>>> {
    let mut found = Vec::new();
    for device in rusb::devices()?.iter() {
        let device_desc = device.device_descriptor()?;
        if device_desc.vendor_id() == CRAZYRADIO_VID && device_desc.product_id() == CRAZYRADIO_PID
        {
            found.push(device);
        }
    }
    Ok(found)
}

impl Radio {
    /// Open the dongle at the given enumeration index (0-based, in USB
    /// enumeration order among Crazyradio devices only).
    pub fn open(index: usize) -> Result<Self> {
        let devices = find_crazyradios()?;
        let device = devices
            .into_iter()
            .nth(index)
            .ok_or(LinkError::DeviceNotPresent(index))?;
        Self::from_device(device)
    }

    /// Open the first Crazyradio detected.
    pub fn open_first() -> Result<Self> {
        Self::open(0)
    }

    /// List the serial numbers of all attached Crazyradio dongles, in
    /// enumeration order.
    pub fn list_serials() -> Result<Vec<String>> {
        let mut serials = Vec::new();
        for device in find_crazyradios()? {
            let handle = device.open()?;
            let desc = device.device_descriptor()?;
            let timeout = Duration::from_secs(1);
            let languages = handle.read_languages(timeout)?;
            let serial = languages
                .first()
                .and_then(|lang| {
                    handle
                        .read_serial_number_string(*lang, &desc, timeout)
                        .ok()
                })
                .unwrap_or_default();
            serials.push(serial);
        }
        Ok(serials)
    }

    /// Number of Crazyradio dongles currently attached.
    pub fn count() -> Result<usize> {
        Ok(find_crazyradios()?.len())
    }

    fn from_device(device: rusb::Device<rusb::GlobalContext>) -> Result<Self> {
        let device_handle = device.open()?;
        let desc = device.device_descriptor()?;
        let timeout = Duration::from_secs(1);
        let serial_hint = device_handle
            .read_languages(timeout)
            .ok()
            .and_then(|langs| langs.first().copied())
            .and_then(|lang| {
                device_handle
                    .read_serial_number_string(lang, &desc, timeout)
                    .ok()
            })
            .unwrap_or_default();

        Ok(Radio {
            device_handle,
            serial_hint,
            last_channel: None,
            last_datarate: None,
            last_address: None,
            last_ack_enabled: None,
        })
    }

    /// Serial number of the dongle, read from its USB string descriptor.
    pub fn serial(&self) -> Result<String> {
        Ok(self.serial_hint.clone())
    }

    fn write_control(&self, request: UsbCommand, value: u16, data: &[u8]) -> Result<()> {
        self.device_handle
            .write_control(0x40, request as u8, value, 0, data, Duration::from_secs(1))?;
        Ok(())
    }

    pub fn set_power(&mut self, power: Power) -> Result<()> {
        self.write_control(UsbCommand::SetRadioPower, power as u16, &[])
    }

    pub fn set_ard_time(&mut self, delay: Duration) -> Result<()> {
        if delay <= Duration::from_millis(4000) {
            let ard = (delay.as_millis() as u16 / 250).saturating_sub(1);
            self.write_control(UsbCommand::SetRadioArd, ard, &[])
        } else {
            Err(LinkError::InvalidUri("ard delay out of range".into()))
        }
    }

    pub fn set_ard_bytes(&mut self, nbytes: u8) -> Result<()> {
        if nbytes <= 32 {
            self.write_control(UsbCommand::SetRadioArd, 0x80 | nbytes as u16, &[])
        } else {
            Err(LinkError::InvalidUri("ard bytes out of range".into()))
        }
    }

    pub fn set_arc(&mut self, arc: usize) -> Result<()> {
        if arc <= 15 {
            self.write_control(UsbCommand::SetRadioArc, arc as u16, &[])
        } else {
            Err(LinkError::InvalidUri("arc out of range".into()))
        }
    }

    pub fn set_cont_carrier(&mut self, enable: bool) -> Result<()> {
        self.write_control(UsbCommand::SetContCarrier, enable as u16, &[])
    }

    /// Sends a packet across a range of channels and returns the channels
    /// that acked. Used for passive scanning.
    pub fn scan_channels(&mut self, start: Channel, stop: Channel, packet: &[u8]) -> Result<Vec<Channel>> {
        let mut result = Vec::new();
        for ch in start.0..=stop.0 {
            let channel = Channel::from_number(ch)?;
            self.set_channel(channel)?;
            let ack = self.send_packet(packet)?;
            if ack.received {
                result.push(channel);
            }
        }
        Ok(result)
    }

    /// Sends a packet with ack disabled and does not wait for a reply.
    pub fn send_packet_no_ack(&mut self, data: &[u8]) -> Result<()> {
        self.device_handle
            .write_bulk(0x01, data, Duration::from_secs(1))?;
        Ok(())
    }

    /// Consumes the radio and puts the dongle in bootloader mode.
    pub fn launch_bootloader(self) -> Result<()> {
        self.write_control(UsbCommand::LaunchBootloader, 0, &[])?;
        Ok(())
    }
}

impl RadioTransport for Radio {
    fn set_channel(&mut self, channel: Channel) -> Result<()> {
        self.write_control(UsbCommand::SetRadioChannel, channel.0 as u16, &[])?;
        self.last_channel = Some(channel);
        Ok(())
    }

    fn set_datarate(&mut self, datarate: Datarate) -> Result<()> {
        let value = datarate as u16;
        self.write_control(UsbCommand::SetDataRate, value, &[])?;
        self.last_datarate = Some(match value {
            0 => Datarate::Dr250K,
            1 => Datarate::Dr1M,
            _ => Datarate::Dr2M,
        });
        Ok(())
    }

    fn set_address(&mut self, address: [u8; 5]) -> Result<()> {
        self.write_control(UsbCommand::SetRadioAddress, 0, &address)?;
        self.last_address = Some(address);
        Ok(())
    }

    fn set_ack_enabled(&mut self, enabled: bool) -> Result<()> {
        self.write_control(UsbCommand::AckEnable, enabled as u16, &[])?;
        self.last_ack_enabled = Some(enabled);
        Ok(())
    }

    fn channel(&self) -> Option<Channel> {
        self.last_channel
    }

    fn datarate(&self) -> Option<Datarate> {
        self.last_datarate
    }

    fn address(&self) -> Option<[u8; 5]> {
        self.last_address
    }

    fn ack_enabled(&self) -> Option<bool> {
        self.last_ack_enabled
    }

    fn send_packet(&mut self, data: &[u8]) -> Result<Ack> {
        #[cfg(feature = "packet_capture")]
        if let (Some(channel), Some(address)) = (self.last_channel, self.last_address) {
            capture::capture_packet(capture::DIRECTION_TX, channel.0, &address, &self.serial_hint, data);
        }

        self.device_handle
            .write_bulk(0x01, data, Duration::from_secs(1))?;

        let mut received_data = [0u8; 33];
        let received = match self.device_handle.read_bulk(0x81, &mut received_data, Duration::from_secs(1)) {
            Ok(n) => n,
            Err(rusb::Error::Timeout) => {
                return Ok(Ack {
                    received: false,
                    ..Default::default()
                })
            }
            Err(rusb::Error::NoDevice) => return Err(LinkError::DeviceLost),
            Err(e) => return Err(LinkError::Usb(e)),
        };

        if received == 0 {
            return Ok(Ack {
                received: false,
                ..Default::default()
            });
        }

        let status = received_data[0];
        let ack_received = status & 0x01 != 0;
        let power_detector = status & 0x02 != 0;
        let retry = (status >> 4) as usize;
        let payload = received_data[1..received].to_vec();

        #[cfg(feature = "packet_capture")]
        if let (Some(channel), Some(address)) = (self.last_channel, self.last_address) {
            capture::capture_packet(capture::DIRECTION_RX, channel.0, &address, &self.serial_hint, &payload);
        }

        Ok(Ack {
            received: ack_received,
            data: payload,
            retry,
            power_detector,
            rssi_dbm: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_bounds() {
        assert!(Channel::from_number(0).is_ok());
        assert!(Channel::from_number(125).is_ok());
        assert!(Channel::from_number(126).is_err());
    }

    #[test]
    fn datarate_parse() {
        assert!(matches!(Datarate::parse("250K"), Ok(Datarate::Dr250K)));
        assert!(matches!(Datarate::parse("1M"), Ok(Datarate::Dr1M)));
        assert!(matches!(Datarate::parse("2M"), Ok(Datarate::Dr2M)));
        assert!(Datarate::parse("3M").is_err());
    }
}
