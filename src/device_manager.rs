//! Process-wide registry of physical dongles and direct-USB targets.

use std::sync::{Arc, Mutex, OnceLock};

use crate::connection_state::{ConnectionId, ConnectionState};
use crate::dongle_worker::DongleWorkerHandle;
use crate::error::{LinkError, Result};
use crate::radio::Radio;
use crate::usb_target::DirectUSBTarget;

const CRTP_USB_VID: u16 = 0x0483;
const CRTP_USB_PID: u16 = 0x5740;

/// A handle to one physical Crazyradio dongle. Owns a worker thread while
/// at least one connection is attached.
struct PhysicalDongle {
    index: usize,
    worker: Option<DongleWorkerHandle>,
}

/// Process-wide registry of dongles and direct-USB targets. Obtained via
/// [`DeviceManager::instance`].
///
/// Direct-USB targets are enumerated but not opened here: each
/// `Connection::open("usb://i")` opens its own `DirectUSBTarget`, closed
/// again when that `Connection` drops. Holding one shared, permanently-open
/// handle per target would mean a `usb://i` connection's teardown could
/// never actually close the device.
pub struct DeviceManager {
    direct_usb_devices: Vec<rusb::Device<rusb::GlobalContext>>,
    dongles: Vec<PhysicalDongle>,
    next_round_robin: usize,
}

static INSTANCE: OnceLock<Mutex<DeviceManager>> = OnceLock::new();

/// True if `worker` is a handle to a thread that has already exited (the
/// dongle was lost or gave up) and so must be replaced rather than reused.
fn needs_restart(worker: &Option<DongleWorkerHandle>) -> bool {
    matches!(worker, Some(handle) if handle.is_finished())
}

impl DeviceManager {
    /// Returns the process-wide singleton, enumerating devices on first
    /// access.
    pub fn instance() -> &'static Mutex<DeviceManager> {
        INSTANCE.get_or_init(|| {
            let mut manager = DeviceManager {
                direct_usb_devices: Vec::new(),
                dongles: Vec::new(),
                next_round_robin: 0,
            };
            if let Err(e) = manager.enumerate() {
                log::warn!("device enumeration failed: {e}");
            }
            Mutex::new(manager)
        })
    }

    fn enumerate(&mut self) -> Result<()> {
        self.direct_usb_devices.clear();
        self.dongles.clear();

        for device in rusb::devices()?.iter() {
            let desc = device.device_descriptor()?;
            if desc.vendor_id() == CRTP_USB_VID && desc.product_id() == CRTP_USB_PID {
                self.direct_usb_devices.push(device);
            }
        }

        let dongle_count = Radio::count().unwrap_or(0);
        for index in 0..dongle_count {
            self.dongles.push(PhysicalDongle {
                index,
                worker: None,
            });
        }

        Ok(())
    }

    pub fn direct_usb_target_count(&self) -> usize {
        self.direct_usb_devices.len()
    }

    /// Opens a fresh handle to the direct-USB target at `index`. The caller
    /// owns the returned `DirectUSBTarget` and its underlying USB handle
    /// closes when it drops.
    pub fn open_usb_target(&self, index: usize) -> Result<DirectUSBTarget> {
        let device = self
            .direct_usb_devices
            .get(index)
            .cloned()
            .ok_or(LinkError::DeviceNotPresent(index))?;
        DirectUSBTarget::open(device, index)
    }

    pub fn dongle_count(&self) -> usize {
        self.dongles.len()
    }

    /// Attaches `state` to the dongle at `dongle_index`, or round-robins
    /// across available dongles when `dongle_index` is `None`. Starts the
    /// dongle's worker thread if it is not already running.
    ///
    /// Policy for `*`: round-robin over dongle indices in enumeration
    /// order, advancing one slot per call regardless of which dongle ends
    /// up handling the connection (documented in DESIGN.md).
    pub fn attach_radio(
        &mut self,
        state: Arc<ConnectionState>,
        dongle_index: Option<usize>,
    ) -> Result<usize> {
        if self.dongles.is_empty() {
            return Err(LinkError::NoDongleAvailable);
        }

        let index = match dongle_index {
            Some(i) => {
                if i >= self.dongles.len() {
                    return Err(LinkError::DeviceNotPresent(i));
                }
                i
            }
            None => {
                let chosen = self.next_round_robin % self.dongles.len();
                self.next_round_robin = self.next_round_robin.wrapping_add(1);
                chosen
            }
        };

        let dongle = &mut self.dongles[index];
        if needs_restart(&dongle.worker) {
            log::warn!("dongle {} worker had already exited, restarting", dongle.index);
            dongle.worker = None;
        }
        if dongle.worker.is_none() {
            let radio = Radio::open(dongle.index)?;
            dongle.worker = Some(DongleWorkerHandle::spawn(radio));
            log::info!("dongle worker started for dongle {}", dongle.index);
        }
        dongle.worker.as_ref().unwrap().add(state);

        Ok(index)
    }

    /// Detaches the connection with identity `id` from dongle `dongle_index`.
    /// Blocks until the worker has observed the removal. If the dongle's
    /// connection set becomes empty, joins and drops the worker, releasing
    /// the USB device.
    pub fn detach_radio(&mut self, dongle_index: usize, id: ConnectionId) {
        let Some(dongle) = self.dongles.get_mut(dongle_index) else {
            return;
        };
        let Some(handle) = dongle.worker.take() else {
            return;
        };

        let now_empty = handle.remove(id);
        if now_empty {
            handle.shutdown();
            log::info!("dongle worker stopped for dongle {}", dongle.index);
        } else {
            dongle.worker = Some(handle);
        }
    }
}
