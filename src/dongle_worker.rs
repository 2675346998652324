//! Per-dongle worker: the radio multiplexing engine.
//!
//! One `DongleWorker` owns exactly one [`RadioTransport`] and time-division
//! multiplexes every [`ConnectionState`] attached to it: reconfigure,
//! service safelink or plain send/ack, repeat. Generic over `RadioTransport`
//! so the state machine can run against a fake radio in tests.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::connection_state::{ConnectionId, ConnectionState};
use crate::error::LinkError;
use crate::packet::Packet;
use crate::radio::RadioTransport;

/// Sleep quantum between passes, to avoid busy-spinning when every queue on
/// the dongle is empty.
pub const QUANTUM: Duration = Duration::from_millis(1);

/// Consecutive non-fatal USB errors (across all connections on this dongle)
/// before the worker treats the dongle as lost, even though no individual
/// error was `DeviceLost`.
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

const ENABLE_SAFELINK_FRAME: [u8; 3] = [0xFF, 0x05, 0x01];

struct Inner {
    connections: HashMap<ConnectionId, Arc<ConnectionState>>,
    /// Bumped every worker pass so `remove()` can wait for a pass that
    /// started after it released the connection it removed.
    generation: u64,
}

struct Shared {
    inner: Mutex<Inner>,
    pass_completed: Condvar,
    thread_ending: Mutex<bool>,
}

/// Handle the [`crate::device_manager::DeviceManager`] keeps for a running
/// worker thread.
pub struct DongleWorkerHandle {
    shared: Arc<Shared>,
    join: Option<JoinHandle<()>>,
}

impl DongleWorkerHandle {
    /// Spawns the worker thread over `radio`. The thread runs until
    /// [`DongleWorkerHandle::remove`] empties the connection set.
    pub fn spawn<R>(mut radio: R) -> Self
    where
        R: RadioTransport + Send + 'static,
    {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                connections: HashMap::new(),
                generation: 0,
            }),
            pass_completed: Condvar::new(),
            thread_ending: Mutex::new(false),
        });

        let worker_shared = shared.clone();
        let join = std::thread::spawn(move || run(&mut radio, worker_shared));

        DongleWorkerHandle {
            shared,
            join: Some(join),
        }
    }

    pub fn add(&self, state: Arc<ConnectionState>) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.connections.insert(state.id, state);
    }

    /// Removes `state` and blocks until the worker has observed the removal
    /// in its own pass. Returns `true` if the connection set is now empty,
    /// meaning the caller should terminate and join this worker.
    ///
    /// If the worker thread has already exited (a dead dongle), there will
    /// be no further pass to observe anything, so this skips the wait
    /// entirely rather than blocking forever.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.connections.remove(&id);
        let is_empty = inner.connections.is_empty();
        let generation_before = inner.generation;
        drop(inner);

        if self.is_finished() {
            return is_empty;
        }

        let inner = self.shared.inner.lock().unwrap();
        let inner = self
            .shared
            .pass_completed
            .wait_while(inner, |i| i.generation == generation_before)
            .unwrap();
        drop(inner);
        is_empty
    }

    pub fn connection_count(&self) -> usize {
        self.shared.inner.lock().unwrap().connections.len()
    }

    /// True once the worker thread has exited (a dead dongle it gave up on,
    /// or a completed shutdown request).
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map(JoinHandle::is_finished).unwrap_or(true)
    }

    /// Requests termination and joins the worker thread. Called by the
    /// `DeviceManager` once the connection set has drained to empty.
    pub fn shutdown(mut self) {
        *self.shared.thread_ending.lock().unwrap() = true;
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn run<R: RadioTransport>(radio: &mut R, shared: Arc<Shared>) {
    log::info!("dongle worker starting");
    let mut consecutive_errors: u32 = 0;

    loop {
        std::thread::sleep(QUANTUM);

        let snapshot: Vec<Arc<ConnectionState>> = {
            let mut inner = shared.inner.lock().unwrap();
            inner.generation = inner.generation.wrapping_add(1);
            inner.connections.values().cloned().collect()
        };
        shared.pass_completed.notify_all();

        if *shared.thread_ending.lock().unwrap() {
            break;
        }

        let mut lost = false;
        for conn in &snapshot {
            match service_connection(radio, conn) {
                Ok(()) => consecutive_errors = 0,
                Err(e) => {
                    log::warn!("usb error servicing connection: {e}");
                    consecutive_errors += 1;
                    if matches!(e, LinkError::DeviceLost) || consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        lost = true;
                        break;
                    }
                }
            }
        }

        if lost {
            log::warn!("dongle lost, marking every attached connection and exiting worker");
            mark_all_lost_and_bump(&shared);
            return;
        }
    }
    log::info!("dongle worker stopping");
}

/// Marks every connection currently attached (not just the last pass's
/// snapshot, in case more were added mid-pass) as having lost its device,
/// then bumps `generation` and notifies once more so any `remove()` already
/// waiting, or about to start waiting, observes this as the final pass
/// rather than blocking on a condvar nothing will ever signal again.
fn mark_all_lost_and_bump(shared: &Arc<Shared>) {
    let mut inner = shared.inner.lock().unwrap();
    inner.generation = inner.generation.wrapping_add(1);
    for conn in inner.connections.values() {
        conn.device_lost.store(true, Ordering::Relaxed);
    }
    drop(inner);
    shared.pass_completed.notify_all();
}

fn reconfigure<R: RadioTransport>(radio: &mut R, conn: &ConnectionState) -> Result<(), LinkError> {
    if radio.address() != Some(conn.address) {
        radio.set_address(conn.address)?;
    }
    if radio.channel() != Some(conn.channel) {
        radio.set_channel(conn.channel)?;
    }
    if radio.datarate() != Some(conn.datarate) {
        radio.set_datarate(conn.datarate)?;
    }
    if radio.ack_enabled() != Some(true) {
        radio.set_ack_enabled(true)?;
    }
    Ok(())
}

fn service_connection<R: RadioTransport>(
    radio: &mut R,
    conn: &ConnectionState,
) -> Result<(), LinkError> {
    reconfigure(radio, conn)?;

    if conn.use_safelink {
        service_safelink(radio, conn)
    } else {
        service_plain(radio, conn)
    }
}

fn service_plain<R: RadioTransport>(radio: &mut R, conn: &ConnectionState) -> Result<(), LinkError> {
    let mut queue = conn.send_queue.heap.lock().unwrap();
    let head = queue.peek().cloned();
    let frame = head.clone().unwrap_or_else(Packet::ping);

    let ack = radio.send_packet(&frame.raw())?;
    conn.statistics.sent_count.fetch_add(1, Ordering::Relaxed);

    if ack.received && head.is_some() {
        queue.pop();
    }
    drop(queue);

    process_ack(conn, ack);
    Ok(())
}

fn service_safelink<R: RadioTransport>(radio: &mut R, conn: &ConnectionState) -> Result<(), LinkError> {
    let mut safelink = conn.safelink.lock().unwrap();

    if !safelink.initialized {
        let ack = radio.send_packet(&ENABLE_SAFELINK_FRAME)?;
        conn.statistics.sent_count.fetch_add(1, Ordering::Relaxed);
        if ack.received {
            safelink.initialized = true;
        }
        drop(safelink);
        process_ack(conn, ack);
        return Ok(());
    }

    let mut queue = conn.send_queue.heap.lock().unwrap();
    let head = queue.peek().cloned();
    let mut frame = head.clone().unwrap_or_else(Packet::ping);
    frame.set_safelink_bits(safelink.up, safelink.down);

    let ack = radio.send_packet(&frame.raw())?;
    conn.statistics.sent_count.fetch_add(1, Ordering::Relaxed);

    if ack.received {
        if !ack.data.is_empty() {
            let ack_down_bit = ack.data[0] & 0x04 != 0;
            if ack_down_bit == safelink.down {
                safelink.down = !safelink.down;
            }
        }
        safelink.up = !safelink.up;
        if head.is_some() {
            queue.pop();
        }
    }
    drop(queue);
    drop(safelink);

    process_ack(conn, ack);
    Ok(())
}

fn process_ack(conn: &ConnectionState, ack: crate::radio::Ack) {
    if !ack.received {
        return;
    }
    conn.statistics.ack_count.fetch_add(1, Ordering::Relaxed);

    let parsed = match Packet::from_wire_bytes(&ack.data) {
        Ok(p) => p,
        Err(_) => return,
    };

    if parsed.is_rssi_report() {
        if let Some(&rssi) = parsed.payload().first() {
            conn.statistics.rssi_latest.store(rssi, Ordering::Relaxed);
        }
        return;
    }

    let mut recv = parsed;
    recv.seq = conn.statistics.receive_count.fetch_add(1, Ordering::Relaxed);
    conn.recv_queue.push_notify(recv);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::{Ack, Channel, Datarate};
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// A test double implementing [`RadioTransport`] that lets tests script
    /// ack responses and drop specific transmissions.
    struct FakeRadio {
        channel: Option<Channel>,
        datarate: Option<Datarate>,
        address: Option<[u8; 5]>,
        ack_enabled: Option<bool>,
        responses: StdMutex<VecDeque<Ack>>,
        sent: StdMutex<Vec<Vec<u8>>>,
    }

    impl FakeRadio {
        fn new() -> Self {
            FakeRadio {
                channel: None,
                datarate: None,
                address: None,
                ack_enabled: None,
                responses: StdMutex::new(VecDeque::new()),
                sent: StdMutex::new(Vec::new()),
            }
        }

        fn push_ack(&self, ack: Ack) {
            self.responses.lock().unwrap().push_back(ack);
        }

        fn acking() -> Ack {
            Ack {
                received: true,
                data: vec![],
                retry: 0,
                power_detector: false,
                rssi_dbm: None,
            }
        }
    }

    impl RadioTransport for FakeRadio {
        fn set_channel(&mut self, channel: Channel) -> crate::error::Result<()> {
            self.channel = Some(channel);
            Ok(())
        }
        fn set_datarate(&mut self, datarate: Datarate) -> crate::error::Result<()> {
            self.datarate = Some(datarate);
            Ok(())
        }
        fn set_address(&mut self, address: [u8; 5]) -> crate::error::Result<()> {
            self.address = Some(address);
            Ok(())
        }
        fn set_ack_enabled(&mut self, enabled: bool) -> crate::error::Result<()> {
            self.ack_enabled = Some(enabled);
            Ok(())
        }
        fn channel(&self) -> Option<Channel> {
            self.channel
        }
        fn datarate(&self) -> Option<Datarate> {
            self.datarate
        }
        fn address(&self) -> Option<[u8; 5]> {
            self.address
        }
        fn ack_enabled(&self) -> Option<bool> {
            self.ack_enabled
        }
        fn send_packet(&mut self, bytes: &[u8]) -> crate::error::Result<Ack> {
            self.sent.lock().unwrap().push(bytes.to_vec());
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }
    }

    fn state(use_safelink: bool) -> ConnectionState {
        ConnectionState::new(
            [0xE7; 5],
            Channel::from_number(42).unwrap(),
            Datarate::Dr2M,
            use_safelink,
            None,
        )
    }

    #[test]
    fn non_safelink_sends_in_fifo_order_and_pops_on_ack() {
        let mut radio = FakeRadio::new();
        for _ in 0..3 {
            radio.push_ack(FakeRadio::acking());
        }
        let conn = state(false);

        for i in 0..3u8 {
            let mut p = Packet::new(0, 0, vec![i]).unwrap();
            p.seq = conn.statistics.enqueued_count.fetch_add(1, Ordering::Relaxed);
            conn.send_queue.push_notify(p);
        }

        for _ in 0..3 {
            service_connection(&mut radio, &conn).unwrap();
        }

        assert_eq!(conn.send_queue.len(), 0);
        assert_eq!(conn.statistics.sent_count.load(Ordering::Relaxed), 3);
        let sent = radio.sent.lock().unwrap();
        assert_eq!(sent[0][1], 0);
        assert_eq!(sent[1][1], 1);
        assert_eq!(sent[2][1], 2);
    }

    #[test]
    fn non_safelink_pings_when_queue_empty() {
        let mut radio = FakeRadio::new();
        radio.push_ack(FakeRadio::acking());
        let conn = state(false);

        service_connection(&mut radio, &conn).unwrap();

        let sent = radio.sent.lock().unwrap();
        assert_eq!(sent[0], vec![0xFFu8]);
    }

    #[test]
    fn safelink_initializes_before_sending_application_packets() {
        let mut radio = FakeRadio::new();
        radio.push_ack(FakeRadio::acking());
        let conn = state(true);

        let mut p = Packet::new(0, 0, vec![9]).unwrap();
        p.seq = 0;
        conn.send_queue.push_notify(p);

        service_connection(&mut radio, &conn).unwrap();

        assert!(conn.safelink.lock().unwrap().initialized);
        assert_eq!(conn.send_queue.len(), 1, "application packet must not be consumed by the handshake");
        let sent = radio.sent.lock().unwrap();
        assert_eq!(sent[0], vec![0xFF, 0x05, 0x01]);
    }

    #[test]
    fn safelink_retransmits_on_lost_ack_then_advances() {
        let mut radio = FakeRadio::new();
        // handshake ack
        radio.push_ack(FakeRadio::acking());
        // first application send: ack lost
        radio.push_ack(Ack::default());
        // retransmit: ack received
        radio.push_ack(FakeRadio::acking());
        let conn = state(true);

        let mut p1 = Packet::new(0, 0, vec![1]).unwrap();
        p1.seq = 0;
        conn.send_queue.push_notify(p1);

        service_connection(&mut radio, &conn).unwrap(); // handshake
        service_connection(&mut radio, &conn).unwrap(); // lost ack, no state change
        let up_after_loss = conn.safelink.lock().unwrap().up;
        assert!(!up_after_loss);
        assert_eq!(conn.send_queue.len(), 1, "packet must stay at head across retransmission");

        service_connection(&mut radio, &conn).unwrap(); // acked
        assert!(conn.safelink.lock().unwrap().up);
        assert_eq!(conn.send_queue.len(), 0);

        let sent = radio.sent.lock().unwrap();
        assert_eq!(sent[1], sent[2], "retransmission carries the same safelink bits");
    }

    #[test]
    fn rssi_ack_updates_latest_without_enqueueing() {
        let mut radio = FakeRadio::new();
        radio.push_ack(Ack {
            received: true,
            data: vec![0xF0 | 0x0F, 55],
            retry: 0,
            power_detector: false,
            rssi_dbm: None,
        });
        let conn = state(false);

        service_connection(&mut radio, &conn).unwrap();

        assert_eq!(conn.statistics.rssi_latest.load(Ordering::Relaxed), 55);
        assert_eq!(conn.recv_queue.len(), 0);
    }

    #[test]
    fn application_ack_is_enqueued_for_recv() {
        let mut radio = FakeRadio::new();
        radio.push_ack(Ack {
            received: true,
            data: vec![0x10, 0xAB],
            retry: 0,
            power_detector: false,
            rssi_dbm: None,
        });
        let conn = state(false);

        service_connection(&mut radio, &conn).unwrap();

        assert_eq!(conn.recv_queue.len(), 1);
        let popped = conn.recv_queue.heap.lock().unwrap().pop().unwrap();
        assert_eq!(popped.payload(), &[0xAB]);
    }

    /// Every transmission fails with `DeviceLost`, as if the dongle had been
    /// unplugged mid-pass.
    struct DeadRadio;

    impl RadioTransport for DeadRadio {
        fn set_channel(&mut self, _c: Channel) -> crate::error::Result<()> {
            Ok(())
        }
        fn set_datarate(&mut self, _d: Datarate) -> crate::error::Result<()> {
            Ok(())
        }
        fn set_address(&mut self, _a: [u8; 5]) -> crate::error::Result<()> {
            Ok(())
        }
        fn set_ack_enabled(&mut self, _e: bool) -> crate::error::Result<()> {
            Ok(())
        }
        fn channel(&self) -> Option<Channel> {
            None
        }
        fn datarate(&self) -> Option<Datarate> {
            None
        }
        fn address(&self) -> Option<[u8; 5]> {
            None
        }
        fn ack_enabled(&self) -> Option<bool> {
            None
        }
        fn send_packet(&mut self, _bytes: &[u8]) -> crate::error::Result<Ack> {
            Err(crate::error::LinkError::DeviceLost)
        }
    }

    #[test]
    fn device_lost_marks_every_connection_and_unblocks_remove() {
        let handle = DongleWorkerHandle::spawn(DeadRadio);
        let a = Arc::new(state(false));
        let b = Arc::new(state(false));
        handle.add(a.clone());
        handle.add(b.clone());

        for _ in 0..500 {
            if handle.is_finished() {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(handle.is_finished(), "worker must exit once the device is lost");
        assert!(a.is_device_lost());
        assert!(b.is_device_lost());

        // Neither call may block: the worker thread is gone and will never
        // notify `pass_completed` again.
        let now_empty = handle.remove(a.id);
        assert!(!now_empty);
        let now_empty = handle.remove(b.id);
        assert!(now_empty);
    }

    /// A radio whose sends fail with a plain transport error (never
    /// `DeviceLost` directly) often enough to trip the consecutive-error
    /// threshold.
    struct FlakyRadio;

    impl RadioTransport for FlakyRadio {
        fn set_channel(&mut self, _c: Channel) -> crate::error::Result<()> {
            Ok(())
        }
        fn set_datarate(&mut self, _d: Datarate) -> crate::error::Result<()> {
            Ok(())
        }
        fn set_address(&mut self, _a: [u8; 5]) -> crate::error::Result<()> {
            Ok(())
        }
        fn set_ack_enabled(&mut self, _e: bool) -> crate::error::Result<()> {
            Ok(())
        }
        fn channel(&self) -> Option<Channel> {
            None
        }
        fn datarate(&self) -> Option<Datarate> {
            None
        }
        fn address(&self) -> Option<[u8; 5]> {
            None
        }
        fn ack_enabled(&self) -> Option<bool> {
            None
        }
        fn send_packet(&mut self, _bytes: &[u8]) -> crate::error::Result<Ack> {
            Err(crate::error::LinkError::Usb(rusb::Error::Io))
        }
    }

    #[test]
    fn repeated_transport_errors_eventually_trip_device_lost() {
        let handle = DongleWorkerHandle::spawn(FlakyRadio);
        let conn = Arc::new(state(false));
        handle.add(conn.clone());

        for _ in 0..2000 {
            if handle.is_finished() {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(
            handle.is_finished(),
            "worker must give up after enough consecutive transport errors"
        );
        assert!(conn.is_device_lost());
    }
}
