//! Opens a safelink-reliable connection to a single target and exchanges a
//! handful of packets through the send/recv queues, printing statistics as
//! it goes.
use crazyflie_link::{Connection, Packet, Settings};
use std::time::Duration;

fn main() -> Result<(), crazyflie_link::LinkError> {
    env_logger::init();

    let settings = Settings {
        use_safelink: true,
        send_queue_bound: Some(64),
    };
    let con = Connection::open_with_settings("radio://0/80/2M/E7E7E7E7E7", settings)?;

    for i in 0..5u8 {
        con.send(Packet::new(0, 0, vec![i])?)?;
    }

    for _ in 0..5 {
        let packet = con.recv_timeout(Duration::from_secs(1))?;
        println!("received {:?}", packet.payload());
    }

    let stats = con.statistics();
    println!(
        "sent={} acked={} received={} rssi={}",
        stats.sent_count, stats.ack_count, stats.receive_count, stats.rssi_latest
    );

    Ok(())
}
