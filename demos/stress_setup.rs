use crazyflie_link::{Channel, Datarate, Radio, RadioTransport};
use indicatif::{HumanCount, ProgressBar};

fn main() -> Result<(), crazyflie_link::LinkError> {
    let mut cr = Radio::open_first()?;
    cr.set_channel(Channel::from_number(42)?)?;
    cr.set_datarate(Datarate::Dr2M)?;
    cr.set_address([0xe7, 0xe7, 0xe7, 0xe7, 0x42])?;

    let pb = ProgressBar::new_spinner();
    pb.set_message("Running stress test...");

    println!("Opened Crazyradio with serial number: {}", cr.serial()?);

    let mut i = 0u64;
    loop {
        i += 1;
        for j in 0..100usize {
            if j % 2 == 0 {
                cr.set_address([0xff, 0xe7, 0xe7, 0xe7, 0xff])?;
                cr.set_ack_enabled(false)?;
                cr.send_packet_no_ack(&[0xff])?;
            } else {
                cr.set_address([0xe7, 0xe7, 0xe7, 0xe7, 0x42])?;
                cr.set_ack_enabled(true)?;
                cr.send_packet(&[0xff])?;
            }
        }
        pb.set_message(format!("Iterations: {} ({} loops)", i, HumanCount(i * 100)));
        pb.tick();
    }
}
