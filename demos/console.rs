use crazyflie_link::{Channel, Datarate, Radio, RadioTransport};
use std::str;

fn main() -> Result<(), crazyflie_link::LinkError> {
    let mut cr = Radio::open_first()?;

    cr.set_datarate(Datarate::Dr2M)?;

    println!("Scanning for Crazyflies ...");
    let channels = cr.scan_channels(
        Channel::from_number(0).unwrap(),
        Channel::from_number(125).unwrap(),
        &[0xff],
    )?;
    if !channels.is_empty() {
        println!(
            "{} Crazyflies found, connecting {:?}.",
            channels.len(),
            channels[0]
        );

        cr.set_channel(channels[0])?;

        println!("Fetching and displaying up to 100 console packets:");
        println!("==================================================");
        for _i in 1..100 {
            if let Ok(ack) = cr.send_packet(&[0xff]) {
                if !ack.data.is_empty() && ack.data[0] == 0 {
                    print!("{}", str::from_utf8(&ack.data[1..]).unwrap_or(""));
                }
            }
        }
    } else {
        println!("No Crazyflie found!");
    }

    Ok(())
}
