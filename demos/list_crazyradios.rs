use crazyflie_link::Radio;

fn main() -> Result<(), crazyflie_link::LinkError> {
    let serials = Radio::list_serials()?;

    println!("{} Crazyradio found:", serials.len());

    for serial in serials.iter() {
        println!("  - {}", serial);
    }

    Ok(())
}
