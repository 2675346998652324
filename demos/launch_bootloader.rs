use crazyflie_link::Radio;

fn main() -> Result<(), crazyflie_link::LinkError> {
    let cr = Radio::open_first()?;

    cr.launch_bootloader()?;

    Ok(())
}
