//! Scans for targets across USB and every radio channel/datarate, using the
//! multiplexing `Connection` facade rather than talking to a `Radio`
//! directly.
use crazyflie_link::Connection;

fn main() -> Result<(), crazyflie_link::LinkError> {
    env_logger::init();

    println!("Scanning for targets...");
    let uris = Connection::scan(None)?;

    println!("Found {} target(s):", uris.len());
    for uri in uris {
        println!("  {}", uri);
    }

    Ok(())
}
