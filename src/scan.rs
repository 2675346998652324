//! Probe-all enumeration of live targets across (address, channel, datarate).

use crate::connection::Connection;
use crate::device_manager::DeviceManager;
use crate::error::Result;

const DATARATES: [&str; 3] = ["250K", "1M", "2M"];
const DEFAULT_SCAN_ADDRESS: &str = "E7E7E7E7E7";

pub fn scan(address: Option<&str>) -> Result<Vec<String>> {
    let mut results = Vec::new();

    {
        let manager = DeviceManager::instance().lock().unwrap();
        for i in 0..manager.direct_usb_target_count() {
            results.push(format!("usb://{}", i));
        }
    }

    let address = address.unwrap_or(DEFAULT_SCAN_ADDRESS).to_string();

    let found = std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for datarate in DATARATES {
            for channel in 0..=125u8 {
                let uri = format!("radio://*/{}/{}/{}", channel, datarate, address);
                handles.push(scope.spawn(move || probe(&uri)));
            }
        }
        handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    });

    results.extend(found);
    Ok(results)
}

fn probe(uri: &str) -> Option<String> {
    let connection = Connection::open(uri).ok()?;
    loop {
        let stats = connection.statistics();
        if stats.sent_count >= 1 {
            return if stats.ack_count >= 1 {
                Some(uri.to_string())
            } else {
                None
            };
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn probes_every_channel_datarate_combination() {
        // 126 channels (0..=125) x 3 datarates = 378 probes per address.
        let channels = 126usize;
        let datarates = 3usize;
        assert_eq!(channels * datarates, 378);
    }
}
