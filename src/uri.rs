//! URI grammar for addressing USB-direct targets and radio connections.
//!
//! ```text
//! uri   := "usb://" INT
//!        | "radio://" (INT | "*") "/" INT "/" rate "/" (HEX{10} | "*")
//! rate  := "250K" | "1M" | "2M"
//! ```

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{LinkError, Result};
use crate::radio::{Channel, Datarate};

fn uri_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:usb://(?P<usb_index>\d+)|radio://(?P<dongle>\d+|\*)/(?P<channel>\d+)/(?P<rate>250K|1M|2M)/(?P<addr>[a-fA-F0-9]{10}|\*))$",
        )
        .expect("static uri regex is valid")
    })
}

/// Which dongle a `radio://` uri requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DongleSelector {
    Index(usize),
    Any,
}

/// Which target address a `radio://` uri requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSelector {
    Explicit([u8; 5]),
    Any,
}

/// A parsed connection URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedUri {
    Usb {
        index: usize,
    },
    Radio {
        dongle: DongleSelector,
        channel: u8,
        datarate: DatarateTag,
        address: AddressSelector,
    },
}

/// `Datarate` doesn't implement `PartialEq`/`Eq` conveniently for this enum's
/// derive, so the parsed form keeps the string-backed tag and converts to
/// [`Datarate`] on demand via [`ParsedUri::datarate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatarateTag {
    Dr250K,
    Dr1M,
    Dr2M,
}

impl DatarateTag {
    pub fn to_datarate(self) -> Datarate {
        match self {
            DatarateTag::Dr250K => Datarate::Dr250K,
            DatarateTag::Dr1M => Datarate::Dr1M,
            DatarateTag::Dr2M => Datarate::Dr2M,
        }
    }
}

pub fn parse(uri: &str) -> Result<ParsedUri> {
    let caps = uri_regex()
        .captures(uri)
        .ok_or_else(|| LinkError::InvalidUri(uri.to_string()))?;

    if let Some(idx) = caps.name("usb_index") {
        let index: usize = idx
            .as_str()
            .parse()
            .map_err(|_| LinkError::InvalidUri(uri.to_string()))?;
        return Ok(ParsedUri::Usb { index });
    }

    let dongle_str = caps.name("dongle").unwrap().as_str();
    let dongle = if dongle_str == "*" {
        DongleSelector::Any
    } else {
        DongleSelector::Index(
            dongle_str
                .parse()
                .map_err(|_| LinkError::InvalidUri(uri.to_string()))?,
        )
    };

    let channel: u8 = caps
        .name("channel")
        .unwrap()
        .as_str()
        .parse()
        .map_err(|_| LinkError::InvalidUri(uri.to_string()))?;
    Channel::from_number(channel)?;

    let datarate = match caps.name("rate").unwrap().as_str() {
        "250K" => DatarateTag::Dr250K,
        "1M" => DatarateTag::Dr1M,
        "2M" => DatarateTag::Dr2M,
        _ => unreachable!("regex only matches known rates"),
    };

    let addr_str = caps.name("addr").unwrap().as_str();
    let address = if addr_str == "*" {
        AddressSelector::Any
    } else {
        let raw = u64::from_str_radix(addr_str, 16)
            .map_err(|_| LinkError::InvalidUri(uri.to_string()))?;
        let bytes = raw.to_be_bytes();
        AddressSelector::Explicit([bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]])
    };

    Ok(ParsedUri::Radio {
        dongle,
        channel,
        datarate,
        address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_usb_uri() {
        assert_eq!(parse("usb://0").unwrap(), ParsedUri::Usb { index: 0 });
    }

    #[test]
    fn parses_canonical_radio_uri() {
        let parsed = parse("radio://0/80/2M/E7E7E7E7E7").unwrap();
        match parsed {
            ParsedUri::Radio {
                dongle,
                channel,
                datarate,
                address,
            } => {
                assert_eq!(dongle, DongleSelector::Index(0));
                assert_eq!(channel, 80);
                assert_eq!(datarate, DatarateTag::Dr2M);
                assert_eq!(address, AddressSelector::Explicit([0xE7, 0xE7, 0xE7, 0xE7, 0xE7]));
            }
            _ => panic!("expected radio uri"),
        }
    }

    #[test]
    fn parses_wildcard_dongle_and_address() {
        let parsed = parse("radio://*/80/2M/*").unwrap();
        match parsed {
            ParsedUri::Radio { dongle, address, .. } => {
                assert_eq!(dongle, DongleSelector::Any);
                assert_eq!(address, AddressSelector::Any);
            }
            _ => panic!("expected radio uri"),
        }
    }

    #[test]
    fn rejects_unknown_datarate() {
        assert!(parse("radio://0/80/3M/E7E7E7E7E7").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("not-a-uri").is_err());
        assert!(parse("radio://0/80/2M/tooshort").is_err());
    }
}
