//! Name and address lookups used around the probe.
//!
//! None of these affect protocol decisions: the interface MAC is an input
//! to the DISCOVER, everything else only decorates the report.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use mac_address::MacAddress;
use tracing::debug;

use crate::error::{Error, Result};

const ARP_TABLE_PATH: &str = "/proc/net/arp";

/// Resolves the hardware address of a named network interface.
///
/// # Errors
///
/// Returns [`Error::Interface`] if the interface does not exist or has no
/// hardware address.
pub fn mac_from_interface(name: &str) -> Result<MacAddress> {
    match mac_address::mac_address_by_name(name) {
        Ok(Some(mac)) => Ok(mac),
        Ok(None) => Err(Error::Interface(format!(
            "{}: no such interface or no hardware address",
            name
        ))),
        Err(error) => Err(Error::Interface(format!("{}: {}", name, error))),
    }
}

/// Reverse DNS lookup, `None` when the address has no name.
pub fn name_from_ip(ip: Ipv4Addr) -> Option<String> {
    match dns_lookup::lookup_addr(&IpAddr::V4(ip)) {
        Ok(name) if name != ip.to_string() => Some(name),
        Ok(_) => None,
        Err(error) => {
            debug!("Reverse lookup for {} failed: {}", ip, error);
            None
        }
    }
}

/// Maps neighbour IP addresses to hardware addresses.
pub trait Neighbors {
    fn hardware_address(&self, ip: Ipv4Addr) -> Option<MacAddress>;
}

impl Neighbors for HashMap<Ipv4Addr, MacAddress> {
    fn hardware_address(&self, ip: Ipv4Addr) -> Option<MacAddress> {
        self.get(&ip).copied()
    }
}

/// The kernel ARP cache, read fresh on every lookup.
///
/// Offers usually arrive right after the server ARPed us, so its entry is
/// almost always present by the time we look.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArpTable;

impl Neighbors for ArpTable {
    fn hardware_address(&self, ip: Ipv4Addr) -> Option<MacAddress> {
        let content = std::fs::read_to_string(ARP_TABLE_PATH).ok()?;
        parse_arp_table(&content).get(&ip).copied()
    }
}

/// Parses the `/proc/net/arp` format, skipping incomplete entries.
fn parse_arp_table(content: &str) -> HashMap<Ipv4Addr, MacAddress> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let ip = fields.first()?.parse::<Ipv4Addr>().ok()?;
            let mac = fields.get(3)?.parse::<MacAddress>().ok()?;
            (mac.bytes() != [0u8; 6]).then_some((ip, mac))
        })
        .collect()
}

/// Hardware vendor names keyed by OUI (first three MAC bytes).
#[derive(Debug, Clone, Default)]
pub struct OuiDatabase {
    vendors: HashMap<[u8; 3], String>,
}

impl OuiDatabase {
    /// Loads an IEEE `oui.txt` or Wireshark `manuf` style file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Parses vendor lines, ignoring anything that does not start with an OUI.
    ///
    /// Accepted forms: `00-00-0C   (hex)\t\tCisco Systems, Inc` and
    /// `00:00:0C\tCisco\tCisco Systems, Inc`.
    pub fn parse(content: &str) -> Self {
        let vendors = content
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.starts_with('#') {
                    return None;
                }
                let (prefix, rest) = line.split_once(char::is_whitespace)?;
                let oui = parse_oui(prefix)?;
                let rest = rest.trim_start();
                let rest = rest.strip_prefix("(hex)").unwrap_or(rest);
                let name = rest.split('\t').map(str::trim).rfind(|part| !part.is_empty())?;
                Some((oui, name.to_string()))
            })
            .collect();
        Self { vendors }
    }

    pub fn len(&self) -> usize {
        self.vendors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty()
    }

    pub fn vendor(&self, mac: &MacAddress) -> Option<&str> {
        let bytes = mac.bytes();
        self.vendors
            .get(&[bytes[0], bytes[1], bytes[2]])
            .map(String::as_str)
    }
}

fn parse_oui(prefix: &str) -> Option<[u8; 3]> {
    let digits: String = prefix
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let mut oui = [0u8; 3];
    for (index, byte) in oui.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&digits[index * 2..index * 2 + 2], 16).ok()?;
    }
    Some(oui)
}
