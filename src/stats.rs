//! Traffic counters for one probe run.
//!
//! [`Stats`] is created once by the caller and handed to the discovery
//! session by mutable reference. Counters only ever increase.

use std::collections::HashMap;
use std::fmt;

use mac_address::MacAddress;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// DISCOVER broadcasts that left the socket.
    pub sent: u64,
    /// Inbound datagrams that parsed as DHCP, matching or not.
    pub received: u64,
    /// Inbound datagrams accepted as offers for our request.
    pub processed: u64,
    /// Inbound datagrams that failed to parse.
    pub malformed: u64,
    per_peer: HashMap<[u8; 6], u64>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful broadcast from `mac`.
    pub fn record_sent(&mut self, mac: MacAddress) {
        self.sent += 1;
        *self.per_peer.entry(mac.bytes()).or_default() += 1;
    }

    pub fn record_received(&mut self) {
        self.received += 1;
    }

    pub fn record_malformed(&mut self) {
        self.malformed += 1;
    }

    /// Records an accepted offer, attributed to the server's MAC when known.
    pub fn record_processed(&mut self, peer: Option<MacAddress>) {
        self.processed += 1;
        if let Some(mac) = peer {
            *self.per_peer.entry(mac.bytes()).or_default() += 1;
        }
    }

    /// Packets counted for `mac`.
    pub fn peer_count(&self, mac: &MacAddress) -> u64 {
        self.per_peer.get(&mac.bytes()).copied().unwrap_or(0)
    }

    /// Per-peer counts sorted by address.
    pub fn peers(&self) -> Vec<(MacAddress, u64)> {
        let mut peers: Vec<([u8; 6], u64)> =
            self.per_peer.iter().map(|(mac, count)| (*mac, *count)).collect();
        peers.sort();
        peers
            .into_iter()
            .map(|(bytes, count)| (MacAddress::new(bytes), count))
            .collect()
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Packets sent:      {}", self.sent)?;
        writeln!(f, "Packets received:  {}", self.received)?;
        writeln!(f, "Packets processed: {}", self.processed)?;
        if self.malformed > 0 {
            writeln!(f, "Packets malformed: {}", self.malformed)?;
        }
        for (mac, count) in self.peers() {
            writeln!(f, "  {}  {}", mac, count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MacAddress {
        MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])
    }

    fn server() -> MacAddress {
        MacAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55])
    }

    #[test]
    fn test_counters_start_at_zero() {
        let stats = Stats::new();
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.received, 0);
        assert_eq!(stats.processed, 0);
        assert!(stats.peers().is_empty());
    }

    #[test]
    fn test_record_sent_counts_requester() {
        let mut stats = Stats::new();
        stats.record_sent(client());
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.peer_count(&client()), 1);
    }

    #[test]
    fn test_record_processed_with_and_without_peer() {
        let mut stats = Stats::new();
        stats.record_received();
        stats.record_processed(Some(server()));
        stats.record_received();
        stats.record_processed(None);

        assert_eq!(stats.received, 2);
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.peer_count(&server()), 1);
        assert_eq!(stats.peers().len(), 1);
    }

    #[test]
    fn test_peers_sorted() {
        let mut stats = Stats::new();
        stats.record_sent(client());
        stats.record_processed(Some(server()));
        let peers = stats.peers();
        assert_eq!(peers, vec![(server(), 1), (client(), 1)]);
    }

    #[test]
    fn test_display_summary() {
        let mut stats = Stats::new();
        stats.record_sent(client());
        let summary = stats.to_string();
        assert!(summary.contains("Packets sent:      1"));
        assert!(summary.contains("AA:BB:CC:DD:EE:FF  1"));
        assert!(!summary.contains("malformed"));
    }
}
