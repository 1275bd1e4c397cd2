//! Console output for a discovery round.
//!
//! The session calls a [`Reporter`] at each event; [`ConsoleReporter`]
//! prints packet dumps and offeror details, [`NullReporter`] drops them.

use std::fmt;

use crate::error::Error;
use crate::lookup::OuiDatabase;
use crate::options::join_addrs;
use crate::packet::{BOOTREPLY, BOOTREQUEST, DhcpPacket};
use crate::session::{DiscoveryOutcome, Offer};

/// Receives discovery events. Every method defaults to doing nothing.
pub trait Reporter {
    /// Called just before the DISCOVER is broadcast.
    fn discover_sent(&mut self, _packet: &DhcpPacket) {}

    fn offer_received(&mut self, _offer: &Offer) {}

    /// A datagram arrived but did not parse; listening continues.
    fn malformed(&mut self, _error: &Error) {}

    /// Receiving failed for a reason other than the window closing.
    fn receive_failed(&mut self, _error: &Error) {}

    fn finished(&mut self, _outcome: &DiscoveryOutcome) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {}

/// Prints events to stdout, errors to stderr.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    /// Skip packet dumps, keep the one-line summaries.
    pub quiet: bool,
    pub vendors: OuiDatabase,
}

impl ConsoleReporter {
    pub fn new(quiet: bool, vendors: OuiDatabase) -> Self {
        Self { quiet, vendors }
    }

    /// Formats the offeror lines: address, host name, MAC and vendor,
    /// followed by what the server is offering.
    pub fn describe_offer(&self, offer: &Offer) -> String {
        let mac = offer
            .server_mac
            .map(|mac| mac.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let vendor = offer
            .server_mac
            .and_then(|mac| self.vendors.vendor(&mac))
            .unwrap_or("unknown vendor");

        format!(
            "<<< Receive DHCP offer from {} ({}) at {} (+{:.3}s)\n    MAC address: {} ({})\n    {}",
            offer.server.ip(),
            offer.server_name.as_deref().unwrap_or("no name"),
            offer.received_at.format("%H:%M:%S%.3f"),
            offer.elapsed.as_secs_f64(),
            mac,
            vendor,
            summarize_offer(&offer.packet)
        )
    }
}

impl Reporter for ConsoleReporter {
    fn discover_sent(&mut self, packet: &DhcpPacket) {
        println!("\n>>> Send DHCP discover");
        if !self.quiet {
            print!("{}", PacketDump(packet));
        }
    }

    fn offer_received(&mut self, offer: &Offer) {
        println!("\n{}", self.describe_offer(offer));
        if !self.quiet {
            print!("{}", PacketDump(&offer.packet));
        }
    }

    fn malformed(&mut self, error: &Error) {
        eprintln!("{}", error);
    }

    fn receive_failed(&mut self, error: &Error) {
        eprintln!("{}", error);
    }

    fn finished(&mut self, outcome: &DiscoveryOutcome) {
        if outcome.listened {
            println!("No more offers.");
        }
    }
}

/// One line with the offered address and the lease parameters that came
/// with it. Absent options are left out.
pub fn summarize_offer(packet: &DhcpPacket) -> String {
    let mut parts = Vec::new();
    if let Some(server) = packet.server_identifier() {
        parts.push(format!("server id {}", server));
    }
    if let Some(mask) = packet.subnet_mask() {
        parts.push(format!("mask {}", mask));
    }
    let routers = packet.routers();
    if !routers.is_empty() {
        parts.push(format!("router {}", join_addrs(&routers)));
    }
    let dns = packet.dns_servers();
    if !dns.is_empty() {
        parts.push(format!("dns {}", join_addrs(&dns)));
    }
    if let Some(domain) = packet.domain_name() {
        parts.push(format!("domain {}", domain));
    }
    if let Some(lease) = packet.lease_time() {
        parts.push(format!("lease {}s", lease));
    }

    if parts.is_empty() {
        format!("Offered: {}", packet.yiaddr)
    } else {
        format!("Offered: {} ({})", packet.yiaddr, parts.join(", "))
    }
}

fn op_name(op: u8) -> &'static str {
    match op {
        BOOTREQUEST => "BOOTREQUEST",
        BOOTREPLY => "BOOTREPLY",
        _ => "unknown",
    }
}

/// Renders the header fields and options of a packet, one per line.
pub struct PacketDump<'a>(pub &'a DhcpPacket);

impl fmt::Display for PacketDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let packet = self.0;
        writeln!(f, "    op: {} ({})", packet.op, op_name(packet.op))?;
        writeln!(
            f,
            "    htype: {}  hlen: {}  hops: {}",
            packet.htype, packet.hlen, packet.hops
        )?;
        writeln!(f, "    xid: {:#010x}", packet.xid)?;
        writeln!(
            f,
            "    secs: {}  flags: {:#06x}{}",
            packet.secs,
            packet.flags,
            if packet.is_broadcast() { " (broadcast)" } else { "" }
        )?;
        writeln!(f, "    ciaddr: {}", packet.ciaddr)?;
        writeln!(f, "    yiaddr: {}", packet.yiaddr)?;
        writeln!(f, "    siaddr: {}", packet.siaddr)?;
        writeln!(f, "    giaddr: {}", packet.giaddr)?;
        writeln!(f, "    chaddr: {}", packet.format_mac())?;
        if let Some(sname) = packet.server_name() {
            writeln!(f, "    sname: {}", sname)?;
        }
        if let Some(file) = packet.boot_file() {
            writeln!(f, "    file: {}", file)?;
        }

        let options = packet.decoded_options();
        if !options.is_empty() {
            writeln!(f, "    options:")?;
            for option in options {
                writeln!(f, "    {}", option)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use mac_address::MacAddress;

    use crate::options::{DhcpOption, MessageType};

    fn offer(server_mac: Option<MacAddress>, server_name: Option<&str>) -> Offer {
        let discover = DhcpPacket::new_discover();
        Offer {
            packet: DhcpPacket::create_reply(
                &discover,
                MessageType::Offer,
                Ipv4Addr::new(192, 0, 2, 50),
                Ipv4Addr::new(192, 0, 2, 1),
                vec![DhcpOption::ServerIdentifier(Ipv4Addr::new(192, 0, 2, 1))],
            ),
            server: SocketAddr::from((Ipv4Addr::new(192, 0, 2, 1), 67)),
            server_mac,
            server_name: server_name.map(str::to_string),
            received_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 15).unwrap(),
            elapsed: Duration::from_millis(1250),
        }
    }

    #[test]
    fn test_packet_dump() {
        let mut packet = DhcpPacket::new_discover();
        packet.xid = 0x12345678;
        packet
            .set_client_mac(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])
            .unwrap();
        packet.push_option(DhcpOption::MessageType(MessageType::Discover));
        packet.push_option(DhcpOption::vendor_class("dhcprobe-test"));

        let dump = PacketDump(&packet).to_string();
        assert!(dump.contains("op: 1 (BOOTREQUEST)"));
        assert!(dump.contains("xid: 0x12345678"));
        assert!(dump.contains("flags: 0x8000 (broadcast)"));
        assert!(dump.contains("chaddr: aa:bb:cc:dd:ee:ff"));
        assert!(dump.contains(" 53 DHCP Message Type: DISCOVER"));
        assert!(dump.contains(" 60 Vendor Class Identifier: dhcprobe-test"));
        assert!(!dump.contains("sname"));
        assert!(dump.ends_with('\n'));
    }

    #[test]
    fn test_describe_offer_with_vendor() {
        let vendors = OuiDatabase::parse("00-11-22   (hex)\t\tExample Networks\n");
        let reporter = ConsoleReporter::new(false, vendors);
        let mac = MacAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);

        let text = reporter.describe_offer(&offer(Some(mac), None));
        assert!(text.contains("offer from 192.0.2.1 (no name) at 12:30:15.000 (+1.250s)"));
        assert!(text.contains("MAC address: 00:11:22:33:44:55 (Example Networks)"));
        assert!(text.contains("Offered: 192.0.2.50 (server id 192.0.2.1)"));
    }

    #[test]
    fn test_describe_offer_without_mac() {
        let reporter = ConsoleReporter::default();
        let text = reporter.describe_offer(&offer(None, Some("dhcp.example.net")));
        assert!(text.contains("offer from 192.0.2.1 (dhcp.example.net)"));
        assert!(text.contains("MAC address: unknown (unknown vendor)"));
    }

    #[test]
    fn test_summarize_offer_lists_lease_parameters() {
        let discover = DhcpPacket::new_discover();
        let packet = DhcpPacket::create_reply(
            &discover,
            MessageType::Offer,
            Ipv4Addr::new(10, 0, 0, 42),
            Ipv4Addr::new(10, 0, 0, 1),
            vec![
                DhcpOption::ServerIdentifier(Ipv4Addr::new(10, 0, 0, 1)),
                DhcpOption::SubnetMask(Ipv4Addr::new(255, 255, 255, 0)),
                DhcpOption::Router(vec![Ipv4Addr::new(10, 0, 0, 1)]),
                DhcpOption::DnsServer(vec![Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 3)]),
                DhcpOption::DomainName("lab.example".to_string()),
                DhcpOption::LeaseTime(7200),
            ],
        );

        assert_eq!(
            summarize_offer(&packet),
            "Offered: 10.0.0.42 (server id 10.0.0.1, mask 255.255.255.0, router 10.0.0.1, \
             dns 10.0.0.2, 10.0.0.3, domain lab.example, lease 7200s)"
        );
    }

    #[test]
    fn test_summarize_offer_without_options() {
        let discover = DhcpPacket::new_discover();
        let packet = DhcpPacket::create_reply(
            &discover,
            MessageType::Offer,
            Ipv4Addr::new(10, 0, 0, 42),
            Ipv4Addr::new(10, 0, 0, 1),
            vec![],
        );
        assert_eq!(summarize_offer(&packet), "Offered: 10.0.0.42");
    }
}
