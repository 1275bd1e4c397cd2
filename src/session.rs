//! One discovery round: broadcast a DISCOVER, then collect matching offers
//! until the listening window closes.
//!
//! ```text
//! Idle --broadcast ok--> Sent --timeout > 0--> Listening --window over--> Done
//!   |                      |                                               ^
//!   +--build/send error--> Failed   +--------timeout == 0 (send only)------+
//! ```
//!
//! The window is measured from a single start instant; each receive gets
//! only what is left of it, so a trickle of stray datagrams cannot stretch
//! the round.
//!
//! Reverse name lookups run on the blocking pool while receiving goes on.
//! An offer is reported once its lookup finishes, in arrival order.

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use chrono::{DateTime, Utc};
use mac_address::MacAddress;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::lookup::Neighbors;
use crate::options::{DhcpOption, MAX_OPTION_LEN, MessageType, OptionCode};
use crate::packet::DhcpPacket;
use crate::report::Reporter;
use crate::stats::Stats;
use crate::transport::Transport;

/// Identity advertised in the vendor class identifier option.
pub fn default_vendor_class() -> String {
    format!("dhcprobe-{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Sent,
    Listening,
    Done,
    Failed,
}

/// A reply accepted as an answer to our DISCOVER.
#[derive(Debug, Clone)]
pub struct Offer {
    pub packet: DhcpPacket,
    /// Where the datagram came from.
    pub server: SocketAddr,
    /// Hardware address of the sender, if the neighbour table knows it.
    pub server_mac: Option<MacAddress>,
    /// Reverse DNS name of the sender, when resolution is enabled.
    pub server_name: Option<String>,
    pub received_at: DateTime<Utc>,
    /// Time since the listening window opened.
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    pub xid: u32,
    /// Offers in arrival order; several servers may answer one DISCOVER.
    pub offers: Vec<Offer>,
    /// False when the round was send-only.
    pub listened: bool,
}

/// True when `packet` answers the request identified by `xid` and `mac`.
///
/// Both the transaction ID and the 6-byte client hardware address must
/// match; either one alone belongs to another probe or is stale.
pub fn offer_matches(packet: &DhcpPacket, xid: u32, mac: &MacAddress) -> bool {
    packet.xid == xid && packet.client_mac().is_some_and(|client| client == *mac)
}

/// Blocking reverse lookup, run off the async workers.
pub type Resolver = fn(Ipv4Addr) -> Option<String>;

/// Offers whose name lookup is still in flight, oldest first.
type PendingOffers = VecDeque<(Offer, JoinHandle<Option<String>>)>;

enum Event {
    Received(Result<(DhcpPacket, SocketAddr)>),
    Resolved(Option<String>),
}

async fn next_resolved(pending: &mut PendingOffers) -> Option<String> {
    match pending.front_mut() {
        Some((_, lookup)) => lookup.await.ok().flatten(),
        None => None,
    }
}

#[derive(Debug)]
pub struct Discovery {
    mac: MacAddress,
    timeout: Duration,
    vendor_class: String,
    xid: Option<u32>,
    resolver: Option<Resolver>,
    state: SessionState,
}

impl Discovery {
    /// A zero `timeout` makes the round send-only.
    pub fn new(mac: MacAddress, timeout: Duration) -> Self {
        Self {
            mac,
            timeout,
            vendor_class: default_vendor_class(),
            xid: None,
            resolver: None,
            state: SessionState::Idle,
        }
    }

    pub fn with_vendor_class(mut self, vendor_class: impl Into<String>) -> Self {
        self.vendor_class = vendor_class.into();
        self
    }

    /// Uses a fixed transaction ID instead of a random one.
    pub fn with_xid(mut self, xid: u32) -> Self {
        self.xid = Some(xid);
        self
    }

    /// Resolves offeror names with `resolver`, e.g. [`crate::lookup::name_from_ip`].
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Discovery {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Builds the DISCOVER for this round.
    pub fn build_discover(&self) -> Result<DhcpPacket> {
        let mut packet = DhcpPacket::new_discover();
        if let Some(xid) = self.xid {
            packet.xid = xid;
        }
        packet.set_client_mac(&self.mac.bytes())?;
        packet.push_option(DhcpOption::MessageType(MessageType::Discover));

        let class = self.vendor_class.as_bytes();
        let length = u8::try_from(class.len()).map_err(|_| {
            Error::Serialization(format!(
                "Vendor class identifier is {} bytes (maximum {})",
                class.len(),
                MAX_OPTION_LEN
            ))
        })?;
        let mut fragment = vec![OptionCode::VendorClassIdentifier as u8, length];
        fragment.extend_from_slice(class);
        packet.add_options(&fragment)?;

        Ok(packet)
    }

    /// Runs the round to completion.
    ///
    /// The transport is closed before returning on every path. Only a
    /// failure to build or send the DISCOVER is returned as an error; a
    /// receive failure other than a timeout or a malformed datagram ends
    /// the listening window early and is handed to the reporter.
    pub async fn run<T, N, R>(
        &mut self,
        mut transport: T,
        neighbors: &N,
        reporter: &mut R,
        stats: &mut Stats,
    ) -> Result<DiscoveryOutcome>
    where
        T: Transport,
        N: Neighbors + ?Sized,
        R: Reporter + ?Sized,
    {
        let result = self.exchange(&mut transport, neighbors, reporter, stats).await;
        transport.close();

        match result {
            Ok(outcome) => {
                self.transition(SessionState::Done);
                reporter.finished(&outcome);
                Ok(outcome)
            }
            Err(error) => {
                self.transition(SessionState::Failed);
                Err(error)
            }
        }
    }

    async fn exchange<T, N, R>(
        &mut self,
        transport: &mut T,
        neighbors: &N,
        reporter: &mut R,
        stats: &mut Stats,
    ) -> Result<DiscoveryOutcome>
    where
        T: Transport,
        N: Neighbors + ?Sized,
        R: Reporter + ?Sized,
    {
        let discover = self.build_discover()?;
        reporter.discover_sent(&discover);
        transport.broadcast(&discover).await?;
        stats.record_sent(self.mac);
        self.transition(SessionState::Sent);
        info!("DISCOVER sent from {} (xid {:#010x})", self.mac, discover.xid);

        let mut outcome = DiscoveryOutcome {
            xid: discover.xid,
            offers: Vec::new(),
            listened: false,
        };

        if self.timeout.is_zero() || !transport.is_listening() {
            debug!("Send-only round, not waiting for offers");
            return Ok(outcome);
        }

        self.transition(SessionState::Listening);
        outcome.listened = true;
        let start = Instant::now();
        let mut pending = PendingOffers::new();

        loop {
            let remaining = self.timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }

            let event = tokio::select! {
                biased;
                name = next_resolved(&mut pending), if !pending.is_empty() => Event::Resolved(name),
                received = transport.receive(remaining) => Event::Received(received),
            };

            let received = match event {
                Event::Resolved(name) => {
                    if let Some((mut offer, _)) = pending.pop_front() {
                        offer.server_name = name;
                        reporter.offer_received(&offer);
                        outcome.offers.push(offer);
                    }
                    continue;
                }
                Event::Received(received) => received,
            };

            let (reply, server) = match received {
                Ok(received) => received,
                Err(error) if error.is_timeout() => break,
                Err(error) if error.is_decoding() => {
                    debug!("Dropping malformed datagram: {}", error);
                    stats.record_malformed();
                    reporter.malformed(&error);
                    continue;
                }
                Err(error) => {
                    warn!("Receive failed, ending listening window: {}", error);
                    reporter.receive_failed(&error);
                    break;
                }
            };

            stats.record_received();

            if !offer_matches(&reply, discover.xid, &self.mac) {
                debug!(
                    "Ignoring reply from {} (xid {:#010x}, chaddr {})",
                    server,
                    reply.xid,
                    reply.format_mac()
                );
                continue;
            }

            let server_mac = match server.ip() {
                IpAddr::V4(ip) => neighbors.hardware_address(ip),
                IpAddr::V6(_) => None,
            };
            stats.record_processed(server_mac);
            info!("Offer from {} for {}", server, reply.yiaddr);

            let offer = Offer {
                packet: reply,
                server,
                server_mac,
                server_name: None,
                received_at: Utc::now(),
                elapsed: start.elapsed(),
            };

            let lookup = match (self.resolver, server.ip()) {
                (Some(resolver), IpAddr::V4(ip)) => {
                    Some(tokio::task::spawn_blocking(move || resolver(ip)))
                }
                _ => None,
            };

            match lookup {
                Some(lookup) => pending.push_back((offer, lookup)),
                None if pending.is_empty() => {
                    reporter.offer_received(&offer);
                    outcome.offers.push(offer);
                }
                // Queue behind earlier lookups to keep arrival order.
                None => pending.push_back((offer, tokio::spawn(async { None }))),
            }
        }

        while let Some((mut offer, lookup)) = pending.pop_front() {
            offer.server_name = lookup.await.ok().flatten();
            reporter.offer_received(&offer);
            outcome.offers.push(offer);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    use crate::report::NullReporter;

    fn no_neighbors() -> HashMap<Ipv4Addr, MacAddress> {
        HashMap::new()
    }

    fn mac() -> MacAddress {
        MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])
    }

    fn reply_to(discover: &DhcpPacket) -> DhcpPacket {
        DhcpPacket::create_reply(
            discover,
            MessageType::Offer,
            Ipv4Addr::new(192, 0, 2, 50),
            Ipv4Addr::new(192, 0, 2, 1),
            vec![],
        )
    }

    /// Transport that fails or succeeds on broadcast and never receives.
    struct SendOnly {
        fail: bool,
        closed: usize,
        receives: usize,
    }

    impl Transport for SendOnly {
        async fn broadcast(&mut self, _packet: &DhcpPacket) -> Result<()> {
            if self.fail {
                Err(Error::Send("network unreachable".to_string()))
            } else {
                Ok(())
            }
        }

        async fn receive(&mut self, _timeout: Duration) -> Result<(DhcpPacket, SocketAddr)> {
            self.receives += 1;
            Err(Error::NotListening)
        }

        fn is_listening(&self) -> bool {
            true
        }

        fn close(&mut self) {
            self.closed += 1;
        }
    }

    #[test]
    fn test_offer_matches_requires_xid_and_mac() {
        let mut discover = DhcpPacket::new_discover();
        discover.xid = 0x12345678;
        discover.set_client_mac(&mac().bytes()).unwrap();
        let reply = reply_to(&discover);

        assert!(offer_matches(&reply, 0x12345678, &mac()));
        assert!(!offer_matches(&reply, 0x12345679, &mac()));

        let other = MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x00]);
        assert!(!offer_matches(&reply, 0x12345678, &other));

        let mut short = reply.clone();
        short.hlen = 4;
        assert!(!offer_matches(&short, 0x12345678, &mac()));
    }

    #[test]
    fn test_build_discover() {
        let discovery = Discovery::new(mac(), Duration::from_secs(5))
            .with_xid(0x12345678)
            .with_vendor_class("dhcprobe-test");
        let packet = discovery.build_discover().unwrap();

        assert_eq!(packet.xid, 0x12345678);
        assert_eq!(packet.client_mac(), Some(mac()));
        assert_eq!(packet.message_type(), Some(MessageType::Discover));
        assert_eq!(packet.vendor_class(), Some("dhcprobe-test".to_string()));
        assert_eq!(packet.options.len(), 2);
    }

    #[test]
    fn test_oversized_vendor_class_rejected() {
        let discovery = Discovery::new(mac(), Duration::from_secs(5)).with_vendor_class("x".repeat(256));
        assert!(matches!(
            discovery.build_discover(),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_default_vendor_class() {
        assert_eq!(
            default_vendor_class(),
            format!("dhcprobe-{}", env!("CARGO_PKG_VERSION"))
        );
    }

    #[tokio::test]
    async fn test_zero_timeout_never_receives() {
        let mut transport = SendOnly {
            fail: false,
            closed: 0,
            receives: 0,
        };
        let mut stats = Stats::new();
        let mut discovery = Discovery::new(mac(), Duration::ZERO);

        let outcome = discovery
            .run(
                &mut transport,
                &no_neighbors(),
                &mut NullReporter,
                &mut stats,
            )
            .await
            .unwrap();

        assert!(!outcome.listened);
        assert!(outcome.offers.is_empty());
        assert_eq!(transport.receives, 0);
        assert_eq!(transport.closed, 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(discovery.state(), SessionState::Done);
    }

    #[tokio::test]
    async fn test_broadcast_failure_fails_session_and_closes() {
        let mut transport = SendOnly {
            fail: true,
            closed: 0,
            receives: 0,
        };
        let mut stats = Stats::new();
        let mut discovery = Discovery::new(mac(), Duration::from_secs(5));

        let result = discovery
            .run(
                &mut transport,
                &no_neighbors(),
                &mut NullReporter,
                &mut stats,
            )
            .await;

        assert!(matches!(result, Err(Error::Send(_))));
        assert_eq!(discovery.state(), SessionState::Failed);
        assert_eq!(transport.closed, 1);
        assert_eq!(stats.sent, 0);
    }

    #[tokio::test]
    async fn test_non_timeout_receive_error_ends_window() {
        let mut transport = SendOnly {
            fail: false,
            closed: 0,
            receives: 0,
        };
        let mut stats = Stats::new();
        let mut discovery = Discovery::new(mac(), Duration::from_secs(5));

        let outcome = discovery
            .run(
                &mut transport,
                &no_neighbors(),
                &mut NullReporter,
                &mut stats,
            )
            .await
            .unwrap();

        assert!(outcome.listened);
        assert_eq!(transport.receives, 1);
        assert_eq!(stats.received, 0);
        assert_eq!(discovery.state(), SessionState::Done);
    }
}
