//! # dhcprobe
//!
//! A DHCP discovery probe implementing the client side of RFC 2131's
//! DISCOVER/OFFER exchange.
//!
//! ## Features
//!
//! - Broadcasts a single DISCOVER carrying a vendor class identifier
//! - Collects every OFFER that answers it within a listening window
//! - Send-only mode that fires the DISCOVER without waiting
//! - Offeror details: IP, host name, MAC address and vendor
//! - Traffic counters per run
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use dhcprobe::{ArpTable, DhcpClient, Discovery, NullReporter, Stats, lookup};
//!
//! #[tokio::main]
//! async fn main() -> dhcprobe::Result<()> {
//!     let mac = lookup::mac_from_interface("eth0")?;
//!     let client = DhcpClient::new(Some("eth0"))?;
//!     let mut stats = Stats::new();
//!     let outcome = Discovery::new(mac, Duration::from_secs(5))
//!         .run(client, &ArpTable, &mut NullReporter, &mut stats)
//!         .await?;
//!     println!("{} offer(s)", outcome.offers.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`DhcpPacket`] - DHCP packet parsing and encoding
//! - [`DhcpOption`] - DHCP option types per RFC 2132
//! - [`DhcpClient`] - UDP socket on port 68, listening or send-only
//! - [`Discovery`] - One DISCOVER/OFFER round
//! - [`Stats`] - Sent/received/processed counters
//! - [`Config`] - Probe settings

pub mod config;
pub mod error;
pub mod lookup;
pub mod options;
pub mod packet;
pub mod report;
pub mod session;
pub mod stats;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
pub use lookup::{ArpTable, Neighbors, OuiDatabase};
pub use options::{DhcpOption, MessageType, RawOption};
pub use packet::DhcpPacket;
pub use report::{ConsoleReporter, NullReporter, Reporter};
pub use session::{Discovery, DiscoveryOutcome, Offer, Resolver, SessionState, offer_matches};
pub use stats::Stats;
pub use transport::{ClientMode, DhcpClient, Transport};
