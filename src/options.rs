//! DHCP options as defined in RFC 2132.
//!
//! Each option has a code (1 byte), length (1 byte), and variable-length data.
//! The packet codec keeps options as raw [`RawOption`] triples so a captured
//! datagram re-serializes byte for byte; [`DhcpOption`] is the typed view
//! used for accessors and display.
//!
//! # References
//!
//! - RFC 2132: DHCP Options and BOOTP Vendor Extensions

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// Largest value an option length byte can describe.
pub const MAX_OPTION_LEN: usize = u8::MAX as usize;

/// DHCP option codes understood by the probe.
///
/// Unknown codes are handled via [`DhcpOption::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionCode {
    /// Padding (no operation). Used for alignment.
    Pad = 0,
    /// Subnet mask (RFC 2132 §3.3).
    SubnetMask = 1,
    /// Router/gateway addresses (RFC 2132 §3.5).
    Router = 3,
    /// DNS server addresses (RFC 2132 §3.8).
    DnsServer = 6,
    /// Client hostname (RFC 2132 §3.14).
    Hostname = 12,
    /// Domain name for DNS resolution (RFC 2132 §3.17).
    DomainName = 15,
    /// Interface MTU (RFC 2132 §5.1).
    InterfaceMtu = 26,
    /// Broadcast address (RFC 2132 §5.3).
    BroadcastAddress = 28,
    /// IP address lease time in seconds (RFC 2132 §9.2).
    LeaseTime = 51,
    /// Option overload, sname/file fields carry options (RFC 2132 §9.3).
    OptionOverload = 52,
    /// DHCP message type (RFC 2132 §9.6).
    MessageType = 53,
    /// Server identifier (RFC 2132 §9.7).
    ServerIdentifier = 54,
    /// Parameter request list (RFC 2132 §9.8).
    ParameterRequestList = 55,
    /// Renewal time T1 (RFC 2132 §9.11).
    RenewalTime = 58,
    /// Rebinding time T2 (RFC 2132 §9.12).
    RebindingTime = 59,
    /// Vendor class identifier (RFC 2132 §9.13).
    VendorClassIdentifier = 60,
    /// Client identifier (RFC 2132 §9.14).
    ClientIdentifier = 61,
    /// End of options marker.
    End = 255,
}

impl TryFrom<u8> for OptionCode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pad),
            1 => Ok(Self::SubnetMask),
            3 => Ok(Self::Router),
            6 => Ok(Self::DnsServer),
            12 => Ok(Self::Hostname),
            15 => Ok(Self::DomainName),
            26 => Ok(Self::InterfaceMtu),
            28 => Ok(Self::BroadcastAddress),
            51 => Ok(Self::LeaseTime),
            52 => Ok(Self::OptionOverload),
            53 => Ok(Self::MessageType),
            54 => Ok(Self::ServerIdentifier),
            55 => Ok(Self::ParameterRequestList),
            58 => Ok(Self::RenewalTime),
            59 => Ok(Self::RebindingTime),
            60 => Ok(Self::VendorClassIdentifier),
            61 => Ok(Self::ClientIdentifier),
            255 => Ok(Self::End),
            other => Err(other),
        }
    }
}

/// DHCP message types (Option 53) as defined in RFC 2132 §9.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Client broadcast to locate servers.
    Discover = 1,
    /// Server response to DISCOVER with IP offer.
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            other => Err(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discover => write!(f, "DISCOVER"),
            Self::Offer => write!(f, "OFFER"),
            Self::Request => write!(f, "REQUEST"),
            Self::Decline => write!(f, "DECLINE"),
            Self::Ack => write!(f, "ACK"),
            Self::Nak => write!(f, "NAK"),
            Self::Release => write!(f, "RELEASE"),
            Self::Inform => write!(f, "INFORM"),
        }
    }
}

/// Option overload flags (Option 52) as defined in RFC 2132 §9.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OverloadFlag {
    /// The `file` field contains options.
    File = 1,
    /// The `sname` field contains options.
    Sname = 2,
    /// Both `file` and `sname` fields contain options.
    Both = 3,
}

impl TryFrom<u8> for OverloadFlag {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::File),
            2 => Ok(Self::Sname),
            3 => Ok(Self::Both),
            other => Err(other),
        }
    }
}

/// An option exactly as it appeared on the wire.
///
/// A [`OptionCode::Pad`] entry stands for a single pad byte and carries no
/// data. Values longer than [`MAX_OPTION_LEN`] are rejected at serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOption {
    pub code: u8,
    pub data: Vec<u8>,
}

impl RawOption {
    pub fn new(code: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            data: data.into(),
        }
    }

    pub fn pad() -> Self {
        Self::new(OptionCode::Pad as u8, Vec::new())
    }

    pub fn is_pad(&self) -> bool {
        self.code == OptionCode::Pad as u8
    }

    /// Appends the TLV encoding of this option to `buffer`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the value does not fit a length byte.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) -> Result<()> {
        if self.is_pad() {
            buffer.push(self.code);
            return Ok(());
        }
        let length = u8::try_from(self.data.len()).map_err(|_| {
            Error::Serialization(format!(
                "Option {} value is {} bytes (maximum {})",
                self.code,
                self.data.len(),
                MAX_OPTION_LEN
            ))
        })?;
        buffer.push(self.code);
        buffer.push(length);
        buffer.extend_from_slice(&self.data);
        Ok(())
    }

    /// Returns the typed view of this option.
    pub fn decode(&self) -> Result<DhcpOption> {
        DhcpOption::parse(self.code, &self.data)
    }
}

/// Splits an options area into raw options.
///
/// Stops at the end marker and returns the options together with the offset
/// just past it (or the buffer length if no end marker was present).
pub(crate) fn split_options(data: &[u8]) -> std::result::Result<(Vec<RawOption>, usize), String> {
    let mut options = Vec::new();
    let mut index = 0;

    while index < data.len() {
        let code = data[index];

        if code == OptionCode::Pad as u8 {
            options.push(RawOption::pad());
            index += 1;
            continue;
        }

        if code == OptionCode::End as u8 {
            return Ok((options, index + 1));
        }

        if index + 1 >= data.len() {
            return Err(format!("Option {} length missing", code));
        }

        let length = data[index + 1] as usize;

        if index + 2 + length > data.len() {
            return Err(format!(
                "Option {} declares {} bytes but only {} remain",
                code,
                length,
                data.len() - index - 2
            ));
        }

        options.push(RawOption::new(code, &data[index + 2..index + 2 + length]));
        index += 2 + length;
    }

    Ok((options, data.len()))
}

/// A parsed DHCP option.
///
/// Unknown options are preserved as [`Unknown`](Self::Unknown).
#[derive(Debug, Clone, PartialEq)]
pub enum DhcpOption {
    SubnetMask(Ipv4Addr),
    /// Router/gateway addresses (Option 3). First address is the default gateway.
    Router(Vec<Ipv4Addr>),
    DnsServer(Vec<Ipv4Addr>),
    Hostname(String),
    DomainName(String),
    InterfaceMtu(u16),
    BroadcastAddress(Ipv4Addr),
    /// Lease time in seconds (Option 51).
    LeaseTime(u32),
    OptionOverload(OverloadFlag),
    MessageType(MessageType),
    /// Server identifier, the IP of the offering DHCP server (Option 54).
    ServerIdentifier(Ipv4Addr),
    ParameterRequestList(Vec<u8>),
    RenewalTime(u32),
    RebindingTime(u32),
    /// Implementation identity advertised by a client (Option 60).
    VendorClassIdentifier(String),
    ClientIdentifier(Vec<u8>),
    /// Unknown option with raw code and data.
    Unknown(u8, Vec<u8>),
}

fn parse_addr(data: &[u8], what: &str) -> Result<Ipv4Addr> {
    match data {
        [a, b, c, d] => Ok(Ipv4Addr::new(*a, *b, *c, *d)),
        _ => Err(Error::InvalidPacket(format!("Invalid {} length", what))),
    }
}

fn parse_addr_list(data: &[u8], what: &str) -> Result<Vec<Ipv4Addr>> {
    if data.is_empty() || !data.len().is_multiple_of(4) {
        return Err(Error::InvalidPacket(format!(
            "Invalid {} option length",
            what
        )));
    }
    Ok(data
        .chunks_exact(4)
        .map(|chunk| Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]))
        .collect())
}

fn parse_u32(data: &[u8], what: &str) -> Result<u32> {
    let bytes: [u8; 4] = data
        .try_into()
        .map_err(|_| Error::InvalidPacket(format!("Invalid {} length", what)))?;
    Ok(u32::from_be_bytes(bytes))
}

fn parse_u8(data: &[u8], what: &str) -> Result<u8> {
    match data {
        [value] => Ok(*value),
        _ => Err(Error::InvalidPacket(format!("Invalid {} length", what))),
    }
}

impl DhcpOption {
    /// Builds the vendor class identifier option sent with every DISCOVER.
    pub fn vendor_class(identity: impl Into<String>) -> Self {
        Self::VendorClassIdentifier(identity.into())
    }

    /// Returns the RFC 2132 option code for this option.
    pub fn option_code(&self) -> u8 {
        match self {
            Self::SubnetMask(_) => OptionCode::SubnetMask as u8,
            Self::Router(_) => OptionCode::Router as u8,
            Self::DnsServer(_) => OptionCode::DnsServer as u8,
            Self::Hostname(_) => OptionCode::Hostname as u8,
            Self::DomainName(_) => OptionCode::DomainName as u8,
            Self::InterfaceMtu(_) => OptionCode::InterfaceMtu as u8,
            Self::BroadcastAddress(_) => OptionCode::BroadcastAddress as u8,
            Self::LeaseTime(_) => OptionCode::LeaseTime as u8,
            Self::OptionOverload(_) => OptionCode::OptionOverload as u8,
            Self::MessageType(_) => OptionCode::MessageType as u8,
            Self::ServerIdentifier(_) => OptionCode::ServerIdentifier as u8,
            Self::ParameterRequestList(_) => OptionCode::ParameterRequestList as u8,
            Self::RenewalTime(_) => OptionCode::RenewalTime as u8,
            Self::RebindingTime(_) => OptionCode::RebindingTime as u8,
            Self::VendorClassIdentifier(_) => OptionCode::VendorClassIdentifier as u8,
            Self::ClientIdentifier(_) => OptionCode::ClientIdentifier as u8,
            Self::Unknown(code, _) => *code,
        }
    }

    /// Human readable option name used in packet dumps.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubnetMask(_) => "Subnet Mask",
            Self::Router(_) => "Router",
            Self::DnsServer(_) => "Domain Name Server",
            Self::Hostname(_) => "Host Name",
            Self::DomainName(_) => "Domain Name",
            Self::InterfaceMtu(_) => "Interface MTU",
            Self::BroadcastAddress(_) => "Broadcast Address",
            Self::LeaseTime(_) => "IP Address Lease Time",
            Self::OptionOverload(_) => "Option Overload",
            Self::MessageType(_) => "DHCP Message Type",
            Self::ServerIdentifier(_) => "Server Identifier",
            Self::ParameterRequestList(_) => "Parameter Request List",
            Self::RenewalTime(_) => "Renewal (T1) Time",
            Self::RebindingTime(_) => "Rebinding (T2) Time",
            Self::VendorClassIdentifier(_) => "Vendor Class Identifier",
            Self::ClientIdentifier(_) => "Client Identifier",
            Self::Unknown(_, _) => "Unknown",
        }
    }

    /// Parses a DHCP option from its code and raw data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacket`] if the data length is invalid for
    /// the option type (e.g., subnet mask must be exactly 4 bytes).
    pub fn parse(code: u8, data: &[u8]) -> Result<Self> {
        let text = || String::from_utf8_lossy(data).to_string();

        match OptionCode::try_from(code) {
            Ok(OptionCode::SubnetMask) => Ok(Self::SubnetMask(parse_addr(data, "subnet mask")?)),
            Ok(OptionCode::Router) => Ok(Self::Router(parse_addr_list(data, "router")?)),
            Ok(OptionCode::DnsServer) => Ok(Self::DnsServer(parse_addr_list(data, "DNS server")?)),
            Ok(OptionCode::Hostname) => Ok(Self::Hostname(text())),
            Ok(OptionCode::DomainName) => Ok(Self::DomainName(text())),
            Ok(OptionCode::InterfaceMtu) => {
                let bytes: [u8; 2] = data
                    .try_into()
                    .map_err(|_| Error::InvalidPacket("Invalid MTU length".to_string()))?;
                Ok(Self::InterfaceMtu(u16::from_be_bytes(bytes)))
            }
            Ok(OptionCode::BroadcastAddress) => Ok(Self::BroadcastAddress(parse_addr(
                data,
                "broadcast address",
            )?)),
            Ok(OptionCode::LeaseTime) => Ok(Self::LeaseTime(parse_u32(data, "lease time")?)),
            Ok(OptionCode::OptionOverload) => {
                let value = parse_u8(data, "option overload")?;
                let flag = OverloadFlag::try_from(value).map_err(|value| {
                    Error::InvalidPacket(format!("Invalid option overload value: {}", value))
                })?;
                Ok(Self::OptionOverload(flag))
            }
            Ok(OptionCode::MessageType) => {
                let value = parse_u8(data, "message type")?;
                let msg_type = MessageType::try_from(value).map_err(|value| {
                    Error::InvalidPacket(format!("Unknown message type: {}", value))
                })?;
                Ok(Self::MessageType(msg_type))
            }
            Ok(OptionCode::ServerIdentifier) => Ok(Self::ServerIdentifier(parse_addr(
                data,
                "server identifier",
            )?)),
            Ok(OptionCode::ParameterRequestList) => Ok(Self::ParameterRequestList(data.to_vec())),
            Ok(OptionCode::RenewalTime) => Ok(Self::RenewalTime(parse_u32(data, "renewal time")?)),
            Ok(OptionCode::RebindingTime) => {
                Ok(Self::RebindingTime(parse_u32(data, "rebinding time")?))
            }
            Ok(OptionCode::VendorClassIdentifier) => Ok(Self::VendorClassIdentifier(text())),
            Ok(OptionCode::ClientIdentifier) => Ok(Self::ClientIdentifier(data.to_vec())),
            Ok(OptionCode::Pad) | Ok(OptionCode::End) => Err(Error::InvalidPacket(
                "Pad/End should not be parsed as options".to_string(),
            )),
            Err(unknown_code) => Ok(Self::Unknown(unknown_code, data.to_vec())),
        }
    }

    fn value(&self) -> Vec<u8> {
        match self {
            Self::SubnetMask(addr)
            | Self::BroadcastAddress(addr)
            | Self::ServerIdentifier(addr) => addr.octets().to_vec(),
            Self::Router(addrs) | Self::DnsServer(addrs) => addrs
                .iter()
                .take(MAX_OPTION_LEN / 4)
                .flat_map(|addr| addr.octets())
                .collect(),
            Self::Hostname(text) | Self::DomainName(text) | Self::VendorClassIdentifier(text) => {
                text.as_bytes().to_vec()
            }
            Self::InterfaceMtu(mtu) => mtu.to_be_bytes().to_vec(),
            Self::LeaseTime(time) | Self::RenewalTime(time) | Self::RebindingTime(time) => {
                time.to_be_bytes().to_vec()
            }
            Self::OptionOverload(flag) => vec![*flag as u8],
            Self::MessageType(msg_type) => vec![*msg_type as u8],
            Self::ParameterRequestList(data)
            | Self::ClientIdentifier(data)
            | Self::Unknown(_, data) => data.clone(),
        }
    }

    /// Converts to a raw option, truncating values longer than 255 bytes.
    pub fn to_raw(&self) -> RawOption {
        let mut value = self.value();
        value.truncate(MAX_OPTION_LEN);
        RawOption::new(self.option_code(), value)
    }

    /// Encodes the option to its wire format (code + length + data).
    pub fn encode(&self) -> Vec<u8> {
        let raw = self.to_raw();
        let mut result = Vec::with_capacity(raw.data.len() + 2);
        result.push(raw.code);
        result.push(raw.data.len() as u8);
        result.extend_from_slice(&raw.data);
        result
    }
}

pub(crate) fn join_addrs(addrs: &[Ipv4Addr]) -> String {
    addrs
        .iter()
        .map(Ipv4Addr::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<Vec<_>>()
        .join(":")
}

impl fmt::Display for DhcpOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>3} {}: ", self.option_code(), self.name())?;
        match self {
            Self::SubnetMask(addr)
            | Self::BroadcastAddress(addr)
            | Self::ServerIdentifier(addr) => write!(f, "{}", addr),
            Self::Router(addrs) | Self::DnsServer(addrs) => write!(f, "{}", join_addrs(addrs)),
            Self::Hostname(text) | Self::DomainName(text) | Self::VendorClassIdentifier(text) => {
                write!(f, "{}", text)
            }
            Self::InterfaceMtu(mtu) => write!(f, "{}", mtu),
            Self::LeaseTime(secs) | Self::RenewalTime(secs) | Self::RebindingTime(secs) => {
                write!(f, "{}s", secs)
            }
            Self::OptionOverload(flag) => write!(f, "{:?}", flag),
            Self::MessageType(msg_type) => write!(f, "{}", msg_type),
            Self::ParameterRequestList(codes) => write!(
                f,
                "{}",
                codes
                    .iter()
                    .map(u8::to_string)
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
            Self::ClientIdentifier(data) | Self::Unknown(_, data) => write!(f, "{}", hex(data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_conversions() {
        for value in 1..=8u8 {
            let msg_type = MessageType::try_from(value).unwrap();
            assert_eq!(msg_type as u8, value);
        }
        assert!(MessageType::try_from(0).is_err());
        assert!(MessageType::try_from(9).is_err());
    }

    #[test]
    fn test_option_encode_decode_roundtrip() {
        let options: Vec<DhcpOption> = vec![
            DhcpOption::SubnetMask(Ipv4Addr::new(255, 255, 255, 0)),
            DhcpOption::Router(vec![Ipv4Addr::new(192, 168, 1, 1)]),
            DhcpOption::DnsServer(vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(1, 1, 1, 1)]),
            DhcpOption::DomainName("example.local".to_string()),
            DhcpOption::LeaseTime(86400),
            DhcpOption::MessageType(MessageType::Offer),
            DhcpOption::ServerIdentifier(Ipv4Addr::new(192, 168, 1, 1)),
            DhcpOption::InterfaceMtu(1500),
            DhcpOption::vendor_class("dhcprobe-0.1.0"),
        ];

        for original in options {
            let encoded = original.encode();
            let decoded = DhcpOption::parse(encoded[0], &encoded[2..]).unwrap();
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn test_vendor_class_wire_format() {
        let encoded = DhcpOption::vendor_class("dhcprobe-0.1").encode();
        assert_eq!(encoded[0], 60);
        assert_eq!(encoded[1], 12);
        assert_eq!(&encoded[2..], b"dhcprobe-0.1");
    }

    #[test]
    fn test_option_invalid_lengths() {
        assert!(DhcpOption::parse(1, &[255, 255, 255]).is_err());
        assert!(DhcpOption::parse(3, &[]).is_err());
        assert!(DhcpOption::parse(6, &[8, 8, 8]).is_err());
        assert!(DhcpOption::parse(51, &[0, 0, 0]).is_err());
        assert!(DhcpOption::parse(53, &[]).is_err());
        assert!(DhcpOption::parse(53, &[42]).is_err());
    }

    #[test]
    fn test_unknown_option() {
        let decoded = DhcpOption::parse(100, &[1, 2, 3, 4]).unwrap();
        assert_eq!(decoded, DhcpOption::Unknown(100, vec![1, 2, 3, 4]));
        assert_eq!(decoded.to_string(), "100 Unknown: 01:02:03:04");
    }

    #[test]
    fn test_long_values_truncated_by_typed_encode() {
        let encoded = DhcpOption::Hostname("a".repeat(300)).encode();
        assert_eq!(encoded[1], 255);
        assert_eq!(encoded.len(), 257);
    }

    #[test]
    fn test_raw_option_rejects_oversized_value() {
        let mut buffer = Vec::new();
        let result = RawOption::new(43, vec![0u8; 256]).encode_into(&mut buffer);
        assert!(matches!(result, Err(Error::Serialization(_))));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_split_options_keeps_pads_and_stops_at_end() {
        let area = [0, 53, 1, 2, 0, 255, 0, 0];
        let (options, consumed) = split_options(&area).unwrap();
        assert_eq!(
            options,
            vec![RawOption::pad(), RawOption::new(53, vec![2]), RawOption::pad()]
        );
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_split_options_rejects_overrun() {
        assert!(split_options(&[51, 4, 0, 0]).is_err());
        assert!(split_options(&[51]).is_err());
    }

    #[test]
    fn test_option_display() {
        assert_eq!(
            DhcpOption::MessageType(MessageType::Offer).to_string(),
            " 53 DHCP Message Type: OFFER"
        );
        assert_eq!(
            DhcpOption::Router(vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)])
                .to_string(),
            "  3 Router: 10.0.0.1, 10.0.0.2"
        );
        assert_eq!(
            DhcpOption::LeaseTime(3600).to_string(),
            " 51 IP Address Lease Time: 3600s"
        );
    }

    #[test]
    fn test_message_type_display() {
        assert_eq!(format!("{}", MessageType::Discover), "DISCOVER");
        assert_eq!(format!("{}", MessageType::Offer), "OFFER");
        assert_eq!(format!("{}", MessageType::Nak), "NAK");
    }
}
