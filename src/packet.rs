//! DHCP packet parsing and encoding per RFC 2131.
//!
//! A DHCP packet consists of a fixed 236-byte header followed by a 4-byte
//! magic cookie and variable-length options. This module builds the
//! DISCOVER the probe broadcasts and parses the replies that come back.
//!
//! # Packet Structure
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     op (1)    |   htype (1)   |   hlen (1)    |   hops (1)    |
//! +---------------+---------------+---------------+---------------+
//! |                            xid (4)                            |
//! +-------------------------------+-------------------------------+
//! |           secs (2)            |           flags (2)           |
//! +-------------------------------+-------------------------------+
//! |                          ciaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          yiaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          siaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          giaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          chaddr (16)                          |
//! +---------------------------------------------------------------+
//! |                          sname (64)                           |
//! +---------------------------------------------------------------+
//! |                          file (128)                           |
//! +---------------------------------------------------------------+
//! |                    magic cookie (4) = 99.130.83.99            |
//! +---------------------------------------------------------------+
//! |                          options (variable)                   |
//! +---------------------------------------------------------------+
//! ```
//!
//! Options are stored exactly as received, so re-serializing a parsed
//! datagram reproduces it byte for byte.

use std::net::Ipv4Addr;

use mac_address::MacAddress;

use crate::error::{Error, Result};
use crate::options::{DhcpOption, MessageType, OptionCode, OverloadFlag, RawOption, split_options};

/// DHCP magic cookie that identifies DHCP packets (vs BOOTP).
pub const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

const DHCP_CHADDR_OFFSET: usize = 28;
const DHCP_CHADDR_SIZE: usize = 16;
const DHCP_SNAME_OFFSET: usize = DHCP_CHADDR_OFFSET + DHCP_CHADDR_SIZE;
const DHCP_SNAME_SIZE: usize = 64;
const DHCP_FILE_OFFSET: usize = DHCP_SNAME_OFFSET + DHCP_SNAME_SIZE;
const DHCP_FILE_SIZE: usize = 128;
const DHCP_MAGIC_COOKIE_OFFSET: usize = DHCP_FILE_OFFSET + DHCP_FILE_SIZE;

/// Size of the fixed header portion including magic cookie.
pub const DHCP_FIXED_HEADER_SIZE: usize = DHCP_MAGIC_COOKIE_OFFSET + DHCP_MAGIC_COOKIE.len();

/// Minimum DHCP packet size per RFC 2131 §2.
///
/// DHCP requires packets to be at least 300 bytes for compatibility
/// with BOOTP relay agents.
pub const DHCP_MIN_PACKET_SIZE: usize = 300;

/// 576 bytes is the minimum datagram size all hosts must accept (RFC 791).
const DHCP_ENCODE_CAPACITY: usize = 576;

/// Broadcast bit of the flags field.
const BROADCAST_FLAG: u16 = 0x8000;

/// BOOTP/DHCP operation code for client requests.
pub const BOOTREQUEST: u8 = 1;

/// BOOTP/DHCP operation code for server replies.
pub const BOOTREPLY: u8 = 2;

/// Hardware type for Ethernet.
pub const HTYPE_ETHERNET: u8 = 1;

/// Hardware address length for Ethernet (6 bytes).
pub const HLEN_ETHERNET: u8 = 6;

/// A DHCP message, either the DISCOVER we send or a reply we received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpPacket {
    /// Operation code: [`BOOTREQUEST`] (1) or [`BOOTREPLY`] (2).
    pub op: u8,

    /// Hardware address type. [`HTYPE_ETHERNET`] (1) for Ethernet.
    pub htype: u8,

    /// Hardware address length. [`HLEN_ETHERNET`] (6) for Ethernet.
    pub hlen: u8,

    /// Hop count, incremented by relay agents.
    pub hops: u8,

    /// Transaction ID chosen by the client, echoed in replies.
    pub xid: u32,

    /// Seconds elapsed since client began address acquisition.
    pub secs: u16,

    /// Flags. Bit 15 (0x8000) = broadcast flag.
    pub flags: u16,

    pub ciaddr: Ipv4Addr,

    /// "Your" IP address, the address being offered to the client.
    pub yiaddr: Ipv4Addr,

    /// Next server IP address.
    pub siaddr: Ipv4Addr,

    /// Relay agent IP address.
    pub giaddr: Ipv4Addr,

    /// Client hardware address (MAC for Ethernet), zero padded.
    pub chaddr: [u8; 16],

    /// Server host name (or option overflow area if Option 52 is set).
    pub sname: [u8; 64],

    /// Boot file name (or option overflow area if Option 52 is set).
    pub file: [u8; 128],

    /// Options in wire order, pads included, end marker excluded.
    pub options: Vec<RawOption>,

    /// Bytes that followed the end marker on the wire.
    pub trailer: Vec<u8>,

    /// Serialized output is zero-filled up to this length.
    ///
    /// Packets built locally use [`DHCP_MIN_PACKET_SIZE`]; parsed packets
    /// use 0 so they serialize back to exactly the bytes received.
    pub min_size: usize,
}

impl DhcpPacket {
    /// Creates a DISCOVER skeleton with a fresh random transaction ID.
    ///
    /// The broadcast flag is set because the probe has no address yet to
    /// receive a unicast reply on. No options are attached.
    pub fn new_discover() -> Self {
        Self {
            op: BOOTREQUEST,
            htype: HTYPE_ETHERNET,
            hlen: HLEN_ETHERNET,
            hops: 0,
            xid: rand::random::<u32>(),
            secs: 0,
            flags: BROADCAST_FLAG,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: [0u8; 16],
            sname: [0u8; 64],
            file: [0u8; 128],
            options: Vec::new(),
            trailer: Vec::new(),
            min_size: DHCP_MIN_PACKET_SIZE,
        }
    }

    /// Sets `hlen` and `chaddr` from a 6-byte hardware address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHardwareAddress`] if `mac` is not 6 bytes.
    pub fn set_client_mac(&mut self, mac: &[u8]) -> Result<()> {
        if mac.len() != HLEN_ETHERNET as usize {
            return Err(Error::InvalidHardwareAddress(mac.len()));
        }
        self.htype = HTYPE_ETHERNET;
        self.hlen = HLEN_ETHERNET;
        self.chaddr = [0u8; 16];
        self.chaddr[..mac.len()].copy_from_slice(mac);
        Ok(())
    }

    /// Appends a pre-encoded TLV fragment to the options area.
    ///
    /// The fragment may hold several options; they keep their order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the fragment's framing is broken
    /// (a missing length byte or a length running past the fragment) or it
    /// contains an end marker followed by more data.
    pub fn add_options(&mut self, bytes: &[u8]) -> Result<()> {
        let (options, consumed) = split_options(bytes).map_err(Error::Serialization)?;
        if consumed < bytes.len() {
            return Err(Error::Serialization(
                "Option fragment continues past an end marker".to_string(),
            ));
        }
        self.options.extend(options);
        Ok(())
    }

    /// Appends a typed option.
    pub fn push_option(&mut self, option: DhcpOption) {
        self.options.push(option.to_raw());
    }

    /// Parses a DHCP packet from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacket`] if:
    /// - Packet is shorter than 240 bytes (fixed header + magic cookie)
    /// - Magic cookie is invalid (not 99.130.83.99)
    /// - An option's length runs past the end of the buffer
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < DHCP_FIXED_HEADER_SIZE {
            return Err(Error::InvalidPacket(format!(
                "Packet too short: {} bytes (minimum {})",
                data.len(),
                DHCP_FIXED_HEADER_SIZE
            )));
        }

        let magic_cookie = &data[DHCP_MAGIC_COOKIE_OFFSET..DHCP_FIXED_HEADER_SIZE];
        if magic_cookie != DHCP_MAGIC_COOKIE {
            return Err(Error::InvalidPacket("Invalid magic cookie".to_string()));
        }

        let options_area = &data[DHCP_FIXED_HEADER_SIZE..];
        let (options, consumed) = split_options(options_area).map_err(Error::InvalidPacket)?;

        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[DHCP_CHADDR_OFFSET..DHCP_SNAME_OFFSET]);

        let mut sname = [0u8; 64];
        sname.copy_from_slice(&data[DHCP_SNAME_OFFSET..DHCP_FILE_OFFSET]);

        let mut file = [0u8; 128];
        file.copy_from_slice(&data[DHCP_FILE_OFFSET..DHCP_MAGIC_COOKIE_OFFSET]);

        Ok(Self {
            op: data[0],
            htype: data[1],
            hlen: data[2],
            hops: data[3],
            xid: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            secs: u16::from_be_bytes([data[8], data[9]]),
            flags: u16::from_be_bytes([data[10], data[11]]),
            ciaddr: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            yiaddr: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
            siaddr: Ipv4Addr::new(data[20], data[21], data[22], data[23]),
            giaddr: Ipv4Addr::new(data[24], data[25], data[26], data[27]),
            chaddr,
            sname,
            file,
            options,
            trailer: options_area[consumed..].to_vec(),
            min_size: 0,
        })
    }

    /// Serializes the packet for transmission.
    ///
    /// Options are written in order followed by the end marker, then the
    /// trailer, then zero fill up to [`min_size`](Self::min_size).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if an option value exceeds 255 bytes.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut packet = Vec::with_capacity(DHCP_ENCODE_CAPACITY);

        packet.push(self.op);
        packet.push(self.htype);
        packet.push(self.hlen);
        packet.push(self.hops);

        packet.extend_from_slice(&self.xid.to_be_bytes());
        packet.extend_from_slice(&self.secs.to_be_bytes());
        packet.extend_from_slice(&self.flags.to_be_bytes());

        packet.extend_from_slice(&self.ciaddr.octets());
        packet.extend_from_slice(&self.yiaddr.octets());
        packet.extend_from_slice(&self.siaddr.octets());
        packet.extend_from_slice(&self.giaddr.octets());

        packet.extend_from_slice(&self.chaddr);
        packet.extend_from_slice(&self.sname);
        packet.extend_from_slice(&self.file);

        packet.extend_from_slice(&DHCP_MAGIC_COOKIE);

        for option in &self.options {
            option.encode_into(&mut packet)?;
        }

        packet.push(OptionCode::End as u8);
        packet.extend_from_slice(&self.trailer);

        if packet.len() < self.min_size {
            packet.resize(self.min_size, 0);
        }

        Ok(packet)
    }

    /// Typed view of the options, including any carried in the `sname` or
    /// `file` fields under option overload.
    ///
    /// Pads are skipped; an option whose value does not fit its type is
    /// reported as [`DhcpOption::Unknown`].
    pub fn decoded_options(&self) -> Vec<DhcpOption> {
        let mut decoded: Vec<DhcpOption> = decode_all(&self.options);

        if let Some(flag) = overload_flag(&decoded) {
            if matches!(flag, OverloadFlag::File | OverloadFlag::Both)
                && let Ok((options, _)) = split_options(&self.file)
            {
                decoded.extend(decode_all(&options));
            }
            if matches!(flag, OverloadFlag::Sname | OverloadFlag::Both)
                && let Ok((options, _)) = split_options(&self.sname)
            {
                decoded.extend(decode_all(&options));
            }
        }

        decoded
    }

    fn find_option<T>(&self, select: impl Fn(&DhcpOption) -> Option<T>) -> Option<T> {
        self.decoded_options().iter().find_map(select)
    }

    /// Returns the DHCP message type (Option 53) if present.
    ///
    /// Returns `None` for BOOTP packets which don't have this option.
    pub fn message_type(&self) -> Option<MessageType> {
        self.find_option(|opt| match opt {
            DhcpOption::MessageType(t) => Some(*t),
            _ => None,
        })
    }

    /// Returns the server identifier (Option 54) if present.
    pub fn server_identifier(&self) -> Option<Ipv4Addr> {
        self.find_option(|opt| match opt {
            DhcpOption::ServerIdentifier(ip) => Some(*ip),
            _ => None,
        })
    }

    /// Returns the offered lease time (Option 51) if present.
    pub fn lease_time(&self) -> Option<u32> {
        self.find_option(|opt| match opt {
            DhcpOption::LeaseTime(time) => Some(*time),
            _ => None,
        })
    }

    pub fn subnet_mask(&self) -> Option<Ipv4Addr> {
        self.find_option(|opt| match opt {
            DhcpOption::SubnetMask(mask) => Some(*mask),
            _ => None,
        })
    }

    pub fn routers(&self) -> Vec<Ipv4Addr> {
        self.find_option(|opt| match opt {
            DhcpOption::Router(addrs) => Some(addrs.clone()),
            _ => None,
        })
        .unwrap_or_default()
    }

    pub fn dns_servers(&self) -> Vec<Ipv4Addr> {
        self.find_option(|opt| match opt {
            DhcpOption::DnsServer(addrs) => Some(addrs.clone()),
            _ => None,
        })
        .unwrap_or_default()
    }

    pub fn domain_name(&self) -> Option<String> {
        self.find_option(|opt| match opt {
            DhcpOption::DomainName(name) => Some(name.clone()),
            _ => None,
        })
    }

    /// Returns the vendor class identifier (Option 60) if present.
    pub fn vendor_class(&self) -> Option<String> {
        self.find_option(|opt| match opt {
            DhcpOption::VendorClassIdentifier(class) => Some(class.clone()),
            _ => None,
        })
    }

    /// Returns the server host name unless the field carries options.
    pub fn server_name(&self) -> Option<String> {
        match overload_flag(&self.decoded_options()) {
            Some(OverloadFlag::Sname | OverloadFlag::Both) => None,
            _ => c_string(&self.sname),
        }
    }

    /// Returns the boot file name unless the field carries options.
    pub fn boot_file(&self) -> Option<String> {
        match overload_flag(&self.decoded_options()) {
            Some(OverloadFlag::File | OverloadFlag::Both) => None,
            _ => c_string(&self.file),
        }
    }

    /// Returns the client hardware address bytes (respecting hlen).
    pub fn chaddr_bytes(&self) -> &[u8] {
        &self.chaddr[..(self.hlen as usize).min(self.chaddr.len())]
    }

    /// Returns the client MAC address when the packet carries a 6-byte one.
    pub fn client_mac(&self) -> Option<MacAddress> {
        let bytes: [u8; 6] = self.chaddr_bytes().try_into().ok()?;
        Some(MacAddress::new(bytes))
    }

    /// Formats the client hardware address as a colon-separated string.
    ///
    /// For Ethernet, returns format like "aa:bb:cc:dd:ee:ff".
    pub fn format_mac(&self) -> String {
        self.chaddr_bytes()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Returns true if the broadcast flag (bit 15) is set.
    pub fn is_broadcast(&self) -> bool {
        (self.flags & BROADCAST_FLAG) != 0
    }

    /// Creates a DHCP reply packet from a request.
    ///
    /// The message type is added as the first option. The following fields
    /// are copied from the request: `xid`, `flags`, `giaddr`, `chaddr`,
    /// `htype` and `hlen`.
    pub fn create_reply(
        request: &DhcpPacket,
        message_type: MessageType,
        your_ip: Ipv4Addr,
        server_ip: Ipv4Addr,
        options: Vec<DhcpOption>,
    ) -> Self {
        let mut all_options = vec![DhcpOption::MessageType(message_type).to_raw()];
        all_options.extend(options.iter().map(DhcpOption::to_raw));

        Self {
            op: BOOTREPLY,
            htype: request.htype,
            hlen: request.hlen,
            hops: 0,
            xid: request.xid,
            secs: 0,
            flags: request.flags,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: your_ip,
            siaddr: server_ip,
            giaddr: request.giaddr,
            chaddr: request.chaddr,
            sname: [0u8; 64],
            file: [0u8; 128],
            options: all_options,
            trailer: Vec::new(),
            min_size: DHCP_MIN_PACKET_SIZE,
        }
    }
}

fn decode_all(options: &[RawOption]) -> Vec<DhcpOption> {
    options
        .iter()
        .filter(|raw| !raw.is_pad())
        .map(|raw| {
            raw.decode()
                .unwrap_or_else(|_| DhcpOption::Unknown(raw.code, raw.data.clone()))
        })
        .collect()
}

fn overload_flag(options: &[DhcpOption]) -> Option<OverloadFlag> {
    options.iter().find_map(|opt| match opt {
        DhcpOption::OptionOverload(flag) => Some(*flag),
        _ => None,
    })
}

fn c_string(field: &[u8]) -> Option<String> {
    let end = field.iter().position(|&byte| byte == 0).unwrap_or(field.len());
    if end == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&field[..end]).to_string())
}
