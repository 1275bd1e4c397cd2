use proptest::prelude::*;

use dhcprobe::packet::{DHCP_FIXED_HEADER_SIZE, DHCP_MAGIC_COOKIE, DHCP_MIN_PACKET_SIZE};
use dhcprobe::{DhcpPacket, RawOption};

fn header(xid: u32, chaddr: [u8; 16]) -> Vec<u8> {
    let mut packet = vec![0u8; DHCP_FIXED_HEADER_SIZE];
    packet[0] = 2;
    packet[1] = 1;
    packet[2] = 6;
    packet[4..8].copy_from_slice(&xid.to_be_bytes());
    packet[28..44].copy_from_slice(&chaddr);
    packet[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);
    packet
}

fn option_strategy() -> impl Strategy<Value = (u8, Vec<u8>)> {
    (1u8..=254, prop::collection::vec(any::<u8>(), 0..40))
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 2000, max_global_rejects: 8192, ..ProptestConfig::default() })]

    #[test]
    fn parse_never_panics_on_arbitrary_bytes(data in prop::collection::vec(any::<u8>(), 0..700)) {
        let _ = DhcpPacket::parse(&data);
    }

    #[test]
    fn parse_never_panics_on_random_options(
        options_data in prop::collection::vec(any::<u8>(), 0..512)
    ) {
        let mut packet = header(0, [0; 16]);
        packet.extend_from_slice(&options_data);
        if let Ok(parsed) = DhcpPacket::parse(&packet) {
            let _ = parsed.decoded_options();
            let _ = parsed.server_name();
            let _ = parsed.boot_file();
        }
    }

    #[test]
    fn serialize_reproduces_received_datagram(
        xid in any::<u32>(),
        chaddr in any::<[u8; 16]>(),
        options in prop::collection::vec(option_strategy(), 0..8),
        tail in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut datagram = header(xid, chaddr);
        for (code, data) in &options {
            datagram.push(*code);
            datagram.push(data.len() as u8);
            datagram.extend_from_slice(data);
        }
        datagram.push(255);
        datagram.extend_from_slice(&tail);

        let parsed = DhcpPacket::parse(&datagram).unwrap();
        prop_assert_eq!(parsed.serialize().unwrap(), datagram);
    }

    #[test]
    fn parse_of_serialized_keeps_identity_and_option_order(
        xid in any::<u32>(),
        mac in any::<[u8; 6]>(),
        options in prop::collection::vec(option_strategy(), 0..8),
    ) {
        let mut packet = DhcpPacket::new_discover();
        packet.xid = xid;
        packet.set_client_mac(&mac).unwrap();
        packet.options = options
            .iter()
            .map(|(code, data)| RawOption::new(*code, data.clone()))
            .collect();

        let encoded = packet.serialize().unwrap();
        prop_assert!(encoded.len() >= DHCP_MIN_PACKET_SIZE);

        let reparsed = DhcpPacket::parse(&encoded).unwrap();
        prop_assert_eq!(reparsed.xid, xid);
        prop_assert_eq!(reparsed.chaddr_bytes(), &mac[..]);
        prop_assert_eq!(reparsed.options, packet.options);
    }

    #[test]
    fn short_packets_always_rejected(
        data in prop::collection::vec(any::<u8>(), 0..DHCP_FIXED_HEADER_SIZE)
    ) {
        prop_assert!(DhcpPacket::parse(&data).is_err());
    }

    #[test]
    fn bad_magic_cookie_always_rejected(cookie in any::<[u8; 4]>()) {
        prop_assume!(cookie != DHCP_MAGIC_COOKIE);

        let mut packet = header(1, [0; 16]);
        packet[236..240].copy_from_slice(&cookie);
        packet.push(255);

        prop_assert!(DhcpPacket::parse(&packet).is_err());
    }

    #[test]
    fn overrunning_option_rejected(
        code in 1u8..=254,
        declared in 1u8..=255,
        available in 0usize..255,
    ) {
        prop_assume!(available < declared as usize);

        let mut packet = header(1, [0; 16]);
        packet.push(code);
        packet.push(declared);
        packet.extend(std::iter::repeat_n(0xab, available));

        prop_assert!(DhcpPacket::parse(&packet).is_err());
    }
}
