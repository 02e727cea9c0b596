#![no_main]

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::SystemTime;

use libfuzzer_sys::fuzz_target;

use adapters::conntrack::proc_parser::{parse_line, parse_table};
use domain::conntrack::entity::{Connection, GatewayConfig, NodeConfig, ServiceCidrs, Tuple};
use domain::conntrack::filter::ConnectionFilter;
use domain::conntrack::protocol::validate_protocol_filter;

// Fuzz the connection-table path: text parser, filter chain, and protocol
// name validation.
//
// Layout:
//   [0]    = selector (0=line parser, 1=filter chain, 2=protocol names)
//   rest   = consumed per operation
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    match data[0] % 3 {
        // Sub-target 0: arbitrary table text must parse or error, never panic
        0 => {
            let Ok(text) = std::str::from_utf8(&data[1..]) else {
                return;
            };
            let now = SystemTime::now();
            for line in text.lines() {
                if let Ok(conn) = parse_line(line, now) {
                    assert!(conn.is_present);
                    assert_eq!(conn.original_dst_addr.is_some(), conn.original_dst_port.is_some());
                }
            }
            let zone = u16::from(data[1]);
            let (conns, _) = parse_table(text, zone, now);
            assert!(conns.iter().all(|c| c.zone == zone));
        }
        // Sub-target 1: filter chain keeps an ordered, idempotent subset
        1 => {
            let flags = data[1];
            let conns: Vec<Connection> = data[2..]
                .chunks_exact(8)
                .map(connection_from_bytes)
                .collect();

            let node = NodeConfig {
                gateway: GatewayConfig {
                    ipv4: Some(Ipv4Addr::new(10, 0, 0, 1)),
                    ipv6: (flags & 1 != 0).then(|| Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1)),
                },
            };
            let Ok(cidrs) = ServiceCidrs::new(
                Some("10.96.0.0/12".parse().unwrap()),
                Some("fd00:10:96::/112".parse().unwrap()),
            ) else {
                return;
            };
            let protocols = validate_protocol_filter(&["tcp", "udp", "sctp"][..usize::from(flags >> 6)]);
            let filter = ConnectionFilter::new(&node, cidrs, flags & 2 != 0, protocols.filter);
            let zone = if flags & 4 != 0 { 0xfff0 } else { 0xffe6 };

            let mut kept = conns.clone();
            let stats = filter.apply(&mut kept, zone);
            assert_eq!(stats.total, conns.len());
            assert_eq!(stats.kept, kept.len());

            // Order-preserving subsequence of the input.
            let mut it = conns.iter();
            for k in &kept {
                assert!(it.any(|c| c == k));
            }

            let mut again = kept.clone();
            filter.apply(&mut again, zone);
            assert_eq!(again, kept);
        }
        // Sub-target 2: protocol validation never panics and never allows
        // anything outside TCP/UDP/SCTP
        _ => {
            let Ok(text) = std::str::from_utf8(&data[1..]) else {
                return;
            };
            let names: Vec<&str> = text.split(',').collect();
            let validation = validate_protocol_filter(&names);
            assert!(
                validation
                    .filter
                    .protocols()
                    .iter()
                    .all(|p| matches!(p, 6 | 17 | 132))
            );
            assert!(validation.unsupported.len() <= names.len());
        }
    }
});

fn connection_from_bytes(chunk: &[u8]) -> Connection {
    let v6 = chunk[0] & 1 != 0;
    let addr = |b: u8| -> IpAddr {
        if v6 {
            IpAddr::V6(Ipv6Addr::new(0xfd00, 0x10, 0x96, 0, 0, 0, 0, u16::from(b)))
        } else {
            IpAddr::V4(Ipv4Addr::new(10, b % 4 * 32, 0, b))
        }
    };
    Connection {
        flow_key: Tuple {
            src_addr: addr(chunk[1]),
            dst_addr: addr(chunk[2]),
            src_port: u16::from_le_bytes([chunk[3], chunk[4]]),
            dst_port: u16::from(chunk[5]),
            protocol: chunk[6],
        },
        zone: if chunk[7] & 1 != 0 { 0xfff0 } else { 0xffe6 },
        is_present: true,
        ..Connection::default()
    }
}
