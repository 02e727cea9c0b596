//! Parser for the kernel's text dump of the connection table
//! (`/proc/net/nf_conntrack`).
//!
//! One entry per line:
//!
//! ```text
//! ipv4 2 tcp 6 431999 ESTABLISHED src=10.0.0.5 dst=10.96.0.10 sport=41000 dport=80 \
//!     packets=5 bytes=400 src=10.0.0.7 dst=10.0.0.5 sport=80 dport=41000 packets=4 \
//!     bytes=900 [ASSURED] mark=0 zone=65520 use=2
//! ```
//!
//! The first `src=` group is the original direction, the second the reply
//! direction. Counters are only present when accounting is enabled.

use std::net::IpAddr;
use std::time::{Duration, SystemTime};

use domain::conntrack::entity::{Connection, TcpState, Tuple, status};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line is truncated")]
    Truncated,

    #[error("unknown address family '{0}'")]
    UnknownFamily(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: '{value}'")]
    InvalidValue { field: &'static str, value: String },
}

/// One direction of a tracked connection.
#[derive(Debug, Default)]
struct DirectionTuple {
    src: Option<IpAddr>,
    dst: Option<IpAddr>,
    sport: Option<u16>,
    dport: Option<u16>,
    packets: u64,
    bytes: u64,
}

/// Parse a single line of `/proc/net/nf_conntrack`.
///
/// `now` anchors the start time derived from `delta-time=`, when present.
pub fn parse_line(line: &str, now: SystemTime) -> Result<Connection, ParseError> {
    let mut fields = line.split_whitespace();

    let family = fields.next().ok_or(ParseError::Truncated)?;
    let want_v6 = match family {
        "ipv4" => false,
        "ipv6" => true,
        other => return Err(ParseError::UnknownFamily(other.to_string())),
    };
    // Numeric family and protocol name are redundant with what follows.
    fields.next().ok_or(ParseError::Truncated)?;
    fields.next().ok_or(ParseError::Truncated)?;
    let protocol: u8 = parse_value("protocol", fields.next().ok_or(ParseError::Truncated)?)?;
    // Offloaded entries carry no timeout column.
    let mut fields = fields.peekable();
    let timeout = match fields.peek().and_then(|t| t.parse::<u32>().ok()) {
        Some(timeout) => {
            fields.next();
            timeout
        }
        None => 0,
    };

    let mut orig = DirectionTuple::default();
    let mut reply = DirectionTuple::default();
    let mut in_reply = false;
    let mut status_flag = status::CONFIRMED | status::SEEN_REPLY;
    let mut tcp_state = None;
    let mut mark = 0;
    let mut zone = 0;
    let mut start_time = None;

    for field in fields {
        let Some((key, value)) = field.split_once('=') else {
            match field {
                "[UNREPLIED]" => status_flag &= !status::SEEN_REPLY,
                "[ASSURED]" => status_flag |= status::ASSURED,
                // Printed in place of [ASSURED].
                "[OFFLOAD]" | "[HW_OFFLOAD]" => {
                    status_flag |= status::OFFLOAD | status::ASSURED;
                }
                word if protocol == 6 && tcp_state.is_none() => {
                    tcp_state = TcpState::from_kernel_name(word);
                }
                _ => {}
            }
            continue;
        };

        if key == "src" && orig.src.is_some() {
            in_reply = true;
        }
        let dir = if in_reply { &mut reply } else { &mut orig };
        match key {
            "src" => dir.src = Some(parse_value("src", value)?),
            "dst" => dir.dst = Some(parse_value("dst", value)?),
            "sport" => dir.sport = Some(parse_value("sport", value)?),
            "dport" => dir.dport = Some(parse_value("dport", value)?),
            "packets" => dir.packets = parse_value("packets", value)?,
            "bytes" => dir.bytes = parse_value("bytes", value)?,
            "mark" => mark = parse_value("mark", value)?,
            "zone" => zone = parse_value("zone", value)?,
            "delta-time" => {
                let secs: u64 = parse_value("delta-time", value)?;
                start_time = now.checked_sub(Duration::from_secs(secs));
            }
            _ => {}
        }
    }

    let orig_src = orig.src.ok_or(ParseError::MissingField("src"))?;
    let orig_dst = orig.dst.ok_or(ParseError::MissingField("dst"))?;
    let reply_src = reply.src.ok_or(ParseError::MissingField("reply src"))?;
    let reply_dst = reply.dst.ok_or(ParseError::MissingField("reply dst"))?;
    if orig_src.is_ipv6() != want_v6 {
        return Err(ParseError::InvalidValue {
            field: "src",
            value: orig_src.to_string(),
        });
    }

    let orig_sport = orig.sport.unwrap_or(0);
    let orig_dport = orig.dport.unwrap_or(0);
    let reply_sport = reply.sport.unwrap_or(0);
    let reply_dport = reply.dport.unwrap_or(0);

    let dst_rewritten = orig_dst != reply_src || orig_dport != reply_sport;
    if dst_rewritten {
        status_flag |= status::DST_NAT;
    }
    if orig_src != reply_dst || orig_sport != reply_dport {
        status_flag |= status::SRC_NAT;
    }

    Ok(Connection {
        // The reply source is the endpoint that actually answered, i.e. the
        // post-DNAT destination.
        flow_key: Tuple {
            src_addr: orig_src,
            dst_addr: reply_src,
            src_port: orig_sport,
            dst_port: reply_sport,
            protocol,
        },
        zone,
        timeout,
        start_time,
        stop_time: None,
        is_present: true,
        status_flag,
        mark,
        tcp_state,
        original_dst_addr: dst_rewritten.then_some(orig_dst),
        original_dst_port: dst_rewritten.then_some(orig_dport),
        original_packets: orig.packets,
        original_bytes: orig.bytes,
        reverse_packets: reply.packets,
        reverse_bytes: reply.bytes,
    })
}

/// Parse every line of a table dump, keeping the entries of `zone`.
///
/// Returns the entries and the number of lines that failed to parse.
pub fn parse_table(content: &str, zone: u16, now: SystemTime) -> (Vec<Connection>, usize) {
    let mut skipped = 0;
    let connections = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse_line(line, now) {
            Ok(conn) => Some(conn),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .filter(|conn| conn.zone == zone)
        .collect();
    (connections, skipped)
}

fn parse_value<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue {
        field,
        value: value.to_string(),
    })
}
