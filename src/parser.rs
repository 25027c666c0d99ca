//! Incremental byte-stream parser for the Event Socket wire format.
//!
//! A packet is header lines terminated by a blank line, then (if
//! `Content-Length` is present) exactly that many bytes of body. The parser
//! is pure and total: given any prefix of a valid stream it returns every
//! packet decodable from that prefix plus the unconsumed remainder.

use std::collections::HashMap;

use crate::packet::Packet;
use crate::urlcodec;

/// Parse as many complete packets as possible out of `buf`.
///
/// Returns the unconsumed remainder (to be prepended to the next chunk of
/// bytes read from the socket) and the packets decoded, in receive order.
pub fn parse(buf: &[u8]) -> (Vec<u8>, Vec<Packet>) {
    let mut packets = Vec::new();
    let mut offset = 0;
    while let Some((packet, consumed)) = try_parse_one(&buf[offset..]) {
        packets.push(packet);
        offset += consumed;
    }
    (buf[offset..].to_vec(), packets)
}

/// Find the start of a `"\n\n"` byte pair, i.e. a blank line terminating a
/// block of header lines.
fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

fn try_parse_one(buf: &[u8]) -> Option<(Packet, usize)> {
    let sep = find_blank_line(buf)?;
    let header_bytes = &buf[..sep];
    let after_headers = sep + 2;

    let headers = parse_header_lines(header_bytes);
    let content_length = headers
        .get("content-length")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    if buf.len() - after_headers < content_length {
        // Body not fully arrived yet; wait for more bytes.
        return None;
    }

    let body = buf[after_headers..after_headers + content_length].to_vec();
    let consumed = after_headers + content_length;
    Some((build_packet(headers, body), consumed))
}

/// Parse `Name: Value` lines (outer framing headers). Header values keep
/// everything but a single leading space after the colon; unparseable lines
/// are logged and skipped rather than aborting the whole packet.
fn parse_header_lines(bytes: &[u8]) -> HashMap<String, String> {
    let text = String::from_utf8_lossy(bytes);
    let mut map = HashMap::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        match line.find(':') {
            Some(idx) => {
                let name = line[..idx].trim().to_lowercase();
                let value = line[idx + 1..].strip_prefix(' ').unwrap_or(&line[idx + 1..]);
                map.insert(name, value.to_string());
            }
            None => {
                tracing::warn!(line, "unparseable header line, ignoring");
            }
        }
    }
    map
}

/// Parse the body of a `text/event-plain` packet: a second block of
/// `Name: Value` lines (URL-encoded), optionally followed by a blank line
/// and a free-form payload.
fn parse_event_fields(body: &[u8]) -> HashMap<String, String> {
    let text = String::from_utf8_lossy(body);
    let header_part = match find_blank_line(body) {
        Some(idx) => &text[..idx],
        None => &text[..],
    };
    let mut map = HashMap::new();
    for raw_line in header_part.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if let Some(idx) = line.find(':') {
            let name = line[..idx].trim();
            let value = line[idx + 1..].strip_prefix(' ').unwrap_or(&line[idx + 1..]);
            let name = urlcodec::decode(name).to_lowercase();
            let value = urlcodec::decode(value);
            map.insert(name, value);
        }
    }
    map
}

fn build_packet(headers: HashMap<String, String>, body: Vec<u8>) -> Packet {
    let packet_type = headers.get("content-type").cloned().unwrap_or_default();
    let mut job_id = headers.get("job-uuid").cloned();

    let parsed = if packet_type == "text/event-plain" {
        let fields = parse_event_fields(&body);
        if job_id.is_none() {
            job_id = fields.get("job-uuid").cloned();
        }
        fields
    } else {
        HashMap::new()
    };

    let success = compute_success(&packet_type, &headers, &body);
    let rest = compute_rest(&packet_type, &headers);

    Packet {
        packet_type,
        headers,
        body,
        parsed,
        success,
        job_id,
        rest,
    }
}

fn compute_success(packet_type: &str, headers: &HashMap<String, String>, body: &[u8]) -> bool {
    match packet_type {
        "command/reply" => headers
            .get("reply-text")
            .is_some_and(|v| v.starts_with("+OK")),
        "api/response" => String::from_utf8_lossy(body).starts_with("+OK"),
        _ => false,
    }
}

fn compute_rest(packet_type: &str, headers: &HashMap<String, String>) -> Option<String> {
    if packet_type != "command/reply" {
        return None;
    }
    let reply_text = headers.get("reply-text")?;
    reply_text
        .strip_prefix("+OK ")
        .or_else(|| reply_text.strip_prefix("-ERR "))
        .map(str::to_string)
}
