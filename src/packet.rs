//! In-memory representation of one decoded Event Socket packet.

use std::collections::HashMap;

/// A single decoded server message: headers plus an optional content body.
///
/// For event packets (`Content-Type: text/event-plain`), `parsed` additionally
/// holds the URL-decoded event fields carried in the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Value of the `Content-Type` header, e.g. `"command/reply"`.
    /// Empty when the packet carried no `Content-Type` header.
    pub packet_type: String,
    /// Header name (lowercased) -> value, as received.
    pub headers: HashMap<String, String>,
    /// Raw content body, exactly `Content-Length` bytes.
    pub body: Vec<u8>,
    /// URL-decoded event fields, populated only for `text/event-plain` packets.
    pub parsed: HashMap<String, String>,
    /// True for a successful `command/reply` (`Reply-Text` starts with `+OK`)
    /// or a successful `api/response` (body starts with `+OK`).
    pub success: bool,
    /// Present when the packet carries a `Job-UUID`, whether in the outer
    /// headers or (for `text/event-plain` job results) the inner event fields.
    pub job_id: Option<String>,
    /// For `command/reply` packets, the text following `+OK `/`-ERR ` in `Reply-Text`.
    pub rest: Option<String>,
}

impl Packet {
    /// Look up an outer header by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Look up a URL-decoded event field by name (case-insensitive).
    pub fn field(&self, name: &str) -> Option<&str> {
        self.parsed.get(&name.to_lowercase()).map(String::as_str)
    }

    /// The `Event-Name` field for event packets, if present.
    pub fn event_name(&self) -> Option<&str> {
        self.field("event-name")
    }

    pub fn is_event(&self) -> bool {
        self.packet_type == "text/event-plain" || self.packet_type == "text/event-json"
    }
}
