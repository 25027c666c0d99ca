//! Pure formatters for outbound command lines.
//!
//! None of these touch the socket; the connection engine sends the string
//! they produce and waits for the matching reply.

/// `<verb> <args>\n\n`, the shape of most commands.
fn simple(verb: &str, args: &str) -> String {
    if args.is_empty() {
        format!("{verb}\n\n")
    } else {
        format!("{verb} {args}\n\n")
    }
}

pub fn auth_command(password: &str) -> String {
    format!("auth {password}\n\n")
}

pub fn api_command(cmd: &str, args: &str) -> String {
    simple("api", &format!("{cmd} {args}"))
}

/// Caller supplies the already-generated `job_id` so the engine can record
/// the mapping before the bytes go out.
pub fn bgapi_command(cmd: &str, args: &str, job_id: &str) -> String {
    format!("bgapi {cmd} {args}\nJob-UUID: {job_id}\n\n")
}

pub fn event_command(format: &str, events: &str) -> String {
    simple("event", &format!("{format} {events}"))
}

pub fn myevents_command(format: &str, uuid: &str) -> String {
    simple("myevents", &format!("{format} {uuid}"))
}

pub fn divert_events_command(on: bool) -> String {
    simple("divert_events", if on { "on" } else { "off" })
}

pub fn filter_command(key: &str, value: &str) -> String {
    simple("filter", &format!("{key} {value}"))
}

pub fn filter_delete_command(key: &str, value: &str) -> String {
    simple("filter delete", &format!("{key} {value}"))
}

pub fn log_command(level: &str) -> String {
    simple("log", level)
}

pub fn nolog_command() -> String {
    simple("nolog", "")
}

pub fn nixevent_command(events: &str) -> String {
    simple("nixevent", events)
}

pub fn noevents_command() -> String {
    simple("noevents", "")
}

pub fn linger_command() -> String {
    simple("linger", "")
}

pub fn nolinger_command() -> String {
    simple("nolinger", "")
}

pub fn exit_command() -> String {
    simple("exit", "")
}

/// `sendevent <name>` followed by header lines and an optional body.
///
/// `Content-Length` is injected automatically from `body`'s byte length;
/// it is omitted entirely when the body is empty.
pub fn sendevent_command(name: &str, headers: &[(&str, &str)], body: &str) -> String {
    build_headered("sendevent", name, headers, body, None)
}

/// `sendmsg <uuid>` followed by header lines and an optional body.
///
/// Injects `Content-Length` from the body and `Content-Type: text/plain`
/// whenever a body is present.
pub fn sendmsg_command(uuid: &str, headers: &[(&str, &str)], body: &str) -> String {
    build_headered("sendmsg", uuid, headers, body, Some("text/plain"))
}

fn build_headered(
    verb: &str,
    target: &str,
    headers: &[(&str, &str)],
    body: &str,
    content_type_if_body: Option<&str>,
) -> String {
    let mut out = if target.is_empty() {
        format!("{verb}\n")
    } else {
        format!("{verb} {target}\n")
    };
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\n"));
    }
    if !body.is_empty() {
        if let Some(content_type) = content_type_if_body {
            out.push_str(&format!("Content-Type: {content_type}\n"));
        }
        out.push_str(&format!("Content-Length: {}\n\n{body}", body.len()));
    } else {
        out.push('\n');
    }
    out
}
