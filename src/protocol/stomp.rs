//! STOMP 1.2 client frame codec
//!
//! Frames are text: a command line, header lines, a blank line, then the
//! body terminated by a NUL byte. Header names and values are escaped on
//! every frame except CONNECT/CONNECTED, per the STOMP 1.2 spec. Only the
//! client-side subset this engine needs is implemented.

use crate::types::{ChatError, Result};

pub const CMD_CONNECT: &str = "CONNECT";
pub const CMD_CONNECTED: &str = "CONNECTED";
pub const CMD_SUBSCRIBE: &str = "SUBSCRIBE";
pub const CMD_UNSUBSCRIBE: &str = "UNSUBSCRIBE";
pub const CMD_SEND: &str = "SEND";
pub const CMD_MESSAGE: &str = "MESSAGE";
pub const CMD_ERROR: &str = "ERROR";
pub const CMD_DISCONNECT: &str = "DISCONNECT";

/// One STOMP frame, either direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Add a header (builder style)
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = body;
        self
    }

    /// First header value with the given name, if present
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Build a CONNECT frame.
    ///
    /// The bearer token is attached here and only here; token changes while
    /// connected require a fresh handshake.
    pub fn connect(host: &str, token: Option<&str>) -> Self {
        let mut frame = Self::new(CMD_CONNECT)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", "0,0");
        if let Some(token) = token {
            frame = frame.with_header("Authorization", &format!("Bearer {}", token));
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(CMD_SUBSCRIBE)
            .with_header("id", id)
            .with_header("destination", destination)
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(CMD_UNSUBSCRIBE).with_header("id", id)
    }

    pub fn send(destination: &str, body: String) -> Self {
        Self::new(CMD_SEND)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_header("content-length", &body.len().to_string())
            .with_body(body)
    }

    pub fn disconnect() -> Self {
        Self::new(CMD_DISCONNECT)
    }

    /// Serialize to the wire representation
    pub fn encode(&self) -> String {
        // CONNECT/CONNECTED headers are unescaped per STOMP 1.2
        let escape = self.command != CMD_CONNECT && self.command != CMD_CONNECTED;

        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse a frame from its wire representation.
    ///
    /// Heartbeat (bare EOL) payloads must be filtered out by the caller.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.strip_suffix('\0').unwrap_or(raw);

        let (head, body) = match raw.split_once("\n\n") {
            Some((head, body)) => (head, body),
            None => (raw, ""),
        };

        let mut lines = head.lines();
        let command = lines
            .next()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.is_empty())
            .ok_or_else(|| ChatError::Protocol("empty STOMP frame".to_string()))?
            .to_string();

        let unescape_headers = command != CMD_CONNECTED && command != CMD_CONNECT;
        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                ChatError::Protocol(format!("malformed STOMP header: {}", line))
            })?;
            if unescape_headers {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        Ok(Self {
            command,
            headers,
            body: body.to_string(),
        })
    }
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(ChatError::Protocol(format!(
                    "invalid STOMP escape sequence: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_with_token() {
        let frame = StompFrame::connect("chat.example.com", Some("tok123"));
        let raw = frame.encode();

        assert!(raw.starts_with("CONNECT\n"));
        assert!(raw.contains("accept-version:1.2\n"));
        assert!(raw.contains("Authorization:Bearer tok123\n"));
        assert!(raw.ends_with("\n\n\0"));
    }

    #[test]
    fn test_connect_without_token() {
        let raw = StompFrame::connect("chat.example.com", None).encode();
        assert!(!raw.contains("Authorization"));
    }

    #[test]
    fn test_subscribe_encode() {
        let raw = StompFrame::subscribe("sub-0-1", "/topic/public").encode();
        assert_eq!(raw, "SUBSCRIBE\nid:sub-0-1\ndestination:/topic/public\n\n\0");
    }

    #[test]
    fn test_send_round_trip() {
        let body = r#"{"mid":null,"size":20}"#.to_string();
        let raw = StompFrame::send("/app/message/history", body.clone()).encode();

        let parsed = StompFrame::parse(&raw).unwrap();
        assert_eq!(parsed.command, CMD_SEND);
        assert_eq!(parsed.header("destination"), Some("/app/message/history"));
        assert_eq!(parsed.header("content-type"), Some("application/json"));
        assert_eq!(parsed.body, body);
    }

    #[test]
    fn test_parse_message_frame() {
        let raw = "MESSAGE\ndestination:/topic/public\nsubscription:sub-1-2\n\n{\"type\":\"USER_MESSAGE\"}\0";
        let frame = StompFrame::parse(raw).unwrap();

        assert_eq!(frame.command, CMD_MESSAGE);
        assert_eq!(frame.header("destination"), Some("/topic/public"));
        assert_eq!(frame.header("subscription"), Some("sub-1-2"));
        assert_eq!(frame.body, "{\"type\":\"USER_MESSAGE\"}");
    }

    #[test]
    fn test_parse_connected() {
        let raw = "CONNECTED\nversion:1.2\n\n\0";
        let frame = StompFrame::parse(raw).unwrap();
        assert_eq!(frame.command, CMD_CONNECTED);
        assert_eq!(frame.header("version"), Some("1.2"));
    }

    #[test]
    fn test_header_escaping() {
        let frame = StompFrame::new(CMD_SEND).with_header("reply-to", "queue:a\nb");
        let raw = frame.encode();
        assert!(raw.contains("reply-to:queue\\ca\\nb\n"));

        let parsed = StompFrame::parse(&raw).unwrap();
        assert_eq!(parsed.header("reply-to"), Some("queue:a\nb"));
    }

    #[test]
    fn test_parse_error_frame() {
        let raw = "ERROR\nmessage:Access is denied\n\nbad credentials\0";
        let frame = StompFrame::parse(raw).unwrap();
        assert_eq!(frame.command, CMD_ERROR);
        assert_eq!(frame.header("message"), Some("Access is denied"));
        assert_eq!(frame.body, "bad credentials");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(StompFrame::parse("").is_err());
        assert!(StompFrame::parse("\n").is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_header() {
        assert!(StompFrame::parse("MESSAGE\nno-colon-here\n\n\0").is_err());
    }
}
