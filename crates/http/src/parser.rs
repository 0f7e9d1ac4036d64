// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental request/response parser.
//!
//! Head bytes accumulate until the blank line, the body until
//! Content-Length is satisfied; each completed message resets the parser,
//! so pipelined messages in one feed all come out. A malformed byte fails
//! the whole stream: the caller drops the transport.

use serde_json::Value;
use thiserror::Error;
use tracing::error;
use yn_core::error::MsgSet;
use yn_core::gobj::{Gobj, Runtime};
use yn_core::kw::{Kw, KwMap};

/// Parse failures. The connection is unusable afterwards.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Parser mode, also reported as `http_parser_type` in the message dict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpParserType {
    Request = 0,
    Response = 1,
}

#[derive(Clone, Copy)]
enum Phase {
    Head,
    Body { remaining: usize },
}

/// Incremental HTTP/1.x parser producing message dictionaries.
pub struct HttpParser {
    mode: HttpParserType,
    phase: Phase,
    head_buf: Vec<u8>,
    url: String,
    method: String,
    status_code: u16,
    headers: KwMap,
    body: Vec<u8>,
}

const MAX_HEAD_SIZE: usize = 64 * 1024;

impl HttpParser {
    pub fn new(mode: HttpParserType) -> HttpParser {
        HttpParser {
            mode,
            phase: Phase::Head,
            head_buf: Vec::new(),
            url: String::new(),
            method: String::new(),
            status_code: 0,
            headers: KwMap::new(),
            body: Vec::new(),
        }
    }

    /// Clear all accumulated state, keeping the mode.
    pub fn reset(&mut self) {
        self.phase = Phase::Head;
        self.head_buf.clear();
        self.url.clear();
        self.method.clear();
        self.status_code = 0;
        self.headers = KwMap::new();
        self.body.clear();
    }

    /// Feed bytes. Returns the consumed count (always the full slice on
    /// success) and the messages completed by this feed.
    pub fn received(&mut self, bytes: &[u8]) -> Result<(usize, Vec<KwMap>), HttpError> {
        let mut messages = Vec::new();
        let mut input = bytes;
        while !input.is_empty() {
            match self.phase {
                Phase::Head => {
                    let boundary = self.fill_head(&mut input)?;
                    if !boundary {
                        break;
                    }
                    self.parse_head()?;
                    let remaining = self.content_length()?;
                    if remaining > 0 {
                        self.phase = Phase::Body { remaining };
                    } else {
                        messages.push(self.complete_message());
                    }
                }
                Phase::Body { remaining } => {
                    let take = remaining.min(input.len());
                    self.body.extend_from_slice(&input[..take]);
                    input = &input[take..];
                    let remaining = remaining - take;
                    if remaining == 0 {
                        messages.push(self.complete_message());
                    } else {
                        self.phase = Phase::Body { remaining };
                    }
                }
            }
        }
        Ok((bytes.len(), messages))
    }

    /// Accumulate head bytes until the blank line. True when the head is
    /// complete; the consumed slice is trimmed off `input`.
    fn fill_head(&mut self, input: &mut &[u8]) -> Result<bool, HttpError> {
        // search for \r\n\r\n across the already-buffered tail
        let start = self.head_buf.len().saturating_sub(3);
        self.head_buf.extend_from_slice(input);
        if self.head_buf.len() > MAX_HEAD_SIZE {
            return Err(self.fail("http head too large"));
        }
        match find_blank_line(&self.head_buf[start..]).map(|p| p + start) {
            Some(end) => {
                // bytes after the blank line belong to the body/next message
                let consumed_now = end + 4 - (self.head_buf.len() - input.len());
                self.head_buf.truncate(end);
                *input = &input[consumed_now..];
                Ok(true)
            }
            None => {
                *input = &input[input.len()..];
                Ok(false)
            }
        }
    }

    fn fail(&self, msg: &str) -> HttpError {
        error!(msgset = %MsgSet::ProtocolError, "{msg}");
        HttpError::Protocol(msg.to_string())
    }

    fn parse_head(&mut self) -> Result<(), HttpError> {
        let head = std::mem::take(&mut self.head_buf);
        let text = std::str::from_utf8(&head).map_err(|_| self.fail("head is not ASCII"))?;
        let mut lines = text.split("\r\n");
        let start_line = lines.next().unwrap_or("");
        match self.mode {
            HttpParserType::Request => self.parse_request_line(start_line)?,
            HttpParserType::Response => self.parse_status_line(start_line)?,
        }
        let mut last_key: Option<String> = None;
        for line in lines {
            if line.is_empty() {
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                // folded continuation: append to the previous value
                let Some(key) = &last_key else {
                    return Err(self.fail("continuation line without a header"));
                };
                let folded = line.trim().to_string();
                if let Some(Value::String(prev)) = self.headers.get_mut(key) {
                    prev.push(' ');
                    prev.push_str(&folded);
                }
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(self.fail("header line without colon"));
            };
            if name.is_empty() || name.contains(' ') {
                return Err(self.fail("bad header name"));
            }
            let key = name.to_ascii_uppercase();
            // a repeated name replaces the earlier value
            self.headers.insert(key.clone(), Value::String(value.trim().to_string()));
            last_key = Some(key);
        }
        Ok(())
    }

    fn parse_request_line(&mut self, line: &str) -> Result<(), HttpError> {
        let mut parts = line.split(' ');
        let (Some(method), Some(target), Some(version)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(self.fail("malformed request line"));
        };
        if parts.next().is_some() || !version.starts_with("HTTP/1.") {
            return Err(self.fail("malformed request line"));
        }
        if method.is_empty() || !method.chars().all(|c| c.is_ascii_uppercase() || c == '-') {
            return Err(self.fail("malformed request method"));
        }
        self.method = method.to_string();
        self.url = target.to_string();
        Ok(())
    }

    fn parse_status_line(&mut self, line: &str) -> Result<(), HttpError> {
        let mut parts = line.splitn(3, ' ');
        let (Some(version), Some(code)) = (parts.next(), parts.next()) else {
            return Err(self.fail("malformed status line"));
        };
        if !version.starts_with("HTTP/1.") {
            return Err(self.fail("malformed status line"));
        }
        self.status_code = code
            .parse::<u16>()
            .ok()
            .filter(|c| (100..=599).contains(c))
            .ok_or_else(|| self.fail("malformed status code"))?;
        Ok(())
    }

    fn content_length(&self) -> Result<usize, HttpError> {
        match self.headers.get("CONTENT-LENGTH") {
            None => Ok(0),
            Some(v) => v
                .as_str()
                .and_then(|s| s.trim().parse::<usize>().ok())
                .ok_or_else(|| self.fail("bad Content-Length")),
        }
    }

    /// Build the message dict and reset for the next message.
    fn complete_message(&mut self) -> KwMap {
        let mut kw = KwMap::new();
        kw.insert("http_parser_type".into(), Value::from(self.mode as i64));
        kw.insert("url".into(), Value::String(self.url.clone()));
        kw.insert("response_status_code".into(), Value::from(self.status_code as i64));
        kw.insert("request_method".into(), Value::String(self.method.clone()));
        kw.insert("headers".into(), Value::Object(self.headers.clone()));

        let content_type = self
            .headers
            .get("CONTENT-TYPE")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_ascii_lowercase();
        let body = if self.body.is_empty() {
            Value::String(String::new())
        } else if content_type.contains("application/json") {
            match serde_json::from_slice::<Value>(&self.body) {
                Ok(v) => v,
                Err(e) => {
                    error!(msgset = %MsgSet::JsonError, "cannot decode json body: {e}");
                    Value::Null
                }
            }
        } else {
            Value::String(String::from_utf8_lossy(&self.body).into_owned())
        };
        kw.insert("body".into(), body);

        self.reset();
        kw
    }
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Gobj adapter: one event per completed message.
pub struct GhttpParser {
    parser: HttpParser,
    owner: Gobj,
    on_message_event: String,
    /// true → `send_event` to the owner; false → `publish_event` from it.
    use_send_event: bool,
}

impl GhttpParser {
    pub fn new(
        owner: Gobj,
        mode: HttpParserType,
        on_message_event: &str,
        use_send_event: bool,
    ) -> GhttpParser {
        GhttpParser {
            parser: HttpParser::new(mode),
            owner,
            on_message_event: on_message_event.to_string(),
            use_send_event,
        }
    }

    /// Feed bytes; each completed message is delivered into the owner.
    /// On error the caller must close the transport.
    pub fn received(&mut self, rt: &mut Runtime, bytes: &[u8]) -> Result<usize, HttpError> {
        let (consumed, messages) = self.parser.received(bytes)?;
        for kw in messages {
            let kw = Kw::from_map(kw);
            if self.use_send_event {
                let _ = rt.send_event(self.owner, &self.on_message_event, kw, self.owner);
            } else {
                let _ = rt.publish_event(self.owner, &self.on_message_event, kw);
            }
        }
        Ok(consumed)
    }

    pub fn reset(&mut self) {
        self.parser.reset();
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
