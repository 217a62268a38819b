//! Wire format for cached responses.
//!
//! ```text
//! <status>\r\n
//! <name>: <value>\r\n      one line per header value
//! \r\n
//! <body bytes>
//! ```

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use thiserror::Error;

const SEPARATOR: &[u8] = b"\r\n\r\n";
const LINE_END: &[u8] = b"\r\n";
const NAME_VALUE: &[u8] = b": ";

#[derive(Error, Debug)]
pub enum WireError {
    #[error("invalid cached response format: missing header/body separator")]
    MissingSeparator,
    #[error("invalid status code: {0:?}")]
    InvalidStatus(String),
    #[error("invalid header line: {0:?}")]
    InvalidHeader(String),
}

// == Cached Response ==
/// A response as stored in the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    // == Encode ==
    /// Serializes into the wire format. Multi-valued headers repeat the name.
    pub fn encode(&self) -> Vec<u8> {
        let header_bytes: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len() + 4)
            .sum();
        let mut buf = Vec::with_capacity(8 + header_bytes + 2 + self.body.len());

        buf.extend_from_slice(self.status.as_str().as_bytes());
        buf.extend_from_slice(LINE_END);

        for (name, value) in &self.headers {
            buf.extend_from_slice(name.as_str().as_bytes());
            buf.extend_from_slice(NAME_VALUE);
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(LINE_END);
        }

        buf.extend_from_slice(LINE_END);
        buf.extend_from_slice(&self.body);
        buf
    }

    // == Decode ==
    /// Parses the wire format.
    ///
    /// Header lines without `": "` are skipped.
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let split = find(data, SEPARATOR).ok_or(WireError::MissingSeparator)?;
        let (head, body) = (&data[..split], &data[split + SEPARATOR.len()..]);

        let mut lines = split_lines(head);
        let status_line = lines.next().unwrap_or_default();
        let status = parse_status(status_line)?;

        let mut headers = HeaderMap::new();
        for line in lines {
            let Some(pos) = find(line, NAME_VALUE) else {
                continue;
            };
            let invalid = || WireError::InvalidHeader(String::from_utf8_lossy(line).into_owned());
            let name = HeaderName::from_bytes(&line[..pos]).map_err(|_| invalid())?;
            let value =
                HeaderValue::from_bytes(&line[pos + NAME_VALUE.len()..]).map_err(|_| invalid())?;
            headers.append(name, value);
        }

        Ok(Self {
            status,
            headers,
            body: Bytes::copy_from_slice(body),
        })
    }
}

fn parse_status(line: &[u8]) -> Result<StatusCode, WireError> {
    let invalid = || WireError::InvalidStatus(String::from_utf8_lossy(line).into_owned());
    let code: u16 = std::str::from_utf8(line)
        .map_err(|_| invalid())?
        .trim()
        .parse()
        .map_err(|_| invalid())?;
    StatusCode::from_u16(code).map_err(|_| invalid())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn split_lines(mut data: &[u8]) -> impl Iterator<Item = &[u8]> {
    std::iter::from_fn(move || {
        if data.is_empty() {
            return None;
        }
        match find(data, LINE_END) {
            Some(pos) => {
                let line = &data[..pos];
                data = &data[pos + LINE_END.len()..];
                Some(line)
            }
            None => {
                let line = data;
                data = &[];
                Some(line)
            }
        }
    })
}
