/// Largest request we are willing to buffer. Anything bigger is not a
/// command this firmware understands; the connection is abandoned.
pub const MAX_REQUEST_BYTES: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadProgress {
    /// Header terminator not seen yet; keep feeding bytes.
    Incomplete,
    /// Blank line seen; the request text is ready to parse.
    Complete,
    /// Buffer cap exceeded; abandon the connection.
    Overflow,
}

/// Incremental accumulator for one inbound request. Bytes arrive one
/// at a time from the socket; a blank line (two consecutive newline
/// terminators, carriage returns ignored) ends the request.
#[derive(Debug, Default)]
pub struct RequestReader {
    buffer: Vec<u8>,
    current_line_len: usize,
    complete: bool,
}

impl RequestReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, byte: u8) -> ReadProgress {
        if self.complete {
            return ReadProgress::Complete;
        }
        if self.buffer.len() >= MAX_REQUEST_BYTES {
            return ReadProgress::Overflow;
        }

        self.buffer.push(byte);

        match byte {
            b'\n' => {
                if self.current_line_len == 0 {
                    self.complete = true;
                    return ReadProgress::Complete;
                }
                self.current_line_len = 0;
            }
            b'\r' => {}
            _ => self.current_line_len += 1,
        }

        ReadProgress::Incomplete
    }

    pub fn extend(&mut self, bytes: &[u8]) -> ReadProgress {
        for &byte in bytes {
            match self.push(byte) {
                ReadProgress::Incomplete => {}
                done => return done,
            }
        }
        ReadProgress::Incomplete
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Accumulated request text. Bytes outside ASCII never appear in
    /// the routes this firmware serves; they decode lossily.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }
}

/// A parsed request line. Only the method and path matter to the
/// dispatcher; headers and body are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
}

impl Request {
    /// Parses `"<METHOD> <path> <version>"` from the first line of the
    /// request text. Malformed lines parse to None and fall through to
    /// the 404 branch downstream.
    pub fn parse(text: &str) -> Option<Self> {
        let line = text.lines().next()?;
        let mut parts = line.split_whitespace();
        let method = parts.next()?;
        let path = parts.next()?;
        Some(Self {
            method: method.to_string(),
            path: path.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn completes_on_blank_line() {
        let mut reader = RequestReader::new();
        let progress = reader.extend(b"GET /26/on HTTP/1.1\r\nHost: device\r\n");
        assert_eq!(progress, ReadProgress::Incomplete);
        assert!(!reader.is_complete());

        let progress = reader.extend(b"\r\n");
        assert_eq!(progress, ReadProgress::Complete);
        assert!(reader.is_complete());
    }

    #[test]
    fn bare_newlines_also_terminate() {
        let mut reader = RequestReader::new();
        assert_eq!(reader.extend(b"GET /status HTTP/1.1\n\n"), ReadProgress::Complete);
    }

    #[test]
    fn overflow_on_oversized_request() {
        let mut reader = RequestReader::new();
        let garbage = vec![b'a'; MAX_REQUEST_BYTES + 1];
        assert_eq!(reader.extend(&garbage), ReadProgress::Overflow);
        assert!(!reader.is_complete());
    }

    #[test]
    fn cap_counts_wire_bytes() {
        // Bytes above 0x7f must not widen the buffer past the cap.
        let mut reader = RequestReader::new();
        let garbage = vec![0xF0u8; MAX_REQUEST_BYTES];
        assert_eq!(reader.extend(&garbage), ReadProgress::Incomplete);
        assert_eq!(reader.push(0xF0), ReadProgress::Overflow);
    }

    #[test]
    fn parses_method_and_path() {
        let request = Request::parse("GET /26/on HTTP/1.1\r\nHost: device\r\n\r\n").unwrap();
        assert_eq!(
            request,
            Request {
                method: "GET".to_string(),
                path: "/26/on".to_string(),
            }
        );
    }

    #[test]
    fn malformed_request_line_is_none() {
        assert_eq!(Request::parse(""), None);
        assert_eq!(Request::parse("\r\n"), None);
        assert_eq!(Request::parse("GET"), None);
    }

    #[test]
    fn path_is_exact_not_substring() {
        // A path merely containing a known route must not parse to it.
        let request = Request::parse("GET /status/26/on HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.path, "/status/26/on");
    }
}
