//! TCP request/response exchange with the phone.
//!
//! Requests are line-oriented UTF-8 with no length prefix; the server
//! consumes until its own grammar is satisfied. Responses carry a 32-byte
//! ASCII decimal length header followed by exactly that many payload
//! bytes, assembled across as many reads as it takes.
//!
//! Exactly one TCP connection is opened and closed per call; there is no
//! pooling or reuse. Framing failures are fatal to the current call and
//! never retried here (retrying risks repeating the same crash signature).

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::endpoint::Endpoint;
use crate::error::SessionError;

// ============================================================================
// Constants (MUST match the phone app)
// ============================================================================

/// Width of the response length header.
pub const HEADER_LEN: usize = 32;

/// Largest single read while assembling the response body.
const BUFFSIZE: usize = 4096;

/// Bound on the connect and on each read or write.
const SESSION_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Exchange
// ============================================================================

/// Send one request and read the framed response.
pub fn contact_server(endpoint: &Endpoint, request: &str) -> Result<String, SessionError> {
    contact_server_with_timeout(endpoint, request, SESSION_TIMEOUT)
}

/// As [`contact_server`] with an explicit bound (tests use short ones).
pub fn contact_server_with_timeout(
    endpoint: &Endpoint,
    request: &str,
    timeout: Duration,
) -> Result<String, SessionError> {
    let mut stream = connect(endpoint, timeout)?;

    log::debug!("sending {} bytes to {}", request.len(), endpoint);
    stream.write_all(request.as_bytes()).map_err(|err| match err.kind() {
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => SessionError::ServerCrashed,
        _ => SessionError::Io(err),
    })?;

    read_response(&mut stream)
}

fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<TcpStream, SessionError> {
    let stream =
        TcpStream::connect_timeout(&endpoint.socket_addr(), timeout).map_err(|err| {
            match err.kind() {
                ErrorKind::ConnectionRefused => SessionError::ConnectionRefused,
                ErrorKind::TimedOut | ErrorKind::WouldBlock => SessionError::ConnectTimeout,
                ErrorKind::Interrupted => SessionError::Cancelled,
                _ => SessionError::Io(err),
            }
        })?;

    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    Ok(stream)
}

// ============================================================================
// Response framing
// ============================================================================

/// Read and decode one framed response.
///
/// An empty or reset header read means the server crashed; a header
/// timeout means it is frozen. The first decoded character is a framing
/// artifact between header and body and is stripped unconditionally.
pub fn read_response<R: Read>(reader: &mut R) -> Result<String, SessionError> {
    let mut header = [0u8; HEADER_LEN];
    if let Err(err) = reader.read_exact(&mut header) {
        return Err(match err.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted => SessionError::ServerCrashed,
            ErrorKind::TimedOut | ErrorKind::WouldBlock => SessionError::ServerFrozen,
            _ => SessionError::Io(err),
        });
    }

    let body_len = parse_header(&header)?;
    log::trace!("response header announces {} bytes", body_len);

    let mut body = Vec::with_capacity(body_len.min(BUFFSIZE));
    let mut chunk = [0u8; BUFFSIZE];
    while body.len() < body_len {
        let want = (body_len - body.len()).min(BUFFSIZE);
        match reader.read(&mut chunk[..want]) {
            Ok(0) => return Err(SessionError::ServerCrashed),
            Ok(read) => body.extend_from_slice(&chunk[..read]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(match err.kind() {
                    ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                        SessionError::ServerCrashed
                    }
                    ErrorKind::TimedOut | ErrorKind::WouldBlock => SessionError::ServerFrozen,
                    _ => SessionError::Io(err),
                })
            }
        }
    }

    let decoded = String::from_utf8_lossy(&body).into_owned();
    Ok(strip_framing_char(decoded))
}

/// Parse the zero-padded ASCII decimal header.
fn parse_header(header: &[u8; HEADER_LEN]) -> Result<usize, SessionError> {
    let text = std::str::from_utf8(header)
        .map_err(|_| SessionError::MalformedHeader(String::from_utf8_lossy(header).into_owned()))?;

    let digits = text
        .trim_matches(|c: char| c.is_ascii_whitespace() || c == '\0')
        .trim_start_matches('0');
    if digits.is_empty() {
        // All zeros: a zero-length payload.
        return Ok(0);
    }

    digits
        .parse::<usize>()
        .map_err(|_| SessionError::MalformedHeader(text.trim_matches('\0').to_string()))
}

/// Drop the first decoded character, a framing artifact between header
/// and body. Preserved byte-for-byte from the wire protocol; do not infer
/// new semantics.
fn strip_framing_char(mut decoded: String) -> String {
    if !decoded.is_empty() {
        decoded.remove(0);
    }
    decoded
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// A reader that hands out its contents one byte per read call.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.data.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.data[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    fn framed(body: &str) -> Vec<u8> {
        let mut wire = format!("{:032}", body.len()).into_bytes();
        wire.extend_from_slice(body.as_bytes());
        wire
    }

    #[test]
    fn parses_zero_padded_header() {
        let mut header = [b'0'; HEADER_LEN];
        header[HEADER_LEN - 2] = b'4';
        header[HEADER_LEN - 1] = b'2';
        assert_eq!(parse_header(&header).unwrap(), 42);
    }

    #[test]
    fn all_zero_header_is_zero_length() {
        assert_eq!(parse_header(&[b'0'; HEADER_LEN]).unwrap(), 0);
    }

    #[test]
    fn garbage_header_is_malformed() {
        let mut header = [b'x'; HEADER_LEN];
        header[0] = b'?';
        assert!(matches!(
            parse_header(&header),
            Err(SessionError::MalformedHeader(_))
        ));
    }

    #[test]
    fn response_round_trip_strips_leading_char() {
        let wire = framed("\nHello from the phone");
        let decoded = read_response(&mut Cursor::new(wire)).unwrap();
        assert_eq!(decoded, "Hello from the phone");
    }

    #[test]
    fn body_split_across_reads_decodes_identically() {
        let body = "\nline one\nline two\nline three";
        let whole = read_response(&mut Cursor::new(framed(body))).unwrap();
        let trickled = read_response(&mut Trickle {
            data: framed(body),
            pos: 0,
        })
        .unwrap();
        assert_eq!(whole, trickled);
        assert_eq!(trickled, &body[1..]);
    }

    #[test]
    fn zero_length_payload_decodes_empty() {
        let wire = framed("");
        assert_eq!(read_response(&mut Cursor::new(wire)).unwrap(), "");
    }

    #[test]
    fn empty_stream_reports_server_crashed() {
        let err = read_response(&mut Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, SessionError::ServerCrashed));
    }

    #[test]
    fn truncated_header_reports_server_crashed() {
        let err = read_response(&mut Cursor::new(b"00000042".to_vec())).unwrap_err();
        assert!(matches!(err, SessionError::ServerCrashed));
    }

    #[test]
    fn truncated_body_reports_server_crashed() {
        let mut wire = framed("\nfull body expected here");
        wire.truncate(HEADER_LEN + 5);
        let err = read_response(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(err, SessionError::ServerCrashed));
    }

    #[test]
    fn multibyte_first_char_is_stripped_whole() {
        assert_eq!(strip_framing_char("é-rest".to_string()), "-rest");
        assert_eq!(strip_framing_char(String::new()), "");
    }
}
