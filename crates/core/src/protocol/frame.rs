//! Line framer & message parser.
//!
//! Reads one RTSP request at a time off a blocking stream. CR, LF, and
//! CRLF are all accepted line terminators; [`std::io::BufReader`]'s
//! `fill_buf`/`consume` pair gives us the original's "scan the buffer for
//! a terminator, replace it, keep going" loop without the manual NUL
//! splicing a non-memory-safe implementation needs.

use std::io::{BufRead, BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{ParseErrorKind, Result, RtspError};
use crate::message::MAX_HEADERS;
use crate::protocol::request::RtspRequest;

const INITIAL_BUFFER: usize = 4096;
const BODY_CHUNK: usize = 64 * 1024;
const CHUNK_PACING: Duration = Duration::from_millis(80);
const STALL_DEADLINE: Duration = Duration::from_secs(15);

/// Read one complete RTSP request off `reader`.
///
/// `stop` is polled at every suspension point so a watchdog-cancelled
/// connection unwinds with [`RtspError::Shutdown`] instead of blocking
/// forever. `on_stall` is invoked at most once if the body takes
/// longer than 15s to fully arrive — the slow body is not aborted, the
/// callback only fires the `stal` metadata event.
pub fn read_message<R: Read>(
    reader: R,
    stop: &AtomicBool,
    mut on_stall: impl FnMut(),
) -> Result<RtspRequest> {
    let mut reader = BufReader::with_capacity(INITIAL_BUFFER, reader);

    let request_line = loop {
        match read_one_line(&mut reader, stop)? {
            None => return Err(RtspError::ChannelClosed),
            Some(bytes) if bytes.is_empty() => continue,
            Some(bytes) => break String::from_utf8_lossy(&bytes).into_owned(),
        }
    };

    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or(RtspError::Parse {
            kind: ParseErrorKind::InvalidRequestLine,
        })?
        .to_string();
    let target = parts
        .next()
        .ok_or(RtspError::Parse {
            kind: ParseErrorKind::InvalidRequestLine,
        })?
        .to_string();
    let version = parts
        .next()
        .ok_or(RtspError::Parse {
            kind: ParseErrorKind::InvalidRequestLine,
        })?
        .to_string();
    if parts.next().is_some() {
        return Err(RtspError::Parse {
            kind: ParseErrorKind::InvalidRequestLine,
        });
    }

    let mut headers = Vec::new();
    loop {
        match read_one_line(&mut reader, stop)? {
            None => return Err(RtspError::ChannelClosed),
            Some(bytes) if bytes.is_empty() => break,
            Some(bytes) => {
                if headers.len() >= MAX_HEADERS {
                    return Err(RtspError::Parse {
                        kind: ParseErrorKind::TooManyHeaders,
                    });
                }
                let line = String::from_utf8_lossy(&bytes).into_owned();
                let colon = line.find(':').ok_or(RtspError::Parse {
                    kind: ParseErrorKind::InvalidHeader,
                })?;
                let name = line[..colon].trim().to_string();
                let value = line[colon + 1..].trim().to_string();
                headers.push((name, value));
            }
        }
    }

    let content_length = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok());

    let body = match content_length {
        None | Some(0) => None,
        Some(len) => Some(read_body(&mut reader, stop, len, &mut on_stall)?),
    };

    Ok(RtspRequest {
        method,
        target,
        version,
        headers,
        body,
    })
}

/// Read up to and including the next line terminator, stripping it.
/// `Ok(None)` means the stream was at EOF with no bytes pending at all;
/// any bytes read before EOF are still returned as the final line.
fn read_one_line<R: Read>(
    reader: &mut BufReader<R>,
    stop: &AtomicBool,
) -> Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let mut saw_any = false;

    loop {
        if stop.load(Ordering::Relaxed) {
            return Err(RtspError::Shutdown);
        }

        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return if saw_any { Ok(Some(line)) } else { Ok(None) };
        }

        match buf.iter().position(|&b| b == b'\r' || b == b'\n') {
            Some(pos) => {
                let terminator = buf[pos];
                line.extend_from_slice(&buf[..pos]);
                saw_any = true;

                if terminator == b'\r' && pos + 1 == buf.len() {
                    // `\r` is the last byte in the current fill — consume it
                    // and peek the next fill for a following `\n` to collapse
                    // a CRLF pair split across a buffer refill.
                    reader.consume(pos + 1);
                    let next = reader.fill_buf()?;
                    if !next.is_empty() && next[0] == b'\n' {
                        reader.consume(1);
                    }
                    return Ok(Some(line));
                }

                let mut consumed = pos + 1;
                if terminator == b'\r' && buf.get(pos + 1) == Some(&b'\n') {
                    consumed += 1;
                }
                reader.consume(consumed);
                return Ok(Some(line));
            }
            None => {
                line.extend_from_slice(buf);
                saw_any = true;
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

/// Read exactly `len` body bytes in ≤64 KiB chunks with ~80ms inter-chunk
/// pacing; past a 15s total stall the caller's `on_stall` fires once, but
/// the read keeps going.
fn read_body<R: Read>(
    reader: &mut BufReader<R>,
    stop: &AtomicBool,
    len: usize,
    on_stall: &mut impl FnMut(),
) -> Result<Vec<u8>> {
    let mut body = Vec::with_capacity(len);
    let start = Instant::now();
    let mut stalled = false;

    while body.len() < len {
        if stop.load(Ordering::Relaxed) {
            return Err(RtspError::Shutdown);
        }

        let chunk_len = (len - body.len()).min(BODY_CHUNK);
        let mut chunk = vec![0u8; chunk_len];
        reader
            .read_exact(&mut chunk)
            .map_err(|_| RtspError::ChannelClosed)?;
        body.extend_from_slice(&chunk);

        if !stalled && start.elapsed() > STALL_DEADLINE {
            stalled = true;
            on_stall();
        }

        if body.len() < len {
            std::thread::sleep(CHUNK_PACING);
        }
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stop() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn parses_request_without_body() {
        let raw = b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\nUser-Agent: iTunes/1\r\n\r\n".to_vec();
        let request = read_message(Cursor::new(raw), &stop(), || panic!("no stall expected")).unwrap();
        assert_eq!(request.method, "OPTIONS");
        assert_eq!(request.target, "*");
        assert_eq!(request.cseq(), Some("1"));
        assert!(request.body.is_none());
    }

    #[test]
    fn parses_request_with_content_length_body() {
        let body = b"v=0\r\ns=x\r\n";
        let mut raw = format!(
            "ANNOUNCE rtsp://10.0.0.1/x RTSP/1.0\r\nCSeq: 2\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        raw.extend_from_slice(body);

        let request = read_message(Cursor::new(raw), &stop(), || panic!("no stall expected")).unwrap();
        assert_eq!(request.method, "ANNOUNCE");
        assert_eq!(request.body.as_deref(), Some(body.as_slice()));
    }

    #[test]
    fn accepts_bare_lf_and_bare_cr_terminators() {
        let raw = b"OPTIONS * RTSP/1.0\nCSeq: 9\r\r".to_vec();
        let request = read_message(Cursor::new(raw), &stop(), || panic!("no stall expected")).unwrap();
        assert_eq!(request.cseq(), Some("9"));
    }

    #[test]
    fn skips_leading_blank_lines() {
        let raw = b"\r\n\r\nOPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n".to_vec();
        let request = read_message(Cursor::new(raw), &stop(), || panic!("no stall expected")).unwrap();
        assert_eq!(request.method, "OPTIONS");
    }

    #[test]
    fn rejects_malformed_request_line() {
        let raw = b"JUST_A_METHOD\r\n\r\n".to_vec();
        let err = read_message(Cursor::new(raw), &stop(), || {}).unwrap_err();
        assert!(matches!(
            err,
            RtspError::Parse {
                kind: ParseErrorKind::InvalidRequestLine
            }
        ));
    }

    #[test]
    fn rejects_header_without_colon() {
        let raw = b"OPTIONS * RTSP/1.0\r\nNotAHeader\r\n\r\n".to_vec();
        let err = read_message(Cursor::new(raw), &stop(), || {}).unwrap_err();
        assert!(matches!(
            err,
            RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader
            }
        ));
    }

    #[test]
    fn rejects_more_than_sixteen_headers() {
        let mut raw = b"OPTIONS * RTSP/1.0\r\n".to_vec();
        for i in 0..(MAX_HEADERS + 1) {
            raw.extend_from_slice(format!("H{i}: v\r\n").as_bytes());
        }
        raw.extend_from_slice(b"\r\n");
        let err = read_message(Cursor::new(raw), &stop(), || {}).unwrap_err();
        assert!(matches!(
            err,
            RtspError::Parse {
                kind: ParseErrorKind::TooManyHeaders
            }
        ));
    }

    #[test]
    fn empty_stream_is_channel_closed() {
        let err = read_message(Cursor::new(Vec::new()), &stop(), || {}).unwrap_err();
        assert!(matches!(err, RtspError::ChannelClosed));
    }

    #[test]
    fn truncated_body_is_channel_closed() {
        let raw = b"OPTIONS * RTSP/1.0\r\nContent-Length: 10\r\n\r\nshort".to_vec();
        let err = read_message(Cursor::new(raw), &stop(), || {}).unwrap_err();
        assert!(matches!(err, RtspError::ChannelClosed));
    }

    #[test]
    fn stop_flag_yields_shutdown() {
        let raw = b"OPTIONS * RTSP/1.0\r\n\r\n".to_vec();
        let stop = AtomicBool::new(true);
        let err = read_message(Cursor::new(raw), &stop, || {}).unwrap_err();
        assert!(matches!(err, RtspError::Shutdown));
    }

    #[test]
    fn large_body_spans_multiple_chunks() {
        let body = vec![0xABu8; BODY_CHUNK + 10];
        let mut raw = format!(
            "SET_PARAMETER * RTSP/1.0\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        raw.extend_from_slice(&body);

        let request = read_message(Cursor::new(raw), &stop(), || panic!("no stall expected")).unwrap();
        assert_eq!(request.body.as_deref(), Some(body.as_slice()));
    }
}
