//! Content-Length message framing
//!
//! Each frame is an ASCII header block terminated by a blank line,
//! followed by exactly `Content-Length` bytes of UTF-8 JSON:
//!
//! ```text
//! Content-Length: <decimal-byte-count>\r\n
//! \r\n
//! <body, exactly Content-Length bytes>
//! ```
//!
//! The body is read by byte count, never by delimiter scanning, since
//! JSON string values may themselves contain `\r\n\r\n`. Additional
//! header lines are permitted but only `Content-Length` is interpreted.
//! No maximum message size is enforced at this layer; callers may impose
//! one. Headers are consumed one byte at a time, so readers should be
//! buffered (`tokio::io::BufReader`).

use pipelink_core::{LinkError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Encodes a message body into a complete frame.
///
/// The length header counts UTF-8 bytes, not characters.
pub fn encode(body: &str) -> Vec<u8> {
    let payload = body.as_bytes();
    let header = format!("Content-Length: {}\r\n\r\n", payload.len());
    let mut frame = Vec::with_capacity(header.len() + payload.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Reads the next frame from `reader` and returns its body.
///
/// Returns `Ok(None)` on an orderly peer close between frames. A close
/// mid-header or mid-body, or a header block without a parseable
/// `Content-Length`, is a framing error: the stream position is
/// unrecoverable and the connection must be dropped.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut header = Vec::with_capacity(64);
    loop {
        let byte = match reader.read_u8().await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                if header.is_empty() {
                    return Ok(None);
                }
                return Err(LinkError::ProtocolFraming(
                    "connection closed mid-header".into(),
                ));
            }
            Err(e) => return Err(LinkError::TransportFailure(e.to_string())),
        };
        header.push(byte);
        if header.ends_with(HEADER_TERMINATOR) {
            break;
        }
    }

    let length = parse_content_length(&header)?;

    let mut body = vec![0u8; length];
    match reader.read_exact(&mut body).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(LinkError::ProtocolFraming(format!(
                "connection closed before full body arrived (expected {length} bytes)"
            )));
        }
        Err(e) => return Err(LinkError::TransportFailure(e.to_string())),
    }

    String::from_utf8(body)
        .map(Some)
        .map_err(|e| LinkError::ProtocolFraming(format!("body is not valid UTF-8: {e}")))
}

/// Writes a complete frame for `body` as a single write.
///
/// Concurrent writers on the same stream must be serialized by the
/// caller; the frame itself is handed to the OS in one `write_all`.
pub async fn write_frame<W>(writer: &mut W, body: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(body);
    writer
        .write_all(&frame)
        .await
        .map_err(|e| LinkError::TransportFailure(format!("frame write failed: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| LinkError::TransportFailure(format!("frame flush failed: {e}")))?;
    Ok(())
}

/// Extracts `Content-Length` from a raw header block.
///
/// Header keys are matched case-insensitively; unknown headers are
/// skipped.
fn parse_content_length(header: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(header)
        .map_err(|_| LinkError::ProtocolFraming("header block is not ASCII text".into()))?;

    for line in text.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("Content-Length") {
            return value.trim().parse::<usize>().map_err(|_| {
                LinkError::ProtocolFraming(format!("invalid Content-Length value: {value:?}"))
            });
        }
    }

    Err(LinkError::ProtocolFraming(
        "no Content-Length header found".into(),
    ))
}
