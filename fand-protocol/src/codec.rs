//! Frame codec and blocking send/recv

use std::io::{ErrorKind as IoErrorKind, Read, Write};

use serde_json::Value;
use tracing::{debug, error};

use fand_error::{FandError, Result};

use crate::{Message, RequestKind};

pub const HEADER_MAGIC: &[u8; 4] = b"99F9";
pub const HEADER_MAGIC_SIZE: usize = 4;
pub const HEADER_DATA_SIZE: usize = 4;
pub const HEADER_SIZE: usize = HEADER_MAGIC_SIZE + HEADER_DATA_SIZE;

/// Largest payload the 4 hex digit length field can describe
pub const MAX_PAYLOAD_SIZE: usize = 0xffff;

/// Serialize `(kind, args)` into the JSON payload
pub fn encode_payload(kind: RequestKind, args: &[Value]) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(&(kind, args))?;
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FandError::Serialization(format!(
            "payload of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }
    Ok(payload)
}

/// Build a complete frame: header followed by payload
pub fn encode_frame(kind: RequestKind, args: &[Value]) -> Result<Vec<u8>> {
    let payload = encode_payload(kind, args)?;
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(HEADER_MAGIC);
    frame.extend_from_slice(format!("{:04x}", payload.len()).as_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Validate a header and return the declared payload length
pub fn parse_header(header: &[u8]) -> Result<usize> {
    if header.len() != HEADER_SIZE {
        return Err(FandError::corrupted("Invalid header size"));
    }
    if &header[..HEADER_MAGIC_SIZE] != HEADER_MAGIC {
        return Err(FandError::corrupted("Invalid magic number"));
    }

    let digits = &header[HEADER_MAGIC_SIZE..];
    if !digits.iter().all(u8::is_ascii_hexdigit) {
        return Err(FandError::corrupted("Invalid length field"));
    }
    // All bytes are ASCII hex digits at this point
    let digits = std::str::from_utf8(digits).map_err(|_| FandError::corrupted("Invalid length field"))?;
    usize::from_str_radix(digits, 16).map_err(|_| FandError::corrupted("Invalid length field"))
}

/// Deserialize a JSON payload into a [`Message`]
///
/// A well-formed payload naming a kind outside the closed set yields
/// [`FandError::UnknownRequest`] rather than a corrupted-data error.
pub fn decode_payload(payload: &[u8]) -> Result<Message> {
    let (kind, args): (String, Vec<Value>) = serde_json::from_slice(payload)
        .map_err(|e| FandError::corrupted(format!("Cannot decode payload: {e}")))?;
    let kind = kind.parse::<RequestKind>()?;
    Ok(Message { kind, args })
}

/// Decode a complete frame held in memory
pub fn decode_frame(frame: &[u8]) -> Result<Message> {
    if frame.len() < HEADER_SIZE {
        return Err(FandError::corrupted("Invalid header size"));
    }
    let (header, payload) = frame.split_at(HEADER_SIZE);
    let declared = parse_header(header)?;
    if payload.len() != declared {
        return Err(FandError::corrupted(format!(
            "Declared {} payload bytes, got {}",
            declared,
            payload.len()
        )));
    }
    decode_payload(payload)
}

/// Send one message as a single write
///
/// A write that transmits fewer bytes than the full frame is reported as
/// [`FandError::PartialWrite`]; the remainder is not retried.
pub fn send<W: Write>(writer: &mut W, kind: RequestKind, args: &[Value]) -> Result<()> {
    let frame = encode_frame(kind, args)?;
    let shown = Value::Array(args.to_vec());
    debug!("Sending {}{}", kind, shown);

    let sent = writer
        .write(&frame)
        .map_err(|e| FandError::io(format!("Cannot send {kind}"), e))?;
    if sent != frame.len() {
        return Err(FandError::PartialWrite {
            sent,
            expected: frame.len(),
        });
    }
    writer
        .flush()
        .map_err(|e| FandError::io(format!("Cannot send {kind}"), e))
}

/// Receive one message
///
/// `DISCONNECT` is never returned: it is reported as
/// [`FandError::ConnectionReset`] after logging its reason.
pub fn recv<R: Read>(reader: &mut R) -> Result<Message> {
    let mut header = [0u8; HEADER_SIZE];
    let read = read_full(reader, &mut header)?;
    if read == 0 {
        return Err(FandError::ConnectionReset("Nothing received".into()));
    }
    if read != HEADER_SIZE {
        return Err(FandError::corrupted("Invalid header size"));
    }

    let length = parse_header(&header)?;
    let mut payload = vec![0u8; length];
    let read = read_full(reader, &mut payload)?;
    if read != length {
        return Err(FandError::corrupted(format!(
            "Declared {length} payload bytes, got {read}"
        )));
    }

    let message = decode_payload(&payload)?;
    debug!("Received {}", message);

    if message.kind == RequestKind::Disconnect {
        if let Some(reason) = message.args.first().filter(|r| !r.is_null()) {
            match reason.as_str() {
                Some(reason) => error!("Connection closed by peer: {}", reason),
                None => error!("Connection closed by peer: {}", reason),
            }
        }
        return Err(FandError::ConnectionReset("Connection reset by peer".into()));
    }
    Ok(message)
}

/// Read until `buf` is full or EOF, returning the number of bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(e) => return Err(FandError::io("Cannot receive data", e)),
        }
    }
    Ok(filled)
}
