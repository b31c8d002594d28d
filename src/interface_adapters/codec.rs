// Wire codec: length-prefixed framing plus the escaped list-of-records payload
// format.
//
// Grounded on `original_source/src/common/protocol.c`'s `sendMsg`/`recvMsg` and
// `escapeString`/`unescapeString`, extended from a single flat record to an ordered
// list of records (see SPEC_FULL.md section 4.1), and fixed to an explicit
// little-endian header (the original copied the header struct as raw bytes, which is
// only correct between same-endian hosts).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const HEADER_SIZE: usize = 6;
/// Caps a single payload so a forged `payloadSize` cannot force an unbounded
/// allocation; exceeding it is treated the same as a dropped connection.
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

const RESERVED: [char; 6] = ['|', ':', '[', ']', ',', '\\'];

pub type Record = Vec<(String, String)>;
pub type Payload = Vec<Record>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    Disconnected,
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if RESERVED.contains(&c) {
            out.push('\\');
            out.push((((c as u32) as u8) ^ 0x7F) as char);
        } else {
            out.push(c);
        }
    }
    out
}

fn unescape_chars(chars: &[char]) -> String {
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() {
            let byte = ((chars[i + 1] as u32) as u8) ^ 0x7F;
            out.push(byte as char);
            i += 2;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

fn split_top_level(chars: &[char], sep: char) -> Vec<Vec<char>> {
    let mut parts = Vec::new();
    let mut current = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() {
            current.push(chars[i]);
            current.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if chars[i] == sep {
            parts.push(std::mem::take(&mut current));
            i += 1;
            continue;
        }
        current.push(chars[i]);
        i += 1;
    }
    parts.push(current);
    parts
}

fn find_unescaped(chars: &[char], target: char) -> Option<usize> {
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() {
            i += 2;
            continue;
        }
        if chars[i] == target {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Builds a single record out of `key: value` pairs, in order.
pub fn record(pairs: &[(&str, &str)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn serialize_record(rec: &Record) -> String {
    let body = rec
        .iter()
        .map(|(k, v)| format!("{}:{}", escape(k), escape(v)))
        .collect::<Vec<_>>()
        .join("|");
    format!("[{body}]")
}

pub fn serialize_payload(payload: &Payload) -> String {
    payload
        .iter()
        .map(serialize_record)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_record(content: &str) -> Record {
    let chars: Vec<char> = content.chars().collect();
    split_top_level(&chars, '|')
        .into_iter()
        .filter_map(|part| {
            let idx = find_unescaped(&part, ':')?;
            let key = unescape_chars(&part[..idx]);
            let value = unescape_chars(&part[idx + 1..]);
            Some((key, value))
        })
        .collect()
}

/// Parses a payload string into an ordered list of records. Tolerant of a record
/// fragment with no `:` (silently dropped) but stops at the first bracket mismatch.
pub fn parse_payload(s: &str) -> Payload {
    let chars: Vec<char> = s.chars().collect();
    let mut records = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        while i < chars.len() && (chars[i] == ',' || chars[i].is_whitespace()) {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }
        if chars[i] != '[' {
            break;
        }
        i += 1;
        let start = i;
        let mut end = None;
        let mut j = i;
        while j < chars.len() {
            if chars[j] == '\\' && j + 1 < chars.len() {
                j += 2;
                continue;
            }
            if chars[j] == ']' {
                end = Some(j);
                break;
            }
            j += 1;
        }
        let Some(end) = end else {
            break;
        };
        let content: String = chars[start..end].iter().collect();
        records.push(parse_record(&content));
        i = end + 1;
    }
    records
}

/// Looks up the value for `key` within `payload[record_index]`.
pub fn get_str<'a>(payload: &'a Payload, record_index: usize, key: &str) -> Option<&'a str> {
    payload
        .get(record_index)?
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub fn get_int(payload: &Payload, record_index: usize, key: &str) -> Option<i64> {
    get_str(payload, record_index, key)?.parse().ok()
}

/// Reads one complete frame: a 6-byte little-endian header followed by its payload.
pub async fn recv_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<(u16, Vec<u8>), CodecError> {
    let mut header = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|_| CodecError::Disconnected)?;
    let msg_type = u16::from_le_bytes([header[0], header[1]]);
    let payload_size = u32::from_le_bytes([header[2], header[3], header[4], header[5]]);
    if payload_size > MAX_PAYLOAD_SIZE {
        return Err(CodecError::Disconnected);
    }

    let mut payload = vec![0u8; payload_size as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|_| CodecError::Disconnected)?;
    Ok((msg_type, payload))
}

/// Writes one complete frame atomically (a single `write_all` over header+payload).
pub async fn send_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg_type: u16,
    payload: &[u8],
) -> Result<(), CodecError> {
    if payload.len() as u32 > MAX_PAYLOAD_SIZE {
        return Err(CodecError::Disconnected);
    }
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&msg_type.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    writer
        .write_all(&buf)
        .await
        .map_err(|_| CodecError::Disconnected)
}

pub async fn recv_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<(u16, Payload), CodecError> {
    let (msg_type, bytes) = recv_frame(reader).await?;
    let text = String::from_utf8_lossy(&bytes);
    Ok((msg_type, parse_payload(&text)))
}

pub async fn send_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg_type: u16,
    payload: &Payload,
) -> Result<(), CodecError> {
    let text = serialize_payload(payload);
    send_frame(writer, msg_type, text.as_bytes()).await
}
