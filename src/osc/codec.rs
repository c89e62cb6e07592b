//! Binary OSC 1.0 wire codec.
//!
//! ```text
//! message: [address\0 pad4] [,tags\0 pad4] [arg payloads...]
//! bundle:  [#bundle\0] [u32 BE seconds][u32 BE fraction] ([i32 BE size][packet])*
//! ```
//!
//! All numbers are big-endian. Strings are null-terminated and zero-padded to a
//! multiple of four bytes. Blobs carry an `i32` size prefix and are padded the
//! same way.

use super::types::{OscBundle, OscMessage, OscPacket, OscTime, OscType};

/// Marker that opens every bundle (already 4-byte aligned, including its null).
const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// Errors produced while decoding an OSC frame.
///
/// Each variant identifies what was wrong with the frame so that the caller can
/// log and discard it without tearing down the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OscError {
    /// The frame ended before a field was complete.
    #[error("truncated OSC frame: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        /// Byte offset of the incomplete field.
        offset: usize,
        /// Bytes the field required.
        needed: usize,
        /// Bytes that were left.
        available: usize,
    },
    /// A string ran to the end of the frame without a null terminator.
    #[error("unterminated OSC string at offset {0}")]
    MissingTerminator(usize),
    /// A string or char was not valid UTF-8.
    #[error("invalid UTF-8 in OSC string at offset {0}")]
    InvalidUtf8(usize),
    /// The address did not start with `/`.
    #[error("invalid OSC address {0:?}")]
    BadAddress(String),
    /// The type-tag string did not start with `,`.
    #[error("invalid OSC type-tag string {0:?}")]
    BadTypeTags(String),
    /// The type-tag string named a type this codec does not understand.
    #[error("unsupported OSC type tag {0:?}")]
    UnsupportedTypeTag(char),
    /// A bundle element had a negative or misaligned size.
    #[error("malformed OSC bundle element at offset {offset}: {reason}")]
    BadBundle {
        /// Byte offset of the element size prefix.
        offset: usize,
        /// What was wrong.
        reason: String,
    },
    /// Non-zero bytes followed a complete message.
    #[error("{0} unexpected trailing bytes after OSC message")]
    TrailingBytes(usize),
    /// The frame was empty.
    #[error("empty OSC frame")]
    Empty,
}

/// Encode a packet into its wire form.
#[must_use]
pub fn encode(packet: &OscPacket) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    encode_packet(packet, &mut buf);
    buf
}

/// Encode a single message into its wire form.
#[must_use]
pub fn encode_message(msg: &OscMessage) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    encode_message_into(msg, &mut buf);
    buf
}

fn encode_packet(packet: &OscPacket, buf: &mut Vec<u8>) {
    match packet {
        OscPacket::Message(msg) => encode_message_into(msg, buf),
        OscPacket::Bundle(bundle) => encode_bundle_into(bundle, buf),
    }
}

fn encode_message_into(msg: &OscMessage, buf: &mut Vec<u8>) {
    write_string(buf, &msg.addr);
    write_string(buf, &msg.type_tags());
    for arg in &msg.args {
        match arg {
            OscType::Int(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscType::Float(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscType::String(s) => write_string(buf, s),
            OscType::Blob(data) => {
                buf.extend_from_slice(&(data.len() as i32).to_be_bytes());
                buf.extend_from_slice(data);
                pad_to_four(buf);
            }
            OscType::Long(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscType::Double(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscType::Time(t) => write_time(buf, *t),
            OscType::Char(c) => buf.extend_from_slice(&u32::from(*c).to_be_bytes()),
            OscType::Bool(_) | OscType::Nil | OscType::Inf => {}
        }
    }
}

fn encode_bundle_into(bundle: &OscBundle, buf: &mut Vec<u8>) {
    buf.extend_from_slice(BUNDLE_TAG);
    write_time(buf, bundle.timetag);
    for packet in &bundle.content {
        let size_at = buf.len();
        buf.extend_from_slice(&[0; 4]);
        encode_packet(packet, buf);
        let size = (buf.len() - size_at - 4) as i32;
        buf[size_at..size_at + 4].copy_from_slice(&size.to_be_bytes());
    }
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    pad_to_four(buf);
}

fn write_time(buf: &mut Vec<u8>, t: OscTime) {
    buf.extend_from_slice(&t.seconds.to_be_bytes());
    buf.extend_from_slice(&t.fractional.to_be_bytes());
}

fn pad_to_four(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// Decode a complete frame into a message or bundle.
///
/// Zero padding after the last argument is tolerated; any other trailing data,
/// or a frame that ends mid-field, is rejected with an [`OscError`].
pub fn decode(bytes: &[u8]) -> Result<OscPacket, OscError> {
    if bytes.is_empty() {
        return Err(OscError::Empty);
    }
    let mut reader = Reader::new(bytes);
    let packet = read_packet(&mut reader)?;
    reader.finish()?;
    Ok(packet)
}

fn read_packet(reader: &mut Reader<'_>) -> Result<OscPacket, OscError> {
    if reader.remaining().starts_with(BUNDLE_TAG) {
        read_bundle(reader).map(OscPacket::Bundle)
    } else {
        read_message(reader).map(OscPacket::Message)
    }
}

fn read_bundle(reader: &mut Reader<'_>) -> Result<OscBundle, OscError> {
    reader.take(BUNDLE_TAG.len())?;
    let timetag = reader.read_time()?;
    let mut content = Vec::new();

    while !reader.is_empty() {
        let offset = reader.pos;
        let size = reader.read_i32()?;
        if size < 0 {
            return Err(OscError::BadBundle {
                offset,
                reason: format!("negative element size {size}"),
            });
        }
        let size = size as usize;
        if size % 4 != 0 {
            return Err(OscError::BadBundle {
                offset,
                reason: format!("element size {size} is not a multiple of 4"),
            });
        }
        let element = reader.take(size)?;
        let mut inner = Reader::new_at(element, offset + 4);
        content.push(read_packet(&mut inner)?);
        inner.finish()?;
    }

    Ok(OscBundle { timetag, content })
}

fn read_message(reader: &mut Reader<'_>) -> Result<OscMessage, OscError> {
    let addr = reader.read_string()?;
    if !addr.starts_with('/') {
        return Err(OscError::BadAddress(addr));
    }

    // Some senders omit the type-tag string for argument-less messages.
    if reader.is_empty() {
        return Ok(OscMessage { addr, args: vec![] });
    }

    let raw_tags = reader.read_string()?;
    let Some(tags) = raw_tags.strip_prefix(',') else {
        return Err(OscError::BadTypeTags(raw_tags.clone()));
    };

    let mut args = Vec::with_capacity(tags.len());
    for tag in tags.chars() {
        let arg = match tag {
            'i' => OscType::Int(reader.read_i32()?),
            'f' => OscType::Float(f32::from_be_bytes(reader.read_array()?)),
            's' | 'S' => OscType::String(reader.read_string()?),
            'b' => OscType::Blob(reader.read_blob()?),
            'h' => OscType::Long(i64::from_be_bytes(reader.read_array()?)),
            'd' => OscType::Double(f64::from_be_bytes(reader.read_array()?)),
            't' => OscType::Time(reader.read_time()?),
            'c' => {
                let offset = reader.pos;
                let raw = u32::from_be_bytes(reader.read_array()?);
                OscType::Char(char::from_u32(raw).ok_or(OscError::InvalidUtf8(offset))?)
            }
            'T' => OscType::Bool(true),
            'F' => OscType::Bool(false),
            'N' => OscType::Nil,
            'I' => OscType::Inf,
            other => return Err(OscError::UnsupportedTypeTag(other)),
        };
        args.push(arg);
    }

    Ok(OscMessage { addr, args })
}

/// Cursor over a frame that reports offsets relative to the outermost frame.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self::new_at(bytes, 0)
    }

    fn new_at(bytes: &'a [u8], base: usize) -> Self {
        Self {
            bytes,
            pos: 0,
            base,
        }
    }

    fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], OscError> {
        let available = self.bytes.len() - self.pos;
        if available < n {
            return Err(OscError::Truncated {
                offset: self.base + self.pos,
                needed: n,
                available,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], OscError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_i32(&mut self) -> Result<i32, OscError> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    fn read_time(&mut self) -> Result<OscTime, OscError> {
        let seconds = u32::from_be_bytes(self.read_array()?);
        let fractional = u32::from_be_bytes(self.read_array()?);
        Ok(OscTime::new(seconds, fractional))
    }

    /// Read a null-terminated string and skip its padding.
    ///
    /// Padding cut off by the end of the frame is tolerated.
    fn read_string(&mut self) -> Result<String, OscError> {
        let start = self.pos;
        let rest = self.remaining();
        let Some(nul) = rest.iter().position(|&b| b == 0) else {
            return Err(OscError::MissingTerminator(self.base + start));
        };
        let text = std::str::from_utf8(&rest[..nul])
            .map_err(|_| OscError::InvalidUtf8(self.base + start))?
            .to_string();
        let padded = (nul + 1).next_multiple_of(4);
        self.pos = (start + padded).min(self.bytes.len());
        Ok(text)
    }

    fn read_blob(&mut self) -> Result<Vec<u8>, OscError> {
        let offset = self.pos;
        let size = self.read_i32()?;
        let Ok(size) = usize::try_from(size) else {
            return Err(OscError::Truncated {
                offset: self.base + offset,
                needed: 0,
                available: self.bytes.len() - self.pos,
            });
        };
        let data = self.take(size)?.to_vec();
        let padded = size.next_multiple_of(4);
        self.pos = (self.pos + padded - size).min(self.bytes.len());
        Ok(data)
    }

    /// Accept trailing zero padding, reject anything else.
    fn finish(&self) -> Result<(), OscError> {
        let rest = self.remaining();
        if rest.iter().all(|&b| b == 0) {
            Ok(())
        } else {
            Err(OscError::TrailingBytes(rest.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(addr: &str, args: Vec<OscType>) -> OscPacket {
        OscPacket::Message(OscMessage::new(addr, args))
    }

    #[test]
    fn test_address_is_padded_to_four_bytes() {
        let bytes = encode(&msg("/abc", vec![]));
        // "/abc\0" -> 8 bytes, ",\0" -> 4 bytes
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[..8], b"/abc\0\0\0\0");
        assert_eq!(&bytes[8..], b",\0\0\0");
    }

    #[test]
    fn test_int_float_string_layout() {
        let bytes = encode(&msg(
            "/x",
            vec![OscType::Int(1), OscType::Float(0.5), "hi".into()],
        ));
        let expected: Vec<u8> = [
            &b"/x\0\0"[..],
            &b",ifs\0\0\0\0"[..],
            &1i32.to_be_bytes()[..],
            &0.5f32.to_be_bytes()[..],
            &b"hi\0\0"[..],
        ]
        .concat();
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_round_trip_all_types() {
        let packet = msg(
            "/rnbo/inst/0/params/gain",
            vec![
                OscType::Int(-7),
                OscType::Float(0.25),
                OscType::String("Factory".into()),
                OscType::Blob(vec![1, 2, 3]),
                OscType::Long(1 << 40),
                OscType::Double(3.5),
                OscType::Time(OscTime::new(10, 20)),
                OscType::Char('x'),
                OscType::Bool(true),
                OscType::Bool(false),
                OscType::Nil,
                OscType::Inf,
            ],
        );
        assert_eq!(decode(&encode(&packet)).unwrap(), packet);
    }

    #[test]
    fn test_nested_bundle_round_trip() {
        let inner = OscBundle::new(
            OscTime::new(1, 2),
            vec![OscMessage::new("/b", vec![OscType::Int(2)]).into()],
        );
        let packet = OscPacket::Bundle(OscBundle::new(
            OscTime::IMMEDIATELY,
            vec![
                OscMessage::new("/a", vec![OscType::String("x".into())]).into(),
                inner.into(),
            ],
        ));
        let bytes = encode(&packet);
        assert!(bytes.starts_with(BUNDLE_TAG));
        assert_eq!(decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_trailing_zero_padding_is_tolerated() {
        let mut bytes = encode(&msg("/a", vec![OscType::Int(3)]));
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(decode(&bytes).unwrap(), msg("/a", vec![OscType::Int(3)]));
    }

    #[test]
    fn test_trailing_garbage_is_rejected() {
        let mut bytes = encode(&msg("/a", vec![]));
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        assert_eq!(decode(&bytes), Err(OscError::TrailingBytes(4)));
    }

    #[test]
    fn test_truncated_argument_is_rejected() {
        let bytes = encode(&msg("/a", vec![OscType::Int(3)]));
        let err = decode(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, OscError::Truncated { needed: 4, available: 2, .. }));
    }

    #[test]
    fn test_unterminated_address_is_rejected() {
        assert_eq!(decode(b"/abc"), Err(OscError::MissingTerminator(0)));
    }

    #[test]
    fn test_address_without_slash_is_rejected() {
        assert!(matches!(decode(b"abc\0,\0\0\0"), Err(OscError::BadAddress(_))));
    }

    #[test]
    fn test_unknown_type_tag_is_rejected() {
        assert_eq!(
            decode(b"/a\0\0,z\0\0"),
            Err(OscError::UnsupportedTypeTag('z'))
        );
    }

    #[test]
    fn test_message_without_type_tags_decodes_empty() {
        assert_eq!(decode(b"/a\0\0").unwrap(), msg("/a", vec![]));
    }

    #[test]
    fn test_negative_bundle_element_size_is_rejected() {
        let mut bytes = BUNDLE_TAG.to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);
        bytes.extend_from_slice(&(-4i32).to_be_bytes());
        assert!(matches!(decode(&bytes), Err(OscError::BadBundle { .. })));
    }

    #[test]
    fn test_empty_frame_is_rejected() {
        assert_eq!(decode(&[]), Err(OscError::Empty));
    }
}
