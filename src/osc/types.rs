//! In-memory OSC packet representation.

use chrono::{DateTime, TimeZone, Utc};

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch (1970-01-01).
const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

/// 2^32, the resolution of the fractional part of a time tag.
const FRACTION_SCALE: f64 = 4_294_967_296.0;

/// OSC time tag: 64-bit NTP timestamp split into seconds and a binary fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OscTime {
    /// Seconds since 1900-01-01 00:00:00 UTC.
    pub seconds: u32,
    /// Fractional second in units of 1/2^32 s.
    pub fractional: u32,
}

impl OscTime {
    /// The special "immediately" time tag (`0x00000000_00000001`).
    pub const IMMEDIATELY: Self = Self {
        seconds: 0,
        fractional: 1,
    };

    /// Build a time tag from its raw halves.
    #[must_use]
    pub fn new(seconds: u32, fractional: u32) -> Self {
        Self {
            seconds,
            fractional,
        }
    }

    /// Whether this is the "immediately" tag.
    #[must_use]
    pub fn is_immediate(self) -> bool {
        self == Self::IMMEDIATELY
    }

    /// Milliseconds since the Unix epoch, the `native` convenience representation.
    ///
    /// Tags before the Unix epoch come out negative.
    #[must_use]
    pub fn native(self) -> f64 {
        let secs = f64::from(self.seconds) - NTP_UNIX_OFFSET_SECS as f64;
        let frac = f64::from(self.fractional) / FRACTION_SCALE;
        (secs + frac) * 1000.0
    }

    /// Build a time tag from Unix-epoch milliseconds.
    ///
    /// Values outside the representable NTP era saturate.
    #[must_use]
    pub fn from_native(millis: f64) -> Self {
        let total = millis / 1000.0 + NTP_UNIX_OFFSET_SECS as f64;
        if total <= 0.0 {
            return Self::new(0, 0);
        }
        let seconds = total.trunc();
        if seconds >= f64::from(u32::MAX) {
            return Self::new(u32::MAX, u32::MAX);
        }
        let fractional = ((total - seconds) * FRACTION_SCALE) as u32;
        Self::new(seconds as u32, fractional)
    }

    /// Wall-clock time of this tag, if it falls after the Unix epoch.
    #[must_use]
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let secs = u64::from(self.seconds).checked_sub(NTP_UNIX_OFFSET_SECS)?;
        let nanos = ((f64::from(self.fractional) / FRACTION_SCALE) * 1e9) as u32;
        Utc.timestamp_opt(i64::try_from(secs).ok()?, nanos).single()
    }
}

impl From<DateTime<Utc>> for OscTime {
    fn from(time: DateTime<Utc>) -> Self {
        Self::from_native(time.timestamp_millis() as f64)
    }
}

/// A typed OSC argument.
///
/// The variant determines the type tag written on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum OscType {
    /// `i` — 32-bit big-endian two's complement integer.
    Int(i32),
    /// `f` — 32-bit big-endian IEEE 754 float.
    Float(f32),
    /// `s` — null-terminated, 4-byte padded ASCII string.
    String(String),
    /// `b` — size-prefixed, 4-byte padded byte blob.
    Blob(Vec<u8>),
    /// `h` — 64-bit big-endian integer.
    Long(i64),
    /// `d` — 64-bit big-endian IEEE 754 double.
    Double(f64),
    /// `t` — 64-bit time tag.
    Time(OscTime),
    /// `c` — ASCII character sent as 32 bits.
    Char(char),
    /// `T` / `F` — boolean, no payload.
    Bool(bool),
    /// `N` — nil, no payload.
    Nil,
    /// `I` — infinitum / impulse, no payload.
    Inf,
}

impl OscType {
    /// The type tag character for this argument.
    #[must_use]
    pub fn tag(&self) -> char {
        match self {
            Self::Int(_) => 'i',
            Self::Float(_) => 'f',
            Self::String(_) => 's',
            Self::Blob(_) => 'b',
            Self::Long(_) => 'h',
            Self::Double(_) => 'd',
            Self::Time(_) => 't',
            Self::Char(_) => 'c',
            Self::Bool(true) => 'T',
            Self::Bool(false) => 'F',
            Self::Nil => 'N',
            Self::Inf => 'I',
        }
    }

    /// Numeric view of the argument, if it carries a number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(f64::from(*v)),
            Self::Float(v) => Some(f64::from(*v)),
            Self::Long(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// String view of the argument.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view of the argument (`T`/`F`, or a non-zero number).
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(v) => Some(*v != 0),
            _ => None,
        }
    }
}

impl From<i32> for OscType {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for OscType {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for OscType {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for OscType {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for OscType {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for OscType {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// An OSC message: a `/`-rooted address and an ordered argument list.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    /// Address pattern, e.g. `/rnbo/inst/0/params/gain`.
    pub addr: String,
    /// Arguments in declared order.
    pub args: Vec<OscType>,
}

impl OscMessage {
    /// Build a message.
    pub fn new(addr: impl Into<String>, args: Vec<OscType>) -> Self {
        Self {
            addr: addr.into(),
            args,
        }
    }

    /// The type-tag string for this message, including the leading comma.
    #[must_use]
    pub fn type_tags(&self) -> String {
        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        tags.extend(self.args.iter().map(OscType::tag));
        tags
    }

    /// First argument, if any.
    #[must_use]
    pub fn first_arg(&self) -> Option<&OscType> {
        self.args.first()
    }

    /// All string arguments, skipping anything else.
    ///
    /// The runner pads empty list values with a placeholder number, so list
    /// consumers only look at the strings.
    #[must_use]
    pub fn string_args(&self) -> Vec<String> {
        self.args
            .iter()
            .filter_map(OscType::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A time-tagged group of packets.
#[derive(Debug, Clone, PartialEq)]
pub struct OscBundle {
    /// When the contents are meant to take effect.
    pub timetag: OscTime,
    /// Nested messages and bundles, in listed order.
    pub content: Vec<OscPacket>,
}

impl OscBundle {
    /// Build a bundle.
    #[must_use]
    pub fn new(timetag: OscTime, content: Vec<OscPacket>) -> Self {
        Self { timetag, content }
    }

    /// Flatten to messages in listed (depth-first) order.
    #[must_use]
    pub fn messages(&self) -> Vec<&OscMessage> {
        let mut out = Vec::new();
        collect_messages(&self.content, &mut out);
        out
    }
}

fn collect_messages<'a>(packets: &'a [OscPacket], out: &mut Vec<&'a OscMessage>) {
    for packet in packets {
        match packet {
            OscPacket::Message(msg) => out.push(msg),
            OscPacket::Bundle(bundle) => collect_messages(&bundle.content, out),
        }
    }
}

/// Either a message or a bundle.
#[derive(Debug, Clone, PartialEq)]
pub enum OscPacket {
    /// Single message.
    Message(OscMessage),
    /// Time-tagged group.
    Bundle(OscBundle),
}

impl From<OscMessage> for OscPacket {
    fn from(msg: OscMessage) -> Self {
        Self::Message(msg)
    }
}

impl From<OscBundle> for OscPacket {
    fn from(bundle: OscBundle) -> Self {
        Self::Bundle(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags_string() {
        let msg = OscMessage::new(
            "/a",
            vec![1.into(), 0.5f32.into(), "x".into(), true.into(), OscType::Nil],
        );
        assert_eq!(msg.type_tags(), ",ifsTN");
    }

    #[test]
    fn test_native_time_of_unix_epoch_is_zero() {
        let t = OscTime::new(NTP_UNIX_OFFSET_SECS as u32, 0);
        assert_eq!(t.native(), 0.0);
        assert_eq!(t.to_datetime().map(|d| d.timestamp()), Some(0));
    }

    #[test]
    fn test_native_round_trip_half_second() {
        let t = OscTime::from_native(1_500.0);
        assert_eq!(t.seconds, NTP_UNIX_OFFSET_SECS as u32 + 1);
        assert_eq!(t.fractional, 1 << 31);
        assert!((t.native() - 1_500.0).abs() < 1e-3);
    }

    #[test]
    fn test_string_args_skips_placeholders() {
        let msg = OscMessage::new("/x", vec![OscType::Int(1)]);
        assert!(msg.string_args().is_empty());

        let msg = OscMessage::new("/x", vec!["a:1".into(), "b:2".into()]);
        assert_eq!(msg.string_args(), vec!["a:1", "b:2"]);
    }

    #[test]
    fn test_bundle_messages_flatten_in_order() {
        let inner = OscBundle::new(
            OscTime::IMMEDIATELY,
            vec![OscMessage::new("/b", vec![]).into()],
        );
        let outer = OscBundle::new(
            OscTime::IMMEDIATELY,
            vec![
                OscMessage::new("/a", vec![]).into(),
                inner.into(),
                OscMessage::new("/c", vec![]).into(),
            ],
        );
        let addrs: Vec<&str> = outer.messages().iter().map(|m| m.addr.as_str()).collect();
        assert_eq!(addrs, vec!["/a", "/b", "/c"]);
    }
}
