//! Wire format of the application request/reply exchange.
//!
//! Both directions are packed little-endian. The request is a lone 2-byte
//! command; the reply is 18 bytes: a 2-byte code, the 8-byte request count,
//! and the tail latency in microseconds as an IEEE-754 double.

/// Size of an encoded request.
pub const REQUEST_BYTES: usize = 2;

/// Size of an encoded reply.
pub const REPLY_BYTES: usize = 18;

/// Commands a collector may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    /// Zero the application's window statistics.
    Reset = 0x00,
    /// Report request count and tail latency since the last reset.
    Perf = 0x01,
}

impl Command {
    pub fn encode(self) -> [u8; REQUEST_BYTES] {
        (self as u16).to_le_bytes()
    }
}

/// Reply status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    Success,
    Error,
}

impl ReplyCode {
    fn from_u16(code: u16) -> Self {
        match code {
            0x00 => ReplyCode::Success,
            _ => ReplyCode::Error,
        }
    }

    fn to_u16(self) -> u16 {
        match self {
            ReplyCode::Success => 0x00,
            ReplyCode::Error => 0x01,
        }
    }
}

/// A decoded application reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppReply {
    pub code: ReplyCode,
    pub num_requests: u64,
    pub tail_latency_us: f64,
}

impl AppReply {
    pub fn decode(buf: &[u8; REPLY_BYTES]) -> Self {
        Self {
            code: ReplyCode::from_u16(u16::from_le_bytes(buf[0..2].try_into().unwrap())),
            num_requests: u64::from_le_bytes(buf[2..10].try_into().unwrap()),
            tail_latency_us: f64::from_le_bytes(buf[10..18].try_into().unwrap()),
        }
    }

    pub fn encode(&self) -> [u8; REPLY_BYTES] {
        let mut buf = [0u8; REPLY_BYTES];
        buf[0..2].copy_from_slice(&self.code.to_u16().to_le_bytes());
        buf[2..10].copy_from_slice(&self.num_requests.to_le_bytes());
        buf[10..18].copy_from_slice(&self.tail_latency_us.to_le_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_bytes_are_little_endian() {
        assert_eq!(Command::Reset.encode(), [0x00, 0x00]);
        assert_eq!(Command::Perf.encode(), [0x01, 0x00]);
    }

    #[test]
    fn reply_layout_is_fixed() {
        let reply = AppReply {
            code: ReplyCode::Success,
            num_requests: 0x0102030405060708,
            tail_latency_us: 1.0,
        };
        let buf = reply.encode();

        assert_eq!(buf.len(), REPLY_BYTES);
        assert_eq!(&buf[0..2], &[0x00, 0x00]);
        // Request count, least significant byte first.
        assert_eq!(&buf[2..10], &[8, 7, 6, 5, 4, 3, 2, 1]);
        // 1.0f64 in IEEE-754 little-endian.
        assert_eq!(&buf[10..18], &[0, 0, 0, 0, 0, 0, 0xF0, 0x3F]);
    }

    #[test]
    fn reply_roundtrip() {
        let reply = AppReply {
            code: ReplyCode::Error,
            num_requests: 42,
            tail_latency_us: 999.25,
        };
        assert_eq!(AppReply::decode(&reply.encode()), reply);
    }

    #[test]
    fn unknown_code_decodes_as_error() {
        let mut buf = [0u8; REPLY_BYTES];
        buf[0] = 0x7F;
        assert_eq!(AppReply::decode(&buf).code, ReplyCode::Error);
    }
}
