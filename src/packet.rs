//! The packet module, containing the wire vocabulary: lengths, headers, frames,
//! the framer and the FEC group accumulator.
//! packet 模块，包含线路词汇：长度、包头、帧、组帧器和FEC组累加器。

pub mod ack;
pub mod fec;
pub mod frame;
pub mod framer;
pub mod header;


pub type PacketSequenceNumber = u64;
pub type ConnectionId = u64;
pub type StreamId = u32;
pub type StreamOffset = u64;
pub type ByteCount = u64;
pub type FecGroupNumber = u64;

/// The stream carrying the crypto handshake.
/// 承载加密握手的流。
pub const CRYPTO_STREAM_ID: StreamId = 1;

/// The protocol version tag, "Q023".
pub const QUIC_VERSION: u32 = u32::from_be_bytes(*b"Q023");

/// Size of the version field in a public header.
pub const QUIC_VERSION_SIZE: usize = 4;

/// Size of the explicit length field of a non-final stream frame.
pub const STREAM_PAYLOAD_LENGTH_SIZE: usize = 2;

/// The largest packet this library will ever build.
pub const MAX_PACKET_SIZE: usize = 1452;

/// The number of bytes used to encode a sequence number on the wire.
///
/// 在线路上编码序列号所用的字节数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SequenceNumberLength {
    One,
    Two,
    Four,
    Six,
}

impl SequenceNumberLength {
    pub fn bytes(self) -> usize {
        match self {
            SequenceNumberLength::One => 1,
            SequenceNumberLength::Two => 2,
            SequenceNumberLength::Four => 4,
            SequenceNumberLength::Six => 6,
        }
    }

    /// The smallest encoding able to represent `value`.
    /// 能够表示 `value` 的最小编码。
    pub fn min_for(value: u64) -> Self {
        if value < 1 << 8 {
            SequenceNumberLength::One
        } else if value < 1 << 16 {
            SequenceNumberLength::Two
        } else if value < 1 << 32 {
            SequenceNumberLength::Four
        } else {
            SequenceNumberLength::Six
        }
    }

    pub(crate) fn wire_code(self) -> u8 {
        match self {
            SequenceNumberLength::One => 0,
            SequenceNumberLength::Two => 1,
            SequenceNumberLength::Four => 2,
            SequenceNumberLength::Six => 3,
        }
    }

    pub(crate) fn from_wire_code(code: u8) -> Self {
        match code & 0x03 {
            0 => SequenceNumberLength::One,
            1 => SequenceNumberLength::Two,
            2 => SequenceNumberLength::Four,
            _ => SequenceNumberLength::Six,
        }
    }
}

/// The number of connection id bytes carried in a public header.
///
/// 公共包头中携带的连接ID字节数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionIdLength {
    Zero,
    One,
    Four,
    Eight,
}

impl ConnectionIdLength {
    pub fn bytes(self) -> usize {
        match self {
            ConnectionIdLength::Zero => 0,
            ConnectionIdLength::One => 1,
            ConnectionIdLength::Four => 4,
            ConnectionIdLength::Eight => 8,
        }
    }

    pub(crate) fn wire_code(self) -> u8 {
        match self {
            ConnectionIdLength::Zero => 0,
            ConnectionIdLength::One => 1,
            ConnectionIdLength::Four => 2,
            ConnectionIdLength::Eight => 3,
        }
    }

    pub(crate) fn from_wire_code(code: u8) -> Self {
        match code & 0x03 {
            0 => ConnectionIdLength::Zero,
            1 => ConnectionIdLength::One,
            2 => ConnectionIdLength::Four,
            _ => ConnectionIdLength::Eight,
        }
    }
}

/// Whether a packet belongs to an FEC group.
///
/// 包是否属于某个FEC组。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InFecGroup {
    NotInFecGroup,
    InFecGroup,
}

impl InFecGroup {
    pub fn is_in_group(self) -> bool {
        self == InFecGroup::InFecGroup
    }
}
