//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use thiserror::Error;

/// The primary error type for the packet framing library.
/// 包组帧库的主要错误类型。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A packet was serialized while no frames were queued.
    /// 在没有排队帧的情况下序列化了一个包。
    #[error("attempt to serialize empty packet")]
    EmptyPacket,

    /// FEC protection was requested but no FEC group size is configured.
    /// 请求了FEC保护，但没有配置FEC组大小。
    #[error("cannot start FEC protection when FEC is not enabled")]
    FecNotEnabled,

    /// FEC protection can only be switched on at a packet boundary.
    /// FEC保护只能在包边界开启。
    #[error("cannot start FEC protection with pending frames")]
    PendingFrames,

    /// FEC protection cannot be switched off while a group is still open.
    /// 当FEC组仍处于打开状态时，不能关闭FEC保护。
    #[error("cannot stop FEC protection with open FEC group")]
    FecGroupOpen,

    /// An FEC packet was requested without an open group holding packets.
    /// 在没有包含数据包的打开FEC组时请求了FEC包。
    #[error("no open FEC group or zero packets in group")]
    NoFecGroup,

    /// A frame handed to a whole-packet serializer did not fit.
    /// 传给整包序列化器的帧放不下。
    #[error("frame does not fit into the packet")]
    FrameDoesNotFit,

    /// The framer ran out of room while writing a packet.
    /// 组帧器在写包时空间不足。
    #[error("serialized packet of {size} bytes exceeds the limit of {limit} bytes")]
    PacketTooLarge { size: usize, limit: usize },

    /// A received packet was invalid and could not be decoded.
    /// 接收到的包无效，无法解码。
    #[error("invalid packet received")]
    InvalidPacket,

    /// A frame carried a type byte this framer does not understand.
    /// 帧携带了组帧器无法识别的类型字节。
    #[error("unknown frame type {0:#04x}")]
    UnknownFrameType(u8),

    /// The packet ended in the middle of a field.
    /// 包在字段中间结束。
    #[error("packet truncated")]
    Truncated,

    /// Only servers build version negotiation packets.
    /// 只有服务器构建版本协商包。
    #[error("version negotiation packets are only built by servers")]
    NotServer,
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        match err {
            Error::InvalidPacket | Error::UnknownFrameType(_) | Error::Truncated => {
                std::io::Error::new(ErrorKind::InvalidData, err)
            }
            Error::PacketTooLarge { .. } | Error::FrameDoesNotFit => {
                std::io::Error::new(ErrorKind::InvalidInput, err)
            }
            other => std::io::Error::other(other),
        }
    }
}
