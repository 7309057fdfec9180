//! 定义数据包的公共头与私有头。
//! Defines the public and private packet headers.

use super::{
    ConnectionId, ConnectionIdLength, FecGroupNumber, InFecGroup, PacketSequenceNumber,
    QUIC_VERSION_SIZE, SequenceNumberLength,
};
use crate::error::{Error, Result};
use bytes::{Buf, BufMut};

pub const PUBLIC_FLAGS_SIZE: usize = 1;
pub const PRIVATE_FLAGS_SIZE: usize = 1;
pub const FEC_GROUP_OFFSET_SIZE: usize = 1;

const PUBLIC_FLAG_VERSION: u8 = 0x01;
const PUBLIC_FLAG_RESET: u8 = 0x02;
const PUBLIC_FLAG_CONNECTION_ID_SHIFT: u8 = 2;
const PUBLIC_FLAG_SEQUENCE_NUMBER_SHIFT: u8 = 4;

const PRIVATE_FLAG_ENTROPY: u8 = 0x01;
const PRIVATE_FLAG_FEC_GROUP: u8 = 0x02;
const PRIVATE_FLAG_FEC: u8 = 0x04;
const PRIVATE_FLAGS_MAX: u8 = 0x07;

/// The unencrypted part of a packet header.
/// 包头中未加密的部分。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicHeader {
    /// The connection ID.
    /// 连接ID。
    pub connection_id: ConnectionId,
    /// How many bytes of the connection ID go on the wire.
    /// 连接ID在线路上占用的字节数。
    pub connection_id_length: ConnectionIdLength,
    pub reset_flag: bool,
    /// Whether the protocol version follows the connection ID.
    /// 协议版本是否跟在连接ID之后。
    pub version_flag: bool,
    /// How many bytes of the sequence number go on the wire.
    /// 序列号在线路上占用的字节数。
    pub sequence_number_length: SequenceNumberLength,
}

/// A full packet header.
/// 完整的包头。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub public_header: PublicHeader,
    /// The sequence number of this packet.
    /// 包序号。
    pub packet_sequence_number: PacketSequenceNumber,
    /// One bit of entropy, folded into the peer's ACK entropy hash.
    /// 一位熵，被折叠进对端ACK的熵哈希中。
    pub entropy_flag: bool,
    /// Set on redundancy packets.
    /// 冗余包上设置此标志。
    pub fec_flag: bool,
    pub is_in_fec_group: InFecGroup,
    /// The sequence number of the first packet of the FEC group, or zero.
    /// FEC组第一个包的序列号，或者为零。
    pub fec_group: FecGroupNumber,
}

/// Computes the serialized size of a packet header.
///
/// 计算包头序列化后的大小。
pub fn packet_header_size(
    connection_id_length: ConnectionIdLength,
    include_version: bool,
    sequence_number_length: SequenceNumberLength,
    is_in_fec_group: InFecGroup,
) -> usize {
    PUBLIC_FLAGS_SIZE
        + connection_id_length.bytes()
        + if include_version { QUIC_VERSION_SIZE } else { 0 }
        + sequence_number_length.bytes()
        + PRIVATE_FLAGS_SIZE
        + if is_in_fec_group.is_in_group() {
            FEC_GROUP_OFFSET_SIZE
        } else {
            0
        }
}

impl PublicHeader {
    /// Writes the public flags byte and the connection ID.
    /// 写入公共标志字节和连接ID。
    pub(crate) fn encode_flags_and_id<B: BufMut>(&self, buf: &mut B) {
        let mut public_flags = (self.connection_id_length.wire_code()
            << PUBLIC_FLAG_CONNECTION_ID_SHIFT)
            | (self.sequence_number_length.wire_code() << PUBLIC_FLAG_SEQUENCE_NUMBER_SHIFT);
        if self.version_flag {
            public_flags |= PUBLIC_FLAG_VERSION;
        }
        if self.reset_flag {
            public_flags |= PUBLIC_FLAG_RESET;
        }
        buf.put_u8(public_flags);
        let cid_len = self.connection_id_length.bytes();
        if cid_len > 0 {
            buf.put_uint(self.connection_id, cid_len);
        }
    }
}

impl PacketHeader {
    /// The number of bytes `encode` will write.
    pub fn encoded_size(&self) -> usize {
        packet_header_size(
            self.public_header.connection_id_length,
            self.public_header.version_flag,
            self.public_header.sequence_number_length,
            self.is_in_fec_group,
        )
    }

    /// 将包头编码到缓冲区。
    /// Encodes the header into a buffer.
    pub fn encode<B: BufMut>(&self, version: u32, buf: &mut B) {
        let public = &self.public_header;
        public.encode_flags_and_id(buf);
        if public.version_flag {
            buf.put_u32(version);
        }
        buf.put_uint(
            self.packet_sequence_number,
            public.sequence_number_length.bytes(),
        );

        let mut private_flags = 0;
        if self.entropy_flag {
            private_flags |= PRIVATE_FLAG_ENTROPY;
        }
        if self.is_in_fec_group.is_in_group() {
            private_flags |= PRIVATE_FLAG_FEC_GROUP;
        }
        if self.fec_flag {
            private_flags |= PRIVATE_FLAG_FEC;
        }
        buf.put_u8(private_flags);
        if self.is_in_fec_group.is_in_group() {
            debug_assert!(self.fec_group <= self.packet_sequence_number);
            let offset = self.packet_sequence_number - self.fec_group;
            debug_assert!(offset <= u8::MAX as u64, "FEC group offset overflow");
            buf.put_u8(offset as u8);
        }
    }
}

/// The public part of a header as read off the wire, before the sequence
/// number has been expanded.
///
/// 从线路上读取的包头公共部分，此时序列号尚未展开。
#[derive(Debug, Clone)]
pub(crate) struct WirePublicHeader {
    pub header: PublicHeader,
    pub version: Option<u32>,
}

impl WirePublicHeader {
    /// Decodes the flags, connection ID and optional version.
    pub(crate) fn decode(cursor: &mut &[u8]) -> Result<Self> {
        if cursor.remaining() < PUBLIC_FLAGS_SIZE {
            return Err(Error::Truncated);
        }
        let flags = cursor.get_u8();
        if flags & 0xC0 != 0 {
            return Err(Error::InvalidPacket);
        }
        let connection_id_length =
            ConnectionIdLength::from_wire_code(flags >> PUBLIC_FLAG_CONNECTION_ID_SHIFT);
        let sequence_number_length =
            SequenceNumberLength::from_wire_code(flags >> PUBLIC_FLAG_SEQUENCE_NUMBER_SHIFT);
        let version_flag = flags & PUBLIC_FLAG_VERSION != 0;

        let cid_len = connection_id_length.bytes();
        if cursor.remaining() < cid_len {
            return Err(Error::Truncated);
        }
        let connection_id = if cid_len > 0 {
            cursor.get_uint(cid_len)
        } else {
            0
        };
        let version = if version_flag {
            if cursor.remaining() < QUIC_VERSION_SIZE {
                return Err(Error::Truncated);
            }
            Some(cursor.get_u32())
        } else {
            None
        };

        Ok(Self {
            header: PublicHeader {
                connection_id,
                connection_id_length,
                reset_flag: flags & PUBLIC_FLAG_RESET != 0,
                version_flag,
                sequence_number_length,
            },
            version,
        })
    }
}

/// The private part of a header as read off the wire.
/// 从线路上读取的包头私有部分。
#[derive(Debug, Clone, Copy)]
pub(crate) struct WirePrivateHeader {
    pub entropy_flag: bool,
    pub fec_flag: bool,
    pub fec_group_offset: Option<u8>,
}

impl WirePrivateHeader {
    pub(crate) fn decode(cursor: &mut &[u8]) -> Result<Self> {
        if cursor.remaining() < PRIVATE_FLAGS_SIZE {
            return Err(Error::Truncated);
        }
        let flags = cursor.get_u8();
        if flags > PRIVATE_FLAGS_MAX {
            return Err(Error::InvalidPacket);
        }
        let fec_group_offset = if flags & PRIVATE_FLAG_FEC_GROUP != 0 {
            if cursor.remaining() < FEC_GROUP_OFFSET_SIZE {
                return Err(Error::Truncated);
            }
            Some(cursor.get_u8())
        } else {
            None
        };
        Ok(Self {
            entropy_flag: flags & PRIVATE_FLAG_ENTROPY != 0,
            fec_flag: flags & PRIVATE_FLAG_FEC != 0,
            fec_group_offset,
        })
    }
}
