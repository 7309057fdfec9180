//! 组帧器：计算帧的大小，并在包头与帧和线路字节之间相互转换。
//! The framer: sizes frames and converts between headers plus frames and
//! wire bytes.

use super::ack::AckFrame;
use super::fec::FecData;
use super::frame::{self, Frame, FrameContext};
use super::header::{PacketHeader, PublicHeader, WirePrivateHeader, WirePublicHeader};
use super::{
    ConnectionId, ConnectionIdLength, InFecGroup, PacketSequenceNumber, QUIC_VERSION_SIZE,
    SequenceNumberLength, StreamId, StreamOffset,
};
use crate::config::Perspective;
use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

/// A packet as read back off the wire.
/// 从线路上读回的包。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedPacket {
    /// A regular packet carrying frames.
    /// 携带帧的常规包。
    Data {
        header: PacketHeader,
        frames: Vec<Frame>,
    },
    /// A redundancy packet for an FEC group.
    /// FEC组的冗余包。
    Fec { header: PacketHeader, fec: FecData },
    /// The server's list of supported versions.
    /// 服务器支持的版本列表。
    VersionNegotiation {
        connection_id: ConnectionId,
        versions: Vec<u32>,
    },
}

/// Sizes, builds and parses packets for one protocol version.
///
/// The framer remembers the last sequence number it decoded so that
/// truncated wire sequence numbers can be expanded.
///
/// 为某个协议版本计算大小、构建并解析包。
/// 组帧器会记住它解码的最后一个序列号，以便展开被截短的线路序列号。
#[derive(Debug)]
pub struct Framer {
    version: u32,
    perspective: Perspective,
    encryption_overhead: usize,
    last_sequence_number: PacketSequenceNumber,
}

impl Framer {
    pub fn new(version: u32, perspective: Perspective, encryption_overhead: usize) -> Self {
        Self {
            version,
            perspective,
            encryption_overhead,
            last_sequence_number: 0,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_server(&self) -> bool {
        self.perspective == Perspective::Server
    }

    /// The largest plaintext that still fits `max_packet_length` once encrypted.
    /// 加密后仍能放入 `max_packet_length` 的最大明文长度。
    pub fn max_plaintext_size(&self, max_packet_length: usize) -> usize {
        max_packet_length.saturating_sub(self.encryption_overhead)
    }

    /// The size of a stream frame without its data.
    /// 不含数据的流帧大小。
    pub fn min_stream_frame_size(
        &self,
        stream_id: StreamId,
        offset: StreamOffset,
        last_frame_in_packet: bool,
        is_in_fec_group: InFecGroup,
    ) -> usize {
        frame::min_stream_frame_size(stream_id, offset, last_frame_in_packet, is_in_fec_group)
    }

    /// Returns the number of bytes `frame` will take if it is added to a packet
    /// with `free_bytes` left, or zero if it does not fit.
    ///
    /// Padding takes every free byte. An ACK that opens a packet may be truncated
    /// to the free space as long as the fixed part of the frame fits.
    ///
    /// 返回将 `frame` 加入剩余 `free_bytes` 字节的包时所占的字节数，放不下时返回零。
    /// 填充帧占用所有剩余字节。作为包中第一个帧的ACK只要固定部分放得下，就可以被截断到剩余空间。
    pub fn serialized_frame_length(
        &self,
        frame: &Frame,
        free_bytes: usize,
        first_frame_in_packet: bool,
        last_frame_in_packet: bool,
        is_in_fec_group: InFecGroup,
        sequence_number_length: SequenceNumberLength,
    ) -> usize {
        if let Frame::Padding = frame {
            return free_bytes;
        }
        let ctx = FrameContext {
            last_frame_in_packet,
            is_in_fec_group,
            sequence_number_length,
            packet_sequence_number: 0,
        };
        let frame_len = frame.encoded_len(&ctx);
        if frame_len <= free_bytes {
            return frame_len;
        }
        if !first_frame_in_packet {
            return 0;
        }
        let can_truncate =
            matches!(frame, Frame::Ack(_)) && free_bytes >= AckFrame::min_truncated_size();
        if can_truncate {
            trace!(frame_len, free_bytes, "truncating ACK frame to fit");
            return free_bytes;
        }
        0
    }

    /// Writes `header` followed by `frames` into a packet of at most `packet_size` bytes.
    ///
    /// 将 `header` 及其后的 `frames` 写入最多 `packet_size` 字节的包中。
    pub fn build_data_packet(
        &self,
        header: &PacketHeader,
        frames: &[Frame],
        packet_size: usize,
    ) -> Result<Bytes> {
        let header_len = header.encoded_size();
        if header_len > packet_size {
            return Err(Error::PacketTooLarge {
                size: header_len,
                limit: packet_size,
            });
        }
        let mut buf = BytesMut::with_capacity(packet_size);
        header.encode(self.version, &mut buf);

        for (i, frame) in frames.iter().enumerate() {
            let ctx = FrameContext {
                last_frame_in_packet: i + 1 == frames.len(),
                is_in_fec_group: header.is_in_fec_group,
                sequence_number_length: header.public_header.sequence_number_length,
                packet_sequence_number: header.packet_sequence_number,
            };
            frame.encode(&ctx, &mut buf, packet_size)?;
        }
        trace!(
            sequence_number = header.packet_sequence_number,
            frames = frames.len(),
            len = buf.len(),
            "built data packet"
        );
        Ok(buf.freeze())
    }

    /// Writes an FEC packet: the header followed by the group's parity.
    /// 写一个FEC包：包头后面跟着组的校验数据。
    pub fn build_fec_packet(&self, header: &PacketHeader, fec: &FecData) -> Result<Bytes> {
        debug_assert!(header.fec_flag);
        let mut buf = BytesMut::with_capacity(header.encoded_size() + fec.redundancy.len());
        header.encode(self.version, &mut buf);
        buf.put_slice(&fec.redundancy);
        Ok(buf.freeze())
    }

    /// Writes a version negotiation packet listing `versions`.
    /// 写一个列出 `versions` 的版本协商包。
    pub fn build_version_negotiation_packet(
        &self,
        connection_id: ConnectionId,
        versions: &[u32],
    ) -> Result<Bytes> {
        if !self.is_server() {
            return Err(Error::NotServer);
        }
        let header = PublicHeader {
            connection_id,
            connection_id_length: ConnectionIdLength::Eight,
            reset_flag: false,
            version_flag: true,
            sequence_number_length: SequenceNumberLength::One,
        };
        let mut buf = BytesMut::with_capacity(
            1 + header.connection_id_length.bytes() + versions.len() * QUIC_VERSION_SIZE,
        );
        header.encode_flags_and_id(&mut buf);
        for &version in versions {
            buf.put_u32(version);
        }
        Ok(buf.freeze())
    }

    /// Parses a packet built by one of the `build_*` methods.
    ///
    /// 解析由某个 `build_*` 方法构建的包。
    pub fn decode_packet(&mut self, data: &[u8]) -> Result<DecodedPacket> {
        let mut cursor = data;
        let public = WirePublicHeader::decode(&mut cursor)?;

        if public.header.version_flag && self.perspective == Perspective::Client {
            // Servers only set the version flag on version negotiation packets.
            if cursor.remaining() % QUIC_VERSION_SIZE != 0 {
                return Err(Error::InvalidPacket);
            }
            let mut versions: Vec<u32> = public.version.into_iter().collect();
            while cursor.has_remaining() {
                versions.push(cursor.get_u32());
            }
            return Ok(DecodedPacket::VersionNegotiation {
                connection_id: public.header.connection_id,
                versions,
            });
        }

        let seq_len = public.header.sequence_number_length;
        if cursor.remaining() < seq_len.bytes() {
            return Err(Error::Truncated);
        }
        let wire_sequence_number = cursor.get_uint(seq_len.bytes());
        let packet_sequence_number =
            self.sequence_number_from_wire(seq_len, wire_sequence_number);
        let private = WirePrivateHeader::decode(&mut cursor)?;
        let fec_group = match private.fec_group_offset {
            Some(offset) => packet_sequence_number
                .checked_sub(offset as u64)
                .ok_or(Error::InvalidPacket)?,
            None => 0,
        };
        let header = PacketHeader {
            public_header: public.header,
            packet_sequence_number,
            entropy_flag: private.entropy_flag,
            fec_flag: private.fec_flag,
            is_in_fec_group: if private.fec_group_offset.is_some() {
                InFecGroup::InFecGroup
            } else {
                InFecGroup::NotInFecGroup
            },
            fec_group,
        };

        let decoded = if header.fec_flag {
            let fec = FecData {
                fec_group,
                redundancy: Bytes::copy_from_slice(cursor),
            };
            DecodedPacket::Fec { header, fec }
        } else {
            let ctx = FrameContext {
                last_frame_in_packet: false,
                is_in_fec_group: header.is_in_fec_group,
                sequence_number_length: seq_len,
                packet_sequence_number,
            };
            let mut frames = Vec::new();
            while cursor.has_remaining() {
                frames.push(Frame::decode(&mut cursor, &ctx)?);
            }
            if frames.is_empty() {
                return Err(Error::InvalidPacket);
            }
            DecodedPacket::Data { header, frames }
        };
        self.last_sequence_number = packet_sequence_number;
        Ok(decoded)
    }

    /// Expands a truncated sequence number to the full value closest to the
    /// packet after the last one decoded.
    ///
    /// 将截短的序列号展开为最接近上一个已解码包之后那个包的完整值。
    fn sequence_number_from_wire(
        &self,
        length: SequenceNumberLength,
        wire: PacketSequenceNumber,
    ) -> PacketSequenceNumber {
        let epoch_delta: u64 = 1 << (8 * length.bytes());
        let next = self.last_sequence_number.wrapping_add(1);
        let epoch = self.last_sequence_number & !(epoch_delta - 1);
        let candidates = [
            epoch.wrapping_add(wire),
            epoch.wrapping_sub(epoch_delta).wrapping_add(wire),
            epoch.wrapping_add(epoch_delta).wrapping_add(wire),
        ];
        candidates
            .into_iter()
            .min_by_key(|candidate| candidate.abs_diff(next))
            .unwrap_or(wire)
    }
}

/// The entropy contributed by a packet to the receiver's running hash.
/// 一个包对接收方累积哈希贡献的熵。
pub fn packet_entropy_hash(header: &PacketHeader) -> u8 {
    (header.entropy_flag as u8) << (header.packet_sequence_number % 8)
}
