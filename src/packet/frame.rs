//! 定义了可以打包进数据包的所有协议帧。
//! Defines every protocol frame that can be packed into a packet.

use super::ack::{ACK_FRAME_TYPE, AckFrame};
use super::{
    ByteCount, InFecGroup, PacketSequenceNumber, STREAM_PAYLOAD_LENGTH_SIZE, SequenceNumberLength,
    StreamId, StreamOffset,
};
use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const PADDING_FRAME_TYPE: u8 = 0x00;
const RST_STREAM_FRAME_TYPE: u8 = 0x01;
const CONNECTION_CLOSE_FRAME_TYPE: u8 = 0x02;
const GOAWAY_FRAME_TYPE: u8 = 0x03;
const WINDOW_UPDATE_FRAME_TYPE: u8 = 0x04;
const BLOCKED_FRAME_TYPE: u8 = 0x05;
const STOP_WAITING_FRAME_TYPE: u8 = 0x06;
const PING_FRAME_TYPE: u8 = 0x07;
const CONGESTION_FEEDBACK_FRAME_TYPE: u8 = 0x20;

// Stream frame type byte: 1FDOOOSS
const STREAM_FRAME_TYPE: u8 = 0x80;
const STREAM_FIN_FLAG: u8 = 0x40;
const STREAM_DATA_LENGTH_FLAG: u8 = 0x20;
const STREAM_OFFSET_SHIFT: u8 = 2;
const STREAM_OFFSET_MASK: u8 = 0x07;
const STREAM_ID_MASK: u8 = 0x03;

const FRAME_TYPE_SIZE: usize = 1;
const ERROR_CODE_SIZE: usize = 4;
const STREAM_ID_SIZE: usize = 4;
const BYTE_OFFSET_SIZE: usize = 8;
const REASON_LENGTH_SIZE: usize = 2;
const ENTROPY_HASH_SIZE: usize = 1;

const CONGESTION_FEEDBACK_TCP: u8 = 0;
const RECEIVE_WINDOW_SHIFT: u32 = 4;

/// The discriminant of a [`Frame`].
/// [`Frame`] 的类型标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Padding,
    Stream,
    Ack,
    CongestionFeedback,
    RstStream,
    ConnectionClose,
    GoAway,
    WindowUpdate,
    Blocked,
    StopWaiting,
    Ping,
}

/// Application data for one stream.
/// 单个流的应用数据。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub stream_id: StreamId,
    pub fin: bool,
    pub offset: StreamOffset,
    pub data: Bytes,
}

/// TCP-style feedback: the receiver's window.
/// TCP风格的反馈：接收方的窗口。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CongestionFeedbackFrame {
    /// Carried in units of 16 bytes.
    /// 以16字节为单位携带。
    pub receive_window: ByteCount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RstStreamFrame {
    pub stream_id: StreamId,
    pub byte_offset: StreamOffset,
    pub error_code: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionCloseFrame {
    pub error_code: u32,
    pub error_details: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoAwayFrame {
    pub error_code: u32,
    pub last_good_stream_id: StreamId,
    pub reason_phrase: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowUpdateFrame {
    pub stream_id: StreamId,
    pub byte_offset: StreamOffset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedFrame {
    pub stream_id: StreamId,
}

/// Tells the peer to stop waiting for packets below `least_unacked`.
/// 告诉对端不要再等待低于 `least_unacked` 的包。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopWaitingFrame {
    pub entropy_hash: u8,
    pub least_unacked: PacketSequenceNumber,
}

/// A protocol frame. Frames are written into a packet in queue order.
/// 一个协议帧。帧按排队顺序写入包中。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Fills the rest of the packet with zeros.
    /// 用零填满包的剩余部分。
    Padding,
    Stream(StreamFrame),
    Ack(AckFrame),
    CongestionFeedback(CongestionFeedbackFrame),
    RstStream(RstStreamFrame),
    ConnectionClose(ConnectionCloseFrame),
    GoAway(GoAwayFrame),
    WindowUpdate(WindowUpdateFrame),
    Blocked(BlockedFrame),
    StopWaiting(StopWaitingFrame),
    Ping,
}

/// What the framer knows about the slot a frame is written into.
/// 组帧器关于帧写入位置的已知信息。
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameContext {
    pub last_frame_in_packet: bool,
    pub is_in_fec_group: InFecGroup,
    pub sequence_number_length: SequenceNumberLength,
    pub packet_sequence_number: PacketSequenceNumber,
}

/// The number of bytes a stream ID is written with.
/// 流ID写入时使用的字节数。
pub(crate) fn stream_id_size(stream_id: StreamId) -> usize {
    match stream_id {
        0..=0xff => 1,
        0x100..=0xffff => 2,
        0x1_0000..=0xff_ffff => 3,
        _ => 4,
    }
}

/// The number of bytes a stream offset is written with: none for zero,
/// otherwise between two and eight.
///
/// 流偏移量写入时使用的字节数：为零时不写，否则为二到八字节。
pub(crate) fn stream_offset_size(offset: StreamOffset) -> usize {
    if offset == 0 {
        return 0;
    }
    let significant_bytes = (64 - offset.leading_zeros() as usize).div_ceil(8);
    significant_bytes.max(2)
}

fn stream_frame_has_length(last_frame_in_packet: bool, is_in_fec_group: InFecGroup) -> bool {
    // Frames in an FEC group always carry their length.
    !last_frame_in_packet || is_in_fec_group.is_in_group()
}

/// The size of a stream frame excluding its data.
/// 不包括数据的流帧大小。
pub fn min_stream_frame_size(
    stream_id: StreamId,
    offset: StreamOffset,
    last_frame_in_packet: bool,
    is_in_fec_group: InFecGroup,
) -> usize {
    FRAME_TYPE_SIZE
        + stream_id_size(stream_id)
        + stream_offset_size(offset)
        + if stream_frame_has_length(last_frame_in_packet, is_in_fec_group) {
            STREAM_PAYLOAD_LENGTH_SIZE
        } else {
            0
        }
}

fn put_reason<B: BufMut>(buf: &mut B, reason: &str) {
    let len = reason.len().min(u16::MAX as usize);
    buf.put_u16(len as u16);
    buf.put_slice(&reason.as_bytes()[..len]);
}

fn get_reason(cursor: &mut &[u8]) -> Result<String> {
    if cursor.remaining() < REASON_LENGTH_SIZE {
        return Err(Error::Truncated);
    }
    let len = cursor.get_u16() as usize;
    if cursor.remaining() < len {
        return Err(Error::Truncated);
    }
    let reason = String::from_utf8(cursor[..len].to_vec()).map_err(|_| Error::InvalidPacket)?;
    cursor.advance(len);
    Ok(reason)
}

fn ensure(cursor: &&[u8], needed: usize) -> Result<()> {
    if cursor.remaining() < needed {
        Err(Error::Truncated)
    } else {
        Ok(())
    }
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Padding => FrameType::Padding,
            Frame::Stream(_) => FrameType::Stream,
            Frame::Ack(_) => FrameType::Ack,
            Frame::CongestionFeedback(_) => FrameType::CongestionFeedback,
            Frame::RstStream(_) => FrameType::RstStream,
            Frame::ConnectionClose(_) => FrameType::ConnectionClose,
            Frame::GoAway(_) => FrameType::GoAway,
            Frame::WindowUpdate(_) => FrameType::WindowUpdate,
            Frame::Blocked(_) => FrameType::Blocked,
            Frame::StopWaiting(_) => FrameType::StopWaiting,
            Frame::Ping => FrameType::Ping,
        }
    }

    /// Whether a lost packet carrying this frame must have the frame resent.
    /// 携带此帧的包丢失时是否必须重发此帧。
    pub fn is_retransmittable(&self) -> bool {
        !matches!(
            self,
            Frame::Ack(_) | Frame::CongestionFeedback(_) | Frame::Padding | Frame::StopWaiting(_)
        )
    }

    /// Calculates the encoded size of the frame in the given slot. Padding has
    /// no size of its own; it takes whatever is left.
    ///
    /// 计算帧在给定位置编码后的大小。填充帧本身没有大小，它占用剩余的全部空间。
    pub(crate) fn encoded_len(&self, ctx: &FrameContext) -> usize {
        match self {
            Frame::Padding => 0,
            Frame::Stream(frame) => {
                min_stream_frame_size(
                    frame.stream_id,
                    frame.offset,
                    ctx.last_frame_in_packet,
                    ctx.is_in_fec_group,
                ) + frame.data.len()
            }
            Frame::Ack(frame) => frame.encoded_len(),
            Frame::CongestionFeedback(_) => FRAME_TYPE_SIZE + 1 + 2,
            Frame::RstStream(_) => {
                FRAME_TYPE_SIZE + STREAM_ID_SIZE + BYTE_OFFSET_SIZE + ERROR_CODE_SIZE
            }
            Frame::ConnectionClose(frame) => {
                FRAME_TYPE_SIZE
                    + ERROR_CODE_SIZE
                    + REASON_LENGTH_SIZE
                    + frame.error_details.len().min(u16::MAX as usize)
            }
            Frame::GoAway(frame) => {
                FRAME_TYPE_SIZE
                    + ERROR_CODE_SIZE
                    + STREAM_ID_SIZE
                    + REASON_LENGTH_SIZE
                    + frame.reason_phrase.len().min(u16::MAX as usize)
            }
            Frame::WindowUpdate(_) => FRAME_TYPE_SIZE + STREAM_ID_SIZE + BYTE_OFFSET_SIZE,
            Frame::Blocked(_) => FRAME_TYPE_SIZE + STREAM_ID_SIZE,
            Frame::StopWaiting(_) => {
                FRAME_TYPE_SIZE + ENTROPY_HASH_SIZE + ctx.sequence_number_length.bytes()
            }
            Frame::Ping => FRAME_TYPE_SIZE,
        }
    }

    /// Encodes the frame into `buf`, never letting the buffer grow past `limit`.
    ///
    /// 将帧编码到 `buf`，缓冲区长度永远不会超过 `limit`。
    pub(crate) fn encode(&self, ctx: &FrameContext, buf: &mut BytesMut, limit: usize) -> Result<()> {
        let budget = limit.saturating_sub(buf.len());
        if let Frame::Ack(frame) = self {
            frame.encode(buf, budget)?;
            return Ok(());
        }
        if let Frame::Padding = self {
            buf.put_bytes(0, budget);
            return Ok(());
        }
        let size = self.encoded_len(ctx);
        if size > budget {
            return Err(Error::PacketTooLarge {
                size: buf.len() + size,
                limit,
            });
        }

        match self {
            Frame::Stream(frame) => {
                let has_length =
                    stream_frame_has_length(ctx.last_frame_in_packet, ctx.is_in_fec_group);
                let id_len = stream_id_size(frame.stream_id);
                let offset_len = stream_offset_size(frame.offset);
                let offset_code = if offset_len == 0 { 0 } else { offset_len as u8 - 1 };
                let mut type_byte = STREAM_FRAME_TYPE
                    | (offset_code << STREAM_OFFSET_SHIFT)
                    | (id_len as u8 - 1);
                if frame.fin {
                    type_byte |= STREAM_FIN_FLAG;
                }
                if has_length {
                    type_byte |= STREAM_DATA_LENGTH_FLAG;
                }
                buf.put_u8(type_byte);
                buf.put_uint(frame.stream_id as u64, id_len);
                if offset_len > 0 {
                    buf.put_uint(frame.offset, offset_len);
                }
                if has_length {
                    buf.put_u16(frame.data.len() as u16);
                }
                buf.put_slice(&frame.data);
            }
            Frame::CongestionFeedback(frame) => {
                buf.put_u8(CONGESTION_FEEDBACK_FRAME_TYPE);
                buf.put_u8(CONGESTION_FEEDBACK_TCP);
                let window = (frame.receive_window >> RECEIVE_WINDOW_SHIFT).min(u16::MAX as u64);
                buf.put_u16(window as u16);
            }
            Frame::RstStream(frame) => {
                buf.put_u8(RST_STREAM_FRAME_TYPE);
                buf.put_u32(frame.stream_id);
                buf.put_u64(frame.byte_offset);
                buf.put_u32(frame.error_code);
            }
            Frame::ConnectionClose(frame) => {
                buf.put_u8(CONNECTION_CLOSE_FRAME_TYPE);
                buf.put_u32(frame.error_code);
                put_reason(buf, &frame.error_details);
            }
            Frame::GoAway(frame) => {
                buf.put_u8(GOAWAY_FRAME_TYPE);
                buf.put_u32(frame.error_code);
                buf.put_u32(frame.last_good_stream_id);
                put_reason(buf, &frame.reason_phrase);
            }
            Frame::WindowUpdate(frame) => {
                buf.put_u8(WINDOW_UPDATE_FRAME_TYPE);
                buf.put_u32(frame.stream_id);
                buf.put_u64(frame.byte_offset);
            }
            Frame::Blocked(frame) => {
                buf.put_u8(BLOCKED_FRAME_TYPE);
                buf.put_u32(frame.stream_id);
            }
            Frame::StopWaiting(frame) => {
                debug_assert!(frame.least_unacked <= ctx.packet_sequence_number);
                buf.put_u8(STOP_WAITING_FRAME_TYPE);
                buf.put_u8(frame.entropy_hash);
                buf.put_uint(
                    ctx.packet_sequence_number - frame.least_unacked,
                    ctx.sequence_number_length.bytes(),
                );
            }
            Frame::Ping => buf.put_u8(PING_FRAME_TYPE),
            // Written above.
            Frame::Padding | Frame::Ack(_) => {}
        }
        Ok(())
    }

    /// Decodes a single frame from the front of a buffer cursor.
    /// The cursor is advanced past the decoded frame.
    ///
    /// 从缓冲区光标的前端解码单个帧。
    /// 光标会前进到已解码帧之后。
    pub(crate) fn decode(cursor: &mut &[u8], ctx: &FrameContext) -> Result<Self> {
        ensure(cursor, FRAME_TYPE_SIZE)?;
        let type_byte = cursor.get_u8();

        if type_byte & STREAM_FRAME_TYPE != 0 {
            return Self::decode_stream(type_byte, cursor);
        }
        if type_byte & ACK_FRAME_TYPE != 0 {
            return AckFrame::decode(type_byte, cursor).map(Frame::Ack);
        }
        if type_byte & CONGESTION_FEEDBACK_FRAME_TYPE != 0 {
            ensure(cursor, 3)?;
            if cursor.get_u8() != CONGESTION_FEEDBACK_TCP {
                return Err(Error::InvalidPacket);
            }
            let receive_window = (cursor.get_u16() as u64) << RECEIVE_WINDOW_SHIFT;
            return Ok(Frame::CongestionFeedback(CongestionFeedbackFrame {
                receive_window,
            }));
        }

        match type_byte {
            PADDING_FRAME_TYPE => {
                // Padding runs to the end of the packet.
                cursor.advance(cursor.remaining());
                Ok(Frame::Padding)
            }
            RST_STREAM_FRAME_TYPE => {
                ensure(cursor, STREAM_ID_SIZE + BYTE_OFFSET_SIZE + ERROR_CODE_SIZE)?;
                Ok(Frame::RstStream(RstStreamFrame {
                    stream_id: cursor.get_u32(),
                    byte_offset: cursor.get_u64(),
                    error_code: cursor.get_u32(),
                }))
            }
            CONNECTION_CLOSE_FRAME_TYPE => {
                ensure(cursor, ERROR_CODE_SIZE)?;
                let error_code = cursor.get_u32();
                let error_details = get_reason(cursor)?;
                Ok(Frame::ConnectionClose(ConnectionCloseFrame {
                    error_code,
                    error_details,
                }))
            }
            GOAWAY_FRAME_TYPE => {
                ensure(cursor, ERROR_CODE_SIZE + STREAM_ID_SIZE)?;
                let error_code = cursor.get_u32();
                let last_good_stream_id = cursor.get_u32();
                let reason_phrase = get_reason(cursor)?;
                Ok(Frame::GoAway(GoAwayFrame {
                    error_code,
                    last_good_stream_id,
                    reason_phrase,
                }))
            }
            WINDOW_UPDATE_FRAME_TYPE => {
                ensure(cursor, STREAM_ID_SIZE + BYTE_OFFSET_SIZE)?;
                Ok(Frame::WindowUpdate(WindowUpdateFrame {
                    stream_id: cursor.get_u32(),
                    byte_offset: cursor.get_u64(),
                }))
            }
            BLOCKED_FRAME_TYPE => {
                ensure(cursor, STREAM_ID_SIZE)?;
                Ok(Frame::Blocked(BlockedFrame {
                    stream_id: cursor.get_u32(),
                }))
            }
            STOP_WAITING_FRAME_TYPE => {
                let seq_len = ctx.sequence_number_length.bytes();
                ensure(cursor, ENTROPY_HASH_SIZE + seq_len)?;
                let entropy_hash = cursor.get_u8();
                let delta = cursor.get_uint(seq_len);
                let least_unacked = ctx
                    .packet_sequence_number
                    .checked_sub(delta)
                    .ok_or(Error::InvalidPacket)?;
                Ok(Frame::StopWaiting(StopWaitingFrame {
                    entropy_hash,
                    least_unacked,
                }))
            }
            PING_FRAME_TYPE => Ok(Frame::Ping),
            other => Err(Error::UnknownFrameType(other)),
        }
    }

    fn decode_stream(type_byte: u8, cursor: &mut &[u8]) -> Result<Self> {
        let id_len = (type_byte & STREAM_ID_MASK) as usize + 1;
        let offset_code = (type_byte >> STREAM_OFFSET_SHIFT) & STREAM_OFFSET_MASK;
        let offset_len = if offset_code == 0 {
            0
        } else {
            offset_code as usize + 1
        };
        let has_length = type_byte & STREAM_DATA_LENGTH_FLAG != 0;

        ensure(cursor, id_len + offset_len)?;
        let stream_id = cursor.get_uint(id_len) as StreamId;
        let offset = if offset_len > 0 {
            cursor.get_uint(offset_len)
        } else {
            0
        };
        let data_len = if has_length {
            ensure(cursor, STREAM_PAYLOAD_LENGTH_SIZE)?;
            cursor.get_u16() as usize
        } else {
            cursor.remaining()
        };
        ensure(cursor, data_len)?;
        let data = Bytes::copy_from_slice(&cursor[..data_len]);
        cursor.advance(data_len);

        Ok(Frame::Stream(StreamFrame {
            stream_id,
            fin: type_byte & STREAM_FIN_FLAG != 0,
            offset,
            data,
        }))
    }
}
