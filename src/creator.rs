//! 包创建器：决定哪些帧放入当前包、序列化包并管理FEC组。
//! The packet creator: decides what fits into the current packet, serializes
//! it and manages FEC grouping.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::packet::fec::{FecData, FecGroup};
use crate::packet::frame::{self, ConnectionCloseFrame, Frame, StreamFrame};
use crate::packet::framer::{Framer, packet_entropy_hash};
use crate::packet::header::{PacketHeader, PublicHeader, packet_header_size};
use crate::packet::{
    ByteCount, CRYPTO_STREAM_ID, ConnectionId, ConnectionIdLength, FecGroupNumber, InFecGroup,
    PacketSequenceNumber, QUIC_VERSION_SIZE, STREAM_PAYLOAD_LENGTH_SIZE, SequenceNumberLength, StreamId,
    StreamOffset,
};
use crate::random::{BoolSource, RandomSource};
use bytes::Bytes;
use std::mem;
use tracing::{debug, error, trace};

#[cfg(test)]
mod tests;

/// Frames that must be resent if the packet carrying them is lost.
/// 如果携带它们的包丢失，必须重发的帧。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RetransmittableFrames {
    pub frames: Vec<Frame>,
    /// Set when any frame carries crypto handshake data.
    /// 当任何帧携带加密握手数据时设置。
    pub has_crypto_handshake: bool,
}

/// A finished packet, ready for encryption.
/// 一个已完成、可以加密的包。
#[derive(Debug, Clone)]
pub struct SerializedPacket {
    pub sequence_number: PacketSequenceNumber,
    pub sequence_number_length: SequenceNumberLength,
    pub packet: Bytes,
    pub entropy_hash: u8,
    /// `None` when the packet holds nothing worth retransmitting.
    /// 当包中没有需要重传的内容时为 `None`。
    pub retransmittable_frames: Option<RetransmittableFrames>,
}

/// Accumulates frames into packets.
///
/// The creator keeps exactly one packet under construction. Frames are queued
/// by [`add_frame`](Self::add_frame) until the caller decides to
/// [`serialize_packet`](Self::serialize_packet). While FEC protection is on,
/// every serialized packet is folded into the open FEC group and a
/// redundancy packet is emitted by [`serialize_fec`](Self::serialize_fec).
///
/// 将帧累积成包。
///
/// 创建器始终只有一个正在构建的包。帧通过 [`add_frame`](Self::add_frame) 排队，
/// 直到调用方决定 [`serialize_packet`](Self::serialize_packet)。
/// FEC保护开启时，每个序列化的包都会被折叠进打开的FEC组，
/// 冗余包由 [`serialize_fec`](Self::serialize_fec) 发出。
#[derive(Debug)]
pub struct PacketCreator {
    connection_id: ConnectionId,
    framer: Framer,
    random_bool_source: BoolSource,
    /// The sequence number of the last serialized packet.
    /// 最后一个序列化包的序列号。
    sequence_number: PacketSequenceNumber,
    should_fec_protect: bool,
    /// The sequence number of the first packet of the open FEC group.
    /// 打开的FEC组中第一个包的序列号。
    fec_group_number: FecGroupNumber,
    fec_group: Option<FecGroup>,
    send_version_in_packet: bool,
    max_packet_length: usize,
    max_packets_per_fec_group: usize,
    connection_id_length: ConnectionIdLength,
    /// Takes effect at the next packet or FEC group boundary.
    /// 在下一个包或FEC组边界生效。
    next_sequence_number_length: SequenceNumberLength,
    sequence_number_length: SequenceNumberLength,
    /// Header plus queued frames. Only meaningful while frames are queued.
    /// 包头加上排队的帧。仅在有帧排队时有意义。
    packet_size: usize,
    queued_frames: Vec<Frame>,
    /// Positions in `queued_frames` of the frames kept for retransmission.
    /// `queued_frames` 中为重传而保留的帧的位置。
    queued_retransmittable: Vec<usize>,
}

impl PacketCreator {
    pub fn new(
        connection_id: ConnectionId,
        config: &Config,
        random: Box<dyn RandomSource>,
    ) -> Self {
        let framer = Framer::new(
            config.version,
            config.perspective,
            config.packet.encryption_overhead,
        );
        Self {
            connection_id,
            send_version_in_packet: !framer.is_server(),
            framer,
            random_bool_source: BoolSource::new(random),
            sequence_number: 0,
            should_fec_protect: false,
            fec_group_number: 0,
            fec_group: None,
            max_packet_length: config.packet.max_packet_length,
            max_packets_per_fec_group: config.packet.max_packets_per_fec_group,
            connection_id_length: config.packet.connection_id_length,
            next_sequence_number_length: SequenceNumberLength::One,
            sequence_number_length: SequenceNumberLength::One,
            packet_size: 0,
            queued_frames: Vec::new(),
            queued_retransmittable: Vec::new(),
        }
    }

    /// Turns FEC protection on for the packets that follow. The group itself
    /// opens lazily when the next frame is added.
    ///
    /// 为之后的包开启FEC保护。FEC组本身在添加下一个帧时才惰性打开。
    pub fn start_fec_protection(&mut self) -> Result<()> {
        if !self.is_fec_enabled() {
            error!("cannot start FEC protection when FEC is not enabled");
            return Err(Error::FecNotEnabled);
        }
        if self.has_pending_frames() {
            error!(
                queued = self.queued_frames.len(),
                "cannot start FEC protection with pending frames"
            );
            return Err(Error::PendingFrames);
        }
        debug_assert!(!self.should_fec_protect);
        self.should_fec_protect = true;
        Ok(())
    }

    /// Turns FEC protection off. Refused while a group is open.
    ///
    /// 关闭FEC保护。FEC组打开时拒绝。
    pub fn stop_fec_protection(&mut self) -> Result<()> {
        if self.fec_group.is_some() {
            error!(
                fec_group = self.fec_group_number,
                "cannot stop FEC protection with open FEC group"
            );
            return Err(Error::FecGroupOpen);
        }
        debug_assert!(self.should_fec_protect);
        self.should_fec_protect = false;
        self.fec_group_number = 0;
        Ok(())
    }

    pub fn is_fec_enabled(&self) -> bool {
        self.max_packets_per_fec_group > 0
    }

    pub fn is_fec_protected(&self) -> bool {
        self.should_fec_protect
    }

    /// An FEC group is open and protects at least one packet.
    /// FEC组处于打开状态并且至少保护了一个包。
    pub fn is_fec_group_open(&self) -> bool {
        self.fec_group
            .as_ref()
            .is_some_and(|group| group.num_received_packets() > 0)
    }

    /// Whether the open FEC group should be closed with a redundancy packet now.
    ///
    /// 现在是否应该用冗余包关闭打开的FEC组。
    pub fn should_send_fec(&self, force_close: bool) -> bool {
        debug_assert!(!self.has_pending_frames());
        self.fec_group.as_ref().is_some_and(|group| {
            group.num_received_packets() > 0
                && (force_close || group.num_received_packets() >= self.max_packets_per_fec_group)
        })
    }

    /// Applies pending length changes and opens an FEC group, but only at a
    /// packet boundary outside any FEC group.
    ///
    /// 应用待定的长度变化并打开FEC组，但只在任何FEC组之外的包边界上进行。
    pub fn maybe_update_lengths_and_start_fec(&mut self) -> InFecGroup {
        if self.fec_group.is_some() {
            // Lengths are frozen for the lifetime of a group.
            return InFecGroup::InFecGroup;
        }
        if !self.queued_frames.is_empty() {
            return InFecGroup::NotInFecGroup;
        }

        self.sequence_number_length = self.next_sequence_number_length;

        if !self.should_fec_protect {
            return InFecGroup::NotInFecGroup;
        }
        self.fec_group_number = self.sequence_number + 1;
        self.fec_group = Some(FecGroup::new());
        debug!(fec_group = self.fec_group_number, "opened FEC group");
        InFecGroup::InFecGroup
    }

    /// Stops writing the version into packets. A packet under construction
    /// shrinks accordingly.
    ///
    /// 停止在包中写入版本号。正在构建的包相应缩小。
    pub fn stop_sending_version(&mut self) {
        debug_assert!(self.send_version_in_packet);
        self.send_version_in_packet = false;
        if !self.queued_frames.is_empty() {
            debug_assert!(self.packet_size > QUIC_VERSION_SIZE);
            self.packet_size -= QUIC_VERSION_SIZE;
        }
    }

    /// Picks the sequence number length for future packets so that the peer
    /// can still recover full sequence numbers with a whole congestion window
    /// (or an FEC group) in flight.
    ///
    /// 为之后的包选择序列号长度，使对端在整个拥塞窗口（或一个FEC组）在途时仍能恢复完整序列号。
    pub fn update_sequence_number_length(
        &mut self,
        least_packet_awaited_by_peer: PacketSequenceNumber,
        congestion_window: ByteCount,
    ) {
        debug_assert!(least_packet_awaited_by_peer <= self.sequence_number + 1);
        let current_delta = (self.max_packets_per_fec_group as u64 + self.sequence_number + 1)
            .saturating_sub(least_packet_awaited_by_peer);
        let congestion_window_packets = congestion_window / self.max_packet_length.max(1) as u64;
        let delta = current_delta.max(congestion_window_packets);
        let next = SequenceNumberLength::min_for(delta.saturating_mul(4));
        if next != self.next_sequence_number_length {
            debug!(
                from = ?self.next_sequence_number_length,
                to = ?next,
                delta,
                "sequence number length changes at next boundary"
            );
        }
        self.next_sequence_number_length = next;
    }

    fn current_in_fec_group(&self) -> InFecGroup {
        if self.should_fec_protect {
            InFecGroup::InFecGroup
        } else {
            InFecGroup::NotInFecGroup
        }
    }

    /// Whether a stream frame with at least one byte of data still fits.
    /// 是否仍能放下至少带一个字节数据的流帧。
    pub fn has_room_for_stream_frame(&self, stream_id: StreamId, offset: StreamOffset) -> bool {
        self.bytes_free()
            > self.framer.min_stream_frame_size(
                stream_id,
                offset,
                true,
                self.current_in_fec_group(),
            )
    }

    /// The overhead of a packet holding a single stream frame.
    /// 只含单个流帧的包的开销。
    pub fn stream_frame_packet_overhead(
        connection_id_length: ConnectionIdLength,
        include_version: bool,
        sequence_number_length: SequenceNumberLength,
        offset: StreamOffset,
        is_in_fec_group: InFecGroup,
    ) -> usize {
        packet_header_size(
            connection_id_length,
            include_version,
            sequence_number_length,
            is_in_fec_group,
        ) + frame::min_stream_frame_size(1, offset, true, is_in_fec_group)
    }

    /// Builds a stream frame holding as much of `data` as fits in the current
    /// packet. Returns the frame and the number of bytes it consumed.
    ///
    /// Empty `data` yields a zero length frame with `fin` set. Otherwise `fin`
    /// is only kept if all of `data` was consumed.
    ///
    /// 构建一个流帧，尽可能多地容纳 `data` 中能放进当前包的部分。返回该帧及其消耗的字节数。
    /// 空的 `data` 产生一个设置了 `fin` 的零长度帧。否则只有在消耗了全部 `data` 时才保留 `fin`。
    pub fn create_stream_frame(
        &mut self,
        stream_id: StreamId,
        data: Bytes,
        offset: StreamOffset,
        fin: bool,
    ) -> (Frame, usize) {
        debug_assert!(
            self.max_packet_length
                > Self::stream_frame_packet_overhead(
                    ConnectionIdLength::Eight,
                    true,
                    SequenceNumberLength::Six,
                    offset,
                    InFecGroup::InFecGroup,
                )
        );
        let is_in_fec_group = self.maybe_update_lengths_and_start_fec();

        if !self.has_room_for_stream_frame(stream_id, offset) {
            error!(
                bytes_free = self.bytes_free(),
                stream_id, offset, "no room for stream frame"
            );
        }

        if data.is_empty() {
            if !fin {
                error!(stream_id, "creating a stream frame with no data or fin");
            }
            let frame = Frame::Stream(StreamFrame {
                stream_id,
                fin: true,
                offset,
                data,
            });
            return (frame, 0);
        }

        let min_frame_size =
            self.framer
                .min_stream_frame_size(stream_id, offset, true, is_in_fec_group);
        let bytes_consumed = self
            .bytes_free()
            .saturating_sub(min_frame_size)
            .min(data.len());
        let set_fin = fin && bytes_consumed == data.len();
        let frame = Frame::Stream(StreamFrame {
            stream_id,
            fin: set_fin,
            offset,
            data: data.slice(..bytes_consumed),
        });
        (frame, bytes_consumed)
    }

    /// Serializes `frames` into a packet of their own, with the given sequence
    /// number length and FEC protection off. Used to retransmit frames whose
    /// original packet was built with a different length.
    ///
    /// 使用给定的序列号长度并关闭FEC保护，把 `frames` 序列化为独立的包。
    /// 用于重传原始包以不同长度构建的帧。
    pub fn reserialize_all_frames(
        &mut self,
        frames: Vec<Frame>,
        original_length: SequenceNumberLength,
    ) -> Result<SerializedPacket> {
        debug_assert!(self.fec_group.is_none());
        let saved_length = self.sequence_number_length;
        let saved_next_length = self.next_sequence_number_length;
        let saved_should_fec_protect = self.should_fec_protect;

        self.sequence_number_length = original_length;
        self.next_sequence_number_length = original_length;
        self.should_fec_protect = false;

        let result = self.serialize_all_frames(frames);

        self.sequence_number_length = saved_length;
        self.next_sequence_number_length = saved_next_length;
        self.should_fec_protect = saved_should_fec_protect;
        result
    }

    /// Serializes `frames` as one packet. Nothing may already be queued, and
    /// the frames are not kept for retransmission.
    ///
    /// 将 `frames` 序列化为一个包。此前不能有排队的帧，这些帧也不会为重传而保留。
    pub fn serialize_all_frames(&mut self, frames: Vec<Frame>) -> Result<SerializedPacket> {
        debug_assert!(self.queued_frames.is_empty());
        if frames.is_empty() {
            error!("attempt to serialize empty packet");
            return Err(Error::EmptyPacket);
        }
        for frame in frames {
            if !self.add_frame(frame, false) {
                error!(
                    queued = self.queued_frames.len(),
                    bytes_free = self.bytes_free(),
                    "frame does not fit into a packet of its own"
                );
                self.clear_pending();
                return Err(Error::FrameDoesNotFit);
            }
        }
        let packet = self.serialize_packet()?;
        debug_assert!(packet.retransmittable_frames.is_none());
        Ok(packet)
    }

    pub fn serialize_connection_close(
        &mut self,
        close_frame: ConnectionCloseFrame,
    ) -> Result<SerializedPacket> {
        self.serialize_all_frames(vec![Frame::ConnectionClose(close_frame)])
    }

    /// Builds a version negotiation packet. Servers only.
    /// 构建版本协商包。仅限服务器。
    pub fn serialize_version_negotiation_packet(&self, supported_versions: &[u32]) -> Result<Bytes> {
        if !self.framer.is_server() {
            error!("only servers send version negotiation packets");
            return Err(Error::NotServer);
        }
        let packet = self
            .framer
            .build_version_negotiation_packet(self.connection_id, supported_versions)?;
        debug_assert!(packet.len() <= self.max_packet_length);
        Ok(packet)
    }

    pub fn has_pending_frames(&self) -> bool {
        !self.queued_frames.is_empty()
    }

    pub fn has_pending_retransmittable_frames(&self) -> bool {
        !self.queued_retransmittable.is_empty()
    }

    /// The bytes a trailing stream frame grows by once another frame follows it.
    /// Frames in an FEC group always carry their length.
    ///
    /// 当后面跟上另一个帧时尾部流帧增长的字节数。FEC组中的帧总是携带长度。
    fn expansion_on_new_frame(&self) -> usize {
        if self.should_fec_protect {
            return 0;
        }
        match self.queued_frames.last() {
            Some(Frame::Stream(_)) => STREAM_PAYLOAD_LENGTH_SIZE,
            _ => 0,
        }
    }

    /// The room left for another frame, net of any expansion it causes.
    /// 剩余给另一个帧的空间，已扣除它所引起的扩展。
    pub fn bytes_free(&self) -> usize {
        let max_plaintext_size = self.framer.max_plaintext_size(self.max_packet_length);
        debug_assert!(max_plaintext_size >= self.packet_size());
        max_plaintext_size
            - max_plaintext_size.min(self.packet_size() + self.expansion_on_new_frame())
    }

    /// The size of the packet under construction, or of an empty packet's
    /// header when nothing is queued.
    ///
    /// 正在构建的包的大小；没有帧排队时为空包的包头大小。
    pub fn packet_size(&self) -> usize {
        if !self.queued_frames.is_empty() {
            return self.packet_size;
        }
        let sequence_number_length = if self.fec_group.is_none() {
            self.next_sequence_number_length
        } else {
            self.sequence_number_length
        };
        packet_header_size(
            self.connection_id_length,
            self.send_version_in_packet,
            sequence_number_length,
            self.current_in_fec_group(),
        )
    }

    /// Fixes the header size of a new packet once its first frame is added.
    /// 在新包的第一个帧加入时固定其包头大小。
    fn finalize_header_length(&mut self) {
        if !self.queued_frames.is_empty() {
            return;
        }
        self.packet_size = packet_header_size(
            self.connection_id_length,
            self.send_version_in_packet,
            self.sequence_number_length,
            self.current_in_fec_group(),
        );
    }

    /// Adds a frame whose retransmittable content is kept for the caller.
    /// 添加一个帧，其可重传内容为调用方保留。
    pub fn add_saved_frame(&mut self, frame: Frame) -> bool {
        self.add_frame(frame, true)
    }

    /// Queues `frame` if it fits. Returns `false` without changing the packet
    /// when it doesn't.
    ///
    /// 如果放得下就将 `frame` 排队。放不下时返回 `false`，且不改变包。
    pub fn add_frame(&mut self, frame: Frame, save_retransmittable_frames: bool) -> bool {
        trace!(frame_type = ?frame.frame_type(), "adding frame");
        let is_in_fec_group = self.maybe_update_lengths_and_start_fec();
        self.finalize_header_length();

        let frame_len = self.framer.serialized_frame_length(
            &frame,
            self.bytes_free(),
            self.queued_frames.is_empty(),
            true,
            is_in_fec_group,
            self.sequence_number_length,
        );
        if frame_len == 0 {
            return false;
        }
        debug_assert!(self.packet_size > 0);
        self.packet_size += self.expansion_on_new_frame() + frame_len;

        if save_retransmittable_frames && frame.is_retransmittable() {
            self.queued_retransmittable.push(self.queued_frames.len());
        }
        self.queued_frames.push(frame);
        true
    }

    /// Pads packets carrying handshake data to the full packet size.
    /// 将携带握手数据的包填充到完整大小。
    fn maybe_add_padding(&mut self) {
        if self.bytes_free() == 0 {
            return;
        }
        let is_handshake = self.queued_frames.iter().any(
            |frame| matches!(frame, Frame::Stream(stream) if stream.stream_id == CRYPTO_STREAM_ID),
        );
        if !is_handshake {
            return;
        }
        let added = self.add_frame(Frame::Padding, false);
        debug_assert!(added);
    }

    /// Serializes the queued frames into a packet and starts a new one.
    ///
    /// 将排队的帧序列化为一个包，并开始一个新包。
    pub fn serialize_packet(&mut self) -> Result<SerializedPacket> {
        if self.queued_frames.is_empty() {
            error!("attempt to serialize empty packet");
            return Err(Error::EmptyPacket);
        }
        debug_assert!(self.sequence_number + 1 >= self.fec_group_number);
        let fec_group = if self.should_fec_protect {
            self.fec_group_number
        } else {
            0
        };
        let header = self.fill_packet_header(fec_group, false);

        self.maybe_add_padding();

        let max_plaintext_size = self.framer.max_plaintext_size(self.max_packet_length);
        debug_assert!(max_plaintext_size >= self.packet_size);
        // Only a lone ACK that claimed every free byte can have been truncated.
        let possibly_truncated = self.packet_size == max_plaintext_size
            && self.queued_frames.len() == 1
            && matches!(self.queued_frames[0], Frame::Ack(_));

        let built = self
            .framer
            .build_data_packet(&header, &self.queued_frames, self.packet_size);
        let packet_size = self.packet_size;
        let frames = mem::take(&mut self.queued_frames);
        let retransmittable = mem::take(&mut self.queued_retransmittable);
        self.packet_size = 0;

        let packet = built.inspect_err(|err| {
            error!(
                frames = frames.len(),
                %err,
                "failed to serialize frames"
            );
        })?;
        if !possibly_truncated {
            debug_assert_eq!(packet_size, packet.len());
        }

        if header.is_in_fec_group.is_in_group() {
            if let Some(group) = self.fec_group.as_mut() {
                let header_len = header.encoded_size();
                group.update(header.packet_sequence_number, &packet[header_len..]);
            }
        }

        let retransmittable_frames = if retransmittable.is_empty() {
            None
        } else {
            let frames: Vec<Frame> = frames
                .into_iter()
                .enumerate()
                .filter(|(i, _)| retransmittable.contains(i))
                .map(|(_, frame)| frame)
                .collect();
            let has_crypto_handshake = frames.iter().any(
                |frame| matches!(frame, Frame::Stream(stream) if stream.stream_id == CRYPTO_STREAM_ID),
            );
            Some(RetransmittableFrames {
                frames,
                has_crypto_handshake,
            })
        };

        debug!(
            sequence_number = header.packet_sequence_number,
            len = packet.len(),
            in_fec_group = header.is_in_fec_group.is_in_group(),
            "serialized packet"
        );
        Ok(SerializedPacket {
            sequence_number: header.packet_sequence_number,
            sequence_number_length: header.public_header.sequence_number_length,
            entropy_hash: packet_entropy_hash(&header),
            packet,
            retransmittable_frames,
        })
    }

    /// Emits the redundancy packet for the open FEC group and closes the group.
    ///
    /// 为打开的FEC组发出冗余包并关闭该组。
    pub fn serialize_fec(&mut self) -> Result<SerializedPacket> {
        let fec = match self.fec_group.as_ref() {
            Some(group) if group.num_received_packets() > 0 => FecData {
                fec_group: group
                    .min_protected_packet()
                    .unwrap_or(self.fec_group_number),
                redundancy: Bytes::copy_from_slice(group.payload_parity()),
            },
            _ => {
                error!("serialize_fec called but no group or zero packets in group");
                return Err(Error::NoFecGroup);
            }
        };
        debug_assert!(self.queued_frames.is_empty());
        let header = self.fill_packet_header(self.fec_group_number, true);
        let built = self.framer.build_fec_packet(&header, &fec);
        self.fec_group = None;
        self.packet_size = 0;

        let packet = built.inspect_err(|err| {
            error!(fec_group = fec.fec_group, %err, "failed to serialize FEC packet");
        })?;
        debug_assert!(packet.len() <= self.max_packet_length);
        debug!(
            sequence_number = header.packet_sequence_number,
            fec_group = fec.fec_group,
            "serialized FEC packet"
        );
        Ok(SerializedPacket {
            sequence_number: header.packet_sequence_number,
            sequence_number_length: header.public_header.sequence_number_length,
            entropy_hash: packet_entropy_hash(&header),
            packet,
            retransmittable_frames: None,
        })
    }

    fn fill_packet_header(&mut self, fec_group: FecGroupNumber, fec_flag: bool) -> PacketHeader {
        self.sequence_number += 1;
        PacketHeader {
            public_header: PublicHeader {
                connection_id: self.connection_id,
                connection_id_length: self.connection_id_length,
                reset_flag: false,
                version_flag: self.send_version_in_packet,
                sequence_number_length: self.sequence_number_length,
            },
            packet_sequence_number: self.sequence_number,
            entropy_flag: self.random_bool_source.rand_bool(),
            fec_flag,
            is_in_fec_group: if fec_group == 0 {
                InFecGroup::NotInFecGroup
            } else {
                InFecGroup::InFecGroup
            },
            fec_group,
        }
    }

    fn clear_pending(&mut self) {
        self.queued_frames.clear();
        self.queued_retransmittable.clear();
        self.packet_size = 0;
    }

    /// The sequence number of the last packet serialized.
    /// 最后序列化的包的序列号。
    pub fn sequence_number(&self) -> PacketSequenceNumber {
        self.sequence_number
    }

    pub fn set_sequence_number(&mut self, sequence_number: PacketSequenceNumber) {
        self.sequence_number = sequence_number;
    }

    pub fn sequence_number_length(&self) -> SequenceNumberLength {
        self.sequence_number_length
    }

    pub fn next_sequence_number_length(&self) -> SequenceNumberLength {
        self.next_sequence_number_length
    }

    pub fn set_next_sequence_number_length(&mut self, length: SequenceNumberLength) {
        self.next_sequence_number_length = length;
    }

    pub fn max_packet_length(&self) -> usize {
        self.max_packet_length
    }

    pub fn set_max_packet_length(&mut self, length: usize) {
        debug_assert!(!self.has_pending_frames());
        self.max_packet_length = length;
    }

    pub fn max_packets_per_fec_group(&self) -> usize {
        self.max_packets_per_fec_group
    }

    pub fn set_max_packets_per_fec_group(&mut self, max_packets_per_fec_group: usize) {
        self.max_packets_per_fec_group = max_packets_per_fec_group;
    }

    pub fn set_connection_id_length(&mut self, length: ConnectionIdLength) {
        debug_assert!(!self.has_pending_frames());
        self.connection_id_length = length;
    }

    pub fn max_plaintext_size(&self) -> usize {
        self.framer.max_plaintext_size(self.max_packet_length)
    }
}
