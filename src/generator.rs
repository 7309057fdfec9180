//! 包生成器：在发送许可的约束下，把控制帧和流数据组织成包。
//! The packet generator: turns control frames and stream data into packets
//! whenever the delegate says the connection may write.

use crate::config::Config;
use crate::congestion::HasRetransmittableData;
use crate::creator::{PacketCreator, SerializedPacket};
use crate::error::{Error, Result};
use crate::packet::ack::AckFrame;
use crate::packet::frame::{CongestionFeedbackFrame, Frame, StopWaitingFrame};
use crate::packet::{
    ByteCount, CRYPTO_STREAM_ID, ConnectionId, PacketSequenceNumber, SequenceNumberLength,
    StreamId, StreamOffset,
};
use crate::random::RandomSource;
use bytes::{Buf, Bytes};
use std::collections::VecDeque;
use tracing::{debug, error, trace};


/// Whether stream data has to travel inside an FEC group.
/// 流数据是否必须在FEC组中传输。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FecProtection {
    MayFecProtect,
    MustFecProtect,
}

/// How much of a write was turned into frames.
/// 一次写入中有多少被转换成了帧。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsumedData {
    pub bytes_consumed: usize,
    pub fin_consumed: bool,
}

/// The connection side of the generator.
///
/// 生成器的连接侧接口。
pub trait GeneratorDelegate {
    /// Whether a packet may be written now.
    /// 现在是否可以写一个包。
    fn should_generate_packet(
        &mut self,
        has_retransmittable_data: HasRetransmittableData,
        is_handshake: bool,
    ) -> bool;

    fn create_ack_frame(&mut self) -> AckFrame;

    fn create_feedback_frame(&mut self) -> CongestionFeedbackFrame;

    fn create_stop_waiting_frame(&mut self) -> StopWaitingFrame;

    /// Receives every finished packet, data and FEC alike.
    /// 接收每一个完成的包，包括数据包和FEC包。
    fn on_serialized_packet(&mut self, packet: SerializedPacket);

    /// A packet could not be produced. The connection should be closed.
    /// 无法生成包。连接应当被关闭。
    fn on_generation_error(&mut self, error: Error);
}

/// Drives a [`PacketCreator`], bundling queued frames into as few packets as
/// the delegate allows.
///
/// Outside batch mode every call leaves nothing queued in the creator. Inside
/// batch mode frames accumulate until the batch finishes or a packet fills.
///
/// 驱动一个 [`PacketCreator`]，在委托允许的范围内把排队的帧打包进尽可能少的包中。
///
/// 在批处理模式之外，每次调用之后创建器中都不会留下排队的内容。
/// 在批处理模式中，帧会累积直到批处理结束或包被填满。
pub struct PacketGenerator<D> {
    delegate: D,
    creator: PacketCreator,
    batch_mode: bool,
    /// Stream data currently being written wants FEC protection.
    /// 当前正在写入的流数据需要FEC保护。
    should_fec_protect: bool,
    should_send_ack: bool,
    should_send_feedback: bool,
    should_send_stop_waiting: bool,
    queued_control_frames: VecDeque<Frame>,
}

impl<D: GeneratorDelegate> PacketGenerator<D> {
    pub fn new(
        connection_id: ConnectionId,
        config: &Config,
        random: Box<dyn RandomSource>,
        delegate: D,
    ) -> Self {
        Self {
            delegate,
            creator: PacketCreator::new(connection_id, config, random),
            batch_mode: false,
            should_fec_protect: false,
            should_send_ack: false,
            should_send_feedback: false,
            should_send_stop_waiting: false,
            queued_control_frames: VecDeque::new(),
        }
    }

    pub fn set_should_send_ack(&mut self, also_send_feedback: bool, also_send_stop_waiting: bool) {
        self.should_send_ack = true;
        self.should_send_feedback = also_send_feedback;
        self.should_send_stop_waiting = also_send_stop_waiting;
        self.send_queued_frames(false);
    }

    pub fn set_should_send_stop_waiting(&mut self) {
        self.should_send_stop_waiting = true;
        self.send_queued_frames(false);
    }

    /// Queues a control frame. Control frames go out in the order they were added.
    /// 将控制帧排队。控制帧按添加的顺序发出。
    pub fn add_control_frame(&mut self, frame: Frame) {
        self.queued_control_frames.push_back(frame);
        self.send_queued_frames(false);
    }

    /// Writes as much of `data` as the delegate allows, starting at `offset`.
    ///
    /// Pending control frames are sent first. Crypto stream data never shares
    /// a packet with other retransmittable frames.
    ///
    /// 在委托允许的范围内从 `offset` 开始写入尽可能多的 `data`。
    /// 待发送的控制帧先发送。加密流数据从不与其他可重传帧共享一个包。
    pub fn consume_data(
        &mut self,
        stream_id: StreamId,
        data: Bytes,
        offset: StreamOffset,
        fin: bool,
        fec_protection: FecProtection,
    ) -> ConsumedData {
        let is_handshake = stream_id == CRYPTO_STREAM_ID;
        let flush = is_handshake && self.creator.has_pending_retransmittable_frames();
        self.send_queued_frames(flush);

        if !self.creator.has_room_for_stream_frame(stream_id, offset) {
            self.serialize_and_send_packet();
        }

        if fec_protection == FecProtection::MustFecProtect {
            self.maybe_start_fec_protection();
        }

        let data_len = data.len();
        let mut remaining = data;
        let mut consumed = ConsumedData::default();
        while self
            .delegate
            .should_generate_packet(HasRetransmittableData::Yes, is_handshake)
        {
            let frame_offset = offset + consumed.bytes_consumed as StreamOffset;
            let (frame, bytes_consumed) =
                self.creator
                    .create_stream_frame(stream_id, remaining.clone(), frame_offset, fin);
            if !self.creator.add_saved_frame(frame) {
                // A hole in the stream cannot be repaired.
                error!(stream_id, offset = frame_offset, "failed to add stream frame");
                self.delegate.on_generation_error(Error::FrameDoesNotFit);
                return ConsumedData::default();
            }

            consumed.bytes_consumed += bytes_consumed;
            consumed.fin_consumed = fin && consumed.bytes_consumed == data_len;
            remaining.advance(bytes_consumed);
            debug_assert!(remaining.is_empty() || self.creator.bytes_free() == 0);

            if !self.batch_mode || !self.creator.has_room_for_stream_frame(stream_id, offset) {
                self.serialize_and_send_packet();
            }

            if remaining.is_empty() {
                // A bare fin consumes no bytes, so this is checked after the frame is added.
                if fec_protection == FecProtection::MustFecProtect {
                    debug!(stream_id, "turning FEC protection off");
                    self.should_fec_protect = false;
                }
                break;
            }
        }

        if is_handshake {
            self.send_queued_frames(true);
        }

        // Out of data or blocked: outside a batch the group closes now.
        self.maybe_send_fec_packet_and_close_group(!self.batch_mode);

        debug_assert!(self.batch_mode || !self.creator.has_pending_frames());
        consumed
    }

    pub fn start_batch_operations(&mut self) {
        self.batch_mode = true;
    }

    pub fn finish_batch_operations(&mut self) {
        self.batch_mode = false;
        self.send_queued_frames(false);
    }

    /// Sends everything queued regardless of what the delegate says.
    /// 无论委托怎么说，都发送所有排队的内容。
    pub fn flush_all_queued_frames(&mut self) {
        self.send_queued_frames(true);
    }

    pub fn in_batch_mode(&self) -> bool {
        self.batch_mode
    }

    /// Frames are waiting either in the generator or in the creator.
    /// 有帧在生成器或创建器中等待。
    pub fn has_queued_frames(&self) -> bool {
        self.creator.has_pending_frames() || self.has_pending_frames()
    }

    /// Frames are waiting in the generator, not yet handed to the creator.
    /// 有帧在生成器中等待，尚未交给创建器。
    pub fn has_pending_frames(&self) -> bool {
        self.should_send_ack
            || self.should_send_feedback
            || self.should_send_stop_waiting
            || !self.queued_control_frames.is_empty()
    }

    fn can_send_with_next_pending_frame_addition(&mut self) -> bool {
        debug_assert!(self.has_pending_frames());
        let has_retransmittable_data =
            if self.should_send_ack || self.should_send_feedback || self.should_send_stop_waiting {
                HasRetransmittableData::No
            } else {
                HasRetransmittableData::Yes
            };
        self.delegate
            .should_generate_packet(has_retransmittable_data, false)
    }

    fn send_queued_frames(&mut self, flush: bool) {
        // Only add pending frames if the whole packet can then be sent.
        while self.has_pending_frames() && (flush || self.can_send_with_next_pending_frame_addition()) {
            if self.add_next_pending_frame() {
                continue;
            }
            if self.creator.has_pending_frames() {
                // Packet was full.
                self.serialize_and_send_packet();
            } else {
                self.discard_next_pending_frame();
            }
        }

        if !self.batch_mode || flush {
            if self.creator.has_pending_frames() {
                self.serialize_and_send_packet();
            }
            self.maybe_send_fec_packet_and_close_group(true);
        }
    }

    /// Hands the next pending frame to the creator. Returns `false` if it did
    /// not fit.
    fn add_next_pending_frame(&mut self) -> bool {
        if self.should_send_ack {
            let ack = self.delegate.create_ack_frame();
            self.should_send_ack = !self.creator.add_saved_frame(Frame::Ack(ack));
            return !self.should_send_ack;
        }
        if self.should_send_feedback {
            let feedback = self.delegate.create_feedback_frame();
            self.should_send_feedback = !self
                .creator
                .add_saved_frame(Frame::CongestionFeedback(feedback));
            return !self.should_send_feedback;
        }
        if self.should_send_stop_waiting {
            let stop_waiting = self.delegate.create_stop_waiting_frame();
            self.should_send_stop_waiting = !self
                .creator
                .add_saved_frame(Frame::StopWaiting(stop_waiting));
            return !self.should_send_stop_waiting;
        }

        let Some(frame) = self.queued_control_frames.front() else {
            error!("add_next_pending_frame called with no queued control frames");
            return true;
        };
        if !self.creator.add_saved_frame(frame.clone()) {
            return false;
        }
        self.queued_control_frames.pop_front();
        true
    }

    /// Drops the next pending frame after it failed to fit into an empty packet.
    fn discard_next_pending_frame(&mut self) {
        let frame_type = if self.should_send_ack {
            self.should_send_ack = false;
            "ack"
        } else if self.should_send_feedback {
            self.should_send_feedback = false;
            "congestion feedback"
        } else if self.should_send_stop_waiting {
            self.should_send_stop_waiting = false;
            "stop waiting"
        } else {
            self.queued_control_frames.pop_front();
            "control"
        };
        error!(frame_type, "frame does not fit into an empty packet, dropping it");
        self.delegate.on_generation_error(Error::FrameDoesNotFit);
    }

    fn maybe_start_fec_protection(&mut self) {
        if !self.creator.is_fec_enabled() {
            return;
        }
        debug!("turning FEC protection on");
        self.should_fec_protect = true;
        if self.creator.is_fec_protected() {
            return;
        }
        if self.has_queued_frames() {
            // Protection can only start at a packet boundary.
            self.send_queued_frames(true);
        }
        if let Err(err) = self.creator.start_fec_protection() {
            self.delegate.on_generation_error(err);
        }
    }

    fn maybe_send_fec_packet_and_close_group(&mut self, force: bool) {
        if !self.creator.is_fec_protected() || self.creator.has_pending_frames() {
            return;
        }

        if self.creator.should_send_fec(force) {
            let fec = self.creator.serialize_fec();
            self.dispatch(fec);
        }

        // Frames still pending in the generator do not keep protection on.
        if !self.should_fec_protect && !self.creator.is_fec_group_open() {
            if let Err(err) = self.creator.stop_fec_protection() {
                self.delegate.on_generation_error(err);
            }
        }
    }

    fn serialize_and_send_packet(&mut self) {
        let packet = self.creator.serialize_packet();
        self.dispatch(packet);
        self.maybe_send_fec_packet_and_close_group(false);
    }

    fn dispatch(&mut self, packet: Result<SerializedPacket>) {
        match packet {
            Ok(packet) => {
                trace!(
                    sequence_number = packet.sequence_number,
                    len = packet.packet.len(),
                    "handing packet to delegate"
                );
                self.delegate.on_serialized_packet(packet);
            }
            Err(err) => self.delegate.on_generation_error(err),
        }
    }

    pub fn stop_sending_version(&mut self) {
        self.creator.stop_sending_version();
    }

    pub fn update_sequence_number_length(
        &mut self,
        least_packet_awaited_by_peer: PacketSequenceNumber,
        congestion_window: ByteCount,
    ) {
        self.creator
            .update_sequence_number_length(least_packet_awaited_by_peer, congestion_window);
    }

    /// Retransmits `frames` with the sequence number length they were first sent with.
    /// 使用首次发送时的序列号长度重传 `frames`。
    pub fn reserialize_all_frames(
        &mut self,
        frames: Vec<Frame>,
        original_length: SequenceNumberLength,
    ) -> Result<SerializedPacket> {
        self.creator.reserialize_all_frames(frames, original_length)
    }

    pub fn serialize_version_negotiation_packet(&self, supported_versions: &[u32]) -> Result<Bytes> {
        self.creator
            .serialize_version_negotiation_packet(supported_versions)
    }

    pub fn sequence_number(&self) -> PacketSequenceNumber {
        self.creator.sequence_number()
    }

    pub fn max_packet_length(&self) -> usize {
        self.creator.max_packet_length()
    }

    pub fn set_max_packet_length(&mut self, length: usize) {
        self.creator.set_max_packet_length(length);
    }

    pub fn creator(&self) -> &PacketCreator {
        &self.creator
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    pub fn delegate_mut(&mut self) -> &mut D {
        &mut self.delegate
    }
}
