//! tests/common/harness.rs
use bytes::Bytes;
use quic_transmit::clock::{Clock, SystemClock};
use quic_transmit::config::{Config, Perspective};
use quic_transmit::congestion::pacing::PacingSender;
use quic_transmit::congestion::{
    Bandwidth, CongestionControl, CongestionSample, HasRetransmittableData, INFINITE_DELAY,
};
use quic_transmit::creator::SerializedPacket;
use quic_transmit::error::Error;
use quic_transmit::generator::{FecProtection, GeneratorDelegate, PacketGenerator};
use quic_transmit::packet::ack::AckFrame;
use quic_transmit::packet::frame::{CongestionFeedbackFrame, Frame, StopWaitingFrame};
use quic_transmit::packet::framer::{DecodedPacket, Framer};
use quic_transmit::packet::{ByteCount, PacketSequenceNumber, QUIC_VERSION, StreamId};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Once;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter =
            std::env::var("RUST_LOG").unwrap_or_else(|_| "quic_transmit=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// A controller with a fixed window and rate. Window growth is not under test.
pub struct FixedRateController {
    pub rate: Bandwidth,
    pub window: ByteCount,
}

impl CongestionControl for FixedRateController {
    fn time_until_send(
        &mut self,
        _now: Instant,
        bytes_in_flight: ByteCount,
        _has_retransmittable_data: HasRetransmittableData,
    ) -> Duration {
        if bytes_in_flight >= self.window {
            INFINITE_DELAY
        } else {
            Duration::ZERO
        }
    }

    fn pacing_rate(&self) -> Bandwidth {
        self.rate
    }

    fn on_packet_sent(
        &mut self,
        _sent_time: Instant,
        _bytes_in_flight: ByteCount,
        _sequence_number: PacketSequenceNumber,
        _bytes: ByteCount,
        has_retransmittable_data: HasRetransmittableData,
    ) -> bool {
        has_retransmittable_data == HasRetransmittableData::Yes
    }

    fn on_congestion_event(
        &mut self,
        _rtt_updated: bool,
        _bytes_in_flight: ByteCount,
        _acked_packets: &[CongestionSample],
        _lost_packets: &[CongestionSample],
    ) {
    }

    fn congestion_window(&self) -> ByteCount {
        self.window
    }
}

pub struct SentPacket {
    pub sent_time: Instant,
    pub packet: SerializedPacket,
}

/// The connection side of a generator: asks the pacer before every packet and
/// records what leaves.
pub struct PacedConnection {
    clock: SystemClock,
    pub pacing: PacingSender<FixedRateController>,
    pub bytes_in_flight: ByteCount,
    pub sent: Vec<SentPacket>,
    pub errors: Vec<Error>,
}

impl PacedConnection {
    pub fn new(controller: FixedRateController, config: &Config) -> Self {
        Self {
            clock: SystemClock,
            pacing: PacingSender::new(controller, &config.pacing),
            bytes_in_flight: 0,
            sent: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn time_until_send(&mut self) -> Duration {
        self.pacing.time_until_send(
            self.clock.now(),
            self.bytes_in_flight,
            HasRetransmittableData::Yes,
        )
    }

    /// Acknowledges everything sent so far with a fresh RTT sample.
    pub fn ack_all(&mut self) {
        let acked: Vec<CongestionSample> = self
            .sent
            .iter()
            .map(|sent| CongestionSample {
                sequence_number: sent.packet.sequence_number,
                bytes: sent.packet.packet.len() as ByteCount,
            })
            .collect();
        self.bytes_in_flight = 0;
        self.pacing.on_congestion_event(true, 0, &acked, &[]);
    }
}

impl GeneratorDelegate for PacedConnection {
    fn should_generate_packet(
        &mut self,
        has_retransmittable_data: HasRetransmittableData,
        _is_handshake: bool,
    ) -> bool {
        self.pacing
            .time_until_send(self.clock.now(), self.bytes_in_flight, has_retransmittable_data)
            .is_zero()
    }

    fn create_ack_frame(&mut self) -> AckFrame {
        AckFrame::default()
    }

    fn create_feedback_frame(&mut self) -> CongestionFeedbackFrame {
        CongestionFeedbackFrame { receive_window: 0 }
    }

    fn create_stop_waiting_frame(&mut self) -> StopWaitingFrame {
        StopWaitingFrame {
            entropy_hash: 0,
            least_unacked: 1,
        }
    }

    fn on_serialized_packet(&mut self, packet: SerializedPacket) {
        let now = self.clock.now();
        let bytes = packet.packet.len() as ByteCount;
        let has_retransmittable_data = if packet.retransmittable_frames.is_some() {
            HasRetransmittableData::Yes
        } else {
            HasRetransmittableData::No
        };
        if self.pacing.on_packet_sent(
            now,
            self.bytes_in_flight,
            packet.sequence_number,
            bytes,
            has_retransmittable_data,
        ) {
            self.bytes_in_flight += bytes;
        }
        self.sent.push(SentPacket {
            sent_time: now,
            packet,
        });
    }

    fn on_generation_error(&mut self, error: Error) {
        self.errors.push(error);
    }
}

pub fn new_generator(
    controller: FixedRateController,
    config: &Config,
) -> PacketGenerator<PacedConnection> {
    PacketGenerator::new(
        0x0102_0304_0506_0708,
        config,
        Box::new(StdRng::seed_from_u64(42)),
        PacedConnection::new(controller, config),
    )
}

/// Writes all of `data` to the stream, sleeping whenever the pacer says so.
pub async fn write_all(
    generator: &mut PacketGenerator<PacedConnection>,
    stream_id: StreamId,
    data: Bytes,
) {
    let mut written = 0;
    while written < data.len() {
        let consumed = generator.consume_data(
            stream_id,
            data.slice(written..),
            written as u64,
            true,
            FecProtection::MayFecProtect,
        );
        written += consumed.bytes_consumed;
        if written < data.len() {
            let delay = generator.delegate_mut().time_until_send();
            assert_ne!(delay, INFINITE_DELAY, "window should never block");
            debug!(written, delay_us = delay.as_micros() as u64, "waiting for pacer");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Decodes the stream frames of every sent packet and joins their data.
pub fn reassemble(sent: &[SentPacket], stream_id: StreamId) -> Vec<u8> {
    let mut framer = Framer::new(QUIC_VERSION, Perspective::Server, 12);
    let mut data = Vec::new();
    for sent in sent {
        let decoded = framer
            .decode_packet(&sent.packet.packet)
            .expect("decode should succeed");
        let DecodedPacket::Data { frames, .. } = decoded else {
            panic!("expected a data packet");
        };
        for frame in frames {
            if let Frame::Stream(stream) = frame {
                if stream.stream_id == stream_id {
                    assert_eq!(stream.offset, data.len() as u64, "stream data out of order");
                    data.extend_from_slice(&stream.data);
                }
            }
        }
    }
    data
}
