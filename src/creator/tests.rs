//! Tests for the packet creator.
use super::{PacketCreator, SerializedPacket};
use crate::config::{Config, Perspective};
use crate::error::Error;
use crate::packet::ack::AckFrame;
use crate::packet::fec::FecGroup;
use crate::packet::frame::{
    BlockedFrame, ConnectionCloseFrame, Frame, StopWaitingFrame, StreamFrame,
};
use crate::packet::framer::{DecodedPacket, Framer};
use crate::packet::header::packet_header_size;
use crate::packet::{
    CRYPTO_STREAM_ID, ConnectionIdLength, InFecGroup, PacketSequenceNumber, QUIC_VERSION,
    SequenceNumberLength,
};
use bytes::Bytes;
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeSet;

fn client_config() -> Config {
    Config::default()
}

fn fec_config() -> Config {
    let mut config = Config::default();
    config.packet.max_packets_per_fec_group = 2;
    config
}

fn new_creator(config: &Config) -> PacketCreator {
    PacketCreator::new(0x0102_0304_0506_0708, config, Box::new(StdRng::seed_from_u64(1)))
}

fn stream(stream_id: u32, data: &'static [u8]) -> Frame {
    Frame::Stream(StreamFrame {
        stream_id,
        fin: false,
        offset: 0,
        data: Bytes::from_static(data),
    })
}

fn decode(packet: &SerializedPacket) -> DecodedPacket {
    let mut framer = Framer::new(QUIC_VERSION, Perspective::Server, 12);
    framer.decode_packet(&packet.packet).expect("decode should succeed")
}

fn decoded_frames(packet: &SerializedPacket) -> Vec<Frame> {
    match decode(packet) {
        DecodedPacket::Data { frames, .. } => frames,
        other => panic!("expected a data packet, got {other:?}"),
    }
}

#[test]
fn test_serialize_frames() {
    let mut creator = new_creator(&client_config());
    let ack = Frame::Ack(AckFrame {
        largest_observed: 10,
        ..Default::default()
    });
    assert!(creator.add_saved_frame(ack.clone()));
    assert!(creator.add_saved_frame(stream(3, b"hello")));
    let predicted = creator.packet_size();

    let packet = creator.serialize_packet().expect("serialize");
    assert_eq!(packet.sequence_number, 1);
    assert_eq!(packet.sequence_number_length, SequenceNumberLength::One);
    assert_eq!(packet.packet.len(), predicted);
    assert_eq!(decoded_frames(&packet), vec![ack, stream(3, b"hello")]);
}

#[test]
fn test_serialize_empty_packet_is_refused() {
    let mut creator = new_creator(&client_config());
    assert_eq!(creator.serialize_packet().err(), Some(Error::EmptyPacket));
    assert_eq!(
        creator.serialize_all_frames(Vec::new()).err(),
        Some(Error::EmptyPacket)
    );
}

#[test]
fn test_bytes_free_shrinks_then_resets() {
    let mut creator = new_creator(&client_config());
    let max_free = creator.max_plaintext_size()
        - packet_header_size(
            ConnectionIdLength::Eight,
            true,
            SequenceNumberLength::One,
            InFecGroup::NotInFecGroup,
        );
    assert_eq!(creator.bytes_free(), max_free);

    let mut last = creator.bytes_free();
    for frame in [stream(3, b"abc"), Frame::Ping, stream(5, b"defgh")] {
        assert!(creator.add_saved_frame(frame));
        assert!(creator.bytes_free() < last);
        last = creator.bytes_free();
    }
    creator.serialize_packet().expect("serialize");
    assert_eq!(creator.bytes_free(), max_free);
}

#[test]
fn test_trailing_stream_frame_expansion_is_charged() {
    let mut creator = new_creator(&client_config());
    assert!(creator.add_saved_frame(stream(3, b"abc")));
    let before = creator.packet_size();
    assert!(creator.add_saved_frame(Frame::Ping));
    // The stream frame gains a length field plus the ping byte.
    assert_eq!(creator.packet_size(), before + 2 + 1);
    let packet = creator.serialize_packet().expect("serialize");
    assert_eq!(packet.packet.len(), before + 3);
}

#[test]
fn test_retransmittable_frames_are_handed_back() {
    let mut creator = new_creator(&client_config());
    assert!(creator.add_saved_frame(Frame::Ack(AckFrame::default())));
    assert!(!creator.has_pending_retransmittable_frames());
    assert!(creator.add_saved_frame(stream(5, b"payload")));
    assert!(creator.add_frame(Frame::Ping, false));
    assert!(creator.has_pending_retransmittable_frames());

    let packet = creator.serialize_packet().expect("serialize");
    let retransmittable = packet
        .retransmittable_frames
        .expect("stream frame is retransmittable");
    assert_eq!(retransmittable.frames, vec![stream(5, b"payload")]);
    assert!(!retransmittable.has_crypto_handshake);
    assert!(!creator.has_pending_retransmittable_frames());
}

#[test]
fn test_handshake_packet_is_padded() {
    let mut creator = new_creator(&client_config());
    let (frame, consumed) =
        creator.create_stream_frame(CRYPTO_STREAM_ID, Bytes::from_static(b"CHLO"), 0, false);
    assert_eq!(consumed, 4);
    assert!(creator.add_saved_frame(frame));

    let packet = creator.serialize_packet().expect("serialize");
    assert_eq!(packet.packet.len(), creator.max_plaintext_size());
    let frames = decoded_frames(&packet);
    assert_eq!(frames.last(), Some(&Frame::Padding));
    let retransmittable = packet.retransmittable_frames.expect("handshake data");
    assert!(retransmittable.has_crypto_handshake);
}

#[test]
fn test_non_handshake_packet_is_not_padded() {
    let mut creator = new_creator(&client_config());
    assert!(creator.add_saved_frame(stream(3, b"data")));
    let packet = creator.serialize_packet().expect("serialize");
    assert!(packet.packet.len() < creator.max_plaintext_size());
    assert_eq!(decoded_frames(&packet), vec![stream(3, b"data")]);
}

#[test]
fn test_padding_is_refused_when_packet_is_full() {
    let mut creator = new_creator(&client_config());
    let data = Bytes::from(vec![7u8; 4000]);
    let (frame, consumed) = creator.create_stream_frame(3, data, 0, true);
    assert!(consumed > 0 && consumed < 4000);
    let Frame::Stream(stream_frame) = &frame else {
        panic!("expected a stream frame");
    };
    assert!(!stream_frame.fin, "fin only goes with the last byte");
    assert!(creator.add_saved_frame(frame));
    assert_eq!(creator.bytes_free(), 0);

    assert!(!creator.add_frame(Frame::Padding, false));
    let packet = creator.serialize_packet().expect("serialize");
    assert_eq!(packet.packet.len(), creator.max_plaintext_size());
}

#[test]
fn test_create_stream_frame_fin_handling() {
    let mut creator = new_creator(&client_config());

    let (frame, consumed) = creator.create_stream_frame(5, Bytes::new(), 100, true);
    assert_eq!(consumed, 0);
    assert_eq!(
        frame,
        Frame::Stream(StreamFrame {
            stream_id: 5,
            fin: true,
            offset: 100,
            data: Bytes::new(),
        })
    );

    let (frame, consumed) =
        creator.create_stream_frame(5, Bytes::from_static(b"all of it"), 0, true);
    assert_eq!(consumed, 9);
    assert!(matches!(frame, Frame::Stream(StreamFrame { fin: true, .. })));
}

/// An ACK with more NACK ranges than any packet can hold.
fn oversized_ack() -> AckFrame {
    AckFrame {
        largest_observed: 1 << 40,
        missing_packets: (1..600).step_by(2).collect(),
        ..Default::default()
    }
}

#[test]
fn test_lone_ack_is_truncated_to_fit() {
    let mut creator = new_creator(&client_config());
    let ack = oversized_ack();
    assert!(ack.encoded_len() > creator.bytes_free());
    assert!(creator.add_saved_frame(Frame::Ack(ack)));
    assert_eq!(creator.bytes_free(), 0);

    let packet = creator.serialize_packet().expect("serialize");
    assert!(packet.packet.len() <= creator.max_plaintext_size());
    assert!(packet.retransmittable_frames.is_none());
    match decoded_frames(&packet).as_slice() {
        [Frame::Ack(decoded)] => {
            assert!(decoded.is_truncated);
            assert!(decoded.largest_observed < 1 << 40);
            assert!(decoded.missing_packets.contains(&1));
        }
        other => panic!("expected a lone ACK, got {other:?}"),
    }
}

#[test]
fn test_ack_after_other_frames_is_not_truncated() {
    let mut creator = new_creator(&client_config());
    assert!(creator.add_saved_frame(Frame::Ping));
    assert!(!creator.add_saved_frame(Frame::Ack(oversized_ack())));
}

#[test]
fn test_start_fec_protection_preconditions() {
    let mut creator = new_creator(&client_config());
    assert_eq!(creator.start_fec_protection(), Err(Error::FecNotEnabled));
    assert!(!creator.is_fec_protected());

    let mut creator = new_creator(&fec_config());
    assert!(creator.add_saved_frame(Frame::Ping));
    assert_eq!(creator.start_fec_protection(), Err(Error::PendingFrames));
    creator.serialize_packet().expect("serialize");
    assert_eq!(creator.start_fec_protection(), Ok(()));
    assert!(creator.is_fec_protected());
}

#[test]
fn test_serialize_fec_without_group_is_refused() {
    let mut creator = new_creator(&fec_config());
    assert_eq!(creator.serialize_fec().err(), Some(Error::NoFecGroup));
}

#[test]
fn test_fec_group_lifecycle() {
    let mut creator = new_creator(&fec_config());
    creator.start_fec_protection().expect("fec enabled");

    assert!(creator.add_saved_frame(stream(3, b"first payload")));
    let first = creator.serialize_packet().expect("serialize");
    assert!(creator.is_fec_group_open());
    assert!(!creator.should_send_fec(false));
    assert!(creator.should_send_fec(true));
    assert_eq!(creator.stop_fec_protection(), Err(Error::FecGroupOpen));

    assert!(creator.add_saved_frame(stream(3, b"second")));
    let second = creator.serialize_packet().expect("serialize");
    assert!(creator.should_send_fec(false));

    let fec_packet = creator.serialize_fec().expect("group has packets");
    assert_eq!(fec_packet.sequence_number, 3);
    assert!(fec_packet.retransmittable_frames.is_none());
    assert!(!creator.is_fec_group_open());
    assert_eq!(creator.stop_fec_protection(), Ok(()));

    let header_len = packet_header_size(
        ConnectionIdLength::Eight,
        true,
        SequenceNumberLength::One,
        InFecGroup::InFecGroup,
    );
    let fec = match decode(&fec_packet) {
        DecodedPacket::Fec { header, fec } => {
            assert_eq!(header.fec_group, 1);
            fec
        }
        other => panic!("expected an FEC packet, got {other:?}"),
    };
    assert_eq!(fec.fec_group, 1);

    // The receiver lost the first packet and revives it from the parity.
    let mut receiver = FecGroup::new();
    assert!(receiver.update(2, &second.packet[header_len..]));
    assert!(receiver.update_fec(3, &fec));
    let (revived_seq, revived) = receiver.revive().expect("one packet missing");
    assert_eq!(revived_seq, 1);
    let lost = &first.packet[header_len..];
    assert_eq!(&revived[..lost.len()], lost);
}

#[test]
fn test_sequence_number_length_is_frozen_within_fec_group() {
    let mut creator = new_creator(&fec_config());
    creator.start_fec_protection().expect("fec enabled");

    assert!(creator.add_saved_frame(Frame::Ping));
    creator.update_sequence_number_length(1, 1350 * 100);
    assert_eq!(
        creator.next_sequence_number_length(),
        SequenceNumberLength::Two
    );
    let first = creator.serialize_packet().expect("serialize");
    assert!(creator.add_saved_frame(Frame::Ping));
    let second = creator.serialize_packet().expect("serialize");
    let fec = creator.serialize_fec().expect("serialize fec");
    assert_eq!(first.sequence_number_length, SequenceNumberLength::One);
    assert_eq!(second.sequence_number_length, SequenceNumberLength::One);
    assert_eq!(fec.sequence_number_length, SequenceNumberLength::One);

    // The new length applies once the next group opens.
    assert!(creator.add_saved_frame(Frame::Ping));
    let third = creator.serialize_packet().expect("serialize");
    assert_eq!(third.sequence_number_length, SequenceNumberLength::Two);
}

#[test]
fn test_update_sequence_number_length_least_awaiting() {
    let mut creator = new_creator(&client_config());
    let max_packet_length = creator.max_packet_length() as u64;

    creator.set_sequence_number(64);
    creator.update_sequence_number_length(2, 10 * max_packet_length);
    assert_eq!(creator.next_sequence_number_length(), SequenceNumberLength::One);

    creator.set_sequence_number(64 * 256);
    creator.update_sequence_number_length(2, 10 * max_packet_length);
    assert_eq!(creator.next_sequence_number_length(), SequenceNumberLength::Two);

    creator.set_sequence_number(64 * 256 * 256);
    creator.update_sequence_number_length(2, 10 * max_packet_length);
    assert_eq!(creator.next_sequence_number_length(), SequenceNumberLength::Four);

    creator.set_sequence_number(64 * 256 * 256 * 256 * 256);
    creator.update_sequence_number_length(2, 10 * max_packet_length);
    assert_eq!(creator.next_sequence_number_length(), SequenceNumberLength::Six);

    // Nothing changes until the next packet starts.
    assert_eq!(creator.sequence_number_length(), SequenceNumberLength::One);
}

#[test]
fn test_update_sequence_number_length_congestion_window() {
    let mut creator = new_creator(&client_config());
    let max_packet_length = creator.max_packet_length() as u64;

    creator.update_sequence_number_length(1, 10_000 * max_packet_length);
    assert_eq!(creator.next_sequence_number_length(), SequenceNumberLength::Two);

    creator.update_sequence_number_length(1, 10_000 * 256 * max_packet_length);
    assert_eq!(creator.next_sequence_number_length(), SequenceNumberLength::Four);

    creator.update_sequence_number_length(1, 10 * max_packet_length);
    assert_eq!(creator.next_sequence_number_length(), SequenceNumberLength::One);
}

#[test]
fn test_reserialize_uses_original_length() {
    let mut creator = new_creator(&client_config());
    creator.set_next_sequence_number_length(SequenceNumberLength::Two);

    let packet = creator
        .reserialize_all_frames(vec![stream(3, b"retransmit")], SequenceNumberLength::Four)
        .expect("reserialize");
    assert_eq!(packet.sequence_number_length, SequenceNumberLength::Four);
    assert!(packet.retransmittable_frames.is_none());
    assert_eq!(decoded_frames(&packet), vec![stream(3, b"retransmit")]);

    assert_eq!(creator.next_sequence_number_length(), SequenceNumberLength::Two);
    assert!(creator.add_saved_frame(Frame::Ping));
    let next = creator.serialize_packet().expect("serialize");
    assert_eq!(next.sequence_number_length, SequenceNumberLength::Two);
}

#[test]
fn test_serialize_all_frames_rejects_oversized_frames() {
    let mut creator = new_creator(&client_config());
    let big = Frame::Stream(StreamFrame {
        stream_id: 3,
        fin: false,
        offset: 0,
        data: Bytes::from(vec![0u8; 2000]),
    });
    assert_eq!(
        creator.serialize_all_frames(vec![big]).err(),
        Some(Error::FrameDoesNotFit)
    );
    assert!(!creator.has_pending_frames());
}

#[test]
fn test_serialize_connection_close() {
    let mut creator = new_creator(&client_config());
    let close = ConnectionCloseFrame {
        error_code: 7,
        error_details: "peer went away".to_string(),
    };
    let packet = creator
        .serialize_connection_close(close.clone())
        .expect("serialize");
    assert_eq!(decoded_frames(&packet), vec![Frame::ConnectionClose(close)]);
}

#[test]
fn test_version_negotiation_is_server_only() {
    let client = new_creator(&client_config());
    assert_eq!(
        client.serialize_version_negotiation_packet(&[QUIC_VERSION]),
        Err(Error::NotServer)
    );

    let mut config = client_config();
    config.perspective = Perspective::Server;
    let server = new_creator(&config);
    let packet = server
        .serialize_version_negotiation_packet(&[QUIC_VERSION])
        .expect("server builds version negotiation");
    let mut framer = Framer::new(QUIC_VERSION, Perspective::Client, 12);
    assert_eq!(
        framer.decode_packet(&packet).expect("decode"),
        DecodedPacket::VersionNegotiation {
            connection_id: 0x0102_0304_0506_0708,
            versions: vec![QUIC_VERSION],
        }
    );
}

#[test]
fn test_stop_sending_version_shrinks_open_packet() {
    let mut creator = new_creator(&client_config());
    assert!(creator.add_saved_frame(stream(3, b"data")));
    let with_version = creator.packet_size();
    creator.stop_sending_version();
    assert_eq!(creator.packet_size(), with_version - 4);

    let packet = creator.serialize_packet().expect("serialize");
    assert_eq!(packet.packet.len(), with_version - 4);
    match decode(&packet) {
        DecodedPacket::Data { header, .. } => assert!(!header.public_header.version_flag),
        other => panic!("expected a data packet, got {other:?}"),
    }
}

#[test]
fn test_has_room_for_stream_frame() {
    let mut creator = new_creator(&client_config());
    assert!(creator.has_room_for_stream_frame(3, 0));
    let (frame, _) = creator.create_stream_frame(3, Bytes::from(vec![1u8; 4000]), 0, false);
    assert!(creator.add_saved_frame(frame));
    assert!(!creator.has_room_for_stream_frame(3, 0));
}

#[derive(Debug, Clone)]
enum Op {
    Stream(u32, usize),
    Ping,
    Blocked(u32),
    Ack(PacketSequenceNumber, BTreeSet<PacketSequenceNumber>),
    StopWaiting(u8),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        // Stream 1 carries the handshake and would be padded.
        (2u32..1000, 0usize..700).prop_map(|(id, len)| Op::Stream(id, len)),
        Just(Op::Ping),
        any::<u32>().prop_map(Op::Blocked),
        (2000u64..1 << 40, proptest::collection::btree_set(1u64..2000, 0..200))
            .prop_map(|(largest, deltas)| Op::Ack(largest, deltas)),
        any::<u8>().prop_map(Op::StopWaiting),
    ]
}

fn op_frame(op: Op) -> Frame {
    match op {
        Op::Stream(stream_id, len) => Frame::Stream(StreamFrame {
            stream_id,
            fin: false,
            offset: 0,
            data: Bytes::from(vec![0xaa; len]),
        }),
        Op::Ping => Frame::Ping,
        Op::Blocked(stream_id) => Frame::Blocked(BlockedFrame { stream_id }),
        Op::Ack(largest_observed, deltas) => Frame::Ack(AckFrame {
            entropy_hash: 0x5a,
            largest_observed,
            missing_packets: deltas.into_iter().map(|delta| largest_observed - delta).collect(),
            ..Default::default()
        }),
        // The first packet of a connection is number 1.
        Op::StopWaiting(entropy_hash) => Frame::StopWaiting(StopWaitingFrame {
            entropy_hash,
            least_unacked: 1,
        }),
    }
}

proptest! {
    #[test]
    fn prop_predicted_size_matches_serialized_packet(
        ops in proptest::collection::vec(arb_op(), 1..12),
        max_packet_length in 80usize..=1350,
        fec_protect in any::<bool>(),
    ) {
        let mut config = fec_config();
        config.packet.max_packet_length = max_packet_length;
        let mut creator = new_creator(&config);
        if fec_protect {
            prop_assert_eq!(creator.start_fec_protection(), Ok(()));
        }

        let mut added = Vec::new();
        for op in ops {
            let frame = op_frame(op);
            let before = creator.bytes_free();
            if creator.add_saved_frame(frame.clone()) {
                prop_assert!(creator.bytes_free() <= before);
                added.push(frame);
            } else {
                prop_assert_eq!(creator.bytes_free(), before);
            }
        }
        prop_assume!(!added.is_empty());

        let predicted = creator.packet_size();
        prop_assert!(predicted <= creator.max_plaintext_size());
        let packet = creator.serialize_packet().expect("serialize");
        let frames = match decode(&packet) {
            DecodedPacket::Data { header, frames } => {
                prop_assert_eq!(header.is_in_fec_group.is_in_group(), fec_protect);
                frames
            }
            other => panic!("expected a data packet, got {other:?}"),
        };

        let in_fec_group = if fec_protect {
            InFecGroup::InFecGroup
        } else {
            InFecGroup::NotInFecGroup
        };
        let header_len = packet_header_size(
            ConnectionIdLength::Eight,
            true,
            SequenceNumberLength::One,
            in_fec_group,
        );
        match added.as_slice() {
            // A lone ACK that did not fit was truncated to the free space.
            [Frame::Ack(ack)] if header_len + ack.encoded_len() > predicted => {
                prop_assert_eq!(predicted, creator.max_plaintext_size());
                prop_assert!(packet.packet.len() <= predicted);
                let [Frame::Ack(decoded)] = frames.as_slice() else {
                    panic!("expected a lone ACK, got {frames:?}");
                };
                prop_assert!(decoded.is_truncated);
                prop_assert!(decoded.largest_observed <= ack.largest_observed);
                prop_assert!(decoded.missing_packets.is_subset(&ack.missing_packets));
            }
            _ => {
                prop_assert_eq!(packet.packet.len(), predicted);
                prop_assert_eq!(&frames, &added);
            }
        }

        if fec_protect {
            prop_assert!(creator.should_send_fec(true));
            let fec = creator.serialize_fec().expect("group has a packet");
            prop_assert!(matches!(decode(&fec), DecodedPacket::Fec { .. }), "expected an FEC packet");
        }
    }
}
