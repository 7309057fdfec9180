#![deny(clippy::expect_used, clippy::unwrap_used)]

//! QUIC packet framing and transmission pacing.
//! QUIC 包组帧与发送节奏控制。
//!
//! The [`creator::PacketCreator`] decides which frames go into a packet and
//! serializes it; the [`congestion::pacing::PacingSender`] decides when a
//! packet may leave the host.
//!
//! [`creator::PacketCreator`] 决定哪些帧进入一个包并将其序列化；
//! [`congestion::pacing::PacingSender`] 决定包何时可以离开主机。

pub mod clock;
pub mod config;
pub mod error;
pub mod packet;
pub mod random;

pub mod congestion;
pub mod creator;
pub mod generator;
