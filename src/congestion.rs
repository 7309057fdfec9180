//! Defines the pluggable congestion control interface and the pacing layer
//! stacked on top of it.
//! 定义了可插拔的拥塞控制接口以及叠加在其上的发送节奏层。

use crate::packet::{ByteCount, PacketSequenceNumber};
use std::time::Duration;
use tokio::time::Instant;

pub mod pacing;


/// Returned by [`CongestionControl::time_until_send`] when sending is blocked
/// until some other event (an ACK, a loss) unblocks it.
///
/// 当发送被阻塞、需要等待其他事件（ACK、丢包）解除阻塞时，由
/// [`CongestionControl::time_until_send`] 返回。
pub const INFINITE_DELAY: Duration = Duration::MAX;

/// Whether a packet carries data that would be retransmitted if lost.
/// Packets without such data (pure ACKs) do not count against the window.
///
/// 包是否携带丢失后需要重传的数据。没有此类数据的包（纯ACK）不计入窗口。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HasRetransmittableData {
    Yes,
    No,
}

/// A packet acknowledged or lost in a congestion event.
/// 在一次拥塞事件中被确认或丢失的包。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CongestionSample {
    pub sequence_number: PacketSequenceNumber,
    pub bytes: ByteCount,
}

/// A transfer rate in bytes per second.
///
/// 以每秒字节数表示的传输速率。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Bandwidth {
    bytes_per_second: u64,
}

impl Bandwidth {
    pub const fn zero() -> Self {
        Self {
            bytes_per_second: 0,
        }
    }

    pub const fn from_bytes_per_second(bytes_per_second: u64) -> Self {
        Self { bytes_per_second }
    }

    /// The rate at which `bytes` are moved in `delta`.
    /// 在 `delta` 时间内传输 `bytes` 字节的速率。
    pub fn from_bytes_and_time_delta(bytes: ByteCount, delta: Duration) -> Self {
        let micros = delta.as_micros();
        if micros == 0 {
            return Self::from_bytes_per_second(u64::MAX);
        }
        let bytes_per_second = (bytes as u128 * 1_000_000 / micros).min(u64::MAX as u128);
        Self::from_bytes_per_second(bytes_per_second as u64)
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.bytes_per_second
    }

    pub fn is_zero(&self) -> bool {
        self.bytes_per_second == 0
    }

    /// How long sending `bytes` takes at this rate, in whole microseconds.
    /// A zero rate never delays.
    ///
    /// 以此速率发送 `bytes` 字节所需的时间，精确到整微秒。零速率从不延迟。
    pub fn transfer_time(&self, bytes: ByteCount) -> Duration {
        if self.is_zero() {
            return Duration::ZERO;
        }
        let micros = bytes as u128 * 1_000_000 / self.bytes_per_second as u128;
        Duration::from_micros(micros.min(u64::MAX as u128) as u64)
    }
}

/// A trait for congestion control algorithms.
///
/// The window computation itself lives in the implementor; callers only ask
/// when they may send and report what happened.
///
/// 拥塞控制算法的 trait。
/// 窗口的计算本身由实现者负责；调用方只询问何时可以发送并报告发生了什么。
#[cfg_attr(test, mockall::automock)]
pub trait CongestionControl: Send + 'static {
    /// How long to wait before a packet may be sent. [`Duration::ZERO`] means
    /// now, [`INFINITE_DELAY`] means blocked.
    ///
    /// 包在发送之前需要等待多久。[`Duration::ZERO`] 表示现在，[`INFINITE_DELAY`] 表示被阻塞。
    fn time_until_send(
        &mut self,
        now: Instant,
        bytes_in_flight: ByteCount,
        has_retransmittable_data: HasRetransmittableData,
    ) -> Duration;

    /// The rate packets should be spread out at.
    /// 包应当分散发送的速率。
    fn pacing_rate(&self) -> Bandwidth;

    /// Called after a packet has been sent. Returns whether the packet counts
    /// as in flight.
    ///
    /// 在一个包被发送之后调用。返回该包是否计为在途。
    fn on_packet_sent(
        &mut self,
        sent_time: Instant,
        bytes_in_flight: ByteCount,
        sequence_number: PacketSequenceNumber,
        bytes: ByteCount,
        has_retransmittable_data: HasRetransmittableData,
    ) -> bool;

    /// Called when packets are acknowledged or declared lost.
    ///
    /// 当包被确认或被判定丢失时调用。
    fn on_congestion_event(
        &mut self,
        rtt_updated: bool,
        bytes_in_flight: ByteCount,
        acked_packets: &[CongestionSample],
        lost_packets: &[CongestionSample],
    );

    /// Gets the current congestion window size in bytes.
    ///
    /// 获取当前的拥塞窗口大小（以字节为单位）。
    fn congestion_window(&self) -> ByteCount;
}
