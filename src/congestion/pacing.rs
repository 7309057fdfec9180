//! A congestion controller decorator that spreads packets out over time.
//! 一个将包在时间上分散发送的拥塞控制器装饰器。
//!
//! The wrapped controller decides *whether* the window allows a packet; the
//! pacer decides *when*. A small number of burst tokens let packets leave
//! back-to-back after the connection has been quiescent, and a sender that
//! woke up late is allowed to catch up until it is back on schedule.
//!
//! 被包装的控制器决定窗口*是否*允许发送；节奏器决定*何时*发送。
//! 连接静默之后，少量的突发令牌允许包背靠背地离开；
//! 醒来较晚的发送者可以追赶，直到回到预定的节奏上。

use super::{Bandwidth, CongestionControl, CongestionSample, HasRetransmittableData};
use crate::config::PacingConfig;
use crate::packet::{ByteCount, PacketSequenceNumber};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Wraps a [`CongestionControl`] and paces the packets it would allow.
///
/// 包装一个 [`CongestionControl`] 并对其允许的包进行节奏控制。
#[derive(Debug)]
pub struct PacingSender<C> {
    sender: C,
    alarm_granularity: Duration,
    max_burst_packets: u32,
    /// Pool size used for refills until the first RTT sample, at most `max_burst_packets`.
    /// 出现首个RTT样本之前的令牌池大小，不超过 `max_burst_packets`。
    initial_burst_packets: u32,
    /// Unpaced packets left, refilled every time the connection goes quiescent.
    /// 剩余的不受节奏限制的包数，每次连接进入静默时重新填满。
    burst_tokens: u32,
    has_valid_rtt: bool,
    /// Send time of the first packet of a catch-up run, if one is in progress.
    /// 追赶过程中第一个包的发送时间（如果正在追赶）。
    last_delayed_packet_sent_time: Option<Instant>,
    next_packet_send_time: Option<Instant>,
    was_last_send_delayed: bool,
}

impl<C: CongestionControl> PacingSender<C> {
    pub fn new(sender: C, config: &PacingConfig) -> Self {
        let initial_burst_packets = config.initial_burst_packets.min(config.max_burst_packets);
        Self {
            sender,
            alarm_granularity: config.alarm_granularity,
            max_burst_packets: config.max_burst_packets,
            initial_burst_packets,
            burst_tokens: initial_burst_packets,
            has_valid_rtt: false,
            last_delayed_packet_sent_time: None,
            next_packet_send_time: None,
            was_last_send_delayed: false,
        }
    }

    pub fn sender(&self) -> &C {
        &self.sender
    }

    pub fn sender_mut(&mut self) -> &mut C {
        &mut self.sender
    }

    pub fn into_inner(self) -> C {
        self.sender
    }

    pub fn has_valid_rtt(&self) -> bool {
        self.has_valid_rtt
    }

    /// Unpaced packets currently available. Never more than `max_burst_packets`.
    /// 当前可用的不受节奏限制的包数，不会超过 `max_burst_packets`。
    pub fn available_burst_tokens(&self) -> u32 {
        self.burst_tokens
    }

    fn refill_burst_tokens(&mut self) {
        self.burst_tokens = if self.has_valid_rtt {
            self.max_burst_packets
        } else {
            self.initial_burst_packets
        };
    }

    /// Spends one token. Returns false when none are left.
    fn take_burst_token(&mut self) -> bool {
        if self.burst_tokens == 0 {
            return false;
        }
        self.burst_tokens -= 1;
        true
    }
}

impl<C: CongestionControl> CongestionControl for PacingSender<C> {
    fn time_until_send(
        &mut self,
        now: Instant,
        bytes_in_flight: ByteCount,
        has_retransmittable_data: HasRetransmittableData,
    ) -> Duration {
        let time_until_send =
            self.sender
                .time_until_send(now, bytes_in_flight, has_retransmittable_data);
        if bytes_in_flight == 0 {
            self.refill_burst_tokens();
        }
        if self.available_burst_tokens() > 0 {
            return time_until_send;
        }

        if !time_until_send.is_zero() {
            // Blocked by the window; pacing has nothing to add.
            return time_until_send;
        }
        if has_retransmittable_data == HasRetransmittableData::No {
            return Duration::ZERO;
        }

        match self.next_packet_send_time {
            Some(next) if next > now + self.alarm_granularity => {
                self.was_last_send_delayed = true;
                let delay = next - now;
                trace!(delay_us = delay.as_micros() as u64, "Pacing delays next packet");
                delay
            }
            _ => Duration::ZERO,
        }
    }

    fn pacing_rate(&self) -> Bandwidth {
        self.sender.pacing_rate()
    }

    fn on_packet_sent(
        &mut self,
        sent_time: Instant,
        bytes_in_flight: ByteCount,
        sequence_number: PacketSequenceNumber,
        bytes: ByteCount,
        has_retransmittable_data: HasRetransmittableData,
    ) -> bool {
        let in_flight = self.sender.on_packet_sent(
            sent_time,
            bytes_in_flight,
            sequence_number,
            bytes,
            has_retransmittable_data,
        );
        if has_retransmittable_data == HasRetransmittableData::No {
            return in_flight;
        }

        if self.take_burst_token() {
            self.was_last_send_delayed = false;
            self.last_delayed_packet_sent_time = None;
            self.next_packet_send_time = None;
            return in_flight;
        }

        let delay = self.sender.pacing_rate().transfer_time(bytes);
        if self.was_last_send_delayed {
            let next = self.next_packet_send_time.unwrap_or(sent_time) + delay;
            self.next_packet_send_time = Some(next);
            // A gap longer than one packet's worth means the application had
            // nothing to send, so the debt is forgiven.
            let app_limited = self
                .last_delayed_packet_sent_time
                .is_some_and(|first| sent_time > first + delay);
            let making_up_for_lost_time = next <= sent_time;
            if making_up_for_lost_time && !app_limited {
                if self.last_delayed_packet_sent_time.is_none() {
                    debug!(
                        sequence_number,
                        behind_us = (sent_time - next).as_micros() as u64,
                        "Sender woke up late, catching up"
                    );
                }
                self.last_delayed_packet_sent_time = Some(sent_time);
            } else {
                self.was_last_send_delayed = false;
                self.last_delayed_packet_sent_time = None;
            }
        } else {
            let earliest = (sent_time + delay)
                .checked_sub(self.alarm_granularity)
                .unwrap_or(sent_time);
            let next = match self.next_packet_send_time {
                Some(next) => (next + delay).max(earliest),
                None => earliest,
            };
            self.next_packet_send_time = Some(next);
        }
        in_flight
    }

    fn on_congestion_event(
        &mut self,
        rtt_updated: bool,
        bytes_in_flight: ByteCount,
        acked_packets: &[CongestionSample],
        lost_packets: &[CongestionSample],
    ) {
        if rtt_updated && !self.has_valid_rtt {
            // Tokens already granted stay; later refills use the regular burst size.
            self.has_valid_rtt = true;
            debug!(
                remaining = self.burst_tokens,
                max_burst = self.max_burst_packets,
                "First RTT sample, retiring initial burst allowance"
            );
        }
        self.sender
            .on_congestion_event(rtt_updated, bytes_in_flight, acked_packets, lost_packets);
    }

    fn congestion_window(&self) -> ByteCount {
        self.sender.congestion_window()
    }
}
