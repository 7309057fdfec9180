//! 定义了ACK帧及其NACK范围的编码逻辑。
//! Defines the ACK frame and the encoding of its NACK ranges.

use super::{PacketSequenceNumber, SequenceNumberLength};
use crate::error::{Error, Result};
use bytes::{Buf, BufMut};
use std::collections::BTreeSet;
use std::time::Duration;

pub(crate) const ACK_FRAME_TYPE: u8 = 0x40;
const ACK_TRUNCATED_FLAG: u8 = 0x20;
const ACK_HAS_NACKS_FLAG: u8 = 0x10;
const ACK_LARGEST_OBSERVED_SHIFT: u8 = 2;

const ENTROPY_HASH_SIZE: usize = 1;
const DELTA_TIME_SIZE: usize = 2;
const NUM_RANGES_SIZE: usize = 1;
const RANGE_LENGTH_SIZE: usize = 1;
const MAX_NACK_RANGES: usize = u8::MAX as usize;

/// Acknowledges every packet up to `largest_observed` except those listed as missing.
///
/// 确认直到 `largest_observed` 的所有包，列为缺失的包除外。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AckFrame {
    /// Hash of the entropy bits of all packets received up to `largest_observed`.
    /// 直到 `largest_observed` 收到的所有包的熵位哈希。
    pub entropy_hash: u8,
    pub largest_observed: PacketSequenceNumber,
    /// Time spent between receiving `largest_observed` and sending this ACK.
    /// Carried with millisecond precision.
    /// 从收到 `largest_observed` 到发送此ACK之间的时间，以毫秒精度携带。
    pub delta_time_largest_observed: Duration,
    /// Packets below `largest_observed` that have not arrived.
    /// 低于 `largest_observed` 但尚未到达的包。
    pub missing_packets: BTreeSet<PacketSequenceNumber>,
    /// Set when the sender could not fit all NACK ranges.
    /// 当发送方无法容纳所有NACK范围时设置。
    pub is_truncated: bool,
}

/// A run of consecutive missing packets, highest first.
/// 一段连续缺失的包，最高者在前。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NackRange {
    /// The highest missing sequence number of the run.
    highest: PacketSequenceNumber,
    /// The number of missing packets in the run, minus one.
    run_length: u8,
}

impl NackRange {
    fn lowest(&self) -> PacketSequenceNumber {
        self.highest - self.run_length as u64
    }
}

impl AckFrame {
    /// Splits the missing packets into ranges of at most 256 packets, highest first.
    /// 将缺失的包拆分为最多256个包的范围，最高者在前。
    fn nack_ranges(&self) -> Vec<NackRange> {
        let mut ranges = Vec::new();
        let mut iter = self.missing_packets.iter().rev();
        let Some(&first) = iter.next() else {
            return ranges;
        };
        let mut current = NackRange {
            highest: first,
            run_length: 0,
        };
        for &seq in iter {
            if seq + 1 == current.lowest() && current.run_length < u8::MAX {
                current.run_length += 1;
            } else {
                ranges.push(current);
                current = NackRange {
                    highest: seq,
                    run_length: 0,
                };
            }
        }
        ranges.push(current);
        ranges
    }

    fn largest_observed_length(&self) -> SequenceNumberLength {
        SequenceNumberLength::min_for(self.largest_observed)
    }

    fn missing_delta_length(&self) -> SequenceNumberLength {
        let smallest = self
            .missing_packets
            .first()
            .copied()
            .unwrap_or(self.largest_observed);
        SequenceNumberLength::min_for(self.largest_observed.saturating_sub(smallest))
    }

    fn fixed_size(&self) -> usize {
        1 + ENTROPY_HASH_SIZE + self.largest_observed_length().bytes() + DELTA_TIME_SIZE
    }

    /// The smallest ACK frame a truncated ACK may shrink to: no room for any range.
    /// 截断的ACK可以缩小到的最小ACK帧：没有任何范围的空间。
    pub fn min_truncated_size() -> usize {
        1 + ENTROPY_HASH_SIZE + SequenceNumberLength::Six.bytes() + DELTA_TIME_SIZE + NUM_RANGES_SIZE
    }

    /// The number of bytes this frame takes when every range fits.
    /// 所有范围都能放下时此帧占用的字节数。
    pub fn encoded_len(&self) -> usize {
        let ranges = self.nack_ranges().len().min(MAX_NACK_RANGES);
        if self.missing_packets.is_empty() {
            return self.fixed_size();
        }
        self.fixed_size()
            + NUM_RANGES_SIZE
            + ranges * (self.missing_delta_length().bytes() + RANGE_LENGTH_SIZE)
    }

    /// Encodes the frame, dropping the highest NACK ranges if `budget` is too small.
    ///
    /// A truncated ACK lowers its largest observed packet below the first dropped
    /// range so that no missing packet is ever reported as received.
    ///
    /// 编码此帧，如果 `budget` 太小则丢弃最高的NACK范围。
    /// 截断的ACK会把最大观测包降到第一个被丢弃范围之下，从而不会把任何缺失的包报告为已收到。
    pub(crate) fn encode<B: BufMut>(&self, buf: &mut B, budget: usize) -> Result<usize> {
        let ranges = self.nack_ranges();
        let largest_length = self.largest_observed_length();
        let delta_length = self.missing_delta_length();
        let per_range = delta_length.bytes() + RANGE_LENGTH_SIZE;
        let fixed = self.fixed_size();

        let mut count = ranges.len().min(MAX_NACK_RANGES);
        if !ranges.is_empty() {
            let room = budget.saturating_sub(fixed + NUM_RANGES_SIZE) / per_range;
            count = count.min(room);
        }
        let truncated = self.is_truncated || count < ranges.len();
        let size = if ranges.is_empty() {
            fixed
        } else {
            fixed + NUM_RANGES_SIZE + count * per_range
        };
        if size > budget {
            return Err(Error::PacketTooLarge {
                size,
                limit: budget,
            });
        }

        let skipped = ranges.len() - count;
        let largest_observed = if skipped > 0 {
            ranges[skipped - 1].lowest().saturating_sub(1)
        } else {
            self.largest_observed
        };

        let mut type_byte = ACK_FRAME_TYPE
            | (largest_length.wire_code() << ACK_LARGEST_OBSERVED_SHIFT)
            | delta_length.wire_code();
        if truncated {
            type_byte |= ACK_TRUNCATED_FLAG;
        }
        if !ranges.is_empty() {
            type_byte |= ACK_HAS_NACKS_FLAG;
        }
        buf.put_u8(type_byte);
        buf.put_u8(self.entropy_hash);
        buf.put_uint(largest_observed, largest_length.bytes());
        let delta_ms = self
            .delta_time_largest_observed
            .as_millis()
            .min(u16::MAX as u128) as u16;
        buf.put_u16(delta_ms);
        if !ranges.is_empty() {
            buf.put_u8(count as u8);
            for range in &ranges[skipped..] {
                buf.put_uint(largest_observed - range.highest, delta_length.bytes());
                buf.put_u8(range.run_length);
            }
        }
        Ok(size)
    }

    /// Decodes an ACK frame whose type byte has already been read.
    /// 解码一个类型字节已被读取的ACK帧。
    pub(crate) fn decode(type_byte: u8, cursor: &mut &[u8]) -> Result<Self> {
        let largest_length =
            SequenceNumberLength::from_wire_code(type_byte >> ACK_LARGEST_OBSERVED_SHIFT);
        let delta_length = SequenceNumberLength::from_wire_code(type_byte);
        if cursor.remaining() < ENTROPY_HASH_SIZE + largest_length.bytes() + DELTA_TIME_SIZE {
            return Err(Error::Truncated);
        }
        let entropy_hash = cursor.get_u8();
        let largest_observed = cursor.get_uint(largest_length.bytes());
        let delta_time_largest_observed = Duration::from_millis(cursor.get_u16() as u64);

        let mut missing_packets = BTreeSet::new();
        if type_byte & ACK_HAS_NACKS_FLAG != 0 {
            if cursor.remaining() < NUM_RANGES_SIZE {
                return Err(Error::Truncated);
            }
            let count = cursor.get_u8() as usize;
            let per_range = delta_length.bytes() + RANGE_LENGTH_SIZE;
            if cursor.remaining() < count * per_range {
                return Err(Error::Truncated);
            }
            for _ in 0..count {
                let delta = cursor.get_uint(delta_length.bytes());
                let run_length = cursor.get_u8() as u64;
                let highest = largest_observed
                    .checked_sub(delta)
                    .ok_or(Error::InvalidPacket)?;
                let lowest = highest.checked_sub(run_length).ok_or(Error::InvalidPacket)?;
                missing_packets.extend(lowest..=highest);
            }
        }

        Ok(AckFrame {
            entropy_hash,
            largest_observed,
            delta_time_largest_observed,
            missing_packets,
            is_truncated: type_byte & ACK_TRUNCATED_FLAG != 0,
        })
    }
}
