//! FEC组：对一组包的载荷做异或校验，以便在丢失单个包时将其恢复。
//! FEC groups: XOR parity over a run of packet payloads, so that a single lost
//! packet can be revived without a retransmission.

use super::{FecGroupNumber, MAX_PACKET_SIZE, PacketSequenceNumber};
use bytes::Bytes;
use std::collections::BTreeSet;
use tracing::warn;

/// The body of a redundancy packet.
/// 冗余包的主体。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FecData {
    /// The first sequence number the parity covers.
    /// 校验覆盖的第一个序列号。
    pub fec_group: FecGroupNumber,
    pub redundancy: Bytes,
}

/// Accumulates the parity of every payload folded into it.
///
/// On the sending side every protected payload goes through [`FecGroup::update`]
/// and the parity is shipped in a redundancy packet. On the receiving side the
/// redundancy packet is folded in with [`FecGroup::update_fec`], after which a
/// single missing payload can be recovered.
///
/// 累积所有折叠进来的载荷的校验值。
///
/// 发送端的每个受保护载荷都经过 [`FecGroup::update`]，校验值随冗余包发出。
/// 接收端用 [`FecGroup::update_fec`] 折叠冗余包，之后就可以恢复单个缺失的载荷。
#[derive(Debug, Default)]
pub struct FecGroup {
    received_packets: BTreeSet<PacketSequenceNumber>,
    /// Known once the redundancy packet has arrived.
    /// 冗余包到达后才可知。
    protected_range: Option<(PacketSequenceNumber, PacketSequenceNumber)>,
    payload_parity: Vec<u8>,
}

impl FecGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a protected payload into the parity. Returns `false` if the packet
    /// was already seen or lies outside the group.
    ///
    /// 将受保护的载荷折叠进校验值。如果包已经见过或不在组内，返回 `false`。
    pub fn update(&mut self, sequence_number: PacketSequenceNumber, payload: &[u8]) -> bool {
        if self.received_packets.contains(&sequence_number) {
            return false;
        }
        if let Some((min, max)) = self.protected_range {
            if sequence_number < min || sequence_number > max {
                warn!(sequence_number, min, max, "FEC group does not cover packet");
                return false;
            }
        }
        if !self.update_parity(payload) {
            return false;
        }
        self.received_packets.insert(sequence_number);
        true
    }

    /// Folds in the redundancy carried by the FEC packet `fec_sequence_number`.
    ///
    /// 折叠序列号为 `fec_sequence_number` 的FEC包所携带的冗余数据。
    pub fn update_fec(&mut self, fec_sequence_number: PacketSequenceNumber, fec: &FecData) -> bool {
        if self.protected_range.is_some() || fec_sequence_number <= fec.fec_group {
            return false;
        }
        if self
            .received_packets
            .iter()
            .any(|&seq| seq < fec.fec_group || seq >= fec_sequence_number)
        {
            return false;
        }
        if !self.update_parity(&fec.redundancy) {
            return false;
        }
        self.protected_range = Some((fec.fec_group, fec_sequence_number - 1));
        true
    }

    fn num_missing_packets(&self) -> Option<u64> {
        let (min, max) = self.protected_range?;
        Some((max - min + 1).saturating_sub(self.received_packets.len() as u64))
    }

    /// A packet can be revived when exactly one protected packet is missing.
    /// 恰好缺失一个受保护包时可以恢复。
    pub fn can_revive(&self) -> bool {
        self.num_missing_packets() == Some(1)
    }

    /// Every protected packet has been received or revived.
    /// 所有受保护的包都已收到或恢复。
    pub fn is_finished(&self) -> bool {
        self.num_missing_packets() == Some(0)
    }

    /// Recovers the single missing packet. The revived payload keeps the parity's
    /// length, so it may carry trailing zeros.
    ///
    /// 恢复唯一缺失的包。恢复出的载荷保持校验值的长度，因此可能带有尾随的零。
    pub fn revive(&mut self) -> Option<(PacketSequenceNumber, Bytes)> {
        if !self.can_revive() {
            return None;
        }
        let (min, max) = self.protected_range?;
        let missing = (min..=max).find(|seq| !self.received_packets.contains(seq))?;
        self.received_packets.insert(missing);
        Some((missing, Bytes::copy_from_slice(&self.payload_parity)))
    }

    /// Whether every packet of this group precedes `sequence_number`.
    /// 此组的所有包是否都在 `sequence_number` 之前。
    pub fn protects_packets_before(&self, sequence_number: PacketSequenceNumber) -> bool {
        match self.protected_range {
            Some((_, max)) => max < sequence_number,
            None => self
                .received_packets
                .first()
                .is_some_and(|&first| first < sequence_number),
        }
    }

    pub fn num_received_packets(&self) -> usize {
        self.received_packets.len()
    }

    /// The lowest sequence number the group protects, if known.
    /// 组所保护的最小序列号（如果已知）。
    pub fn min_protected_packet(&self) -> Option<PacketSequenceNumber> {
        self.protected_range
            .map(|(min, _)| min)
            .or_else(|| self.received_packets.first().copied())
    }

    pub fn payload_parity(&self) -> &[u8] {
        &self.payload_parity
    }

    fn update_parity(&mut self, payload: &[u8]) -> bool {
        if payload.len() > MAX_PACKET_SIZE {
            warn!(len = payload.len(), "payload too large for FEC parity");
            return false;
        }
        if self.payload_parity.len() < payload.len() {
            self.payload_parity.resize(payload.len(), 0);
        }
        // Shorter payloads are treated as zero padded.
        for (parity, byte) in self.payload_parity.iter_mut().zip(payload) {
            *parity ^= byte;
        }
        true
    }
}
