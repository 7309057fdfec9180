//! 定义了组帧与发送节奏的可配置参数。
//! Defines configurable parameters for packet framing and pacing.

use crate::packet::{ConnectionIdLength, QUIC_VERSION};
use std::time::Duration;

/// Which end of the connection this endpoint is.
///
/// 本端点在连接中的角色。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    Client,
    Server,
}

/// A structure containing all configurable parameters for a connection.
///
/// 包含所有连接可配置参数的结构体。
#[derive(Debug, Clone)]
pub struct Config {
    /// The protocol version written into packets that carry a version.
    /// 写入携带版本号的包中的协议版本。
    pub version: u32,

    /// Clients send the version in every packet until told to stop; servers never do.
    /// 客户端在被告知停止之前每个包都发送版本；服务器从不发送。
    pub perspective: Perspective,

    /// Packet assembly parameters.
    /// 组包相关参数。
    pub packet: PacketConfig,

    /// Pacing parameters.
    /// 发送节奏相关参数。
    pub pacing: PacingConfig,
}

/// Packet assembly parameters.
///
/// 组包相关参数。
#[derive(Debug, Clone)]
pub struct PacketConfig {
    /// The maximum size of a packet on the wire, after encryption.
    /// 加密后网络上单个包的最大大小。
    pub max_packet_length: usize,
    /// The number of packets covered by one FEC packet. Zero disables FEC.
    /// 一个FEC包覆盖的数据包数量。为零时禁用FEC。
    pub max_packets_per_fec_group: usize,
    /// The number of connection id bytes written into each packet.
    /// 每个包中写入的连接ID字节数。
    pub connection_id_length: ConnectionIdLength,
    /// Bytes added to every packet by the encrypter (authentication tag).
    /// 加密器为每个包增加的字节数（认证标签）。
    pub encryption_overhead: usize,
}

/// Pacing parameters.
///
/// 发送节奏相关参数。
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Packets whose scheduled departure is closer than this are sent immediately.
    /// 计划发送时间在此范围之内的包会被立即发送。
    pub alarm_granularity: Duration,
    /// Unpaced packets granted every time the connection goes quiescent, once an RTT sample exists.
    /// 出现RTT样本后，每当连接进入静默状态时授予的不受节奏限制的包数量。
    pub max_burst_packets: u32,
    /// Burst size used until the first RTT sample arrives. Capped at `max_burst_packets`.
    /// 第一个RTT样本到达之前使用的突发大小，不超过 `max_burst_packets`。
    pub initial_burst_packets: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: QUIC_VERSION,
            perspective: Perspective::Client,
            packet: PacketConfig::default(),
            pacing: PacingConfig::default(),
        }
    }
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            max_packet_length: 1350, // A safe default MTU, leaves room for IP/UDP headers
            max_packets_per_fec_group: 0,
            connection_id_length: ConnectionIdLength::Eight,
            encryption_overhead: 12,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            alarm_granularity: Duration::from_millis(1),
            max_burst_packets: 10,
            initial_burst_packets: 10,
        }
    }
}
