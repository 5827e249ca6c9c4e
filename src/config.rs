// slcan-gateway/src/config.rs
//
// Gateway tunables.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Buffer sizes, per-iteration limits and identification strings.

use crate::bus::Bitrate;
use std::time::Duration;

/// Maximum length of a command line, including one reserved byte
pub const LINE_CAPACITY: usize = 64;

/// Complete command lines buffered between loop iterations
pub const CMD_QUEUE_LEN: usize = 16;

/// Frames buffered in the software transmit queue
pub const TX_QUEUE_LEN: usize = 32;

/// Frames buffered between bus arrival and forwarding to the host
pub const RX_RING_LEN: usize = 64;

/// Command lines handled per loop iteration
pub const MAX_CMDS_PER_ITERATION: usize = 8;

/// Frames forwarded to the host per poll
pub const MAX_FRAMES_PER_POLL: usize = 8;

/// Longest command response, terminator included. Must fit the byte
/// stream's output buffer, or the response can never be written.
pub const MAX_RESPONSE_LEN: usize = 512;

/// How long a command response may wait for room in the stream
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(10);

/// Protocol handlers the dispatcher can hold
pub const MAX_HANDLERS: usize = 4;

/// Everything that can be tuned in the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Command line buffer size (the longest line is one less)
    pub line_capacity: usize,
    /// Command queue length, in lines
    pub cmd_queue_len: usize,
    /// Transmit queue length, in frames
    pub tx_queue_len: usize,
    /// Receive ring length, in frames
    pub rx_ring_len: usize,
    /// Commands handled per loop iteration
    pub max_cmds_per_iteration: usize,
    /// Frames forwarded per poll
    pub max_frames_per_poll: usize,
    /// Longest command response, which bounds one `A` batch
    pub max_response_len: usize,
    /// Bounded wait for a command response
    pub response_timeout: Duration,
    /// Bitrate used until the host sends an `S` command
    pub default_bitrate: Bitrate,
    /// Firmware version (major, minor) reported by `V`
    pub version: (u8, u8),
    /// Four-character serial number reported by `N`
    pub serial: String,
    /// Dispatcher capacity
    pub max_handlers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            line_capacity: LINE_CAPACITY,
            cmd_queue_len: CMD_QUEUE_LEN,
            tx_queue_len: TX_QUEUE_LEN,
            rx_ring_len: RX_RING_LEN,
            max_cmds_per_iteration: MAX_CMDS_PER_ITERATION,
            max_frames_per_poll: MAX_FRAMES_PER_POLL,
            max_response_len: MAX_RESPONSE_LEN,
            response_timeout: RESPONSE_TIMEOUT,
            default_bitrate: Bitrate::Rate500K,
            version: (1, 0),
            serial: "GW01".into(),
            max_handlers: MAX_HANDLERS,
        }
    }
}
