// slcan-gateway/src/bus.rs
//
// Bus vocabulary shared by the controller and the protocol engine.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Bitrate presets, operating modes and status flags.

use bitflags::bitflags;
use std::fmt;

/// The SLCAN bitrate presets, selected with the `S0`..`S8` commands.
///
/// Which presets are usable depends on the controller; see
/// [`Controller::supports_bitrate`](crate::Controller::supports_bitrate).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Bitrate {
    /// S0 - 10 kbit/s
    Rate10K,
    /// S1 - 20 kbit/s
    Rate20K,
    /// S2 - 50 kbit/s
    Rate50K,
    /// S3 - 100 kbit/s
    Rate100K,
    /// S4 - 125 kbit/s
    Rate125K,
    /// S5 - 250 kbit/s
    Rate250K,
    /// S6 - 500 kbit/s
    #[default]
    Rate500K,
    /// S7 - 800 kbit/s
    Rate800K,
    /// S8 - 1 Mbit/s
    Rate1M,
}

impl Bitrate {
    /// All presets, in `S` digit order.
    pub const ALL: [Bitrate; 9] = [
        Bitrate::Rate10K,
        Bitrate::Rate20K,
        Bitrate::Rate50K,
        Bitrate::Rate100K,
        Bitrate::Rate125K,
        Bitrate::Rate250K,
        Bitrate::Rate500K,
        Bitrate::Rate800K,
        Bitrate::Rate1M,
    ];

    /// Gets the preset for an `S` command digit (0-8).
    pub fn from_preset(preset: u8) -> Option<Self> {
        Self::ALL.get(usize::from(preset)).copied()
    }

    /// The `S` command digit for this preset.
    pub fn preset(&self) -> u8 {
        *self as u8
    }

    /// The nominal bitrate, in bits per second.
    pub fn bits_per_second(&self) -> u32 {
        use Bitrate::*;
        match *self {
            Rate10K => 10_000,
            Rate20K => 20_000,
            Rate50K => 50_000,
            Rate100K => 100_000,
            Rate125K => 125_000,
            Rate250K => 250_000,
            Rate500K => 500_000,
            Rate800K => 800_000,
            Rate1M => 1_000_000,
        }
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "S{} ({} bit/s)", self.preset(), self.bits_per_second())
    }
}

/// Controller operating mode.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Normal transmit/receive operation
    #[default]
    Normal,
    /// Receive only. Nothing is ever transmitted.
    ListenOnly,
}

bitflags! {
    /// Status flags reported by the `F` command.
    ///
    /// Only the software-observable conditions can ever be set. The error
    /// counter and bus error bits are always clear because the controller
    /// exposes no such telemetry.
    #[repr(transparent)]
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusFlags: u8 {
        /// Receive FIFO full
        const RX_FIFO_FULL = 0x01;
        /// Transmit FIFO full
        const TX_FIFO_FULL = 0x02;
        /// Error warning (TEC/REC > 96)
        const ERROR_WARNING = 0x04;
        /// Data overrun
        const DATA_OVERRUN = 0x08;
        /// Error passive (TEC/REC > 127)
        const ERROR_PASSIVE = 0x20;
        /// Arbitration lost
        const ARBITRATION_LOST = 0x40;
        /// Bus error
        const BUS_ERROR = 0x80;
    }
}

/////////////////////////////////////////////////////////////////////////////
