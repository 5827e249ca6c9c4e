// slcan-gateway/src/id.rs
//
// Implements CANbus identifiers and the software acceptance filter.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! CANbus standard and extended identifiers, and the mask/code acceptance
//! filter applied to received frames.

use embedded_can::{ExtendedId, Id, StandardId};

/// Valid bits in a standard (11-bit) frame ID
pub const SFF_MASK: u32 = 0x0000_07FF;

/// Valid bits in an extended (29-bit) frame ID
pub const EFF_MASK: u32 = 0x1FFF_FFFF;

/// Gets the raw numeric value of an `embedded_can::Id`
#[inline]
pub fn id_to_raw(id: &Id) -> u32 {
    match id {
        Id::Standard(id) => id.as_raw() as u32,
        Id::Extended(id) => id.as_raw(),
    }
}

/////////////////////////////////////////////////////////////////////////////
/// A CAN identifier that can be standard or extended.
///
/// This is similar to and generally interchangeable with
/// [embedded_can::Id](https://docs.rs/embedded-can/latest/embedded_can/enum.Id.html)
/// but knows its raw value, which is what the SLCAN text format carries.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CanId {
    /// Standard 11-bit Identifier (`0..=0x7FF`).
    Standard(StandardId),
    /// Extended 29-bit Identifier (`0..=0x1FFF_FFFF`).
    Extended(ExtendedId),
}

impl CanId {
    /// Creates a standard, 11-bit, ID
    pub fn standard(id: u16) -> Option<Self> {
        StandardId::new(id).map(Self::Standard)
    }

    /// Creates an extended, 29-bit, ID
    pub fn extended(id: u32) -> Option<Self> {
        ExtendedId::new(id).map(Self::Extended)
    }

    /// Creates an ID of the requested width from a raw value, failing if the
    /// value does not fit.
    pub fn with_width(id: u32, extended: bool) -> Option<Self> {
        if extended {
            Self::extended(id)
        } else {
            u16::try_from(id).ok().and_then(Self::standard)
        }
    }

    /// Gets the embedded_can::Id representation of the value.
    pub fn as_id(&self) -> Id {
        match self {
            CanId::Standard(id) => Id::Standard(*id),
            CanId::Extended(id) => Id::Extended(*id),
        }
    }

    /// Gets the raw numeric value of the ID
    pub fn as_raw(&self) -> u32 {
        id_to_raw(&self.as_id())
    }

    /// Determines if the ID is an extended, 29-bit, ID.
    #[inline]
    pub fn is_extended(&self) -> bool {
        matches!(self, CanId::Extended(_))
    }
}

impl From<Id> for CanId {
    fn from(id: Id) -> Self {
        match id {
            Id::Standard(id) => Self::Standard(id),
            Id::Extended(id) => Self::Extended(id),
        }
    }
}

impl From<CanId> for Id {
    #[inline]
    fn from(id: CanId) -> Self {
        id.as_id()
    }
}

// ===== AcceptanceFilter =====

/// Software receive acceptance filter.
///
/// A received identifier passes iff `(id & mask) == (code & mask)`. A
/// disabled filter passes everything, as does an enabled one with a zero
/// mask.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct AcceptanceFilter {
    mask: u32,
    code: u32,
    enabled: bool,
}

impl AcceptanceFilter {
    /// Creates an enabled filter from a mask and code.
    pub fn new(mask: u32, code: u32) -> Self {
        Self {
            mask,
            code,
            enabled: true,
        }
    }

    /// Replaces the mask and code, and enables the filter.
    pub fn set(&mut self, mask: u32, code: u32) {
        *self = Self::new(mask, code);
    }

    /// Disables the filter, accepting all frames.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The acceptance mask (1 = care, 0 = don't care)
    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// The acceptance code
    pub fn code(&self) -> u32 {
        self.code
    }

    /// Whether the filter is currently applied
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Checks a raw identifier against the filter.
    #[inline]
    pub fn passes(&self, id: u32) -> bool {
        !self.enabled || (id & self.mask) == (self.code & self.mask)
    }
}

/////////////////////////////////////////////////////////////////////////////
