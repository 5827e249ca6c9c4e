// slcan-gateway/src/codec.rs
//
// Text encoding of CAN frames in the SLCAN (Lawicel) format.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Parsing and formatting of SLCAN frame lines.
//!
//! ```text
//! tiiildd..[ssss]        standard data frame
//! Tiiiiiiiildd..[ssss]   extended data frame
//! riiil[ssss]            standard remote frame
//! Riiiiiiiil[ssss]       extended remote frame
//! ```
//!
//! `i` is the identifier in fixed-width hex, `l` the data length code
//! (one hex digit, 0-8), `dd` two hex digits per data byte and `ssss` an
//! optional millisecond timestamp. Hex digits may be in either case on
//! input; output is always uppercase.

use crate::{frame::CanFrame, id::CanId};
use embedded_can::Frame as EmbeddedFrame;
use thiserror::Error;

/// Hex digits in a standard identifier
pub const STD_ID_LEN: usize = 3;

/// Hex digits in an extended identifier
pub const EXT_ID_LEN: usize = 8;

/// Hex digits in a timestamp suffix
pub const TIMESTAMP_LEN: usize = 4;

/// SLCAN frame line parse error
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line ends before all of its fields
    #[error("Line too short")]
    TooShort,
    /// A hex field has a non-hex character
    #[error("Invalid hex digit")]
    InvalidHex,
    /// The identifier doesn't fit in 11 or 29 bits
    #[error("CAN ID out of range")]
    IdOutOfRange,
    /// The data length code is above 8
    #[error("Data length code out of range")]
    DlcOutOfRange,
    /// Unexpected text after the last field
    #[error("Trailing characters")]
    TrailingCharacters,
    /// Not a frame command
    #[error("Unknown command")]
    UnknownCommand,
}

// Parses a fixed-width run of hex digits.
fn parse_hex(digits: &[u8]) -> Result<u32, ParseError> {
    digits.iter().try_fold(0u32, |acc, &b| {
        let nibble = char::from(b).to_digit(16).ok_or(ParseError::InvalidHex)?;
        Ok((acc << 4) | nibble)
    })
}

/// Parses a transmit command line, like `t1233AABBCC`, into a frame.
///
/// The command letter selects the identifier width and whether this is a
/// remote frame. A trailing four digit group is taken as the timestamp.
pub fn parse_frame(line: &str) -> Result<CanFrame, ParseError> {
    let (&cmd, rest) = line
        .as_bytes()
        .split_first()
        .ok_or(ParseError::TooShort)?;

    let (extended, remote) = match cmd {
        b't' => (false, false),
        b'T' => (true, false),
        b'r' => (false, true),
        b'R' => (true, true),
        _ => return Err(ParseError::UnknownCommand),
    };

    let id_len = if extended { EXT_ID_LEN } else { STD_ID_LEN };
    if rest.len() < id_len + 1 {
        return Err(ParseError::TooShort);
    }

    let (id_hex, rest) = rest.split_at(id_len);
    let id = CanId::with_width(parse_hex(id_hex)?, extended).ok_or(ParseError::IdOutOfRange)?;

    let (dlc_hex, rest) = rest.split_at(1);
    let dlc = parse_hex(dlc_hex)? as usize;
    if dlc > 8 {
        return Err(ParseError::DlcOutOfRange);
    }

    let (frame, rest) = if remote {
        (CanFrame::remote_with_id(id, dlc), rest)
    } else {
        if rest.len() < 2 * dlc {
            return Err(ParseError::TooShort);
        }
        let (data_hex, rest) = rest.split_at(2 * dlc);
        let mut data = [0u8; 8];
        hex::decode_to_slice(data_hex, &mut data[..dlc]).map_err(|_| ParseError::InvalidHex)?;
        (CanFrame::with_id(id, &data[..dlc]), rest)
    };
    let frame = frame.ok_or(ParseError::DlcOutOfRange)?;

    match rest.len() {
        0 => Ok(frame),
        TIMESTAMP_LEN => Ok(frame.with_timestamp(parse_hex(rest)? as u16)),
        _ => Err(ParseError::TrailingCharacters),
    }
}

/// Formats a frame as an SLCAN line, without the terminating CR.
///
/// With `timestamps` set, the frame's timestamp (or zero, if it has none)
/// is appended.
pub fn format_frame(frame: &CanFrame, timestamps: bool) -> String {
    let cmd = match (frame.is_extended(), frame.is_remote_frame()) {
        (false, false) => 't',
        (true, false) => 'T',
        (false, true) => 'r',
        (true, true) => 'R',
    };

    let mut line = if frame.is_extended() {
        format!("{}{:08X}{:X}", cmd, frame.raw_id(), frame.dlc())
    } else {
        format!("{}{:03X}{:X}", cmd, frame.raw_id(), frame.dlc())
    };

    if frame.is_data_frame() {
        line.push_str(&hex::encode_upper(frame.data()));
    }
    if timestamps {
        line.push_str(&format!("{:04X}", frame.timestamp().unwrap_or(0)));
    }
    line
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_standard() {
        let frame = parse_frame("t1233AABBCC").unwrap();
        assert_eq!(frame.raw_id(), 0x123);
        assert!(!frame.is_extended());
        assert!(frame.is_data_frame());
        assert_eq!(frame.dlc(), 3);
        assert_eq!(frame.data(), &[0xAA, 0xBB, 0xCC]);

        // Lowercase hex is fine
        let frame = parse_frame("t7ff2abcd").unwrap();
        assert_eq!(frame.raw_id(), 0x7FF);
        assert_eq!(frame.data(), &[0xAB, 0xCD]);

        let frame = parse_frame("t0000").unwrap();
        assert_eq!(frame.dlc(), 0);
        assert!(frame.data().is_empty());
    }

    #[test]
    fn test_parse_extended_and_remote() {
        let frame = parse_frame("T1FFFFFFF81122334455667788").unwrap();
        assert!(frame.is_extended());
        assert_eq!(frame.raw_id(), 0x1FFF_FFFF);
        assert_eq!(frame.dlc(), 8);

        // An extended frame with a small ID stays extended
        let frame = parse_frame("R000001234").unwrap();
        assert!(frame.is_extended());
        assert!(frame.is_remote_frame());
        assert_eq!(frame.raw_id(), 0x123);
        assert_eq!(frame.dlc(), 4);

        let frame = parse_frame("r1238").unwrap();
        assert!(!frame.is_extended());
        assert_eq!(frame.dlc(), 8);
    }

    #[test]
    fn test_parse_timestamp_suffix() {
        let frame = parse_frame("t1231111122").unwrap();
        assert_eq!(frame.data(), &[0x11]);
        assert_eq!(frame.timestamp(), Some(0x1122));

        assert_eq!(parse_frame("t1231112"), Err(ParseError::TrailingCharacters));
        assert_eq!(parse_frame("t123111x22"), Err(ParseError::TrailingCharacters));
        assert_eq!(parse_frame("t12311zz22"), Err(ParseError::InvalidHex));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_frame(""), Err(ParseError::TooShort));
        assert_eq!(parse_frame("x1230"), Err(ParseError::UnknownCommand));
        assert_eq!(parse_frame("t12"), Err(ParseError::TooShort));
        assert_eq!(parse_frame("T1234567"), Err(ParseError::TooShort));
        assert_eq!(parse_frame("t12G0"), Err(ParseError::InvalidHex));
        assert_eq!(parse_frame("t+230"), Err(ParseError::InvalidHex));
        assert_eq!(parse_frame("t8000"), Err(ParseError::IdOutOfRange));
        assert_eq!(parse_frame("T200000000"), Err(ParseError::IdOutOfRange));
        assert_eq!(parse_frame("t1239"), Err(ParseError::DlcOutOfRange));
        assert_eq!(parse_frame("r123F"), Err(ParseError::DlcOutOfRange));
        assert_eq!(parse_frame("t1233AABB"), Err(ParseError::TooShort));
        assert_eq!(parse_frame("t1231AG"), Err(ParseError::InvalidHex));
    }

    #[test]
    fn test_format() {
        let frame = parse_frame("t1233aabbcc").unwrap();
        assert_eq!(format_frame(&frame, false), "t1233AABBCC");
        assert_eq!(format_frame(&frame.with_timestamp(0xBEEF), true), "t1233AABBCCBEEF");
        assert_eq!(format_frame(&frame, true), "t1233AABBCC0000");

        let frame = parse_frame("R0000ABCD2").unwrap();
        assert_eq!(format_frame(&frame, false), "R0000ABCD2");
    }

    #[test]
    fn test_round_trip_standard() {
        let ids = [0u32, 1, 0x123, 0x400, 0x7FF];
        for &id in &ids {
            for dlc in 0..=8usize {
                let data: Vec<u8> = (0..dlc as u8).map(|i| i.wrapping_mul(37) ^ 0xA5).collect();
                let frame = CanFrame::with_id(CanId::standard(id as u16).unwrap(), &data).unwrap();
                assert_eq!(parse_frame(&format_frame(&frame, false)), Ok(frame));

                let remote = CanFrame::remote_with_id(CanId::standard(id as u16).unwrap(), dlc).unwrap();
                assert_eq!(parse_frame(&format_frame(&remote, false)), Ok(remote));
            }
        }
    }

    #[test]
    fn test_round_trip_extended() {
        let ids = [0u32, 0x7FF, 0x800, 0x12345, 0x1234_5678, 0x1FFF_FFFF];
        for &id in &ids {
            for dlc in 0..=8usize {
                let data: Vec<u8> = (0..dlc as u8).map(|i| 0xFF - i).collect();
                let frame = CanFrame::with_id(CanId::extended(id).unwrap(), &data).unwrap();
                let line = format_frame(&frame, false);
                assert_eq!(line.len(), 1 + EXT_ID_LEN + 1 + 2 * dlc);
                assert_eq!(parse_frame(&line), Ok(frame));
            }
        }
    }
}
