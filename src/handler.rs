// slcan-gateway/src/handler.rs
//
// The interface between the dispatcher and a line protocol.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Protocol handlers and their responses.

use crate::transport::Transport;
use std::fmt;

/// The SLCAN error marker (BEL)
pub const ERROR_MARKER: u8 = 0x07;

/// Line terminator for every response
pub const CR: u8 = b'\r';

/// The reply to one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Success with no payload
    Ok,
    /// The error marker
    Error,
    /// Success with a payload, like `z` or `F00`
    Payload(String),
}

impl Response {
    /// The bytes to put on the wire, terminator included.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Response::Ok => vec![CR],
            Response::Error => vec![ERROR_MARKER, CR],
            Response::Payload(text) => {
                let mut buf = Vec::with_capacity(text.len() + 1);
                buf.extend_from_slice(text.as_bytes());
                buf.push(CR);
                buf
            }
        }
    }

    /// Determines if this is the error marker.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Response::Ok => f.write_str("OK"),
            Response::Error => f.write_str("ERROR"),
            Response::Payload(text) => write!(f, "{:?}", text),
        }
    }
}

/// A line protocol the dispatcher can route commands to.
pub trait ProtocolHandler {
    /// A short name, for diagnostics
    fn name(&self) -> &str;

    /// Determines if the line belongs to this protocol.
    fn can_handle(&self, line: &str) -> bool;

    /// Handles one command line, which `can_handle()` accepted.
    fn process(&mut self, line: &str) -> Response;

    /// Does the periodic work of the protocol, once per loop iteration.
    fn poll(&mut self, transport: &mut dyn Transport);

    /// Whether the protocol has an open session
    fn is_active(&self) -> bool {
        false
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(Response::Ok.encode(), b"\r");
        assert_eq!(Response::Error.encode(), b"\x07\r");
        assert_eq!(Response::Payload("z".into()).encode(), b"z\r");
        assert!(Response::Error.is_error());
        assert!(!Response::Ok.is_error());
    }
}
