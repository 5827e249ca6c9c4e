// slcan-gateway/src/socket.rs
//
// A Linux SocketCAN raw socket as the gateway's CAN device.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! SocketCAN device.
//!
//! The Linux kernel exposes CAN interfaces through a network-like API (see
//! <https://www.kernel.org/doc/Documentation/networking/can.txt>). The
//! [`SocketCanDevice`] opens a non-blocking raw CAN socket on an interface
//! when the channel is opened, and closes it when the channel is closed.
//!
//! The bitrate of a SocketCAN interface is part of its network
//! configuration (`ip link set can0 type can bitrate 500000`) and can't be
//! changed through the socket. The device can be told which preset the
//! interface runs at, in which case only that preset is accepted; otherwise
//! every preset is accepted and the interface runs at whatever it's set to.

use crate::{
    bus::{Bitrate, Mode},
    controller::CanDevice,
    frame::CanFrame,
    id::{CanId, EFF_MASK, SFF_MASK},
    Error, Result,
};
use embedded_can::Frame as EmbeddedFrame;
use libc::{can_frame, sa_family_t, sockaddr_can, sockaddr_storage, socklen_t, AF_CAN, CAN_RAW};
use log::debug;
use nix::net::if_::if_nametoindex;
use socket2::SockAddr;
use std::{
    io::{self, Read},
    mem::{self, size_of},
    os::raw::c_int,
};

/// If set, the frame has a 29-bit extended ID
const EFF_FLAG: u32 = libc::CAN_EFF_FLAG;

/// If set, the frame is a remote transmission request
const RTR_FLAG: u32 = libc::CAN_RTR_FLAG;

/// If set, the frame is an error frame
const ERR_FLAG: u32 = libc::CAN_ERR_FLAG;

// ===== Private local helper functions =====

// Views a plain C struct as bytes.
fn as_bytes<T: Sized>(val: &T) -> &[u8] {
    let sz = size_of::<T>();
    unsafe { std::slice::from_raw_parts::<'_, u8>(val as *const _ as *const u8, sz) }
}

// Views a plain C struct as mutable bytes.
fn as_bytes_mut<T: Sized>(val: &mut T) -> &mut [u8] {
    let sz = size_of::<T>();
    unsafe { std::slice::from_raw_parts_mut(val as *mut _ as *mut u8, sz) }
}

// The socket address for a CAN interface, by index.
fn can_sock_addr(ifindex: u32) -> SockAddr {
    let mut addr: sockaddr_can = unsafe { mem::zeroed() };
    addr.can_family = AF_CAN as sa_family_t;
    addr.can_ifindex = ifindex as c_int;

    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let len = size_of::<sockaddr_can>();
    as_bytes_mut(&mut storage)[..len].copy_from_slice(as_bytes(&addr));
    unsafe { SockAddr::new(storage, len as socklen_t) }
}

/// Opens a non-blocking raw CAN socket bound to the interface.
fn raw_open_socket(ifindex: u32) -> io::Result<socket2::Socket> {
    let af_can = socket2::Domain::from(AF_CAN);
    let can_raw = socket2::Protocol::from(CAN_RAW);

    let sock = socket2::Socket::new_raw(af_can, socket2::Type::RAW, Some(can_raw))?;
    sock.bind(&can_sock_addr(ifindex))?;
    sock.set_nonblocking(true)?;
    Ok(sock)
}

/// Converts a frame to the kernel's classic CAN frame.
fn to_raw_frame(frame: &CanFrame) -> can_frame {
    let mut raw: can_frame = unsafe { mem::zeroed() };

    let mut can_id = frame.raw_id();
    if frame.is_extended() {
        can_id |= EFF_FLAG;
    }
    if frame.is_remote_frame() {
        can_id |= RTR_FLAG;
    }
    raw.can_id = can_id;
    raw.can_dlc = frame.dlc() as u8;
    raw.data[..frame.data().len()].copy_from_slice(frame.data());
    raw
}

/// Converts a kernel frame to a data frame. Error frames are skipped.
///
/// The RTR bit is not reported: every received frame is a data frame.
fn from_raw_frame(raw: &can_frame) -> Option<CanFrame> {
    if raw.can_id & ERR_FLAG != 0 {
        return None;
    }
    let extended = raw.can_id & EFF_FLAG != 0;
    let mask = if extended { EFF_MASK } else { SFF_MASK };
    let id = CanId::with_width(raw.can_id & mask, extended)?;
    let dlc = usize::from(raw.can_dlc).min(raw.data.len());
    CanFrame::with_id(id, &raw.data[..dlc])
}

fn map_io_err(err: io::Error) -> nb::Error<Error> {
    // A full kernel transmit queue reports ENOBUFS rather than EAGAIN
    if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::ENOBUFS) {
        nb::Error::WouldBlock
    } else {
        nb::Error::Other(Error::Io(err))
    }
}

// ===== SocketCanDevice =====

/// A CAN device on a Linux SocketCAN interface.
#[derive(Debug)]
pub struct SocketCanDevice {
    ifname: String,
    ifindex: u32,
    bitrate: Option<Bitrate>,
    sock: Option<socket2::Socket>,
}

impl SocketCanDevice {
    /// Creates a device for the named interface, like "can0" or "vcan0".
    ///
    /// Fails if there is no such interface. The socket isn't opened until
    /// the channel is.
    pub fn new(ifname: &str) -> io::Result<Self> {
        let ifindex = if_nametoindex(ifname)?;
        Ok(Self {
            ifname: ifname.into(),
            ifindex,
            bitrate: None,
            sock: None,
        })
    }

    /// Only accepts the bitrate preset the interface is configured for.
    pub fn with_bitrate(mut self, bitrate: Bitrate) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    /// The name of the interface
    pub fn ifname(&self) -> &str {
        &self.ifname
    }

    /// Whether the socket is open
    pub fn is_open(&self) -> bool {
        self.sock.is_some()
    }
}

impl embedded_can::nb::Can for SocketCanDevice {
    type Frame = CanFrame;
    type Error = Error;

    fn transmit(&mut self, frame: &CanFrame) -> nb::Result<Option<CanFrame>, Error> {
        let sock = self.sock.as_ref().ok_or(nb::Error::Other(Error::NotOpen))?;
        let raw = to_raw_frame(frame);
        let n = sock.send(as_bytes(&raw)).map_err(map_io_err)?;
        if n != size_of::<can_frame>() {
            return Err(nb::Error::Other(Error::Io(io::ErrorKind::WriteZero.into())));
        }
        Ok(None)
    }

    fn receive(&mut self) -> nb::Result<CanFrame, Error> {
        let sock = self.sock.as_mut().ok_or(nb::Error::WouldBlock)?;
        loop {
            let mut raw: can_frame = unsafe { mem::zeroed() };
            let n = sock.read(as_bytes_mut(&mut raw)).map_err(map_io_err)?;
            if n != size_of::<can_frame>() {
                return Err(nb::Error::Other(Error::Io(
                    io::ErrorKind::UnexpectedEof.into(),
                )));
            }
            if let Some(frame) = from_raw_frame(&raw) {
                return Ok(frame);
            }
        }
    }
}

impl CanDevice for SocketCanDevice {
    fn supports_bitrate(&self, bitrate: Bitrate) -> bool {
        self.bitrate.map_or(true, |rate| rate == bitrate)
    }

    fn start(&mut self, bitrate: Bitrate, mode: Mode) -> Result<()> {
        if !self.supports_bitrate(bitrate) {
            return Err(Error::UnsupportedBitrate(bitrate.preset()));
        }
        self.sock = Some(raw_open_socket(self.ifindex)?);
        debug!("Opened SocketCAN '{}' ({:?})", self.ifname, mode);
        Ok(())
    }

    fn stop(&mut self) {
        if self.sock.take().is_some() {
            debug!("Closed SocketCAN '{}'", self.ifname);
        }
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_can::nb::Can;

    #[test]
    fn test_nonexistent_device() {
        assert!(SocketCanDevice::new("invalid").is_err());
    }

    #[test]
    fn test_raw_frame_conversion() {
        let frame = CanFrame::with_id(CanId::extended(0x123).unwrap(), &[1, 2, 3]).unwrap();
        let raw = to_raw_frame(&frame);
        assert_eq!(raw.can_id, 0x123 | EFF_FLAG);
        assert_eq!(raw.can_dlc, 3);
        assert_eq!(&raw.data[..3], &[1, 2, 3]);
        assert_eq!(from_raw_frame(&raw), Some(frame));

        let frame = CanFrame::remote_with_id(CanId::standard(0x7FF).unwrap(), 2).unwrap();
        let raw = to_raw_frame(&frame);
        assert_eq!(raw.can_id, 0x7FF | RTR_FLAG);
        assert_eq!(raw.can_dlc, 2);
    }

    #[test]
    fn test_error_frame_skipped() {
        let mut raw: can_frame = unsafe { mem::zeroed() };
        raw.can_id = ERR_FLAG | 0x04;
        raw.can_dlc = 8;
        assert_eq!(from_raw_frame(&raw), None);
    }

    #[test]
    fn test_sock_addr() {
        let addr = can_sock_addr(42);
        assert_eq!(addr.len() as usize, size_of::<sockaddr_can>());
        assert_eq!(addr.family(), AF_CAN as sa_family_t);
    }

    #[test]
    fn test_fixed_bitrate() {
        // Built by hand, so no interface is needed
        let mut dev = SocketCanDevice {
            ifname: "can0".into(),
            ifindex: 0,
            bitrate: Some(Bitrate::Rate250K),
            sock: None,
        };
        assert!(dev.supports_bitrate(Bitrate::Rate250K));
        assert!(!dev.supports_bitrate(Bitrate::Rate500K));
        assert!(matches!(
            dev.start(Bitrate::Rate1M, Mode::Normal),
            Err(Error::UnsupportedBitrate(8))
        ));
        assert!(matches!(
            dev.transmit(&CanFrame::default()),
            Err(nb::Error::Other(Error::NotOpen))
        ));
        assert!(matches!(dev.receive(), Err(nb::Error::WouldBlock)));
    }
}
