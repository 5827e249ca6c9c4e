// slcan-gateway/src/stream.rs
//
// A non-blocking byte stream over a serial tty or stdin/stdout.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! File descriptor byte streams.
//!
//! [`FdStream`] reads and writes a pair of non-blocking file descriptors.
//! Output goes through a bounded user-space buffer, whose free space is
//! reported as the write capacity. The buffer is pushed to the descriptor
//! whenever there's something in it and the descriptor will take it.
//!
//! The descriptor flags, and the terminal settings of a tty put into raw
//! mode, are put back when the stream is dropped. Stdin and stdout share
//! their open file with the parent shell, which would otherwise be left
//! with a raw, non-blocking terminal.

use crate::transport::ByteStream;
use libc::{c_int, termios, F_GETFL, F_SETFL, O_NOCTTY, O_NONBLOCK, TCSANOW};
use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    mem,
    os::unix::{
        fs::OpenOptionsExt,
        io::{AsFd, AsRawFd, RawFd},
    },
    path::Path,
};

/// Default size of the output buffer
pub const OUTPUT_BUFFER_LEN: usize = 1024;

const READ_CHUNK: usize = 256;

fn get_flags(fd: RawFd) -> io::Result<c_int> {
    let flags = unsafe { libc::fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(flags)
}

fn set_flags(fd: RawFd, flags: c_int) -> io::Result<()> {
    if unsafe { libc::fcntl(fd, F_SETFL, flags) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

// Sets O_NONBLOCK on a descriptor, returning the flags it had before.
fn set_nonblocking(fd: RawFd) -> io::Result<c_int> {
    let flags = get_flags(fd)?;
    set_flags(fd, flags | O_NONBLOCK)?;
    Ok(flags)
}

fn set_termios(fd: RawFd, tio: &termios) -> io::Result<()> {
    if unsafe { libc::tcsetattr(fd, TCSANOW, tio) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

// Puts a tty into raw mode: no echo, no line editing, no CR/LF mapping.
// Returns the settings it had before.
fn set_raw_mode(fd: RawFd) -> io::Result<termios> {
    let mut tio: termios = unsafe { mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &mut tio) } < 0 {
        return Err(io::Error::last_os_error());
    }
    let saved = tio;
    unsafe { libc::cfmakeraw(&mut tio) };
    set_termios(fd, &tio)?;
    Ok(saved)
}

// What to put back on the descriptors when the stream goes away.
#[derive(Clone, Copy)]
struct SavedState {
    reader_flags: c_int,
    writer_flags: c_int,
    termios: Option<termios>,
}

impl fmt::Debug for SavedState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SavedState")
            .field("reader_flags", &self.reader_flags)
            .field("writer_flags", &self.writer_flags)
            .field("raw_mode", &self.termios.is_some())
            .finish()
    }
}

/// A byte stream over a pair of non-blocking file descriptors.
#[derive(Debug)]
pub struct FdStream {
    reader: File,
    writer: File,
    rbuf: [u8; READ_CHUNK],
    rpos: usize,
    rlen: usize,
    pending: Vec<u8>,
    out_capacity: usize,
    saved: SavedState,
}

impl FdStream {
    /// Creates a stream from descriptors, making both non-blocking.
    ///
    /// The original flags are restored when the stream is dropped.
    pub fn from_files(reader: File, writer: File, out_capacity: usize) -> io::Result<Self> {
        Self::with_termios(reader, writer, out_capacity, None)
    }

    fn with_termios(
        reader: File,
        writer: File,
        out_capacity: usize,
        termios: Option<termios>,
    ) -> io::Result<Self> {
        let reader_flags = set_nonblocking(reader.as_raw_fd())?;
        let writer_flags = match set_nonblocking(writer.as_raw_fd()) {
            Ok(flags) => flags,
            Err(err) => {
                let _ = set_flags(reader.as_raw_fd(), reader_flags);
                return Err(err);
            }
        };
        Ok(Self {
            reader,
            writer,
            rbuf: [0; READ_CHUNK],
            rpos: 0,
            rlen: 0,
            pending: Vec::with_capacity(out_capacity),
            out_capacity,
            saved: SavedState {
                reader_flags,
                writer_flags,
                termios,
            },
        })
    }

    /// Opens a serial tty in raw mode.
    pub fn open_tty<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(O_NONBLOCK | O_NOCTTY)
            .open(path)?;
        let saved = set_raw_mode(file.as_raw_fd())?;
        let writer = file.try_clone()?;
        Self::with_termios(file, writer, OUTPUT_BUFFER_LEN, Some(saved))
    }

    /// Uses the process's stdin and stdout.
    ///
    /// If stdin is a terminal, it is put into raw mode.
    pub fn stdio() -> io::Result<Self> {
        let reader = File::from(io::stdin().as_fd().try_clone_to_owned()?);
        let writer = File::from(io::stdout().as_fd().try_clone_to_owned()?);
        let saved = if unsafe { libc::isatty(reader.as_raw_fd()) } == 1 {
            Some(set_raw_mode(reader.as_raw_fd())?)
        } else {
            None
        };
        Self::with_termios(reader, writer, OUTPUT_BUFFER_LEN, saved)
    }

    /// The number of bytes waiting in the output buffer
    pub fn pending_output(&self) -> usize {
        self.pending.len()
    }
}

impl ByteStream for FdStream {
    fn read_byte(&mut self) -> nb::Result<u8, io::Error> {
        if self.rpos == self.rlen {
            match self.reader.read(&mut self.rbuf) {
                Ok(0) => return Err(nb::Error::Other(io::ErrorKind::UnexpectedEof.into())),
                Ok(n) => {
                    self.rpos = 0;
                    self.rlen = n;
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) =>
                {
                    return Err(nb::Error::WouldBlock)
                }
                Err(err) => return Err(nb::Error::Other(err)),
            }
        }
        let b = self.rbuf[self.rpos];
        self.rpos += 1;
        Ok(b)
    }

    fn write_capacity(&self) -> Option<usize> {
        Some(self.out_capacity.saturating_sub(self.pending.len()))
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.pending.len() + buf.len() > self.out_capacity {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        self.pending.extend_from_slice(buf);
        self.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        while !self.pending.is_empty() {
            match self.writer.write(&self.pending) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.pending.drain(..n);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

impl Drop for FdStream {
    fn drop(&mut self) {
        let _ = ByteStream::flush(self);

        // The reader's flags go last: when both ends share one open file,
        // they're the ones from before the writer was touched.
        let saved = self.saved;
        let _ = set_flags(self.writer.as_raw_fd(), saved.writer_flags);
        let _ = set_flags(self.reader.as_raw_fd(), saved.reader_flags);
        if let Some(tio) = saved.termios {
            let _ = set_termios(self.reader.as_raw_fd(), &tio);
        }
    }
}

/////////////////////////////////////////////////////////////////////////////
