// slcan-gateway/src/transport.rs
//
// Line-oriented, priority-aware transport over a raw byte stream.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The host-facing side of the gateway.
//!
//! A [`ByteStream`] is the raw duplex channel to the host: a non-blocking
//! byte reader and a writer with an optional hint of how much it can take
//! right now.
//!
//! [`LineTransport`] turns it into a queue of command lines, terminated by
//! CR or LF, and offers writes in two priority classes:
//!
//! - [`WritePriority::CommandResponse`] waits, for a short bounded time, for
//!   the stream to have room for the whole reply.
//! - [`WritePriority::BestEffort`] is dropped at once if there's no room.
//!
//! Writes never put part of a message on the wire. Every drop is counted.

use crate::{config::Config, ring::Ring};
use log::{debug, trace, warn};
use std::{
    io,
    time::{Duration, Instant},
};

/// The raw byte channel to the host.
pub trait ByteStream {
    /// Reads the next byte, or `WouldBlock` if none is ready.
    ///
    /// End of stream is reported as an `UnexpectedEof` error.
    fn read_byte(&mut self) -> nb::Result<u8, io::Error>;

    /// The number of bytes that can be written right now without blocking,
    /// or `None` if the stream can't tell.
    fn write_capacity(&self) -> Option<usize>;

    /// Writes the whole buffer, or nothing.
    fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Pushes any buffered output towards the host, without blocking.
    fn flush(&mut self) -> io::Result<()>;
}

/// The priority class of an outgoing message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WritePriority {
    /// A reply to a host command. Worth a short wait.
    CommandResponse,
    /// Unsolicited traffic, like forwarded bus frames. Never waits.
    BestEffort,
}

/// The transport capability used by the dispatcher and protocol handlers.
pub trait Transport {
    /// Takes the oldest complete command line, after pulling in whatever
    /// input is waiting. The line terminator is stripped.
    fn read_line(&mut self) -> Option<String>;

    /// Writes a message atomically, following the policy for its priority.
    /// Returns `false` if the message was dropped.
    fn write_with_priority(&mut self, data: &[u8], priority: WritePriority) -> bool;

    /// Writes the text followed by CR.
    fn write_line(&mut self, line: &str);

    /// Writes a single character.
    fn write_char(&mut self, c: char);

    /// Writes bytes as-is.
    fn write_raw(&mut self, data: &[u8]);

    /// Pushes buffered output towards the host.
    fn flush(&mut self);
}

/// Spins until `ready` returns true or the timeout expires.
///
/// Returns whether the condition was met. The condition is always checked
/// at least once.
pub fn spin_until<F>(timeout: Duration, mut ready: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if ready() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::hint::spin_loop();
    }
}

/// Transport diagnostic counters
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TransportCounters {
    /// Command responses dropped after the wait timed out
    pub response_drops: u32,
    /// Best-effort messages dropped for lack of room
    pub frame_drops: u32,
    /// Complete lines discarded because the command queue was full
    pub queue_overflows: u32,
    /// Bytes discarded because a line was too long
    pub line_overflows: u32,
}

/// A [`Transport`] framing command lines from a [`ByteStream`].
#[derive(Debug)]
pub struct LineTransport<S> {
    stream: S,
    commands: Ring<String>,
    line: Vec<u8>,
    max_line: usize,
    response_timeout: Duration,
    hung_up: bool,
    counters: TransportCounters,
}

impl<S: ByteStream> LineTransport<S> {
    /// Creates a transport with the default buffer sizes and timeout.
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, &Config::default())
    }

    /// Creates a transport sized by the configuration.
    pub fn with_config(stream: S, config: &Config) -> Self {
        // One byte of the line buffer is reserved, as for a C string
        let max_line = config.line_capacity.saturating_sub(1).max(1);
        Self {
            stream,
            commands: Ring::new(config.cmd_queue_len),
            line: Vec::with_capacity(max_line),
            max_line,
            response_timeout: config.response_timeout,
            hung_up: false,
            counters: TransportCounters::default(),
        }
    }

    /// Gets a reference to the underlying stream.
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Gets a mutable reference to the underlying stream.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// The number of complete lines waiting to be read
    pub fn queued_lines(&self) -> usize {
        self.commands.len()
    }

    /// Whether the host end of the stream has gone away.
    pub fn is_hung_up(&self) -> bool {
        self.hung_up
    }

    /// A snapshot of the diagnostic counters
    pub fn counters(&self) -> TransportCounters {
        self.counters
    }

    /// Resets the diagnostic counters to zero.
    pub fn reset_counters(&mut self) {
        self.counters = TransportCounters::default();
    }

    /// Moves every byte the stream has ready into the line accumulator,
    /// queueing each completed line.
    pub fn process_incoming(&mut self) {
        if self.hung_up {
            return;
        }
        loop {
            match self.stream.read_byte() {
                Ok(byte) => self.accept_byte(byte),
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(err)) => {
                    self.stream_error(&err);
                    break;
                }
            }
        }
    }

    fn accept_byte(&mut self, byte: u8) {
        match byte {
            b'\r' | b'\n' => {
                if self.line.is_empty() {
                    return;
                }
                let line = String::from_utf8_lossy(&self.line).into_owned();
                self.line.clear();
                if let Err(line) = self.commands.push(line) {
                    self.counters.queue_overflows = self.counters.queue_overflows.wrapping_add(1);
                    warn!("Command queue full, dropping {:?}", line);
                }
            }
            _ if self.line.len() < self.max_line => self.line.push(byte),
            _ => {
                self.counters.line_overflows = self.counters.line_overflows.wrapping_add(1);
            }
        }
    }

    fn stream_error(&mut self, err: &io::Error) {
        match err.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe => {
                if !self.hung_up {
                    debug!("Byte stream hung up: {}", err);
                }
                self.hung_up = true;
            }
            _ => warn!("Byte stream error: {}", err),
        }
    }

    fn fits(stream: &S, len: usize) -> bool {
        stream.write_capacity().map_or(true, |cap| cap >= len)
    }

    fn count_drop(&mut self, priority: WritePriority) {
        match priority {
            WritePriority::CommandResponse => {
                self.counters.response_drops = self.counters.response_drops.wrapping_add(1);
                warn!("Dropped command response");
            }
            WritePriority::BestEffort => {
                self.counters.frame_drops = self.counters.frame_drops.wrapping_add(1);
                trace!("Dropped best-effort write");
            }
        }
    }

    // Fire-and-forget write with no capacity check.
    fn write_direct(&mut self, data: &[u8]) {
        if let Err(err) = self.stream.write(data) {
            self.stream_error(&err);
        }
    }
}

impl<S: ByteStream> Transport for LineTransport<S> {
    fn read_line(&mut self) -> Option<String> {
        self.process_incoming();
        self.commands.pop()
    }

    fn write_with_priority(&mut self, data: &[u8], priority: WritePriority) -> bool {
        if self.hung_up {
            return false;
        }

        if !Self::fits(&self.stream, data.len()) {
            let ready = match priority {
                WritePriority::CommandResponse => {
                    let timeout = self.response_timeout;
                    let stream = &mut self.stream;
                    spin_until(timeout, || {
                        // Give a buffered stream the chance to make room
                        let _ = stream.flush();
                        Self::fits(stream, data.len())
                    })
                }
                WritePriority::BestEffort => false,
            };
            if !ready {
                self.count_drop(priority);
                return false;
            }
        }

        match self.stream.write(data) {
            Ok(()) => true,
            Err(err) => {
                if err.kind() != io::ErrorKind::WouldBlock {
                    self.stream_error(&err);
                }
                self.count_drop(priority);
                false
            }
        }
    }

    fn write_line(&mut self, line: &str) {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\r');
        self.write_direct(&buf);
    }

    fn write_char(&mut self, c: char) {
        let mut buf = [0; 4];
        self.write_direct(c.encode_utf8(&mut buf).as_bytes());
    }

    fn write_raw(&mut self, data: &[u8]) {
        self.write_direct(data);
    }

    fn flush(&mut self) {
        if let Err(err) = self.stream.flush() {
            if err.kind() != io::ErrorKind::WouldBlock {
                self.stream_error(&err);
            }
        }
    }
}

/////////////////////////////////////////////////////////////////////////////
