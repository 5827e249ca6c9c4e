// slcan-gateway/src/gateway.rs
//
// One iteration of the cooperative gateway loop.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The loop driver.
//!
//! The gateway does no threading and no waiting of its own. The
//! application calls [`Gateway::run_once`] over and over; each call
//! handles a bounded number of host commands, then gives every protocol
//! handler one poll.

use crate::{
    config::Config,
    dispatcher::{Dispatcher, HandlerRef},
    transport::{Transport, WritePriority},
};
use log::trace;

/// A transport and a dispatcher, wired together.
#[derive(Debug)]
pub struct Gateway<T> {
    transport: T,
    dispatcher: Dispatcher,
    max_cmds: usize,
}

impl<T: Transport> Gateway<T> {
    /// Creates a gateway with the default limits and no handlers.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, &Config::default())
    }

    /// Creates a gateway with no handlers.
    pub fn with_config(transport: T, config: &Config) -> Self {
        Self {
            transport,
            dispatcher: Dispatcher::with_capacity(config.max_handlers),
            max_cmds: config.max_cmds_per_iteration,
        }
    }

    /// Registers a protocol handler with the dispatcher.
    pub fn register(&mut self, handler: HandlerRef) -> bool {
        self.dispatcher.register(handler)
    }

    /// Runs one loop iteration.
    ///
    /// Returns the number of command lines handled.
    pub fn run_once(&mut self) -> usize {
        let mut handled = 0;
        while handled < self.max_cmds {
            let Some(line) = self.transport.read_line() else {
                break;
            };
            if let Some(resp) = self.dispatcher.dispatch(&line) {
                trace!("{:?} -> {}", line, resp);
                self.transport
                    .write_with_priority(&resp.encode(), WritePriority::CommandResponse);
            }
            handled += 1;
        }

        self.dispatcher.poll_all(&mut self.transport);
        self.transport.flush();
        handled
    }

    /// Gets a reference to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Gets a mutable reference to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Gets a reference to the dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Gets a mutable reference to the dispatcher.
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }
}
