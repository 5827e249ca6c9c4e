// slcan-gateway/src/dispatcher.rs
//
// Routes command lines to registered protocol handlers.
//
// This file is part of the Rust 'slcan-gateway' crate.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The protocol dispatcher.
//!
//! Handlers are shared handles, so the application can keep its own
//! reference to a handler (to look at its state or counters) while the
//! dispatcher drives it. A handler is identified by the allocation it
//! points to: registering the same handle twice is a no-op.

use crate::{
    config::MAX_HANDLERS,
    handler::{ProtocolHandler, Response},
    transport::Transport,
};
use log::{debug, trace};
use std::{cell::RefCell, fmt, rc::Rc};

/// A shared handle to a protocol handler.
pub type HandlerRef = Rc<RefCell<dyn ProtocolHandler>>;

/// Wraps a handler in a shared handle.
pub fn handler_ref<H: ProtocolHandler + 'static>(handler: H) -> HandlerRef {
    Rc::new(RefCell::new(handler))
}

fn same_handler(a: &HandlerRef, b: &HandlerRef) -> bool {
    Rc::as_ptr(a).cast::<()>() == Rc::as_ptr(b).cast::<()>()
}

/// Routes each line to the first registered handler that claims it.
pub struct Dispatcher {
    handlers: Vec<HandlerRef>,
    capacity: usize,
}

impl Dispatcher {
    /// Creates a dispatcher with room for the default number of handlers.
    pub fn new() -> Self {
        Self::with_capacity(MAX_HANDLERS)
    }

    /// Creates a dispatcher with room for `capacity` handlers.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            handlers: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds a handler at the end of the routing order.
    ///
    /// Returns `true` if the handler is now registered, including when it
    /// already was, and `false` if there's no room.
    pub fn register(&mut self, handler: HandlerRef) -> bool {
        if self.handlers.iter().any(|h| same_handler(h, &handler)) {
            return true;
        }
        if self.handlers.len() >= self.capacity {
            return false;
        }
        debug!("Registered protocol handler '{}'", handler.borrow().name());
        self.handlers.push(handler);
        true
    }

    /// Removes a handler, keeping the order of the others.
    pub fn unregister(&mut self, handler: &HandlerRef) -> bool {
        match self.handlers.iter().position(|h| same_handler(h, handler)) {
            Some(idx) => {
                self.handlers.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Routes a command line.
    ///
    /// An empty line gets no response at all. A line nobody claims gets
    /// the error marker.
    pub fn dispatch(&mut self, line: &str) -> Option<Response> {
        if line.is_empty() {
            return None;
        }
        for handler in &self.handlers {
            if handler.borrow().can_handle(line) {
                return Some(handler.borrow_mut().process(line));
            }
        }
        trace!("No handler for {:?}", line);
        Some(Response::Error)
    }

    /// Polls every handler once, in registration order.
    pub fn poll_all(&mut self, transport: &mut dyn Transport) {
        for handler in &self.handlers {
            handler.borrow_mut().poll(transport);
        }
    }

    /// The number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Gets the handler at a position in the routing order.
    pub fn handler(&self, index: usize) -> Option<&HandlerRef> {
        self.handlers.get(index)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<String> = self
            .handlers
            .iter()
            .map(|h| h.borrow().name().to_string())
            .collect();
        f.debug_struct("Dispatcher")
            .field("handlers", &names)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/////////////////////////////////////////////////////////////////////////////
