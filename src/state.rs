#![deny(missing_docs)]

//! This module implements the global state threaded through every evaluation
//! step: the console and the registry of computations waiting on signals

use std::{
    cell::RefCell,
    collections::HashMap,
    io::{self, Write},
    rc::Rc,
};

use crate::{eval::cont::Cont, symbol::Symbol};

/// Everything a step may touch outside the guest heap
pub struct GlobalState {
    console: Box<dyn Write>,
    pending: HashMap<Symbol, Cont>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self::new(Box::new(io::stdout()))
    }
}

impl GlobalState {
    /// Creates a state writing console output to `console`
    pub fn new(console: Box<dyn Write>) -> Self {
        Self {
            console,
            pending: HashMap::default(),
        }
    }

    /// Creates a state whose console output is kept in memory
    pub fn with_transcript() -> (Self, Transcript) {
        let transcript = Transcript::default();
        (Self::new(Box::new(transcript.clone())), transcript)
    }

    /// Returns the console sink
    #[inline]
    pub fn console(&mut self) -> &mut dyn Write {
        &mut *self.console
    }

    /// Parks `k` until `signal` is posted. A second wait on the same signal
    /// replaces the first
    pub fn suspend(&mut self, signal: Symbol, k: Cont) {
        self.pending.insert(signal, k);
    }

    /// Removes and returns the computation waiting on `signal`
    pub fn take_pending(&mut self, signal: &Symbol) -> Option<Cont> {
        self.pending.remove(signal)
    }

    /// Returns the computation waiting on `signal` without removing it
    pub fn pending(&self, signal: &Symbol) -> Option<&Cont> {
        self.pending.get(signal)
    }

    /// Returns whether any computation is waiting on a signal
    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// An in-memory console shared between a `GlobalState` and its owner
#[derive(Clone, Default)]
pub struct Transcript(Rc<RefCell<Vec<u8>>>);

impl Transcript {
    /// Returns everything written so far, lossily decoded
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    /// Discards everything written so far
    pub fn clear(&self) {
        self.0.borrow_mut().clear()
    }
}

impl Write for Transcript {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
