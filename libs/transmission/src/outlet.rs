//! Outgoing paths of a transformer.
//!
//! Before the router wires a transformer, whatever it emits is buffered in
//! order. Wiring flushes the buffer into the sink and from then on every
//! emit is delivered synchronously, so items leave a transformer in program
//! order.

use crate::bus::BusProducer;
use crate::error::{Result, TransmissionError};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Destination an outlet delivers into once attached
pub trait OutletSink<T>: Send + Sync {
    fn deliver(&self, item: T) -> Result<()>;
}

impl<T: Clone + Send + 'static> OutletSink<T> for BusProducer<T> {
    fn deliver(&self, item: T) -> Result<()> {
        self.send(item).map(|_| ())
    }
}

impl<T: Send + 'static> OutletSink<T> for mpsc::UnboundedSender<T> {
    fn deliver(&self, item: T) -> Result<()> {
        self.send(item)
            .map_err(|_| TransmissionError::BusClosed("query-relay"))
    }
}

enum OutletState<T> {
    Buffering(Vec<T>),
    Attached(Box<dyn OutletSink<T>>),
    Closed,
}

pub(crate) struct Outlet<T> {
    name: &'static str,
    state: Mutex<OutletState<T>>,
}

impl<T: Send + 'static> Outlet<T> {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(OutletState::Buffering(Vec::new())),
        }
    }

    pub(crate) fn emit(&self, item: T) -> Result<()> {
        let mut state = self.state.lock();
        match &mut *state {
            OutletState::Buffering(buffer) => {
                buffer.push(item);
                Ok(())
            }
            OutletState::Attached(sink) => sink.deliver(item),
            OutletState::Closed => Err(TransmissionError::BusClosed(self.name)),
        }
    }

    /// Flush buffered items into `sink` and deliver straight into it afterwards
    pub(crate) fn attach(&self, sink: impl OutletSink<T> + 'static) -> Result<()> {
        let mut state = self.state.lock();
        let buffered = match std::mem::replace(&mut *state, OutletState::Closed) {
            OutletState::Buffering(buffer) => buffer,
            OutletState::Attached(_) => Vec::new(),
            OutletState::Closed => return Err(TransmissionError::BusClosed(self.name)),
        };
        for item in buffered {
            sink.deliver(item)?;
        }
        *state = OutletState::Attached(Box::new(sink));
        Ok(())
    }

    pub(crate) fn close(&self) {
        *self.state.lock() = OutletState::Closed;
    }

    #[cfg(test)]
    pub(crate) fn buffered(&self) -> usize {
        match &*self.state.lock() {
            OutletState::Buffering(buffer) => buffer.len(),
            _ => 0,
        }
    }
}
