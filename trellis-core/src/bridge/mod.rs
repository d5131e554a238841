//! Bridges from the outside world into the graph.
//!
//! Event sources and async tasks push values; the graph pulls. A bridge is
//! an observable whose writes come from outside: each delivered value is
//! written in its own transaction, and nothing is delivered after the
//! bridge is disposed.

mod event;
mod future;

pub use event::{from_event, EventEmitter, EventObservable, EventSource, Subscription};
pub use future::{from_future, from_stream, AsyncObservable};
