//! Event data model: topics, records, payloads, and the pending queue.
//!
//! ## Contents
//! - [`Topic`], [`Event`] the closed topic enumeration and the event record
//! - [`Args`] the payload bundle with its copy/equal/render capability set
//! - `EventQueue` (crate-internal) the priority queue owned by the dispatcher
//!
//! Producers create events through
//! [`Runtime::generate`](crate::Runtime::generate) (default priority) or
//! [`Runtime::generate_event`](crate::Runtime::generate_event) (explicit
//! priority); only the dispatcher ever pops them.

mod args;
mod event;
mod queue;

pub use args::Args;
pub use event::{Event, Topic};

pub(crate) use queue::EventQueue;
