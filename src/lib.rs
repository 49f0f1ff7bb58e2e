#![warn(missing_docs)]
//! Deferred values with Promises/A+ resolution semantics for single-threaded
//! hosts.
//!
//! A [Deferred] is settled exactly once. Continuations registered with
//! [Deferred::then] run as tasks on an injected [Scheduler], never on the
//! stack that registered them or settled the deferred. Values that expose a
//! `then` member, whether deferreds of this crate or foreign [Object]s, are
//! adopted rather than delivered as-is.
//!
//! ```
//! use thenable::{Deferred, Func, MicrotaskQueue, Snapshot};
//!
//! let queue = MicrotaskQueue::new();
//! let d = Deferred::new(queue.handle(), |resolve, _| resolve.call1(1.into()).map(|_| ()));
//! let out = (d.then(Some(Func::new1("inc", |v| Ok((v.as_int()? + 1).into()))), None))
//!   .then(Some(Func::new1("times_ten", |v| Ok((v.as_int()? * 10).into()))), None);
//! queue.run_until_idle();
//! assert_eq!(out.state(), Snapshot::Fulfilled(20.into()));
//! ```
pub mod deferred;
mod dispatch;
pub mod error;
pub mod hooks;
pub mod scheduler;
pub mod tracking;
pub mod trap;
mod utils;
pub mod value;

pub use deferred::{Deferred, Initializer, Snapshot, Species};
pub use error::{ConstructError, ExternError, Panicked, TypeError};
pub use scheduler::{Drain, MicrotaskQueue, QueueConfig, Scheduler, Task};
pub use tracking::{RejectionTracker, TrackerConfig, Unhandled};
pub use value::{Func, Object, Value};
