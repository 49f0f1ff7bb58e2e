//! Attaching handlers to deferreds and running them once the deferred
//! settles. Handlers always run as scheduler tasks, never on the stack that
//! registered them or settled their parent.

use tracing::trace;

use crate::deferred::resolve::{reject, resolve};
use crate::deferred::{Deferred, Handler, State};
use crate::hooks;
use crate::trap::try_call_one;

/// Attach `handler` to the deferred that actually holds the state of `this`,
/// queueing it if that one is pending and scheduling it otherwise.
pub(crate) fn handle(this: &Deferred, handler: Handler) {
  let target = this.settled_end();
  hooks::before_handle(&target);
  {
    let mut inner = target.0.borrow_mut();
    let id = inner.id;
    if let State::Pending(waiters) = &mut inner.state {
      trace!(id, child = handler.child.id(), "handler queued");
      waiters.push(handler);
      return;
    }
  }
  handle_resolved(target, handler)
}

fn handle_resolved(parent: Deferred, handler: Handler) {
  trace!(id = parent.id(), child = handler.child.id(), "handler scheduled");
  let scheduler = parent.scheduler();
  scheduler.schedule(Box::new(move || run_handler(&parent, handler)))
}

fn run_handler(parent: &Deferred, handler: Handler) {
  let Handler { on_fulfilled, on_rejected, child } = handler;
  let (callback, payload, fulfilled) = match &parent.0.borrow().state {
    State::Fulfilled(v) => (on_fulfilled, v.clone(), true),
    State::Rejected(r) => (on_rejected, r.clone(), false),
    State::Pending(_) | State::Adopted(_) => unreachable!("handlers are scheduled on settled deferreds"),
  };
  match callback {
    None if fulfilled => resolve(&child, payload),
    None => reject(&child, payload),
    Some(callback) => match try_call_one(&callback, payload) {
      Ok(ret) => resolve(&child, ret),
      Err(e) => reject(&child, e),
    },
  }
}
