//! The resolution procedure. Every path that settles a deferred ends up in
//! [resolve] or [reject], and every settlement ends in [finale].

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, trace};

use super::{Deferred, State, Waiters};
use crate::dispatch::handle;
use crate::error::{ExternError, TypeError};
use crate::hooks;
use crate::trap::{self, Then};
use crate::utils::unwrap_or;
use crate::value::{Func, Value};

/// Settle `target` with `value`, adopting the state of `value` if it is a
/// thenable.
pub(crate) fn resolve(target: &Deferred, value: Value) {
  if value.as_deferred().is_some_and(|d| d.ptr_eq(target)) {
    debug!(id = target.id(), "deferred resolved with itself");
    return reject(target, TypeError::self_resolution().value());
  }
  match trap::get_then(&value) {
    Err(e) => reject(target, e),
    Ok(Then::Adopt(other)) => {
      if other.settled_end().ptr_eq(target) {
        debug!(id = target.id(), "adoption chain leads back to the deferred");
        return reject(target, TypeError::new("Chaining cycle detected for promise").value());
      }
      trace!(id = target.id(), adopted = other.id(), "adopting");
      transition(target, State::Adopted(other));
    },
    Ok(Then::Foreign(then)) => {
      trace!(id = target.id(), then = then.name(), "delegating to foreign thenable");
      do_resolve(target, move |res, rej| {
        then.call(&[Value::Func(res), Value::Func(rej)]).map(|_| ())
      })
    },
    Ok(Then::Plain) => {
      trace!(id = target.id(), %value, "fulfilled");
      transition(target, State::Fulfilled(value));
    },
  }
}

/// Settle `target` with a failure
pub(crate) fn reject(target: &Deferred, reason: Value) {
  let waiters = unwrap_or!(transition_silent(target, State::Rejected(reason.clone())); return);
  trace!(id = target.id(), %reason, "rejected");
  hooks::on_reject(target, &reason);
  finale(target, waiters);
}

fn transition(target: &Deferred, next: State) {
  if let Some(waiters) = transition_silent(target, next) {
    finale(target, waiters)
  }
}

/// Attempt the state change without notifying anyone. [None] means `target`
/// had already left [State::Pending] and nothing changed.
fn transition_silent(target: &Deferred, next: State) -> Option<Waiters> {
  let drained = target.0.borrow_mut().state.transition(next);
  if drained.is_none() {
    trace!(id = target.id(), "ignored settlement of a settled deferred");
  }
  drained
}

/// Hand every waiter to the dispatcher, in registration order. `target` may
/// have adopted another deferred, in which case the waiters move over to it.
fn finale(target: &Deferred, waiters: Waiters) {
  for handler in waiters {
    handle(target, handler)
  }
}

/// Run a potentially misbehaving initializer against `target`, making sure
/// only the first call to either resolver counts. A failure of the
/// initializer itself rejects `target` unless a resolver was already called.
pub(crate) fn do_resolve(target: &Deferred, init: impl FnOnce(Func, Func) -> Result<(), Value>) {
  let done = Rc::new(Cell::new(false));
  let on_value = {
    let (done, target) = (done.clone(), target.clone());
    Func::new1("resolve", move |value| {
      if !done.replace(true) {
        resolve(&target, value)
      }
      Ok(Value::Undefined)
    })
  };
  let on_reason = {
    let (done, target) = (done.clone(), target.clone());
    Func::new1("reject", move |reason| {
      if !done.replace(true) {
        reject(&target, reason)
      }
      Ok(Value::Undefined)
    })
  };
  if let Err(e) = trap::try_call_two(init, on_value, on_reason) {
    if !done.replace(true) {
      reject(target, e)
    }
  }
}
