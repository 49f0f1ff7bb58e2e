//! Diagnostic observers for external instrumentation. They are informed of
//! the machine's progress but cannot influence it; their return values are
//! discarded and they run with no internal borrows held.
//!
//! Deferreds are confined to one thread, so "process-wide" here means
//! thread-wide: each thread running deferreds has its own pair of hooks.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use tracing::warn;
use trait_set::trait_set;

use crate::deferred::Deferred;
use crate::error::Panicked;
use crate::value::Value;

trait_set! {
  /// Called with the deferred a handler is about to be attached to or
  /// dispatched against, after following adoption links
  pub trait OnHandle = Fn(&Deferred) + 'static;
  /// Called with a deferred and its reason when it becomes rejected
  pub trait OnReject = Fn(&Deferred, &Value) + 'static;
}

/// The pair of observers installed on a thread, see [save] and [restore]
#[derive(Clone, Default)]
pub(crate) struct Hooks {
  on_handle: Option<Rc<dyn OnHandle>>,
  on_reject: Option<Rc<dyn OnReject>>,
}

thread_local! {
  static HOOKS: RefCell<Hooks> = RefCell::default();
}

/// Install the before-handling observer, replacing any previous one
pub fn set_on_handle(f: impl OnHandle) {
  HOOKS.with(|h| h.borrow_mut().on_handle = Some(Rc::new(f)))
}

/// Install the rejection observer, replacing any previous one
pub fn set_on_reject(f: impl OnReject) {
  HOOKS.with(|h| h.borrow_mut().on_reject = Some(Rc::new(f)))
}

/// Remove both observers
pub fn clear() { HOOKS.with(|h| *h.borrow_mut() = Hooks::default()) }

/// Whether any observer is installed
pub fn installed() -> bool {
  HOOKS.with(|h| {
    let h = h.borrow();
    h.on_handle.is_some() || h.on_reject.is_some()
  })
}

/// The observers currently installed
pub(crate) fn save() -> Hooks { HOOKS.with(|h| h.borrow().clone()) }

/// Reinstall observers obtained from [save]
pub(crate) fn restore(hooks: Hooks) { HOOKS.with(|h| *h.borrow_mut() = hooks) }

/// A panicking observer is logged and otherwise ignored
fn observe(hook: &'static str, f: impl FnOnce()) {
  if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
    warn!(hook, reason = %Panicked::from_payload(payload), "diagnostic hook panicked");
  }
}

pub(crate) fn before_handle(target: &Deferred) {
  // cloned out so the hook may replace the hooks
  if let Some(f) = HOOKS.with(|h| h.borrow().on_handle.clone()) {
    observe("on_handle", || f(target))
  }
}

pub(crate) fn on_reject(target: &Deferred, reason: &Value) {
  if let Some(f) = HOOKS.with(|h| h.borrow().on_reject.clone()) {
    observe("on_reject", || f(target, reason))
  }
}

#[cfg(test)]
mod test {
  use std::cell::RefCell;
  use std::rc::Rc;

  use super::{clear, installed, set_on_handle, set_on_reject};
  use crate::deferred::{Deferred, Snapshot};
  use crate::scheduler::MicrotaskQueue;
  use crate::value::{Func, Value};

  type Log = Rc<RefCell<Vec<String>>>;

  fn note(log: &Log, name: &'static str, f: impl Fn(Value) -> Value + 'static) -> Option<Func> {
    let log = log.clone();
    Some(Func::new1(name, move |v| {
      log.borrow_mut().push(format!("{name} {v}"));
      Ok(f(v))
    }))
  }

  /// A fulfilled and a rejected chain interleaved on one queue
  fn run_chains() -> (Vec<Snapshot>, Vec<String>) {
    let queue = MicrotaskQueue::new();
    let log = Log::default();
    let ok = Deferred::resolved(queue.handle(), 1.into())
      .then(note(&log, "double", |v| (v.as_int().unwrap_or(0) * 2).into()), None);
    let failed = Deferred::rejected(queue.handle(), "bad".into());
    let recovered = failed.then(None, note(&log, "recover", |_| 0.into()));
    let tail = ok.then(note(&log, "tail", |v| v), None);
    queue.run_until_idle();
    let states = vec![ok.state(), failed.state(), recovered.state(), tail.state()];
    let log = log.borrow().clone();
    (states, log)
  }

  #[test]
  fn observers_do_not_change_outcomes() {
    let plain = run_chains();
    let handled = Rc::new(RefCell::new(Vec::new()));
    let rejected = Rc::new(RefCell::new(Vec::new()));
    set_on_handle({
      let handled = handled.clone();
      move |d: &Deferred| handled.borrow_mut().push(d.id())
    });
    set_on_reject({
      let rejected = rejected.clone();
      move |_: &Deferred, reason: &Value| rejected.borrow_mut().push(reason.clone())
    });
    let observed = run_chains();
    clear();
    assert_eq!(plain, observed);
    assert_eq!(observed.1, vec!["double 1", "recover bad", "tail 2"]);
    assert_eq!(*rejected.borrow(), vec![Value::from("bad")]);
    // three registrations and the queued tail dispatched when `ok` settles
    assert_eq!(handled.borrow().len(), 4);
  }

  #[test]
  fn panicking_observers_are_contained() {
    set_on_handle(|_: &Deferred| panic!("on_handle"));
    set_on_reject(|_: &Deferred, _: &Value| panic!("on_reject"));
    let queue = MicrotaskQueue::new();
    let slot = Rc::new(RefCell::new(None));
    let d = Deferred::new(queue.handle(), {
      let slot = slot.clone();
      move |_, rej| {
        *slot.borrow_mut() = Some(rej);
        Ok(())
      }
    });
    let child = d.then(None, Some(Func::new1("recover", |r| Ok(r))));
    let rej = slot.borrow_mut().take().expect("initializer runs synchronously");
    rej.call1("late".into()).unwrap();
    queue.run_until_idle();
    clear();
    assert!(!installed());
    assert_eq!(d.state(), Snapshot::Rejected("late".into()));
    assert_eq!(child.state(), Snapshot::Fulfilled("late".into()));
  }
}
