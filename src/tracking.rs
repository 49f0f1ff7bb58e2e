//! Detection of rejections nobody handles, built on [crate::hooks].
//!
//! A rejected deferred counts as handled once a handler is attached to it or
//! dispatched against it. Whatever is still unhandled when the owner asks for
//! a [RejectionTracker::report] (typically after draining the scheduler) is
//! logged as a warning. If a handler shows up for a rejection that was
//! already reported, that is logged as well.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;
use itertools::Itertools;
use tracing::warn;

use crate::deferred::Deferred;
use crate::hooks;
use crate::value::Value;

/// Settings for a [RejectionTracker]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrackerConfig {
  /// Track every rejection. By default only rejections whose reason is a
  /// [Value::Error] are tracked, since plain values are often rejected on
  /// purpose as control flow.
  pub all_rejections: bool,
}

/// A rejection that had no handler when it was reported
#[derive(Clone, Debug, PartialEq)]
pub struct Unhandled {
  /// [Deferred::id] of the rejected deferred
  pub id: u64,
  /// The reason it was rejected with
  pub reason: Value,
}

struct Entry {
  reason: Value,
  logged: bool,
}

/// Records rejections and forgets them when they get handled. Enabling a
/// tracker takes over the thread's [hooks]; dropping it puts back whatever
/// was installed before. Trackers nest, so they must be dropped in reverse
/// order of enabling.
pub struct RejectionTracker {
  entries: Rc<RefCell<HashMap<u64, Entry>>>,
  previous: Option<hooks::Hooks>,
}
impl RejectionTracker {
  /// Install the hooks and start tracking
  pub fn enable(config: TrackerConfig) -> Self {
    let entries = Rc::new(RefCell::new(HashMap::<u64, Entry>::new()));
    let previous = Some(hooks::save());
    hooks::set_on_reject({
      let entries = entries.clone();
      move |d: &Deferred, reason: &Value| {
        if config.all_rejections || matches!(reason, Value::Error(_)) {
          entries.borrow_mut().insert(d.id(), Entry { reason: reason.clone(), logged: false });
        }
      }
    });
    hooks::set_on_handle({
      let entries = entries.clone();
      move |d: &Deferred| {
        let removed = entries.borrow_mut().remove(&d.id());
        if let Some(Entry { reason, logged: true }) = removed {
          warn!(id = d.id(), %reason, "rejection handled after it was reported");
        }
      }
    });
    Self { entries, previous }
  }

  /// Rejections currently without a handler, oldest first
  pub fn unhandled(&self) -> Vec<Unhandled> {
    (self.entries.borrow().iter())
      .map(|(id, e)| Unhandled { id: *id, reason: e.reason.clone() })
      .sorted_by_key(|u| u.id)
      .collect()
  }

  /// Log every unhandled rejection that hasn't been logged yet and return
  /// them
  pub fn report(&self) -> Vec<Unhandled> {
    let mut entries = self.entries.borrow_mut();
    let fresh = (entries.iter_mut())
      .filter(|(_, e)| !e.logged)
      .map(|(id, e)| {
        e.logged = true;
        Unhandled { id: *id, reason: e.reason.clone() }
      })
      .sorted_by_key(|u| u.id)
      .collect_vec();
    for u in fresh.iter() {
      warn!(id = u.id, reason = %u.reason, "possible unhandled rejection");
    }
    fresh
  }
}
impl Drop for RejectionTracker {
  fn drop(&mut self) {
    if let Some(previous) = self.previous.take() {
      hooks::restore(previous)
    }
  }
}

#[cfg(test)]
mod test {
  use super::{RejectionTracker, TrackerConfig, Unhandled};
  use crate::deferred::Deferred;
  use crate::error::{ExternError, TypeError};
  use crate::scheduler::MicrotaskQueue;
  use crate::value::{Func, Value};
  use crate::hooks;

  #[test]
  fn reports_only_unhandled() {
    let queue = MicrotaskQueue::new();
    let tracker = RejectionTracker::enable(TrackerConfig::default());
    let lost = Deferred::rejected(queue.handle(), TypeError::new("lost").value());
    let caught = Deferred::rejected(queue.handle(), TypeError::new("caught").value());
    caught.catch(Func::new1("swallow", |_| Ok(Value::Undefined)));
    let _plain = Deferred::rejected(queue.handle(), "not an error".into());
    queue.run_until_idle();
    let report = tracker.report();
    assert_eq!(report, vec![Unhandled { id: lost.id(), reason: TypeError::new("lost").value() }]);
    assert!(tracker.report().is_empty(), "each rejection is reported once");
    assert_eq!(tracker.unhandled().len(), 1);
    lost.catch(Func::new1("late", |_| Ok(Value::Undefined)));
    assert!(tracker.unhandled().is_empty());
    drop(tracker);
    assert!(!hooks::installed());
  }

  #[test]
  fn passthrough_children_are_tracked() {
    let queue = MicrotaskQueue::new();
    let tracker = RejectionTracker::enable(TrackerConfig { all_rejections: true });
    let root = Deferred::rejected(queue.handle(), "x".into());
    let child = root.then(Some(Func::new1("unused", Ok)), None);
    queue.run_until_idle();
    let ids = tracker.unhandled().into_iter().map(|u| u.id).collect::<Vec<_>>();
    assert_eq!(ids, vec![child.id()]);
  }

  #[test]
  fn dropping_restores_previous_hooks() {
    let queue = MicrotaskQueue::new();
    let outer = RejectionTracker::enable(TrackerConfig { all_rejections: true });
    let inner = RejectionTracker::enable(TrackerConfig { all_rejections: true });
    let _seen_by_inner = Deferred::rejected(queue.handle(), "first".into());
    drop(inner);
    assert!(hooks::installed());
    let second = Deferred::rejected(queue.handle(), "second".into());
    let ids = outer.unhandled().into_iter().map(|u| u.id).collect::<Vec<_>>();
    assert_eq!(ids, vec![second.id()]);
    drop(outer);
    assert!(!hooks::installed());
  }
}
