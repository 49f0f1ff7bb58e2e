//! Deferreds built by an alternate constructor. Calling [Deferred::then] on
//! them must produce a value of the same species, so the canonical machinery
//! runs against a bare deferred and its outcome is forwarded into one the
//! species constructs.

use std::rc::Rc;

use tracing::trace;

use super::{Deferred, Handler};
use crate::dispatch::handle;
use crate::scheduler::Scheduler;
use crate::value::{Func, Value};

/// An initializer as passed to [Species::construct]
pub type Initializer = Box<dyn FnOnce(Func, Func) -> Result<(), Value>>;

/// A constructor for deferreds other than the canonical one, for example to
/// attach instrumentation to every deferred of a family.
pub trait Species {
  /// Name for diagnostics
  fn name(&self) -> &'static str;

  /// Build a deferred of this species running `init`. Implementations are
  /// expected to end up in [Deferred::with_species] with `self`.
  fn construct(self: Rc<Self>, scheduler: Rc<dyn Scheduler>, init: Initializer) -> Deferred;
}

pub(super) fn safe_then(
  this: &Deferred,
  species: Rc<dyn Species>,
  on_fulfilled: Option<Func>,
  on_rejected: Option<Func>,
) -> Deferred {
  trace!(id = this.id(), species = species.name(), "then through species");
  let (this, scheduler) = (this.clone(), this.scheduler());
  species.construct(
    scheduler.clone(),
    Box::new(move |resolve: Func, reject: Func| {
      let relay = Deferred::bare(scheduler, None);
      relay.then(Some(resolve), Some(reject));
      handle(&this, Handler::new(on_fulfilled, on_rejected, relay));
      Ok(())
    }),
  )
}

#[cfg(test)]
mod test {
  use std::cell::Cell;
  use std::rc::Rc;

  use super::{Initializer, Species};
  use crate::deferred::{Deferred, Snapshot};
  use crate::scheduler::{MicrotaskQueue, Scheduler};
  use crate::value::{Func, Value};

  #[derive(Default)]
  struct Counting {
    built: Cell<usize>,
  }
  impl Species for Counting {
    fn name(&self) -> &'static str { "Counting" }
    fn construct(self: Rc<Self>, scheduler: Rc<dyn Scheduler>, init: Initializer) -> Deferred {
      self.built.set(self.built.get() + 1);
      Deferred::with_species(self, scheduler, init)
    }
  }

  #[test]
  fn then_keeps_species() {
    let queue = MicrotaskQueue::new();
    let counting = Rc::new(Counting::default());
    let init: Initializer = Box::new(|res: Func, _: Func| res.call1(2.into()).map(|_| ()));
    let d = counting.clone().construct(queue.handle(), init);
    let doubled = d.then(Some(Func::new1("double", |v| Ok((v.as_int()? * 2).into()))), None);
    let failed = doubled.then(Some(Func::new1("fail", |_| Err("no".into()))), None);
    assert_eq!(counting.built.get(), 3);
    assert!(doubled.species().is_some_and(|s| s.name() == "Counting"));
    queue.run_until_idle();
    assert_eq!(doubled.state(), Snapshot::Fulfilled(4.into()));
    assert_eq!(failed.state(), Snapshot::Rejected("no".into()));
  }

  #[test]
  fn plain_then_has_no_species() {
    let queue = MicrotaskQueue::new();
    let d = Deferred::resolved(queue.handle(), Value::Undefined);
    assert!(d.then(None, None).species().is_none());
  }
}
