//! The deferred value and its state machine.
//!
//! A [Deferred] starts out pending and settles exactly once, either by being
//! fulfilled with a value, rejected with a reason, or by adopting the state of
//! another thenable. Continuations registered with [Deferred::then] never run
//! on the caller's stack; they are handed to the deferred's [Scheduler].

mod handler;
pub(crate) mod resolve;
mod species;

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use take_mut::take;
use tracing::trace;

pub(crate) use handler::{Handler, Waiters};
pub use species::{Initializer, Species};

use crate::dispatch::handle;
use crate::error::ConstructError;
use crate::scheduler::Scheduler;
use crate::value::{Func, Value};

/// Internal state. Only [State::Pending] may be left, and it is left once.
pub(crate) enum State {
  Pending(Waiters),
  Fulfilled(Value),
  Rejected(Value),
  /// Following another deferred; never reported outside the crate
  Adopted(Deferred),
}
impl State {
  /// Leave [State::Pending], handing back the waiters. A settled state stays
  /// as it is and the transition is discarded.
  pub fn transition(&mut self, next: State) -> Option<Waiters> {
    let mut drained = None;
    take(self, |prev| match prev {
      Self::Pending(waiters) => {
        drained = Some(waiters);
        next
      },
      settled => settled,
    });
    drained
  }

  fn name(&self) -> &'static str {
    match self {
      Self::Pending(_) => "pending",
      Self::Fulfilled(_) => "fulfilled",
      Self::Rejected(_) => "rejected",
      Self::Adopted(_) => "adopted",
    }
  }
}

/// Externally visible state of a [Deferred]. Adoption is transparent: a
/// deferred following another reports the state of the one it follows.
#[derive(Clone, Debug, PartialEq)]
pub enum Snapshot {
  /// Not settled yet
  Pending,
  /// Settled with a value
  Fulfilled(Value),
  /// Settled with a reason
  Rejected(Value),
}

pub(crate) struct Inner {
  pub id: u64,
  pub state: State,
  pub scheduler: Rc<dyn Scheduler>,
  pub species: Option<Rc<dyn Species>>,
}

thread_local! {
  static NEXT_ID: Cell<u64> = const { Cell::new(0) };
}

/// A value that is not known yet. Handles are cheap to clone and compare by
/// identity.
#[derive(Clone)]
pub struct Deferred(pub(crate) Rc<RefCell<Inner>>);
impl Deferred {
  /// A pending deferred that nothing will settle unless the crate does it
  pub(crate) fn bare(scheduler: Rc<dyn Scheduler>, species: Option<Rc<dyn Species>>) -> Self {
    let id = NEXT_ID.with(|c| c.replace(c.get() + 1));
    trace!(id, "deferred created");
    Self(Rc::new(RefCell::new(Inner {
      id,
      state: State::Pending(Waiters::None),
      scheduler,
      species,
    })))
  }

  /// Create a deferred and run `init` right away with a resolver pair bound
  /// to it. Only the first call to either resolver has an effect. If `init`
  /// fails before calling one, the deferred is rejected with the failure.
  ///
  /// ```
  /// use thenable::{Deferred, MicrotaskQueue, Snapshot, Value};
  ///
  /// let queue = MicrotaskQueue::new();
  /// let d = Deferred::new(queue.handle(), |resolve, _reject| {
  ///   resolve.call1(Value::from(1))?;
  ///   Ok(())
  /// });
  /// assert_eq!(d.state(), Snapshot::Fulfilled(Value::from(1)));
  /// ```
  pub fn new(
    scheduler: Rc<dyn Scheduler>,
    init: impl FnOnce(Func, Func) -> Result<(), Value>,
  ) -> Self {
    let this = Self::bare(scheduler, None);
    resolve::do_resolve(&this, init);
    this
  }

  /// Construct a deferred that belongs to `species`. Species call this from
  /// [Species::construct]; deferreds built this way route [Deferred::then]
  /// back through their species.
  pub fn with_species(
    species: Rc<dyn Species>,
    scheduler: Rc<dyn Scheduler>,
    init: impl FnOnce(Func, Func) -> Result<(), Value>,
  ) -> Self {
    let this = Self::bare(scheduler, Some(species));
    resolve::do_resolve(&this, init);
    this
  }

  /// Dynamic form of [Deferred::new] for initializers that arrive as values.
  /// The initializer is called with the resolvers as [Value::Func]s.
  pub fn construct(scheduler: Rc<dyn Scheduler>, init: &Value) -> Result<Self, ConstructError> {
    let init = (init.as_func().cloned()).ok_or(ConstructError::NotCallable(init.type_str()))?;
    Ok(Self::new(scheduler, move |res, rej| init.call(&[Value::Func(res), Value::Func(rej)]).map(|_| ())))
  }

  /// A deferred resolved with `value`. A deferred is returned unchanged,
  /// anything else goes through the resolution procedure, so thenables are
  /// adopted.
  pub fn resolved(scheduler: Rc<dyn Scheduler>, value: Value) -> Self {
    if let Value::Deferred(d) = value {
      return d;
    }
    let this = Self::bare(scheduler, None);
    resolve::resolve(&this, value);
    this
  }

  /// A deferred rejected with `reason`
  pub fn rejected(scheduler: Rc<dyn Scheduler>, reason: Value) -> Self {
    let this = Self::bare(scheduler, None);
    resolve::reject(&this, reason);
    this
  }

  /// Register continuations and get a deferred for their outcome. A missing
  /// continuation passes the value or reason through to the child unchanged.
  /// Neither continuation runs before this call returns, even if `self` is
  /// already settled.
  pub fn then(&self, on_fulfilled: Option<Func>, on_rejected: Option<Func>) -> Self {
    if let Some(species) = self.species() {
      return species::safe_then(self, species, on_fulfilled, on_rejected);
    }
    let child = Self::bare(self.scheduler(), None);
    handle(self, Handler::new(on_fulfilled, on_rejected, child.clone()));
    child
  }

  /// Dynamic form of [Deferred::then]. Arguments that aren't functions count
  /// as missing.
  pub fn then_value(&self, on_fulfilled: &Value, on_rejected: &Value) -> Self {
    self.then(on_fulfilled.as_func().cloned(), on_rejected.as_func().cloned())
  }

  /// Observe only rejections
  pub fn catch(&self, on_rejected: Func) -> Self { self.then(None, Some(on_rejected)) }

  /// Run `f` with no arguments once this settles either way. The result
  /// settles like `self` after whatever `f` returned has settled, unless `f`
  /// fails, in which case it is rejected with that failure.
  pub fn finally(&self, f: Func) -> Self {
    let on_fulfilled = {
      let (f, scheduler) = (f.clone(), self.scheduler());
      Func::new1("finally", move |value| {
        let after = Self::resolved(scheduler.clone(), f.call(&[])?);
        Ok(after.then(Some(Func::new1("finally::pass", move |_| Ok(value.clone()))), None).into())
      })
    };
    let on_rejected = {
      let scheduler = self.scheduler();
      Func::new1("finally", move |reason| {
        let after = Self::resolved(scheduler.clone(), f.call(&[])?);
        Ok(after.then(Some(Func::new1("finally::rethrow", move |_| Err(reason.clone()))), None).into())
      })
    };
    self.then(Some(on_fulfilled), Some(on_rejected))
  }

  /// Current state, following adoption links
  pub fn state(&self) -> Snapshot {
    let end = self.settled_end();
    let snapshot = match &end.0.borrow().state {
      State::Fulfilled(v) => Snapshot::Fulfilled(v.clone()),
      State::Rejected(r) => Snapshot::Rejected(r.clone()),
      State::Pending(_) | State::Adopted(_) => Snapshot::Pending,
    };
    snapshot
  }

  /// Whether the deferred is still waiting for a value, including while it
  /// follows another deferred that is
  pub fn is_pending(&self) -> bool { self.state() == Snapshot::Pending }

  /// Follow adoption links to the deferred that actually holds the state.
  /// This is a loop so arbitrarily long chains don't grow the stack.
  pub(crate) fn settled_end(&self) -> Self {
    let mut cur = self.clone();
    loop {
      let next = match &cur.0.borrow().state {
        State::Adopted(next) => next.clone(),
        _ => break,
      };
      cur = next;
    }
    cur
  }

  /// Number of handlers waiting on this deferred itself
  pub fn waiting(&self) -> usize {
    match &self.0.borrow().state {
      State::Pending(waiters) => waiters.len(),
      _ => 0,
    }
  }

  /// Identifier unique among the deferreds created on this thread
  pub fn id(&self) -> u64 { self.0.borrow().id }

  /// Whether the handles refer to the same deferred
  pub fn ptr_eq(&self, other: &Self) -> bool { Rc::ptr_eq(&self.0, &other.0) }

  /// The scheduler continuations registered on this deferred run on
  pub fn scheduler(&self) -> Rc<dyn Scheduler> { self.0.borrow().scheduler.clone() }

  /// The species that constructed this deferred, if it isn't a plain one
  pub fn species(&self) -> Option<Rc<dyn Species>> { self.0.borrow().species.clone() }
}

impl Debug for Deferred {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self.0.try_borrow() {
      Ok(inner) => write!(f, "Deferred#{}({})", inner.id, inner.state.name()),
      Err(_) => write!(f, "Deferred(<in transition>)"),
    }
  }
}
