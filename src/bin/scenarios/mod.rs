//! Named end-to-end scenarios. Each builds a deferred on the given queue and
//! states the outcome it must settle with once the queue is drained.

use std::cell::RefCell;
use std::rc::Rc;

use thenable::{
  Deferred, ExternError, Func, MicrotaskQueue, Object, Scheduler, Snapshot, TypeError, Value,
};

pub struct Scenario {
  pub name: &'static str,
  pub about: &'static str,
  pub build: fn(&MicrotaskQueue) -> Deferred,
  pub expect: fn() -> Snapshot,
}

fn arith(name: &'static str, f: fn(i64) -> i64) -> Option<Func> {
  Some(Func::new1(name, move |v| Ok(f(v.as_int()?).into())))
}

#[derive(Debug)]
struct Seven;
impl Object for Seven {
  fn type_str(&self) -> &'static str { "Seven" }
  fn then_member(&self) -> Result<Value, Value> {
    Ok(Value::Func(Func::new("then", |args: &[Value]| match args.first() {
      Some(Value::Func(resolve)) => resolve.call1(7.into()),
      _ => Err(TypeError::new("then called without a resolver").value()),
    })))
  }
}

pub fn all() -> Vec<Scenario> {
  vec![
    Scenario {
      name: "chain",
      about: "resolve(1), then +1, then *10",
      build: |q| {
        Deferred::new(q.handle(), |res, _| res.call1(1.into()).map(|_| ()))
          .then(arith("inc", |v| v + 1), None)
          .then(arith("times_ten", |v| v * 10), None)
      },
      expect: || Snapshot::Fulfilled(20.into()),
    },
    Scenario {
      name: "recover",
      about: "reject(\"boom\"), recover with the reason's length",
      build: |q| {
        let len = Func::new1("length", |e| Ok(e.length()?.into()));
        Deferred::new(q.handle(), |_, rej| rej.call1("boom".into()).map(|_| ())).then(None, Some(len))
      },
      expect: || Snapshot::Fulfilled(4.into()),
    },
    Scenario {
      name: "passthrough",
      about: "then without onFulfilled keeps the value",
      build: |q| Deferred::resolved(q.handle(), 42.into()).then(None, None),
      expect: || Snapshot::Fulfilled(42.into()),
    },
    Scenario {
      name: "first-wins",
      about: "resolving and rejecting twice only counts the first call",
      build: |q| {
        Deferred::new(q.handle(), |res, rej| {
          res.call1(1.into())?;
          rej.call1(2.into())?;
          res.call1(3.into()).map(|_| ())
        })
        .then(arith("id", |v| v), None)
      },
      expect: || Snapshot::Fulfilled(1.into()),
    },
    Scenario {
      name: "adopt-rejection",
      about: "a continuation returning a deferred that rejects later",
      build: |q| {
        let slot: Rc<RefCell<Option<Func>>> = Rc::default();
        let inner = Deferred::new(q.handle(), {
          let slot = slot.clone();
          move |_, rej| {
            *slot.borrow_mut() = Some(rej);
            Ok(())
          }
        });
        // two hops, so the rejection lands after the continuation returned
        let scheduler = q.handle();
        q.handle().schedule(Box::new(move || {
          scheduler.schedule(Box::new(move || {
            if let Some(rej) = slot.borrow_mut().take() {
              let _ = rej.call1("R".into());
            }
          }))
        }));
        Deferred::resolved(q.handle(), Value::Undefined)
          .then(Some(Func::new1("adopt", move |_| Ok(inner.clone().into()))), None)
      },
      expect: || Snapshot::Rejected("R".into()),
    },
    Scenario {
      name: "raise",
      about: "a continuation failing rejects its child",
      build: |q| {
        Deferred::resolved(q.handle(), 1.into())
          .then(Some(Func::new1("raise", |_| Err("raised".into()))), None)
      },
      expect: || Snapshot::Rejected("raised".into()),
    },
    Scenario {
      name: "foreign",
      about: "a foreign thenable returned from a continuation is adopted",
      build: |q| {
        Deferred::resolved(q.handle(), Value::Undefined)
          .then(Some(Func::new1("foreign", |_| Ok(Value::object(Seven)))), None)
      },
      expect: || Snapshot::Fulfilled(7.into()),
    },
  ]
}
