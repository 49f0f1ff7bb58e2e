//! Calls into user code and foreign objects. Failures, whether reported with
//! an `Err` or by panicking, come back as an ordinary `Err` so the resolution
//! machinery never unwinds.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::debug;

use crate::deferred::Deferred;
use crate::error::{ExternError, Panicked};
use crate::value::{Func, Value};

/// What the `then` capability of a value turned out to be
#[derive(Clone, Debug)]
pub enum Then {
  /// A deferred of this crate, its state can be adopted directly
  Adopt(Deferred),
  /// A foreign thenable's `then`, to be run as an initializer
  Foreign(Func),
  /// Not a thenable
  Plain,
}

fn trap<T>(f: impl FnOnce() -> Result<T, Value>) -> Result<T, Value> {
  let res = match catch_unwind(AssertUnwindSafe(f)) {
    Ok(res) => res,
    Err(payload) => Err(Panicked::from_payload(payload).value()),
  };
  if let Err(e) = &res {
    debug!(reason = %e, "trapped failure in user code");
  }
  res
}

/// Read the `then` capability of a value
pub fn get_then(value: &Value) -> Result<Then, Value> {
  match value {
    Value::Deferred(d) => Ok(Then::Adopt(d.clone())),
    Value::Object(obj) => match trap(|| obj.then_member())? {
      Value::Func(then) => Ok(Then::Foreign(then)),
      _ => Ok(Then::Plain),
    },
    _ => Ok(Then::Plain),
  }
}

/// Invoke a continuation
pub fn try_call_one(f: &Func, a: Value) -> Result<Value, Value> { trap(|| f.call1(a)) }

/// Invoke an initializer with a resolver pair
pub fn try_call_two<A, B>(
  f: impl FnOnce(A, B) -> Result<(), Value>,
  a: A,
  b: B,
) -> Result<(), Value> {
  trap(|| f(a, b))
}

#[cfg(test)]
mod test {
  use std::rc::Rc;

  use super::{get_then, try_call_one, try_call_two, Then};
  use crate::error::TypeError;
  use crate::value::{Func, Object, Value};
  use crate::ExternError;

  #[derive(Debug)]
  struct Exploding;
  impl Object for Exploding {
    fn type_str(&self) -> &'static str { "Exploding" }
    fn then_member(&self) -> Result<Value, Value> { panic!("getter exploded") }
  }

  #[derive(Debug)]
  struct NotCallable;
  impl Object for NotCallable {
    fn type_str(&self) -> &'static str { "NotCallable" }
    fn then_member(&self) -> Result<Value, Value> { Ok(Value::from(5)) }
  }

  #[test]
  fn panics_are_trapped() {
    let f = Func::new1("bad", |_| panic!("nope"));
    let err = try_call_one(&f, Value::Undefined).unwrap_err();
    assert_eq!(err.to_string(), "panicked: nope");
    let err = get_then(&Value::Object(Rc::new(Exploding))).unwrap_err();
    assert_eq!(err.to_string(), "panicked: getter exploded");
  }

  #[test]
  fn errors_pass_through() {
    let fail = |_: Value, _: Value| Err(TypeError::new("x").value());
    assert_eq!(try_call_two(fail, Value::Undefined, Value::Undefined), Err(TypeError::new("x").value()));
    let ok = |a: Value, b: Value| {
      assert_eq!((a, b), (Value::from(1), Value::from(2)));
      Ok(())
    };
    assert_eq!(try_call_two(ok, Value::from(1), Value::from(2)), Ok(()));
  }

  #[test]
  fn then_capability() {
    assert!(matches!(get_then(&Value::from(1)), Ok(Then::Plain)));
    assert!(matches!(get_then(&Value::object(NotCallable)), Ok(Then::Plain)));
    let f = Value::Func(Func::new1("f", Ok));
    assert!(matches!(get_then(&f), Ok(Then::Plain)));
  }
}
