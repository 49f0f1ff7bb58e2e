//! Error values raised inside the resolution machinery and the synchronous
//! errors of the construct entry point.

use std::any::Any;
use std::error::Error;
use std::fmt::{Debug, Display};
use std::rc::Rc;

use dyn_clone::DynClone;

use crate::value::Value;

/// Errors produced while settling deferred values. These travel through the
/// machine as rejection reasons, so they are type-erased and cheap to clone.
pub trait ExternError: Display + DynClone {
  /// Convert into trait object
  #[must_use]
  fn rc(self) -> Rc<dyn ExternError>
  where Self: 'static + Sized {
    Rc::new(self)
  }

  /// Convert into a rejection reason
  #[must_use]
  fn value(self) -> Value
  where Self: 'static + Sized {
    Value::Error(self.rc())
  }
}

impl Debug for dyn ExternError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "ExternError({self})")
  }
}

impl Error for dyn ExternError {}

/// A value was used in a way its type does not permit, for example a deferred
/// was resolved with itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeError {
  message: String,
}
impl TypeError {
  /// Construct with a message
  pub fn new(message: impl Into<String>) -> Self { Self { message: message.into() } }

  /// The error resolving a deferred with itself is rejected with
  pub fn self_resolution() -> Self { Self::new("A promise cannot be resolved with itself.") }

  /// The message without the type prefix
  pub fn message(&self) -> &str { &self.message }
}
impl Display for TypeError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "TypeError: {}", self.message)
  }
}
impl ExternError for TypeError {}

/// User code panicked while the machine was calling it. The panic was caught
/// and is delivered as a rejection instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Panicked {
  message: String,
}
impl Panicked {
  /// Recover the message from a panic payload
  pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
    let message = match payload.downcast::<String>() {
      Ok(s) => *s,
      Err(payload) => match payload.downcast::<&'static str>() {
        Ok(s) => s.to_string(),
        Err(_) => "Box<dyn Any>".to_string(),
      },
    };
    Self { message }
  }

  /// The panic message, if it was a string
  pub fn message(&self) -> &str { &self.message }
}
impl Display for Panicked {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "panicked: {}", self.message)
  }
}
impl ExternError for Panicked {}

/// Malformed use of the construct entry point. This is the only error that is
/// reported to the caller directly rather than as a rejection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConstructError {
  /// The initializer is not invokable
  NotCallable(&'static str),
}
impl Display for ConstructError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::NotCallable(ty) => write!(f, "TypeError: not a function (got {ty})"),
    }
  }
}
impl Error for ConstructError {}

#[cfg(test)]
mod test {
  use super::{ExternError, Panicked, TypeError};
  use crate::value::Value;

  #[test]
  fn panic_payloads() {
    let p = Panicked::from_payload(Box::new("static"));
    assert_eq!(p.message(), "static");
    let p = Panicked::from_payload(Box::new(format!("owned {}", 1)));
    assert_eq!(p.message(), "owned 1");
    let p = Panicked::from_payload(Box::new(5u8));
    assert_eq!(p.message(), "Box<dyn Any>");
  }

  #[test]
  fn errors_become_values() {
    let v = TypeError::self_resolution().value();
    assert_eq!(v.to_string(), "TypeError: A promise cannot be resolved with itself.");
    assert!(matches!(v, Value::Error(_)));
  }
}
