//! The dynamic values that deferreds are settled with. A value is either
//! plain data, something invokable, a user-defined [Object] that may expose a
//! `then` member, or another [Deferred].

use std::fmt::{Debug, Display};
use std::rc::Rc;

use ordered_float::NotNan;
use trait_set::trait_set;

use crate::deferred::Deferred;
use crate::error::{ExternError, TypeError};

trait_set! {
  /// The body of a [Func]. An `Err` return is the Rust rendition of raising.
  pub trait FuncBody = for<'a> Fn(&'a [Value]) -> Result<Value, Value> + 'static;
}

/// An invokable value. Continuations, initializers and the resolver pair
/// handed to initializers are all [Func]s.
#[derive(Clone)]
pub struct Func {
  name: &'static str,
  body: Rc<dyn FuncBody>,
}
impl Func {
  /// Wrap a closure that takes any number of arguments
  pub fn new(name: &'static str, body: impl FuncBody) -> Self {
    Self { name, body: Rc::new(body) }
  }

  /// Wrap a closure that only looks at its first argument. Missing arguments
  /// read as [Value::Undefined].
  pub fn new1(
    name: &'static str,
    body: impl Fn(Value) -> Result<Value, Value> + 'static,
  ) -> Self {
    Self::new(name, move |args: &[Value]| body(args.first().cloned().unwrap_or_default()))
  }

  /// Invoke the function. This does not catch panics, see [crate::trap] for
  /// that.
  pub fn call(&self, args: &[Value]) -> Result<Value, Value> { (self.body)(args) }

  /// Invoke with a single argument
  pub fn call1(&self, arg: Value) -> Result<Value, Value> { self.call(&[arg]) }

  /// Name given at construction, for diagnostics
  pub fn name(&self) -> &'static str { self.name }

  /// Whether the two handles point to the same closure
  pub fn ptr_eq(&self, other: &Self) -> bool { Rc::ptr_eq(&self.body, &other.body) }
}
impl Debug for Func {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "Func({})", self.name)
  }
}

/// A user-defined value. Objects that return a [Func] from
/// [Object::then_member] are foreign thenables and get adopted through their
/// `then` like any other deferred value.
pub trait Object: Debug {
  /// Name of the type for diagnostics
  fn type_str(&self) -> &'static str;

  /// Read the `then` member. Reading may fail, in which case the deferred
  /// being resolved with this object is rejected with the error. Anything
  /// other than a [Value::Func] means the object is not a thenable.
  fn then_member(&self) -> Result<Value, Value> { Ok(Value::Undefined) }
}

/// A value that can settle a [Deferred]
#[derive(Clone, Default)]
pub enum Value {
  /// Absence of a value
  #[default]
  Undefined,
  /// A boolean
  Bool(bool),
  /// An integer
  Int(i64),
  /// A float that is never NaN, so values remain comparable
  Num(NotNan<f64>),
  /// A string
  Str(Rc<str>),
  /// An error, usually a rejection reason
  Error(Rc<dyn ExternError>),
  /// Something invokable
  Func(Func),
  /// A user-defined object that may be a foreign thenable
  Object(Rc<dyn Object>),
  /// Another deferred value
  Deferred(Deferred),
}
impl Value {
  /// Construct a number, rejecting NaN
  pub fn num(f: f64) -> Result<Self, Value> {
    NotNan::new(f).map(Self::Num).map_err(|_| TypeError::new("NaN is not a valid number").value())
  }

  /// Wrap an [Object]
  pub fn object(obj: impl Object + 'static) -> Self { Self::Object(Rc::new(obj)) }

  /// Name of the variant for diagnostics
  pub fn type_str(&self) -> &'static str {
    match self {
      Self::Undefined => "undefined",
      Self::Bool(_) => "bool",
      Self::Int(_) => "int",
      Self::Num(_) => "num",
      Self::Str(_) => "string",
      Self::Error(_) => "error",
      Self::Func(_) => "function",
      Self::Object(o) => o.type_str(),
      Self::Deferred(_) => "deferred",
    }
  }

  /// Whether [crate::Deferred::then] would treat this as a continuation
  pub fn is_callable(&self) -> bool { matches!(self, Self::Func(_)) }

  /// Get the function if this is one
  pub fn as_func(&self) -> Option<&Func> {
    if let Self::Func(f) = self { Some(f) } else { None }
  }

  /// Get the deferred if this is one
  pub fn as_deferred(&self) -> Option<&Deferred> {
    if let Self::Deferred(d) = self { Some(d) } else { None }
  }

  /// Get the string if this is one
  pub fn as_str(&self) -> Option<&str> {
    if let Self::Str(s) = self { Some(s) } else { None }
  }

  /// Read an integer. Continuations typically use this with `?` to reject
  /// on a type mismatch.
  pub fn as_int(&self) -> Result<i64, Value> {
    match self {
      Self::Int(i) => Ok(*i),
      other => Err(TypeError::new(format!("expected int, got {}", other.type_str())).value()),
    }
  }

  /// The length of a string in characters
  pub fn length(&self) -> Result<i64, Value> {
    match self {
      Self::Str(s) => i64::try_from(s.chars().count())
        .map_err(|_| TypeError::new("string length out of range").value()),
      other => Err(TypeError::new(format!("{} has no length", other.type_str())).value()),
    }
  }
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::Undefined, Self::Undefined) => true,
      (Self::Bool(a), Self::Bool(b)) => a == b,
      (Self::Int(a), Self::Int(b)) => a == b,
      (Self::Num(a), Self::Num(b)) => a == b,
      (Self::Str(a), Self::Str(b)) => a == b,
      (Self::Error(a), Self::Error(b)) => a.to_string() == b.to_string(),
      (Self::Func(a), Self::Func(b)) => a.ptr_eq(b),
      (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
      (Self::Deferred(a), Self::Deferred(b)) => a.ptr_eq(b),
      _ => false,
    }
  }
}

impl Debug for Value {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Undefined => write!(f, "undefined"),
      Self::Bool(b) => write!(f, "{b:?}"),
      Self::Int(i) => write!(f, "{i:?}"),
      Self::Num(n) => write!(f, "{n}"),
      Self::Str(s) => write!(f, "{s:?}"),
      Self::Error(e) => write!(f, "{e:?}"),
      Self::Func(func) => write!(f, "{func:?}"),
      Self::Object(o) => write!(f, "{o:?}"),
      Self::Deferred(d) => write!(f, "{d:?}"),
    }
  }
}

impl Display for Value {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Str(s) => write!(f, "{s}"),
      Self::Error(e) => write!(f, "{e}"),
      Self::Func(func) => write!(f, "[function {}]", func.name()),
      Self::Object(o) => write!(f, "[object {}]", o.type_str()),
      other => write!(f, "{other:?}"),
    }
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self { Self::Bool(b) }
}
impl From<i64> for Value {
  fn from(i: i64) -> Self { Self::Int(i) }
}
impl From<i32> for Value {
  fn from(i: i32) -> Self { Self::Int(i.into()) }
}
impl From<NotNan<f64>> for Value {
  fn from(n: NotNan<f64>) -> Self { Self::Num(n) }
}
impl From<&str> for Value {
  fn from(s: &str) -> Self { Self::Str(s.into()) }
}
impl From<String> for Value {
  fn from(s: String) -> Self { Self::Str(s.into()) }
}
impl From<Func> for Value {
  fn from(f: Func) -> Self { Self::Func(f) }
}
impl From<Deferred> for Value {
  fn from(d: Deferred) -> Self { Self::Deferred(d) }
}
