use std::fmt::Debug;

use take_mut::take;

use super::Deferred;
use crate::value::Func;

/// A pair of continuations registered with [Deferred::then] and the child
/// deferred their outcome settles
pub(crate) struct Handler {
  pub on_fulfilled: Option<Func>,
  pub on_rejected: Option<Func>,
  pub child: Deferred,
}
impl Handler {
  pub fn new(on_fulfilled: Option<Func>, on_rejected: Option<Func>, child: Deferred) -> Self {
    Self { on_fulfilled, on_rejected, child }
  }
}
impl Debug for Handler {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Handler")
      .field("on_fulfilled", &self.on_fulfilled)
      .field("on_rejected", &self.on_rejected)
      .field("child", &self.child.id())
      .finish()
  }
}

/// Handlers accumulated while a deferred is pending, in registration order.
/// Most deferreds get at most one, so that case doesn't allocate.
#[derive(Debug, Default)]
pub(crate) enum Waiters {
  #[default]
  None,
  One(Handler),
  Many(Vec<Handler>),
}
impl Waiters {
  pub fn push(&mut self, handler: Handler) {
    take(self, |w| match w {
      Self::None => Self::One(handler),
      Self::One(first) => Self::Many(vec![first, handler]),
      Self::Many(mut v) => {
        v.push(handler);
        Self::Many(v)
      },
    })
  }

  pub fn len(&self) -> usize {
    match self {
      Self::None => 0,
      Self::One(_) => 1,
      Self::Many(v) => v.len(),
    }
  }
}
impl IntoIterator for Waiters {
  type Item = Handler;
  type IntoIter = std::vec::IntoIter<Handler>;

  fn into_iter(self) -> Self::IntoIter {
    match self {
      Self::None => Vec::new().into_iter(),
      Self::One(h) => vec![h].into_iter(),
      Self::Many(v) => v.into_iter(),
    }
  }
}
