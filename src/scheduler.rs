//! The injected scheduling facility. Deferreds never run continuations on the
//! stack that settled them; they hand a [Task] to a [Scheduler] instead.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::trace;

use crate::utils::unwrap_or;

/// A unit of deferred work. Tasks own everything they touch and run once.
pub type Task = Box<dyn FnOnce()>;

/// Something that runs tasks later, in the order they were enqueued, off the
/// current call stack.
pub trait Scheduler {
  /// Enqueue a task. Implementations must not run it before returning.
  fn schedule(&self, task: Task);
}

/// Settings for a [MicrotaskQueue]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueConfig {
  /// Maximum number of tasks a single [MicrotaskQueue::run_until_idle] call
  /// executes. [None] means run until the queue is empty.
  pub gas: Option<usize>,
}

/// Outcome of draining a [MicrotaskQueue]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Drain {
  /// The queue emptied after running this many tasks
  Idle(usize),
  /// The gas ran out with tasks still waiting
  OutOfGas,
}

/// A single-threaded FIFO work queue. Clones share the same queue, so one
/// clone can be handed to the deferreds as `Rc<dyn Scheduler>` while the
/// owner keeps another to drive it.
#[derive(Clone, Default)]
pub struct MicrotaskQueue {
  tasks: Rc<RefCell<VecDeque<Task>>>,
  config: QueueConfig,
}
impl MicrotaskQueue {
  /// Create an empty queue without a gas limit
  pub fn new() -> Self { Self::default() }

  /// Create an empty queue with the given settings
  pub fn with_config(config: QueueConfig) -> Self {
    Self { tasks: Rc::default(), config }
  }

  /// Type-erased handle to pass to deferred constructors
  pub fn handle(&self) -> Rc<dyn Scheduler> { Rc::new(self.clone()) }

  /// Number of waiting tasks
  pub fn len(&self) -> usize { self.tasks.borrow().len() }

  /// Whether there is nothing to run
  pub fn is_empty(&self) -> bool { self.tasks.borrow().is_empty() }

  /// Run the oldest task, if any. Returns whether a task ran.
  pub fn run_once(&self) -> bool {
    // the borrow must end before the task runs, tasks schedule more tasks
    let task = unwrap_or!(self.tasks.borrow_mut().pop_front(); return false);
    task();
    true
  }

  /// Run tasks, including the ones scheduled along the way, until the queue
  /// is empty or the configured gas runs out.
  pub fn run_until_idle(&self) -> Drain {
    let mut ran = 0;
    loop {
      if self.config.gas.is_some_and(|gas| gas <= ran) {
        if self.is_empty() {
          return Drain::Idle(ran);
        }
        trace!(ran, waiting = self.len(), "microtask queue out of gas");
        return Drain::OutOfGas;
      }
      if !self.run_once() {
        return Drain::Idle(ran);
      }
      ran += 1;
    }
  }
}
impl Scheduler for MicrotaskQueue {
  fn schedule(&self, task: Task) {
    let mut tasks = self.tasks.borrow_mut();
    tasks.push_back(task);
    trace!(waiting = tasks.len(), "task scheduled");
  }
}

#[cfg(test)]
mod test {
  use std::cell::RefCell;
  use std::rc::Rc;

  use super::{Drain, MicrotaskQueue, QueueConfig, Scheduler};

  #[test]
  fn fifo_and_nested() {
    let queue = MicrotaskQueue::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    for i in 0..3 {
      let (log, q2) = (log.clone(), queue.clone());
      queue.schedule(Box::new(move || {
        log.borrow_mut().push(i);
        let log = log.clone();
        q2.schedule(Box::new(move || log.borrow_mut().push(10 + i)));
      }));
    }
    assert!(log.borrow().is_empty(), "scheduling never runs inline");
    assert_eq!(queue.run_until_idle(), Drain::Idle(6));
    assert_eq!(*log.borrow(), vec![0, 1, 2, 10, 11, 12]);
    assert!(queue.is_empty());
  }

  #[test]
  fn gas_limit() {
    let queue = MicrotaskQueue::with_config(QueueConfig { gas: Some(2) });
    let count = Rc::new(RefCell::new(0));
    for _ in 0..3 {
      let count = count.clone();
      queue.schedule(Box::new(move || *count.borrow_mut() += 1));
    }
    assert_eq!(queue.run_until_idle(), Drain::OutOfGas);
    assert_eq!(*count.borrow(), 2);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.run_until_idle(), Drain::Idle(1));
    assert_eq!(*count.borrow(), 3);
  }

  #[test]
  fn gas_exactly_spent() {
    let queue = MicrotaskQueue::with_config(QueueConfig { gas: Some(1) });
    queue.schedule(Box::new(|| ()));
    assert_eq!(queue.run_until_idle(), Drain::Idle(1));
  }
}
