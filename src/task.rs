use std::fmt;

/// A caller-assigned identifier correlating a submitted task with its completion record.
pub type TaskId = u32;

/// The type-erased body a worker runs: the callable already bound to its argument.
pub(crate) type TaskBody = Box<dyn FnOnce() + Send + 'static>;

/// Internal representation of a task waiting in, or dequeued from, the task queue.
pub(crate) struct TaskDescriptor {
  pub(crate) task_id: TaskId,
  body: TaskBody,
}

impl TaskDescriptor {
  /// Binds `callable` to `argument`. The argument moves into the worker for
  /// the duration of the call and is dropped when the callable returns it
  /// or lets it go out of scope.
  pub(crate) fn new<F, A>(task_id: TaskId, callable: F, argument: A) -> Self
  where
    F: FnOnce(A) + Send + 'static,
    A: Send + 'static,
  {
    Self::from_closure(task_id, move || callable(argument))
  }

  pub(crate) fn from_closure<F>(task_id: TaskId, body: F) -> Self
  where
    F: FnOnce() + Send + 'static,
  {
    Self {
      task_id,
      body: Box::new(body),
    }
  }

  pub(crate) fn run(self) {
    (self.body)()
  }
}

impl fmt::Debug for TaskDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskDescriptor")
      .field("task_id", &self.task_id)
      .finish_non_exhaustive()
  }
}
