//! # Task System Core Traits
//!
//! ## Core Components
//! - `Task`: a unit of work executed on a worker thread
//! - `TaskResult`: the result of a completed task, handled on the main thread
//!
//! ## Task Lifecycle
//! 1. A `Task` is created and scheduled via `TaskManager::publish_task()`
//! 2. The task's `process()` method is called on a worker thread
//! 3. The task returns a boxed `TaskResult`
//! 4. The result's `handle_result()` is called on the main thread with the
//!    manager's context `C`
//! 5. The result can spawn follow-up tasks
//!
//! Both traits are `Send`. Shared state reaches a task through the values it
//! owns, typically `MtResource` handles.

/// A unit of work that can be executed on a worker thread.
///
/// Tasks should own the data they need. `C` is the main-thread context their
/// results are eventually handled against.
pub trait Task<C>: Send {
    /// Performs the work and returns a result for the main thread.
    ///
    /// Errors are handled inside the task and reported through the result.
    fn process(&self) -> Box<dyn TaskResult<C> + Send>;
}

/// The result of processing a `Task`, handled on the main thread.
pub trait TaskResult<C>: Send {
    /// Applies the result to the main-thread context.
    ///
    /// Runs on the main thread: keep it fast to avoid frame drops.
    ///
    /// # Returns
    /// Follow-up tasks to schedule, possibly none.
    fn handle_result(self: Box<Self>, context: &mut C) -> Vec<Box<dyn Task<C> + Send>>;
}
