//! # Task Management System
//!
//! Runs work on a small pool of worker threads and hands the results back to
//! the main thread.
//!
//! ## Architecture Overview
//! - `TaskManager`: central coordinator for task distribution and worker management
//! - `Task`: a unit of work executed on a worker
//! - `TaskResult`: the result of a completed task, which can spawn additional tasks
//! - `TaskChannel`: communication channel between the main thread and one worker
//!
//! The manager is generic over the main-thread context `C` that results are
//! handled against. The engine uses it to run streaming passes off the render
//! thread and upload their meshes on it.
//!
//! ## Task Lifecycle
//! 1. Tasks are created and published via `TaskManager::publish_task()`
//! 2. The manager distributes tasks to available worker channels using round-robin
//! 3. Workers process tasks and return results
//! 4. Results are handled on the main thread in `process_completed_tasks()`
//! 5. Results can spawn new tasks
//!
//! ## Example Usage
//! ```rust,ignore
//! let mut task_manager = TaskManager::new(1);
//!
//! task_manager.publish_task(Box::new(MyTask::new(...)));
//!
//! // In the main loop:
//! task_manager.process_completed_tasks(&mut context);
//! task_manager.process_queued_tasks();
//! ```

pub mod task;

use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};

use task::{Task, TaskResult};

/// A communication channel between the main thread and a worker thread.
///
/// # Fields
/// - `task_sender`: sends tasks from main thread to worker
/// - `result_receiver`: receives task results from worker
/// - `num_tasks_in_flight`: number of tasks sent but not yet handled
/// - `_worker`: handle to the worker thread
///
/// The worker exits once `task_sender` is dropped.
#[derive(Debug)]
pub struct TaskChannel<C> {
    task_sender: Sender<Box<dyn Task<C> + Send>>,
    result_receiver: Receiver<Box<dyn TaskResult<C> + Send>>,
    num_tasks_in_flight: usize,
    _worker: JoinHandle<()>,
}

/// Manages a pool of worker threads and coordinates task execution.
///
/// - Distributes tasks across available workers
/// - Queues tasks while every worker is busy
/// - Hands completed results to the main-thread context
pub struct TaskManager<C> {
    channels: Vec<TaskChannel<C>>,
    queued_tasks: VecDeque<Box<dyn Task<C> + Send>>,
    current_channel: usize,
}

/// Maximum number of tasks that can be in flight per worker channel.
///
/// Set to 1 so tasks are processed in order within each channel.
pub const MAX_TASKS_IN_FLIGHT: usize = 1;

impl<C: 'static> TaskManager<C> {
    /// Creates a new `TaskManager` with the specified number of worker threads.
    ///
    /// A worker whose task panics stops; its channel then reports as
    /// disconnected and tasks stay queued for the remaining workers.
    pub fn new(num_workers: usize) -> Self {
        let mut channels = Vec::with_capacity(num_workers);

        log::info!(
            "Starting {} task workers, available parallelism: {:?}",
            num_workers,
            thread::available_parallelism()
        );

        for _ in 0..num_workers {
            let (task_tx, task_rx) = channel::<Box<dyn Task<C> + Send>>();
            let (result_tx, result_rx) = channel::<Box<dyn TaskResult<C> + Send>>();

            let worker = thread::spawn(move || {
                while let Ok(task) = task_rx.recv() {
                    let result = task.process();
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            });

            channels.push(TaskChannel {
                task_sender: task_tx,
                result_receiver: result_rx,
                num_tasks_in_flight: 0,
                _worker: worker,
            });
        }

        TaskManager {
            channels,
            queued_tasks: VecDeque::new(),
            current_channel: 0,
        }
    }

    /// Attempts to send a task to a specific worker channel.
    ///
    /// # Returns
    /// - `Ok(())` if the task was sent
    /// - `Err(task)` if the worker has disconnected, handing the task back
    fn try_send_task(
        &mut self,
        task: Box<dyn Task<C> + Send>,
        channel_idx: usize,
    ) -> Result<(), Box<dyn Task<C> + Send>> {
        match self.channels[channel_idx].task_sender.send(task) {
            Ok(_) => {
                self.channels[channel_idx].num_tasks_in_flight += 1;
                Ok(())
            }
            Err(task) => Err(task.0),
        }
    }

    /// Finds a worker channel that can accept a new task, round-robin from
    /// the last used channel.
    fn find_available_channel(&self) -> Option<usize> {
        if self.channels.is_empty() {
            return None;
        }

        let start_channel = self.current_channel;
        let mut current = start_channel;

        loop {
            if self.channels[current].num_tasks_in_flight < MAX_TASKS_IN_FLIGHT {
                return Some(current);
            }
            current = (current + 1) % self.channels.len();
            if current == start_channel {
                return None;
            }
        }
    }

    /// Publishes a new task for execution.
    ///
    /// # Returns
    /// - `true` if the task was immediately scheduled on an available worker
    /// - `false` if the task was queued because all workers are busy
    pub fn publish_task(&mut self, task: Box<dyn Task<C> + Send>) -> bool {
        match self.find_available_channel() {
            Some(channel_idx) => match self.try_send_task(task, channel_idx) {
                Ok(_) => {
                    self.current_channel = (channel_idx + 1) % self.channels.len();
                    true
                }
                Err(task) => {
                    log::warn!("Task worker {channel_idx} disconnected, queueing task");
                    self.queued_tasks.push_back(task);
                    false
                }
            },
            None => {
                self.queued_tasks.push_back(task);
                false
            }
        }
    }

    /// Schedules queued tasks, oldest first, while workers are available.
    pub fn process_queued_tasks(&mut self) {
        while let Some(channel_idx) = self.find_available_channel() {
            let Some(task) = self.queued_tasks.pop_front() else {
                return;
            };
            match self.try_send_task(task, channel_idx) {
                Ok(_) => self.current_channel = (channel_idx + 1) % self.channels.len(),
                Err(task) => {
                    self.queued_tasks.push_front(task);
                    return;
                }
            }
        }
    }

    /// Handles every completed task result on the main thread.
    ///
    /// Follow-up tasks returned by the results are published afterwards.
    pub fn process_completed_tasks(&mut self, context: &mut C) {
        let mut tasks_to_queue = Vec::new();
        for channel in &mut self.channels {
            while let Ok(result) = channel.result_receiver.try_recv() {
                channel.num_tasks_in_flight -= 1;
                tasks_to_queue.extend(result.handle_result(context));
            }
        }

        for task in tasks_to_queue {
            self.publish_task(task);
        }
    }

    /// Number of tasks sent to workers or queued, whose results have not
    /// been handled yet.
    pub fn pending_tasks(&self) -> usize {
        self.queued_tasks.len()
            + self
                .channels
                .iter()
                .map(|channel| channel.num_tasks_in_flight)
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    /// Squares a number on a worker and records it on the main thread.
    struct Square(u32);

    struct Squared {
        value: u32,
        follow_up: Option<u32>,
    }

    impl Task<Vec<u32>> for Square {
        fn process(&self) -> Box<dyn TaskResult<Vec<u32>> + Send> {
            Box::new(Squared {
                value: self.0 * self.0,
                follow_up: (self.0 < 4).then_some(self.0 + 1),
            })
        }
    }

    impl TaskResult<Vec<u32>> for Squared {
        fn handle_result(self: Box<Self>, context: &mut Vec<u32>) -> Vec<Box<dyn Task<Vec<u32>> + Send>> {
            context.push(self.value);
            self.follow_up
                .map(|next| Box::new(Square(next)) as Box<dyn Task<Vec<u32>> + Send>)
                .into_iter()
                .collect()
        }
    }

    fn drain(manager: &mut TaskManager<Vec<u32>>, context: &mut Vec<u32>) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while manager.pending_tasks() > 0 {
            assert!(Instant::now() < deadline, "tasks did not finish");
            manager.process_completed_tasks(context);
            manager.process_queued_tasks();
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn results_are_handled_on_the_calling_thread() {
        let mut manager: TaskManager<Vec<u32>> = TaskManager::new(2);
        let mut results = Vec::new();

        manager.publish_task(Box::new(Square(4)));
        manager.publish_task(Box::new(Square(4)));
        drain(&mut manager, &mut results);

        assert_eq!(results, vec![16, 16]);
    }

    #[test]
    fn follow_up_tasks_are_scheduled() {
        let mut manager: TaskManager<Vec<u32>> = TaskManager::new(1);
        let mut results = Vec::new();

        manager.publish_task(Box::new(Square(1)));
        drain(&mut manager, &mut results);

        assert_eq!(results, vec![1, 4, 9, 16]);
    }

    #[test]
    fn busy_workers_queue_tasks_in_order() {
        let mut manager: TaskManager<Vec<u32>> = TaskManager::new(1);
        let mut results = Vec::new();

        assert!(manager.publish_task(Box::new(Square(10))));
        assert!(!manager.publish_task(Box::new(Square(20))));
        assert!(!manager.publish_task(Box::new(Square(30))));
        assert_eq!(manager.pending_tasks(), 3);

        drain(&mut manager, &mut results);
        assert_eq!(results, vec![100, 400, 900]);
    }

    #[test]
    fn without_workers_everything_queues() {
        let mut manager: TaskManager<Vec<u32>> = TaskManager::new(0);
        assert!(!manager.publish_task(Box::new(Square(2))));
        manager.process_queued_tasks();
        assert_eq!(manager.pending_tasks(), 1);
    }
}
