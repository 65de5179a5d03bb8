use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashSet},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::Id;

pub type TaskId = Id<ScheduledTask>;

/// A deferred action waiting for its deadline in a [Scheduler].
pub struct ScheduledTask {
    id: TaskId,
    deadline: Instant,
    /// Tie-breaker so tasks with equal deadlines fire in schedule order.
    seq: u64,
    run: Box<dyn FnOnce() + Send>,
}

/// Runs deferred actions at their deadlines, earliest first.
///
/// Cancellation is first-class: a cancelled task is skipped when it comes
/// due. A task that is already being run can no longer be cancelled.
pub struct Scheduler {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
}

#[derive(Default)]
struct Queue {
    tasks: BinaryHeap<ScheduledTask>,
    cancelled: HashSet<TaskId>,
    next_seq: u64,
    shutdown: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        let shared: Arc<Shared> = Default::default();

        let worker = thread::Builder::new()
            .name("soundstage-scheduler".to_string())
            .spawn({
                let shared = shared.clone();
                move || run_worker(shared)
            })
            .expect("scheduler worker spawns");

        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Schedules a task to run at the given deadline.
    pub fn schedule_at(&self, deadline: Instant, run: impl FnOnce() + Send + 'static) -> TaskId {
        let id = TaskId::new();
        let mut queue = self.shared.queue.lock();

        let seq = queue.next_seq;
        queue.next_seq += 1;

        queue.tasks.push(ScheduledTask {
            id,
            deadline,
            seq,
            run: Box::new(run),
        });

        drop(queue);
        self.shared.available.notify_one();

        id
    }

    /// Schedules a task to run after the given delay.
    pub fn schedule_in(&self, delay: Duration, run: impl FnOnce() + Send + 'static) -> TaskId {
        self.schedule_at(Instant::now() + delay, run)
    }

    /// Cancels a pending task. Does nothing if the task already ran.
    pub fn cancel(&self, id: TaskId) {
        let mut queue = self.shared.queue.lock();

        if queue.tasks.iter().any(|t| t.id == id) {
            queue.cancelled.insert(id);
        }
    }
}

fn run_worker(shared: Arc<Shared>) {
    loop {
        let task = {
            let mut queue = shared.queue.lock();

            loop {
                if queue.shutdown {
                    return;
                }

                let deadline = match queue.tasks.peek() {
                    Some(next) => next.deadline,
                    None => {
                        shared.available.wait(&mut queue);
                        continue;
                    }
                };

                if deadline <= Instant::now() {
                    let task = queue.tasks.pop().expect("peeked task exists");

                    if queue.cancelled.remove(&task.id) {
                        continue;
                    }

                    break task;
                }

                shared.available.wait_until(&mut queue, deadline);
            }
        };

        // Run outside the lock, so a task can schedule further tasks.
        (task.run)();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shared.queue.lock().shutdown = true;
        self.shared.available.notify_one();

        if let Some(worker) = self.worker.take() {
            worker.join().ok();
        }
    }
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed, so the binary heap yields the earliest deadline first.
        other
            .deadline
            .cmp(&self.deadline)
            .then(other.seq.cmp(&self.seq))
    }
}
