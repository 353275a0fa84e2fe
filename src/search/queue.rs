//! Fixed-parallelism work queue with a bounded in-flight byte budget.
//!
//! `push` charges each task's cost against the budget and blocks the
//! producer while the budget is spent; a worker refunds the cost only after
//! the task's side effects are done. Dispatch is FIFO, which the ordered
//! output relies on: the task for the lowest unfinished chunk index is
//! always picked up before any later one.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkQueue {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

struct Shared {
    budget: usize,
    state: Mutex<QueueState>,
    work_ready: Condvar,
    space_ready: Condvar,
}

struct QueueState {
    queue: VecDeque<(Task, usize)>,
    in_flight: usize,
    closed: bool,
}

impl WorkQueue {
    /// Worker count matched to the host CPU.
    pub fn ideal_worker_count() -> usize {
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }

    pub fn new(workers: usize, budget: usize) -> Self {
        let shared = Arc::new(Shared {
            budget,
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                in_flight: 0,
                closed: false,
            }),
            work_ready: Condvar::new(),
            space_ready: Condvar::new(),
        });

        let workers = (0..workers.max(1))
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || worker_loop(&shared))
            })
            .collect();

        Self { shared, workers }
    }

    /// Enqueue a task, blocking while `in_flight + cost` exceeds the budget.
    /// A cost larger than the whole budget is admitted once the queue is
    /// otherwise empty.
    pub fn push<F>(&self, cost: usize, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock().unwrap();
        while state.in_flight > 0 && state.in_flight + cost > self.shared.budget {
            state = self.shared.space_ready.wait(state).unwrap();
        }

        state.in_flight += cost;
        state.queue.push_back((Box::new(task), cost));
        drop(state);
        self.shared.work_ready.notify_one();
    }
}

impl Drop for WorkQueue {
    /// Wait for the queue to drain, then stop the workers.
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.closed = true;
        }
        self.shared.work_ready.notify_all();

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let (task, cost) = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if let Some(entry) = state.queue.pop_front() {
                    break entry;
                }
                if state.closed {
                    return;
                }
                state = shared.work_ready.wait(state).unwrap();
            }
        };

        task();

        let mut state = shared.state.lock().unwrap();
        state.in_flight -= cost;
        drop(state);
        shared.space_ready.notify_all();
    }
}
