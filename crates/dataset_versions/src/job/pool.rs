//! Bounded worker pool for per-image processing.
//!
//! Images are independent units of work, so the orchestrator fans them out
//! over a small pool of named threads connected by bounded channels. The
//! bounded task channel doubles as backpressure and as the cancellation
//! checkpoint: the dispatching thread re-checks cancellation and the
//! deadline before every send, and in-flight units always run to
//! completion.

use crate::error::{PipelineError, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

pub(crate) struct WorkerPool<Task, Output> {
    workers: Vec<thread::JoinHandle<()>>,
    task_tx: Option<Sender<Task>>,
    output_rx: Receiver<Output>,
    shutdown: Arc<AtomicBool>,
}

impl<Task, Output> WorkerPool<Task, Output>
where
    Task: Send + 'static,
    Output: Send + 'static,
{
    /// Spawns `num_workers` threads that pull tasks from a shared bounded
    /// channel and push results to the output channel.
    pub(crate) fn new<F>(num_workers: usize, buffer_size: usize, worker_fn: F) -> Result<Self>
    where
        F: Fn(Receiver<Task>, Sender<Output>, Arc<AtomicBool>) + Send + Sync + 'static,
    {
        if num_workers == 0 {
            return Err(PipelineError::config(
                "worker pool needs at least one worker",
            ));
        }
        if buffer_size == 0 {
            return Err(PipelineError::config(
                "worker pool buffer size must be positive to avoid deadlocks",
            ));
        }

        let (task_tx, task_rx) = bounded::<Task>(buffer_size);
        let (output_tx, output_rx) = bounded::<Output>(buffer_size * num_workers);
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_fn = Arc::new(worker_fn);

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let task_rx = task_rx.clone();
            let output_tx = output_tx.clone();
            let shutdown = shutdown.clone();
            let worker_fn = worker_fn.clone();

            let handle = thread::Builder::new()
                .name(format!("version-worker-{}", worker_id))
                .spawn(move || worker_fn(task_rx, output_tx, shutdown))
                .map_err(|e| {
                    PipelineError::storage(format!("failed to spawn worker {}: {}", worker_id, e))
                })?;
            workers.push(handle);
        }

        Ok(Self {
            workers,
            task_tx: Some(task_tx),
            output_rx,
            shutdown,
        })
    }

    /// Blocks until a worker has capacity for the task.
    pub(crate) fn dispatch(&self, task: Task) -> Result<()> {
        match &self.task_tx {
            Some(tx) => tx
                .send(task)
                .map_err(|_| PipelineError::storage("worker pool closed while dispatching")),
            None => Err(PipelineError::storage("worker pool already finished")),
        }
    }

    /// Closes the task channel; workers drain what is queued and exit.
    pub(crate) fn finish_dispatch(&mut self) {
        self.task_tx.take();
    }

    pub(crate) fn outputs(&self) -> &Receiver<Output> {
        &self.output_rx
    }
}

impl<Task, Output> Drop for WorkerPool<Task, Output> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.task_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling_pool(workers: usize) -> WorkerPool<u32, u32> {
        WorkerPool::new(workers, 4, |tasks, outputs, _shutdown| {
            for task in tasks.iter() {
                if outputs.send(task * 2).is_err() {
                    break;
                }
            }
        })
        .unwrap()
    }

    #[test]
    fn test_pool_processes_all_tasks() {
        let mut pool = doubling_pool(3);
        for i in 0..10u32 {
            pool.dispatch(i).unwrap();
        }
        pool.finish_dispatch();

        let mut results: Vec<u32> = pool.outputs().iter().collect();
        results.sort_unstable();
        assert_eq!(results, (0..10).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result: Result<WorkerPool<u32, u32>> = WorkerPool::new(0, 4, |_, _, _| {});
        assert!(result.is_err());
    }

    #[test]
    fn test_drop_joins_workers() {
        let pool = doubling_pool(2);
        // Dropping without dispatching must not hang.
        drop(pool);
    }
}
