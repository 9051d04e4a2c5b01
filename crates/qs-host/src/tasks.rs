use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use qs_core::{ScriptEvent, ScriptLangError};
use qs_runtime::Interpreter;
use tokio::runtime::{Builder, Runtime};

use crate::map_worker_start;

/// Work handed back to the main thread. Nothing off the main thread touches
/// scopes, registries or builtins directly.
pub enum MainTask {
    FireEvent(ScriptEvent),
    Run(Box<dyn FnOnce(&Interpreter) + Send>),
}

impl fmt::Debug for MainTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FireEvent(event) => f.debug_tuple("FireEvent").field(event).finish(),
            Self::Run(_) => f.write_str("Run(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskSender {
    tx: Sender<MainTask>,
}

impl TaskSender {
    /// False once the queue is gone.
    pub fn send(&self, task: MainTask) -> bool {
        self.tx.send(task).is_ok()
    }
}

/// Single-consumer queue drained once per host tick.
#[derive(Debug)]
pub struct MainThreadQueue {
    tx: Sender<MainTask>,
    rx: Receiver<MainTask>,
}

impl Default for MainThreadQueue {
    fn default() -> Self {
        let (tx, rx) = channel();
        Self { tx, rx }
    }
}

impl MainThreadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> TaskSender {
        TaskSender {
            tx: self.tx.clone(),
        }
    }

    pub fn drain(&self) -> Vec<MainTask> {
        let mut tasks = Vec::new();
        while let Ok(task) = self.rx.try_recv() {
            tasks.push(task);
        }
        tasks
    }
}

/// Bounded tokio pool for work scripts or the host push off the main thread.
/// Results come back only through a [`TaskSender`].
pub struct WorkerPool {
    runtime: Runtime,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self, ScriptLangError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name("qs-worker")
            .enable_time()
            .build()
            .map_err(map_worker_start)?;
        Ok(Self {
            runtime,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn scheduler(&self, tasks: TaskSender) -> EventScheduler {
        EventScheduler {
            handle: self.runtime.handle().clone(),
            tasks,
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Runs `work` on a blocking worker and queues its result for the main
    /// thread.
    pub fn spawn_work<T, W, R>(&self, tasks: TaskSender, work: W, on_main: R)
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        R: FnOnce(T, &Interpreter) + Send + 'static,
    {
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);
        self.runtime.spawn_blocking(move || {
            let output = work();
            tasks.send(MainTask::Run(Box::new(move |interpreter: &Interpreter| {
                on_main(output, interpreter)
            })));
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn shutdown(self) {
        self.runtime.shutdown_timeout(Duration::from_millis(500));
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Fires events after a delay. Backs the `schedule` builtin.
#[derive(Debug, Clone)]
pub struct EventScheduler {
    handle: tokio::runtime::Handle,
    tasks: TaskSender,
    in_flight: Arc<AtomicUsize>,
}

impl EventScheduler {
    pub fn schedule(&self, delay: Duration, event: ScriptEvent) {
        let tasks = self.tasks.clone();
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if !tasks.send(MainTask::FireEvent(event)) {
                tracing::debug!(target: "scripting", "main-thread queue closed before delayed event");
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

#[cfg(test)]
mod tasks_tests {
    use super::*;
    use std::time::Instant;

    fn wait_for_tasks(queue: &MainThreadQueue, count: usize) -> Vec<MainTask> {
        let deadline = Instant::now() + Duration::from_secs(3);
        let mut tasks = Vec::new();
        while Instant::now() < deadline && tasks.len() < count {
            tasks.extend(queue.drain());
            std::thread::sleep(Duration::from_millis(5));
        }
        tasks
    }

    #[test]
    fn scheduled_events_arrive_on_the_queue_after_the_delay() {
        let pool = WorkerPool::new(1).expect("pool starts");
        let queue = MainThreadQueue::new();
        let scheduler = pool.scheduler(queue.sender());

        let started = Instant::now();
        scheduler.schedule(Duration::from_millis(30), ScriptEvent::new("later"));
        assert!(queue.drain().is_empty());

        let tasks = wait_for_tasks(&queue, 1);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(tasks.len(), 1);
        match &tasks[0] {
            MainTask::FireEvent(event) => assert_eq!(event.event_type, "later"),
            other => panic!("unexpected task {:?}", other),
        }
        pool.shutdown();
    }

    #[test]
    fn blocking_work_hands_its_result_to_the_main_thread() {
        let pool = WorkerPool::new(2).expect("pool starts");
        let queue = MainThreadQueue::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&seen);

        pool.spawn_work(queue.sender(), || 21 * 2, move |answer, _| {
            sink.store(answer, Ordering::SeqCst);
        });

        let tasks = wait_for_tasks(&queue, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        let interpreter = Interpreter::default();
        for task in tasks {
            if let MainTask::Run(run) = task {
                run(&interpreter);
            }
        }
        assert_eq!(seen.load(Ordering::SeqCst), 42);
        pool.shutdown();
    }
}
