use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use qs_core::ScriptLangError;

use crate::map_worker_start;

enum Command {
    Schedule {
        path: PathBuf,
        generation: u64,
        due: Instant,
    },
    Shutdown,
}

/// Cloneable entry point used by the file watcher thread.
#[derive(Clone)]
pub struct DebounceHandle {
    window: Duration,
    commands: Sender<Command>,
    next_generation: Arc<AtomicU64>,
    /// Latest generation per path with a change still waiting to fire.
    generations: Arc<DashMap<PathBuf, u64>>,
}

impl DebounceHandle {
    /// Schedules `path` to fire after the window. A later call for the same
    /// path supersedes this one.
    pub fn schedule(&self, path: PathBuf) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.generations.insert(path.clone(), generation);
        let due = Instant::now() + self.window;
        if self
            .commands
            .send(Command::Schedule {
                path,
                generation,
                due,
            })
            .is_err()
        {
            tracing::debug!(target: "watch", "debouncer already stopped");
        }
    }
}

/// Coalesces bursts of change notifications per path on its own thread.
/// Only the notification scheduled last fires; stale ones are dropped by
/// comparing generations at fire time.
pub struct Debouncer {
    handle: DebounceHandle,
    ready: Receiver<PathBuf>,
    worker: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Result<Self, ScriptLangError> {
        let (commands, command_rx) = channel();
        let (ready_tx, ready) = channel();
        let generations = Arc::new(DashMap::new());
        let thread_generations = Arc::clone(&generations);
        let worker = std::thread::Builder::new()
            .name("qs-debounce".to_string())
            .spawn(move || run_scheduler(command_rx, thread_generations, ready_tx))
            .map_err(map_worker_start)?;
        Ok(Self {
            handle: DebounceHandle {
                window,
                commands,
                next_generation: Arc::new(AtomicU64::new(0)),
                generations,
            },
            ready,
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> DebounceHandle {
        self.handle.clone()
    }

    pub fn schedule(&self, path: PathBuf) {
        self.handle.schedule(path);
    }

    /// Paths whose window elapsed since the last drain, in firing order.
    pub fn drain_ready(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        while let Ok(path) = self.ready.try_recv() {
            paths.push(path);
        }
        paths
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        let _ = self.handle.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_scheduler(
    commands: Receiver<Command>,
    generations: Arc<DashMap<PathBuf, u64>>,
    ready: Sender<PathBuf>,
) {
    let mut pending: BinaryHeap<Reverse<(Instant, u64, PathBuf)>> = BinaryHeap::new();
    loop {
        let command = match pending.peek() {
            Some(Reverse((due, _, _))) => {
                let wait = due.saturating_duration_since(Instant::now());
                match commands.recv_timeout(wait) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
            None => match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => return,
            },
        };

        match command {
            Some(Command::Schedule {
                path,
                generation,
                due,
            }) => pending.push(Reverse((due, generation, path))),
            Some(Command::Shutdown) => return,
            None => {}
        }

        let now = Instant::now();
        while pending
            .peek()
            .is_some_and(|Reverse((due, _, _))| *due <= now)
        {
            let Some(Reverse((_, generation, path))) = pending.pop() else {
                break;
            };
            if generations
                .remove_if(&path, |_, latest| *latest == generation)
                .is_none()
            {
                continue;
            }
            tracing::debug!(target: "watch", path = %path.display(), "debounced change ready");
            if ready.send(path).is_err() {
                return;
            }
        }
    }
}
