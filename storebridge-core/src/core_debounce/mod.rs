/*
    core_debounce - Trailing debounce with an append accumulator

    Raw change notifications arrive one per mutated key. Instead of forwarding
    each of them, they are collected into a window that closes `delay` after
    the *last* event seen:

        event ──► arm (empty window: start collecting, deadline = now + delay)
        event ──► extend (deadline = now + delay, append)
        deadline ──► flush (take everything, emit if non-empty)

    Accumulation is plain append. Duplicates stay in the batch; the consumer
    collapses them.

    A lagging source means raw events were overwritten before they were read.
    The window is then marked `lagged` and its batch no longer lists every
    event, so the consumer has to resynchronize from the source of truth.
*/

use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// What a pushed event did to the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First event of an empty window
    Armed,
    /// Window already open, deadline pushed back
    Extended,
}

/// One closed window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
    pub events: Vec<T>,
    /// Events were lost while this window was open
    pub lagged: bool,
}

/// Debounce state: pending events plus the optional flush deadline
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Vec<T>,
    lagged: bool,
    deadline: Option<Instant>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Vec::new(),
            lagged: false,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Record an event observed at `now`
    pub fn push(&mut self, event: T, now: Instant) -> Transition {
        let transition = if self.deadline.is_none() {
            Transition::Armed
        } else {
            Transition::Extended
        };
        self.pending.push(event);
        self.deadline = Some(now + self.delay);
        transition
    }

    /// Record that events were lost at `now`. Opens or extends the window like
    /// a regular event.
    pub fn mark_lagged(&mut self, now: Instant) -> Transition {
        let transition = if self.deadline.is_none() {
            Transition::Armed
        } else {
            Transition::Extended
        };
        self.lagged = true;
        self.deadline = Some(now + self.delay);
        transition
    }

    pub fn is_lagged(&self) -> bool {
        self.lagged
    }

    /// When the current window closes, if one is open
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Close the window. `None` for an empty window that never lagged.
    pub fn flush(&mut self) -> Option<Batch<T>> {
        self.deadline = None;
        if self.pending.is_empty() && !self.lagged {
            return None;
        }
        Some(Batch {
            events: std::mem::take(&mut self.pending),
            lagged: std::mem::replace(&mut self.lagged, false),
        })
    }
}

/// Drive a [`Debouncer`] from a broadcast stream on its own task.
///
/// `on_flush` runs once per closed non-empty window, on the debounce task.
/// When the source closes, whatever is pending is flushed before the task ends.
/// A lagged receiver keeps going and the window it was in is flushed with
/// `lagged` set.
pub fn spawn_debounced<T, F>(
    mut rx: broadcast::Receiver<T>,
    delay: Duration,
    mut on_flush: F,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: FnMut(Batch<T>) + Send + 'static,
{
    tokio::spawn(async move {
        let mut debouncer = Debouncer::new(delay);

        loop {
            let deadline = debouncer.deadline();

            tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) => {
                        if debouncer.push(event, Instant::now()) == Transition::Armed {
                            debug!("debounce window armed");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("debounce source lagged, {} raw events dropped", skipped);
                        debouncer.mark_lagged(Instant::now());
                    }
                    Err(RecvError::Closed) => {
                        if let Some(batch) = debouncer.flush() {
                            on_flush(batch);
                        }
                        debug!("debounce source closed");
                        break;
                    }
                },
                _ = wait_until(deadline), if deadline.is_some() => {
                    if let Some(batch) = debouncer.flush() {
                        debug!(
                            "debounce window flushed with {} events (lagged: {})",
                            batch.events.len(),
                            batch.lagged
                        );
                        on_flush(batch);
                    }
                }
            }
        }
    })
}

fn wait_until(deadline: Option<Instant>) -> impl Future<Output = ()> {
    sleep_until(deadline.unwrap_or_else(Instant::now))
}
