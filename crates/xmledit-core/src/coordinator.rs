//! Selection scheduling.
//!
//! [`SelectionCoordinator`] turns the fine-grained event stream of a [`TextBuffer`] into a
//! throttled sequence of analyses. Buffer events only set a dirty flag; each
//! [`tick`](SelectionCoordinator::tick) analyzes the caret line at most once if the flag
//! is set. Ticks can be driven by the host's own scheduler or by the worker thread
//! started with [`spawn`](SelectionCoordinator::spawn).

use crate::buffer::BufferEvent;
use crate::config::CoordinatorConfig;
use crate::error::{Result, SyncError};
use crate::model::ModelObject;
use crate::sync::{Analysis, ChangeReport, ModelSyncEngine};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

/// A property edit raised by the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    /// Line of the edited object: the selection itself or one of its children.
    pub line: usize,
    /// Property name.
    pub property: String,
    /// New value as text; empty removes the attribute.
    pub new_value: String,
    /// Value before the edit, used to find dependents.
    pub old_value: String,
}

impl PropertyChange {
    /// Create a change record.
    pub fn new(
        line: usize,
        property: impl Into<String>,
        new_value: impl Into<String>,
        old_value: impl Into<String>,
    ) -> Self {
        Self {
            line,
            property: property.into(),
            new_value: new_value.into(),
            old_value: old_value.into(),
        }
    }
}

struct CoordinatorState {
    engine: Arc<ModelSyncEngine>,
    dirty: AtomicBool,
    // 0 until the first analysis.
    last_line: AtomicUsize,
}

impl CoordinatorState {
    fn on_buffer_event(&self, event: &BufferEvent) {
        match event {
            // Also while busy: an edit during analysis can move the element being read.
            BufferEvent::TextChanged(_) => self.dirty.store(true, Ordering::Release),
            BufferEvent::CaretMoved { .. } if self.engine.is_busy() => {}
            BufferEvent::CaretMoved { line } => {
                if *line != self.last_line.load(Ordering::Acquire) {
                    self.dirty.store(true, Ordering::Release);
                }
            }
        }
    }

    fn tick(&self) -> Result<Option<Analysis>> {
        if self.engine.is_busy() || !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(None);
        }
        let line = self.engine.buffer().current_line();
        let analysis = self.engine.analyze(line);
        match &analysis {
            Ok(Analysis::Skipped) => self.dirty.store(true, Ordering::Release),
            _ => self.last_line.store(line, Ordering::Release),
        }
        analysis.map(Some)
    }
}

struct Worker {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Debounces buffer events into serialized analyses and routes view edits back.
pub struct SelectionCoordinator {
    state: Arc<CoordinatorState>,
    worker: Option<Worker>,
}

impl SelectionCoordinator {
    /// Create a coordinator and subscribe it to the engine's buffer.
    ///
    /// The coordinator starts dirty, so the first tick publishes the caret line.
    pub fn new(engine: Arc<ModelSyncEngine>) -> Self {
        let state = Arc::new(CoordinatorState {
            engine,
            dirty: AtomicBool::new(true),
            last_line: AtomicUsize::new(0),
        });

        let weak: Weak<CoordinatorState> = Arc::downgrade(&state);
        state.engine.buffer().subscribe(Box::new(move |event| {
            if let Some(state) = weak.upgrade() {
                state.on_buffer_event(event);
            }
        }));

        Self {
            state,
            worker: None,
        }
    }

    /// The engine driven by this coordinator.
    pub fn engine(&self) -> &Arc<ModelSyncEngine> {
        &self.state.engine
    }

    /// The currently published model.
    pub fn selection(&self) -> Option<Arc<ModelObject>> {
        self.state.engine.selection()
    }

    /// Returns `true` if an analysis is pending.
    pub fn is_dirty(&self) -> bool {
        self.state.dirty.load(Ordering::Acquire)
    }

    /// Request an analysis on the next tick.
    pub fn mark_dirty(&self) {
        self.state.dirty.store(true, Ordering::Release);
    }

    /// Line of the last completed analysis; `None` before the first one.
    pub fn last_analyzed_line(&self) -> Option<usize> {
        match self.state.last_line.load(Ordering::Acquire) {
            0 => None,
            line => Some(line),
        }
    }

    /// One scheduler step.
    ///
    /// Returns `Ok(None)` when nothing was pending or the engine was busy. An analysis
    /// skipped by the engine leaves the coordinator dirty.
    pub fn tick(&self) -> Result<Option<Analysis>> {
        self.state.tick()
    }

    /// Run ticks on a worker thread: one after `warmup`, then every `interval`.
    ///
    /// Analysis errors are logged by the engine and do not stop the worker. Calling
    /// this while a worker is running does nothing.
    pub fn spawn(&mut self, config: &CoordinatorConfig) -> io::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let state = Arc::clone(&self.state);
        let warmup = config.warmup();
        let interval = config.interval().max(Duration::from_millis(1));
        let (stop, stopped) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("xmledit-coordinator".to_string())
            .spawn(move || {
                let mut wait = warmup;
                loop {
                    match stopped.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {
                            // Failures are already logged by the engine.
                            let _ = state.tick();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    wait = interval;
                }
                debug!("coordinator worker stopped");
            })?;

        info!(
            warmup_ms = config.warmup_ms,
            interval_ms = config.interval_ms,
            "coordinator worker started"
        );
        self.worker = Some(Worker { stop, handle });
        Ok(())
    }

    /// Returns `true` while the worker thread runs.
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Stop the worker thread and wait for it to exit.
    pub fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop.send(());
            let _ = worker.handle.join();
        }
    }

    /// Apply a view edit to the selected model and write it back.
    ///
    /// The edited object is the selection itself or its descendant starting on
    /// `change.line`. The coordinator is marked dirty afterwards, whether or not the
    /// write succeeded, so the view is refreshed from the text.
    pub fn property_changed(&self, change: PropertyChange) -> Result<ChangeReport> {
        let result = self.apply_change(&change);
        self.mark_dirty();
        result
    }

    fn apply_change(&self, change: &PropertyChange) -> Result<ChangeReport> {
        let selection = self
            .selection()
            .ok_or(SyncError::NoSelection(change.line))?;
        let mut target = selection
            .find_by_line(change.line)
            .cloned()
            .ok_or(SyncError::NoSelection(change.line))?;
        target.set_text(&change.property, &change.new_value)?;
        debug!(
            line = change.line,
            property = %change.property,
            value = %change.new_value,
            "property changed in view"
        );
        self.state
            .engine
            .change_model(&target, &change.property, &change.old_value)
    }
}

impl Drop for SelectionCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
