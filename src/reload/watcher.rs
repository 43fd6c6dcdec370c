//! Filesystem watcher with debounce.
//!
//! Raw notify events are noisy: editors emit write bursts, atomic saves
//! produce create/remove pairs, and metadata touches carry no content
//! change. Events are collected into a pending set and flushed as one
//! batch once the stream has been quiet for the debounce window.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::Sender;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

const DEBOUNCE_MS: u64 = 300;

/// Editor artifacts that must never trigger a reload.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Collects changed paths and reports them once the event stream has
/// been quiet long enough. Pure timing, no filesystem access.
struct DebounceBuffer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl DebounceBuffer {
    fn new() -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
        }
    }

    fn add_event(&mut self, event: &notify::Event) {
        use notify::EventKind;

        match event.kind {
            EventKind::Create(_) | EventKind::Remove(_) => {}
            EventKind::Modify(modify) => {
                // mtime/chmod noise would loop reloads forever
                if matches!(modify, notify::event::ModifyKind::Metadata(_)) {
                    return;
                }
            }
            _ => return,
        }

        for path in &event.paths {
            if is_temp_file(path) {
                continue;
            }
            crate::debug!("watch"; "{:?}: {}", event.kind, path.display());
            self.pending.insert(path.clone());
            self.last_event = Some(Instant::now());
        }
    }

    /// Drain the pending set if the debounce window has elapsed.
    fn take_if_quiet(&mut self) -> Option<Vec<PathBuf>> {
        let last_event = self.last_event?;
        if last_event.elapsed() < Duration::from_millis(DEBOUNCE_MS) {
            return None;
        }
        self.last_event = None;
        if self.pending.is_empty() {
            return None;
        }
        let mut batch: Vec<PathBuf> = self.pending.drain().collect();
        batch.sort();
        Some(batch)
    }
}

/// Watches a set of directories and delivers debounced change batches.
/// Dropping the watcher disconnects the notify channel, which ends the
/// debounce thread.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    _thread: JoinHandle<()>,
}

impl FileWatcher {
    /// Start watching. Non-existent paths are skipped so a configured
    /// watch target can appear later without failing startup.
    pub fn start(paths: &[PathBuf], batch_tx: Sender<Vec<PathBuf>>) -> notify::Result<Self> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        for path in paths {
            if path.exists() {
                watcher.watch(path, RecursiveMode::Recursive)?;
                crate::debug!("watch"; "watching {}", path.display());
            } else {
                crate::log!("watch"; "skipping missing path {}", path.display());
            }
        }

        let thread = thread::spawn(move || {
            let mut buffer = DebounceBuffer::new();
            loop {
                match notify_rx.recv_timeout(Duration::from_millis(DEBOUNCE_MS)) {
                    Ok(Ok(event)) => buffer.add_event(&event),
                    Ok(Err(e)) => crate::log!("watch"; "notify error: {}", e),
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                }

                if let Some(batch) = buffer.take_if_quiet() {
                    if batch_tx.send(batch).is_err() {
                        break;
                    }
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            _thread: thread,
        })
    }
}
