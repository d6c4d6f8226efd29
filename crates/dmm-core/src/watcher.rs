//! Watcher (§4.F): recursive filesystem watch over the memory root, debounced per-path
//! and normalized into `ChangeEvent`s delivered to the Indexer over a channel.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
}

/// Watches `root` recursively, filters to `.md` files outside any `deprecated/`
/// segment, coalesces rapid repeat events per path within `debounce`, and forwards the
/// most recent event kind once the window elapses.
pub struct MemoryWatcher {
    _watcher: RecommendedWatcher,
}

impl MemoryWatcher {
    pub fn start(root: PathBuf, debounce: Duration) -> Result<(Self, mpsc::UnboundedReceiver<ChangeEvent>), WatcherError> {
        let (raw_tx, raw_rx) = std_mpsc::channel::<Event>();
        let (out_tx, out_rx) = mpsc::unbounded_channel::<ChangeEvent>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = raw_tx.send(event);
            }
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        std::thread::spawn(move || debounce_loop(raw_rx, out_tx, debounce));

        Ok((Self { _watcher: watcher }, out_rx))
    }
}

fn is_relevant(path: &Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some("md") {
        return false;
    }
    !path.components().any(|c| c.as_os_str() == "deprecated")
}

fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

/// Dedicated debounce thread: tracks the most recent event kind per path and its
/// deadline, flushing paths whose window has elapsed.
fn debounce_loop(raw_rx: std_mpsc::Receiver<Event>, out_tx: mpsc::UnboundedSender<ChangeEvent>, debounce: Duration) {
    let mut pending: HashMap<PathBuf, (ChangeKind, Instant)> = HashMap::new();

    loop {
        let timeout = pending
            .values()
            .map(|(_, deadline)| deadline.saturating_duration_since(Instant::now()))
            .min()
            .unwrap_or(Duration::from_millis(50));

        match raw_rx.recv_timeout(timeout) {
            Ok(event) => {
                if let Some(kind) = classify(&event.kind) {
                    for path in event.paths {
                        if !is_relevant(&path) {
                            continue;
                        }
                        pending.insert(path, (kind, Instant::now() + debounce));
                    }
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        let ready: Vec<PathBuf> = pending.iter().filter(|(_, (_, deadline))| *deadline <= now).map(|(p, _)| p.clone()).collect();
        for path in ready {
            if let Some((kind, _)) = pending.remove(&path) {
                let sent = out_tx.send(ChangeEvent {
                    kind,
                    path,
                    timestamp: chrono::Utc::now(),
                });
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md_files_outside_deprecated_are_relevant() {
        assert!(is_relevant(Path::new("project/auth/jwt.md")));
        assert!(!is_relevant(Path::new("project/auth/jwt.txt")));
        assert!(!is_relevant(Path::new("deprecated/project/jwt.md")));
    }

    #[test]
    fn classify_maps_notify_kinds() {
        assert_eq!(classify(&EventKind::Create(notify::event::CreateKind::File)), Some(ChangeKind::Created));
        assert_eq!(classify(&EventKind::Remove(notify::event::RemoveKind::File)), Some(ChangeKind::Deleted));
        assert_eq!(classify(&EventKind::Access(notify::event::AccessKind::Any)), None);
    }
}
