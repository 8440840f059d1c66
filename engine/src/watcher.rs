use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tessera_shared::{TesseraResult, canonicalize_with_strip};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

/// A file system change the build reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Created(path) | FileChange::Modified(path) | FileChange::Removed(path) => {
                path
            }
        }
    }
}

/// Recursive file watcher feeding an async queue.
///
/// Events for editor temporary files and for paths below an ignored
/// directory are dropped. Only changes after [`FileWatcher::watch`] are
/// reported; existing files produce no events.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    rx: UnboundedReceiver<notify::Result<Event>>,
    ignored_paths: Vec<PathBuf>,
}

impl FileWatcher {
    pub fn new() -> TesseraResult<Self> {
        Self::with_poll_interval(Duration::from_millis(100))
    }

    /// The interval only matters on platforms where notify falls back to
    /// polling.
    pub fn with_poll_interval(poll_interval: Duration) -> TesseraResult<Self> {
        let (tx, rx) = unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default().with_poll_interval(poll_interval),
        )?;

        Ok(Self {
            watcher,
            rx,
            ignored_paths: Vec::new(),
        })
    }

    pub fn watch<P: AsRef<Path>>(&mut self, path: P) -> TesseraResult {
        self.watcher.watch(path.as_ref(), RecursiveMode::Recursive)?;
        Ok(())
    }

    /// Ignores everything below `path`. Paths that do not exist yet are
    /// matched as given.
    pub fn add_ignored_path<P: AsRef<Path>>(&mut self, path: P) -> TesseraResult {
        let path = path.as_ref();
        let path = if path.exists() {
            canonicalize_with_strip(path)?
        } else {
            path.to_path_buf()
        };
        if !self.ignored_paths.contains(&path) {
            self.ignored_paths.push(path);
        }
        Ok(())
    }

    /// Waits for the next batch of changes. `None` once the watcher is gone.
    pub async fn next_changes(&mut self) -> Option<notify::Result<Vec<FileChange>>> {
        let event = self.rx.recv().await?;
        Some(event.map(|event| self.changes(event)))
    }

    /// Changes already queued, without waiting. Errors are dropped.
    pub fn drain(&mut self) -> Vec<FileChange> {
        let mut changes = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            if let Ok(event) = event {
                changes.extend(self.changes(event));
            }
        }
        changes
    }

    fn changes(&self, event: Event) -> Vec<FileChange> {
        let make: fn(PathBuf) -> FileChange = match event.kind {
            EventKind::Create(_) => FileChange::Created,
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => FileChange::Removed,
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FileChange::Created,
            EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
            EventKind::Modify(_) => FileChange::Modified,
            EventKind::Remove(_) => FileChange::Removed,
            _ => return Vec::new(),
        };

        event
            .paths
            .into_iter()
            .filter(|path| !self.is_ignored_path(path) && !path.is_dir())
            .map(make)
            .collect()
    }

    fn is_ignored_path(&self, path: &Path) -> bool {
        let temporary = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(is_temporary_file);
        if temporary {
            return true;
        }

        let canonical = canonicalize_with_strip(path).unwrap_or_else(|_| path.to_path_buf());
        self.ignored_paths
            .iter()
            .any(|ignored| canonical.starts_with(ignored) || path.starts_with(ignored))
    }
}

/// Editor swap, backup and auto-save files.
pub fn is_temporary_file(file_name: &str) -> bool {
    const SUFFIXES: [&str; 11] = [
        "~", ".swp", ".swo", ".swx", ".tmp", ".temp", ".bak", ".backup",
        "___jb_tmp___", "___jb_old___", ".crswap",
    ];
    if SUFFIXES.iter().any(|suffix| file_name.ends_with(suffix)) {
        return true;
    }

    // emacs auto-save
    if file_name.starts_with('#') && file_name.ends_with('#') {
        return true;
    }

    file_name.starts_with(".~")
        || file_name.starts_with("___")
        || (file_name.starts_with('.') && (file_name.contains(".swp") || file_name.contains(".tmp")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn detects_editor_leftovers() {
        for name in ["index.js~", ".index.js.swp", "#index.js#", "a.tmp", "a.js___jb_tmp___", ".~lock"] {
            assert!(is_temporary_file(name), "{name}");
        }
        for name in ["index.js", "app.json", "logo.png"] {
            assert!(!is_temporary_file(name), "{name}");
        }
    }

    #[tokio::test]
    async fn maps_events_to_changes() {
        let temp = TempDir::new().unwrap();
        let mut watcher = FileWatcher::new().unwrap();
        watcher.add_ignored_path(temp.path().join("app")).unwrap();

        let file = temp.path().join("src/a.js");
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(file.clone())
            .add_path(temp.path().join("app/a.js"))
            .add_path(temp.path().join("src/a.js.swp"));
        assert_eq!(watcher.changes(event), [FileChange::Modified(file.clone())]);

        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(file.clone());
        assert_eq!(watcher.changes(event), [FileChange::Removed(file)]);
    }

    #[tokio::test]
    async fn reports_writes_below_watched_dir() {
        let temp = TempDir::new().unwrap();
        let dir = canonicalize_with_strip(temp.path()).unwrap();
        let mut watcher = FileWatcher::new().unwrap();
        watcher.watch(&dir).unwrap();

        fs_err::write(dir.join("a.js"), "1").unwrap();
        let changes = tokio::time::timeout(Duration::from_secs(5), watcher.next_changes())
            .await
            .expect("no event within timeout")
            .unwrap()
            .unwrap();

        assert!(changes.iter().all(|change| change.path() == dir.join("a.js")));
    }
}
