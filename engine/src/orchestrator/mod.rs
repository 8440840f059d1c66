mod flush;

pub use flush::{BuildStats, FlushStat, flush, render};

use crate::assets::Assets;
use crate::bundler::{Bundler, JsBundler};
use crate::chunk::{Chunk, ChunkType, calculate_content_hash};
use crate::config::BuildConfig;
use crate::parser::{Parser, Task};
use crate::resolver::find_module;
use crate::watcher::{FileChange, FileWatcher};
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tessera_shared::{TesseraError, TesseraResult};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Quiet period after a file event during which further events are folded
/// into the same recompile.
const COALESCE_WINDOW: Duration = Duration::from_millis(50);
const APP_MODULE: &str = "app";

/// Receives the outcome of every watch-mode recompile.
pub trait WatchObserver: Send + Sync {
    fn changed(&self, _file: &Path, _affected: &[PathBuf]) {}

    /// The change does not affect any output.
    fn not_required(&self, _file: &Path) {}

    fn unlinked(&self, _file: &Path) {}

    fn completed(&self, _stats: &BuildStats) {}

    fn failed(&self, _error: &TesseraError) {}
}

/// Reports watch-mode progress through the log.
#[derive(Debug, Default)]
pub struct LogObserver;

impl WatchObserver for LogObserver {
    fn changed(&self, file: &Path, affected: &[PathBuf]) {
        info!(target: "tessera::watch", "{} changed, recompiling {} file(s)", file.display(), affected.len());
    }

    fn not_required(&self, file: &Path) {
        debug!(target: "tessera::watch", "{} changed, not required", file.display());
    }

    fn unlinked(&self, file: &Path) {
        info!(target: "tessera::watch", "{} removed", file.display());
    }

    fn completed(&self, stats: &BuildStats) {
        info!(
            target: "tessera::watch",
            "wrote {} file(s) in {:.2?}",
            stats.files.len(),
            stats.elapsed
        );
    }

    fn failed(&self, error: &TesseraError) {
        error!(target: "tessera::watch", "{error}");
    }
}

/// A running watch loop. Dropping the session aborts the loop.
pub struct WatchSession {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl WatchSession {
    /// Stops the loop and releases the file system watch.
    pub async fn close(mut self) {
        self.shutdown.notify_one();
        if let Err(err) = (&mut self.handle).await {
            warn!(target: "tessera::watch", "watch loop ended abnormally: {err}");
        }
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Resets the running flag when a build ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Sequences plugin hooks, compilation, bundling and writing.
pub struct Orchestrator {
    config: Arc<BuildConfig>,
    assets: Arc<Assets>,
    parser: Parser,
    bundler: Arc<dyn Bundler>,
    running: AtomicBool,
}

impl Orchestrator {
    pub fn new(config: Arc<BuildConfig>) -> Self {
        let assets = Arc::new(Assets::new());
        Self {
            parser: Parser::new(config.clone(), assets.clone()),
            config,
            assets,
            bundler: Arc::new(JsBundler::new()),
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_bundler(mut self, bundler: Arc<dyn Bundler>) -> Self {
        self.bundler = bundler;
        self
    }

    #[inline(always)]
    pub fn config(&self) -> &Arc<BuildConfig> {
        &self.config
    }

    #[inline(always)]
    pub fn assets(&self) -> &Arc<Assets> {
        &self.assets
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Full build from the manifest.
    ///
    /// # Errors
    ///
    /// [`TesseraError::AlreadyRunning`] when another build is in flight,
    /// [`TesseraError::Precondition`] without a project config, otherwise
    /// the first hook, compile or write error.
    pub async fn run(&self) -> TesseraResult<BuildStats> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(TesseraError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);
        let started = Instant::now();

        self.assets.clear();
        self.apply_async_hooks();
        for plugin in self.config.plugins() {
            debug!(target: "tessera::build", "before hook of {}", plugin.name());
            plugin.apply_before(&self.config).await?;
        }
        self.apply_before_transform().await?;

        let project_config = self.config.project_config_file();
        if !project_config.is_file() {
            return Err(TesseraError::Precondition(project_config.display().to_string()));
        }
        let entries = self.find_entries()?;
        let tasks = std::iter::once(project_config)
            .chain(entries)
            .map(Task::new)
            .collect();
        self.parser.multi_compile(tasks).await?;

        let chunks = self.assets.chunks();
        let output = if self.config.bundle() {
            self.bundler.bundle(chunks, &self.config).await?
        } else {
            chunks
        };
        let files = flush(&output, &self.config).await?;

        Ok(BuildStats {
            files,
            elapsed: started.elapsed(),
        })
    }

    fn apply_async_hooks(&self) {
        for plugin in self.config.plugins() {
            let plugin = plugin.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                if let Err(err) = plugin.apply_async(&config).await {
                    warn!(target: "tessera::build", "{} failed: {err}", plugin.name());
                }
            });
        }
    }

    async fn apply_before_transform(&self) -> TesseraResult {
        let collector = Assets::new();
        for plugin in self.config.plugins() {
            plugin.apply_before_transform(&collector, &self.config).await?;
            for chunk in collector.take_all() {
                self.assets.add(chunk);
            }
        }
        Ok(())
    }

    /// The app module (manifest, app script and stylesheet), every file of
    /// every page, and the plugin descriptor when the project declares a
    /// plugin root.
    pub fn find_entries(&self) -> TesseraResult<Vec<PathBuf>> {
        let manifest_file = self.config.manifest_file();
        let mut entries = find_module(APP_MODULE, self.config.src_dir(), &self.config)?
            .unwrap_or_default();
        if !entries.contains(&manifest_file) {
            entries.insert(0, manifest_file.clone());
        }

        for page in self.config.manifest().all_pages() {
            let files = find_module(&page, self.config.src_dir(), &self.config)?.ok_or_else(|| {
                TesseraError::resolve(&manifest_file, format!("folder of page {page} does not exist"))
            })?;
            entries.extend(files);
        }

        if let Some(plugin_root) = self.config.plugin_root() {
            let descriptor = plugin_root.join("plugin.json");
            if descriptor.is_file() {
                entries.push(descriptor);
            }
        }

        let mut seen = BTreeSet::new();
        entries.retain(|entry| seen.insert(entry.clone()));
        Ok(entries)
    }

    /// Starts watching the source directory. Changes are handled one batch
    /// at a time, so recompiles never overlap.
    pub fn watch(self: &Arc<Self>, observer: Arc<dyn WatchObserver>) -> TesseraResult<WatchSession> {
        let mut watcher = FileWatcher::new()?;
        for dir in [self.config.out_dir(), self.config.static_dir(), self.config.temp_dir()] {
            watcher.add_ignored_path(dir)?;
        }
        watcher.watch(self.config.src_dir())?;
        self.config.set_watching(true);
        info!(target: "tessera::watch", "watching {}", self.config.src_dir().display());

        let shutdown = Arc::new(Notify::new());
        let orchestrator = self.clone();
        let stop = shutdown.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.notified() => break,
                    next = watcher.next_changes() => {
                        let Some(next) = next else {
                            observer.failed(&TesseraError::Watcher("event stream closed".into()));
                            break;
                        };
                        let mut changes = match next {
                            Ok(changes) => changes,
                            Err(err) => {
                                let err = TesseraError::from(err);
                                observer.failed(&err);
                                if err.is_fatal_in_watch() {
                                    break;
                                }
                                continue;
                            }
                        };
                        tokio::time::sleep(COALESCE_WINDOW).await;
                        changes.extend(watcher.drain());
                        orchestrator.handle_changes(changes, observer.as_ref()).await;
                    }
                }
            }
            orchestrator.config.set_watching(false);
        });

        Ok(WatchSession { shutdown, handle })
    }

    /// Applies one batch of file changes: drops removed files, recompiles
    /// changed files with the chunks depending on them, and rewrites the
    /// affected outputs.
    pub async fn handle_changes(&self, changes: Vec<FileChange>, observer: &dyn WatchObserver) {
        let mut latest: BTreeMap<PathBuf, FileChange> = BTreeMap::new();
        for change in changes {
            latest.insert(change.path().to_path_buf(), change);
        }

        let mut tasks: BTreeMap<PathBuf, Task> = BTreeMap::new();
        for (file, change) in latest {
            if self.config.is_ignored(&file) {
                continue;
            }
            let removed = matches!(change, FileChange::Removed(_)) || !file.exists();
            if removed {
                if self.assets.delete(&file).is_some() {
                    observer.unlinked(&file);
                }
                continue;
            }

            match self.affected_by(&file).await {
                Ok(affected) if affected.is_empty() => observer.not_required(&file),
                Ok(affected) => {
                    let files: Vec<PathBuf> = affected.iter().map(|task| task.file.clone()).collect();
                    observer.changed(&file, &files);
                    for task in affected {
                        tasks.entry(task.file.clone()).or_insert(task);
                    }
                }
                Err(err) => observer.failed(&err),
            }
        }

        if tasks.is_empty() {
            return;
        }
        match self.recompile(tasks.into_values().collect()).await {
            Ok(stats) => observer.completed(&stats),
            Err(err) => observer.failed(&err),
        }
    }

    /// Chunks to recompile after `file` changed on disk.
    async fn affected_by(&self, file: &Path) -> TesseraResult<Vec<Task>> {
        if file == self.config.manifest_file() {
            self.config.reload_manifest()?;
        }

        let mut affected = Vec::new();
        if let Some(chunk) = self.assets.get(file) {
            let source = fs_err::tokio::read(file).await?;
            if calculate_content_hash(&source) == chunk.hash {
                return Ok(Vec::new());
            }
            affected.push(Task::from_chunk(&chunk));
        }
        let dependents = self.assets.find_by_dependent(file);
        affected.extend(dependents.iter().map(Task::from_chunk));
        Ok(affected)
    }

    async fn recompile(&self, tasks: Vec<Task>) -> TesseraResult<BuildStats> {
        let started = Instant::now();
        self.apply_before_transform().await?;

        let compiled = self.parser.multi_compile(tasks).await?;
        let rebundle = self.config.bundle() && compiled.iter().any(JsBundler::participates);

        let output: Vec<Chunk> = if rebundle {
            let recompiled: BTreeSet<&Path> = compiled.iter().map(|c| c.file.as_path()).collect();
            self.bundler
                .bundle(self.assets.chunks(), &self.config)
                .await?
                .into_iter()
                .filter(|chunk| {
                    chunk.ty == ChunkType::Bundler
                        || (chunk.ty == ChunkType::Entry && chunk.is_script())
                        || recompiled.contains(chunk.file.as_path())
                })
                .collect()
        } else {
            compiled
        };
        let files = flush(&output, &self.config).await?;

        Ok(BuildStats {
            files,
            elapsed: started.elapsed(),
        })
    }
}
