mod manifest;
mod rule;

pub use manifest::*;
pub use rule::*;

use crate::loader::LoaderOptions;
use crate::plugin::Plugin;
use indexmap::IndexMap;
use log::debug;
use parking_lot::RwLock;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tessera_shared::{TesseraError, TesseraResult, rebase, to_slash, with_extname};
use tokio::net::TcpListener;

const MANIFEST_FILE: &str = "app.json";
const PROJECT_CONFIG_FILE: &str = "project.config.json";
const NPM_SOURCE_DIR: &str = "node_modules";
const IDLE_PORTS: std::ops::Range<u16> = 50000..60000;

/// Build configuration.
///
/// Constructed with defaults, adjusted with the `with_*` builders and then
/// finalised once by [`BuildConfig::resolve`]. Afterwards only the watching
/// flag and the manifest change.
pub struct BuildConfig {
    root_dir: PathBuf,
    src_dir: PathBuf,
    out_dir: PathBuf,
    static_dir: PathBuf,
    temp_dir: PathBuf,
    public_path: Option<String>,
    host: String,
    port: Option<u16>,
    npm_dir: String,
    rules: Vec<Arc<Rule>>,
    plugins: Vec<Arc<dyn Plugin>>,
    alias: IndexMap<String, Vec<String>>,
    ignore: Vec<glob::Pattern>,
    bundle: bool,
    source_map: bool,
    silence: bool,
    watching: AtomicBool,
    manifest: RwLock<Manifest>,
    plugin_root: Option<PathBuf>,
}

impl BuildConfig {
    /// Creates a configuration rooted at `root` with default layout:
    /// `src/`, `app/`, `static/` and `.temporary/`.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        let root_dir = root.into();
        Self {
            src_dir: root_dir.join("src"),
            out_dir: root_dir.join("app"),
            static_dir: root_dir.join("static"),
            temp_dir: root_dir.join(".temporary"),
            root_dir,
            public_path: None,
            host: "127.0.0.1".to_string(),
            port: None,
            npm_dir: "npm".to_string(),
            rules: Vec::new(),
            plugins: Vec::new(),
            alias: IndexMap::new(),
            ignore: Vec::new(),
            bundle: false,
            source_map: true,
            silence: false,
            watching: AtomicBool::new(false),
            manifest: RwLock::new(Manifest::default()),
            plugin_root: None,
        }
    }

    #[must_use]
    pub fn with_src_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.src_dir = self.root_dir.join(dir);
        self
    }

    #[must_use]
    pub fn with_out_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.out_dir = self.root_dir.join(dir);
        self
    }

    #[must_use]
    pub fn with_static_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.static_dir = self.root_dir.join(dir);
        self
    }

    #[must_use]
    pub fn with_temp_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.temp_dir = self.root_dir.join(dir);
        self
    }

    #[must_use]
    pub fn with_public_path(mut self, public_path: impl Into<String>) -> Self {
        self.public_path = Some(public_path.into());
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_npm_dir(mut self, name: impl Into<String>) -> Self {
        self.npm_dir = name.into();
        self
    }

    #[must_use]
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    #[must_use]
    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Maps a glob-like specifier pattern to candidate paths, relative to the
    /// root directory. A single `*` in the key is substituted into the
    /// candidates.
    #[must_use]
    pub fn with_alias(mut self, pattern: impl Into<String>, candidates: Vec<String>) -> Self {
        self.alias.insert(pattern.into(), candidates);
        self
    }

    pub fn with_ignore(mut self, pattern: &str) -> TesseraResult<Self> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| TesseraError::Config(format!("invalid ignore pattern {pattern}: {e}")))?;
        self.ignore.push(pattern);
        Ok(self)
    }

    #[must_use]
    pub fn with_bundle(mut self, bundle: bool) -> Self {
        self.bundle = bundle;
        self
    }

    #[must_use]
    pub fn with_source_map(mut self, source_map: bool) -> Self {
        self.source_map = source_map;
        self
    }

    #[must_use]
    pub fn with_silence(mut self, silence: bool) -> Self {
        self.silence = silence;
        self
    }

    #[must_use]
    pub fn with_watching(self, watching: bool) -> Self {
        self.set_watching(watching);
        self
    }

    /// Validates the configuration, loads the manifest and settles the
    /// public path.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::Config`] for an invalid rule, a public path
    /// that is not a remote URL, or a manifest that is missing, unreadable or
    /// declares no pages.
    pub async fn resolve(mut self) -> TesseraResult<Self> {
        for rule in &self.rules {
            rule.validate()?;
        }

        let public_path = match self.public_path.take() {
            Some(path) => path,
            None => {
                let port = match self.port {
                    Some(port) => port,
                    None => find_idle_port().await?,
                };
                self.port = Some(port);
                format!("http://{}:{}", self.host, port)
            }
        };
        if !(public_path.starts_with("http://") || public_path.starts_with("https://")) {
            return Err(TesseraError::Config(format!(
                "public path {public_path} is not a remote url, the mini program cannot load local static resources"
            )));
        }
        self.public_path = Some(public_path);

        let manifest = Manifest::load(&self.manifest_file())?;
        if manifest.pages.is_empty() {
            return Err(TesseraError::Config(format!(
                "No entry pages found, please check the pages field of {}",
                self.manifest_file().display()
            )));
        }
        *self.manifest.write() = manifest;

        self.plugin_root = self.read_plugin_root();
        debug!(target: "tessera::config", "resolved {:?}", self);
        Ok(self)
    }

    fn read_plugin_root(&self) -> Option<PathBuf> {
        let source = fs_err::read(self.project_config_file()).ok()?;
        let project: serde_json::Value = serde_json::from_slice(&source).ok()?;
        project
            .get("pluginRoot")
            .and_then(|root| root.as_str())
            .map(|root| self.src_dir.join(root))
    }

    /// Re-reads the manifest after it changed on disk.
    pub fn reload_manifest(&self) -> TesseraResult {
        let manifest = Manifest::load(&self.manifest_file())?;
        *self.manifest.write() = manifest;
        Ok(())
    }

    #[inline(always)]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    #[inline(always)]
    pub fn src_dir(&self) -> &Path {
        &self.src_dir
    }

    #[inline(always)]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    #[inline(always)]
    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }

    #[inline(always)]
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Empty until the configuration is resolved.
    pub fn public_path(&self) -> &str {
        self.public_path.as_deref().unwrap_or_default()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn npm_dir(&self) -> &str {
        &self.npm_dir
    }

    pub fn npm_out_dir(&self) -> PathBuf {
        self.out_dir.join(&self.npm_dir)
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    pub fn alias(&self) -> &IndexMap<String, Vec<String>> {
        &self.alias
    }

    pub fn bundle(&self) -> bool {
        self.bundle
    }

    pub fn source_map(&self) -> bool {
        self.source_map
    }

    pub fn silence(&self) -> bool {
        self.silence
    }

    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }

    pub fn set_watching(&self, watching: bool) {
        self.watching.store(watching, Ordering::SeqCst);
    }

    pub fn manifest(&self) -> Manifest {
        self.manifest.read().clone()
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.src_dir.join(MANIFEST_FILE)
    }

    pub fn project_config_file(&self) -> PathBuf {
        self.root_dir.join(PROJECT_CONFIG_FILE)
    }

    pub fn plugin_root(&self) -> Option<&Path> {
        self.plugin_root.as_deref()
    }

    pub fn match_rule(&self, file: &Path) -> Option<&Arc<Rule>> {
        match_rule(&self.rules, file)
    }

    /// True for editor leftovers and files matching a configured ignore
    /// pattern, tested against the path relative to the source directory
    /// and against the bare file name.
    pub fn is_ignored(&self, file: &Path) -> bool {
        let relative = file.strip_prefix(&self.src_dir).unwrap_or(file);
        let relative = to_slash(relative);
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.ignore
            .iter()
            .any(|pattern| pattern.matches(&relative) || pattern.matches(&name))
    }

    /// Where a compiled file is written.
    ///
    /// Files below a `node_modules` folder go to the npm output directory,
    /// relative to that folder; files below the source or root directory keep
    /// their sub-path under the output directory. The matched rule may swap
    /// the extension.
    pub fn destination_for(&self, file: &Path) -> PathBuf {
        let destination = npm_relative(file)
            .map(|rest| self.npm_out_dir().join(rest))
            .or_else(|| rebase(file, &self.src_dir, &self.out_dir))
            .or_else(|| rebase(file, &self.root_dir, &self.out_dir))
            .unwrap_or_else(|| self.out_dir.join(file.file_name().unwrap_or_default()));

        match self.match_rule(file).and_then(|rule| rule.extname.as_deref()) {
            Some(extname) => with_extname(destination, extname),
            None => destination,
        }
    }

    /// Where a binary resource referenced by url is written.
    pub fn static_destination_for(&self, file: &Path) -> PathBuf {
        npm_relative(file)
            .map(|rest| self.static_dir.join(&self.npm_dir).join(rest))
            .or_else(|| rebase(file, &self.src_dir, &self.static_dir))
            .or_else(|| rebase(file, &self.root_dir, &self.static_dir))
            .unwrap_or_else(|| self.static_dir.join(file.file_name().unwrap_or_default()))
    }

    /// Public URL of a file written below the static directory.
    pub fn public_url_for(&self, static_destination: &Path) -> String {
        let relative = static_destination
            .strip_prefix(&self.static_dir)
            .unwrap_or(static_destination);

        format!(
            "{}/{}",
            self.public_path().trim_end_matches('/'),
            to_slash(relative).trim_start_matches('/')
        )
    }

    pub fn loader_options(&self, options: serde_json::Value) -> LoaderOptions {
        LoaderOptions {
            root_dir: self.root_dir.clone(),
            src_dir: self.src_dir.clone(),
            out_dir: self.out_dir.clone(),
            source_map: self.source_map,
            options,
        }
    }
}

impl fmt::Debug for BuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildConfig")
            .field("root_dir", &self.root_dir)
            .field("src_dir", &self.src_dir)
            .field("out_dir", &self.out_dir)
            .field("static_dir", &self.static_dir)
            .field("public_path", &self.public_path)
            .field("npm_dir", &self.npm_dir)
            .field("rules", &self.rules.len())
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("bundle", &self.bundle)
            .field("source_map", &self.source_map)
            .field("watching", &self.is_watching())
            .finish()
    }
}

/// Sub-path of `file` after its innermost `node_modules` folder.
fn npm_relative(file: &Path) -> Option<PathBuf> {
    let components: Vec<Component<'_>> = file.components().collect();
    let position = components
        .iter()
        .rposition(|c| matches!(c, Component::Normal(part) if *part == NPM_SOURCE_DIR))?;

    Some(components[position + 1..].iter().collect())
}

async fn find_idle_port() -> TesseraResult<u16> {
    for port in IDLE_PORTS {
        if TcpListener::bind(("0.0.0.0", port)).await.is_ok() {
            return Ok(port);
        }
    }
    Err(TesseraError::Config(format!(
        "no idle port found in {}..{}",
        IDLE_PORTS.start, IDLE_PORTS.end
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::EnvifyLoader;

    fn config() -> BuildConfig {
        BuildConfig::new("/project")
            .with_public_path("https://cdn.example.com/assets/")
            .with_rule(
                Rule::new(r"\.scss$")
                    .unwrap()
                    .with_extname(".wxss")
                    .with_loader(LoaderBinding::new(Arc::new(EnvifyLoader))),
            )
    }

    #[test]
    fn destinations_mirror_source_tree() {
        let config = config();
        assert_eq!(
            config.destination_for(Path::new("/project/src/pages/index/index.js")),
            PathBuf::from("/project/app/pages/index/index.js")
        );
        assert_eq!(
            config.destination_for(Path::new("/project/src/pages/index/index.scss")),
            PathBuf::from("/project/app/pages/index/index.wxss")
        );
        assert_eq!(
            config.destination_for(Path::new("/project/project.config.json")),
            PathBuf::from("/project/app/project.config.json")
        );
    }

    #[test]
    fn vendor_files_move_to_npm_dir() {
        let config = config();
        assert_eq!(
            config.destination_for(Path::new("/project/node_modules/lodash/index.js")),
            PathBuf::from("/project/app/npm/lodash/index.js")
        );
        assert_eq!(
            config.static_destination_for(Path::new("/project/node_modules/icons/a.png")),
            PathBuf::from("/project/static/npm/icons/a.png")
        );
    }

    #[test]
    fn public_url_joins_without_double_slash() {
        let config = config();
        let destination = config.static_destination_for(Path::new("/project/src/images/a.png"));
        assert_eq!(
            config.public_url_for(&destination),
            "https://cdn.example.com/assets/images/a.png"
        );
    }

    #[test]
    fn ignore_patterns_match_relative_and_name() {
        let config = config()
            .with_ignore("**/*.md")
            .unwrap()
            .with_ignore(".DS_Store")
            .unwrap();

        assert!(config.is_ignored(Path::new("/project/src/docs/readme.md")));
        assert!(config.is_ignored(Path::new("/project/src/pages/.DS_Store")));
        assert!(!config.is_ignored(Path::new("/project/src/app.js")));
    }

    #[tokio::test]
    async fn rejects_local_public_path() {
        let result = BuildConfig::new("/nowhere")
            .with_public_path("/static")
            .resolve()
            .await;
        assert!(matches!(result, Err(TesseraError::Config(_))));
    }
}
