mod common;

use async_trait::async_trait;
use common::{PUBLIC_PATH, orchestrator, project, read, snapshot, write};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tessera_engine::config::{LoaderBinding, Rule};
use tessera_engine::loader::{Loader, LoaderInput, LoaderOptions, LoaderOutput};
use tessera_engine::plugin::Plugin;
use tessera_engine::{Assets, BuildConfig, Chunk, ChunkType, Orchestrator};
use tessera_shared::{LoaderError, TesseraError, TesseraResult};

#[tokio::test]
async fn entries_are_manifest_and_page_files() {
    let temp = project();
    let root = temp.path();
    let orchestrator = orchestrator(root, false).await;

    let entries = orchestrator.find_entries().unwrap();
    let names: Vec<_> = entries
        .iter()
        .map(|p| p.strip_prefix(root.join("src")).unwrap().to_string_lossy().replace('\\', "/"))
        .collect();

    assert_eq!(
        names,
        [
            "app.js",
            "app.json",
            "app.wxss",
            "pages/index/index.js",
            "pages/index/index.json",
            "pages/index/index.wxml",
            "pages/index/index.wxss",
            "pages/logs/logs.js",
            "pages/logs/logs.wxml",
        ]
    );
}

#[tokio::test]
async fn full_build_writes_output_tree() {
    let temp = project();
    let root = temp.path();
    let orchestrator = orchestrator(root, false).await;

    let stats = orchestrator.run().await.unwrap();
    assert!(!stats.files.is_empty());

    assert_eq!(
        read(root, "app/pages/index/index.js"),
        "const util = require('../../utils/util.js')\nPage({ data: util.greet() })"
    );
    assert_eq!(read(root, "app/utils/util.js"), "module.exports = { greet: () => 'hi' }");
    assert_eq!(read(root, "app/components/card/card.wxml"), "<view class=\"card\"><slot /></view>");
    assert_eq!(read(root, "app/common.wxss"), ".common {}");
    assert_eq!(
        read(root, "app/pages/index/index.wxml"),
        format!("<card /><image src=\"{PUBLIC_PATH}/images/home.png\" />")
    );
    assert_eq!(
        read(root, "app/app.wxss"),
        format!("page {{ background: url('{PUBLIC_PATH}/images/bg.png'); }}")
    );
    assert!(root.join("static/images/home.png").is_file());
    assert!(root.join("static/images/bg.png").is_file());

    let project_config: serde_json::Value =
        serde_json::from_str(&read(root, "app/project.config.json")).unwrap();
    assert_eq!(project_config["miniprogramRoot"], "./");
}

#[tokio::test]
async fn bundled_build_stubs_entries() {
    let temp = project();
    let root = temp.path();
    let orchestrator = orchestrator(root, true).await;

    orchestrator.run().await.unwrap();

    let bundler = read(root, "app/bundler.js");
    assert_eq!(bundler.matches("[function(require, module, exports) {").count(), 5);
    assert!(bundler.contains("//# sourceMappingURL=data:application/json"));

    let app = read(root, "app/app.js");
    assert!(app.starts_with("require(\"./bundler\")(\""));
    let index = read(root, "app/pages/index/index.js");
    assert!(index.starts_with("require(\"../../bundler\")(\""));
    assert_ne!(app, index);

    // bundle-only modules live in bundler.js alone
    assert!(!root.join("app/utils/util.js").exists());
}

#[tokio::test]
async fn rebuilding_unchanged_tree_is_byte_identical() {
    let temp = project();
    let root = temp.path();
    let orchestrator = orchestrator(root, true).await;

    orchestrator.run().await.unwrap();
    let first = snapshot(&root.join("app"));
    orchestrator.run().await.unwrap();
    let second = snapshot(&root.join("app"));

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[tokio::test]
async fn manifest_without_pages_fails_resolution() {
    let temp = project();
    let root = temp.path();
    write(root, "src/app.json", r#"{"window": {}}"#);

    let err = BuildConfig::new(root)
        .with_public_path(PUBLIC_PATH)
        .resolve()
        .await
        .unwrap_err();
    assert!(matches!(err, TesseraError::Config(_)));
}

#[tokio::test]
async fn project_config_is_required() {
    let temp = project();
    let root = temp.path();
    fs_err::remove_file(root.join("project.config.json")).unwrap();
    let orchestrator = orchestrator(root, false).await;

    let err = orchestrator.run().await.unwrap_err();
    assert!(matches!(err, TesseraError::Precondition(_)));
    assert!(!orchestrator.is_running());
}

#[tokio::test]
async fn second_run_fails_fast() {
    let temp = project();
    let root = temp.path();
    let orchestrator = orchestrator(root, false).await;

    let (first, second) = tokio::join!(orchestrator.run(), orchestrator.run());

    assert!(first.is_ok());
    assert!(matches!(second, Err(TesseraError::AlreadyRunning)));
}

#[tokio::test]
async fn resolve_error_aborts_build() {
    let temp = project();
    let root = temp.path();
    write(root, "src/pages/logs/logs.js", "require('./missing')");
    let orchestrator = orchestrator(root, false).await;

    let err = orchestrator.run().await.unwrap_err();
    assert!(matches!(err, TesseraError::Resolve { .. }));
}

/// Records the hooks it sees; the first one registered is the slowest.
struct Recorder {
    name: &'static str,
    delay: Duration,
    calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Plugin for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    async fn apply_before(&self, _config: &BuildConfig) -> TesseraResult {
        tokio::time::sleep(self.delay).await;
        self.calls.lock().push(format!("before:{}", self.name));
        Ok(())
    }

    async fn apply_before_transform(&self, _collector: &Assets, _config: &BuildConfig) -> TesseraResult {
        tokio::time::sleep(self.delay).await;
        self.calls.lock().push(format!("transform:{}", self.name));
        Ok(())
    }
}

/// Fails in the background and emits one generated file.
struct Generator;

#[async_trait]
impl Plugin for Generator {
    fn name(&self) -> &str {
        "generator"
    }

    async fn apply_async(&self, _config: &BuildConfig) -> TesseraResult {
        Err(TesseraError::Config("background task failed".into()))
    }

    async fn apply_before_transform(&self, collector: &Assets, config: &BuildConfig) -> TesseraResult {
        let chunk = Chunk::new(config.src_dir().join("version.txt"), ChunkType::Entry)
            .with_content("v1")
            .with_destination(config.out_dir().join("version.txt"));
        collector.add(chunk);
        Ok(())
    }
}

struct Append(&'static str);

#[async_trait]
impl Loader for Append {
    fn name(&self) -> &str {
        "append"
    }

    async fn transform(
        &self,
        input: LoaderInput<'_>,
        _options: &LoaderOptions,
    ) -> Result<LoaderOutput, LoaderError> {
        let mut code = input.content.to_vec();
        code.extend_from_slice(self.0.as_bytes());
        Ok(LoaderOutput::new(code))
    }
}

/// Rejects the logs page script, passes everything else through.
struct RejectLogs;

#[async_trait]
impl Loader for RejectLogs {
    fn name(&self) -> &str {
        "reject-logs"
    }

    async fn transform(
        &self,
        input: LoaderInput<'_>,
        _options: &LoaderOptions,
    ) -> Result<LoaderOutput, LoaderError> {
        if input.file.ends_with("pages/logs/logs.js") {
            let source = String::from_utf8_lossy(input.content);
            return Err(LoaderError::new("Unexpected token").at(&source, 1, 4));
        }
        Ok(LoaderOutput::new(input.content))
    }
}

async fn build_with(root: &Path, configure: impl FnOnce(BuildConfig) -> BuildConfig) -> Orchestrator {
    let config = configure(BuildConfig::new(root).with_public_path(PUBLIC_PATH))
        .resolve()
        .await
        .unwrap();
    Orchestrator::new(Arc::new(config))
}

#[tokio::test]
async fn plugin_hooks_run_in_registration_order() {
    let temp = project();
    let root = temp.path();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let orchestrator = build_with(root, |config| {
        config
            .with_plugin(Arc::new(Recorder {
                name: "first",
                delay: Duration::from_millis(30),
                calls: calls.clone(),
            }))
            .with_plugin(Arc::new(Recorder {
                name: "second",
                delay: Duration::ZERO,
                calls: calls.clone(),
            }))
    })
    .await;

    orchestrator.run().await.unwrap();

    assert_eq!(
        *calls.lock(),
        ["before:first", "before:second", "transform:first", "transform:second"]
    );
}

#[tokio::test]
async fn collected_chunks_are_written_and_async_failures_ignored() {
    let temp = project();
    let root = temp.path();
    let orchestrator = build_with(root, |config| config.with_plugin(Arc::new(Generator))).await;

    orchestrator.run().await.unwrap();

    assert_eq!(read(root, "app/version.txt"), "v1");
    assert!(orchestrator.assets().exists(orchestrator.config().src_dir().join("version.txt")));
}

#[tokio::test]
async fn loaders_chain_in_rule_order() {
    let temp = project();
    let root = temp.path();
    let rule = Rule::new(r"app\.js$")
        .unwrap()
        .with_loader(LoaderBinding::new(Arc::new(Append("/*a*/"))))
        .with_loader(LoaderBinding::new(Arc::new(Append("/*b*/"))));
    let orchestrator = build_with(root, |config| config.with_rule(rule)).await;

    orchestrator.run().await.unwrap();

    assert_eq!(read(root, "app/app.js"), "App({})/*a*//*b*/");
    assert_eq!(read(root, "app/pages/logs/logs.js"), "Page({})");
}

#[tokio::test]
async fn loader_error_aborts_build_with_position() {
    let temp = project();
    let root = temp.path();
    let rule = Rule::new(r"\.js$")
        .unwrap()
        .with_loader(LoaderBinding::new(Arc::new(RejectLogs)));
    let orchestrator = build_with(root, |config| config.with_rule(rule)).await;

    let err = match orchestrator.run().await.unwrap_err() {
        TesseraError::Loader(err) => err,
        other => panic!("expected a loader error, got {other}"),
    };
    assert!(err.file.as_deref().is_some_and(|file| file.ends_with("pages/logs/logs.js")));
    assert_eq!((err.line, err.column), (Some(1), Some(4)));
    assert!(err.fragment.is_some());
    assert!(!root.join("app/pages/logs/logs.js").exists());
}
