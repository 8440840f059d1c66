#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tessera_engine::{BuildConfig, Orchestrator};

pub const PUBLIC_PATH: &str = "https://cdn.example.com/mp";

pub fn write(root: &Path, relative: &str, content: impl AsRef<[u8]>) -> PathBuf {
    let path = root.join(relative);
    fs_err::create_dir_all(path.parent().unwrap()).unwrap();
    fs_err::write(&path, content).unwrap();
    path
}

/// A two page project: the index page requires a shared util, the logs page
/// does not.
pub fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    write(root, "project.config.json", r#"{"miniprogramRoot": "src/", "appid": "wx0"}"#);
    write(
        root,
        "src/app.json",
        r#"{"pages": ["pages/index/index", "pages/logs/logs"], "tabBar": {"list": [{"iconPath": "images/home.png"}]}}"#,
    );
    write(root, "src/app.js", "App({})");
    write(root, "src/app.wxss", "page { background: url('/images/bg.png'); }");
    write(root, "src/images/home.png", [0x89, b'P', b'N', b'G']);
    write(root, "src/images/bg.png", [0x89, b'P', b'N', b'G', 1]);

    write(root, "src/pages/index/index.json", r#"{"usingComponents": {"card": "/components/card/card"}}"#);
    write(
        root,
        "src/pages/index/index.js",
        "const util = require('../../utils/util')\nPage({ data: util.greet() })",
    );
    write(root, "src/pages/index/index.wxml", "<card /><image src=\"/images/home.png\" />");
    write(root, "src/pages/index/index.wxss", "@import \"../../common.wxss\";\n.index {}");
    write(root, "src/common.wxss", ".common {}");

    write(root, "src/pages/logs/logs.js", "Page({})");
    write(root, "src/pages/logs/logs.wxml", "<view>logs</view>");

    write(root, "src/components/card/card.js", "Component({})");
    write(root, "src/components/card/card.json", r#"{"component": true}"#);
    write(root, "src/components/card/card.wxml", "<view class=\"card\"><slot /></view>");

    write(root, "src/utils/util.js", "module.exports = { greet: () => 'hi' }");
    temp
}

pub async fn orchestrator(root: &Path, bundle: bool) -> Arc<Orchestrator> {
    let config = BuildConfig::new(root)
        .with_public_path(PUBLIC_PATH)
        .with_bundle(bundle)
        .resolve()
        .await
        .unwrap();
    Arc::new(Orchestrator::new(Arc::new(config)))
}

pub fn read(root: &Path, relative: &str) -> String {
    fs_err::read_to_string(root.join(relative)).unwrap()
}

/// Every file below `dir` with its content, in path order.
pub fn snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs_err::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let content = fs_err::read(&path).unwrap();
                files.push((path, content));
            }
        }
    }
    files.sort();
    files
}
