use super::Plugin;
use crate::config::BuildConfig;
use async_trait::async_trait;
use log::{info, warn};
use serde::Deserialize;
use tessera_shared::{TesseraError, TesseraResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanTarget {
    Out,
    Static,
    Temp,
}

/// Empties build directories before a build.
#[derive(Debug, Clone)]
pub struct CleanPlugin {
    targets: Vec<CleanTarget>,
}

impl CleanPlugin {
    pub fn new(targets: Vec<CleanTarget>) -> Self {
        Self { targets }
    }

    /// `{"dirs": ["out", "static", "temp"]}`; every directory when absent.
    pub fn from_options(options: &serde_json::Value) -> TesseraResult<Self> {
        match options.get("dirs") {
            Some(dirs) => {
                let targets = serde_json::from_value(dirs.clone())
                    .map_err(|e| TesseraError::Config(format!("clean plugin: {e}")))?;
                Ok(Self::new(targets))
            }
            None => Ok(Self::default()),
        }
    }
}

impl Default for CleanPlugin {
    fn default() -> Self {
        Self::new(vec![CleanTarget::Out, CleanTarget::Static, CleanTarget::Temp])
    }
}

#[async_trait]
impl Plugin for CleanPlugin {
    fn name(&self) -> &str {
        "clean"
    }

    async fn apply_before(&self, config: &BuildConfig) -> TesseraResult {
        for target in &self.targets {
            let dir = match target {
                CleanTarget::Out => config.out_dir(),
                CleanTarget::Static => config.static_dir(),
                CleanTarget::Temp => config.temp_dir(),
            };
            if dir == config.root_dir() || dir == config.src_dir() || config.src_dir().starts_with(dir) {
                warn!(target: "tessera::clean", "refusing to remove {}", dir.display());
                continue;
            }
            if dir.exists() {
                fs_err::tokio::remove_dir_all(dir).await?;
                info!(target: "tessera::clean", "removed {}", dir.display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn removes_selected_dirs_only() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        for dir in ["src", "app", "static", ".temporary"] {
            fs_err::create_dir_all(root.join(dir)).unwrap();
        }
        let config = BuildConfig::new(root);
        let plugin =
            CleanPlugin::from_options(&serde_json::json!({ "dirs": ["out", "temp"] })).unwrap();

        plugin.apply_before(&config).await.unwrap();

        assert!(!root.join("app").exists());
        assert!(!root.join(".temporary").exists());
        assert!(root.join("static").exists());
        assert!(root.join("src").exists());
    }

    #[tokio::test]
    async fn never_removes_the_source_tree() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs_err::create_dir_all(root.join("src")).unwrap();
        let config = BuildConfig::new(root).with_out_dir("src");

        CleanPlugin::default().apply_before(&config).await.unwrap();
        assert!(root.join("src").exists());
    }

    #[test]
    fn rejects_unknown_targets() {
        let options = serde_json::json!({ "dirs": ["src"] });
        assert!(CleanPlugin::from_options(&options).is_err());
    }
}
