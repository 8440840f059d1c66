mod clean;
mod dev_server;

pub use clean::{CleanPlugin, CleanTarget};
pub use dev_server::DevServerPlugin;

use crate::assets::Assets;
use crate::config::BuildConfig;
use async_trait::async_trait;
use std::sync::Arc;
use tessera_shared::{TesseraError, TesseraResult};

/// Build lifecycle hooks. Every hook is optional.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Started in the background when a build begins; never awaited by it.
    async fn apply_async(&self, _config: &BuildConfig) -> TesseraResult {
        Ok(())
    }

    /// Awaited in registration order before anything is compiled.
    async fn apply_before(&self, _config: &BuildConfig) -> TesseraResult {
        Ok(())
    }

    /// Awaited in registration order before compiling. Chunks added to
    /// `collector` join the build.
    async fn apply_before_transform(&self, _collector: &Assets, _config: &BuildConfig) -> TesseraResult {
        Ok(())
    }
}

/// Looks up a plugin shipped with the engine by its configuration name.
pub fn builtin(name: &str, options: &serde_json::Value) -> TesseraResult<Arc<dyn Plugin>> {
    match name {
        "clean" => Ok(Arc::new(CleanPlugin::from_options(options)?)),
        "dev-server" => Ok(Arc::new(DevServerPlugin::new())),
        _ => Err(TesseraError::Config(format!("unknown plugin {name}"))),
    }
}
