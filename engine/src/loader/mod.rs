mod envify;

pub use envify::EnvifyLoader;

use crate::chunk::{ChunkType, Dependency};
use crate::config::{BuildConfig, LoaderBinding};
use async_trait::async_trait;
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_shared::{LoaderError, TesseraError, TesseraResult};

/// What a loader sees of the chunk being transformed.
#[derive(Debug, Clone, Copy)]
pub struct LoaderInput<'a> {
    pub file: &'a Path,
    pub content: &'a [u8],
    pub source_map: Option<&'a str>,
    pub ty: ChunkType,
}

/// Build paths plus the options attached to the loader in its rule.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub root_dir: PathBuf,
    pub src_dir: PathBuf,
    pub out_dir: PathBuf,
    pub source_map: bool,
    pub options: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct LoaderOutput {
    pub code: Vec<u8>,
    pub map: Option<String>,
    /// Files the transform read on its own; they invalidate the chunk.
    pub dependencies: Vec<PathBuf>,
}

impl LoaderOutput {
    pub fn new(code: impl Into<Vec<u8>>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }
}

/// A content transform step bound to a rule.
#[async_trait]
pub trait Loader: Send + Sync {
    fn name(&self) -> &str;

    async fn transform(
        &self,
        input: LoaderInput<'_>,
        options: &LoaderOptions,
    ) -> Result<LoaderOutput, LoaderError>;
}

/// Which bindings of a rule take part in a pass.
#[derive(Debug, Clone, Copy)]
pub enum LoaderPass {
    /// Compile time: unrestricted bindings plus those listing the chunk type.
    Compile,
    /// After bundling: only bindings that explicitly list the chunk type.
    Explicit,
}

/// Result of running a loader chain over one chunk.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub content: Vec<u8>,
    pub source_map: Option<String>,
    pub dependencies: Vec<Dependency>,
}

/// Runs `bindings` in order, each loader receiving the output of the
/// previous one.
pub async fn run_chain(
    bindings: &[LoaderBinding],
    pass: LoaderPass,
    file: &Path,
    ty: ChunkType,
    content: Vec<u8>,
    source_map: Option<String>,
    config: &BuildConfig,
) -> TesseraResult<Transformed> {
    let mut transformed = Transformed {
        content,
        source_map,
        dependencies: Vec::new(),
    };

    for binding in bindings {
        let applies = match pass {
            LoaderPass::Compile => binding.applies_to(ty),
            LoaderPass::Explicit => binding.targets(ty),
        };
        if !applies {
            continue;
        }

        debug!(target: "tessera::loader", "{} <- {}", file.display(), binding.loader.name());

        let input = LoaderInput {
            file,
            content: &transformed.content,
            source_map: transformed.source_map.as_deref(),
            ty,
        };
        let options = config.loader_options(binding.options.clone());
        let output = binding
            .loader
            .transform(input, &options)
            .await
            .map_err(|err| match err.file {
                Some(_) => TesseraError::Loader(err),
                None => TesseraError::Loader(err.with_file(file)),
            })?;

        transformed.content = output.code;
        if output.map.is_some() {
            transformed.source_map = output.map;
        }
        for dependency in output.dependencies {
            let destination = config.destination_for(&dependency);
            transformed.dependencies.push(
                Dependency::new(file, dependency, destination, String::new()).embedded(),
            );
        }
    }

    Ok(transformed)
}

/// Looks up a loader shipped with the engine by its configuration name.
pub fn builtin(name: &str) -> Option<Arc<dyn Loader>> {
    match name {
        "envify" => Some(Arc::new(EnvifyLoader)),
        _ => None,
    }
}
