use crate::assets::Assets;
use crate::chunk::{Chunk, ChunkType, calculate_content_hash};
use crate::config::BuildConfig;
use crate::loader::{LoaderPass, run_chain};
use crate::resolver::{Resolved, resolver_for};
use log::{debug, error};
use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_shared::{TesseraError, TesseraResult};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const MAX_PARALLEL_COMPILES: usize = 8;

/// One file to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub file: PathBuf,
    /// Overrides the destination derived from the source path.
    pub destination: Option<PathBuf>,
    pub ty: ChunkType,
}

impl Task {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            destination: None,
            ty: ChunkType::Entry,
        }
    }

    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    #[must_use]
    pub fn with_type(mut self, ty: ChunkType) -> Self {
        self.ty = ty;
        self
    }

    /// Recompiles a known chunk in its current role.
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            file: chunk.file.clone(),
            destination: chunk.destination().map(Path::to_path_buf),
            ty: chunk.ty,
        }
    }
}

/// Turns source files into chunks, following their dependencies.
pub struct Parser {
    config: Arc<BuildConfig>,
    assets: Arc<Assets>,
    concurrency: usize,
}

impl Parser {
    pub fn new(config: Arc<BuildConfig>, assets: Arc<Assets>) -> Self {
        Self {
            config,
            assets,
            concurrency: num_cpus::get().clamp(1, MAX_PARALLEL_COMPILES),
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Compiles `file` and everything it reaches that is not known yet.
    pub async fn compile(&self, file: impl Into<PathBuf>) -> TesseraResult<Chunk> {
        let file = file.into();
        self.multi_compile(vec![Task::new(&file)]).await?;
        self.assets
            .get(&file)
            .ok_or_else(|| TesseraError::FileNotFound(file.display().to_string()))
    }

    /// Compiles every task, then every dependency not yet present in the
    /// assets, concurrently.
    ///
    /// Requested files are always recompiled. Returns every chunk that was
    /// compiled or gained a destination, in path order. When any file fails
    /// the first error is returned once all in-flight work has settled.
    pub async fn multi_compile(&self, tasks: Vec<Task>) -> TesseraResult<Vec<Chunk>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut compiled: BTreeMap<PathBuf, Chunk> = BTreeMap::new();
        let mut first_error = None;

        for task in tasks {
            if seen.insert(task.file.clone()) {
                self.spawn(&mut join_set, &semaphore, task);
            }
        }

        while let Some(joined) = join_set.join_next().await {
            let result = joined.map_err(|e| TesseraError::Build(e.into())).and_then(|r| r);
            let chunk = match result {
                Ok(chunk) => chunk,
                Err(err) => {
                    error!(target: "tessera::parser", "{err}");
                    first_error.get_or_insert(err);
                    continue;
                }
            };

            for dependency in chunk.dependencies.iter().filter(|dep| !dep.embedded) {
                if self.assets.exists(&dependency.dependency)
                    || !seen.insert(dependency.dependency.clone())
                {
                    continue;
                }
                let task = Task::new(&dependency.dependency)
                    .with_destination(&dependency.destination)
                    .with_type(dependency.kind.unwrap_or(ChunkType::Entry));
                self.spawn(&mut join_set, &semaphore, task);
            }
            compiled.insert(chunk.file.clone(), chunk);
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        // A file referenced from several places is written to each of them.
        let references: Vec<(PathBuf, PathBuf)> = compiled
            .values()
            .flat_map(|chunk| chunk.dependencies.iter())
            .filter(|dep| !dep.embedded)
            .map(|dep| (dep.dependency.clone(), dep.destination.clone()))
            .collect();
        for (file, destination) in references {
            if self.assets.add_destination(&file, &destination) {
                if let Some(chunk) = self.assets.get(&file) {
                    compiled.insert(file, chunk);
                }
            } else if let Some(chunk) = compiled.get_mut(&file) {
                chunk.add_destination(destination);
            }
        }

        Ok(compiled.into_values().collect())
    }

    fn spawn(
        &self,
        join_set: &mut JoinSet<TesseraResult<Chunk>>,
        semaphore: &Arc<Semaphore>,
        task: Task,
    ) {
        let config = self.config.clone();
        let assets = self.assets.clone();
        let semaphore = semaphore.clone();

        join_set.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| TesseraError::Build(e.into()))?;
            compile_one(&config, &assets, task).await
        });
    }
}

/// Reads, resolves and transforms one file and stores the resulting chunk.
async fn compile_one(config: &Arc<BuildConfig>, assets: &Assets, task: Task) -> TesseraResult<Chunk> {
    let Task { file, destination, ty } = task;
    debug!(target: "tessera::parser", "compiling {} as {ty}", file.display());

    let source = match fs_err::tokio::read(&file).await {
        Ok(source) => source,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(TesseraError::FileNotFound(file.display().to_string()));
        }
        Err(err) => return Err(err.into()),
    };
    let hash = calculate_content_hash(&source);
    let rule = config.match_rule(&file).cloned();
    let destination = destination.unwrap_or_else(|| config.destination_for(&file));

    let resolved = match resolver_for(&file) {
        Some(resolver) => {
            let config = config.clone();
            let file = file.clone();
            tokio::task::spawn_blocking(move || resolver.resolve(&source, &file, &config))
                .await
                .map_err(|e| TesseraError::Build(e.into()))??
        }
        None => Resolved {
            content: source,
            dependencies: Vec::new(),
        },
    };

    let bindings = rule.as_ref().map(|rule| rule.loaders.as_slice()).unwrap_or_default();
    let transformed = run_chain(
        bindings,
        LoaderPass::Compile,
        &file,
        ty,
        resolved.content,
        None,
        config,
    )
    .await?;

    let mut chunk = Chunk::new(&file, ty)
        .with_content(transformed.content)
        .with_destination(destination);
    chunk.source_map = transformed.source_map;
    chunk.dependencies = resolved.dependencies;
    chunk.dependencies.extend(transformed.dependencies);
    chunk.rule = rule;
    chunk.hash = hash;

    if let Some(existing) = assets.get(&file) {
        for destination in existing.destinations {
            chunk.add_destination(destination);
        }
    }
    Ok(assets.add(chunk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoaderBinding, Rule};
    use crate::loader::EnvifyLoader;
    use crate::resolver::tests::write;
    use tempfile::TempDir;

    fn parser(root: &Path) -> (Parser, Arc<Assets>) {
        let config = BuildConfig::new(root)
            .with_public_path("https://cdn.example.com")
            .with_rule(
                Rule::new(r"\.js$")
                    .unwrap()
                    .with_loader(LoaderBinding::new(Arc::new(EnvifyLoader)).with_options(
                        serde_json::json!({ "env": { "MODE": "test" } }),
                    )),
            );
        let assets = Arc::new(Assets::new());
        (Parser::new(Arc::new(config), assets.clone()), assets)
    }

    #[tokio::test]
    async fn follows_dependencies_once() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let a = write(root, "src/a.js", "require('./b'); require('./c');");
        let b = write(root, "src/b.js", "require('./c'); require('./a');");
        let c = write(root, "src/c.js", "module.exports = process.env.MODE;");
        let (parser, assets) = parser(root);

        let chunks = parser.multi_compile(vec![Task::new(&a)]).await.unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(assets.len(), 3);
        assert_eq!(assets.get(&a).unwrap().ty, ChunkType::Entry);
        assert_eq!(assets.get(&b).unwrap().ty, ChunkType::Bundle);
        assert_eq!(
            assets.get(&c).unwrap().content_str(),
            "module.exports = \"test\";"
        );
        assert_eq!(
            assets.get(&b).unwrap().content_str(),
            "require('./c.js'); require('./a.js');"
        );
    }

    #[tokio::test]
    async fn missing_file_fails_the_call() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let good = write(root, "src/good.js", "");
        let (parser, assets) = parser(root);

        let err = parser
            .multi_compile(vec![Task::new(&good), Task::new(root.join("src/gone.js"))])
            .await
            .unwrap_err();

        assert!(matches!(err, TesseraError::FileNotFound(_)));
        assert!(assets.exists(&good));
    }

    #[tokio::test]
    async fn recompiling_keeps_extra_destinations() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let file = write(root, "src/a.js", "1");
        let (parser, assets) = parser(root);

        parser.compile(&file).await.unwrap();
        assets.add_destination(&file, &root.join("app/copy.js"));
        fs_err::write(&file, "2").unwrap();
        let chunk = parser.compile(&file).await.unwrap();

        assert_eq!(chunk.content_str(), "2");
        assert_eq!(chunk.destinations.len(), 2);
    }
}
