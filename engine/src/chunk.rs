use crate::config::Rule;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Role a chunk plays in the output.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    /// Reachable from the manifest; served at its own destination.
    Entry,
    /// Required by another script; only exists to be bundled.
    Bundle,
    /// The packed module table produced by the bundler.
    Bundler,
    /// Kept out of the bundle and emitted standalone.
    Scatter,
}

impl ChunkType {
    /// Chunk types whose flushed output carries an inline source map.
    pub fn carries_source_map(self) -> bool {
        matches!(self, ChunkType::Bundle | ChunkType::Bundler | ChunkType::Scatter)
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChunkType::Entry => "entry",
            ChunkType::Bundle => "bundle",
            ChunkType::Bundler => "bundler",
            ChunkType::Scatter => "scatter",
        };
        f.write_str(name)
    }
}

/// One edge of the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// The file holding the reference.
    pub file: PathBuf,
    /// The referenced file.
    pub dependency: PathBuf,
    /// Where the referenced file is written.
    pub destination: PathBuf,
    /// Specifier text exactly as written in the source.
    pub required: String,
    /// Specifier text after rewriting, when it changed.
    pub rewritten: Option<String>,
    pub kind: Option<ChunkType>,
    /// Set for files a loader inlined (e.g. sass partials). They invalidate
    /// the owner on change but are never compiled on their own.
    pub embedded: bool,
}

impl Dependency {
    pub fn new(
        file: impl Into<PathBuf>,
        dependency: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        required: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            dependency: dependency.into(),
            destination: destination.into(),
            required: required.into(),
            rewritten: None,
            kind: None,
            embedded: false,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ChunkType) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn with_rewritten(mut self, rewritten: impl Into<String>) -> Self {
        let rewritten = rewritten.into();
        if rewritten != self.required {
            self.rewritten = Some(rewritten);
        }
        self
    }

    #[must_use]
    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    /// Every specifier under which the owner's final code refers to the
    /// dependency.
    pub fn specifiers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.required.as_str()).chain(self.rewritten.as_deref())
    }
}

/// Compiled artifact for exactly one source file.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub file: PathBuf,
    pub ty: ChunkType,
    pub content: Vec<u8>,
    pub source_map: Option<String>,
    pub dependencies: Vec<Dependency>,
    pub destinations: Vec<PathBuf>,
    pub rule: Option<Arc<Rule>>,
    /// Hash of the raw source the chunk was compiled from.
    pub hash: String,
}

impl Chunk {
    pub fn new(file: impl Into<PathBuf>, ty: ChunkType) -> Self {
        Self {
            file: file.into(),
            ty,
            content: Vec::new(),
            source_map: None,
            dependencies: Vec::new(),
            destinations: Vec::new(),
            rule: None,
            hash: String::new(),
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = content.into();
        self
    }

    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.add_destination(destination);
        self
    }

    /// Primary destination, used when a single output path is needed.
    pub fn destination(&self) -> Option<&Path> {
        self.destinations.first().map(PathBuf::as_path)
    }

    /// Returns true if the destination was not known yet.
    pub fn add_destination(&mut self, destination: impl Into<PathBuf>) -> bool {
        let destination = destination.into();
        if self.destinations.contains(&destination) {
            return false;
        }
        self.destinations.push(destination);
        true
    }

    pub fn depends_on(&self, file: &Path) -> bool {
        self.dependencies.iter().any(|dep| dep.dependency == file)
    }

    /// True when the primary destination is a script file.
    pub fn is_script(&self) -> bool {
        self.destination()
            .and_then(|dest| dest.extension())
            .is_some_and(|ext| ext == "js")
    }

    pub fn content_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

pub fn calculate_content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
