use crate::chunk::Chunk;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Registry of every chunk known to the build, keyed by absolute source path.
///
/// Iteration follows path order so anything derived from a full listing
/// (bundle ids in particular) is stable between runs.
#[derive(Debug, Default)]
pub struct Assets {
    chunks: RwLock<BTreeMap<PathBuf, Chunk>>,
}

impl Assets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `chunk`, replacing any chunk registered for the same file.
    pub fn add(&self, chunk: Chunk) -> Chunk {
        let mut chunks = self.chunks.write();
        chunks.insert(chunk.file.clone(), chunk.clone());
        chunk
    }

    pub fn get<P: AsRef<Path>>(&self, file: P) -> Option<Chunk> {
        self.chunks.read().get(file.as_ref()).cloned()
    }

    pub fn exists<P: AsRef<Path>>(&self, file: P) -> bool {
        self.chunks.read().contains_key(file.as_ref())
    }

    /// Mutates a chunk in place. Returns false when the file is unknown.
    pub fn update<P, F>(&self, file: P, f: F) -> bool
    where
        P: AsRef<Path>,
        F: FnOnce(&mut Chunk),
    {
        match self.chunks.write().get_mut(file.as_ref()) {
            Some(chunk) => {
                f(chunk);
                true
            }
            None => false,
        }
    }

    /// Records an extra output path for an existing chunk. Returns true if
    /// the destination was new.
    pub fn add_destination<P: AsRef<Path>>(&self, file: P, destination: &Path) -> bool {
        let mut added = false;
        self.update(file, |chunk| added = chunk.add_destination(destination));
        added
    }

    pub fn delete<P: AsRef<Path>>(&self, file: P) -> Option<Chunk> {
        self.chunks.write().remove(file.as_ref())
    }

    /// Every chunk whose dependency list references `file`.
    pub fn find_by_dependent<P: AsRef<Path>>(&self, file: P) -> Vec<Chunk> {
        let file = file.as_ref();
        self.chunks
            .read()
            .values()
            .filter(|chunk| chunk.depends_on(file))
            .cloned()
            .collect()
    }

    pub fn chunks(&self) -> Vec<Chunk> {
        self.chunks.read().values().cloned().collect()
    }

    /// Moves every chunk out, leaving the registry empty.
    pub fn take_all(&self) -> Vec<Chunk> {
        std::mem::take(&mut *self.chunks.write())
            .into_values()
            .collect()
    }

    pub fn clear(&self) {
        self.chunks.write().clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }
}
