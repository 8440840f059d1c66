use crate::chunk::Chunk;
use crate::config::BuildConfig;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::future::join_all;
use log::{debug, error};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tessera_shared::{TesseraError, TesseraResult, strip_bom};

/// One written output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushStat {
    pub destination: PathBuf,
    pub size: usize,
}

/// Outcome of a build or recompile.
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    pub files: Vec<FlushStat>,
    pub elapsed: Duration,
}

impl BuildStats {
    pub fn total_size(&self) -> usize {
        self.files.iter().map(|stat| stat.size).sum()
    }
}

/// Final bytes of a chunk: byte order mark removed, inline source map
/// appended for chunk types that carry one.
pub fn render(chunk: &Chunk, config: &BuildConfig) -> Vec<u8> {
    let mut content = strip_bom(&chunk.content).to_vec();

    if let Some(map) = chunk.source_map.as_deref() {
        if config.source_map() && chunk.ty.carries_source_map() {
            content.extend_from_slice(b"\n//# sourceMappingURL=data:application/json;charset=utf-8;base64,");
            content.extend_from_slice(STANDARD.encode(map).as_bytes());
        }
    }
    content
}

async fn write(destination: &Path, content: &[u8]) -> TesseraResult<FlushStat> {
    if let Some(parent) = destination.parent() {
        fs_err::tokio::create_dir_all(parent).await?;
    }
    fs_err::tokio::write(destination, content).await?;
    debug!(target: "tessera::flush", "wrote {}", destination.display());

    Ok(FlushStat {
        destination: destination.to_path_buf(),
        size: content.len(),
    })
}

/// Writes every chunk to every one of its destinations.
///
/// Destinations are written independently: one failing write does not stop
/// the others, and the call fails afterwards with the number of failures.
pub async fn flush(chunks: &[Chunk], config: &BuildConfig) -> TesseraResult<Vec<FlushStat>> {
    let rendered: Vec<(&Path, Vec<u8>)> = chunks
        .iter()
        .flat_map(|chunk| {
            let content = render(chunk, config);
            chunk
                .destinations
                .iter()
                .map(move |destination| (destination.as_path(), content.clone()))
        })
        .collect();

    let results = join_all(
        rendered
            .iter()
            .map(|(destination, content)| write(destination, content)),
    )
    .await;

    let mut stats = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(stat) => stats.push(stat),
            Err(err) => {
                error!(target: "tessera::flush", "{err}");
                failures.push(err);
            }
        }
    }

    let count = failures.len();
    if let Some(first) = failures.into_iter().next() {
        return Err(TesseraError::Flush {
            count,
            first: Box::new(first),
        });
    }
    stats.sort_by(|a, b| a.destination.cmp(&b.destination));
    Ok(stats)
}
