pub mod assets;
pub mod bundler;
pub mod chunk;
pub mod config;
pub mod loader;
pub mod orchestrator;
pub mod parser;
pub mod plugin;
pub mod resolver;
pub mod watcher;

pub use assets::Assets;
pub use chunk::{Chunk, ChunkType, Dependency};
pub use config::BuildConfig;
pub use orchestrator::{BuildStats, LogObserver, Orchestrator, WatchObserver, WatchSession};
