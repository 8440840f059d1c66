pub use anyhow;
use std::fmt;
use std::path::PathBuf;
use thiserror::*;

#[derive(Error, Debug)]
pub enum TesseraError {
    #[error("I/O Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("UTF-8 Error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),

    #[error("JSON Error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Notify Error: {0}")]
    NotifyError(#[from] notify::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Resolve error in {}: {message}", .file.display())]
    Resolve { file: PathBuf, message: String },

    #[error("{0}")]
    Loader(#[from] LoaderError),

    #[error("Source map error: {0}")]
    SourceMap(String),

    #[error("Build error: {0}")]
    Build(#[from] anyhow::Error),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("{0} is not provided")]
    Precondition(String),

    #[error("Build is already running")]
    AlreadyRunning,

    #[error("Write failed for {count} destination(s), first: {first}")]
    Flush { count: usize, first: Box<TesseraError> },
}

pub type TesseraResult<T = ()> = Result<T, TesseraError>;

impl TesseraError {
    pub fn resolve(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        TesseraError::Resolve {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Whether the error ends the process when it happens inside a watch
    /// session. Compile and write failures only abort the current recompile.
    pub fn is_fatal_in_watch(&self) -> bool {
        matches!(
            self,
            TesseraError::NotifyError(_) | TesseraError::Watcher(_) | TesseraError::Config(_)
        )
    }

    pub fn response(&self) -> axum::http::Response<String> {
        use axum::http::{Response, StatusCode};

        let (message, code) = match self {
            TesseraError::IoError(e) => (e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
            TesseraError::FileNotFound(file) => {
                (format!("File not found: {}", file), StatusCode::NOT_FOUND)
            }
            _ => (self.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
        };

        Response::builder()
            .status(code)
            .body(message)
            .unwrap_or_else(|_| Response::new("Internal Server Error".to_string()))
    }
}

/// Failure reported by a transform loader.
///
/// Loaders that know where the failure happened fill in the position so the
/// message can point at the offending source fragment.
#[derive(Error, Debug, Clone, Default)]
pub struct LoaderError {
    pub message: String,
    pub file: Option<PathBuf>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub fragment: Option<String>,
}

impl LoaderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Attaches a position and cuts a short fragment of `source` around it.
    #[must_use]
    pub fn at(mut self, source: &str, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self.fragment = source.lines().nth(line.saturating_sub(1)).map(|text| {
            let start = column.saturating_sub(10);
            let head: String = text.chars().skip(start).take(column - start).collect();
            let tail: String = text.chars().skip(column).take(100).collect();
            format!("{head} {tail}\n{}^", " ".repeat(head.chars().count()))
        });
        self
    }
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Loader error")?;
        if let Some(file) = &self.file {
            write!(f, " in {}", file.display())?;
        }
        if let (Some(line), Some(column)) = (self.line, self.column) {
            write!(f, " ({line}:{column})")?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(fragment) = &self.fragment {
            write!(f, "\n{fragment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_error_points_at_column() {
        let source = "let a = 1;\nlet b = ;\n";
        let err = LoaderError::new("Unexpected token").with_file("a.js").at(source, 2, 8);

        let rendered = err.to_string();
        assert!(rendered.contains("a.js"));
        assert!(rendered.contains("(2:8)"));
        assert!(rendered.ends_with('^'));
    }

    #[test]
    fn watch_keeps_running_on_compile_errors() {
        assert!(!TesseraError::resolve("a.json", "bad").is_fatal_in_watch());
        assert!(!TesseraError::Loader(LoaderError::new("x")).is_fatal_in_watch());
        assert!(TesseraError::Watcher("gone".into()).is_fatal_in_watch());
    }

    #[test]
    fn missing_file_maps_to_not_found() {
        let response = TesseraError::FileNotFound("a.png".into()).response();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }
}
