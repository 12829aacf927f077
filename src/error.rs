use std::io;
use std::path::PathBuf;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("indexing failed at byte {offset}: {source}")]
    Indexing {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("filter scan failed at line {line}: {source}")]
    Scan {
        line: usize,
        #[source]
        source: io::Error,
    },

    #[error("no document loaded")]
    NoDocument,

    #[error("document is not a live stream")]
    NotStream,
}
