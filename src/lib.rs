pub mod bookmarks;
pub mod config;
pub mod constants;
pub mod error;
pub mod export;
pub mod feed;
pub mod filter;
pub mod index;
pub mod lines;
pub mod matcher;
pub mod projection;
pub mod protocol;
pub mod search;
pub mod session;
pub mod source;
pub mod view;
pub mod worker;

pub use config::{Config, EngineConfig, ViewConfig};
pub use error::{EngineError, Result};
pub use filter::FilterRule;
pub use protocol::{Command, Event, Request, Response};
pub use session::Session;
pub use worker::EngineHandle;
