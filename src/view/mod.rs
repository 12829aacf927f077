//! Virtualized rendering of the visible projection. Only the rows in and
//! around the viewport are ever fetched or painted.

pub mod cache;
pub mod highlight;
pub mod paint;
pub mod selection;
pub mod viewport;

pub use cache::{CachedLine, LineCache};
pub use highlight::Highlighter;
pub use paint::{paint, PaintContext};
pub use selection::{Selection, SelectionLayer};
pub use viewport::{FetchRequest, Viewport};
