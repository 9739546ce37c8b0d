//! File-backed collaborators for the price cycle.

mod archive;
mod state;

pub use archive::FsRawResponseStore;
pub use state::JsonStateStore;
