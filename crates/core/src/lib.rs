// crates/core/src/lib.rs
pub mod bucket;
pub mod format;
pub mod llm;
pub mod nlsql;
pub mod types;

pub use bucket::*;
pub use format::*;
pub use types::*;
