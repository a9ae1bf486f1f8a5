//! Relation loading
//!
//! Loads `one`, `many` and `through` relations onto already-read rows in
//! batches: one lookup per distinct join key per level, never one per row.

mod loader;
mod options;

pub use loader::{RelationFilter, RelationLoader};
pub use options::{nesting_depth, RelationLoad};
