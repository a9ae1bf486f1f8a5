//! boundorm - A bounded ORM query and mutation engine over index-only stores
//!
//! Every read is planned against declared indexes and every host access is
//! bounded. Unindexed work needs an explicit opt-in.

pub mod engine;
pub mod errors;
pub mod filter;
pub mod index;
pub mod mutation;
pub mod observability;
pub mod planner;
pub mod query;
pub mod relation;
pub mod schema;
pub mod store;
pub mod stream;

pub use engine::{EngineContext, Host, Orm};
pub use errors::{EngineError, EngineResult, ErrorKind};
