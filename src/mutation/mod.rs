//! Mutation subsystem
//!
//! Inserts, updates and deletes, each built fluently and executed against
//! the host writer.
//!
//! # Design Principles
//!
//! - Updates and deletes select rows through the same compiled plans as
//!   reads, under stricter guardrails
//! - Every guardrail is checked before the first write
//! - Bulk work beyond one call continues through scheduled, validated
//!   payloads that carry the exact resume cursor
//! - `returning` never reports more than the batch that was written
//!
//! ```ignore
//! orm.update("users")?
//!     .set(json!({"role": "editor"}))
//!     .with_where(builder::eq("status", json!("draft")))
//!     .execute_async(&ExecuteOptions::new().with_batch_size(100))?;
//! ```

mod cascade;
mod continuation;
mod delete;
mod executor;
mod insert;
mod options;
mod update;

pub use continuation::{
    run_continuation, run_scheduled_delete, ContinuationPayload, MutationOperation,
    ScheduledDeletePayload, WorkType, CONTINUATION_FUNCTION, SCHEDULED_DELETE_FUNCTION,
};
pub use delete::DeleteBuilder;
pub use insert::InsertBuilder;
pub use options::{ExecuteOptions, JobOutcome, MutationPage, MutationResult};
pub use update::UpdateBuilder;
