//! Mutation call options and results

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::ExecutionMode;
use crate::store::Document;

/// Per-call execution overrides. Unset fields fall back to the schema
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOptions {
    pub mode: Option<ExecutionMode>,
    pub batch_size: Option<usize>,
    pub delay_ms: Option<u64>,
    pub max_bytes_per_batch: Option<usize>,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    pub fn with_max_bytes_per_batch(mut self, max_bytes: usize) -> Self {
        self.max_bytes_per_batch = Some(max_bytes);
        self
    }
}

/// Outcome of `execute`.
///
/// For async execution the counts and `returning` rows cover the inline
/// batch only; `continuation` is the job carrying the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult {
    pub num_affected: usize,
    /// Written rows, empty unless `returning()` was requested
    pub returning: Vec<Document>,
    pub continuation: Option<Uuid>,
    pub is_done: bool,
}

impl MutationResult {
    pub(crate) fn done(num_affected: usize, returning: Vec<Document>) -> Self {
        Self {
            num_affected,
            returning,
            continuation: None,
            is_done: true,
        }
    }
}

/// Outcome of one `paginate` call
#[derive(Debug, Clone, PartialEq)]
pub struct MutationPage {
    pub num_affected: usize,
    pub returning: Vec<Document>,
    pub continue_cursor: String,
    pub is_done: bool,
}

/// Outcome of one scheduled job
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub num_affected: usize,
    /// Follow-up job, when rows remain
    pub scheduled: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_options_wire_shape() {
        let options: ExecuteOptions =
            serde_json::from_value(json!({"mode": "async", "batchSize": 2, "delayMs": 10})).unwrap();
        assert_eq!(
            options,
            ExecuteOptions::new()
                .with_mode(ExecutionMode::Async)
                .with_batch_size(2)
                .with_delay_ms(10)
        );
    }
}
