//! Engine configuration
//!
//! Loaded once with the schema and threaded explicitly through every call.
//! All limits are hard: exceeding one fails the call instead of capping.

use serde::{Deserialize, Serialize};

use super::errors::{SchemaError, SchemaResult};

/// Whether bulk mutations run inline or through scheduled continuations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sync,
    Async,
}

/// Engine-wide limits and defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Unindexed access requires explicit opt-in
    pub strict: bool,
    /// Limit applied to unsized reads
    pub default_limit: Option<usize>,
    pub mutation_max_rows: usize,
    pub mutation_batch_size: usize,
    pub mutation_delay_ms: u64,
    pub mutation_max_bytes_per_batch: Option<usize>,
    pub mutation_execution_mode: ExecutionMode,
    /// Distinct parent keys a relation load may probe
    pub relation_fan_out_max_keys: usize,
    /// Rows a relation load may return without `allowFullScan`
    pub relation_max_rows: usize,
    pub relation_max_depth: usize,
    /// Rows requested from the host per scan call
    pub scan_batch_size: usize,
    /// Rows the host lets one invocation read
    pub platform_row_read_limit: usize,
    pub scheduled_delete_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict: true,
            default_limit: None,
            mutation_max_rows: 1000,
            mutation_batch_size: 100,
            mutation_delay_ms: 0,
            mutation_max_bytes_per_batch: None,
            mutation_execution_mode: ExecutionMode::Sync,
            relation_fan_out_max_keys: 1000,
            relation_max_rows: 10_000,
            relation_max_depth: 8,
            scan_batch_size: 256,
            platform_row_read_limit: 16_384,
            scheduled_delete_delay_ms: 0,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> SchemaResult<Self> {
        let config: EngineConfig = serde_json::from_str(text).map_err(|e| {
            SchemaError::Malformed {
                source_name: "<config>".into(),
                reason: e.to_string(),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects limits that would make every call fail or loop.
    pub fn validate(&self) -> SchemaResult<()> {
        let positive = [
            ("mutationMaxRows", self.mutation_max_rows),
            ("mutationBatchSize", self.mutation_batch_size),
            ("relationFanOutMaxKeys", self.relation_fan_out_max_keys),
            ("relationMaxRows", self.relation_max_rows),
            ("relationMaxDepth", self.relation_max_depth),
            ("scanBatchSize", self.scan_batch_size),
            ("platformRowReadLimit", self.platform_row_read_limit),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(SchemaError::invalid_config(field, "must be positive"));
            }
        }
        if self.default_limit == Some(0) {
            return Err(SchemaError::invalid_config("defaultLimit", "must be positive"));
        }
        if self.mutation_max_bytes_per_batch == Some(0) {
            return Err(SchemaError::invalid_config(
                "mutationMaxBytesPerBatch",
                "must be positive",
            ));
        }
        Ok(())
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = Some(limit);
        self
    }

    pub fn with_mutation_max_rows(mut self, rows: usize) -> Self {
        self.mutation_max_rows = rows;
        self
    }

    pub fn with_mutation_batch_size(mut self, size: usize) -> Self {
        self.mutation_batch_size = size;
        self
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.mutation_execution_mode = mode;
        self
    }

    pub fn with_relation_fan_out_max_keys(mut self, keys: usize) -> Self {
        self.relation_fan_out_max_keys = keys;
        self
    }

    pub fn with_relation_max_rows(mut self, rows: usize) -> Self {
        self.relation_max_rows = rows;
        self
    }

    pub fn with_scan_batch_size(mut self, size: usize) -> Self {
        self.scan_batch_size = size;
        self
    }

    pub fn with_platform_row_read_limit(mut self, rows: usize) -> Self {
        self.platform_row_read_limit = rows;
        self
    }
}
