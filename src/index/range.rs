//! Index ranges
//!
//! A range is an equality prefix over the leading index fields, optionally
//! followed by a lower and/or upper bound on the next field. This is the
//! only shape an index-only host can answer without scanning.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{IndexError, IndexResult};
use super::key::IndexKey;
use super::position::IndexPosition;

/// One side of a range on the first unbound field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeBound {
    pub key: IndexKey,
    pub inclusive: bool,
}

impl RangeBound {
    pub fn inclusive(key: IndexKey) -> Self {
        Self {
            key,
            inclusive: true,
        }
    }

    pub fn exclusive(key: IndexKey) -> Self {
        Self {
            key,
            inclusive: false,
        }
    }
}

/// Contiguous range of an index
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexRange {
    /// Equality values for the leading fields, in index order
    pub eq: Vec<IndexKey>,
    /// Lower bound on field `eq.len()`
    pub lower: Option<RangeBound>,
    /// Upper bound on field `eq.len()`
    pub upper: Option<RangeBound>,
}

impl IndexRange {
    /// The whole index
    pub fn full() -> Self {
        Self::default()
    }

    /// Compares entry keys against the range.
    ///
    /// Returns `Less` when the keys sort before the range, `Greater` when they
    /// sort after it and `Equal` when they are inside it.
    pub fn compare(&self, keys: &[IndexKey]) -> Ordering {
        for (i, expected) in self.eq.iter().enumerate() {
            let actual = keys.get(i).unwrap_or(&IndexKey::Null);
            match actual.cmp(expected) {
                Ordering::Equal => {}
                other => return other,
            }
        }

        let next = keys.get(self.eq.len()).unwrap_or(&IndexKey::Null);
        if let Some(lower) = &self.lower {
            match next.cmp(&lower.key) {
                Ordering::Less => return Ordering::Less,
                Ordering::Equal if !lower.inclusive => return Ordering::Less,
                _ => {}
            }
        }
        if let Some(upper) = &self.upper {
            match next.cmp(&upper.key) {
                Ordering::Greater => return Ordering::Greater,
                Ordering::Equal if !upper.inclusive => return Ordering::Greater,
                _ => {}
            }
        }
        Ordering::Equal
    }

    pub fn contains(&self, keys: &[IndexKey]) -> bool {
        self.compare(keys) == Ordering::Equal
    }

    /// Lowest position an ascending scan can start from.
    pub fn lower_seek(&self) -> IndexPosition {
        let mut prefix = self.eq.clone();
        if let Some(lower) = &self.lower {
            prefix.push(lower.key.clone());
        }
        IndexPosition::seek(prefix)
    }

    /// True when the bounds cannot contain any key
    pub fn is_empty_interval(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some(lower), Some(upper)) => match lower.key.cmp(&upper.key) {
                Ordering::Greater => true,
                Ordering::Equal => !(lower.inclusive && upper.inclusive),
                Ordering::Less => false,
            },
            _ => false,
        }
    }

    /// Number of index fields constrained by this range
    pub fn bound_fields(&self) -> usize {
        self.eq.len() + usize::from(self.lower.is_some() || self.upper.is_some())
    }
}

/// Validating builder for index ranges.
///
/// Equality must bind index fields strictly in order; a range may only be
/// placed on the field right after the equality prefix.
#[derive(Debug)]
pub struct IndexRangeBuilder<'f> {
    fields: &'f [String],
    range: IndexRange,
    range_started: bool,
}

impl<'f> IndexRangeBuilder<'f> {
    pub fn new(fields: &'f [String]) -> Self {
        Self {
            fields,
            range: IndexRange::default(),
            range_started: false,
        }
    }

    pub fn eq(self, field: &str, value: &Value) -> IndexResult<Self> {
        self.eq_key(field, IndexKey::from_json(value))
    }

    /// Equality from an already-encoded key
    pub fn eq_key(mut self, field: &str, key: IndexKey) -> IndexResult<Self> {
        if self.range_started {
            return Err(IndexError::EqualityAfterRange {
                field: field.to_string(),
            });
        }
        let position = self.position_of(field)?;
        let expected = self.range.eq.len();
        if position != expected {
            return Err(self.sequence_error(field, position, expected));
        }
        self.range.eq.push(key);
        Ok(self)
    }

    pub fn gt(self, field: &str, value: &Value) -> IndexResult<Self> {
        self.lower(field, RangeBound::exclusive(IndexKey::from_json(value)))
    }

    pub fn gte(self, field: &str, value: &Value) -> IndexResult<Self> {
        self.lower(field, RangeBound::inclusive(IndexKey::from_json(value)))
    }

    pub fn lt(self, field: &str, value: &Value) -> IndexResult<Self> {
        self.upper(field, RangeBound::exclusive(IndexKey::from_json(value)))
    }

    pub fn lte(self, field: &str, value: &Value) -> IndexResult<Self> {
        self.upper(field, RangeBound::inclusive(IndexKey::from_json(value)))
    }

    /// Lower bound from an already-encoded key
    pub fn lower(mut self, field: &str, bound: RangeBound) -> IndexResult<Self> {
        self.check_range_field(field)?;
        if self.range.lower.is_some() {
            return Err(IndexError::DuplicateBound {
                field: field.to_string(),
                bound: "lower",
            });
        }
        self.range.lower = Some(bound);
        self.range_started = true;
        Ok(self)
    }

    /// Upper bound from an already-encoded key
    pub fn upper(mut self, field: &str, bound: RangeBound) -> IndexResult<Self> {
        self.check_range_field(field)?;
        if self.range.upper.is_some() {
            return Err(IndexError::DuplicateBound {
                field: field.to_string(),
                bound: "upper",
            });
        }
        self.range.upper = Some(bound);
        self.range_started = true;
        Ok(self)
    }

    pub fn build(self) -> IndexRange {
        self.range
    }

    fn check_range_field(&self, field: &str) -> IndexResult<()> {
        let position = self.position_of(field)?;
        let expected = self.range.eq.len();
        if position != expected {
            return Err(self.sequence_error(field, position, expected));
        }
        Ok(())
    }

    fn position_of(&self, field: &str) -> IndexResult<usize> {
        self.fields
            .iter()
            .position(|f| f == field)
            .ok_or_else(|| IndexError::UnknownField {
                field: field.to_string(),
                fields: self.fields.to_vec(),
            })
    }

    fn sequence_error(&self, field: &str, position: usize, expected: usize) -> IndexError {
        if position > expected {
            IndexError::NonLeadingRange {
                field: field.to_string(),
                missing: self.fields[expected..position].to_vec(),
            }
        } else {
            IndexError::OutOfSequence {
                field: field.to_string(),
            }
        }
    }
}
