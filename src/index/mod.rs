//! Index keys, positions and ranges
//!
//! # Design Principles
//!
//! - Total order: every JSON value maps to exactly one key
//! - Unique positions: (keys, id) identifies one index entry
//! - Ranges are equality prefixes plus one bounded field

mod errors;
mod key;
mod position;
mod range;

pub use errors::{IndexError, IndexResult};
pub use key::IndexKey;
pub use position::IndexPosition;
pub use range::{IndexRange, IndexRangeBuilder, RangeBound};
