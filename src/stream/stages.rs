//! Per-row stages: map, filter and distinct

use serde_json::{Map, Value};

use super::cursor::StreamCursor;
use super::pipeline::{Pipeline, ReadBudget, Step};
use crate::errors::EngineResult;
use crate::index::IndexKey;
use crate::store::{Document, Order};

/// Rows whose fields can be read by name
pub trait HasFields {
    fn field(&self, name: &str) -> Option<&Value>;

    /// Index keys of `fields`, missing fields as null
    fn field_keys(&self, fields: &[String]) -> Vec<IndexKey> {
        fields
            .iter()
            .map(|f| IndexKey::from_field(self.field(f)))
            .collect()
    }
}

impl HasFields for Document {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl HasFields for Map<String, Value> {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl HasFields for Value {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

pub(crate) type MapFn<'a, T, U> = Box<dyn FnMut(T) -> EngineResult<U> + 'a>;
pub(crate) type PredicateFn<'a, T> = Box<dyn FnMut(&T) -> EngineResult<bool> + 'a>;

pub(crate) struct MapNode<'a, T, U> {
    inner: Box<dyn Pipeline<T> + 'a>,
    f: MapFn<'a, T, U>,
}

impl<'a, T, U> MapNode<'a, T, U> {
    pub(crate) fn new(inner: Box<dyn Pipeline<T> + 'a>, f: MapFn<'a, T, U>) -> Self {
        Self { inner, f }
    }
}

impl<'a, T, U> Pipeline<U> for MapNode<'a, T, U> {
    fn step(&mut self, budget: &mut ReadBudget) -> EngineResult<Step<U>> {
        Ok(match self.inner.step(budget)? {
            Step::Yield(item, cursor) => Step::Yield((self.f)(item)?, cursor),
            Step::Skip(cursor) => Step::Skip(cursor),
            Step::Blocked => Step::Blocked,
            Step::Done => Step::Done,
        })
    }

    fn position(&self) -> StreamCursor {
        self.inner.position()
    }

    fn resume(&mut self, cursor: &StreamCursor) -> EngineResult<()> {
        self.inner.resume(cursor)
    }

    fn pin_end(&mut self, cursor: &StreamCursor) -> EngineResult<()> {
        self.inner.pin_end(cursor)
    }

    fn order(&self) -> Order {
        self.inner.order()
    }

    fn set_order(&mut self, order: Order) {
        self.inner.set_order(order)
    }

    fn index_fields(&self) -> Vec<String> {
        self.inner.index_fields()
    }
}

pub(crate) struct FilterNode<'a, T> {
    inner: Box<dyn Pipeline<T> + 'a>,
    predicate: PredicateFn<'a, T>,
}

impl<'a, T> FilterNode<'a, T> {
    pub(crate) fn new(inner: Box<dyn Pipeline<T> + 'a>, predicate: PredicateFn<'a, T>) -> Self {
        Self { inner, predicate }
    }
}

impl<'a, T> Pipeline<T> for FilterNode<'a, T> {
    fn step(&mut self, budget: &mut ReadBudget) -> EngineResult<Step<T>> {
        Ok(match self.inner.step(budget)? {
            Step::Yield(item, cursor) => {
                if (self.predicate)(&item)? {
                    Step::Yield(item, cursor)
                } else {
                    Step::Skip(cursor)
                }
            }
            other => other,
        })
    }

    fn position(&self) -> StreamCursor {
        self.inner.position()
    }

    fn resume(&mut self, cursor: &StreamCursor) -> EngineResult<()> {
        self.inner.resume(cursor)
    }

    fn pin_end(&mut self, cursor: &StreamCursor) -> EngineResult<()> {
        self.inner.pin_end(cursor)
    }

    fn order(&self) -> Order {
        self.inner.order()
    }

    fn set_order(&mut self, order: Order) {
        self.inner.set_order(order)
    }

    fn index_fields(&self) -> Vec<String> {
        self.inner.index_fields()
    }
}

/// Drops rows whose `fields` equal the previous emitted row's.
///
/// Only consecutive duplicates are removed, so the input must already be
/// ordered by a prefix covering `fields`.
pub(crate) struct DistinctNode<'a, T> {
    inner: Box<dyn Pipeline<T> + 'a>,
    fields: Vec<String>,
    last: Option<Vec<IndexKey>>,
}

impl<'a, T> DistinctNode<'a, T> {
    pub(crate) fn new(inner: Box<dyn Pipeline<T> + 'a>, fields: Vec<String>) -> Self {
        Self {
            inner,
            fields,
            last: None,
        }
    }

    fn wrap(&self, inner: StreamCursor) -> StreamCursor {
        StreamCursor::Distinct {
            inner: Box::new(inner),
            last: self.last.clone(),
        }
    }
}

impl<'a, T: HasFields> Pipeline<T> for DistinctNode<'a, T> {
    fn step(&mut self, budget: &mut ReadBudget) -> EngineResult<Step<T>> {
        Ok(match self.inner.step(budget)? {
            Step::Yield(item, cursor) => {
                let key = item.field_keys(&self.fields);
                if self.last.as_ref() == Some(&key) {
                    Step::Skip(self.wrap(cursor))
                } else {
                    self.last = Some(key);
                    Step::Yield(item, self.wrap(cursor))
                }
            }
            Step::Skip(cursor) => Step::Skip(self.wrap(cursor)),
            Step::Blocked => Step::Blocked,
            Step::Done => Step::Done,
        })
    }

    fn position(&self) -> StreamCursor {
        self.wrap(self.inner.position())
    }

    fn resume(&mut self, cursor: &StreamCursor) -> EngineResult<()> {
        let StreamCursor::Distinct { inner, last } = cursor else {
            return Err(cursor.mismatch("distinct").into());
        };
        self.inner.resume(inner)?;
        self.last = last.clone();
        Ok(())
    }

    fn pin_end(&mut self, cursor: &StreamCursor) -> EngineResult<()> {
        let StreamCursor::Distinct { inner, .. } = cursor else {
            return Err(cursor.mismatch("distinct").into());
        };
        self.inner.pin_end(inner)
    }

    fn order(&self) -> Order {
        self.inner.order()
    }

    fn set_order(&mut self, order: Order) {
        self.inner.set_order(order)
    }

    fn index_fields(&self) -> Vec<String> {
        self.inner.index_fields()
    }
}
