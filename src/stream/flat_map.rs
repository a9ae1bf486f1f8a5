//! Nested streams: one inner stream per outer row
//!
//! Memory stays O(1) per outer row: only the current outer row and its
//! inner stream are held. The cursor records the outer position before the
//! current row plus the inner position, so resuming re-reads the outer row
//! and continues its inner stream where it stopped.

use super::cursor::StreamCursor;
use super::errors::StreamError;
use super::pipeline::{Pipeline, ReadBudget, Step};
use crate::errors::EngineResult;
use crate::store::Order;

/// A flat-mapped row
#[derive(Debug, Clone, PartialEq)]
pub enum FlatRow<T, U> {
    Child(U),
    WithParent { parent: T, child: U },
}

impl<T, U> FlatRow<T, U> {
    pub fn child(&self) -> &U {
        match self {
            FlatRow::Child(child) | FlatRow::WithParent { child, .. } => child,
        }
    }

    pub fn parent(&self) -> Option<&T> {
        match self {
            FlatRow::Child(_) => None,
            FlatRow::WithParent { parent, .. } => Some(parent),
        }
    }

    pub fn into_child(self) -> U {
        match self {
            FlatRow::Child(child) | FlatRow::WithParent { child, .. } => child,
        }
    }
}

/// Options for `Stream::flat_map`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatMapOptions {
    /// Index fields every inner stream must scan; empty means the outer
    /// stream's fields
    pub inner_index_fields: Vec<String>,
    /// Emit `{parent, child}` instead of bare children
    pub include_parent: bool,
}

impl FlatMapOptions {
    pub fn new<I, S>(inner_index_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner_index_fields: inner_index_fields.into_iter().map(Into::into).collect(),
            include_parent: false,
        }
    }

    pub fn with_parent(mut self) -> Self {
        self.include_parent = true;
        self
    }
}

pub(crate) type InnerFactory<'a, T, U> =
    Box<dyn FnMut(&T) -> EngineResult<Box<dyn Pipeline<U> + 'a>> + 'a>;

struct Current<'a, T, U> {
    parent: T,
    before: StreamCursor,
    inner: Box<dyn Pipeline<U> + 'a>,
}

pub(crate) struct FlatMapNode<'a, T, U> {
    outer: Box<dyn Pipeline<T> + 'a>,
    factory: InnerFactory<'a, T, U>,
    options: FlatMapOptions,
    current: Option<Current<'a, T, U>>,
    pending_inner: Option<StreamCursor>,
}

impl<'a, T, U> FlatMapNode<'a, T, U> {
    pub(crate) fn new(
        outer: Box<dyn Pipeline<T> + 'a>,
        factory: InnerFactory<'a, T, U>,
        options: FlatMapOptions,
    ) -> Self {
        Self {
            outer,
            factory,
            options,
            current: None,
            pending_inner: None,
        }
    }

    fn inner_fields(&self) -> Vec<String> {
        if self.options.inner_index_fields.is_empty() {
            self.outer.index_fields()
        } else {
            self.options.inner_index_fields.clone()
        }
    }

    fn check_inner(&self, inner: &dyn Pipeline<U>) -> EngineResult<()> {
        let expected = self.inner_fields();
        let found = inner.index_fields();
        if found != expected {
            return Err(StreamError::IndexFieldMismatch { expected, found }.into());
        }
        if inner.order() != self.outer.order() {
            return Err(StreamError::OrderMismatch {
                expected: self.outer.order().as_str(),
                found: inner.order().as_str(),
            }
            .into());
        }
        Ok(())
    }
}

impl<'a, T: Clone, U> Pipeline<FlatRow<T, U>> for FlatMapNode<'a, T, U> {
    fn step(&mut self, budget: &mut ReadBudget) -> EngineResult<Step<FlatRow<T, U>>> {
        loop {
            if let Some(current) = &mut self.current {
                match current.inner.step(budget)? {
                    Step::Yield(child, inner_cursor) => {
                        let cursor = StreamCursor::Nested {
                            outer: Box::new(current.before.clone()),
                            inner: Some(Box::new(inner_cursor)),
                        };
                        let row = if self.options.include_parent {
                            FlatRow::WithParent {
                                parent: current.parent.clone(),
                                child,
                            }
                        } else {
                            FlatRow::Child(child)
                        };
                        return Ok(Step::Yield(row, cursor));
                    }
                    Step::Skip(_) => return Ok(Step::Skip(self.position())),
                    Step::Blocked => return Ok(Step::Blocked),
                    Step::Done => {
                        self.current = None;
                        continue;
                    }
                }
            }

            let before = self.outer.position();
            match self.outer.step(budget)? {
                Step::Yield(parent, _) => {
                    let mut inner = (self.factory)(&parent)?;
                    self.check_inner(inner.as_ref())?;
                    if let Some(cursor) = self.pending_inner.take() {
                        inner.resume(&cursor)?;
                    }
                    self.current = Some(Current {
                        parent,
                        before,
                        inner,
                    });
                }
                Step::Skip(_) => return Ok(Step::Skip(self.position())),
                Step::Blocked => return Ok(Step::Blocked),
                Step::Done => return Ok(Step::Done),
            }
        }
    }

    fn position(&self) -> StreamCursor {
        match &self.current {
            Some(current) => StreamCursor::Nested {
                outer: Box::new(current.before.clone()),
                inner: Some(Box::new(current.inner.position())),
            },
            None => StreamCursor::Nested {
                outer: Box::new(self.outer.position()),
                inner: self.pending_inner.clone().map(Box::new),
            },
        }
    }

    fn resume(&mut self, cursor: &StreamCursor) -> EngineResult<()> {
        let StreamCursor::Nested { outer, inner } = cursor else {
            return Err(cursor.mismatch("nested").into());
        };
        self.outer.resume(outer)?;
        self.current = None;
        self.pending_inner = inner.as_deref().cloned();
        Ok(())
    }

    fn pin_end(&mut self, _cursor: &StreamCursor) -> EngineResult<()> {
        Err(StreamError::EndCursorUnsupported.into())
    }

    fn order(&self) -> Order {
        self.outer.order()
    }

    fn set_order(&mut self, order: Order) {
        self.outer.set_order(order)
    }

    fn index_fields(&self) -> Vec<String> {
        let mut fields = self.outer.index_fields();
        fields.extend(self.inner_fields());
        fields
    }
}
