//! K-way merge of ordered document streams
//!
//! Each branch keeps at most one pending head. The branch cursor stays at
//! the position before its head until the head is emitted, so a resumed
//! merge re-reads pending heads instead of losing them.

use std::cmp::Ordering;

use super::cursor::StreamCursor;
use super::errors::CursorError;
use super::pipeline::{Pipeline, ReadBudget, Step};
use super::stages::HasFields;
use crate::errors::EngineResult;
use crate::index::IndexKey;
use crate::store::{Document, Order};

/// How heads of different branches are compared
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MergeKey {
    /// Full index position over the shared index fields
    Position(Vec<String>),
    /// The given fields, then document id
    Fields(Vec<String>),
}

struct Branch<'a> {
    node: Box<dyn Pipeline<Document> + 'a>,
    head: Option<(Document, StreamCursor)>,
    committed: StreamCursor,
    done: bool,
}

pub(crate) struct MergeNode<'a> {
    branches: Vec<Branch<'a>>,
    key: MergeKey,
}

impl<'a> MergeNode<'a> {
    pub(crate) fn new(nodes: Vec<Box<dyn Pipeline<Document> + 'a>>, key: MergeKey) -> Self {
        let branches = nodes
            .into_iter()
            .map(|node| Branch {
                committed: node.position(),
                node,
                head: None,
                done: false,
            })
            .collect();
        Self { branches, key }
    }

    fn sort_key(&self, doc: &Document) -> (Vec<IndexKey>, String) {
        let fields = match &self.key {
            MergeKey::Position(fields) | MergeKey::Fields(fields) => fields,
        };
        (doc.field_keys(fields), doc.id().to_string())
    }

    /// Fills every live branch's head. Returns false when blocked.
    fn fill_heads(&mut self, budget: &mut ReadBudget) -> EngineResult<bool> {
        for branch in &mut self.branches {
            while branch.head.is_none() && !branch.done {
                match branch.node.step(budget)? {
                    Step::Yield(doc, cursor) => branch.head = Some((doc, cursor)),
                    Step::Skip(cursor) => branch.committed = cursor,
                    Step::Blocked => return Ok(false),
                    Step::Done => {
                        branch.done = true;
                        branch.committed = branch.node.position();
                    }
                }
            }
        }
        Ok(true)
    }

    fn branch_order(&self) -> Order {
        self.branches
            .first()
            .map_or(Order::Asc, |b| b.node.order())
    }
}

impl<'a> Pipeline<Document> for MergeNode<'a> {
    fn step(&mut self, budget: &mut ReadBudget) -> EngineResult<Step<Document>> {
        if !self.fill_heads(budget)? {
            return Ok(Step::Blocked);
        }

        let order = self.branch_order();
        let mut best: Option<(usize, (Vec<IndexKey>, String))> = None;
        for (i, branch) in self.branches.iter().enumerate() {
            let Some((doc, _)) = &branch.head else {
                continue;
            };
            let key = self.sort_key(doc);
            let better = match &best {
                None => true,
                Some((_, current)) => {
                    let ord = key.cmp(current);
                    match order {
                        Order::Asc => ord == Ordering::Less,
                        Order::Desc => ord == Ordering::Greater,
                    }
                }
            };
            if better {
                best = Some((i, key));
            }
        }

        let Some((winner, key)) = best else {
            return Ok(Step::Done);
        };

        // the same row reached through two branches is emitted once
        for i in 0..self.branches.len() {
            if i == winner {
                continue;
            }
            let duplicate = self.branches[i]
                .head
                .as_ref()
                .is_some_and(|(doc, _)| self.sort_key(doc) == key);
            if duplicate {
                if let Some((_, cursor)) = self.branches[i].head.take() {
                    self.branches[i].committed = cursor;
                }
            }
        }

        let branch = &mut self.branches[winner];
        let Some((doc, cursor)) = branch.head.take() else {
            return Ok(Step::Done);
        };
        branch.committed = cursor;
        Ok(Step::Yield(doc, self.position()))
    }

    fn position(&self) -> StreamCursor {
        StreamCursor::Merge {
            branches: self.branches.iter().map(|b| b.committed.clone()).collect(),
        }
    }

    fn resume(&mut self, cursor: &StreamCursor) -> EngineResult<()> {
        let StreamCursor::Merge { branches } = cursor else {
            return Err(cursor.mismatch("merge").into());
        };
        if branches.len() != self.branches.len() {
            return Err(CursorError::ShapeMismatch {
                expected: "merge of matching width",
                found: "merge",
            }
            .into());
        }
        for (branch, cursor) in self.branches.iter_mut().zip(branches) {
            branch.node.resume(cursor)?;
            branch.committed = cursor.clone();
            branch.head = None;
            branch.done = false;
        }
        Ok(())
    }

    fn pin_end(&mut self, cursor: &StreamCursor) -> EngineResult<()> {
        let StreamCursor::Merge { branches } = cursor else {
            return Err(cursor.mismatch("merge").into());
        };
        if branches.len() != self.branches.len() {
            return Err(CursorError::ShapeMismatch {
                expected: "merge of matching width",
                found: "merge",
            }
            .into());
        }
        for (branch, cursor) in self.branches.iter_mut().zip(branches) {
            branch.node.pin_end(cursor)?;
        }
        Ok(())
    }

    fn order(&self) -> Order {
        self.branch_order()
    }

    fn set_order(&mut self, order: Order) {
        for branch in &mut self.branches {
            branch.node.set_order(order);
        }
    }

    fn index_fields(&self) -> Vec<String> {
        self.branches
            .first()
            .map(|b| b.node.index_fields())
            .unwrap_or_default()
    }
}
