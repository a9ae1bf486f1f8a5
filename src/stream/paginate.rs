//! Cursor pagination over a pipeline
//!
//! A page stops for exactly one of four reasons:
//!
//! 1. `num_items` rows produced: continue from the last produced row
//! 2. the pipeline finished: `is_done`
//! 3. `max_scan` rows read: continue from the raw read position
//! 4. the platform read ceiling: `SplitRequired`, with the logical cursor
//!    as `continue_cursor` and the raw position as `split_cursor`

use serde::{Deserialize, Serialize};

use super::cursor::StreamCursor;
use super::pipeline::{Pipeline, ReadBudget, Step};
use crate::errors::EngineResult;

/// Pagination request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationOptions {
    /// Cursor from a previous page, `None` for the first page
    pub cursor: Option<String>,
    pub num_items: usize,
    /// Rows the page may read before transforms
    pub max_scan: Option<usize>,
    /// Stop at a previous page's `continue_cursor`
    pub end_cursor: Option<String>,
}

impl PaginationOptions {
    pub fn new(num_items: usize) -> Self {
        Self {
            num_items,
            ..Default::default()
        }
    }

    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_max_scan(mut self, max_scan: usize) -> Self {
        self.max_scan = Some(max_scan);
        self
    }

    pub fn with_end_cursor(mut self, end_cursor: impl Into<String>) -> Self {
        self.end_cursor = Some(end_cursor.into());
        self
    }
}

/// Why a page stopped short of the data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageStatus {
    SplitRecommended,
    SplitRequired,
}

/// One page of results
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub page: Vec<T>,
    pub continue_cursor: String,
    pub is_done: bool,
    pub page_status: Option<PageStatus>,
    pub split_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            page: self.page.into_iter().map(f).collect(),
            continue_cursor: self.continue_cursor,
            is_done: self.is_done,
            page_status: self.page_status,
            split_cursor: self.split_cursor,
        }
    }
}

/// Stops a page once the summed weight of its rows reaches `max`
pub(crate) struct WeightCap<'w, T> {
    pub(crate) max: usize,
    pub(crate) weigh: &'w dyn Fn(&T) -> usize,
}

pub(crate) fn run_page<T, P: Pipeline<T> + ?Sized>(
    node: &mut P,
    options: &PaginationOptions,
    platform_limit: usize,
    weight_cap: Option<WeightCap<'_, T>>,
) -> EngineResult<Page<T>> {
    let start = match &options.cursor {
        Some(text) => {
            let cursor = StreamCursor::decode(text)?;
            node.resume(&cursor)?;
            cursor
        }
        None => node.position(),
    };
    if let Some(text) = &options.end_cursor {
        node.pin_end(&StreamCursor::decode(text)?)?;
    }

    let scan_limit = options
        .max_scan
        .map_or(platform_limit, |max| max.min(platform_limit));
    let mut budget = ReadBudget::new(scan_limit);
    let mut page = Vec::new();
    let mut logical = start;
    let mut weight = 0usize;

    loop {
        let weight_full = weight_cap.as_ref().is_some_and(|cap| weight >= cap.max);
        if page.len() >= options.num_items || weight_full {
            // more than half the ceiling spent on one page
            let status = (budget.consumed() * 2 > platform_limit).then_some(PageStatus::SplitRecommended);
            return Ok(Page {
                page,
                continue_cursor: logical.encode(),
                is_done: false,
                page_status: status,
                split_cursor: None,
            });
        }

        match node.step(&mut budget)? {
            Step::Yield(item, cursor) => {
                if let Some(cap) = &weight_cap {
                    weight += (cap.weigh)(&item);
                }
                logical = cursor;
                page.push(item);
            }
            Step::Skip(_) => {}
            Step::Done => {
                return Ok(Page {
                    page,
                    continue_cursor: node.position().encode(),
                    is_done: true,
                    page_status: None,
                    split_cursor: None,
                });
            }
            Step::Blocked => {
                let raw = node.position();
                let by_max_scan = options.max_scan.is_some_and(|max| max <= platform_limit);
                if by_max_scan {
                    return Ok(Page {
                        page,
                        continue_cursor: raw.encode(),
                        is_done: false,
                        page_status: None,
                        split_cursor: None,
                    });
                }
                return Ok(Page {
                    page,
                    continue_cursor: logical.encode(),
                    is_done: false,
                    page_status: Some(PageStatus::SplitRequired),
                    split_cursor: Some(raw.encode()),
                });
            }
        }
    }
}
