//! Range query options.
//!
//! A query names a key range, a direction, and paging. `start` is where the
//! scan begins and `end` where it stops, so a descending scan has
//! `start >= end`:
//!
//! ```ignore
//! // Newest notes at or before `since`, newest first.
//! let opts = QueryOptions::range(since, IndexKey::Min).descending().limit(50);
//! ```

use crate::error::{Result, StoreError};
use crate::views::IndexKey;

/// Row cap applied when a caller does not pick one.
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// Scan order over the key range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// Parameters of a range scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryOptions {
    /// First key of the scan (inclusive).
    pub start: IndexKey,
    /// Last key of the scan (inclusive).
    pub end: IndexKey,
    pub direction: Direction,
    /// `None` only when the caller opted out of the cap with `unlimited()`.
    pub limit: Option<usize>,
    /// Rows to skip before collecting.
    pub skip: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            start: IndexKey::Min,
            end: IndexKey::Max,
            direction: Direction::Ascending,
            limit: Some(DEFAULT_QUERY_LIMIT),
            skip: 0,
        }
    }
}

impl QueryOptions {
    /// Scan from `start` to `end`, both inclusive.
    pub fn range(start: impl Into<IndexKey>, end: impl Into<IndexKey>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            ..Default::default()
        }
    }

    /// Match exactly one key.
    pub fn key(key: impl Into<IndexKey>) -> Self {
        let key = key.into();
        Self::range(key.clone(), key)
    }

    pub fn descending(mut self) -> Self {
        self.direction = Direction::Descending;
        self
    }

    pub fn ascending(mut self) -> Self {
        self.direction = Direction::Ascending;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Remove the row cap.
    pub fn unlimited(mut self) -> Self {
        self.limit = None;
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// The range as `(lowest, highest)` key after checking that the bounds
    /// agree with the direction.
    pub fn key_bounds(&self) -> Result<(&IndexKey, &IndexKey)> {
        if self.limit == Some(0) {
            return Err(StoreError::InvalidQuery(
                "limit must be positive; use unlimited() for no cap".into(),
            ));
        }
        match self.direction {
            Direction::Ascending if self.start > self.end => Err(StoreError::InvalidQuery(
                format!(
                    "ascending scan starts after it ends: {} > {}",
                    self.start, self.end
                ),
            )),
            Direction::Descending if self.start < self.end => Err(StoreError::InvalidQuery(
                format!(
                    "descending scan starts before it ends: {} < {}",
                    self.start, self.end
                ),
            )),
            Direction::Ascending => Ok((&self.start, &self.end)),
            Direction::Descending => Ok((&self.end, &self.start)),
        }
    }

    /// Effective row cap.
    pub fn take(&self) -> usize {
        self.limit.unwrap_or(usize::MAX)
    }
}
