//! Set of table identifiers, stored as a 64-bit mask

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of tables a single query may reference
pub const MAX_TABLES: usize = 64;

/// Set of table identifiers
///
/// Every table reference in a query is assigned one bit. Expressions depend on
/// the union of the bits of the columns they mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TableSet(u64);

impl TableSet {
    pub const fn empty() -> Self {
        TableSet(0)
    }

    /// Set holding only the table at `index`.
    ///
    /// Indices at or beyond `MAX_TABLES` produce the empty set.
    pub fn single(index: usize) -> Self {
        if index >= MAX_TABLES {
            return Self::empty();
        }
        TableSet(1 << index)
    }

    pub fn merge(self, other: TableSet) -> Self {
        TableSet(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn num_tables(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// True if every table in `self` is also in `other`
    pub fn is_solved_by(&self, other: TableSet) -> bool {
        self.0 & !other.0 == 0
    }

    /// True if the two sets share a table
    pub fn overlaps(&self, other: TableSet) -> bool {
        self.0 & other.0 != 0
    }

    /// Index of the single table in this set
    pub fn table_offset(&self) -> Option<usize> {
        (self.num_tables() == 1).then(|| self.0.trailing_zeros() as usize)
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_TABLES).filter(move |i| self.0 & (1 << i) != 0)
    }
}

impl fmt::Display for TableSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.indices().map(|i| i.to_string()).collect();
        write!(f, "TableSet{{{}}}", ids.join(","))
    }
}
