//! Index keys and their collation.

use std::fmt;

/// A key emitted into a view index.
///
/// Keys are totally ordered. Across variants the order is
/// `Min < Int < Str < Tuple < Max`; within a variant integers compare
/// numerically, strings lexicographically, and tuples element by element
/// with a shorter prefix sorting first (`("a",)` < `("a", 0)`).
///
/// `Min` and `Max` are never emitted by views. They are open bounds for
/// range scans: `("alice", Max)` sorts after every concrete `("alice", t)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Min,
    Int(u64),
    Str(String),
    Tuple(Vec<IndexKey>),
    Max,
}

impl IndexKey {
    /// Build a tuple key from its components.
    pub fn tuple<I, K>(parts: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<IndexKey>,
    {
        IndexKey::Tuple(parts.into_iter().map(Into::into).collect())
    }

    /// `(a, b)` shorthand.
    pub fn pair(a: impl Into<IndexKey>, b: impl Into<IndexKey>) -> Self {
        IndexKey::Tuple(vec![a.into(), b.into()])
    }
}

impl From<u64> for IndexKey {
    fn from(v: u64) -> Self {
        IndexKey::Int(v)
    }
}

impl From<&str> for IndexKey {
    fn from(v: &str) -> Self {
        IndexKey::Str(v.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(v: String) -> Self {
        IndexKey::Str(v)
    }
}

impl From<&String> for IndexKey {
    fn from(v: &String) -> Self {
        IndexKey::Str(v.clone())
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Min => write!(f, "<min>"),
            IndexKey::Max => write!(f, "<max>"),
            IndexKey::Int(v) => write!(f, "{v}"),
            IndexKey::Str(s) => write!(f, "{s:?}"),
            IndexKey::Tuple(parts) => {
                write!(f, "(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{part}")?;
                }
                if parts.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
        }
    }
}
