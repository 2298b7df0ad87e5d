use std::fmt;

/// Addresses one element of a sequence (by position) or a map (by key).
///
/// The distinguished [`Index::Empty`] addresses the whole value of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Index {
    #[default]
    Empty,
    Num(usize),
    Key(String),
}

impl Index {
    pub fn is_empty(&self) -> bool {
        matches!(self, Index::Empty)
    }

    pub fn as_num(&self) -> Option<usize> {
        match self {
            Index::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            Index::Key(k) => Some(k.as_str()),
            _ => None,
        }
    }
}

impl From<usize> for Index {
    fn from(n: usize) -> Self {
        Index::Num(n)
    }
}

impl From<&str> for Index {
    fn from(k: &str) -> Self {
        Index::Key(k.to_owned())
    }
}

impl From<String> for Index {
    fn from(k: String) -> Self {
        Index::Key(k)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Index::Empty => write!(f, "(empty)"),
            Index::Num(n) => write!(f, "[{n}]"),
            Index::Key(k) => write!(f, "[{k:?}]"),
        }
    }
}
