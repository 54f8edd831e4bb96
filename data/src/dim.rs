use crate::TVec;
use itertools::Itertools;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// One tensor dimension.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dim {
    Val(u64),
    /// A named dimension (`batch`, `N`, `seq_len`...).
    Sym(Arc<str>),
    Unknown,
}

impl Dim {
    /// Frameworks use negative sizes (usually -1) for dimensions unknown at export time.
    pub fn from_signed(v: i64) -> Dim {
        if v < 0 { Dim::Unknown } else { Dim::Val(v as u64) }
    }

    pub fn sym(name: impl AsRef<str>) -> Dim {
        Dim::Sym(Arc::from(name.as_ref()))
    }

    /// Parses a textual dimension: digits, `?`/`-1`/empty for unknown, anything else is a symbol.
    pub fn parse(s: &str) -> Dim {
        let s = s.trim();
        if s.is_empty() || s == "?" {
            Dim::Unknown
        } else if let Ok(v) = s.parse::<i64>() {
            Dim::from_signed(v)
        } else {
            Dim::sym(s)
        }
    }

    pub fn to_u64(&self) -> Option<u64> {
        match self {
            Dim::Val(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Dim::Val(_))
    }
}

impl From<u64> for Dim {
    fn from(v: u64) -> Dim {
        Dim::Val(v)
    }
}

impl From<usize> for Dim {
    fn from(v: usize) -> Dim {
        Dim::Val(v as u64)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Dim::Val(v) => write!(f, "{v}"),
            Dim::Sym(s) => write!(f, "{s}"),
            Dim::Unknown => write!(f, "?"),
        }
    }
}

impl Serialize for Dim {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Dim::Val(v) => serializer.serialize_u64(*v),
            Dim::Sym(s) => serializer.serialize_str(s),
            Dim::Unknown => serializer.serialize_none(),
        }
    }
}

/// Ordered dimensions of a tensor. An empty shape is a scalar.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Shape(pub TVec<Dim>);

impl Shape {
    pub fn scalar() -> Shape {
        Shape(TVec::new())
    }

    pub fn from_signed(dims: impl IntoIterator<Item = i64>) -> Shape {
        dims.into_iter().map(Dim::from_signed).collect()
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[Dim] {
        &self.0
    }

    /// Number of elements, when every dimension is known.
    pub fn volume(&self) -> Option<u64> {
        self.0.iter().try_fold(1u64, |acc, d| acc.checked_mul(d.to_u64()?))
    }

    pub fn is_concrete(&self) -> bool {
        self.0.iter().all(Dim::is_known)
    }
}

impl std::ops::Deref for Shape {
    type Target = [Dim];
    fn deref(&self) -> &[Dim] {
        &self.0
    }
}

impl<D: Into<Dim>> FromIterator<D> for Shape {
    fn from_iter<T: IntoIterator<Item = D>>(iter: T) -> Self {
        Shape(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Dim> for Shape {
    fn from(d: Dim) -> Shape {
        Shape(tvec!(d))
    }
}

impl Serialize for Shape {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]", self.0.iter().join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dims() {
        assert_eq!(Dim::parse("3"), Dim::Val(3));
        assert_eq!(Dim::parse("-1"), Dim::Unknown);
        assert_eq!(Dim::parse("?"), Dim::Unknown);
        assert_eq!(Dim::parse(" batch "), Dim::sym("batch"));
    }

    #[test]
    fn display() {
        let shape = Shape(tvec!(Dim::sym("N"), 3u64.into(), Dim::Unknown));
        assert_eq!(shape.to_string(), "[N,3,?]");
        assert_eq!(Shape::scalar().to_string(), "[]");
    }

    #[test]
    fn volume() {
        assert_eq!(Shape::from_signed([1, 3, 224, 224]).volume(), Some(150528));
        assert_eq!(Shape::from_signed([-1, 3]).volume(), None);
        assert_eq!(Shape::scalar().volume(), Some(1));
        assert!(!Shape::from_signed([-1, 3]).is_concrete());
    }
}
