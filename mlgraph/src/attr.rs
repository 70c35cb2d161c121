use std::fmt::{Display, Formatter};

use decorum::Total;
use indexmap::IndexMap;
use itertools::Itertools;

use crate::ops::OpKind;

/// A single typed attribute value.
///
/// Floats are wrapped in [Total] so attribute maps stay `Eq`-comparable
/// even in the presence of NaN.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(Total<f32>),
    Str(String),
    Ints(Vec<i64>),
    Strs(Vec<String>),
    Op(OpKind),
    Ops(Vec<OpKind>),
}

/// An insertion-ordered attribute map.
///
/// Nodes carry two of these: the user-facing operator parameters and a
/// separate side-table for pass-internal annotations, so passes never
/// have to hide their bookkeeping behind reserved key prefixes.
pub type Attributes = IndexMap<String, AttrValue>;

impl AttrValue {
    pub fn float(x: f32) -> AttrValue {
        AttrValue::Float(Total::from(x))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            &AttrValue::Bool(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            &AttrValue::Int(x) => Some(x),
            _ => None,
        }
    }

    /// The value as a non-negative integer, eg. a dimension size or count.
    pub fn as_usize(&self) -> Option<usize> {
        self.as_int().and_then(|x| usize::try_from(x).ok())
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            &AttrValue::Float(x) => Some(x.into_inner()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            AttrValue::Ints(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_strs(&self) -> Option<&[String]> {
        match self {
            AttrValue::Strs(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_op(&self) -> Option<OpKind> {
        match self {
            &AttrValue::Op(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_ops(&self) -> Option<&[OpKind]> {
        match self {
            AttrValue::Ops(x) => Some(x),
            _ => None,
        }
    }
}

impl Display for AttrValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Bool(x) => write!(f, "{}", x),
            AttrValue::Int(x) => write!(f, "{}", x),
            AttrValue::Float(x) => write!(f, "{}", x),
            AttrValue::Str(x) => write!(f, "{:?}", x),
            AttrValue::Ints(x) => write!(f, "[{}]", x.iter().join(", ")),
            AttrValue::Strs(x) => write!(f, "[{}]", x.iter().map(|s| format!("{:?}", s)).join(", ")),
            AttrValue::Op(x) => write!(f, "{}", x),
            AttrValue::Ops(x) => write!(f, "[{}]", x.iter().join(", ")),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(x: bool) -> Self {
        AttrValue::Bool(x)
    }
}

impl From<i64> for AttrValue {
    fn from(x: i64) -> Self {
        AttrValue::Int(x)
    }
}

impl From<f32> for AttrValue {
    fn from(x: f32) -> Self {
        AttrValue::float(x)
    }
}

impl From<&str> for AttrValue {
    fn from(x: &str) -> Self {
        AttrValue::Str(x.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(x: String) -> Self {
        AttrValue::Str(x)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(x: Vec<i64>) -> Self {
        AttrValue::Ints(x)
    }
}

impl From<OpKind> for AttrValue {
    fn from(x: OpKind) -> Self {
        AttrValue::Op(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        assert_eq!(AttrValue::Int(3).as_int(), Some(3));
        assert_eq!(AttrValue::Int(3).as_usize(), Some(3));
        assert_eq!(AttrValue::Int(-1).as_usize(), None);
        assert_eq!(AttrValue::Int(3).as_str(), None);
        assert_eq!(AttrValue::float(0.5).as_float(), Some(0.5));
        assert_eq!(AttrValue::Ints(vec![0, 2, 1]).as_ints(), Some(&[0, 2, 1][..]));
    }

    #[test]
    fn nan_floats_compare_equal() {
        assert_eq!(AttrValue::float(f32::NAN), AttrValue::float(f32::NAN));
        assert_ne!(AttrValue::float(1.0), AttrValue::float(2.0));
    }
}
