//! Addressing of sub-regions of a [`Value`](crate::value::Value).
//!
//! A [`Path`] is an ordered list of [`PathComponent`]s applied outer to inner. The empty path is
//! the whole value. Each component remembers the kind of container it was applied to
//! (`indexed_cls`) so that composed paths keep their slice/key/field meaning when they are
//! translated between quibs.
//!
//! - [`index`]: the [`Index`] step itself and python-style [`SliceIndex`]
//! - [`access`]: [`deep_get`] and the copy-on-write [`deep_assign_data_in_path`]

pub mod access;
pub mod index;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use access::{deep_assign_data_in_path, deep_get, get_item, set_item};
pub use index::{Index, SliceIndex};

use crate::value::ValueKind;

/// The kind of container a path component indexes into.
pub type IndexedCls = ValueKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathComponent {
    pub component: Index,
    pub indexed_cls: IndexedCls,
}

pub type Path = Vec<PathComponent>;
pub type Paths = Vec<Path>;

impl PathComponent {
    pub fn new(component: Index, indexed_cls: IndexedCls) -> PathComponent {
        PathComponent {
            component,
            indexed_cls,
        }
    }

    pub fn array(component: Index) -> PathComponent {
        PathComponent::new(component, ValueKind::Array)
    }

    pub fn field(name: &str) -> PathComponent {
        PathComponent::new(Index::Field(name.to_string()), ValueKind::Record)
    }

    pub fn key(key: &str) -> PathComponent {
        PathComponent::new(Index::Field(key.to_string()), ValueKind::Dict)
    }

    pub fn item(position: i64) -> PathComponent {
        PathComponent::new(Index::Int(position), ValueKind::List)
    }

    pub fn attribute(name: &str) -> PathComponent {
        PathComponent::new(Index::Field(name.to_string()), ValueKind::Slice)
    }

    pub fn is_whole(&self) -> bool {
        self.component.is_whole()
    }

    /// Addresses a named field of a record array.
    pub fn references_field_in_field_array(&self) -> bool {
        self.indexed_cls == ValueKind::Record && self.component.is_field()
    }

    pub fn is_attribute(&self) -> bool {
        self.indexed_cls == ValueKind::Slice
    }
}

impl fmt::Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_attribute() {
            if let Index::Field(name) = &self.component {
                return write!(f, ".{name}");
            }
        }
        write!(f, "[{}]", self.component)
    }
}

/// Path with every component whole is equivalent to the empty path.
pub fn is_whole_path(path: &[PathComponent]) -> bool {
    path.iter().all(PathComponent::is_whole)
}

pub fn path_repr(path: &[PathComponent]) -> String {
    if path.is_empty() {
        return "[]".to_string();
    }
    path.iter().map(|component| component.to_string()).collect()
}

/// Build an array path from plain indices.
pub fn array_path<I: IntoIterator<Item = Index>>(indices: I) -> Path {
    indices.into_iter().map(PathComponent::array).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_repr() {
        let path = vec![
            PathComponent::key("a"),
            PathComponent::array(Index::Slice(SliceIndex::range(1, 3))),
            PathComponent::attribute("start"),
        ];
        assert_eq!(path_repr(&path), "['a'][1:3].start");
        assert_eq!(path_repr(&[]), "[]");
    }

    #[test]
    fn test_whole_path_detection() {
        assert!(is_whole_path(&array_path([Index::All, Index::Ellipsis])));
        assert!(!is_whole_path(&array_path([Index::Int(0)])));
    }
}
