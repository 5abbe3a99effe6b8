//! String labels for nodes, slots and sub-graphs
//!
//! Labels compare and hash by string value. Static strings are stored
//! without allocating.

use std::borrow::{Borrow, Cow};
use std::fmt;

macro_rules! define_label {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Cow<'static, str>);

        impl $name {
            pub const fn new(name: &'static str) -> Self {
                Self(Cow::Borrowed(name))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&'static str> for $name {
            fn from(name: &'static str) -> Self {
                Self(Cow::Borrowed(name))
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self(Cow::Owned(name))
            }
        }

        impl From<&$name> for $name {
            fn from(label: &$name) -> Self {
                label.clone()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        // Hashes like `str`, so maps keyed by labels can be queried with `&str`.
        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_label!(
    /// Stable name of a node inside one graph.
    NodeLabel
);

define_label!(
    /// Name of an input or output slot of a node.
    SlotLabel
);

define_label!(
    /// Name of a sub-graph registered on a parent graph.
    GraphLabel
);
