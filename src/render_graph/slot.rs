//! Slot declarations and slot values

use crate::render_graph::label::SlotLabel;
use crate::render_graph::resource::{RenderResource, RenderResourceKind};

/// A named, kind-tagged input or output of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub name: SlotLabel,
    pub kind: RenderResourceKind,
}

impl SlotInfo {
    pub fn new(name: impl Into<SlotLabel>, kind: RenderResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A slot name plus the value produced for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotValue {
    pub name: SlotLabel,
    pub value: RenderResource,
}

impl SlotValue {
    pub fn new(name: impl Into<SlotLabel>, value: impl Into<RenderResource>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn kind(&self) -> RenderResourceKind {
        self.value.kind()
    }
}

/// Ordered slot declarations of one side of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotInfos {
    slots: Vec<SlotInfo>,
}

impl SlotInfos {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SlotInfo> {
        self.slots.get(index)
    }

    /// Index of the slot with the given name.
    pub fn index_of(&self, name: &SlotLabel) -> Option<usize> {
        self.slots.iter().position(|slot| &slot.name == name)
    }

    pub fn get_by_name(&self, name: &SlotLabel) -> Option<&SlotInfo> {
        self.index_of(name).and_then(|index| self.get(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlotInfo> {
        self.slots.iter()
    }

    /// Check `values` against these slots position by position and report
    /// the first disagreement.
    pub fn check_values(&self, values: &[SlotValue]) -> Result<(), SlotMismatch> {
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(value) = values.get(index) else {
                return Err(SlotMismatch::Missing {
                    index,
                    name: slot.name.clone(),
                });
            };
            if value.kind() != slot.kind {
                return Err(SlotMismatch::Kind {
                    index,
                    name: slot.name.clone(),
                    expected: slot.kind,
                    actual: value.kind(),
                });
            }
        }
        if values.len() > self.slots.len() {
            return Err(SlotMismatch::Extra {
                expected: self.slots.len(),
                actual: values.len(),
            });
        }
        Ok(())
    }
}

/// First disagreement found by [`SlotInfos::check_values`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotMismatch {
    /// No value was supplied for slot `index`.
    Missing { index: usize, name: SlotLabel },
    Kind {
        index: usize,
        name: SlotLabel,
        expected: RenderResourceKind,
        actual: RenderResourceKind,
    },
    /// More values than slots.
    Extra { expected: usize, actual: usize },
}

impl From<Vec<SlotInfo>> for SlotInfos {
    fn from(slots: Vec<SlotInfo>) -> Self {
        Self { slots }
    }
}

impl<'a> IntoIterator for &'a SlotInfos {
    type Item = &'a SlotInfo;
    type IntoIter = std::slice::Iter<'a, SlotInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.iter()
    }
}
