use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Dense remapping of original vertex ids to internal ids `0..n`.
///
/// Internal ids are handed out in first-seen order while reading the edge
/// list, so output written in internal order is *not* sorted by original id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u32>", into = "Vec<u32>")]
pub struct VertexIdTranslate {
    backward: Vec<u32>,
    forward: HashMap<u32, u32>,
}

impl VertexIdTranslate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the internal id of `original`, assigning the next free one if
    /// the vertex is new.
    pub fn intern(&mut self, original: u32) -> u32 {
        if let Some(&internal) = self.forward.get(&original) {
            return internal;
        }

        let internal = self.backward.len() as u32;
        self.backward.push(original);
        self.forward.insert(original, internal);
        internal
    }

    pub fn forward(&self, original: u32) -> Option<u32> {
        self.forward.get(&original).copied()
    }

    pub fn backward(&self, internal: u32) -> u32 {
        self.backward[internal as usize]
    }

    pub fn len(&self) -> usize {
        self.backward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backward.is_empty()
    }
}

impl From<Vec<u32>> for VertexIdTranslate {
    fn from(backward: Vec<u32>) -> Self {
        let forward = backward
            .iter()
            .enumerate()
            .map(|(internal, &original)| (original, internal as u32))
            .collect();
        Self { backward, forward }
    }
}

impl From<VertexIdTranslate> for Vec<u32> {
    fn from(value: VertexIdTranslate) -> Self {
        value.backward
    }
}
