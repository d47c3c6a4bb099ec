//! Adaptation set grouping by content signature.

use indexmap::IndexMap;

use crate::manifest::model::{AdaptationSet, RepresentationDescriptor};

/// Insertion-ordered grouping of representation descriptors.
#[derive(Debug, Default)]
pub struct AdaptationSetGrouper {
    sets: IndexMap<String, Vec<RepresentationDescriptor>>,
}

impl AdaptationSetGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `descriptor` to the set keyed by `signature`, creating the set
    /// on first sight. Keys are compared verbatim.
    pub fn add(&mut self, signature: &str, descriptor: RepresentationDescriptor) {
        self.sets
            .entry(signature.to_string())
            .or_default()
            .push(descriptor);
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Sets in first-seen signature order.
    pub fn into_adaptation_sets(self) -> Vec<AdaptationSet> {
        self.sets
            .into_values()
            .map(|representations| AdaptationSet {
                representations,
                ..Default::default()
            })
            .collect()
    }
}
