//! State threaded through one packaging run.

use super::ids::IdentifierAllocator;
use crate::error::Result;
use crate::representation::Representation;

/// A representation with its allocated identifier.
#[derive(Debug)]
pub struct IdentifiedRepresentation {
    pub id: String,
    pub representation: Box<dyn Representation>,
}

/// Run-scoped state: the representations built so far, in construction
/// order, the identifier counters and the longest source duration.
#[derive(Debug, Default)]
pub struct RunContext {
    ids: IdentifierAllocator,
    max_duration_secs: f64,
    pending: Vec<Box<dyn Representation>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the representations of one input.
    pub fn record(&mut self, representations: Vec<Box<dyn Representation>>) {
        for representation in representations {
            self.max_duration_secs = self.max_duration_secs.max(representation.duration_secs());
            self.pending.push(representation);
        }
    }

    pub fn representation_count(&self) -> usize {
        self.pending.len()
    }

    /// Longest source track duration seen in the run, in seconds
    pub fn period_duration_secs(&self) -> f64 {
        self.max_duration_secs
    }

    /// Allocate identifiers for every recorded representation, in
    /// construction order.
    pub fn assign_identifiers(&mut self) -> Result<Vec<IdentifiedRepresentation>> {
        let mut identified = Vec::with_capacity(self.pending.len());
        for representation in self.pending.drain(..) {
            let id = self.ids.allocate(representation.primary_track().handler())?;
            identified.push(IdentifiedRepresentation { id, representation });
        }
        Ok(identified)
    }
}
