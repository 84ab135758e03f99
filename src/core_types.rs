use serde::{Deserialize, Serialize};

/// Position of a pattern variable in every full-length placement array.
pub type Ordinal = usize;

/// Identifier of one Monte-Carlo particle.
pub type ParticleId = u32;

/// Identifier of a task sequence (one physical asset).
pub type SequenceId = usize;

/// Opaque search-object category, used for sweep-width lookup.
pub type ObjectKind = u32;

/// Sorted, deduplicated set of the ordinals currently eligible for solving.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ActiveSet {
    ordinals: Vec<Ordinal>,
}

impl ActiveSet {
    pub fn new(mut ordinals: Vec<Ordinal>) -> Self {
        ordinals.sort_unstable();
        ordinals.dedup();
        Self { ordinals }
    }

    pub fn contains(&self, ordinal: Ordinal) -> bool {
        self.ordinals.binary_search(&ordinal).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = Ordinal> + '_ {
        self.ordinals.iter().copied()
    }

    pub fn as_slice(&self) -> &[Ordinal] {
        &self.ordinals
    }

    pub fn len(&self) -> usize {
        self.ordinals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordinals.is_empty()
    }
}
