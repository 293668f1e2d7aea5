//! Phase label alias table
//!
//! Each phase has one canonical label (the only one ever written) and zero or
//! more legacy spellings still recognized on read. Query construction and
//! label matching both go through this table.

use crate::types::Phase;

/// Canonical and legacy label names for one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseLabel {
    pub phase: Phase,
    pub canonical: &'static str,
    pub legacy: &'static [&'static str],
}

impl PhaseLabel {
    /// Canonical name first, then legacy aliases
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.canonical).chain(self.legacy.iter().copied())
    }

    /// Case-insensitive match against any spelling of this phase
    pub fn matches(&self, name: &str) -> bool {
        self.names().any(|n| n.eq_ignore_ascii_case(name.trim()))
    }
}

const PHASE_LABELS: [PhaseLabel; 6] = [
    PhaseLabel {
        phase: Phase::Discussion,
        canonical: "agora:discussion",
        legacy: &["phase:discussion"],
    },
    PhaseLabel {
        phase: Phase::Voting,
        canonical: "agora:voting",
        legacy: &["phase:voting"],
    },
    PhaseLabel {
        phase: Phase::ExtendedVoting,
        canonical: "agora:extended-voting",
        legacy: &["phase:extended-voting", "inconclusive"],
    },
    PhaseLabel {
        phase: Phase::ReadyToImplement,
        canonical: "agora:ready-to-implement",
        legacy: &["phase:ready-to-implement", "ready-to-implement"],
    },
    PhaseLabel {
        phase: Phase::Rejected,
        canonical: "agora:rejected",
        legacy: &["rejected"],
    },
    PhaseLabel {
        phase: Phase::NeedsHuman,
        canonical: "agora:needs-human",
        legacy: &["needs:human"],
    },
];

/// Table entry for a phase
pub fn phase_label(phase: Phase) -> &'static PhaseLabel {
    // PHASE_LABELS covers every Phase variant
    match phase {
        Phase::Discussion => &PHASE_LABELS[0],
        Phase::Voting => &PHASE_LABELS[1],
        Phase::ExtendedVoting => &PHASE_LABELS[2],
        Phase::ReadyToImplement => &PHASE_LABELS[3],
        Phase::Rejected => &PHASE_LABELS[4],
        Phase::NeedsHuman => &PHASE_LABELS[5],
    }
}

/// The only label name written for a phase
pub fn canonical_label(phase: Phase) -> &'static str {
    phase_label(phase).canonical
}

/// Reverse lookup: which phase does a label name denote
pub fn phase_for_label(name: &str) -> Option<Phase> {
    PHASE_LABELS
        .iter()
        .find(|entry| entry.matches(name))
        .map(|entry| entry.phase)
}

/// Whether a label name denotes the given phase
pub fn label_matches(phase: Phase, name: &str) -> bool {
    phase_label(phase).matches(name)
}

/// Labels on an issue that belong to the given phase, in their original spelling
pub fn phase_labels_present<'a>(phase: Phase, labels: &'a [String]) -> Vec<&'a str> {
    labels
        .iter()
        .filter(|l| label_matches(phase, l))
        .map(String::as_str)
        .collect()
}
