// src/cache/state.rs
//! Per-entry build state tracking
//!
//! Every manifest entry moves through:
//! `Pending -> Resolving -> Assembling -> Published | Failed`, or straight to
//! `Skipped` when it is ignored or filtered out. The board is shared by the
//! concurrent entry builds; each entry only ever writes its own slot.

use dashmap::DashMap;
use std::fmt;

/// Build state of one manifest entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    /// Waiting for a build slot
    Pending,
    /// Fetching metadata and choosing a version
    Resolving,
    /// Downloading content and laying out files
    Assembling,
    /// Descriptor installed in the catalog
    Published,
    /// Build failed; any earlier descriptor stays in the catalog
    Failed(String),
    /// Not built this pass
    Skipped(String),
}

impl EntryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::Failed(_) | Self::Skipped(_))
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Resolving => write!(f, "resolving"),
            Self::Assembling => write!(f, "assembling"),
            Self::Published => write!(f, "published"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            Self::Skipped(reason) => write!(f, "skipped: {}", reason),
        }
    }
}

/// Entry states keyed by lowercase entry name
#[derive(Debug, Default)]
pub struct StateBoard {
    states: DashMap<String, EntryState>,
}

impl StateBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, state: EntryState) {
        tracing::trace!("{} -> {}", name, state);
        self.states.insert(name.to_lowercase(), state);
    }

    pub fn get(&self, name: &str) -> Option<EntryState> {
        self.states.get(&name.to_lowercase()).map(|s| s.value().clone())
    }

    /// Counts per state
    pub fn stats(&self) -> StateStats {
        let mut stats = StateStats::default();
        for state in self.states.iter() {
            match state.value() {
                EntryState::Pending => stats.pending += 1,
                EntryState::Resolving | EntryState::Assembling => stats.building += 1,
                EntryState::Published => stats.published += 1,
                EntryState::Failed(_) => stats.failed += 1,
                EntryState::Skipped(_) => stats.skipped += 1,
            }
            stats.total += 1;
        }
        stats
    }
}

/// State statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StateStats {
    pub pending: usize,
    pub building: usize,
    pub published: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
}
