//! Folding@home client state: folding slots and queued work units.
//!
//! Field names match the keys of the `slot-info` / `queue-info` documents.

use serde::{Deserialize, Serialize};

/// A folding slot (one CPU or GPU worker).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Slot {
    pub id: String,
    pub status: String,
    pub description: String,
    pub reason: String,
    pub idle: bool,
}

/// A work unit in the client queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Unit {
    pub id: String,
    pub state: String,
    pub error: String,
    pub project: i64,
    pub run: i64,
    pub clone: i64,
    pub gen: i64,
    pub core: String,
    pub unit: String,
    pub percentdone: String,
    pub eta: String,
    pub ppd: String,
    pub creditestimate: String,
    pub waitingon: String,
    pub nextattempt: String,
    pub timeremaining: String,
    pub totalframes: i64,
    pub framesdone: i64,
    pub assigned: String,
    pub timeout: String,
    pub deadline: String,
    pub ws: String,
    pub cs: String,
    pub attempts: i64,
    pub slot: String,
    pub tpf: String,
    pub basecredit: String,
}

impl Unit {
    /// `P<project> (R<run>, C<clone>, G<gen>)`, the usual way a unit is named.
    pub fn prcg(&self) -> String {
        format!(
            "P{} (R{}, C{}, G{})",
            self.project, self.run, self.clone, self.gen
        )
    }
}

/// Slots and queue of one Folding@home client.
///
/// The two collections are fetched by separate commands and replaced
/// independently of each other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FahState {
    pub slots: Vec<Slot>,
    pub units: Vec<Unit>,
}

impl FahState {
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.units.is_empty()
    }

    /// Units currently assigned to the given slot id.
    pub fn units_for_slot<'a>(&'a self, slot_id: &'a str) -> impl Iterator<Item = &'a Unit> + 'a {
        self.units.iter().filter(move |u| u.slot == slot_id)
    }
}
