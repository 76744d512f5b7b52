//! Background facts and the store that holds them.
//!
//! The retrieval core only ever reads the store through [`FactStore::list_facts`],
//! treating every call as a fresh, possibly changed snapshot. CRUD lives on the
//! concrete [`store::SqliteFactStore`].

pub mod store;
pub mod style;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A single background fact. `text` is the only field that is embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    #[serde(default)]
    pub category: String,
    pub text: String,
}

/// Body for creating or replacing a fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFact {
    #[serde(default)]
    pub category: String,
    pub text: String,
}

/// Read side of the fact store, as consumed by the index synchronizer.
pub trait FactStore: Send + Sync {
    /// All facts, in stable insertion order.
    fn list_facts(&self) -> Result<Vec<Fact>>;
}

/// Derive the corpus snapshot: the ordered texts of every fact with non-empty text.
///
/// Two snapshots are equal iff their text sequences are equal, order-sensitive.
pub fn corpus_snapshot(facts: &[Fact]) -> Vec<String> {
    facts
        .iter()
        .filter(|fact| !fact.text.trim().is_empty())
        .map(|fact| fact.text.clone())
        .collect()
}
