use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

use crate::config::LoreConfig;
use crate::facts::store::SqliteFactStore;
use crate::facts::{FactStore, NewFact};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    /// Entries whose text already exists in the store (or earlier in the file).
    pub duplicates: usize,
    pub empty: usize,
}

/// Insert facts, skipping empty texts and texts already present.
pub fn import_facts(store: &SqliteFactStore, facts: &[NewFact]) -> Result<ImportSummary> {
    let mut known: HashSet<String> = store
        .list_facts()?
        .into_iter()
        .map(|fact| fact.text)
        .collect();

    let mut summary = ImportSummary::default();
    for fact in facts {
        let text = fact.text.trim();
        if text.is_empty() {
            summary.empty += 1;
            continue;
        }
        if !known.insert(text.to_string()) {
            summary.duplicates += 1;
            continue;
        }
        store.insert_fact(&fact.category, text)?;
        summary.imported += 1;
    }
    Ok(summary)
}

/// Import facts from a JSON file containing `[{"category": ..., "text": ...}]`.
pub fn import(config: &LoreConfig, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;
    let facts: Vec<NewFact> =
        serde_json::from_str(&json).context("failed to parse import JSON")?;

    let store = SqliteFactStore::new(crate::db::open_database(config.resolved_db_path())?);

    println!("Importing {} facts...", facts.len());
    let summary = import_facts(&store, &facts)?;

    println!("Import complete:");
    println!("  Facts imported:    {}", summary.imported);
    println!("  Duplicates skipped: {}", summary.duplicates);
    if summary.empty > 0 {
        println!("  Empty skipped:     {}", summary.empty);
    }
    Ok(())
}
