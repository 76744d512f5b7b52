use anyhow::Result;

use crate::config::LoreConfig;
use crate::facts::store::SqliteFactStore;
use crate::facts::FactStore;

/// Export all facts as pretty-printed JSON to stdout.
pub fn export(config: &LoreConfig) -> Result<()> {
    let store = SqliteFactStore::new(crate::db::open_database(config.resolved_db_path())?);
    let facts = store.list_facts()?;

    println!("{}", serde_json::to_string_pretty(&facts)?);
    eprintln!("Exported {} facts.", facts.len());
    Ok(())
}
