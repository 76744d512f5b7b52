mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::TestEmbedder;
use lorekeeper::db;
use lorekeeper::facts::store::SqliteFactStore;
use lorekeeper::facts::style::StyleConfig;
use lorekeeper::facts::FactStore;
use lorekeeper::index::sync::IndexSynchronizer;

fn memory_store() -> SqliteFactStore {
    SqliteFactStore::new(db::open_memory_database().unwrap())
}

#[test]
fn test_insert_and_list_in_insertion_order() {
    let store = memory_store();
    let a = store.insert_fact("character", "Mara pilots the Halcyon").unwrap();
    let b = store.insert_fact("place", "  Ceres Station orbits Ceres  ").unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(b.text, "Ceres Station orbits Ceres", "text is trimmed");

    let facts = store.list_facts().unwrap();
    assert_eq!(facts, vec![a.clone(), b]);
    assert_eq!(store.get_fact(&a.id).unwrap(), Some(a));
}

#[test]
fn test_insert_rejects_empty_text() {
    let store = memory_store();
    assert!(store.insert_fact("character", "   ").is_err());
    assert!(store.list_facts().unwrap().is_empty());
}

#[test]
fn test_update_keeps_position() {
    let store = memory_store();
    let a = store.insert_fact("character", "Mara pilots the Halcyon").unwrap();
    store.insert_fact("place", "Ceres Station").unwrap();

    let updated = store
        .update_fact(&a.id, "character", "Mara captains the Halcyon")
        .unwrap()
        .expect("fact exists");
    assert_eq!(updated.text, "Mara captains the Halcyon");

    let facts = store.list_facts().unwrap();
    assert_eq!(facts[0].id, a.id);
    assert_eq!(facts[0].text, "Mara captains the Halcyon");
}

#[test]
fn test_update_missing_fact_returns_none() {
    let store = memory_store();
    assert!(store.update_fact("nope", "x", "text").unwrap().is_none());
}

#[test]
fn test_delete() {
    let store = memory_store();
    let a = store.insert_fact("item", "The drive core hums").unwrap();

    assert!(store.delete_fact(&a.id).unwrap());
    assert!(!store.delete_fact(&a.id).unwrap());
    assert!(store.get_fact(&a.id).unwrap().is_none());
}

#[test]
fn test_style_defaults_then_persists() {
    let store = memory_store();
    assert_eq!(store.load_style().unwrap(), StyleConfig::default());

    let style = StyleConfig {
        pov: "Third person".into(),
        tense: "Present tense".into(),
        style: "Terse.".into(),
    };
    store.save_style(&style).unwrap();
    assert_eq!(store.load_style().unwrap(), style);
}

#[test]
fn test_facts_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("facts.db");

    let id = {
        let store = SqliteFactStore::new(db::open_database(&path).unwrap());
        store.insert_fact("lore", "The Halcyon was built on Mars").unwrap().id
    };

    let store = SqliteFactStore::new(db::open_database(&path).unwrap());
    let facts = store.list_facts().unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].id, id);
}

#[tokio::test]
async fn test_store_edits_reach_the_index() {
    let store = Arc::new(memory_store());
    let embedder = TestEmbedder::numeric();
    let sync = IndexSynchronizer::new(store.clone(), embedder.clone(), Duration::from_secs(5));

    let fact = store.insert_fact("lore", "fact 1").unwrap();
    assert_eq!(sync.ensure_current().await.unwrap().passages(), ["fact 1"]);

    store.update_fact(&fact.id, "lore", "fact 2").unwrap();
    assert_eq!(sync.ensure_current().await.unwrap().passages(), ["fact 2"]);

    store.delete_fact(&fact.id).unwrap();
    assert!(sync.ensure_current().await.unwrap().is_empty());
    assert_eq!(sync.rebuild_count(), 3);
}
