use std::sync::Arc;

use jungledb::{CResult, IndexDescriptor, JungleDB, ObjectStoreOptions};
use jungledb::index::key_path::KeyPath;
use jungledb::query::Query;
use serde_json::json;

#[tokio::main]
async fn main() {
    println!("Hello, JungleDB!");

    run().await.unwrap();

    println!("Bye~");
}

async fn run() -> CResult<()> {
    let db: Arc<JungleDB<serde_json::Value>> = JungleDB::new("demo", 1);
    let people = db.create_object_store("people", ObjectStoreOptions::default())?;
    people.create_index(IndexDescriptor::new("byCity", KeyPath::single("city"), false, false))?;
    db.connect().await?;

    people.put(b"alice".to_vec(), json!({"name": "Alice", "city": "Berlin"}))?;
    people.put(b"bob".to_vec(), json!({"name": "Bob", "city": "Berlin"}))?;
    people.put(b"carol".to_vec(), json!({"name": "Carol", "city": "Lisbon"}))?;

    let berliners = people.values(Some(&Query::eq("byCity", "Berlin")), None)?;
    println!("Berlin residents: {berliners:?}");

    let tx = people.transaction();
    tx.put(b"dave".to_vec(), json!({"name": "Dave", "city": "Lisbon"}))?;
    tx.remove(b"carol".to_vec())?;
    people.commit(&tx)?;

    let lisboans = people.values(Some(&Query::eq("byCity", "Lisbon")), None)?;
    println!("Lisbon residents after the transaction: {lisboans:?}");

    db.close().await?;
    Ok(())
}
