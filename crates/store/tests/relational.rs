use migration::MigratorTrait;
use serde_json::{json, Map, Value};
use store::{AdaptorOptions, ConnectSettings, Database, RelationalAdaptor, RelationalAdaptorFactory, StorageAdaptor, StoreError};
use uuid::Uuid;

struct TempDb {
    path: std::path::PathBuf,
}

impl TempDb {
    fn new() -> Self {
        Self { path: std::env::temp_dir().join(format!("elegant_rel_{}.db", Uuid::new_v4())) }
    }

    fn settings(&self) -> ConnectSettings {
        ConnectSettings::new(format!("sqlite://{}?mode=rwc", self.path.display()))
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn migrated(tmp: &TempDb) -> anyhow::Result<RelationalAdaptor> {
    let adaptor = RelationalAdaptor::new(tmp.settings(), AdaptorOptions::default())?;
    migration::Migrator::up(adaptor.connection().await?, None).await?;
    Ok(adaptor)
}

#[tokio::test]
async fn key_value_operations() -> anyhow::Result<()> {
    let tmp = TempDb::new();
    let kv = migrated(&tmp).await?;
    assert_eq!(kv.table(), "elegant_kv");
    assert!(kv.check_connection().await);

    kv.set("user", json!({ "name": "Ada", "tags": ["x"] })).await?;
    assert_eq!(kv.get("user").await?, Some(json!({ "name": "Ada", "tags": ["x"] })));

    // upsert, not a duplicate insert
    kv.set("user", json!("replaced")).await?;
    assert_eq!(kv.get("user").await?, Some(json!("replaced")));
    assert_eq!(kv.count_rows("elegant_kv", "1 = 1").await?, 1);

    assert_eq!(kv.add("n", &json!(2)).await?, json!(2));
    assert_eq!(kv.add("n", &json!(3)).await?, json!(5));
    assert!(matches!(kv.add("n", &json!("+1")).await, Err(StoreError::TypeMismatch { .. })));
    assert_eq!(kv.push("n", json!([7, 8])).await?, json!([7, 8]));

    kv.remove("user").await?;
    kv.remove("absent").await?;
    assert!(!kv.has("user").await?);

    let all: Value = serde_json::from_str(&kv.all().await?)?;
    assert_eq!(all, json!({ "n": [7, 8] }));
    Ok(())
}

#[tokio::test]
async fn row_primitives() -> anyhow::Result<()> {
    let tmp = TempDb::new();
    let kv = migrated(&tmp).await?;

    let mut row = Map::new();
    row.insert("key_column".into(), json!("a"));
    row.insert("value_column".into(), json!("1"));
    assert_eq!(kv.insert_row("elegant_kv", &row).await?, 1);
    row.insert("key_column".into(), json!("b"));
    kv.insert_row("elegant_kv", &row).await?;

    let mut change = Map::new();
    change.insert("value_column".into(), json!("2"));
    assert_eq!(kv.update_rows("elegant_kv", &change, "key_column = 'b'").await?, 1);

    let rows = kv.select_rows("elegant_kv", "value_column = '2'").await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["key_column"], json!("b"));

    let found = kv.get_row_by_key("elegant_kv", "a").await?;
    assert_eq!(found.map(|r| r["value_column"].clone()), Some(json!("1")));
    assert_eq!(kv.count_rows("elegant_kv", "1 = 1").await?, 2);

    assert_eq!(kv.delete_rows("elegant_kv", "key_column = 'a'").await?, 1);
    assert_eq!(kv.delete_row_by_key("elegant_kv", "b").await?, 1);
    assert_eq!(kv.count_rows("elegant_kv", "1 = 1").await?, 0);

    kv.set("x", json!(1)).await?;
    kv.set("y", json!(2)).await?;
    assert_eq!(kv.delete_all_rows("elegant_kv").await?, 2);

    kv.set("z", json!("last")).await?;
    let rows = kv.execute_query("SELECT key_column FROM elegant_kv WHERE key_column = ?", &[json!("z")]).await?;
    assert_eq!(rows, vec![json!({ "key_column": "z" })]);
    Ok(())
}

#[tokio::test]
async fn identifiers_are_validated() -> anyhow::Result<()> {
    let tmp = TempDb::new();
    let kv = migrated(&tmp).await?;
    let err = kv.delete_all_rows("elegant_kv; DROP TABLE x").await.unwrap_err();
    assert!(matches!(err, StoreError::Validation { .. }));

    let err = RelationalAdaptor::new(tmp.settings(), AdaptorOptions::new("not a table")).err().unwrap();
    assert!(matches!(err, StoreError::Configuration { .. }));
    Ok(())
}

#[tokio::test]
async fn clone_copies_rows_into_another_table() -> anyhow::Result<()> {
    let tmp = TempDb::new();
    let kv = migrated(&tmp).await?;
    kv.set("a", json!([1])).await?;

    let backup = RelationalAdaptor::new(tmp.settings(), AdaptorOptions::new("elegant_backup"))?;
    backup.ensure_table().await?;

    let copy = kv.clone_to("elegant_backup").await?;
    assert_eq!(copy.entries().await?, kv.entries().await?);
    copy.set("b", json!(2)).await?;
    assert!(!kv.has("b").await?);
    assert_eq!(copy.adaptor_name(), "SQL");
    Ok(())
}

#[tokio::test]
async fn connection_failure_surfaces_on_first_use() -> anyhow::Result<()> {
    let settings = ConnectSettings::new("sqlite:///definitely/not/a/dir/elegant.db");
    let kv = RelationalAdaptor::new(settings, AdaptorOptions::default())?;
    assert!(matches!(kv.ready().await, Err(StoreError::Database { .. })));
    assert!(matches!(kv.get("k").await, Err(StoreError::Database { .. })));
    assert!(!kv.check_connection().await);
    Ok(())
}

#[tokio::test]
async fn facade_over_relational_adaptor() -> anyhow::Result<()> {
    let tmp = TempDb::new();
    migrated(&tmp).await?;
    let db = Database::builder().adaptor(RelationalAdaptorFactory::new(tmp.settings())).build()?;
    db.ready().await?;

    db.transfer(&json!({ "a": 1, "b": { "c": true } })).await?;
    assert_eq!(db.get("b").await?, Some(json!({ "c": true })));
    assert_eq!(db.all().await?.len(), 2);
    assert_eq!(db.location(), "elegant_kv");
    Ok(())
}
