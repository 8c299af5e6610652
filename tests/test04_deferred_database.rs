#![cfg(feature = "sqlite")]

mod common;

use std::sync::LazyLock;
use std::time::Duration;

use common::unique_db_path;
use sql_async_orm::prelude::*;

static REGISTRY: LazyLock<Database> = LazyLock::new(|| Database::deferred(DatabaseType::Sqlite));

static SETTING: ModelMeta = ModelMeta::new(
    "Setting",
    "setting",
    &[
        FieldMeta::new("key", FieldType::Char(64)),
        FieldMeta::new("value", FieldType::Text),
    ],
)
.primary_key(&["key"]);

#[derive(Debug, Clone, Default)]
struct Setting {
    key: String,
    value: String,
    state: ModelState,
}

impl Setting {
    fn new(key: &str, value: &str) -> Self {
        Setting {
            key: key.into(),
            value: value.into(),
            state: ModelState::default(),
        }
    }
}

impl Model for Setting {
    fn meta() -> &'static ModelMeta {
        &SETTING
    }

    fn decode(row: &CustomDbRow) -> Result<Self, OrmError> {
        Ok(Setting {
            key: row.try_get("key")?,
            value: row.try_get("value")?,
            state: ModelState::default(),
        })
    }

    fn value(&self, field: &str) -> Option<RowValues> {
        match field {
            "key" => Some(self.key.clone().into()),
            "value" => Some(self.value.clone().into()),
            _ => None,
        }
    }

    fn set_value(&mut self, field: &str, value: RowValues) -> Result<(), OrmError> {
        let text = value
            .as_text()
            .ok_or_else(|| OrmError::Decode(format!("{field} expects text, got {value:?}")))?
            .to_owned();
        match field {
            "key" => self.key = text,
            "value" => self.value = text,
            _ => return Err(OrmError::Decode(format!("Setting has no field {field}"))),
        }
        Ok(())
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn database() -> Option<Target> {
        Some(Target::from(&*REGISTRY))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deferred_database_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    let err = Setting::create_table(true).await.unwrap_err();
    assert!(matches!(err, OrmError::Configuration(_)), "unexpected error: {err}");
    assert!(matches!(REGISTRY.close().await, Err(OrmError::State(_))));

    let config: DatabaseConfig = serde_json::from_value(serde_json::json!({
        "backend": "sqlite",
        "db_path": unique_db_path("registry"),
        "autorollback": true,
    }))?;
    REGISTRY.init(config).await?;
    assert!(REGISTRY.autorollback());

    assert!(Setting::create_table(true).await?);
    assert!(Setting::table_exists().await?);

    let mut theme = Setting::create(Setting::new("theme", "dark")).await?;
    theme.value = "light".into();
    assert_eq!(theme.save().await?, 1);
    assert_eq!(Setting::get(col("key").eq("theme")).await?.value, "light");

    // Saving only the listed fields leaves other edits unsent.
    let mut lang = Setting::create(Setting::new("lang", "en")).await?;
    lang.value = "fr".into();
    assert_eq!(lang.save_with(SaveOptions::default().only(&["key"])).await?, 0);
    assert_eq!(Setting::get_by_id("lang").await?.value, "en");

    REGISTRY.close().await?;
    assert!(REGISTRY.is_closed().await);
    REGISTRY.close().await?;

    // The next statement reopens the pool.
    assert_eq!(Setting::select().count().await?, 2);
    assert!(!REGISTRY.is_closed().await);

    let (found, created) = Setting::get_or_create(vec![("key", "theme".into())], vec![]).await?;
    assert!(!created);
    assert_eq!(found.value, "light");

    assert_eq!(Setting::delete().filter(col("key").eq("lang")).await?, 1);
    assert!(Setting::get_or_none(col("key").eq("lang")).await?.is_none());

    REGISTRY.drop_tables(&[&SETTING], true).await?;
    assert!(!Setting::table_exists().await?);
    REGISTRY.close().await?;
    Ok(())
}

#[tokio::test]
async fn configuration_for_the_wrong_backend_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::deferred(DatabaseType::Postgres);
    let err = db
        .init(DatabaseConfig::sqlite(SqliteOptions::new(unique_db_path("wrong_backend"))))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Configuration(_)), "unexpected error: {err}");
    assert!(matches!(db.connect().await, Err(OrmError::Configuration(_))));
    Ok(())
}

#[tokio::test]
async fn live_database_cannot_be_reconfigured() -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::sqlite(SqliteOptions::new(unique_db_path("reconfigure")));
    db.connect().await?;
    let err = db
        .init(DatabaseConfig::sqlite(SqliteOptions::new(unique_db_path("reconfigure_other"))))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::State(_)), "unexpected error: {err}");

    db.close().await?;
    db.init(DatabaseConfig::sqlite(SqliteOptions::new(unique_db_path("reconfigure_other"))))
        .await?;
    db.execute_sql("CREATE TABLE t (x INTEGER)", &[], CommitPolicy::Always)
        .await?;
    assert!(db.table_exists("t", None).await?);
    Ok(())
}

#[tokio::test]
async fn unopenable_database_fails_fast() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("missing").join("nested").join("app.db");
    let db = Database::sqlite(SqliteOptions::new(path.to_string_lossy()));

    for _ in 0..2 {
        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            db.execute_sql("SELECT 1", &[], CommitPolicy::Infer),
        )
        .await?;
        let err = outcome.unwrap_err();
        assert!(matches!(err, OrmError::Connection(_)), "unexpected error: {err}");
    }
    Ok(())
}
