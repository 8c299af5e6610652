use async_trait::async_trait;

use crate::database::{CommitPolicy, Database};
use crate::error::Result;
use crate::results::Cursor;
use crate::transaction::Transaction;
use crate::types::{Capabilities, DatabaseType, RowValues};

/// Something that can run one statement: a database (pooled connection per
/// statement) or a transaction (its held connection).
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run `sql` with positional parameters.
    ///
    /// # Errors
    /// Returns the classified backend error, or a lifecycle error from the target.
    async fn execute_sql(
        &self,
        sql: &str,
        params: &[RowValues],
        policy: CommitPolicy,
    ) -> Result<Cursor>;

    /// The database statements ultimately run against.
    fn database(&self) -> &Database;

    fn db_type(&self) -> DatabaseType {
        self.database().db_type()
    }

    fn capabilities(&self) -> Capabilities {
        self.database().capabilities()
    }
}

/// Where a query runs: a database or an explicit transaction.
#[derive(Debug, Clone)]
pub enum Target {
    Database(Database),
    Transaction(Transaction),
}

impl Target {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Target::Database(_) => "database",
            Target::Transaction(_) => "transaction",
        }
    }

    /// Names of the tables in `schema` (Postgres; defaults to `public`) or in
    /// the main database (SQLite).
    ///
    /// # Errors
    /// Returns the backend error from the catalog query.
    pub async fn get_tables(&self, schema: Option<&str>) -> Result<Vec<String>> {
        let (sql, params) = match self.db_type() {
            DatabaseType::Postgres => (
                "SELECT tablename FROM pg_catalog.pg_tables WHERE schemaname = $1 ORDER BY tablename",
                vec![RowValues::Text(schema.unwrap_or("public").to_string())],
            ),
            DatabaseType::Sqlite => (
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                Vec::new(),
            ),
        };
        let mut cursor = self.execute_sql(sql, &params, CommitPolicy::Never).await?;
        Ok(cursor
            .fetchall()
            .into_iter()
            .filter_map(|row| row.get_by_index(0).and_then(|v| v.as_text().map(str::to_owned)))
            .collect())
    }

    /// # Errors
    /// Returns the backend error from the catalog query.
    pub async fn table_exists(&self, table: &str, schema: Option<&str>) -> Result<bool> {
        Ok(self.get_tables(schema).await?.iter().any(|t| t == table))
    }
}

#[async_trait]
impl Executor for Target {
    async fn execute_sql(
        &self,
        sql: &str,
        params: &[RowValues],
        policy: CommitPolicy,
    ) -> Result<Cursor> {
        match self {
            Target::Database(db) => db.execute_sql(sql, params, policy).await,
            Target::Transaction(tx) => tx.execute_sql(sql, params, policy).await,
        }
    }

    fn database(&self) -> &Database {
        match self {
            Target::Database(db) => db,
            Target::Transaction(tx) => tx.database(),
        }
    }
}

impl From<Database> for Target {
    fn from(db: Database) -> Self {
        Target::Database(db)
    }
}

impl From<&Database> for Target {
    fn from(db: &Database) -> Self {
        Target::Database(db.clone())
    }
}

impl From<Transaction> for Target {
    fn from(tx: Transaction) -> Self {
        Target::Transaction(tx)
    }
}

impl From<&Transaction> for Target {
    fn from(tx: &Transaction) -> Self {
        Target::Transaction(tx.clone())
    }
}

impl From<&Target> for Target {
    fn from(target: &Target) -> Self {
        target.clone()
    }
}
