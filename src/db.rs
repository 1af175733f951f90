use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Category, CategoryCount, Email, EmailFilter, NewCategory, NewEmail, Statistics, User,
};
use chrono::{DateTime, TimeDelta, Utc};
use inflections::case::to_title_case;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteQueryResult,
    SqliteRow, SqliteSynchronous,
};
use sqlx::{ConnectOptions, Connection, QueryBuilder, Row, Sqlite, Transaction};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

const EMAIL_SELECT: &str = "SELECT e.id, e.sender, e.recipient, e.subject, e.body, e.category_id, \
     c.name AS category_name, e.sent_at, e.is_read, e.is_important, e.is_archived \
     FROM emails e \
     LEFT JOIN categories c ON e.category_id = c.id";

// Ties on sent_at resolve to the most recently inserted row first.
const NEWEST_FIRST: &str = " ORDER BY e.sent_at DESC, e.id DESC LIMIT ";

/// Owns the archive's single SQLite connection.
///
/// The connection is opened lazily by the first operation and re-opened after
/// [`ArchiveStore::close`]. Dropping the store drops the connection, which
/// closes the database file.
pub struct ArchiveStore {
    config: StoreConfig,
    conn: Option<SqliteConnection>,
}

impl ArchiveStore {
    pub fn new(database_path: impl AsRef<Path>) -> Self {
        Self::with_config(StoreConfig::default().with_database_path(database_path.as_ref()))
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self { config, conn: None }
    }

    pub fn path(&self) -> &Path {
        &self.config.database_path
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Releases the connection. Safe to call on a closed store.
    pub async fn close(&mut self) -> StoreResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
            debug!(path = %self.config.database_path.display(), "closed archive connection");
        }
        Ok(())
    }

    async fn connection(&mut self) -> StoreResult<&mut SqliteConnection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.open().await?,
        };
        Ok(self.conn.insert(conn))
    }

    async fn open(&self) -> StoreResult<SqliteConnection> {
        let schema = read_schema(&self.config.schema_path).await?;

        let options = SqliteConnectOptions::new()
            .filename(&self.config.database_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.config.busy_timeout())
            .statement_cache_capacity(self.config.statement_cache_capacity);

        let mut conn = options.connect().await?;
        sqlx::query(&format!("PRAGMA cache_size = {}", self.config.cache_size_pages))
            .execute(&mut conn)
            .await?;
        sqlx::query("PRAGMA temp_store = MEMORY").execute(&mut conn).await?;

        init_schema(&mut conn, &schema).await?;
        info!(
            path = %self.config.database_path.display(),
            schema = %self.config.schema_path.display(),
            "archive schema applied"
        );
        Ok(conn)
    }

    /// Runs one statement as its own unit of work.
    async fn write<'q>(
        &mut self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> StoreResult<SqliteQueryResult> {
        let conn = self.connection().await?;
        let mut tx = conn.begin().await?;
        let outcome = query.execute(&mut *tx).await;
        finish(tx, outcome).await
    }

    pub async fn add_user(&mut self, name: &str, email: &str) -> StoreResult<i64> {
        if name.trim().is_empty() {
            return Err(StoreError::invalid("name", "must not be empty"));
        }
        let result = self
            .write(
                sqlx::query("INSERT INTO users (name, email) VALUES (?, ?)")
                    .bind(name)
                    .bind(email),
            )
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn add_category(&mut self, category: &NewCategory) -> StoreResult<i64> {
        let result = self
            .write(
                sqlx::query("INSERT INTO categories (name, description, color) VALUES (?, ?, ?)")
                    .bind(&category.name)
                    .bind(&category.description)
                    .bind(&category.color),
            )
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Inserts an email stamped with the current time. Fails with
    /// [`StoreError::Constraint`] when `category_id` names no category.
    pub async fn add_email(&mut self, email: &NewEmail) -> StoreResult<i64> {
        let sent_at = Utc::now().timestamp_millis();
        let result = self
            .write(
                sqlx::query(
                    "INSERT INTO emails (sender, recipient, subject, body, category_id, sent_at)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(&email.sender)
                .bind(&email.recipient)
                .bind(&email.subject)
                .bind(&email.body)
                .bind(email.category_id)
                .bind(sent_at),
            )
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn mark_read(&mut self, id: i64) -> StoreResult<bool> {
        let result = self
            .write(sqlx::query("UPDATE emails SET is_read = 1 WHERE id = ?").bind(id))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_important(&mut self, id: i64, important: bool) -> StoreResult<bool> {
        let result = self
            .write(
                sqlx::query("UPDATE emails SET is_important = ? WHERE id = ?")
                    .bind(important)
                    .bind(id),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn archive(&mut self, id: i64) -> StoreResult<bool> {
        let result = self
            .write(sqlx::query("UPDATE emails SET is_archived = 1 WHERE id = ?").bind(id))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_email(&mut self, id: i64) -> StoreResult<bool> {
        let result = self
            .write(sqlx::query("DELETE FROM emails WHERE id = ?").bind(id))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every email sent more than `days` days before now.
    pub async fn purge_older_than(&mut self, days: i64) -> StoreResult<u64> {
        if days < 0 {
            return Err(StoreError::invalid("days", "must not be negative"));
        }
        let cutoff = TimeDelta::try_days(days)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.purge_before(cutoff).await
    }

    /// Deletes every email with a send timestamp strictly before `cutoff`.
    pub async fn purge_before(&mut self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = self
            .write(
                sqlx::query("DELETE FROM emails WHERE sent_at < ?").bind(cutoff.timestamp_millis()),
            )
            .await?;
        debug!(cutoff = %cutoff, deleted = result.rows_affected(), "purged old emails");
        Ok(result.rows_affected())
    }

    pub async fn find_emails(&mut self, filter: &EmailFilter) -> StoreResult<Vec<Email>> {
        let mut builder = QueryBuilder::<Sqlite>::new(EMAIL_SELECT);
        for (i, (column, value)) in filter_predicates(filter).into_iter().enumerate() {
            builder.push(if i == 0 { " WHERE " } else { " AND " });
            builder.push(column).push(" = ");
            match value {
                BoundValue::Text(text) => builder.push_bind(text),
                BoundValue::Integer(n) => builder.push_bind(n),
                BoundValue::Flag(flag) => builder.push_bind(flag),
            };
        }
        builder.push(NEWEST_FIRST).push_bind(i64::from(filter.limit));

        let conn = self.connection().await?;
        let rows = builder.build().fetch_all(conn).await?;
        Ok(rows
            .iter()
            .map(email_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Substring search over subject and body. `%`, `_` and `\` in `text`
    /// match literally.
    pub async fn search_emails(&mut self, text: &str, limit: u32) -> StoreResult<Vec<Email>> {
        let pattern = format!("%{}%", escape_like(text));
        let sql = format!(
            "{} WHERE e.subject LIKE ? ESCAPE '\\' OR e.body LIKE ? ESCAPE '\\'{}?",
            EMAIL_SELECT, NEWEST_FIRST
        );

        let conn = self.connection().await?;
        let rows = sqlx::query(&sql)
            .bind(&pattern)
            .bind(&pattern)
            .bind(i64::from(limit))
            .fetch_all(conn)
            .await?;
        Ok(rows
            .iter()
            .map(email_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn unread_emails(&mut self, limit: u32) -> StoreResult<Vec<Email>> {
        self.find_emails(&EmailFilter::new().read(false).limit(limit)).await
    }

    pub async fn important_emails(&mut self, limit: u32) -> StoreResult<Vec<Email>> {
        self.find_emails(&EmailFilter::new().important(true).limit(limit)).await
    }

    pub async fn email(&mut self, id: i64) -> StoreResult<Option<Email>> {
        let conn = self.connection().await?;
        let row = sqlx::query(&format!("{} WHERE e.id = ?", EMAIL_SELECT))
            .bind(id)
            .fetch_optional(conn)
            .await?;

        match row {
            Some(r) => Ok(Some(email_from_row(&r)?)),
            None => Ok(None),
        }
    }

    pub async fn list_users(&mut self) -> StoreResult<Vec<User>> {
        let conn = self.connection().await?;
        let users = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT id, name, email FROM users ORDER BY id ASC",
        )
        .fetch_all(conn)
        .await?
        .into_iter()
        .map(|(id, name, email)| User { id, name, email })
        .collect();

        Ok(users)
    }

    pub async fn list_categories(&mut self) -> StoreResult<Vec<Category>> {
        let conn = self.connection().await?;
        let rows = sqlx::query(
            "SELECT id, name, description, color FROM categories ORDER BY name ASC, id ASC",
        )
        .fetch_all(conn)
        .await?;

        let categories = rows
            .iter()
            .map(|row| -> Result<Category, sqlx::Error> {
                let name: String = row.try_get("name")?;
                Ok(Category {
                    id: row.try_get("id")?,
                    display_name: to_title_case(&name),
                    name,
                    description: row.try_get("description")?,
                    color: row.try_get("color")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(categories)
    }

    /// Counters read inside one transaction so they describe the same snapshot.
    pub async fn statistics(&mut self) -> StoreResult<Statistics> {
        let conn = self.connection().await?;
        let mut tx = conn.begin().await?;

        let outcome = async {
            let total_emails: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM emails")
                .fetch_one(&mut *tx)
                .await?;
            let unread: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM emails WHERE is_read = 0")
                .fetch_one(&mut *tx)
                .await?;
            let important: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM emails WHERE is_important = 1")
                    .fetch_one(&mut *tx)
                    .await?;
            let per_category = sqlx::query_as::<_, (String, i64)>(
                "SELECT c.name, COUNT(e.id) AS total
                 FROM categories c
                 LEFT JOIN emails e ON c.id = e.category_id
                 GROUP BY c.id, c.name
                 ORDER BY total DESC, c.name ASC",
            )
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(|(name, count)| CategoryCount { name, count })
            .collect();

            Ok::<_, sqlx::Error>(Statistics {
                total_emails,
                unread,
                important,
                per_category,
            })
        }
        .await;

        finish(tx, outcome).await
    }
}

/// Commits on success. On failure the transaction is rolled back before the
/// error is returned.
async fn finish<T>(
    tx: Transaction<'_, Sqlite>,
    outcome: Result<T, sqlx::Error>,
) -> StoreResult<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            let err = StoreError::from(err);
            if matches!(err, StoreError::Busy(_)) {
                // An awaited ROLLBACK would sit through a second busy wait.
                // Dropping queues it for the next use of the connection.
                drop(tx);
            } else if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

async fn read_schema(path: &Path) -> StoreResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| match source.kind() {
            ErrorKind::NotFound => StoreError::SchemaMissing {
                path: path.to_path_buf(),
                source,
            },
            _ => StoreError::Io(source),
        })
}

async fn init_schema(conn: &mut SqliteConnection, schema: &str) -> StoreResult<()> {
    let mut tx = conn.begin().await?;
    let outcome = sqlx::query(schema).execute(&mut *tx).await.map(|_| ());
    finish(tx, outcome).await
}

#[derive(Debug, Clone, PartialEq)]
enum BoundValue {
    Text(String),
    Integer(i64),
    Flag(bool),
}

/// One `(column, value)` pair per supplied criterion, in a fixed order.
fn filter_predicates(filter: &EmailFilter) -> Vec<(&'static str, BoundValue)> {
    let mut predicates = Vec::new();
    if let Some(recipient) = &filter.recipient {
        predicates.push(("e.recipient", BoundValue::Text(recipient.clone())));
    }
    if let Some(category_id) = filter.category_id {
        predicates.push(("e.category_id", BoundValue::Integer(category_id)));
    }
    if let Some(is_read) = filter.is_read {
        predicates.push(("e.is_read", BoundValue::Flag(is_read)));
    }
    if let Some(is_important) = filter.is_important {
        predicates.push(("e.is_important", BoundValue::Flag(is_important)));
    }
    predicates
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn email_from_row(row: &SqliteRow) -> Result<Email, sqlx::Error> {
    let sent_at_ms: i64 = row.try_get("sent_at")?;
    let sent_at = DateTime::<Utc>::from_timestamp_millis(sent_at_ms).ok_or_else(|| {
        sqlx::Error::Decode(format!("sent_at out of range: {sent_at_ms}").into())
    })?;

    Ok(Email {
        id: row.try_get("id")?,
        sender: row.try_get("sender")?,
        recipient: row.try_get("recipient")?,
        subject: row.try_get("subject")?,
        body: row.try_get("body")?,
        category_id: row.try_get("category_id")?,
        category_name: row.try_get("category_name")?,
        sent_at,
        is_read: row.try_get("is_read")?,
        is_important: row.try_get("is_important")?,
        is_archived: row.try_get("is_archived")?,
    })
}
