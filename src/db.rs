use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;

use anyhow::Result;
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use tokio::sync::Mutex;

use crate::config::App;
use crate::locator::Locator;
use crate::model::{Highlight, PageRecord, PageUrl};
use crate::store::{HighlightRemoval, HighlightStore};

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const MIGRATIONS: &[(&str, &str)] = &[("001_schema.sql", include_str!("migrations/001_schema.sql"))];

pub struct Database {
    db: LibsqlDatabase,
    conn: Connection,
    tx_lock: Mutex<()>,
    replica: bool,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Pushes local writes to, and pulls remote ones from, the primary.
    /// A local-only database has nothing to sync.
    pub async fn sync(&self) -> Result<()> {
        if self.replica {
            self.db
                .sync()
                .await
                .map_err(|e| anyhow::anyhow!("sync failed: {}", e))?;
        }
        Ok(())
    }

    pub fn is_synced(&self) -> bool {
        self.replica
    }

    pub async fn open(app: &App, data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(app.get_db());

        let (db, replica) = match (&app.turso_url, &app.turso_auth_token) {
            (Some(url), Some(token)) => {
                tracing::info!("[db] running in synced database mode (offline writes)");
                let db = Builder::new_synced_database(&path, url.clone(), token.clone())
                    .build()
                    .await?;
                (db, true)
            }
            _ => (Builder::new_local(&path).build().await?, false),
        };

        Self::init(db, replica).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::init(db, false).await
    }

    async fn init(db: LibsqlDatabase, replica: bool) -> Result<Self> {
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(Database {
            db,
            conn,
            tx_lock: Mutex::new(()),
            replica,
        })
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    async fn in_transaction<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        let _guard = self.tx_lock.lock().await;

        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        match work.await {
            Ok(value) => {
                self.conn.execute("COMMIT", ()).await?;
                Ok(value)
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    async fn load_highlights(&self, url: &PageUrl) -> Result<Vec<Highlight>> {
        let query = r#"
            SELECT id, text, locator
            FROM highlights
            WHERE page_url = ?
            ORDER BY seq ASC
        "#;

        let mut rows = self.conn.query(query, libsql::params![url.as_str()]).await?;
        let mut highlights = Vec::new();

        while let Some(row) = rows.next().await? {
            highlights.push(Highlight {
                id: row.get(0)?,
                text: row.get(1)?,
                locator: Locator::new(row.get::<String>(2)?),
            });
        }

        Ok(highlights)
    }

    async fn highlight_exists(&self, url: &PageUrl, id: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM highlights WHERE page_url = ? AND id = ?",
                libsql::params![url.as_str(), id],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    async fn active_id(&self, url: &PageUrl) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT active_highlight_id FROM pages WHERE url = ?",
                libsql::params![url.as_str()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<Option<String>>(0)?),
            None => Ok(None),
        }
    }

    async fn upsert_internal(&self, url: &PageUrl, record: &PageRecord) -> Result<()> {
        let active = record.active().map(|h| h.id.clone());
        if active.is_none() && record.active_highlight_id.is_some() {
            tracing::warn!(url = %url, "active highlight id does not name a stored highlight, clearing it");
        }

        let upsert_page = r#"
            INSERT INTO pages (url, title, active_highlight_id)
            VALUES (?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                active_highlight_id = excluded.active_highlight_id,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        "#;
        self.conn
            .execute(
                upsert_page,
                libsql::params![url.as_str(), record.title.as_str(), active],
            )
            .await?;

        self.conn
            .execute(
                "DELETE FROM highlights WHERE page_url = ?",
                libsql::params![url.as_str()],
            )
            .await?;

        for highlight in &record.highlights {
            self.conn
                .execute(
                    "INSERT INTO highlights (id, page_url, text, locator) VALUES (?, ?, ?, ?)",
                    libsql::params![
                        highlight.id.as_str(),
                        url.as_str(),
                        highlight.text.as_str(),
                        highlight.locator.as_str()
                    ],
                )
                .await?;
        }

        Ok(())
    }

    async fn delete_internal(&self, url: &PageUrl) -> Result<bool> {
        self.conn
            .execute(
                "DELETE FROM highlights WHERE page_url = ?",
                libsql::params![url.as_str()],
            )
            .await?;
        let removed = self
            .conn
            .execute("DELETE FROM pages WHERE url = ?", libsql::params![url.as_str()])
            .await?;
        Ok(removed > 0)
    }

    async fn delete_highlight_internal(&self, url: &PageUrl, id: &str) -> Result<HighlightRemoval> {
        if !self.highlight_exists(url, id).await? {
            return Ok(HighlightRemoval::NotFound);
        }

        let was_active = self.active_id(url).await?.as_deref() == Some(id);

        self.conn
            .execute(
                "DELETE FROM highlights WHERE page_url = ? AND id = ?",
                libsql::params![url.as_str(), id],
            )
            .await?;

        let remaining: i64 = {
            let mut rows = self
                .conn
                .query(
                    "SELECT COUNT(*) FROM highlights WHERE page_url = ?",
                    libsql::params![url.as_str()],
                )
                .await?;
            match rows.next().await? {
                Some(row) => row.get(0)?,
                None => 0,
            }
        };

        if remaining == 0 {
            self.conn
                .execute("DELETE FROM pages WHERE url = ?", libsql::params![url.as_str()])
                .await?;
            return Ok(HighlightRemoval::PageRemoved { was_active });
        }

        if was_active {
            self.conn
                .execute(
                    "UPDATE pages SET active_highlight_id = NULL, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE url = ?",
                    libsql::params![url.as_str()],
                )
                .await?;
        }

        Ok(HighlightRemoval::Removed { was_active })
    }
}

impl HighlightStore for Database {
    async fn get(&self, url: &PageUrl) -> Result<Option<PageRecord>> {
        let page = {
            let mut rows = self
                .conn
                .query(
                    "SELECT title, active_highlight_id FROM pages WHERE url = ?",
                    libsql::params![url.as_str()],
                )
                .await?;
            match rows.next().await? {
                Some(row) => Some((row.get::<String>(0)?, row.get::<Option<String>>(1)?)),
                None => None,
            }
        };

        let Some((title, active_highlight_id)) = page else {
            return Ok(None);
        };

        Ok(Some(PageRecord {
            title,
            active_highlight_id,
            highlights: self.load_highlights(url).await?,
        }))
    }

    async fn get_all(&self) -> Result<BTreeMap<PageUrl, PageRecord>> {
        let mut pages = BTreeMap::new();

        let mut rows = self
            .conn
            .query("SELECT url, title, active_highlight_id FROM pages", ())
            .await?;
        while let Some(row) = rows.next().await? {
            pages.insert(
                PageUrl::from_stored(row.get(0)?),
                PageRecord {
                    title: row.get(1)?,
                    active_highlight_id: row.get(2)?,
                    highlights: Vec::new(),
                },
            );
        }

        let mut rows = self
            .conn
            .query(
                "SELECT page_url, id, text, locator FROM highlights ORDER BY seq ASC",
                (),
            )
            .await?;
        while let Some(row) = rows.next().await? {
            let url = PageUrl::from_stored(row.get(0)?);
            let Some(record) = pages.get_mut(&url) else {
                tracing::warn!(url = %url, "highlight without a page record, skipping");
                continue;
            };
            record.highlights.push(Highlight {
                id: row.get(1)?,
                text: row.get(2)?,
                locator: Locator::new(row.get::<String>(3)?),
            });
        }

        Ok(pages)
    }

    async fn upsert(&self, url: &PageUrl, record: &PageRecord) -> Result<()> {
        if record.is_empty() {
            self.delete(url).await?;
            return Ok(());
        }
        self.in_transaction(self.upsert_internal(url, record)).await
    }

    async fn delete(&self, url: &PageUrl) -> Result<bool> {
        self.in_transaction(self.delete_internal(url)).await
    }

    async fn delete_highlight(&self, url: &PageUrl, id: &str) -> Result<HighlightRemoval> {
        self.in_transaction(self.delete_highlight_internal(url, id)).await
    }

    async fn set_active(&self, url: &PageUrl, id: Option<&str>) -> Result<bool> {
        if let Some(id) = id {
            if !self.highlight_exists(url, id).await? {
                return Ok(false);
            }
        }

        let updated = self
            .conn
            .execute(
                "UPDATE pages SET active_highlight_id = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE url = ?",
                libsql::params![id.map(str::to_string), url.as_str()],
            )
            .await?;
        Ok(updated > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> PageUrl {
        PageUrl::parse(raw).unwrap()
    }

    fn record_with(texts: &[&str]) -> PageRecord {
        let mut record = PageRecord::new("A page");
        for (i, text) in texts.iter().enumerate() {
            record.insert_active(Highlight::new(*text, Locator::new(format!("/html[1]/body[1]/p[{}]", i + 1))));
        }
        record
    }

    #[tokio::test]
    async fn upsert_then_get_returns_the_record() {
        let db = Database::open_in_memory().await.unwrap();
        let page = url("https://example.com/a");
        let record = record_with(&["one", "two"]);

        db.upsert(&page, &record).await.unwrap();
        assert_eq!(db.get(&page).await.unwrap(), Some(record));
        assert_eq!(db.get(&url("https://example.com/b")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn upsert_replaces_the_whole_record() {
        let db = Database::open_in_memory().await.unwrap();
        let page = url("https://example.com/a");
        db.upsert(&page, &record_with(&["one", "two"])).await.unwrap();

        let replacement = record_with(&["three"]);
        db.upsert(&page, &replacement).await.unwrap();
        assert_eq!(db.get(&page).await.unwrap(), Some(replacement));
    }

    #[tokio::test]
    async fn get_all_groups_highlights_by_page() {
        let db = Database::open_in_memory().await.unwrap();
        db.upsert(&url("https://a.example/"), &record_with(&["a1", "a2"])).await.unwrap();
        db.upsert(&url("https://b.example/"), &record_with(&["b1"])).await.unwrap();

        let all = db.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        let texts: Vec<_> = all[&url("https://a.example/")]
            .highlights
            .iter()
            .map(|h| h.text.as_str())
            .collect();
        assert_eq!(texts, vec!["a1", "a2"]);
    }

    #[tokio::test]
    async fn deleting_the_only_highlight_removes_the_page() {
        let db = Database::open_in_memory().await.unwrap();
        let page = url("https://example.com/a");
        let record = record_with(&["only"]);
        let id = record.highlights[0].id.clone();
        db.upsert(&page, &record).await.unwrap();

        let removal = db.delete_highlight(&page, &id).await.unwrap();
        assert_eq!(removal, HighlightRemoval::PageRemoved { was_active: true });
        assert_eq!(db.get(&page).await.unwrap(), None);
        assert!(db.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_the_active_highlight_clears_the_active_slot() {
        let db = Database::open_in_memory().await.unwrap();
        let page = url("https://example.com/a");
        let record = record_with(&["one", "two"]);
        let inactive = record.highlights[0].id.clone();
        let active = record.highlights[1].id.clone();
        db.upsert(&page, &record).await.unwrap();

        let removal = db.delete_highlight(&page, &inactive).await.unwrap();
        assert_eq!(removal, HighlightRemoval::Removed { was_active: false });
        assert_eq!(
            db.get(&page).await.unwrap().unwrap().active_highlight_id.as_deref(),
            Some(active.as_str())
        );

        db.upsert(&page, &record_with(&["x", "y"])).await.unwrap();
        let stored = db.get(&page).await.unwrap().unwrap();
        let active = stored.active_highlight_id.clone().unwrap();
        let removal = db.delete_highlight(&page, &active).await.unwrap();
        assert_eq!(removal, HighlightRemoval::Removed { was_active: true });
        assert_eq!(db.get(&page).await.unwrap().unwrap().active_highlight_id, None);

        assert_eq!(
            db.delete_highlight(&page, "missing").await.unwrap(),
            HighlightRemoval::NotFound
        );
    }

    #[tokio::test]
    async fn set_active_rejects_unknown_highlights() {
        let db = Database::open_in_memory().await.unwrap();
        let page = url("https://example.com/a");
        let record = record_with(&["one", "two"]);
        let first = record.highlights[0].id.clone();
        db.upsert(&page, &record).await.unwrap();

        assert!(!db.set_active(&page, Some("missing")).await.unwrap());
        assert!(db.set_active(&page, Some(&first)).await.unwrap());
        assert_eq!(db.get(&page).await.unwrap().unwrap().active().unwrap().id, first);

        assert!(db.set_active(&page, None).await.unwrap());
        assert_eq!(db.get(&page).await.unwrap().unwrap().active_highlight_id, None);

        assert!(!db.set_active(&url("https://example.com/none"), None).await.unwrap());
    }

    #[tokio::test]
    async fn upserting_an_empty_record_deletes_the_page() {
        let db = Database::open_in_memory().await.unwrap();
        let page = url("https://example.com/a");
        db.upsert(&page, &record_with(&["one"])).await.unwrap();

        db.upsert(&page, &PageRecord::new("A page")).await.unwrap();
        assert_eq!(db.get(&page).await.unwrap(), None);
        assert!(!db.delete(&page).await.unwrap());
    }

    #[tokio::test]
    async fn migrations_are_recorded_once() {
        let db = Database::open_in_memory().await.unwrap();
        for (filename, sql) in MIGRATIONS {
            Database::run_migration(db.connection(), filename, sql).await.unwrap();
        }
        let mut rows = db
            .connection()
            .query("SELECT COUNT(*) FROM _migrations", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, (SYSTEM_MIGRATIONS.len() + MIGRATIONS.len()) as i64);
    }
}
