use crate::models::Page;
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::info;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS pages (
    title    TEXT PRIMARY KEY,
    headings TEXT NOT NULL,
    sections TEXT NOT NULL,
    links    TEXT NOT NULL
);";

/// How the store classified one insert attempt. Constraint violations on the
/// title key are reported here; any other failure comes back as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    DuplicateTitle,
}

/// Storage collaborator for committed pages.
///
/// The pipeline's commit worker is the only caller: it brackets work in
/// `begin_batch`/`commit_batch`, looks titles up for duplicate classification,
/// and inserts one page at a time. Lookups must observe rows inserted earlier
/// in the same open batch.
pub trait PageStore {
    fn contains_title(&mut self, title: &str) -> Result<bool>;
    fn insert_page(&mut self, page: &Page) -> Result<InsertOutcome>;
    fn begin_batch(&mut self) -> Result<()>;
    fn commit_batch(&mut self) -> Result<()>;
}

/// Flat row representation of a [`Page`]; sequence fields are JSON-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRow {
    pub title: String,
    pub headings: String,
    pub sections: String,
    pub links: String,
}

/// Pure mapping from the store-agnostic [`Page`] to its row representation.
pub fn page_row(page: &Page) -> Result<PageRow> {
    Ok(PageRow {
        title: page.title.clone(),
        headings: serde_json::to_string(&page.headings).context("failed to encode headings")?,
        sections: serde_json::to_string(&page.sections).context("failed to encode sections")?,
        links: serde_json::to_string(&page.links).context("failed to encode links")?,
    })
}

/// SQLite-backed page store. One connection, owned by the commit worker;
/// extraction workers never touch it.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open page store at: {}", path.display()))?;
        conn.execute_batch(SCHEMA)
            .context("failed to create pages table")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory page store")?;
        conn.execute_batch(SCHEMA)
            .context("failed to create pages table")?;
        Ok(Self { conn })
    }

    /// Case-folded title index for query workloads. Created after the bulk
    /// load so inserts skip index maintenance.
    pub fn create_indices(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE INDEX IF NOT EXISTS page_title_lower ON pages (lower(title));",
            )
            .context("failed to create title index")?;
        info!("created page title index");
        Ok(())
    }

    pub fn page_count(&self) -> Result<u64> {
        let count: u64 = self
            .conn
            .query_row("SELECT count(*) FROM pages", [], |row| row.get(0))
            .context("failed to count pages")?;
        Ok(count)
    }
}

impl PageStore for SqliteStore {
    fn contains_title(&mut self, title: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT 1 FROM pages WHERE title = ?1 LIMIT 1")?;
        let found = stmt
            .exists(params![title])
            .with_context(|| format!("title lookup failed for: {}", title))?;
        Ok(found)
    }

    fn insert_page(&mut self, page: &Page) -> Result<InsertOutcome> {
        let row = page_row(page)?;
        self.conn
            .execute_batch("SAVEPOINT insert_page")
            .context("failed to open insert savepoint")?;

        let result = self
            .conn
            .prepare_cached(
                "INSERT INTO pages (title, headings, sections, links) VALUES (?1, ?2, ?3, ?4)",
            )
            .and_then(|mut stmt| {
                stmt.execute(params![row.title, row.headings, row.sections, row.links])
            });

        match result {
            Ok(_) => {
                self.conn
                    .execute_batch("RELEASE insert_page")
                    .context("failed to release insert savepoint")?;
                Ok(InsertOutcome::Inserted)
            }
            Err(e) => {
                self.conn
                    .execute_batch("ROLLBACK TO insert_page; RELEASE insert_page")
                    .context("failed to roll back insert savepoint")?;
                if is_constraint_violation(&e) {
                    Ok(InsertOutcome::DuplicateTitle)
                } else {
                    Err(e).with_context(|| format!("failed to insert page: {}", page.title))
                }
            }
        }
    }

    fn begin_batch(&mut self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN")
            .context("failed to begin store batch")
    }

    fn commit_batch(&mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .context("failed to commit store batch")
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
