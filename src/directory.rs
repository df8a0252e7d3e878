//! Business Directory
//!
//! Read-only keyword lookup of local businesses by category, plus the
//! formatting of results into a chat reply. The catalog lives in SQLite.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Reply when a search matches nothing
pub const NO_MATCHES_REPLY: &str =
    "😕 No encontré negocios en esa categoría.\n\nIntenta con otra, por ejemplo: buscar restaurante";

/// A catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Business {
    pub name: String,
    pub category: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl Business {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: None,
            address: None,
            phone: None,
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }

    /// "Name - Address - Phone", skipping blank parts
    pub fn display_line(&self) -> String {
        let mut line = self.name.clone();
        for part in [&self.address, &self.phone].into_iter().flatten() {
            if !part.is_empty() {
                line.push_str(" - ");
                line.push_str(part);
            }
        }
        line
    }
}

/// Directory search contract
pub trait DirectorySearch: Send + Sync {
    /// Active businesses whose category contains `term`, case-insensitive
    fn search_by_category(&self, term: &str) -> Result<Vec<Business>>;
}

/// Format search results for a chat reply
pub fn format_results(businesses: &[Business], term: &str) -> String {
    if businesses.is_empty() {
        return NO_MATCHES_REPLY.to_string();
    }

    let mut reply = format!(
        "🔍 Encontré {} negocio(s) en la categoría \"{}\":\n",
        businesses.len(),
        term
    );
    for (i, business) in businesses.iter().enumerate() {
        reply.push_str(&format!("\n{}. {}", i + 1, business.display_line()));
    }
    reply
}

/// SQLite-backed business catalog
pub struct BusinessDirectory {
    conn: Mutex<Connection>,
}

impl BusinessDirectory {
    /// Open or create the catalog database
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open directory db {}", path.display()))?;
        let directory = Self::from_connection(conn)?;

        info!("Business directory opened: {}", path.display());
        Ok(directory)
    }

    /// In-memory catalog (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // SQLite's LOWER() folds ASCII only
        conn.create_scalar_function(
            "fold_case",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
        )
        .context("Failed to register fold_case")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS businesses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                category TEXT,
                address TEXT,
                phone TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_businesses_category ON businesses(category);
            CREATE INDEX IF NOT EXISTS idx_businesses_is_active ON businesses(is_active);
            CREATE INDEX IF NOT EXISTS idx_businesses_name ON businesses(name);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a business; returns its row id
    pub fn add_business(&self, business: &Business, active: bool) -> Result<i64> {
        let conn = self.conn.lock();
        let now = chrono::Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO businesses (name, category, address, phone, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                business.name,
                business.category,
                business.address,
                business.phone,
                active,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Distinct categories of active businesses
    pub fn categories(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT category FROM businesses
             WHERE is_active = 1 AND category IS NOT NULL
             ORDER BY category",
        )?;
        let categories = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(categories)
    }
}

impl DirectorySearch for BusinessDirectory {
    fn search_by_category(&self, term: &str) -> Result<Vec<Business>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT name, category, address, phone FROM businesses
             WHERE is_active = 1 AND instr(fold_case(category), fold_case(?1)) > 0
             ORDER BY name",
        )?;

        let businesses = stmt
            .query_map(params![term], |row| {
                Ok(Business {
                    name: row.get(0)?,
                    category: row.get(1)?,
                    address: row.get(2)?,
                    phone: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!("Directory search {:?}: {} results", term, businesses.len());
        Ok(businesses)
    }
}
