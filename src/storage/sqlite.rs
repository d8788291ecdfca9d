//! SQLite storage backend

use super::traits::{OpenStore, RegistryStore, StorageError, StorageResult, StoreTransaction};
use crate::registry::{Grant, GrantId, NaturalKey, OrgId, Organization};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

const ORG_COLUMNS: &str =
    "id, registry, external_id, name, country, website, city, region, created_at, updated_at";

/// How long a write waits for another connection's lock before failing
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

const GRANT_COLUMNS: &str =
    "id, funder_org_id, grantee_org_id, amount, year, source, created_at";

/// SQLite-backed registry store
///
/// Uses a single SQLite database file with one table per entity.
/// Thread-safe via internal mutex on the connection; an open transaction
/// holds the mutex until it commits or is dropped.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- Organizations, unique per natural key
            CREATE TABLE IF NOT EXISTS organizations (
                id TEXT PRIMARY KEY,
                registry TEXT NOT NULL,
                external_id TEXT NOT NULL,
                name TEXT NOT NULL,
                country TEXT,
                website TEXT,
                city TEXT,
                region TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CONSTRAINT uq_org_registry_external_id UNIQUE (registry, external_id)
            );

            -- Grants link two existing organizations
            CREATE TABLE IF NOT EXISTS grants (
                id TEXT PRIMARY KEY,
                funder_org_id TEXT NOT NULL,
                grantee_org_id TEXT NOT NULL,
                amount TEXT,
                year INTEGER,
                source TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                FOREIGN KEY (funder_org_id) REFERENCES organizations(id),
                FOREIGN KEY (grantee_org_id) REFERENCES organizations(id)
            );

            CREATE INDEX IF NOT EXISTS ix_grants_funder
                ON grants(funder_org_id);
            CREATE INDEX IF NOT EXISTS ix_grants_grantee
                ON grants(grantee_org_id);
            CREATE INDEX IF NOT EXISTS ix_grants_funder_grantee
                ON grants(funder_org_id, grantee_org_id);

            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- Readers see the last committed batch while a batch is written
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Open or create a store at `path`, waiting up to `timeout` for locks
    /// held by other connections before `begin` or `commit` fails with
    /// `DatabaseBusy`.
    pub fn open_with_timeout(path: impl AsRef<Path>, timeout: Duration) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(timeout)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_timeout(path, DEFAULT_STORE_TIMEOUT)
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl RegistryStore for SqliteStore {
    fn begin(&self) -> StorageResult<Box<dyn StoreTransaction + '_>> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteTransaction {
            conn,
            finished: false,
        }))
    }

    fn get_organization(&self, key: &NaturalKey) -> StorageResult<Option<Organization>> {
        let conn = self.lock()?;
        find_organization(&conn, key)
    }

    fn load_organization(&self, id: &OrgId) -> StorageResult<Option<Organization>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM organizations WHERE id = ?1", ORG_COLUMNS),
                params![id.to_string()],
                OrgRow::from_row,
            )
            .optional()?;
        row.map(OrgRow::into_organization).transpose()
    }

    fn count_organizations(&self) -> StorageResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM organizations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn count_grants(&self) -> StorageResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM grants", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn grants_given(&self, funder: &OrgId) -> StorageResult<Vec<Grant>> {
        let conn = self.lock()?;
        grants_where(&conn, "funder_org_id", funder)
    }

    fn grants_received(&self, grantee: &OrgId) -> StorageResult<Vec<Grant>> {
        let conn = self.lock()?;
        grants_where(&conn, "grantee_org_id", grantee)
    }
}

/// An open `BEGIN IMMEDIATE` transaction holding the connection lock.
struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn find_organization(&mut self, key: &NaturalKey) -> StorageResult<Option<Organization>> {
        find_organization(&self.conn, key)
    }

    fn insert_organization(&mut self, org: &Organization) -> StorageResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO organizations (id, registry, external_id, name, country, website, city, region,
                                       created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                org.id.to_string(),
                org.registry,
                org.external_id,
                org.name,
                org.country,
                org.website,
                org.city,
                org.region,
                org.created_at.to_rfc3339(),
                org.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn update_organization(&mut self, org: &Organization) -> StorageResult<()> {
        let changed = self.conn.execute(
            r#"
            UPDATE organizations
            SET name = ?2, country = ?3, website = ?4, city = ?5, region = ?6, updated_at = ?7
            WHERE id = ?1
            "#,
            params![
                org.id.to_string(),
                org.name,
                org.country,
                org.website,
                org.city,
                org.region,
                org.updated_at.to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::OrganizationNotFound(org.id.to_string()));
        }
        Ok(())
    }

    fn insert_grant(&mut self, grant: &Grant) -> StorageResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO grants (id, funder_org_id, grantee_org_id, amount, year, source, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                grant.id.to_string(),
                grant.funder_org_id.to_string(),
                grant.grantee_org_id.to_string(),
                grant.amount.map(|a| a.to_string()),
                grant.year,
                grant.source,
                grant.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> StorageResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "rollback of abandoned transaction failed");
            }
        }
    }
}

fn find_organization(conn: &Connection, key: &NaturalKey) -> StorageResult<Option<Organization>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM organizations WHERE registry = ?1 AND external_id = ?2",
                ORG_COLUMNS
            ),
            params![key.registry, key.external_id],
            OrgRow::from_row,
        )
        .optional()?;
    row.map(OrgRow::into_organization).transpose()
}

fn grants_where(conn: &Connection, column: &str, org: &OrgId) -> StorageResult<Vec<Grant>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM grants WHERE {} = ?1 ORDER BY created_at, rowid",
        GRANT_COLUMNS, column
    ))?;
    let rows = stmt
        .query_map(params![org.to_string()], GrantRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(GrantRow::into_grant).collect()
}

fn parse_uuid(value: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StorageError::InvalidId(format!("{}: {}", value, e)))
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::DateParse(e.to_string()))
}

/// Raw column values of an `organizations` row
struct OrgRow {
    id: String,
    registry: String,
    external_id: String,
    name: String,
    country: Option<String>,
    website: Option<String>,
    city: Option<String>,
    region: Option<String>,
    created_at: String,
    updated_at: String,
}

impl OrgRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            registry: row.get(1)?,
            external_id: row.get(2)?,
            name: row.get(3)?,
            country: row.get(4)?,
            website: row.get(5)?,
            city: row.get(6)?,
            region: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_organization(self) -> StorageResult<Organization> {
        Ok(Organization {
            id: OrgId::from_uuid(parse_uuid(&self.id)?),
            registry: self.registry,
            external_id: self.external_id,
            name: self.name,
            country: self.country,
            website: self.website,
            city: self.city,
            region: self.region,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// Raw column values of a `grants` row
struct GrantRow {
    id: String,
    funder_org_id: String,
    grantee_org_id: String,
    amount: Option<String>,
    year: Option<i32>,
    source: String,
    created_at: String,
}

impl GrantRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            funder_org_id: row.get(1)?,
            grantee_org_id: row.get(2)?,
            amount: row.get(3)?,
            year: row.get(4)?,
            source: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_grant(self) -> StorageResult<Grant> {
        let amount = self
            .amount
            .map(|a| Decimal::from_str(&a).map_err(|e| StorageError::DecimalParse(format!("{}: {}", a, e))))
            .transpose()?;
        Ok(Grant {
            id: GrantId::from_uuid(parse_uuid(&self.id)?),
            funder_org_id: OrgId::from_uuid(parse_uuid(&self.funder_org_id)?),
            grantee_org_id: OrgId::from_uuid(parse_uuid(&self.grantee_org_id)?),
            amount,
            year: self.year,
            source: self.source,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}
