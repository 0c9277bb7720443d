use super::{PersistError, PropertyId, PropertyStore};
use common::model::property::PropertyRecord;
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS properties (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id      TEXT NOT NULL,
        title         TEXT NOT NULL,
        description   TEXT,
        property_type TEXT NOT NULL,
        listing_type  TEXT NOT NULL,
        status        TEXT NOT NULL,
        price         REAL NOT NULL,
        address       TEXT NOT NULL COLLATE NOCASE,
        city          TEXT NOT NULL COLLATE NOCASE,
        state         TEXT NOT NULL COLLATE NOCASE,
        postal_code   TEXT,
        bedrooms      INTEGER NOT NULL,
        bathrooms     REAL NOT NULL,
        area          REAL NOT NULL,
        amenities     TEXT NOT NULL,
        created_at    TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE (address, city, state, listing_type)
    );
";

/// SQLite-backed property store. One connection, serialized behind a mutex.
pub struct SqlitePropertyStore {
    conn: Mutex<Connection>,
}

impl SqlitePropertyStore {
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn count(&self) -> Result<usize, PersistError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| PersistError::Unavailable("connection lock poisoned".to_string()))?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM properties", [], |row| row.get(0))
            .map_err(|e| PersistError::Unavailable(e.to_string()))?;
        Ok(count as usize)
    }
}

impl PropertyStore for SqlitePropertyStore {
    fn insert(&self, record: &PropertyRecord, owner_id: &str) -> Result<PropertyId, PersistError> {
        let amenities = serde_json::to_string(&record.amenities)
            .map_err(|e| PersistError::Rejected(format!("amenities could not be encoded: {}", e)))?;
        let conn = self
            .conn
            .lock()
            .map_err(|_| PersistError::Unavailable("connection lock poisoned".to_string()))?;

        let inserted = conn.execute(
            "INSERT INTO properties (owner_id, title, description, property_type, listing_type, status,
                                     price, address, city, state, postal_code, bedrooms, bathrooms, area, amenities)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                owner_id,
                record.title,
                record.description,
                record.property_type.as_str(),
                record.listing_type.as_str(),
                record.status.as_str(),
                record.price,
                record.address,
                record.city,
                record.state,
                record.postal_code,
                record.bedrooms,
                record.bathrooms,
                record.area,
                amenities,
            ],
        );

        match inserted {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                Err(PersistError::Rejected(format!(
                    "a {} listing for {}, {}, {} already exists",
                    record.listing_type, record.address, record.city, record.state
                )))
            }
            Err(e) => Err(PersistError::Unavailable(e.to_string())),
        }
    }
}
