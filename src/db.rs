use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// A registered dog
/// `name` is fixed at creation as "<firstname> <lastname>"; `age` only ever
/// grows by 1 through the update endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dog {
    /// Stable identity (UUID) - assigned on first save, never changes
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,
    pub breed: String,
    pub age: i64,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Dog {
    pub fn new(name: String, breed: String, age: i64) -> Self {
        Self {
            id: None,
            name,
            breed,
            age,
            created_at: None,
        }
    }

    /// Default record that seeds the tracked state before any create or search
    pub fn placeholder() -> Self {
        Self::new("unknown".to_string(), "unknown".to_string(), 0)
    }

    /// Whether this record has been persisted at least once
    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS dogs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            dog_uuid TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            breed TEXT NOT NULL,
            age INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_dogs_name ON dogs(name)",
        [],
    )?;

    Ok(())
}

/// Persist a dog: insert when it has no identity yet, update in place when it
/// does. The insert path assigns the UUID and creation timestamp.
pub fn save_dog(conn: &Connection, dog: &mut Dog) -> Result<()> {
    match dog.id.clone() {
        Some(id) => {
            conn.execute(
                "UPDATE dogs SET name = ?1, breed = ?2, age = ?3 WHERE dog_uuid = ?4",
                params![dog.name, dog.breed, dog.age, id],
            )?;
        }
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            let now = Utc::now();

            conn.execute(
                "INSERT INTO dogs (dog_uuid, name, breed, age, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, dog.name, dog.breed, dog.age, now.to_rfc3339()],
            )?;

            dog.id = Some(id);
            dog.created_at = Some(now);
        }
    }

    Ok(())
}

fn dog_from_row(row: &rusqlite::Row) -> rusqlite::Result<Dog> {
    let created_at_str: String = row.get(4)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .ok()
        .map(|dt| dt.with_timezone(&Utc));

    Ok(Dog {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        breed: row.get(2)?,
        age: row.get(3)?,
        created_at,
    })
}

/// Find at most one dog by its full display name, newest first
pub fn find_dog_by_name(conn: &Connection, name: &str) -> Result<Option<Dog>> {
    let mut stmt = conn.prepare(
        "SELECT dog_uuid, name, breed, age, created_at
         FROM dogs
         WHERE name = ?1
         ORDER BY id DESC
         LIMIT 1",
    )?;

    let dog = stmt.query_row(params![name], dog_from_row).optional()?;

    Ok(dog)
}

pub fn get_all_dogs(conn: &Connection) -> Result<Vec<Dog>> {
    let mut stmt = conn.prepare(
        "SELECT dog_uuid, name, breed, age, created_at
         FROM dogs
         ORDER BY id DESC",
    )?;

    let dogs = stmt
        .query_map([], dog_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(dogs)
}

pub fn count_dogs(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM dogs", [], |row| row.get(0))?;

    Ok(count)
}
