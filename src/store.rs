use crate::error::{Result, WeatherError};
use crate::types::Location;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// How `list` narrows the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFilter {
    All,
    Preset,
    User,
}

impl TypeFilter {
    pub fn parse(s: &str) -> TypeFilter {
        match s {
            "preset" => TypeFilter::Preset,
            "user" => TypeFilter::User,
            _ => TypeFilter::All,
        }
    }
}

/// Aggregate counts over the locations collection.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub total: u64,
    pub presets: u64,
    pub user_generated: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Storage trait for location metadata.
///
/// `upsert` is last-write-wins with no optimistic-concurrency check, and the
/// store — not the caller — stamps `last_updated` on every write. That stamp
/// is what drives cache freshness.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Location>>;
    async fn upsert(&self, loc: &Location) -> Result<()>;
    async fn list(&self, limit: usize, filter: TypeFilter) -> Result<Vec<Location>>;
    async fn stats(&self) -> Result<StoreStats>;
}

/// In-memory store for development/testing.
pub struct InMemoryStore {
    locations: Arc<Mutex<HashMap<String, Location>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            locations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Seeds a record verbatim, keeping the caller's `last_updated`. Test
    /// setup needs this to simulate stale cache entries; `upsert` would
    /// re-stamp the clock.
    pub fn seed(&self, loc: Location) {
        let mut locations = self.locations.lock().unwrap();
        locations.insert(loc.id.clone(), loc);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Location>> {
        let locations = self.locations.lock().unwrap();
        Ok(locations.get(id).cloned())
    }

    async fn upsert(&self, loc: &Location) -> Result<()> {
        if loc.id.is_empty() {
            return Err(WeatherError::Persistence("location id is required".into()));
        }
        let mut stored = loc.clone();
        stored.last_updated = Utc::now();

        let mut locations = self.locations.lock().unwrap();
        locations.insert(stored.id.clone(), stored);
        debug!("Upserted location: {}", loc.id);
        Ok(())
    }

    async fn list(&self, limit: usize, filter: TypeFilter) -> Result<Vec<Location>> {
        let locations = self.locations.lock().unwrap();
        let mut locs: Vec<Location> = locations
            .values()
            .filter(|l| match filter {
                TypeFilter::All => true,
                TypeFilter::Preset => l.is_preset,
                TypeFilter::User => !l.is_preset,
            })
            .cloned()
            .collect();

        // Most recently updated first
        locs.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        if limit > 0 {
            locs.truncate(limit);
        }
        Ok(locs)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let locations = self.locations.lock().unwrap();
        let total = locations.len() as u64;
        let presets = locations.values().filter(|l| l.is_preset).count() as u64;
        let last_updated = locations.values().map(|l| l.last_updated).max();
        Ok(StoreStats {
            total,
            presets,
            user_generated: total - presets,
            last_updated,
        })
    }
}

/// SQLite-backed store. rusqlite connections are not `Sync`, so the single
/// connection sits behind a mutex; write volume here is a handful of rows
/// per pipeline run.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS locations (
                id           TEXT PRIMARY KEY,
                name         TEXT NOT NULL,
                category     TEXT NOT NULL DEFAULT '',
                city_query   TEXT NOT NULL DEFAULT '',
                image_url    TEXT NOT NULL DEFAULT '',
                video_url    TEXT NOT NULL DEFAULT '',
                is_preset    INTEGER NOT NULL DEFAULT 0,
                last_updated TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_location(row: &rusqlite::Row<'_>) -> rusqlite::Result<Location> {
        let updated: String = row.get(7)?;
        Ok(Location {
            id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            city_query: row.get(3)?,
            image_url: row.get(4)?,
            video_url: row.get(5)?,
            is_preset: row.get::<_, i64>(6)? != 0,
            last_updated: updated
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC),
        })
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn get(&self, id: &str) -> Result<Option<Location>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, category, city_query, image_url, video_url, is_preset, last_updated
             FROM locations WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_location(row)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, loc: &Location) -> Result<()> {
        if loc.id.is_empty() {
            return Err(WeatherError::Persistence("location id is required".into()));
        }
        let now = Utc::now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO locations (id, name, category, city_query, image_url, video_url, is_preset, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name=excluded.name,
                category=excluded.category,
                city_query=excluded.city_query,
                image_url=excluded.image_url,
                video_url=excluded.video_url,
                is_preset=excluded.is_preset,
                last_updated=excluded.last_updated",
            params![
                loc.id,
                loc.name,
                loc.category,
                loc.city_query,
                loc.image_url,
                loc.video_url,
                loc.is_preset as i64,
                now.to_rfc3339(),
            ],
        )?;
        debug!("Upserted location: {}", loc.id);
        Ok(())
    }

    async fn list(&self, limit: usize, filter: TypeFilter) -> Result<Vec<Location>> {
        let conn = self.conn.lock().unwrap();
        let where_clause = match filter {
            TypeFilter::All => "",
            TypeFilter::Preset => "WHERE is_preset = 1",
            TypeFilter::User => "WHERE is_preset = 0",
        };
        let sql = format!(
            "SELECT id, name, category, city_query, image_url, video_url, is_preset, last_updated
             FROM locations {where_clause} ORDER BY last_updated DESC LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let limit = if limit == 0 { i64::MAX } else { limit as i64 };
        let rows = stmt.query_map(params![limit], Self::row_to_location)?;

        let mut locs = Vec::new();
        for row in rows {
            locs.push(row?);
        }
        Ok(locs)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM locations", [], |r| r.get(0))?;
        let presets: i64 = conn.query_row(
            "SELECT COUNT(*) FROM locations WHERE is_preset = 1",
            [],
            |r| r.get(0),
        )?;
        let last: Option<String> =
            conn.query_row("SELECT MAX(last_updated) FROM locations", [], |r| r.get(0))?;

        Ok(StoreStats {
            total: total as u64,
            presets: presets as u64,
            user_generated: (total - presets) as u64,
            last_updated: last.and_then(|s| s.parse::<DateTime<Utc>>().ok()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, preset: bool) -> Location {
        Location {
            id: id.to_string(),
            name: id.to_string(),
            category: "General".to_string(),
            city_query: id.to_string(),
            image_url: String::new(),
            video_url: String::new(),
            is_preset: preset,
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_stamps_last_updated() {
        let store = InMemoryStore::new();
        let mut loc = sample("paris", false);
        loc.last_updated = Utc::now() - chrono::Duration::days(30);
        store.upsert(&loc).await.unwrap();

        let stored = store.get("paris").await.unwrap().unwrap();
        assert!(Utc::now() - stored.last_updated < chrono::Duration::seconds(5));
    }

    #[tokio::test]
    async fn upsert_rejects_empty_id() {
        let store = InMemoryStore::new();
        let loc = sample("", false);
        assert!(store.upsert(&loc).await.is_err());
    }

    #[tokio::test]
    async fn list_filters_and_orders_by_recency() {
        let store = InMemoryStore::new();
        store.upsert(&sample("older", true)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.upsert(&sample("newer", true)).await.unwrap();
        store.upsert(&sample("adhoc", false)).await.unwrap();

        let presets = store.list(10, TypeFilter::Preset).await.unwrap();
        assert_eq!(presets.len(), 2);
        assert_eq!(presets[0].id, "newer");

        let users = store.list(10, TypeFilter::User).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, "adhoc");
    }

    #[tokio::test]
    async fn sqlite_round_trip_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("test.db")).unwrap();

        store.upsert(&sample("tokyo", true)).await.unwrap();
        store.upsert(&sample("lima", false)).await.unwrap();

        let loc = store.get("tokyo").await.unwrap().unwrap();
        assert_eq!(loc.name, "tokyo");
        assert!(loc.is_preset);
        assert!(store.get("missing").await.unwrap().is_none());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.presets, 1);
        assert_eq!(stats.user_generated, 1);
        assert!(stats.last_updated.is_some());
    }

    #[tokio::test]
    async fn sqlite_upsert_overwrites_existing_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("test.db")).unwrap();

        let mut loc = sample("rome", false);
        store.upsert(&loc).await.unwrap();
        loc.image_url = "https://cdn.example/rome.png".to_string();
        loc.is_preset = true;
        store.upsert(&loc).await.unwrap();

        let stored = store.get("rome").await.unwrap().unwrap();
        assert_eq!(stored.image_url, "https://cdn.example/rome.png");
        assert!(stored.is_preset);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 1);
    }
}
