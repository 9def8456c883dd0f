use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::warn;

use crate::error::CacheError;

// ─── In-memory layer ─────────────────────────────────────────────────────────

struct MemoryEntry {
    value: Value,
    inserted_at: Instant,
    last_used: u64,
}

struct MemoryInner {
    entries: HashMap<String, MemoryEntry>,
    tick: u64,
}

/// Bounded TTL map; evicts the least recently used entry when full.
pub struct MemoryCache {
    inner: Mutex<MemoryInner>,
    capacity: usize,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                entries: HashMap::new(),
                tick: 0,
            }),
            capacity,
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;

        let expired = match inner.entries.get_mut(key) {
            None => return None,
            Some(entry) if entry.inserted_at.elapsed() >= self.ttl => true,
            Some(entry) => {
                entry.last_used = tick;
                return Some(entry.value.clone());
            }
        };
        if expired {
            inner.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: &str, value: Value) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;

        if !inner.entries.contains_key(key) && inner.entries.len() >= self.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
            }
        }

        inner.entries.insert(
            key.to_owned(),
            MemoryEntry {
                value,
                inserted_at: Instant::now(),
                last_used: tick,
            },
        );
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

// ─── SQLite layer ────────────────────────────────────────────────────────────

/// Persistent `api_cache` table keyed by the full request URL.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, CacheError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;

             CREATE TABLE IF NOT EXISTS api_cache (
                 url          TEXT PRIMARY KEY,
                 json         TEXT NOT NULL,
                 created_at   TEXT NOT NULL,
                 last_hit_at  TEXT NOT NULL
             );",
        )?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Looks up `url` and bumps its `last_hit_at` on a hit.
    pub fn get(&self, url: &str) -> Result<Option<Value>, CacheError> {
        let conn = self.conn.lock();
        let json: Option<String> = conn
            .query_row("SELECT json FROM api_cache WHERE url = ?1", params![url], |row| {
                row.get(0)
            })
            .optional()?;

        let Some(json) = json else {
            return Ok(None);
        };
        conn.execute(
            "UPDATE api_cache SET last_hit_at = ?1 WHERE url = ?2",
            params![Utc::now().to_rfc3339(), url],
        )?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    pub fn upsert(&self, url: &str, value: &Value) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)?;
        let now = Utc::now().to_rfc3339();
        self.conn.lock().execute(
            "INSERT INTO api_cache (url, json, created_at, last_hit_at) VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(url) DO UPDATE SET json = excluded.json, last_hit_at = excluded.last_hit_at",
            params![url, json, now],
        )?;
        Ok(())
    }
}

// ─── Combined lookup ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheHit {
    Memory,
    Database,
}

/// Memory first, then SQLite. Database failures are logged and treated as misses.
pub struct ResponseCache {
    memory: MemoryCache,
    store: Option<SqliteStore>,
}

impl ResponseCache {
    pub fn new(memory: MemoryCache, store: Option<SqliteStore>) -> Self {
        Self { memory, store }
    }

    #[cfg(test)]
    pub fn memory_only(capacity: usize, ttl: Duration) -> Self {
        Self::new(MemoryCache::new(capacity, ttl), None)
    }

    pub fn get(&self, url: &str) -> Option<(Value, CacheHit)> {
        if let Some(value) = self.memory.get(url) {
            return Some((value, CacheHit::Memory));
        }

        let store = self.store.as_ref()?;
        match store.get(url) {
            Ok(Some(value)) => {
                self.memory.insert(url, value.clone());
                Some((value, CacheHit::Database))
            }
            Ok(None) => None,
            Err(e) => {
                warn!("[CACHE] lookup failed, treating as miss: {}", e);
                None
            }
        }
    }

    pub fn put(&self, url: &str, value: &Value) {
        self.memory.insert(url, value.clone());
        if let Some(store) = &self.store {
            if let Err(e) = store.upsert(url, value) {
                warn!("[CACHE] failed to persist {}: {}", url, e);
            }
        }
    }
}
