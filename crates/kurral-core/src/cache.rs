//! Content-addressed tool-stub cache.
//!
//! Replay never re-executes a tool: it looks the call up here by cache key.
//! Entries expire after a TTL and are removed lazily on read; there is no
//! background eviction thread.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use kurral_types::{Artifact, EffectType, ToolCall, ToolStatus};

/// Default entry time-to-live in seconds.
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Replayable payload of one recorded tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolStub {
    pub tool_name: String,
    pub input: Value,
    pub output: Value,
    pub status: ToolStatus,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    pub effect_type: EffectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,
}

impl ToolStub {
    /// Build the stub for a recorded call. Returns `None` when the call has
    /// nothing replayable (no key, or neither input nor output recorded).
    pub fn from_tool_call(call: &ToolCall) -> Option<Self> {
        if call.cache_key.is_empty() {
            return None;
        }
        if call.input.is_null() && call.output.is_null() {
            return None;
        }
        Some(Self {
            tool_name: call.tool_name.clone(),
            input: call.input.clone(),
            output: call.output.clone(),
            status: call.status,
            latency_ms: call.latency_ms,
            summary: call.summary.clone(),
            error_text: call.error_text.clone(),
            effect_type: call.effect_type,
            output_hash: call.output_hash.clone(),
        })
    }
}

/// One stored cache record with its validity window
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub stub: ToolStub,
    pub created_at: u64,
    pub expires_at: u64,
}

/// Cache population counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
}

/// Stub store interface consumed by the replay engine and the MCP proxy.
///
/// `get` on a missing or expired key is absence, not an error; `prime` on an
/// existing key overwrites.
pub trait CacheBackend: Send + Sync {
    fn prime(&self, key: &str, stub: ToolStub) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<ToolStub>>;
    fn evict(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
    fn stats(&self) -> Result<CacheStats>;
}

/// Insert a stub for every replayable tool call of a sealed artifact.
/// Returns the number of entries primed.
pub fn prime_from_artifact(cache: &dyn CacheBackend, artifact: &Artifact) -> Result<usize> {
    let mut primed = 0;
    for call in &artifact.tool_calls {
        if let Some(stub) = ToolStub::from_tool_call(call) {
            cache.prime(&call.cache_key, stub)?;
            primed += 1;
        }
    }
    Ok(primed)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Process-wide in-memory cache
pub struct MemoryCache {
    ttl_secs: u64,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECS)
    }
}

impl MemoryCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl_secs,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl CacheBackend for MemoryCache {
    fn prime(&self, key: &str, stub: ToolStub) -> Result<()> {
        let now = unix_now();
        let entry = CacheEntry {
            key: key.to_string(),
            stub,
            created_at: now,
            expires_at: now + self.ttl_secs,
        };
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<ToolStub>> {
        let now = unix_now();
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.expires_at >= now => return Ok(Some(entry.stub.clone())),
                Some(_) => {}
            }
        }
        // Expired: drop it under the write lock and report absence.
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.get(key).is_some_and(|entry| entry.expires_at < now) {
            entries.remove(key);
        }
        Ok(None)
    }

    fn evict(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats> {
        let now = unix_now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let total = entries.len();
        let valid = entries
            .values()
            .filter(|entry| entry.expires_at >= now)
            .count();
        Ok(CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
        })
    }
}

/// SQLite-backed cache for runs that outlive the process
pub struct SqliteCache {
    ttl_secs: u64,
    conn: Mutex<Connection>,
}

impl SqliteCache {
    pub fn open(db_path: &Path, ttl_secs: u64) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let cache = Self {
            ttl_secs,
            conn: Mutex::new(conn),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    pub fn open_in_memory(ttl_secs: u64) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self {
            ttl_secs,
            conn: Mutex::new(conn),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache (
                cache_key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cache_expires_at ON cache(expires_at);
            "#,
        )?;
        Ok(())
    }

    /// Drop every expired row. Returns the number removed.
    pub fn cleanup_expired(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let removed = conn.execute("DELETE FROM cache WHERE expires_at < ?1", params![unix_now() as i64])?;
        Ok(removed)
    }
}

impl CacheBackend for SqliteCache {
    fn prime(&self, key: &str, stub: ToolStub) -> Result<()> {
        let payload = serde_json::to_string(&stub)?;
        let now = unix_now();
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT OR REPLACE INTO cache (cache_key, payload, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, payload, now as i64, (now + self.ttl_secs) as i64],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<ToolStub>> {
        let now = unix_now();
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT payload, expires_at FROM cache WHERE cache_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((payload, expires_at)) = row else {
            return Ok(None);
        };
        let expires_at = expires_at as u64;
        if expires_at < now {
            conn.execute("DELETE FROM cache WHERE cache_key = ?1", params![key])?;
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&payload)?))
    }

    fn evict(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute("DELETE FROM cache WHERE cache_key = ?1", params![key])?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute("DELETE FROM cache", [])?;
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats> {
        let now = unix_now();
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        let valid: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cache WHERE expires_at >= ?1",
            params![now as i64],
            |row| row.get(0),
        )?;
        Ok(CacheStats {
            total_entries: total as usize,
            valid_entries: valid as usize,
            expired_entries: (total - valid) as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn sample_call() -> ToolCall {
        let now = Utc::now();
        ToolCall::new(
            "calculator",
            json!({"op": "add", "a": 2, "b": 3}),
            json!({"result": 5}),
            EffectType::Other,
            ToolStatus::Ok,
            now,
            now,
        )
    }

    fn backends() -> Vec<Box<dyn CacheBackend>> {
        vec![
            Box::new(MemoryCache::default()),
            Box::new(SqliteCache::open_in_memory(DEFAULT_TTL_SECS).unwrap()),
        ]
    }

    #[test]
    fn test_prime_get_roundtrip() {
        let call = sample_call();
        let stub = ToolStub::from_tool_call(&call).unwrap();
        for cache in backends() {
            cache.prime(&call.cache_key, stub.clone()).unwrap();
            let fetched = cache.get(&call.cache_key).unwrap().unwrap();
            assert_eq!(fetched, stub);
        }
    }

    #[test]
    fn test_missing_key_is_absence() {
        for cache in backends() {
            assert!(cache.get("no-such-key").unwrap().is_none());
        }
    }

    #[test]
    fn test_prime_overwrites() {
        let call = sample_call();
        let mut stub = ToolStub::from_tool_call(&call).unwrap();
        for cache in backends() {
            cache.prime(&call.cache_key, stub.clone()).unwrap();
            stub.output = json!({"result": 6});
            cache.prime(&call.cache_key, stub.clone()).unwrap();
            let fetched = cache.get(&call.cache_key).unwrap().unwrap();
            assert_eq!(fetched.output, json!({"result": 6}));
            assert_eq!(cache.stats().unwrap().total_entries, 1);
        }
    }

    #[test]
    fn test_expired_entry_reads_as_absent() {
        let call = sample_call();
        let stub = ToolStub::from_tool_call(&call).unwrap();
        let memory = MemoryCache::new(0);
        memory.prime(&call.cache_key, stub.clone()).unwrap();
        // TTL of zero expires on the next second boundary; force it.
        {
            let mut entries = memory.entries.write().unwrap();
            entries.get_mut(&call.cache_key).unwrap().expires_at = 0;
        }
        assert!(memory.get(&call.cache_key).unwrap().is_none());
        assert_eq!(memory.stats().unwrap().total_entries, 0);
    }

    #[test]
    fn test_evict_and_clear() {
        let call = sample_call();
        let stub = ToolStub::from_tool_call(&call).unwrap();
        for cache in backends() {
            cache.prime(&call.cache_key, stub.clone()).unwrap();
            cache.prime("other", stub.clone()).unwrap();
            cache.evict(&call.cache_key).unwrap();
            assert!(cache.get(&call.cache_key).unwrap().is_none());
            assert!(cache.get("other").unwrap().is_some());
            cache.clear().unwrap();
            assert_eq!(cache.stats().unwrap().total_entries, 0);
        }
    }

    #[test]
    fn test_stub_requires_replayable_payload() {
        let now = Utc::now();
        let empty = ToolCall::new(
            "noop",
            Value::Null,
            Value::Null,
            EffectType::Other,
            ToolStatus::Ok,
            now,
            now,
        );
        assert!(ToolStub::from_tool_call(&empty).is_none());

        let input_only = ToolCall::new(
            "fire_and_forget",
            json!({"msg": "hi"}),
            Value::Null,
            EffectType::Http,
            ToolStatus::Ok,
            now,
            now,
        );
        assert!(ToolStub::from_tool_call(&input_only).is_some());
    }

    #[test]
    fn test_prime_from_artifact_inserts_replayable_calls() {
        use kurral_types::{DeterminismReport, OpenArtifact};

        let now = Utc::now();
        let mut open = OpenArtifact::new("run-1", "tenant-1");
        open.record_tool_call(sample_call());
        open.record_tool_call(ToolCall::new(
            "noop",
            Value::Null,
            Value::Null,
            EffectType::Other,
            ToolStatus::Ok,
            now,
            now,
        ));
        let artifact = open.seal(DeterminismReport::default()).unwrap();

        let cache = MemoryCache::default();
        let primed = prime_from_artifact(&cache, &artifact).unwrap();
        assert_eq!(primed, 1, "only replayable calls are primed");
        let stub = cache
            .get(&artifact.tool_calls[0].cache_key)
            .unwrap()
            .unwrap();
        assert_eq!(stub.output, json!({"result": 5}));
    }

    #[test]
    fn test_sqlite_cleanup_expired() {
        let cache = SqliteCache::open_in_memory(DEFAULT_TTL_SECS).unwrap();
        let call = sample_call();
        let stub = ToolStub::from_tool_call(&call).unwrap();
        cache.prime(&call.cache_key, stub).unwrap();
        {
            let conn = cache.conn.lock().unwrap();
            conn.execute("UPDATE cache SET expires_at = 0", []).unwrap();
        }
        assert_eq!(cache.cleanup_expired().unwrap(), 1);
        assert_eq!(cache.stats().unwrap().total_entries, 0);
    }
}
