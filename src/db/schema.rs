/// Tables for the response caches and the key-value blob store.
pub const SCHEMA: &str = r#"
-- Cached responses, one row per (namespace, request key)
CREATE TABLE IF NOT EXISTS response_cache (
    namespace TEXT NOT NULL,
    cache_key TEXT NOT NULL,
    method TEXT NOT NULL,
    target TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (namespace, cache_key)
);

CREATE INDEX IF NOT EXISTS idx_response_cache_namespace
    ON response_cache(namespace);

-- Whole-value blobs addressed by a fixed key (the pending queue lives here)
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
