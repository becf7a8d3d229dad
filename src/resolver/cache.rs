//! Best-effort cache for resolver steps: a miss always falls through to the
//! live lookup, so this never needs to be strongly consistent.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

use crate::sqlite_persistence::versioned_schema::{Column, SqlType, Table, VersionedSchema};

const RESOLVER_CACHE_TABLE: Table = Table {
    name: "resolver_cache",
    columns: &[
        Column {
            name: "cache_key",
            sql_type: &SqlType::Text,
            is_primary_key: true,
            non_null: true,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "payload",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: true,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
        Column {
            name: "expires_at",
            sql_type: &SqlType::Integer,
            is_primary_key: false,
            non_null: true,
            is_unique: false,
            default_value: None,
            foreign_key: None,
        },
    ],
    indices: &[],
    unique_constraints: &[],
};

const SCHEMA: VersionedSchema = VersionedSchema {
    version: 1,
    tables: &[RESOLVER_CACHE_TABLE],
    migration: None,
};

pub struct ResolverCache {
    conn: Mutex<Connection>,
}

impl ResolverCache {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1",
                params![RESOLVER_CACHE_TABLE.name],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !exists {
            SCHEMA.create(&conn)?;
        }
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        SCHEMA.create(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str, now_unix: i64) -> Option<T> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT payload, expires_at FROM resolver_cache WHERE cache_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .ok()
            .flatten();
        let (payload, expires_at) = row?;
        if expires_at <= now_unix {
            return None;
        }
        serde_json::from_str(&payload).ok()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T, expires_at: i64) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO resolver_cache (cache_key, payload, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(cache_key) DO UPDATE SET payload = excluded.payload, expires_at = excluded.expires_at",
            params![key, payload, expires_at],
        )?;
        Ok(())
    }
}
