//! Redis-backed [`InterfaceStore`].
//!
//! Rows live in `TABLE|key` hashes. Change notifications are JSON arrays
//! `[key, op, field1, value1, ...]` pushed onto the `TABLE@QUEUE` list.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::consumer::{FieldValue, KeyOpFieldsValues, Operation};
use crate::error::{IntfdError, IntfdResult};
use crate::store::InterfaceStore;
use crate::tables::{
    CFG_INTERFACE_TABLE_NAME, STATE_FORWARDING_STATE_TABLE_NAME, TABLE_KEY_SEPARATOR,
    TABLE_QUEUE_SUFFIX,
};

/// Store backed by CONFIG_DB and STATE_DB connections.
pub struct RedisStore {
    config_db: ConnectionManager,
    state_db: ConnectionManager,
}

impl RedisStore {
    /// Connects to CONFIG_DB and STATE_DB.
    pub async fn connect(config: &DatabaseConfig) -> IntfdResult<Self> {
        let config_db = connect_db(config, config.config_db).await?;
        let state_db = connect_db(config, config.state_db).await?;
        info!(
            host = %config.redis_host,
            port = config.redis_port,
            config_db = config.config_db,
            state_db = config.state_db,
            "Connected to Redis"
        );
        Ok(Self {
            config_db,
            state_db,
        })
    }

    fn connection_for(&mut self, table: &str) -> &mut ConnectionManager {
        if table == CFG_INTERFACE_TABLE_NAME {
            &mut self.config_db
        } else {
            &mut self.state_db
        }
    }
}

async fn connect_db(config: &DatabaseConfig, db: u32) -> IntfdResult<ConnectionManager> {
    let uri = format!("redis://{}:{}/{}", config.redis_host, config.redis_port, db);
    let client = redis::Client::open(uri.as_str())
        .map_err(|e| IntfdError::store("open", format!("{}: {}", uri, e)))?;
    client
        .get_connection_manager()
        .await
        .map_err(|e| IntfdError::store("connect", format!("{}: {}", uri, e)))
}

fn table_key(table: &str, key: &str) -> String {
    format!("{}{}{}", table, TABLE_KEY_SEPARATOR, key)
}

/// Parses one queued change: `[key, op, field1, value1, ...]`.
fn parse_change(raw: &str) -> IntfdResult<KeyOpFieldsValues> {
    let items: Vec<String> =
        serde_json::from_str(raw).map_err(|e| IntfdError::store("parse", e.to_string()))?;

    let [key, op, fields @ ..] = items.as_slice() else {
        return Err(IntfdError::store(
            "parse",
            "entry must have at least key and operation",
        ));
    };
    let op = Operation::parse(op)
        .ok_or_else(|| IntfdError::store("parse", format!("unknown operation: {}", op)))?;
    if fields.len() % 2 != 0 {
        return Err(IntfdError::store("parse", "dangling field without value"));
    }

    let fvs = fields
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    Ok(KeyOpFieldsValues::new(key.clone(), op, fvs))
}

#[async_trait]
impl InterfaceStore for RedisStore {
    async fn read_table(&mut self, table: &str) -> IntfdResult<Vec<KeyOpFieldsValues>> {
        let prefix = table_key(table, "");
        let conn = self.connection_for(table);

        let keys: Vec<String> = conn
            .keys(format!("{}*", prefix))
            .await
            .map_err(|e| IntfdError::store("keys", e.to_string()))?;

        let mut entries = Vec::with_capacity(keys.len());
        for redis_key in keys {
            let Some(key) = redis_key.strip_prefix(&prefix) else {
                continue;
            };
            let fvs: BTreeMap<String, String> = conn
                .hgetall(&redis_key)
                .await
                .map_err(|e| IntfdError::store("hgetall", e.to_string()))?;
            entries.push(KeyOpFieldsValues::set(key, fvs.into_iter().collect()));
        }

        debug!(table, count = entries.len(), "Read table");
        Ok(entries)
    }

    async fn poll_changes(
        &mut self,
        table: &str,
        batch_size: usize,
    ) -> IntfdResult<Vec<KeyOpFieldsValues>> {
        let Some(count) = NonZeroUsize::new(batch_size) else {
            return Ok(vec![]);
        };
        let queue = format!("{}{}", table, TABLE_QUEUE_SUFFIX);

        let raw: Option<Vec<String>> = self
            .connection_for(table)
            .lpop(&queue, Some(count))
            .await
            .map_err(|e| IntfdError::store("lpop", e.to_string()))?;

        let mut changes = Vec::new();
        for item in raw.unwrap_or_default() {
            match parse_change(&item) {
                Ok(change) => changes.push(change),
                Err(e) => warn!(table, error = %e, "Dropping malformed change"),
            }
        }
        Ok(changes)
    }

    async fn write_forwarding_state(
        &mut self,
        interface: &str,
        fvs: &[FieldValue],
    ) -> IntfdResult<()> {
        let key = table_key(STATE_FORWARDING_STATE_TABLE_NAME, interface);
        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        if !fvs.is_empty() {
            pipe.hset_multiple(&key, fvs).ignore();
        }

        let _: () = pipe
            .query_async(self.connection_for(STATE_FORWARDING_STATE_TABLE_NAME))
            .await
            .map_err(|e| IntfdError::store("write", e.to_string()))?;
        Ok(())
    }

    async fn delete_forwarding_state(&mut self, interface: &str) -> IntfdResult<()> {
        let key = table_key(STATE_FORWARDING_STATE_TABLE_NAME, interface);
        let _: () = self
            .connection_for(STATE_FORWARDING_STATE_TABLE_NAME)
            .del(&key)
            .await
            .map_err(|e| IntfdError::store("del", e.to_string()))?;
        Ok(())
    }
}
