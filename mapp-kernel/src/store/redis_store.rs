/**
 * STORE REDIS - Backend de production (feature `redis-backend`)
 *
 * Même schéma de clés que les outils d'ingestion historiques : le kernel peut
 * lire une base Redis déjà peuplée. Les lots passent par un pipeline atomique
 * (MULTI/EXEC). Pas de timeout ni de retry : une erreur Redis fait échouer
 * la requête en cours.
 */

use super::{StateStore, StoreError, WriteBatch, WriteOp};
use parking_lot::Mutex;
use redis::Commands;
use std::collections::HashMap;

pub struct RedisStore {
    conn: Mutex<redis::Connection>,
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl RedisStore {
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection()?;
        tracing::info!(url, "[store] connected to redis");
        Ok(Self { conn: Mutex::new(conn) })
    }
}

impl StateStore for RedisStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.conn.lock().get(key)?)
    }

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self.conn.lock().hget(key, field)?)
    }

    fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.conn.lock().hgetall(key)?)
    }

    fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.conn.lock().lrange(key, 0, -1)?)
    }

    fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.conn.lock().smembers(key)?)
    }

    fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self.conn.lock().sismember(key, member)?)
    }

    fn apply(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in batch.ops() {
            match op {
                WriteOp::Set { key, value } => {
                    pipe.set(key, value).ignore();
                }
                WriteOp::HSet { key, fields } => {
                    pipe.hset_multiple(key, fields.as_slice()).ignore();
                }
                WriteOp::Del { keys } => {
                    pipe.del(keys).ignore();
                }
                WriteOp::RPush { key, values } => {
                    pipe.rpush(key, values).ignore();
                }
                WriteOp::SAdd { key, members } => {
                    pipe.sadd(key, members).ignore();
                }
                WriteOp::SRem { key, members } => {
                    pipe.srem(key, members).ignore();
                }
            }
        }

        let mut conn = self.conn.lock();
        pipe.query::<()>(&mut *conn)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
