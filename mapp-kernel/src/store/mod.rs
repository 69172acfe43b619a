/**
 * STATE STORE - Interface clé/valeur unifiée pour le kernel MAPP
 *
 * RÔLE :
 * Ce module définit l'accès minimal au store (scalaires, hash, listes, sets)
 * dont le kernel a besoin. Le store est toujours injecté explicitement :
 * aucun handle global, ce qui permet les doubles de test.
 *
 * FONCTIONNEMENT :
 * - StateStore trait = lectures unitaires + `apply` pour les écritures
 * - WriteBatch = suite ordonnée d'écritures appliquée de façon atomique
 *   (un lecteur ne voit jamais une salle à moitié chargée)
 * - keys = nommage des clés partagé avec les outils d'ingestion historiques
 *
 * BACKENDS :
 * ✅ MemoryStore : keyspace en mémoire + snapshot JSON optionnel
 * ✅ RedisStore  : feature `redis-backend`, batch en MULTI/EXEC
 */

pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis_store;

use std::collections::HashMap;

pub use memory::MemoryStore;

/// Erreurs possibles lors des opérations sur le store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("WRONGTYPE operation against key '{0}'")]
    WrongType(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Une écriture élémentaire, dans l'ordre où elle doit être appliquée
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Set { key: String, value: String },
    HSet { key: String, fields: Vec<(String, String)> },
    Del { keys: Vec<String> },
    RPush { key: String, values: Vec<String> },
    SAdd { key: String, members: Vec<String> },
    SRem { key: String, members: Vec<String> },
}

/// Lot d'écritures atomique (l'équivalent d'un pipeline transactionnel)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Set { key: key.into(), value: value.into() });
        self
    }

    pub fn hset(
        &mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.hset_all(key, vec![(field.into(), value.into())])
    }

    pub fn hset_all(&mut self, key: impl Into<String>, fields: Vec<(String, String)>) -> &mut Self {
        if !fields.is_empty() {
            self.ops.push(WriteOp::HSet { key: key.into(), fields });
        }
        self
    }

    pub fn del<I, S>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if !keys.is_empty() {
            self.ops.push(WriteOp::Del { keys });
        }
        self
    }

    pub fn rpush(&mut self, key: impl Into<String>, values: Vec<String>) -> &mut Self {
        if !values.is_empty() {
            self.ops.push(WriteOp::RPush { key: key.into(), values });
        }
        self
    }

    pub fn sadd(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::SAdd { key: key.into(), members: vec![member.into()] });
        self
    }

    pub fn srem(&mut self, key: impl Into<String>, members: Vec<String>) -> &mut Self {
        if !members.is_empty() {
            self.ops.push(WriteOp::SRem { key: key.into(), members });
        }
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Interface commune que TOUS les backends de store doivent implémenter
///
/// Les lectures d'une clé absente renvoient la valeur vide du type
/// (hash vide, liste vide, `None`), comme Redis.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Liste complète (équivalent `LRANGE key 0 -1`)
    fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError>;

    fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;

    fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Applique toutes les écritures du lot, ou aucune
    fn apply(&self, batch: &WriteBatch) -> Result<(), StoreError>;

    /// Nom du backend pour les logs
    fn backend_name(&self) -> &'static str;
}

/// Nommage des clés du store
pub mod keys {
    pub const SITES: &str = "mapp.sites";
    pub const LAST_UPDATE: &str = "last-update";
    pub const AUTHORISED_KEYS: &str = "authorised-key";

    pub fn room_machines(room_key: &str) -> String {
        format!("{room_key}-machines")
    }

    pub fn site_rooms(site: &str) -> String {
        format!("{site}-rooms")
    }

    pub fn friends(viewer: &str) -> String {
        format!("{viewer}-friends")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_skips_empty_writes() {
        let mut batch = WriteBatch::new();
        batch
            .del(Vec::<String>::new())
            .rpush("room-machines", vec![])
            .srem("x", vec![])
            .hset_all("h", vec![]);
        assert!(batch.is_empty());

        batch.set("last-update", "1.5").sadd("mapp.sites", "forresthill");
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_key_names() {
        assert_eq!(keys::room_machines("6.06"), "6.06-machines");
        assert_eq!(keys::site_rooms("forresthill"), "forresthill-rooms");
        assert_eq!(keys::friends("s1234567"), "s1234567-friends");
    }
}
