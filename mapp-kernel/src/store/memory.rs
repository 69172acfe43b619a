/**
 * STORE MÉMOIRE - Backend par défaut du kernel MAPP
 *
 * RÔLE :
 * Keyspace en mémoire avec la sémantique Redis dont le kernel dépend
 * (WRONGTYPE, collections vides supprimées, lecture d'une clé absente = vide).
 *
 * FONCTIONNEMENT :
 * - Un seul Mutex sur tout le keyspace : un WriteBatch est appliqué sur une
 *   copie puis publié d'un coup, donc tout ou rien
 * - Snapshot JSON optionnel : chargé au démarrage, réécrit après chaque lot
 */

use super::{StateStore, StoreError, WriteBatch, WriteOp};
use crate::state::{new_state, Shared};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;

/// Valeur stockée sous une clé
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    List(Vec<String>),
    Set(BTreeSet<String>),
}

type Keyspace = HashMap<String, Value>;

pub struct MemoryStore {
    keyspace: Shared<Keyspace>,
    /// Fichier de snapshot, `None` = purement volatile
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            keyspace: new_state(HashMap::new()),
            snapshot: None,
        }
    }

    /// Crée un store persistant ; charge le snapshot s'il existe déjà
    pub fn with_snapshot<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let path = path.into();
        let store = Self {
            keyspace: new_state(HashMap::new()),
            snapshot: Some(path.clone()),
        };
        store.load_from_disk()?;
        tracing::info!(path = %path.display(), keys = store.keyspace.lock().len(), "[store] memory snapshot loaded");
        Ok(store)
    }

    fn load_from_disk(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else { return Ok(()) };
        if !path.exists() {
            return Ok(());
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(());
        }
        let keyspace: Keyspace = serde_json::from_str(&content)?;
        *self.keyspace.lock() = keyspace;
        Ok(())
    }

    fn save_to_disk(&self, keyspace: &Keyspace) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else { return Ok(()) };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(keyspace)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType(key.to_string())
}

fn apply_op(keyspace: &mut Keyspace, op: &WriteOp) -> Result<(), StoreError> {
    match op {
        WriteOp::Set { key, value } => {
            keyspace.insert(key.clone(), Value::Str(value.clone()));
        }
        WriteOp::HSet { key, fields } => {
            let entry = keyspace
                .entry(key.clone())
                .or_insert_with(|| Value::Hash(HashMap::new()));
            let Value::Hash(hash) = entry else { return Err(wrong_type(key)) };
            for (field, value) in fields {
                hash.insert(field.clone(), value.clone());
            }
        }
        WriteOp::Del { keys } => {
            for key in keys {
                keyspace.remove(key);
            }
        }
        WriteOp::RPush { key, values } => {
            let entry = keyspace
                .entry(key.clone())
                .or_insert_with(|| Value::List(Vec::new()));
            let Value::List(list) = entry else { return Err(wrong_type(key)) };
            list.extend(values.iter().cloned());
        }
        WriteOp::SAdd { key, members } => {
            let entry = keyspace
                .entry(key.clone())
                .or_insert_with(|| Value::Set(BTreeSet::new()));
            let Value::Set(set) = entry else { return Err(wrong_type(key)) };
            set.extend(members.iter().cloned());
        }
        WriteOp::SRem { key, members } => {
            let now_empty = match keyspace.get_mut(key) {
                None => false,
                Some(Value::Set(set)) => {
                    for member in members {
                        set.remove(member);
                    }
                    set.is_empty()
                }
                Some(_) => return Err(wrong_type(key)),
            };
            if now_empty {
                keyspace.remove(key);
            }
        }
    }
    Ok(())
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.keyspace.lock().get(key) {
            None => Ok(None),
            Some(Value::Str(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        match self.keyspace.lock().get(key) {
            None => Ok(None),
            Some(Value::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        match self.keyspace.lock().get(key) {
            None => Ok(HashMap::new()),
            Some(Value::Hash(hash)) => Ok(hash.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.keyspace.lock().get(key) {
            None => Ok(Vec::new()),
            Some(Value::List(list)) => Ok(list.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.keyspace.lock().get(key) {
            None => Ok(Vec::new()),
            Some(Value::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        match self.keyspace.lock().get(key) {
            None => Ok(false),
            Some(Value::Set(set)) => Ok(set.contains(member)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn apply(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut keyspace = self.keyspace.lock();

        // Copie de travail : une erreur au milieu du lot ne laisse aucune trace
        let mut staged = keyspace.clone();
        for op in batch.ops() {
            apply_op(&mut staged, op)?;
        }

        self.save_to_disk(&staged)?;
        *keyspace = staged;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_list_set_roundtrip() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch
            .hset("dish", "row", "0")
            .hset("dish", "col", "1")
            .rpush("lab-machines", vec!["dish".into(), "dent".into()])
            .sadd("forresthill-rooms", "lab");
        store.apply(&batch).unwrap();

        assert_eq!(store.hget("dish", "col").unwrap().as_deref(), Some("1"));
        assert_eq!(store.hgetall("dish").unwrap().len(), 2);
        assert_eq!(store.lrange("lab-machines").unwrap(), vec!["dish", "dent"]);
        assert!(store.sismember("forresthill-rooms", "lab").unwrap());
        assert!(store.hgetall("missing").unwrap().is_empty());
        assert!(store.get("last-update").unwrap().is_none());
    }

    #[test]
    fn test_failed_batch_is_not_applied() {
        let store = MemoryStore::new();
        let mut setup = WriteBatch::new();
        setup.set("last-update", "1.0");
        store.apply(&setup).unwrap();

        let mut batch = WriteBatch::new();
        batch.sadd("mapp.sites", "forresthill").hset("last-update", "x", "y");
        let err = store.apply(&batch).unwrap_err();
        assert!(matches!(err, StoreError::WrongType(ref k) if k == "last-update"));

        // le SADD qui précédait l'erreur n'est pas visible
        assert!(store.smembers("mapp.sites").unwrap().is_empty());
        assert_eq!(store.get("last-update").unwrap().as_deref(), Some("1.0"));
    }

    #[test]
    fn test_srem_drops_empty_set() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.sadd("s1-friends", "s2").srem("s1-friends", vec!["s2".into()]);
        store.apply(&batch).unwrap();
        assert!(store.keyspace.lock().get("s1-friends").is_none());
    }

    #[test]
    fn test_snapshot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("store.json");

        {
            let store = MemoryStore::with_snapshot(&path).unwrap();
            let mut batch = WriteBatch::new();
            batch.set("last-update", "42.5").sadd("mapp.sites", "forresthill");
            store.apply(&batch).unwrap();
        }

        let reloaded = MemoryStore::with_snapshot(&path).unwrap();
        assert_eq!(reloaded.get("last-update").unwrap().as_deref(), Some("42.5"));
        assert_eq!(reloaded.smembers("mapp.sites").unwrap(), vec!["forresthill"]);
    }
}
