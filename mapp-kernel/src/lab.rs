/**
 * LAB - Vue typée du State Store
 *
 * RÔLE : Traduit le schéma clé/valeur (hash de salle, liste des machines,
 * hash par machine, sets d'amis...) en Room / Machine / FriendSet.
 * Aucune mise en cache : chaque appel relit le store.
 */

use crate::models::{Machine, Room};
use crate::store::{keys, StateStore, StoreError};
use crate::viewer::{FriendSet, Viewer};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct Lab {
    store: Arc<dyn StateStore>,
    /// Site dont le set `<site>-rooms` sert de liste globale des salles
    primary_site: String,
}

impl Lab {
    pub fn new(store: Arc<dyn StateStore>, primary_site: impl Into<String>) -> Self {
        Self {
            store,
            primary_site: primary_site.into(),
        }
    }

    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    pub fn primary_site(&self) -> &str {
        &self.primary_site
    }

    /// `None` si la clé n'existe pas ou ne désigne pas un hash de salle
    pub fn room(&self, room_key: &str) -> Result<Option<Room>, StoreError> {
        match self.store.hgetall(room_key) {
            Ok(fields) => Ok(Room::from_fields(&fields)),
            Err(StoreError::WrongType(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Hostnames de la salle, dans l'ordre de chargement
    pub fn room_hostnames(&self, room_key: &str) -> Result<Vec<String>, StoreError> {
        self.store.lrange(&keys::room_machines(room_key))
    }

    /// `None` si la machine n'a pas d'enregistrement exploitable
    pub fn machine(&self, hostname: &str) -> Result<Option<Machine>, StoreError> {
        let fields = self.store.hgetall(hostname)?;
        if fields.is_empty() {
            return Ok(None);
        }
        match Machine::from_fields(hostname, &fields) {
            Ok(machine) => Ok(Some(machine)),
            Err(e) => {
                tracing::warn!(error = %e, "[store] skipping malformed machine record");
                Ok(None)
            }
        }
    }

    /// Machines d'une salle ; un hostname listé deux fois n'est chargé qu'une fois
    pub fn room_machines(&self, room_key: &str) -> Result<Vec<Machine>, StoreError> {
        let mut seen = HashSet::new();
        let mut machines = Vec::new();
        for hostname in self.room_hostnames(room_key)? {
            if !seen.insert(hostname.clone()) {
                continue;
            }
            if let Some(machine) = self.machine(&hostname)? {
                machines.push(machine);
            }
        }
        Ok(machines)
    }

    /// Clés des salles du site principal, triées
    pub fn room_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut room_keys = self.store.smembers(&keys::site_rooms(&self.primary_site))?;
        room_keys.sort();
        Ok(room_keys)
    }

    /// Salles du site principal triées par clé ; les clés orphelines sont ignorées
    pub fn rooms(&self) -> Result<Vec<Room>, StoreError> {
        let mut rooms = Vec::new();
        for room_key in self.room_keys()? {
            match self.room(&room_key)? {
                Some(room) => rooms.push(room),
                None => tracing::warn!(room = %room_key, "[store] room listed without record"),
            }
        }
        rooms.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rooms)
    }

    pub fn friend_set(&self, viewer: &Viewer) -> Result<FriendSet, StoreError> {
        match viewer.id() {
            None => Ok(FriendSet::default()),
            Some(id) => Ok(FriendSet::new(self.store.smembers(&keys::friends(id))?)),
        }
    }

    /// Timestamp Unix de la dernière ingestion ; 0 si jamais mis à jour
    pub fn last_update(&self) -> Result<f64, StoreError> {
        let raw = self.store.get(keys::LAST_UPDATE)?;
        Ok(raw.and_then(|v| v.trim().parse::<f64>().ok()).unwrap_or(0.0))
    }

    pub fn is_authorised(&self, callback_key: &str) -> Result<bool, StoreError> {
        let authorised = self.store.lrange(keys::AUTHORISED_KEYS)?;
        Ok(authorised.iter().any(|k| k == callback_key))
    }
}
