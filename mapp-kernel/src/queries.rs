/**
 * QUERIES - Opérations de lecture exposées par l'API
 *
 * RÔLE : Assemble Lab + Grid Builder + agrégateur d'amis pour produire les
 * réponses de l'API (liste des salles, machines, vue rendue d'une salle,
 * test de fraîcheur). Aucune écriture.
 */

use crate::demo::demo_payload;
use crate::directory::Directory;
use crate::error::MappError;
use crate::friends::{friend_presence, summarize_for_room};
use crate::grid::build_room_grid;
use crate::lab::Lab;
use crate::models::RoomView;
use crate::viewer::Viewer;
use serde::Serialize;
use serde_json::Value;

/// Salles du site principal triées par clé : (clé, nom affiché)
pub fn rooms_list(lab: &Lab) -> Result<Vec<(String, Option<String>)>, MappError> {
    let mut rooms = Vec::new();
    for key in lab.room_keys()? {
        let name = lab.store().hget(&key, "name")?;
        rooms.push((key, name));
    }
    Ok(rooms)
}

/// Hostnames d'une ou plusieurs salles (`a,b,c`), ou de toutes avec `all`
pub fn room_machines(lab: &Lab, which: &str) -> Result<Vec<String>, MappError> {
    let room_keys: Vec<String> = if which == "all" {
        lab.room_keys()?
    } else {
        which.split(',').map(str::to_string).collect()
    };

    let mut machines = Vec::new();
    for room_key in &room_keys {
        machines.extend(lab.room_hostnames(room_key)?);
    }
    Ok(machines)
}

/// Réponse de `/api/refresh` : vue réelle ou données de démonstration
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Refresh {
    Live(Box<RoomView>),
    Demo(Value),
}

impl Refresh {
    pub fn is_demo(&self) -> bool {
        matches!(self, Self::Demo(_))
    }
}

pub fn refresh(lab: &Lab, directory: &dyn Directory, viewer: &Viewer, site: &str) -> Result<Refresh, MappError> {
    if viewer.is_anonymous() || site.is_empty() {
        return Ok(Refresh::Demo(demo_payload()));
    }

    let friends = lab.friend_set(viewer)?;
    let grid = match build_room_grid(lab, site, &friends, directory) {
        Ok(grid) => grid,
        Err(MappError::RoomNotFound(room)) => {
            tracing::debug!(room = %room, "[grid] unknown room, serving demo");
            return Ok(Refresh::Demo(demo_payload()));
        }
        Err(e) => return Err(e),
    };

    let presence = friend_presence(lab, viewer, &friends, directory)?;
    let summary = summarize_for_room(presence, &grid.room.key);

    Ok(Refresh::Live(Box::new(RoomView { grid, friends: summary })))
}

/// Le client est-il en retard sur la dernière ingestion ?
pub fn update_available(lab: &Lab, viewer: &Viewer, payload: &Value) -> Result<bool, MappError> {
    if viewer.is_anonymous() {
        return Err(MappError::LoginRequired);
    }
    let client_time = client_timestamp(payload)
        .ok_or_else(|| MappError::Validation("Malformed JSON POST data".into()))?;
    Ok(client_time < lab.last_update()?)
}

/// `timestamp` numérique, ou chaîne numérique
fn client_timestamp(payload: &Value) -> Option<f64> {
    match payload.get("timestamp")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
