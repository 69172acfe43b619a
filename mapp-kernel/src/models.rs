/**
 * MODÈLES MAPP - Enregistrements typés des salles, machines et vues dérivées
 *
 * RÔLE : Remplace les dictionnaires du store (hash clé → champs) par des structs
 * explicites. Conversion aller/retour avec les champs de hash du State Store.
 *
 * VUES DÉRIVÉES : GridCell et RoomGrid ne sont jamais persistées, elles sont
 * recalculées à chaque requête par le Grid Builder.
 */

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;

/// Statut remonté par les agents de monitoring des salles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    Online,
    Offline,
    Unknown,
}

impl MachineStatus {
    /// Toute valeur non reconnue (ou absente) est traitée comme `unknown`
    pub fn parse(raw: &str) -> Self {
        match raw {
            "online" => Self::Online,
            "offline" => Self::Offline,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub key: String,
    pub name: String,
    pub site: String,
}

impl Room {
    /// Lit un hash de salle ; `None` si le hash est vide ou sans champ `key`
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        let key = fields.get("key").filter(|k| !k.is_empty())?.clone();
        Some(Self {
            key,
            name: fields.get("name").cloned().unwrap_or_default(),
            site: fields.get("site").cloned().unwrap_or_default(),
        })
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("site".to_string(), self.site.clone()),
            ("key".to_string(), self.key.clone()),
            ("name".to_string(), self.name.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub hostname: String,
    pub row: u32,
    pub col: u32,
    pub site: String,
    pub room: String,
    /// Identifiant de l'occupant, vide = machine libre
    pub user: String,
    pub timestamp: String,
    pub status: MachineStatus,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("machine {hostname}: missing field '{field}'")]
    MissingField { hostname: String, field: &'static str },
    #[error("machine {hostname}: invalid {field} '{value}'")]
    InvalidCoordinate {
        hostname: String,
        field: &'static str,
        value: String,
    },
}

impl Machine {
    /// Machine fraîchement chargée depuis une feuille de schéma
    pub fn placed(hostname: &str, row: u32, col: u32, room: &Room) -> Self {
        Self {
            hostname: hostname.to_string(),
            row,
            col,
            site: room.site.clone(),
            room: room.key.clone(),
            user: String::new(),
            timestamp: String::new(),
            status: MachineStatus::Offline,
        }
    }

    pub fn from_fields(hostname: &str, fields: &HashMap<String, String>) -> Result<Self, RecordError> {
        let coordinate = |field: &'static str| -> Result<u32, RecordError> {
            let raw = fields.get(field).ok_or_else(|| RecordError::MissingField {
                hostname: hostname.to_string(),
                field,
            })?;
            raw.trim().parse().map_err(|_| RecordError::InvalidCoordinate {
                hostname: hostname.to_string(),
                field,
                value: raw.clone(),
            })
        };

        let text = |field: &str| fields.get(field).cloned().unwrap_or_default();

        Ok(Self {
            hostname: fields
                .get("hostname")
                .cloned()
                .unwrap_or_else(|| hostname.to_string()),
            row: coordinate("row")?,
            col: coordinate("col")?,
            site: text("site"),
            room: text("room"),
            user: text("user"),
            timestamp: text("timestamp"),
            status: MachineStatus::parse(&text("status")),
        })
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("hostname".to_string(), self.hostname.clone()),
            ("col".to_string(), self.col.to_string()),
            ("row".to_string(), self.row.to_string()),
            ("user".to_string(), self.user.clone()),
            ("timestamp".to_string(), self.timestamp.clone()),
            ("status".to_string(), self.status.as_str().to_string()),
            ("site".to_string(), self.site.clone()),
            ("room".to_string(), self.room.clone()),
        ]
    }

    pub fn is_occupied(&self) -> bool {
        !self.user.is_empty()
    }

    /// Règle historique conservée telle quelle : occupée OU hors ligne
    pub fn counts_as_used(&self) -> bool {
        self.is_occupied() || self.status == MachineStatus::Offline
    }
}

/// Occupant affiché dans une cellule de grille
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Occupant {
    /// Personne : le champ `user` est omis
    Empty,
    /// Quelqu'un qui n'est pas un ami : affiché `"-"`
    Unresolved,
    /// Un ami ; `name` reste vide si l'annuaire ne le connaît pas
    Friend { key: String, name: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCell {
    pub row: u32,
    pub col: u32,
    pub machine: Option<Machine>,
    pub occupant: Occupant,
}

impl GridCell {
    pub fn placeholder(row: u32, col: u32) -> Self {
        Self {
            row,
            col,
            machine: None,
            occupant: Occupant::Empty,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.machine.is_none()
    }
}

impl Serialize for GridCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("row", &self.row)?;
        map.serialize_entry("col", &self.col)?;

        let Some(machine) = &self.machine else {
            map.serialize_entry("hostname", &Option::<String>::None)?;
            return map.end();
        };

        map.serialize_entry("hostname", &machine.hostname)?;
        map.serialize_entry("site", &machine.site)?;
        map.serialize_entry("room", &machine.room)?;
        map.serialize_entry("timestamp", &machine.timestamp)?;
        map.serialize_entry("status", &machine.status)?;
        match &self.occupant {
            Occupant::Empty => {}
            Occupant::Unresolved => map.serialize_entry("user", "-")?,
            Occupant::Friend { key, name } => {
                map.serialize_entry("user", key)?;
                if let Some(name) = name {
                    map.serialize_entry("friend", name)?;
                }
            }
        }
        map.end()
    }
}

/// Résultat du Grid Builder pour une salle
#[derive(Debug, Clone, Serialize)]
pub struct RoomGrid {
    pub room: Room,
    pub rows: Vec<Vec<GridCell>>,
    pub num_machines: usize,
    pub num_used: usize,
    pub num_free: usize,
    pub low_availability: bool,
    pub last_update: f64,
}

/// Un ami présent dans une salle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FriendPresence {
    pub uun: String,
    pub name: String,
    pub room_key: String,
    pub room_name: String,
    pub here: bool,
}

/// Vue complète servie par `/api/refresh` pour une salle réelle
#[derive(Debug, Clone, Serialize)]
pub struct RoomView {
    #[serde(flatten)]
    pub grid: RoomGrid,
    #[serde(flatten)]
    pub friends: FriendsSummary,
}

/// Présence des amis fusionnée dans la vue d'une salle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FriendsSummary {
    pub friends: Vec<FriendPresence>,
    pub friends_here_count: usize,
    pub friends_elsewhere_count: usize,
}
