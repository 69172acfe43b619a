/**
 * INGEST - Chargement du schéma (feuilles CSV) et mises à jour live
 *
 * RÔLE :
 * - update_schema : remplace tout ou partie de la topologie (salles, positions)
 *   à partir de feuilles CSV envoyées par l'outil d'administration
 * - update : applique les relevés {hostname, user, timestamp, status}
 *   envoyés périodiquement par les agents de surveillance des labos
 *
 * FONCTIONNEMENT :
 * 1. Vérification de la clé de callback contre `authorised-key`
 * 2. Validation complète de la requête (toutes les feuilles) AVANT écriture
 * 3. Une seule WriteBatch appliquée atomiquement : rien n'est écrit si une
 *    feuille est invalide
 *
 * FORMAT D'UNE FEUILLE :
 *   ligne 0 : site,key,name         (libellés)
 *   ligne 1 : <site>,<key>,<name>   (valeurs non vides)
 *   ligne 2 : vide
 *   ligne 3+: grille de hostnames, cellule vide = pas de machine
 */

use crate::error::MappError;
use crate::lab::Lab;
use crate::models::{Machine, Room};
use crate::store::{keys, StoreError, WriteBatch};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

const ROOM_COLUMNS: [&str; 3] = ["site", "key", "name"];
const HEADER_ROWS: usize = 3;

/// Une feuille telle qu'envoyée dans `machines`
#[derive(Debug, Clone, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub csv: String,
}

/// Feuille validée : la salle et ses machines placées
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSheet {
    pub room: Room,
    pub machines: Vec<Machine>,
}

/// Bilan d'un chargement de schéma
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaOutcome {
    pub rooms: usize,
    pub machines: usize,
}

/// Vérifie `callback-key` ; absente = chaîne vide, donc refusée
pub fn authorize(lab: &Lab, payload: &Value) -> Result<(), MappError> {
    let key = payload.get("callback-key").and_then(Value::as_str).unwrap_or("");
    if lab.is_authorised(key)? {
        return Ok(());
    }
    tracing::warn!("[ingest] client attempted to use a bad callback key");
    Err(MappError::Authorization("Given key is not an authorised API key".into()))
}

pub fn update_schema(lab: &Lab, payload: &Value) -> Result<SchemaOutcome, MappError> {
    authorize(lab, payload)?;

    let sheets = payload
        .get("machines")
        .ok_or_else(|| MappError::Validation("no machines?".into()))?;
    let sheets: Vec<Sheet> = serde_json::from_value(sheets.clone())
        .map_err(|e| MappError::Validation(format!("Malformed sheet list: {e}")))?;
    let reset_all = payload
        .get("resetAll")
        .map(truthy)
        .ok_or_else(|| MappError::Validation("Expected resetAll key".into()))?;
    let drop_only = payload
        .get("dropOnly")
        .map(truthy)
        .ok_or_else(|| MappError::Validation("Expected dropOnly key".into()))?;

    let parsed = sheets
        .iter()
        .map(|sheet| parse_sheet(sheet, drop_only))
        .collect::<Result<Vec<_>, _>>()?;

    let batch = schema_batch(lab, &parsed, reset_all, drop_only)?;
    lab.store().apply(&batch)?;

    let outcome = SchemaOutcome {
        rooms: if drop_only { 0 } else { parsed.len() },
        machines: parsed.iter().map(|s| s.machines.len()).sum(),
    };
    tracing::info!(
        sheets = parsed.len(),
        rooms = outcome.rooms,
        machines = outcome.machines,
        reset_all,
        drop_only,
        "[ingest] schema applied"
    );
    Ok(outcome)
}

/// Valide une feuille et place ses machines (aucune en mode drop-only)
pub fn parse_sheet(sheet: &Sheet, drop_only: bool) -> Result<ParsedSheet, MappError> {
    let mut room_values: HashMap<&str, String> = HashMap::new();
    let mut cells: Vec<(String, u32, u32)> = Vec::new();

    for (rownumber, line) in sheet.csv.lines().enumerate() {
        let row = split_csv_line(line)
            .map_err(|e| MappError::Validation(format!("[Sheet {}] Unreadable row[{}]: {}", sheet.name, rownumber, e)))?;

        for (colnumber, value) in row.into_iter().enumerate() {
            match rownumber {
                0 => {
                    if let Some(expected) = ROOM_COLUMNS.get(colnumber) {
                        if value != *expected {
                            return Err(MappError::Validation(format!(
                                "[Sheet {}] Invalid header '{}' in cols[{}], expected '{}'",
                                sheet.name, value, colnumber, expected
                            )));
                        }
                    }
                }
                1 => {
                    let Some(column) = ROOM_COLUMNS.get(colnumber) else { continue };
                    if value.is_empty() {
                        return Err(MappError::Validation(format!(
                            "[Sheet {}] Invalid value in col[{}] row[{}], expected non-empty string",
                            sheet.name, colnumber, rownumber
                        )));
                    }
                    room_values.insert(*column, value);
                }
                2 => {
                    if !value.is_empty() {
                        return Err(MappError::Validation(format!(
                            "[Sheet {}] Invalid value '{}' in rows[{}], expected empty row",
                            sheet.name, value, rownumber
                        )));
                    }
                }
                _ => {
                    if value.is_empty() || drop_only {
                        continue;
                    }
                    cells.push((value, (rownumber - HEADER_ROWS) as u32, colnumber as u32));
                }
            }
        }
    }

    let mut field = |column: &str| {
        room_values.remove(column).ok_or_else(|| {
            MappError::Validation(format!("[Sheet {}] Missing room value '{}'", sheet.name, column))
        })
    };
    let room = Room {
        site: field("site")?,
        key: field("key")?,
        name: field("name")?,
    };
    let machines = cells
        .into_iter()
        .map(|(hostname, row, col)| Machine::placed(&hostname, row, col, &room))
        .collect();

    Ok(ParsedSheet { room, machines })
}

/// Découpe une ligne CSV ; une ligne vide donne une ligne sans cellule
fn split_csv_line(line: &str) -> Result<Vec<String>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    match reader.records().next() {
        Some(record) => Ok(record?.iter().map(str::to_string).collect()),
        None => Ok(Vec::new()),
    }
}

/// Construit le lot complet : tous les resets d'abord, puis le chargement des salles
///
/// Un hostname déplacé d'une salle à l'autre dans la même requête est donc
/// supprimé avant d'être réécrit, quel que soit l'ordre des feuilles.
fn schema_batch(
    lab: &Lab,
    sheets: &[ParsedSheet],
    reset_all: bool,
    drop_only: bool,
) -> Result<WriteBatch, StoreError> {
    let mut batch = WriteBatch::new();

    if reset_all {
        let site = lab.primary_site();
        for room_key in lab.room_keys()? {
            reset_room(lab, &mut batch, &room_key)?;
        }
        batch.del([keys::site_rooms(site)]);
        batch.srem(keys::SITES, vec![site.to_string()]);
    } else {
        let mut reset: HashSet<&str> = HashSet::new();
        for sheet in sheets {
            let room = &sheet.room;
            if reset.insert(room.key.as_str()) {
                reset_room(lab, &mut batch, &room.key)?;
            }
            batch.srem(keys::site_rooms(&room.site), vec![room.key.clone()]);
        }
    }

    if drop_only {
        return Ok(batch);
    }

    // une salle présente dans plusieurs feuilles : la dernière l'emporte
    let last_sheet: HashMap<&str, usize> = sheets
        .iter()
        .enumerate()
        .map(|(i, sheet)| (sheet.room.key.as_str(), i))
        .collect();

    for (i, sheet) in sheets.iter().enumerate() {
        if last_sheet.get(sheet.room.key.as_str()) != Some(&i) {
            continue;
        }
        let room = &sheet.room;
        let hostnames: Vec<String> = sheet.machines.iter().map(|m| m.hostname.clone()).collect();
        batch
            .sadd(keys::SITES, &room.site)
            .sadd(keys::site_rooms(&room.site), &room.key)
            .hset_all(&room.key, room.to_fields())
            .rpush(keys::room_machines(&room.key), hostnames);
        for machine in &sheet.machines {
            batch.hset_all(&machine.hostname, machine.to_fields());
        }
    }

    Ok(batch)
}

/// Supprime les machines d'une salle, sa liste de membres et son enregistrement
fn reset_room(lab: &Lab, batch: &mut WriteBatch, room_key: &str) -> Result<(), StoreError> {
    batch
        .del(lab.room_hostnames(room_key)?)
        .del([keys::room_machines(room_key), room_key.to_string()]);
    Ok(())
}

/// Vérité "à la JSON" des drapeaux resetAll / dropOnly
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Un relevé d'agent validé
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveRecord {
    pub hostname: String,
    pub user: String,
    pub timestamp: String,
    pub status: String,
}

impl LiveRecord {
    fn from_json(value: &Value) -> Option<Self> {
        let field = |name: &str| match value.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        };
        Some(Self {
            hostname: field("hostname")?,
            user: field("user")?,
            timestamp: field("timestamp")?,
            status: field("status")?,
        })
    }
}

pub fn update(lab: &Lab, payload: &Value) -> Result<usize, MappError> {
    update_at(lab, payload, unix_now())
}

/// Applique les relevés et positionne `last-update` à `now`
pub fn update_at(lab: &Lab, payload: &Value, now: f64) -> Result<usize, MappError> {
    authorize(lab, payload)?;

    let records = payload
        .get("machines")
        .and_then(Value::as_array)
        .and_then(|machines| machines.iter().map(LiveRecord::from_json).collect::<Option<Vec<_>>>())
        .ok_or_else(|| {
            tracing::warn!("[ingest] malformed live update rejected");
            MappError::Validation("Malformed JSON content".into())
        })?;

    let mut batch = WriteBatch::new();
    for record in &records {
        batch.hset_all(
            &record.hostname,
            vec![
                ("user".into(), record.user.clone()),
                ("timestamp".into(), record.timestamp.clone()),
                ("status".into(), record.status.clone()),
            ],
        );
    }
    batch.set(keys::LAST_UPDATE, now.to_string());
    lab.store().apply(&batch)?;

    tracing::debug!(machines = records.len(), "[ingest] live update applied");
    Ok(records.len())
}

fn unix_now() -> f64 {
    time::OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::testing::*;
    use crate::models::MachineStatus;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const KEY: &str = "s3cret";

    fn authorised_lab() -> Lab {
        let lab = lab();
        let mut batch = WriteBatch::new();
        batch.rpush(keys::AUTHORISED_KEYS, vec![KEY.into()]);
        lab.store().apply(&batch).unwrap();
        lab
    }

    fn sheet(name: &str, lines: &[&str]) -> Value {
        json!({ "name": name, "csv": lines.join("\r\n") })
    }

    fn schema(sheets: Vec<Value>, reset_all: bool, drop_only: bool) -> Value {
        json!({
            "callback-key": KEY,
            "machines": sheets,
            "resetAll": reset_all,
            "dropOnly": drop_only,
        })
    }

    fn validation_message(err: MappError) -> String {
        match err {
            MappError::Validation(msg) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_minimal_sheet_loads_room() {
        let lab = authorised_lab();
        let payload = schema(
            vec![sheet("A", &["site,key,name", "siteA,room1,Room One", "", "host1,host2"])],
            false,
            false,
        );

        let outcome = update_schema(&lab, &payload).unwrap();
        assert_eq!(outcome, SchemaOutcome { rooms: 1, machines: 2 });

        let room = lab.room("room1").unwrap().unwrap();
        assert_eq!(room.name, "Room One");
        assert_eq!(room.site, "siteA");
        assert_eq!(lab.room_hostnames("room1").unwrap(), vec!["host1", "host2"]);

        let host2 = lab.machine("host2").unwrap().unwrap();
        assert_eq!((host2.row, host2.col), (0, 1));
        assert_eq!(host2.user, "");
        assert_eq!(host2.status, MachineStatus::Offline);
        assert!(lab.store().sismember(keys::SITES, "siteA").unwrap());
        assert!(lab.store().sismember(&keys::site_rooms("siteA"), "room1").unwrap());
    }

    #[test]
    fn test_grid_positions_skip_empty_cells() {
        let parsed = parse_sheet(
            &Sheet {
                name: "A".into(),
                csv: ["site,key,name,notes", "s,r,R,ignored", "", "a,,b", "", ",c"].join("\r\n"),
            },
            false,
        )
        .unwrap();

        let placed: Vec<(&str, u32, u32)> = parsed
            .machines
            .iter()
            .map(|m| (m.hostname.as_str(), m.row, m.col))
            .collect();
        assert_eq!(placed, vec![("a", 0, 0), ("b", 0, 2), ("c", 2, 1)]);
    }

    #[test]
    fn test_header_errors_name_sheet_and_position() {
        let bad_header = Sheet { name: "A".into(), csv: "site,room,name".into() };
        assert_eq!(
            validation_message(parse_sheet(&bad_header, false).unwrap_err()),
            "[Sheet A] Invalid header 'room' in cols[1], expected 'key'"
        );

        let empty_value = Sheet { name: "B".into(), csv: "site,key,name\r\ns,,R".into() };
        assert_eq!(
            validation_message(parse_sheet(&empty_value, false).unwrap_err()),
            "[Sheet B] Invalid value in col[1] row[1], expected non-empty string"
        );

        let not_blank = Sheet { name: "C".into(), csv: "site,key,name\r\ns,k,R\r\n,oops".into() };
        assert_eq!(
            validation_message(parse_sheet(&not_blank, false).unwrap_err()),
            "[Sheet C] Invalid value 'oops' in rows[2], expected empty row"
        );

        let truncated = Sheet { name: "D".into(), csv: "site,key,name\r\ns,k".into() };
        assert!(parse_sheet(&truncated, false).is_err());
    }

    #[test]
    fn test_invalid_sheet_writes_nothing() {
        let lab = authorised_lab();
        let payload = schema(
            vec![
                sheet("good", &["site,key,name", "s,ok,OK", "", "h1"]),
                sheet("bad", &["site,key,nom"]),
            ],
            false,
            false,
        );

        assert!(matches!(update_schema(&lab, &payload), Err(MappError::Validation(_))));
        assert!(lab.room("ok").unwrap().is_none());
        assert!(lab.machine("h1").unwrap().is_none());
    }

    #[test]
    fn test_callback_key_and_required_flags() {
        let lab = authorised_lab();

        let mut payload = schema(vec![], false, false);
        payload["callback-key"] = json!("wrong");
        assert!(matches!(update_schema(&lab, &payload), Err(MappError::Authorization(_))));

        let missing_key = json!({ "machines": [], "resetAll": false, "dropOnly": false });
        assert!(matches!(update_schema(&lab, &missing_key), Err(MappError::Authorization(_))));

        let mut payload = schema(vec![], false, false);
        payload.as_object_mut().unwrap().remove("resetAll");
        assert_eq!(validation_message(update_schema(&lab, &payload).unwrap_err()), "Expected resetAll key");

        let mut payload = schema(vec![], false, false);
        payload.as_object_mut().unwrap().remove("dropOnly");
        assert_eq!(validation_message(update_schema(&lab, &payload).unwrap_err()), "Expected dropOnly key");

        let mut payload = schema(vec![], false, false);
        payload.as_object_mut().unwrap().remove("machines");
        assert_eq!(validation_message(update_schema(&lab, &payload).unwrap_err()), "no machines?");
    }

    #[test]
    fn test_per_room_replace_removes_old_machines() {
        let lab = authorised_lab();
        seed_room(&lab, "room1", "Old", &[("old-host", 0, 0, "s1", "online")]);
        seed_room(&lab, "room2", "Other", &[("keep", 0, 0, "", "online")]);

        let payload = schema(
            vec![sheet("A", &["site,key,name", "forresthill,room1,Room One", "", "new-host"])],
            false,
            false,
        );
        update_schema(&lab, &payload).unwrap();

        assert!(lab.machine("old-host").unwrap().is_none());
        assert_eq!(lab.room_hostnames("room1").unwrap(), vec!["new-host"]);
        assert_eq!(lab.room("room1").unwrap().unwrap().name, "Room One");
        assert!(lab.machine("keep").unwrap().is_some());
        assert_eq!(lab.room_keys().unwrap(), vec!["room1", "room2"]);
    }

    #[test]
    fn test_drop_only_removes_room() {
        let lab = authorised_lab();
        seed_room(&lab, "room1", "Old", &[("old-host", 0, 0, "", "online")]);

        let payload = schema(
            vec![sheet("A", &["site,key,name", "forresthill,room1,Room One", "", "ignored"])],
            false,
            true,
        );
        let outcome = update_schema(&lab, &payload).unwrap();

        assert_eq!(outcome, SchemaOutcome { rooms: 0, machines: 0 });
        assert!(lab.room("room1").unwrap().is_none());
        assert!(lab.machine("old-host").unwrap().is_none());
        assert!(lab.machine("ignored").unwrap().is_none());
        assert!(lab.room_keys().unwrap().is_empty());
    }

    #[test]
    fn test_reset_all_clears_primary_site() {
        let lab = authorised_lab();
        seed_room(&lab, "room1", "One", &[("h1", 0, 0, "", "online")]);
        seed_room(&lab, "room2", "Two", &[("h2", 0, 0, "", "online")]);

        let payload = schema(
            vec![sheet("A", &["site,key,name", "forresthill,room3,Three", "", "h3"])],
            true,
            false,
        );
        update_schema(&lab, &payload).unwrap();

        assert_eq!(lab.room_keys().unwrap(), vec!["room3"]);
        assert!(lab.machine("h1").unwrap().is_none());
        assert!(lab.room("room2").unwrap().is_none());
        assert!(lab.store().sismember(keys::SITES, "forresthill").unwrap());
    }

    #[test]
    fn test_same_room_twice_keeps_last_sheet() {
        let lab = authorised_lab();
        let payload = schema(
            vec![
                sheet("first", &["site,key,name", "forresthill,r,R", "", "a"]),
                sheet("second", &["site,key,name", "forresthill,r,R", "", "b"]),
            ],
            false,
            false,
        );
        update_schema(&lab, &payload).unwrap();

        assert_eq!(lab.room_hostnames("r").unwrap(), vec!["b"]);
        assert!(lab.machine("a").unwrap().is_none());
    }

    #[test]
    fn test_machine_moved_between_rooms_survives() {
        let lab = authorised_lab();
        seed_room(&lab, "roomA", "Room A", &[("host1", 0, 0, "", "online")]);
        seed_room(&lab, "roomB", "Room B", &[("other", 0, 0, "", "online")]);

        // la salle de destination arrive avant la salle d'origine
        let payload = schema(
            vec![
                sheet("B", &["site,key,name", "forresthill,roomB,Room B", "", "other,host1"]),
                sheet("A", &["site,key,name", "forresthill,roomA,Room A", "", ",,x"]),
            ],
            false,
            false,
        );
        update_schema(&lab, &payload).unwrap();

        assert_eq!(lab.room_hostnames("roomB").unwrap(), vec!["other", "host1"]);
        let host1 = lab.machine("host1").unwrap().unwrap();
        assert_eq!((host1.room.as_str(), host1.row, host1.col), ("roomB", 0, 1));
        assert_eq!(lab.room_machines("roomB").unwrap().len(), 2);
        assert_eq!(lab.room_hostnames("roomA").unwrap(), vec!["x"]);
    }

    #[test]
    fn test_live_update_sets_fields_and_last_update() {
        let lab = authorised_lab();
        seed_room(&lab, "room1", "One", &[("h1", 3, 4, "", "offline")]);

        let payload = json!({
            "callback-key": KEY,
            "machines": [{ "hostname": "h1", "user": "s42", "timestamp": 1700000000, "status": "online" }],
        });
        assert_eq!(update_at(&lab, &payload, 1_700_000_100.5).unwrap(), 1);

        let h1 = lab.machine("h1").unwrap().unwrap();
        assert_eq!(h1.user, "s42");
        assert_eq!(h1.timestamp, "1700000000");
        assert_eq!(h1.status, MachineStatus::Online);
        assert_eq!((h1.row, h1.col), (3, 4));
        assert_eq!(lab.last_update().unwrap(), 1_700_000_100.5);
    }

    #[test]
    fn test_live_update_rejects_malformed_records() {
        let lab = authorised_lab();
        let payload = json!({
            "callback-key": KEY,
            "machines": [
                { "hostname": "h1", "user": "", "timestamp": "", "status": "online" },
                { "hostname": "h2", "user": "" },
            ],
        });
        let err = update_at(&lab, &payload, 1.0).unwrap_err();
        assert_eq!(validation_message(err), "Malformed JSON content");
        assert!(lab.store().hgetall("h1").unwrap().is_empty());
        assert_eq!(lab.last_update().unwrap(), 0.0);

        let unauthorised = json!({ "machines": [] });
        assert!(matches!(update_at(&lab, &unauthorised, 1.0), Err(MappError::Authorization(_))));
    }
}
