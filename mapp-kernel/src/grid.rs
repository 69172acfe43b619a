/**
 * GRID BUILDER - Reconstruction de la grille d'occupation d'une salle
 *
 * RÔLE :
 * À partir de la liste plate des machines d'une salle (chacune avec sa
 * position row/col), produit la grille dense ligne par ligne, les stats
 * de disponibilité et les annotations "ami" des occupants.
 *
 * FONCTIONNEMENT :
 * 1. Chargement de la salle et de ses machines (RoomNotFound si absente ou vide)
 * 2. Étendue = (max row + 1) × (max col + 1), positions >= 1024 ignorées
 * 3. Une cellule par position ; trou = placeholder sans hostname
 * 4. Occupants : ami → clé d'ami, inconnu → "-", personne → champ omis
 * 5. Noms des amis résolus en UN appel annuaire ; annuaire KO → tout en "-"
 *
 * Lecture seule sur le store, pas de snapshot atomique (cf. last_update).
 */

use crate::directory::Directory;
use crate::error::MappError;
use crate::lab::Lab;
use crate::models::{GridCell, Machine, Occupant, RoomGrid};
use crate::viewer::FriendSet;
use std::collections::HashMap;

/// Borne exclusive des row/col acceptés ; au-delà la machine est ignorée
const MAX_GRID_EXTENT: u32 = 1024;

/// Part minimale de machines libres en dessous de laquelle la salle est "pleine"
const LOW_AVAILABILITY_RATIO: f64 = 0.3;

pub fn is_low_availability(num_free: usize, num_machines: usize) -> bool {
    (num_free as f64) <= LOW_AVAILABILITY_RATIO * (num_machines as f64)
}

pub fn build_room_grid(
    lab: &Lab,
    room_key: &str,
    friends: &FriendSet,
    directory: &dyn Directory,
) -> Result<RoomGrid, MappError> {
    let room = lab
        .room(room_key)?
        .ok_or_else(|| MappError::RoomNotFound(room_key.to_string()))?;
    let (machines, out_of_bounds): (Vec<Machine>, Vec<Machine>) = lab
        .room_machines(&room.key)?
        .into_iter()
        .partition(|m| m.row < MAX_GRID_EXTENT && m.col < MAX_GRID_EXTENT);
    for machine in &out_of_bounds {
        tracing::warn!(
            room = %room.key,
            hostname = %machine.hostname,
            row = machine.row,
            col = machine.col,
            "[grid] machine position out of bounds, skipped"
        );
    }
    if machines.is_empty() {
        return Err(MappError::RoomNotFound(room_key.to_string()));
    }

    let num_rows = machines.iter().map(|m| m.row).max().unwrap_or(0) + 1;
    let num_cols = machines.iter().map(|m| m.col).max().unwrap_or(0) + 1;

    // Première machine rencontrée (ordre de la liste) gagne en cas de doublon
    let mut by_position: HashMap<(u32, u32), &Machine> = HashMap::new();
    for machine in &machines {
        by_position.entry((machine.row, machine.col)).or_insert(machine);
    }

    let mut num_used = 0;
    let mut friend_keys: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(num_rows as usize);

    for r in 0..num_rows {
        let mut cells = Vec::with_capacity(num_cols as usize);
        for c in 0..num_cols {
            let Some(machine) = by_position.get(&(r, c)) else {
                cells.push(GridCell::placeholder(r, c));
                continue;
            };

            if machine.counts_as_used() {
                num_used += 1;
            }

            let occupant = if !machine.is_occupied() {
                Occupant::Empty
            } else if let Some(key) = friends.resolve(&machine.user) {
                friend_keys.push(key.to_string());
                Occupant::Friend { key: key.to_string(), name: None }
            } else {
                Occupant::Unresolved
            };

            cells.push(GridCell {
                row: r,
                col: c,
                machine: Some((*machine).clone()),
                occupant,
            });
        }
        rows.push(cells);
    }

    attach_friend_names(&mut rows, &friend_keys, directory);

    let num_machines = machines.len();
    let num_free = num_machines.saturating_sub(num_used);
    let low_availability = is_low_availability(num_free, num_machines);
    let last_update = lab.last_update()?;

    tracing::debug!(
        room = %room.key,
        rows = num_rows,
        cols = num_cols,
        num_machines,
        num_used,
        "[grid] built room grid"
    );

    Ok(RoomGrid {
        room,
        rows,
        num_machines,
        num_used,
        num_free,
        low_availability,
        last_update,
    })
}

/// Résolution groupée des noms d'amis ; annuaire indisponible → occupants masqués
fn attach_friend_names(rows: &mut [Vec<GridCell>], friend_keys: &[String], directory: &dyn Directory) {
    if friend_keys.is_empty() {
        return;
    }

    let names = match directory.get_names(friend_keys) {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!(error = %e, "[grid] directory unavailable, hiding friend identities");
            for cell in rows.iter_mut().flatten() {
                if matches!(cell.occupant, Occupant::Friend { .. }) {
                    cell.occupant = Occupant::Unresolved;
                }
            }
            return;
        }
    };

    for cell in rows.iter_mut().flatten() {
        if let Occupant::Friend { key, name } = &mut cell.occupant {
            *name = names.get(key.as_str()).cloned();
        }
    }
}
