/**
 * FRIENDS - Présence des amis et gestion de la liste d'amis
 *
 * RÔLE :
 * - Agrégateur : croise les occupants de toutes les salles avec la liste
 *   d'amis du viewer → qui est "ici", qui est "ailleurs"
 * - Gestion : liste / ajout / suppression d'amis, recherche dans l'annuaire
 *
 * DÉGRADATION : annuaire indisponible → pas d'annotations (liste vide),
 * jamais d'échec de la requête.
 */

use crate::directory::{Directory, Person};
use crate::error::MappError;
use crate::lab::Lab;
use crate::models::{FriendPresence, FriendsSummary};
use crate::store::{keys, StoreError, WriteBatch};
use crate::viewer::{FriendSet, Viewer};
use serde::Serialize;
use std::collections::BTreeSet;

/// Tous les amis présents dans une salle du site, triés par nom (insensible à la casse)
pub fn friend_presence(
    lab: &Lab,
    viewer: &Viewer,
    friends: &FriendSet,
    directory: &dyn Directory,
) -> Result<Vec<FriendPresence>, StoreError> {
    if viewer.is_anonymous() || friends.is_empty() {
        return Ok(Vec::new());
    }

    // (identifiant, clé de salle, nom de salle), sans doublon
    let mut sightings: BTreeSet<(String, String, String)> = BTreeSet::new();
    for room in lab.rooms()? {
        for hostname in lab.room_hostnames(&room.key)? {
            let Some(machine) = lab.machine(&hostname)? else { continue };
            if let Some(uun) = friends.resolve(&machine.user) {
                sightings.insert((uun.to_string(), room.key.clone(), room.name.clone()));
            }
        }
    }

    if sightings.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = sightings
        .iter()
        .map(|(uun, _, _)| uun.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let names = match directory.get_names(&ids) {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!(error = %e, "[friends] directory unavailable, no friend annotations");
            return Ok(Vec::new());
        }
    };

    let mut entries: Vec<FriendPresence> = sightings
        .into_iter()
        .filter_map(|(uun, room_key, room_name)| {
            let name = names.get(&uun)?.clone();
            Some(FriendPresence { uun, name, room_key, room_name, here: false })
        })
        .collect();
    entries.sort_by_key(|e| e.name.to_lowercase());
    Ok(entries)
}

/// Marque `here` pour les amis de la salle consultée et compte ici / ailleurs
pub fn summarize_for_room(mut friends: Vec<FriendPresence>, room_key: &str) -> FriendsSummary {
    let mut here = 0;
    for entry in &mut friends {
        entry.here = entry.room_key == room_key;
        if entry.here {
            here += 1;
        }
    }
    let elsewhere = friends.len() - here;
    FriendsSummary {
        friends,
        friends_here_count: here,
        friends_elsewhere_count: elsewhere,
    }
}

/// Entrée de la liste d'amis : ("Nom (id)", id)
pub type FriendListEntry = (String, String);

pub fn list_friends(lab: &Lab, viewer: &Viewer, directory: &dyn Directory) -> Result<Vec<FriendListEntry>, MappError> {
    let id = viewer.id().ok_or(MappError::LoginRequired)?;
    let uuns = lab.store().smembers(&keys::friends(id))?;

    let names = directory.get_names(&uuns).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "[friends] directory unavailable, listing raw identifiers");
        Default::default()
    });

    let mut entries: Vec<FriendListEntry> = uuns
        .into_iter()
        .map(|uun| {
            let name = names.get(&uun).cloned().unwrap_or_else(|| uun.clone());
            (format!("{name} ({uun})"), uun)
        })
        .collect();
    entries.sort_by_key(|(label, _)| label.to_lowercase());
    Ok(entries)
}

pub fn add_friend(lab: &Lab, viewer: &Viewer, uun: &str) -> Result<(), MappError> {
    let id = viewer.id().ok_or(MappError::LoginRequired)?;
    let uun = uun.trim();
    if uun.is_empty() {
        return Err(MappError::Validation("Expected a friend identifier".into()));
    }

    let mut batch = WriteBatch::new();
    batch.sadd(keys::friends(id), uun);
    lab.store().apply(&batch)?;
    tracing::info!(viewer = id, friend = uun, "[friends] friend added");
    Ok(())
}

pub fn remove_friends(lab: &Lab, viewer: &Viewer, uuns: Vec<String>) -> Result<(), MappError> {
    let id = viewer.id().ok_or(MappError::LoginRequired)?;
    let mut batch = WriteBatch::new();
    batch.srem(keys::friends(id), uuns);
    lab.store().apply(&batch)?;
    Ok(())
}

/// Résultat de recherche annuaire, annoté si la personne est déjà suivie
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonMatch {
    pub uun: String,
    pub name: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub friend: bool,
}

pub fn search_people(
    lab: &Lab,
    viewer: &Viewer,
    directory: &dyn Directory,
    name: &str,
) -> Result<Vec<PersonMatch>, MappError> {
    if viewer.is_anonymous() {
        return Err(MappError::LoginRequired);
    }
    if name.chars().count() < 2 {
        return Ok(Vec::new());
    }

    let mut people: Vec<Person> = match directory.search_name(name) {
        Ok(people) => people,
        Err(e) => {
            tracing::warn!(error = %e, "[friends] directory search failed");
            return Ok(Vec::new());
        }
    };
    people.sort_by_key(|p| p.name.to_lowercase());

    let friends = lab.friend_set(viewer)?;
    Ok(people
        .into_iter()
        .map(|p| PersonMatch {
            friend: friends.resolve(&p.uun).is_some(),
            uun: p.uun,
            name: p.name,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::testing::{directory, DownDirectory};
    use crate::lab::testing::*;
    use pretty_assertions::assert_eq;

    fn viewer() -> Viewer {
        Viewer::User("s1".into())
    }

    fn names() -> crate::directory::StaticDirectory {
        directory(&[("s2", "bob Builder"), ("s3", "Alice Liddell"), ("s4", "Zed")])
    }

    fn seeded() -> Lab {
        let lab = lab();
        seed_room(&lab, "6.06", "Room 6.06", &[("a", 0, 0, "s2", "online"), ("b", 0, 1, "s9", "online")]);
        seed_room(&lab, "drillhall", "Drill Hall", &[("c", 0, 0, "s3", "online")]);
        befriend(&lab, "s1", &["s2", "s3", "s4"]);
        lab
    }

    #[test]
    fn test_presence_sorted_case_insensitive() {
        let lab = seeded();
        let friends = lab.friend_set(&viewer()).unwrap();
        let entries = friend_presence(&lab, &viewer(), &friends, &names()).unwrap();

        let got: Vec<(&str, &str)> = entries.iter().map(|e| (e.name.as_str(), e.room_key.as_str())).collect();
        assert_eq!(got, vec![("Alice Liddell", "drillhall"), ("bob Builder", "6.06")]);
        assert_eq!(entries[0].room_name, "Drill Hall");
    }

    #[test]
    fn test_presence_never_duplicates() {
        let lab = seeded();
        // la même machine listée deux fois dans la salle
        let mut batch = WriteBatch::new();
        batch.rpush(keys::room_machines("6.06"), vec!["a".into()]);
        lab.store().apply(&batch).unwrap();

        let friends = lab.friend_set(&viewer()).unwrap();
        let entries = friend_presence(&lab, &viewer(), &friends, &names()).unwrap();
        let bob: Vec<_> = entries.iter().filter(|e| e.uun == "s2").collect();
        assert_eq!(bob.len(), 1);
    }

    #[test]
    fn test_presence_anonymous_is_empty() {
        let lab = seeded();
        let friends = lab.friend_set(&viewer()).unwrap();
        let entries = friend_presence(&lab, &Viewer::Anonymous, &friends, &names()).unwrap();
        assert!(entries.is_empty());

        let summary = summarize_for_room(entries, "6.06");
        assert_eq!(summary, FriendsSummary::default());
    }

    #[test]
    fn test_presence_drops_unresolved_and_survives_directory_failure() {
        let lab = seeded();
        let friends = lab.friend_set(&viewer()).unwrap();

        let partial = directory(&[("s3", "Alice Liddell")]);
        let entries = friend_presence(&lab, &viewer(), &friends, &partial).unwrap();
        assert_eq!(entries.len(), 1);

        let entries = friend_presence(&lab, &viewer(), &friends, &DownDirectory).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_summary_counts_here_and_elsewhere() {
        let lab = seeded();
        let friends = lab.friend_set(&viewer()).unwrap();
        let entries = friend_presence(&lab, &viewer(), &friends, &names()).unwrap();

        let summary = summarize_for_room(entries, "6.06");
        assert_eq!(summary.friends_here_count, 1);
        assert_eq!(summary.friends_elsewhere_count, 1);
        let here: Vec<bool> = summary.friends.iter().map(|f| f.here).collect();
        assert_eq!(here, vec![false, true]);
    }

    #[test]
    fn test_friend_list_management() {
        let lab = lab();
        add_friend(&lab, &viewer(), "s3").unwrap();
        add_friend(&lab, &viewer(), "s2").unwrap();
        add_friend(&lab, &viewer(), "s77").unwrap();

        let list = list_friends(&lab, &viewer(), &names()).unwrap();
        let labels: Vec<&str> = list.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["Alice Liddell (s3)", "bob Builder (s2)", "s77 (s77)"]);

        remove_friends(&lab, &viewer(), vec!["s2".into(), "s77".into()]).unwrap();
        let list = list_friends(&lab, &viewer(), &DownDirectory).unwrap();
        assert_eq!(list, vec![("s3 (s3)".to_string(), "s3".to_string())]);
    }

    #[test]
    fn test_friend_management_requires_login() {
        let lab = lab();
        assert!(matches!(add_friend(&lab, &Viewer::Anonymous, "s2"), Err(MappError::LoginRequired)));
        assert!(matches!(add_friend(&lab, &viewer(), " "), Err(MappError::Validation(_))));
        assert!(matches!(list_friends(&lab, &Viewer::Anonymous, &names()), Err(MappError::LoginRequired)));
    }

    #[test]
    fn test_search_marks_friends() {
        let lab = lab();
        add_friend(&lab, &viewer(), "s2").unwrap();
        let dir = names();

        assert!(search_people(&lab, &viewer(), &dir, "b").unwrap().is_empty());

        let found = search_people(&lab, &viewer(), &dir, "li").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uun, "s3");
        assert!(!found[0].friend);

        let found = search_people(&lab, &viewer(), &dir, "BU").unwrap();
        assert!(found[0].friend);
        assert!(search_people(&lab, &viewer(), &DownDirectory, "bob").unwrap().is_empty());
    }
}
