/**
 * ANNUAIRE - Résolution identifiant → nom affiché
 *
 * RÔLE : Collaborateur externe du kernel (annuaire institutionnel).
 * Le kernel ne consomme que deux opérations : résolution par lot
 * (un seul aller-retour par requête) et recherche par nom partiel.
 *
 * IMPLÉMENTATION FOURNIE : StaticDirectory, construit depuis la config
 * (`directory.people`), suffisant pour un déploiement de labo ou les tests.
 */

use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("{0}")]
    Unavailable(String),
}

/// Une personne renvoyée par la recherche
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Person {
    pub uun: String,
    pub name: String,
}

pub trait Directory: Send + Sync {
    /// Résout un lot d'identifiants ; les inconnus sont simplement absents
    fn get_names(&self, ids: &[String]) -> Result<HashMap<String, String>, DirectoryError>;

    /// Recherche par fragment de nom
    fn search_name(&self, partial: &str) -> Result<Vec<Person>, DirectoryError>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    people: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn new(people: HashMap<String, String>) -> Self {
        tracing::info!(entries = people.len(), "[directory] static directory ready");
        Self { people }
    }
}

impl Directory for StaticDirectory {
    fn get_names(&self, ids: &[String]) -> Result<HashMap<String, String>, DirectoryError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.people.get(id).map(|name| (id.clone(), name.clone())))
            .collect())
    }

    fn search_name(&self, partial: &str) -> Result<Vec<Person>, DirectoryError> {
        let needle = partial.to_lowercase();
        Ok(self
            .people
            .iter()
            .filter(|(_, name)| name.to_lowercase().contains(&needle))
            .map(|(uun, name)| Person { uun: uun.clone(), name: name.clone() })
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Annuaire hors service, pour vérifier les dégradations
    pub struct DownDirectory;

    impl Directory for DownDirectory {
        fn get_names(&self, _ids: &[String]) -> Result<HashMap<String, String>, DirectoryError> {
            Err(DirectoryError::Unavailable("ldap timeout".into()))
        }

        fn search_name(&self, _partial: &str) -> Result<Vec<Person>, DirectoryError> {
            Err(DirectoryError::Unavailable("ldap timeout".into()))
        }
    }

    pub fn directory(pairs: &[(&str, &str)]) -> StaticDirectory {
        StaticDirectory::new(
            pairs
                .iter()
                .map(|(uun, name)| (uun.to_string(), name.to_string()))
                .collect(),
        )
    }
}
