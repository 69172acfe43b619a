use std::collections::HashSet;

/// Identité de la personne qui consulte la carte
///
/// Fournie explicitement à chaque appel (pas de session implicite) ;
/// l'authentification elle-même est déléguée au proxy frontal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    User(String),
}

impl Viewer {
    /// Un header absent ou vide = visiteur anonyme
    pub fn from_identity(identity: Option<&str>) -> Self {
        match identity.map(str::trim) {
            Some(id) if !id.is_empty() => Self::User(id.to_string()),
            _ => Self::Anonymous,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::User(id) => Some(id),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

/// Ensemble des identifiants suivis par un viewer (relation orientée)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FriendSet {
    members: HashSet<String>,
}

impl FriendSet {
    pub fn new<I: IntoIterator<Item = String>>(members: I) -> Self {
        Self {
            members: members.into_iter().filter(|m| !m.is_empty()).collect(),
        }
    }

    /// Résolution d'identité : l'occupant est-il un ami ? Renvoie sa clé d'ami.
    pub fn resolve(&self, occupant: &str) -> Option<&str> {
        self.members.get(occupant).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }
}
