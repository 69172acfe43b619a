/*!
Builder de feuilles CSV au format attendu par `/api/update_schema`

Trois lignes d'en-tête (libellés, valeurs, ligne vide) puis la grille des
hostnames ; les lignes sont séparées par `\r\n` comme à l'export tableur.
*/

use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct SheetBuilder {
    name: String,
    header: Vec<String>,
    room: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl SheetBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            header: vec!["site".into(), "key".into(), "name".into()],
            room: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn room(mut self, site: &str, key: &str, name: &str) -> Self {
        self.room = vec![site.into(), key.into(), name.into()];
        self
    }

    /// Remplace la ligne des libellés, pour tester les en-têtes invalides
    pub fn header(mut self, labels: &[&str]) -> Self {
        self.header = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Ajoute une ligne de grille ; `""` = emplacement sans machine
    pub fn row(mut self, hostnames: &[&str]) -> Self {
        self.rows.push(hostnames.iter().map(|h| h.to_string()).collect());
        self
    }

    pub fn csv(&self) -> String {
        let mut lines = vec![self.header.join(","), self.room.join(","), String::new()];
        lines.extend(self.rows.iter().map(|r| r.join(",")));
        lines.join("\r\n")
    }

    /// Feuille `{name, csv}` telle qu'elle figure dans `machines`
    pub fn build(&self) -> Value {
        log::debug!("built sheet '{}' with {} grid rows", self.name, self.rows.len());
        json!({ "name": self.name, "csv": self.csv() })
    }
}
