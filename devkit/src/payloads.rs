/*!
Payloads des endpoints d'ingestion

- `schema_update` : corps de `/api/update_schema`
- `LiveUpdateBuilder` : corps de `/api/update`, horodaté avec l'heure courante
*/

use chrono::Utc;
use serde_json::{json, Value};

pub fn schema_update(callback_key: &str, sheets: Vec<Value>, reset_all: bool, drop_only: bool) -> Value {
    json!({
        "callback-key": callback_key,
        "machines": sheets,
        "resetAll": reset_all,
        "dropOnly": drop_only,
    })
}

/// Relevés envoyés par un agent de labo
#[derive(Debug, Clone)]
pub struct LiveUpdateBuilder {
    callback_key: String,
    machines: Vec<Value>,
}

impl LiveUpdateBuilder {
    pub fn new(callback_key: &str) -> Self {
        Self {
            callback_key: callback_key.to_string(),
            machines: Vec::new(),
        }
    }

    /// Ajoute un relevé ; `user` vide = machine libre
    pub fn machine(mut self, hostname: &str, user: &str, status: &str) -> Self {
        self.machines.push(json!({
            "hostname": hostname,
            "user": user,
            "timestamp": Utc::now().timestamp().to_string(),
            "status": status,
        }));
        self
    }

    pub fn build(self) -> Value {
        json!({ "callback-key": self.callback_key, "machines": self.machines })
    }
}
