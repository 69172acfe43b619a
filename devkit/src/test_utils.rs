/*!
Assertions JSON et logging pour les tests

Les chemins de champ sont pointés : `room.key`, `rows.0.1.hostname`
(un segment numérique indexe un tableau).
*/

use anyhow::Result;
use serde_json::Value;

/// Active env_logger une seule fois pour la session de test
pub fn init_test_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

pub fn json_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        current = match current {
            Value::Object(obj) => obj.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Assert qu'un champ a une valeur spécifique
pub fn assert_field_equals(value: &Value, path: &str, expected: &Value) -> Result<()> {
    match json_field(value, path) {
        Some(actual) if actual == expected => {
            log::info!("field '{}' = {}", path, expected);
            Ok(())
        }
        Some(actual) => anyhow::bail!("Field '{}' mismatch: expected {}, got {}", path, expected, actual),
        None => anyhow::bail!("Field '{}' not found", path),
    }
}
