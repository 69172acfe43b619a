/*!
# MAPP DevKit - Fixtures et utilitaires pour les tests du kernel

Bibliothèque facilitant l'écriture de tests avec:
- Construction de feuilles CSV au format d'ingestion
- Payloads prêts à poster (schéma, relevés live)
- Assertions sur les réponses JSON
*/

pub mod payloads;
pub mod sheet;
pub mod test_utils;

pub use payloads::{schema_update, LiveUpdateBuilder};
pub use sheet::SheetBuilder;
pub use test_utils::{assert_field_equals, init_test_logging, json_field};
