use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub listen: String,
    /// Site dont `<site>-rooms` est la liste globale des salles
    pub primary_site: String,
    /// Header posé par le proxy d'authentification frontal
    pub viewer_header: String,
    pub refresh_max_age_secs: u32,
    pub store: StoreConf,
    pub directory: DirectoryConf,
    /// Clés de callback ajoutées à `authorised-key` au démarrage
    pub authorised_keys: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConf {
    Memory { snapshot: Option<String> },
    Redis { url: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct DirectoryConf {
    #[serde(default)]
    pub people: HashMap<String, String>, // identifiant -> nom affiché
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            primary_site: "forresthill".into(),
            viewer_header: "x-remote-user".into(),
            refresh_max_age_secs: 60,
            store: StoreConf::default(),
            directory: DirectoryConf::default(),
            authorised_keys: Vec::new(),
        }
    }
}

impl Default for StoreConf {
    fn default() -> Self {
        Self::Memory { snapshot: None }
    }
}

pub fn parse_config(txt: &str) -> KernelConfig {
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "[kernel] config invalide, usage config par défaut");
        KernelConfig::default()
    })
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("MAPP_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        parse_config(&txt)
    } else {
        tracing::warn!(path = %path, "[kernel] pas de fichier de config, usage config par défaut");
        KernelConfig::default()
    }
}
