use crate::embed::{fastembed_model_name, HashingEmbedder, FASTEMBED_MODELS};
use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

pub type Number = f32;

pub const EPSILON: f32 = 1e-6;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_DIMENSIONS: usize = 384;
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_STORE_DIR: &str = "ragify_store";

/// Raw values as they come out of the config file / environment layers.
#[derive(Deserialize, Default)]
pub struct RagifyConfig {
    pub store_dir: Option<String>,
    pub embedder: Option<String>,
    pub model: Option<String>,
    pub dimensions: Option<usize>,
    pub top_k: Option<usize>,
    pub log_level: Option<String>,
}

impl RagifyConfig {
    pub fn try_from(config: &Config) -> Result<Self, ConfigError> {
        Ok(RagifyConfig {
            store_dir: config.get("store_dir").ok(),
            embedder: config.get("embedder").ok(),
            model: config.get("model").ok(),
            dimensions: config.get("dimensions").ok(),
            top_k: config.get("top_k").ok(),
            log_level: config.get("log_level").ok(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    Hashing,
    FastEmbed,
}

impl EmbedderKind {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "fastembed" => Ok(Self::FastEmbed),
            other => anyhow::bail!("Unknown embedder '{}' (expected 'hashing' or 'fastembed')", other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hashing => "hashing",
            Self::FastEmbed => "fastembed",
        }
    }
}

/// Effective settings after merging defaults, `ragify_config.*` and `RAGIFY_*` variables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub store_dir: PathBuf,
    pub embedder: EmbedderKind,
    pub model: String,
    pub dimensions: usize,
    pub top_k: usize,
    pub log_level: String,
}

impl Settings {
    pub fn new() -> Result<Self> {
        let config = Config::builder()
            .add_source(ConfigFile::with_name("ragify_config").required(false))
            .add_source(Environment::with_prefix("RAGIFY"))
            .build()
            .context("Failed to read ragify configuration")?;

        let raw = RagifyConfig::try_from(&config)?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RagifyConfig) -> Result<Self> {
        let store_dir = raw
            .store_dir
            .or_else(|| env::var("RAGIFY_STORE_DIR").ok())
            .unwrap_or_else(|| DEFAULT_STORE_DIR.to_string());

        let embedder = match raw.embedder {
            Some(value) => EmbedderKind::parse(&value)?,
            None => EmbedderKind::Hashing,
        };

        let dimensions = raw.dimensions.unwrap_or(DEFAULT_DIMENSIONS);
        let top_k = raw.top_k.unwrap_or(DEFAULT_TOP_K);
        let log_level = raw.log_level.unwrap_or_else(|| "warn".to_string());

        if dimensions == 0 {
            anyhow::bail!("RAGIFY_DIMENSIONS must be greater than zero.");
        }
        if top_k == 0 {
            anyhow::bail!("RAGIFY_TOP_K must be greater than zero.");
        }

        let model = resolve_model(embedder, raw.model, dimensions)?;

        Ok(Self {
            store_dir: PathBuf::from(store_dir),
            embedder,
            model,
            dimensions,
            top_k,
            log_level,
        })
    }

    pub fn print_config(&self) {
        println!("store_dir={}", self.store_dir.display());
        println!("embedder={}", self.embedder.as_str());
        println!("model={}", self.model);
        println!("dimensions={}", self.dimensions);
        println!("top_k={}", self.top_k);
        println!("log_level={}", self.log_level);
    }
}

/// The model identity `embedder` will run with. The hashing embedder has exactly one
/// model per dimension; fastembed accepts the names in [`FASTEMBED_MODELS`].
fn resolve_model(embedder: EmbedderKind, model: Option<String>, dimensions: usize) -> Result<String> {
    match embedder {
        EmbedderKind::Hashing => {
            let hashing = HashingEmbedder::model_id_for(dimensions);
            match model {
                Some(name) if name != hashing => anyhow::bail!(
                    "Model '{}' requires RAGIFY_EMBEDDER=fastembed (the hashing embedder is '{}')",
                    name,
                    hashing
                ),
                _ => Ok(hashing),
            }
        }
        EmbedderKind::FastEmbed => {
            let name = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
            match fastembed_model_name(&name) {
                Some(canonical) => Ok(canonical.to_string()),
                None => anyhow::bail!(
                    "Unknown fastembed model '{}' (expected one of: {})",
                    name,
                    FASTEMBED_MODELS.join(", ")
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::Embedder;

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = Settings::from_raw(RagifyConfig {
            store_dir: Some("/tmp/store".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(settings.store_dir, PathBuf::from("/tmp/store"));
        assert_eq!(settings.embedder, EmbedderKind::Hashing);
        assert_eq!(settings.model, "hashing-sha256-384");
        assert_eq!(settings.dimensions, DEFAULT_DIMENSIONS);
        assert_eq!(settings.top_k, DEFAULT_TOP_K);
    }

    #[test]
    fn embedder_name_is_case_insensitive() {
        let settings = Settings::from_raw(RagifyConfig {
            store_dir: Some("s".into()),
            embedder: Some("FastEmbed".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(settings.embedder, EmbedderKind::FastEmbed);
        assert_eq!(settings.model, DEFAULT_MODEL);
    }

    #[test]
    fn hashing_model_matches_the_embedder_it_builds() {
        let settings = Settings::from_raw(RagifyConfig {
            store_dir: Some("s".into()),
            dimensions: Some(128),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(settings.model, HashingEmbedder::new(128).model_id());

        // Naming the hashing model explicitly is accepted
        let explicit = Settings::from_raw(RagifyConfig {
            store_dir: Some("s".into()),
            model: Some("hashing-sha256-128".into()),
            dimensions: Some(128),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(explicit.model, settings.model);
    }

    #[test]
    fn model_is_validated_against_the_embedder() {
        let canonical = Settings::from_raw(RagifyConfig {
            store_dir: Some("s".into()),
            embedder: Some("fastembed".into()),
            model: Some("BGE-Small-EN-v1.5".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(canonical.model, "bge-small-en-v1.5");

        let unknown = Settings::from_raw(RagifyConfig {
            store_dir: Some("s".into()),
            embedder: Some("fastembed".into()),
            model: Some("text-embedding-3-large".into()),
            ..Default::default()
        });
        let message = unknown.unwrap_err().to_string();
        assert!(message.contains("text-embedding-3-large"), "{message}");

        // A sentence-transformer name has no effect on the hashing embedder
        let ignored = Settings::from_raw(RagifyConfig {
            store_dir: Some("s".into()),
            model: Some(DEFAULT_MODEL.into()),
            ..Default::default()
        });
        assert!(ignored.is_err());

        let wrong_width = Settings::from_raw(RagifyConfig {
            store_dir: Some("s".into()),
            model: Some("hashing-sha256-64".into()),
            dimensions: Some(128),
            ..Default::default()
        });
        assert!(wrong_width.is_err());
    }

    #[test]
    fn rejects_unknown_embedder_and_zero_values() {
        let unknown = RagifyConfig {
            store_dir: Some("s".into()),
            embedder: Some("openai".into()),
            ..Default::default()
        };
        assert!(Settings::from_raw(unknown).is_err());

        let zero_k = RagifyConfig {
            store_dir: Some("s".into()),
            top_k: Some(0),
            ..Default::default()
        };
        assert!(Settings::from_raw(zero_k).is_err());

        let zero_dim = RagifyConfig {
            store_dir: Some("s".into()),
            dimensions: Some(0),
            ..Default::default()
        };
        assert!(Settings::from_raw(zero_dim).is_err());
    }
}
