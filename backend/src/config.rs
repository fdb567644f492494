use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_host: String,
    pub port: u16,
    pub database_url: String,
    /// `None` means a per-process secret is generated at startup.
    pub jwt_secret: Option<String>,
    pub model_path: PathBuf,
    pub model_url: Option<String>,
    pub preprocessing_config: PathBuf,
    pub disease_seed_path: PathBuf,
    pub media_root: PathBuf,
    pub transient_upload_dir: PathBuf,
    pub transient_ttl: Duration,
    pub max_upload_bytes: usize,
    pub classify_timeout: Duration,
    pub history_page_size: u32,
    pub recent_limit: u32,
    pub stash_ttl: Duration,
}

#[cfg(all(feature = "torch", not(feature = "onnx")))]
const DEFAULT_MODEL_PATH: &str = "model/rice_model.pt";
#[cfg(not(all(feature = "torch", not(feature = "onnx"))))]
const DEFAULT_MODEL_PATH: &str = "model/rice_model.onnx";

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            bind_host: text("BIND_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 5000)?,
            database_url: text("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://leafscan.db".to_string()),
            jwt_secret: text("JWT_SECRET"),
            model_path: text("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            model_url: text("MODEL_URL"),
            preprocessing_config: text("PREPROCESSING_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config/preprocessing.yaml")),
            disease_seed_path: text("DISEASE_SEED_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config/diseases.yaml")),
            media_root: text("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("media")),
            transient_upload_dir: text("TRANSIENT_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("leafscan-captures")),
            transient_ttl: Duration::from_secs(parse_or(&lookup, "TRANSIENT_TTL_SECS", 24 * 60 * 60)?),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 16 * 1024 * 1024)?,
            classify_timeout: Duration::from_secs(parse_or(&lookup, "CLASSIFY_TIMEOUT_SECS", 30)?),
            history_page_size: parse_or(&lookup, "HISTORY_PAGE_SIZE", 5)?,
            recent_limit: parse_or(&lookup, "RECENT_LIMIT", 5)?,
            stash_ttl: Duration::from_secs(parse_or(&lookup, "STASH_TTL_SECS", 300)?),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        Some(value) if !value.is_empty() => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.bind_address(), "0.0.0.0:5000");
        assert_eq!(config.database_url, "sqlite://leafscan.db");
        assert!(config.jwt_secret.is_none());
        assert!(config.model_url.is_none());
        assert_eq!(config.history_page_size, 5);
        assert_eq!(config.classify_timeout, Duration::from_secs(30));
        assert_eq!(config.transient_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("PORT", "8081"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("JWT_SECRET", "s3cret"),
            ("STASH_TTL_SECS", "60"),
            ("MEDIA_ROOT", "/srv/media"),
            ("TRANSIENT_TTL_SECS", "600"),
        ])
        .unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.stash_ttl, Duration::from_secs(60));
        assert_eq!(config.media_root, PathBuf::from("/srv/media"));
        assert_eq!(config.transient_ttl, Duration::from_secs(600));
    }

    #[test]
    fn invalid_number_is_rejected() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "PORT", .. }));
    }
}
