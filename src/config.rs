use std::env;

use thiserror::Error;

use crate::listing::TextMatch;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageKind {
    S3,
    Gcs,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub kind: StorageKind,
    /// S3-compatible endpoint, e.g. the hosted backend's `/storage/v1/s3`
    pub s3_endpoint: Option<String>,
    pub s3_region: String,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    /// Base URL public object links are built from
    pub public_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub storage: StorageConfig,
    pub search_fold_diacritics: bool,
    pub export_author: String,
    pub export_company: String,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));
        let or_default = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let server_port = parse_var(&lookup, "SERVER_PORT", 50051u16)?;
        let max_upload_bytes = parse_var(&lookup, "MAX_UPLOAD_BYTES", 20 * 1024 * 1024usize)?;
        let search_fold_diacritics = parse_bool(&lookup, "SEARCH_FOLD_DIACRITICS")?;

        let kind = match or_default("STORAGE_BACKEND", "s3").to_lowercase().as_str() {
            "s3" => StorageKind::S3,
            "gcs" => StorageKind::Gcs,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            server_host: or_default("SERVER_HOST", "0.0.0.0"),
            server_port,
            jwt_secret: required("JWT_SECRET")?,
            jwt_audience: or_default("JWT_AUDIENCE", "authenticated"),
            storage: StorageConfig {
                kind,
                s3_endpoint: lookup("S3_ENDPOINT"),
                s3_region: or_default("S3_REGION", "auto"),
                s3_access_key: lookup("S3_ACCESS_KEY"),
                s3_secret_key: lookup("S3_SECRET_KEY"),
                public_url: lookup("STORAGE_PUBLIC_URL"),
            },
            search_fold_diacritics,
            export_author: or_default("EXPORT_AUTHOR", "Portal de Chipindo"),
            export_company: or_default("EXPORT_COMPANY", "Município de Chipindo"),
            max_upload_bytes,
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn text_match(&self) -> TextMatch {
        if self.search_fold_diacritics {
            TextMatch::FoldDiacritics
        } else {
            TextMatch::CaseInsensitive
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, name: &'static str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).as_deref().map(str::trim) {
        None | Some("") | Some("0") | Some("false") => Ok(false),
        Some("1") | Some("true") => Ok(true),
        Some(other) => Err(ConfigError::Invalid {
            name,
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_with(&[("DATABASE_URL", "postgres://x"), ("JWT_SECRET", "s")]).unwrap();
        assert_eq!(config.server_addr(), "0.0.0.0:50051");
        assert_eq!(config.jwt_audience, "authenticated");
        assert_eq!(config.storage.kind, StorageKind::S3);
        assert_eq!(config.text_match(), TextMatch::CaseInsensitive);
        assert_eq!(config.export_company, "Município de Chipindo");
    }

    #[test]
    fn test_missing_required() {
        let err = config_with(&[("JWT_SECRET", "s")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_invalid_values() {
        let base = [("DATABASE_URL", "postgres://x"), ("JWT_SECRET", "s")];

        let mut vars = base.to_vec();
        vars.push(("SERVER_PORT", "http"));
        assert!(matches!(
            config_with(&vars),
            Err(ConfigError::Invalid { name: "SERVER_PORT", .. })
        ));

        let mut vars = base.to_vec();
        vars.push(("STORAGE_BACKEND", "ftp"));
        assert!(config_with(&vars).is_err());
    }

    #[test]
    fn test_fold_diacritics_flag() {
        let config = config_with(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("SEARCH_FOLD_DIACRITICS", "true"),
            ("STORAGE_BACKEND", "GCS"),
        ])
        .unwrap();
        assert_eq!(config.text_match(), TextMatch::FoldDiacritics);
        assert_eq!(config.storage.kind, StorageKind::Gcs);
    }
}
