use std::env;

const DEFAULT_LOG_FILTER: &str = "course_milestone_tracker=info";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    /// `tracing_subscriber::EnvFilter` directive
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingEnvVar("DATABASE_URL"))?;

        let database_max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(value) => value
                .trim()
                .parse()
                .ok()
                .filter(|&n: &u32| n > 0)
                .ok_or(ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?,
            None => 5,
        };

        let log_filter = lookup("TRACKER_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            database_url,
            database_max_connections,
            log_filter,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set to a production Postgres instance")]
    MissingEnvVar(&'static str),
    #[error("invalid value for environment variable {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/course")]))
            .unwrap();
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn database_url_is_required() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("DATABASE_URL")));
    }

    #[test]
    fn rejects_bad_pool_size() {
        for value in ["zero", "0", "-3"] {
            let err = Config::from_lookup(lookup_from(&[
                ("DATABASE_URL", "postgres://localhost/course"),
                ("DATABASE_MAX_CONNECTIONS", value),
            ]))
            .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS")));
        }
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/course"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("TRACKER_LOG", "debug"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "postgres://db/course");
        assert_eq!(config.database_max_connections, 12);
        assert_eq!(config.log_filter, "debug");
    }
}
