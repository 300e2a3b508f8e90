// Server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. The DB pool still reads its own sizing variables.

use std::net::SocketAddr;

use casegate_common::query::{
    assembler::DEFAULT_PAGE_SIZE, AssemblerConfig, PlaceholderStyle, StateRestrictionPolicy,
};

const DEV_JWT_SECRET: &str = "casegate_local_development_jwt_secret_must_be_32_chars";

/// Core server configuration.
///
/// Constructed via [`ServerConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// HS256 secret for caller access tokens.
    pub jwt_secret: String,
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Log filter directive (e.g. `info`, `casegate_server=debug`).
    pub log_filter: String,
    /// Use pattern matching instead of equality for every search criterion.
    pub wildcard_search: bool,
    /// Rows per search page.
    pub page_size: u32,
    /// Callers holding a role with this prefix see every row of a case type.
    pub unrestricted_role_prefix: String,
    /// Leave the state column unrestricted when no state is readable.
    pub empty_states_fail_open: bool,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `CASEGATE_HOST` | `0.0.0.0` |
    /// | `CASEGATE_PORT` | `4452` |
    /// | `CASEGATE_JWT_SECRET` | dev-only placeholder |
    /// | `CASEGATE_DATABASE_URL` | *(none)* |
    /// | `CASEGATE_LOG_FILTER` | `info` |
    /// | `CASEGATE_WILDCARD_SEARCH` | `false` |
    /// | `CASEGATE_PAGE_SIZE` | `25` |
    /// | `CASEGATE_UNRESTRICTED_ROLE_PREFIX` | `caseworker` |
    /// | `CASEGATE_EMPTY_STATES_FAIL_OPEN` | `false` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("CASEGATE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("CASEGATE_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(4452);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let jwt_secret = env("CASEGATE_JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.into());
        let database_url = env("CASEGATE_DATABASE_URL").ok();
        let log_filter = env("CASEGATE_LOG_FILTER").unwrap_or_else(|_| "info".into());

        let wildcard_search = env("CASEGATE_WILDCARD_SEARCH").ok().is_some_and(|v| parse_flag(&v));
        let page_size = env("CASEGATE_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let unrestricted_role_prefix = env("CASEGATE_UNRESTRICTED_ROLE_PREFIX")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "caseworker".into());
        let empty_states_fail_open =
            env("CASEGATE_EMPTY_STATES_FAIL_OPEN").ok().is_some_and(|v| parse_flag(&v));

        Self {
            listen_addr,
            jwt_secret,
            database_url,
            log_filter,
            wildcard_search,
            page_size,
            unrestricted_role_prefix,
            empty_states_fail_open,
        }
    }

    /// Returns true when using the development-only JWT secret.
    pub fn is_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    /// Assembler settings for the PostgreSQL execution channel.
    pub fn assembler_config(&self) -> AssemblerConfig {
        AssemblerConfig {
            wildcard_search: self.wildcard_search,
            placeholder_style: PlaceholderStyle::Dollar,
            page_size: self.page_size,
            empty_states: if self.empty_states_fail_open {
                StateRestrictionPolicy::OmitWhenEmpty
            } else {
                StateRestrictionPolicy::FailClosed
            },
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from_map(
        map: HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> {
        move |key: &str| map.get(key).map(|v| v.to_string()).ok_or(std::env::VarError::NotPresent)
    }

    #[test]
    fn defaults_when_no_env_vars() {
        let cfg = ServerConfig::from_env_fn(env_from_map(HashMap::new()));
        assert_eq!(cfg.listen_addr.port(), 4452);
        assert_eq!(cfg.listen_addr.ip().to_string(), "0.0.0.0");
        assert!(cfg.is_dev_jwt_secret());
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.log_filter, "info");
        assert!(!cfg.wildcard_search);
        assert_eq!(cfg.page_size, 25);
        assert_eq!(cfg.unrestricted_role_prefix, "caseworker");
        assert!(!cfg.empty_states_fail_open);
    }

    #[test]
    fn custom_host_and_port() {
        let mut m = HashMap::new();
        m.insert("CASEGATE_HOST", "127.0.0.1");
        m.insert("CASEGATE_PORT", "3000");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn invalid_port_uses_default() {
        let mut m = HashMap::new();
        m.insert("CASEGATE_PORT", "not_a_number");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.port(), 4452);
    }

    #[test]
    fn custom_jwt_secret_is_not_dev() {
        let mut m = HashMap::new();
        m.insert("CASEGATE_JWT_SECRET", "production_secret_at_least_32_chars!!");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert!(!cfg.is_dev_jwt_secret());
    }

    #[test]
    fn database_url_from_env() {
        let mut m = HashMap::new();
        m.insert("CASEGATE_DATABASE_URL", "postgres://u:p@host/db");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://u:p@host/db"));
    }

    #[test]
    fn search_flags_from_env() {
        let mut m = HashMap::new();
        m.insert("CASEGATE_WILDCARD_SEARCH", "TRUE");
        m.insert("CASEGATE_EMPTY_STATES_FAIL_OPEN", "1");
        m.insert("CASEGATE_PAGE_SIZE", "50");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        let assembler = cfg.assembler_config();
        assert!(assembler.wildcard_search);
        assert_eq!(assembler.page_size, 50);
        assert_eq!(assembler.placeholder_style, PlaceholderStyle::Dollar);
        assert_eq!(assembler.empty_states, StateRestrictionPolicy::OmitWhenEmpty);
    }

    #[test]
    fn zero_page_size_uses_default() {
        let mut m = HashMap::new();
        m.insert("CASEGATE_PAGE_SIZE", "0");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.page_size, 25);
    }

    #[test]
    fn blank_role_prefix_uses_default() {
        let mut m = HashMap::new();
        m.insert("CASEGATE_UNRESTRICTED_ROLE_PREFIX", "  ");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.unrestricted_role_prefix, "caseworker");
    }

    #[test]
    fn log_filter_override() {
        let mut m = HashMap::new();
        m.insert("CASEGATE_LOG_FILTER", "debug,casegate_server=trace");
        let cfg = ServerConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.log_filter, "debug,casegate_server=trace");
    }
}
