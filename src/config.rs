use lazy_static::lazy_static;
use regex::Regex;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

lazy_static! {
    static ref DURATION_REGEX: Regex = Regex::new(r"^\s*(\d+)\s*([smhd]?)\s*$").unwrap();
}

const DEFAULT_TOKEN_TTL: &str = "7d";

/// Credentials for the administrator created on first start
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub username: String,
    pub password: String,
    pub name: String,
}

/// Server configuration, read from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind (`HOST`, default 127.0.0.1)
    pub host: String,
    /// Port to bind (`PORT`, default 3000)
    pub port: u16,
    /// Directory holding `ports.bin.gz` and `users.json` (`DATA_DIR`)
    pub data_dir: PathBuf,
    /// Prebuilt dashboard assets served under `/static` (`STATIC_DIR`)
    pub static_dir: PathBuf,
    /// HMAC secret for session tokens (`JWT_SECRET`, required)
    pub jwt_secret: String,
    /// Session lifetime (`JWT_EXPIRES_IN`: `7d`, `12h`, `30m` or seconds)
    pub token_ttl: Duration,
    /// Mark the session cookie `Secure` (`COOKIE_SECURE`)
    pub cookie_secure: bool,
    /// First administrator (`ADMIN_USERNAME`, `ADMIN_PASSWORD`, `ADMIN_NAME`)
    pub admin: Option<AdminSeed>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingEnvVar("JWT_SECRET"))?;

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let data_dir = PathBuf::from(lookup("DATA_DIR").unwrap_or_else(|| "database".to_string()));
        let static_dir =
            PathBuf::from(lookup("STATIC_DIR").unwrap_or_else(|| "static".to_string()));

        let token_ttl = parse_duration(
            &lookup("JWT_EXPIRES_IN").unwrap_or_else(|| DEFAULT_TOKEN_TTL.to_string()),
        )
        .ok_or(ConfigError::InvalidValue("JWT_EXPIRES_IN"))?;

        let cookie_secure = match lookup("COOKIE_SECURE").as_deref() {
            None | Some("") | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(_) => return Err(ConfigError::InvalidValue("COOKIE_SECURE")),
        };

        let admin = match (lookup("ADMIN_USERNAME"), lookup("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminSeed {
                name: lookup("ADMIN_NAME").unwrap_or_else(|| "Administrator".to_string()),
                username,
                password,
            }),
            (None, None) => None,
            _ => return Err(ConfigError::InvalidValue("ADMIN_USERNAME/ADMIN_PASSWORD")),
        };

        Ok(Self {
            host,
            port,
            data_dir,
            static_dir,
            jwt_secret,
            token_ttl,
            cookie_secure,
            admin,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ports_path(&self) -> PathBuf {
        self.data_dir.join("ports.bin.gz")
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }
}

/// Parse `30`, `30s`, `15m`, `12h` or `7d`
pub fn parse_duration(value: &str) -> Option<Duration> {
    let caps = DURATION_REGEX.captures(value)?;
    let amount: u64 = caps[1].parse().ok()?;
    let unit = match &caps[2] {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return None,
    };
    let secs = amount.checked_mul(unit)?;
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config_from(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
        assert_eq!(config.ports_path(), PathBuf::from("database/ports.bin.gz"));
        assert_eq!(config.token_ttl, Duration::from_secs(7 * 24 * 3600));
        assert!(!config.cookie_secure);
        assert!(config.admin.is_none());
    }

    #[test]
    fn secret_is_required() {
        assert!(matches!(
            config_from(&[]),
            Err(ConfigError::MissingEnvVar("JWT_SECRET"))
        ));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config_from(&[("JWT_SECRET", "x"), ("PORT", "http")]).is_err());
        assert!(config_from(&[("JWT_SECRET", "x"), ("JWT_EXPIRES_IN", "soon")]).is_err());
        assert!(config_from(&[("JWT_SECRET", "x"), ("ADMIN_USERNAME", "root")]).is_err());
    }

    #[test]
    fn admin_seed_is_read() {
        let config = config_from(&[
            ("JWT_SECRET", "x"),
            ("ADMIN_USERNAME", "admin"),
            ("ADMIN_PASSWORD", "changeme"),
        ])
        .unwrap();
        let admin = config.admin.unwrap();
        assert_eq!(admin.username, "admin");
        assert_eq!(admin.name, "Administrator");
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("30m"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_duration(" 12h "), Some(Duration::from_secs(43200)));
        assert_eq!(parse_duration("0d"), None);
        assert_eq!(parse_duration("1w"), None);
    }
}
