use postgres::Config;
use unidb_core::{DbError, Result};

/// Pool sizing for the networked engine.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions {
    /// Connections opened eagerly.
    pub minconn: usize,
    /// Upper bound; acquisition blocks when every connection is in use.
    pub maxconn: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            minconn: 1,
            maxconn: 4,
        }
    }
}

impl ConnectOptions {
    pub fn new(minconn: usize, maxconn: usize) -> Self {
        Self {
            minconn: minconn.max(1),
            maxconn: maxconn.max(minconn.max(1)),
        }
    }
}

/// Parse a connection descriptor: a `scheme://…` URI or a `k=v k=v` string.
///
/// Standard `PG*` environment variables fill in missing fields, matching
/// what the server's own client tooling does.
pub fn parse_descriptor(descriptor: &str) -> Result<Config> {
    let mut config: Config = descriptor
        .parse()
        .map_err(|e| DbError::bad_argument(format!("invalid connection descriptor: {e}")))?;

    if config.get_hosts().is_empty() {
        let host = std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string());
        config.host(&host);
    }

    if config.get_ports().is_empty() {
        let port = std::env::var("PGPORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5432);
        config.port(port);
    }

    if config.get_user().is_none() {
        let user = std::env::var("PGUSER")
            .or_else(|_| std::env::var("USER"))
            .unwrap_or_else(|_| "postgres".to_string());
        config.user(&user);
    }

    if config.get_password().is_none()
        && let Ok(password) = std::env::var("PGPASSWORD")
    {
        config.password(&password);
    }

    if config.get_dbname().is_none() {
        match std::env::var("PGDATABASE") {
            Ok(dbname) => {
                config.dbname(&dbname);
            }
            Err(_) => {
                let user = config.get_user().unwrap_or("postgres").to_string();
                config.dbname(&user);
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uri_and_keyword_forms() {
        let config = parse_descriptor("postgresql://alice:pw@db.example:5433/store").unwrap();
        assert_eq!(config.get_user(), Some("alice"));
        assert_eq!(config.get_dbname(), Some("store"));

        let config = parse_descriptor("host=db.example user=alice dbname=store").unwrap();
        assert_eq!(config.get_user(), Some("alice"));
        assert_eq!(config.get_dbname(), Some("store"));
    }

    #[test]
    fn garbage_is_rejected_before_io() {
        assert!(matches!(
            parse_descriptor("://nope"),
            Err(DbError::BadArgument(_))
        ));
    }

    #[test]
    fn options_keep_bounds_consistent() {
        let options = ConnectOptions::new(3, 1);
        assert!(options.maxconn >= options.minconn);
    }
}
