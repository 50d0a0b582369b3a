use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;

use crate::grading::GradingScheme;

pub const DEFAULT_DB_PATH: &str = "data/storage.db";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_path: PathBuf,
    pub host: IpAddr,
    pub port: u16,
    pub scheme_path: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_path = lookup("ASSESSMENT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let host = match lookup("ASSESSMENT_HOST") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("ASSESSMENT_HOST is not an IP address: {raw}"))?,
            None => IpAddr::V4(Ipv4Addr::LOCALHOST),
        };

        let port = match lookup("BACKEND_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("BACKEND_PORT is not a port number: {raw}"))?,
            None => DEFAULT_PORT,
        };

        let scheme_path = lookup("ASSESSMENT_SCHEME").map(PathBuf::from);

        Ok(Self {
            database_path,
            host,
            port,
            scheme_path,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn load_scheme(&self) -> anyhow::Result<GradingScheme> {
        match &self.scheme_path {
            Some(path) => GradingScheme::from_path(path),
            None => Ok(GradingScheme::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> anyhow::Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_desktop_shell() {
        let settings = settings(&[]).expect("defaults");
        assert_eq!(settings.database_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(settings.bind_addr().to_string(), "127.0.0.1:8000");
        assert_eq!(settings.scheme_path, None);
    }

    #[test]
    fn environment_overrides_defaults() {
        let settings = settings(&[
            ("ASSESSMENT_DB_PATH", "/tmp/hub.db"),
            ("ASSESSMENT_HOST", "0.0.0.0"),
            ("BACKEND_PORT", "9100"),
            ("ASSESSMENT_SCHEME", "scheme.json"),
        ])
        .expect("valid settings");

        assert_eq!(settings.database_path, PathBuf::from("/tmp/hub.db"));
        assert_eq!(settings.bind_addr().to_string(), "0.0.0.0:9100");
        assert_eq!(settings.scheme_path, Some(PathBuf::from("scheme.json")));
    }

    #[test]
    fn invalid_port_is_an_error() {
        let err = settings(&[("BACKEND_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("BACKEND_PORT"));
    }

    #[test]
    fn default_scheme_when_no_path() {
        let settings = settings(&[]).expect("defaults");
        assert_eq!(
            settings.load_scheme().expect("scheme"),
            GradingScheme::default()
        );
    }
}
