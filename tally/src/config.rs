// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{env, net::SocketAddr, str::FromStr};

use core_types::AppConfig;
use thiserror::Error;

pub const ADMIN_PASSWORD_ENV: &str = "ADMIN_PASSWORD";

/// Deployment target for the binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    pub fn label(self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(ConfigError::UnknownEnvironment {
                value: other.to_string(),
            }),
        }
    }
}

/// Everything the service needs at boot: file/env settings plus the admin
/// secret, which only ever comes from the process environment.
#[derive(Clone)]
pub struct RuntimeConfig {
    pub env: Environment,
    pub settings: AppConfig,
    pub admin_password: String,
}

impl RuntimeConfig {
    pub fn load(env: Environment) -> Result<Self, ConfigError> {
        let settings = AppConfig::load()?;
        let admin_password = require_env(ADMIN_PASSWORD_ENV)?;
        Self::from_parts(env, settings, admin_password)
    }

    pub fn from_parts(
        env: Environment,
        settings: AppConfig,
        admin_password: String,
    ) -> Result<Self, ConfigError> {
        if admin_password.is_empty() {
            return Err(ConfigError::MissingEnv {
                key: ADMIN_PASSWORD_ENV.to_string(),
            });
        }
        let config = Self {
            env,
            settings,
            admin_password,
        };
        config.bind_addr()?;
        config.metrics_addr()?;
        Ok(config)
    }

    /// Cookies carry `Secure` outside of local development.
    pub fn secure_cookies(&self) -> bool {
        self.env == Environment::Prod
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("server.bind_addr", &self.settings.server.bind_addr)
    }

    pub fn metrics_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("server.metrics_addr", &self.settings.server.metrics_addr)
    }
}

impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("env", &self.env)
            .field("settings", &self.settings)
            .field("admin_password", &"<redacted>")
            .finish()
    }
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnv {
        key: key.to_string(),
    })
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown environment '{value}' (expected 'dev' or 'prod')")]
    UnknownEnvironment { value: String },
    #[error("missing environment variable {key}")]
    MissingEnv { key: String },
    #[error("invalid socket address for {field}: '{value}'")]
    InvalidAddress { field: &'static str, value: String },
    #[error("failed to load settings: {0}")]
    Settings(#[from] config::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Prod);
        assert_eq!("dev".parse::<Environment>().unwrap().label(), "dev");
        assert!(matches!(
            "staging".parse::<Environment>(),
            Err(ConfigError::UnknownEnvironment { .. })
        ));
    }

    #[test]
    fn empty_password_and_bad_addresses_are_rejected() {
        assert!(matches!(
            RuntimeConfig::from_parts(Environment::Dev, AppConfig::default(), String::new()),
            Err(ConfigError::MissingEnv { .. })
        ));

        let mut settings = AppConfig::default();
        settings.server.bind_addr = "not-an-address".into();
        assert!(matches!(
            RuntimeConfig::from_parts(Environment::Dev, settings, "pw".into()),
            Err(ConfigError::InvalidAddress {
                field: "server.bind_addr",
                ..
            })
        ));
    }

    #[test]
    fn prod_marks_cookies_secure_and_hides_the_secret() {
        let config =
            RuntimeConfig::from_parts(Environment::Prod, AppConfig::default(), "hunter2".into())
                .unwrap();
        assert!(config.secure_cookies());
        assert_eq!(config.bind_addr().unwrap().port(), 3000);
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
