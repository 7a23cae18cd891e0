use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub mosaic: MosaicConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MosaicConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub login_url: String,
    pub search_url: String,
    pub chrome_path: Option<String>,
    pub headless: bool,
    pub login_timeout_secs: u64,
    pub page_timeout_secs: u64,
    pub navigation_retries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationsConfig {
    pub smtp: SmtpConfig,
    pub sms: SmsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub from_name: String,
    pub use_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmsConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<String>,
    pub file_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://database/courses.db".to_string(),
                max_connections: 5,
                acquire_timeout: 30,
            },
            mosaic: MosaicConfig {
                username: None,
                password: None,
                login_url: "https://csprd.mcmaster.ca/psp/prcsprd/".to_string(),
                search_url: "https://csprd.mcmaster.ca/psc/prcsprd/EMPLOYEE/SA/c/SA_LEARNER_SERVICES.CLASS_SEARCH.GBL".to_string(),
                chrome_path: None,
                headless: true,
                login_timeout_secs: 30,
                page_timeout_secs: 30,
                navigation_retries: 2,
            },
            notifications: NotificationsConfig {
                smtp: SmtpConfig {
                    host: "smtp.gmail.com".to_string(),
                    port: 587,
                    username: None,
                    password: None,
                    from_address: None,
                    from_name: "Seat Watcher".to_string(),
                    use_tls: true,
                },
                sms: SmsConfig {
                    account_sid: None,
                    auth_token: None,
                    from_number: None,
                    api_base: "https://api.twilio.com".to_string(),
                },
            },
            logging: LoggingConfig {
                level: "seat_watcher=info".to_string(),
                directory: None,
                file_prefix: "seat-watcher.log".to_string(),
            },
            metrics: MetricsConfig {
                enabled: false,
                port: 9001,
            },
        }
    }
}

impl SmtpConfig {
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Sender address, falling back to the SMTP login like most providers expect.
    pub fn sender(&self) -> Option<&str> {
        self.from_address.as_deref().or(self.username.as_deref())
    }
}

impl SmsConfig {
    pub fn is_configured(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.from_number.is_some()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env is normal outside development.
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Built-in defaults
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // SEAT_WATCHER__MOSAIC__USERNAME and friends
            .add_source(
                Environment::with_prefix("SEAT_WATCHER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;
        config.apply_legacy_env(|key| env::var(key).ok());

        config.validate()?;
        Ok(config)
    }

    /// Honour the plain variable names used by earlier deployments wherever the
    /// layered sources left a built-in default in place.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();

        if self.database.url == defaults.database.url {
            if let Some(path) = lookup("DB_PATH") {
                self.database.url = format!("sqlite://{}", path);
            }
        }

        if self.mosaic.username.is_none() {
            self.mosaic.username = lookup("MOSAIC_USERNAME");
        }
        if self.mosaic.password.is_none() {
            self.mosaic.password = lookup("MOSAIC_PASSWORD");
        }
        if self.mosaic.chrome_path.is_none() {
            self.mosaic.chrome_path = lookup("CHROME_PATH");
        }

        let smtp = &mut self.notifications.smtp;
        if smtp.host == defaults.notifications.smtp.host {
            if let Some(host) = lookup("SMTP_SERVER") {
                smtp.host = host;
            }
        }
        if smtp.port == defaults.notifications.smtp.port {
            if let Some(port) = lookup("SMTP_PORT").and_then(|p| p.parse().ok()) {
                smtp.port = port;
            }
        }
        if smtp.username.is_none() {
            smtp.username = lookup("SMTP_USERNAME");
        }
        if smtp.password.is_none() {
            smtp.password = lookup("SMTP_PASSWORD");
        }
        if smtp.from_address.is_none() {
            smtp.from_address = lookup("FROM_EMAIL");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate database configuration
        if !self.database.url.starts_with("sqlite:") {
            return Err(ConfigError::Message("Database url must be a sqlite: URL".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        // Validate Mosaic configuration
        if Url::parse(&self.mosaic.login_url).is_err() {
            return Err(ConfigError::Message("Invalid mosaic.login_url format".into()));
        }

        if Url::parse(&self.mosaic.search_url).is_err() {
            return Err(ConfigError::Message("Invalid mosaic.search_url format".into()));
        }

        if self.mosaic.login_timeout_secs == 0 || self.mosaic.page_timeout_secs == 0 {
            return Err(ConfigError::Message("Mosaic timeouts must be greater than 0".into()));
        }

        // Validate SMTP configuration
        if self.notifications.smtp.port == 0 {
            return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
        }

        if Url::parse(&self.notifications.sms.api_base).is_err() {
            return Err(ConfigError::Message("Invalid notifications.sms.api_base format".into()));
        }

        // Validate metrics configuration
        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Message("Logging level must not be empty".into()));
        }

        Ok(())
    }
}
