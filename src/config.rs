use std::env;

use crate::services::schedule::DailySchedule;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub payment_gateway: PaymentGatewayConfig,
    pub mail: MailConfig,
    pub scheduler: SchedulerConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HS256 secret shared with the application that issues session tokens.
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct PaymentGatewayConfig {
    pub base_url: String,
    pub secret_key: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    /// When unset every send fails with a transport error, so the dedup ledger
    /// stays untouched and the scheduler retries once mail is configured.
    pub api_key: Option<String>,
    pub from: String,
    pub timeout_seconds: u64,
    /// Base URL used for "renew your listing" links inside emails.
    pub app_base_url: String,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Daily cron expression (`minute hour * * *`) for the reminder pass.
    pub reminder_cron: String,
    /// Daily cron expression for the expiration pass.
    pub expiration_cron: String,
    /// Day offsets before expiry at which a reminder is due, descending.
    pub reminder_days: Vec<u32>,
    pub run_on_startup: bool,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for the checkout endpoint
    pub payments_per_second: u32,
    /// Burst size for the checkout endpoint
    pub payments_burst: u32,
}

impl SchedulerConfig {
    pub fn reminder_schedule(&self) -> Result<DailySchedule, ConfigError> {
        DailySchedule::parse(&self.reminder_cron)
            .map_err(|e| ConfigError::InvalidValue(format!("SCHEDULER_REMINDER_CRON ({})", e)))
    }

    pub fn expiration_schedule(&self) -> Result<DailySchedule, ConfigError> {
        DailySchedule::parse(&self.expiration_cron)
            .map_err(|e| ConfigError::InvalidValue(format!("SCHEDULER_EXPIRATION_CRON ({})", e)))
    }
}

/// Parse a comma separated list of reminder offsets such as `7,3,1`.
///
/// The result is deduplicated and sorted in descending order so the farthest
/// reminder window is always processed first.
pub fn parse_reminder_days(raw: &str) -> Result<Vec<u32>, ConfigError> {
    let mut days = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let day: u32 = part
            .parse()
            .map_err(|_| ConfigError::InvalidValue("SCHEDULER_REMINDER_DAYS".to_string()))?;
        if day == 0 {
            return Err(ConfigError::InvalidValue(
                "SCHEDULER_REMINDER_DAYS".to_string(),
            ));
        }
        if !days.contains(&day) {
            days.push(day);
        }
    }

    if days.is_empty() {
        return Err(ConfigError::InvalidValue(
            "SCHEDULER_REMINDER_DAYS".to_string(),
        ));
    }

    days.sort_unstable_by(|a, b| b.cmp(a));
    Ok(days)
}

fn parse_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/listings.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("JWT_SECRET".to_string()))?,
            },
            payment_gateway: PaymentGatewayConfig {
                base_url: env::var("PAYMENT_GATEWAY_BASE_URL")
                    .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
                secret_key: env::var("PAYMENT_GATEWAY_SECRET_KEY").map_err(|_| {
                    ConfigError::MissingEnv("PAYMENT_GATEWAY_SECRET_KEY".to_string())
                })?,
                timeout_seconds: env::var("PAYMENT_GATEWAY_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .unwrap_or(15),
            },
            mail: MailConfig {
                api_url: env::var("MAIL_API_URL")
                    .unwrap_or_else(|_| "https://api.resend.com/emails".to_string()),
                api_key: env::var("MAIL_API_KEY").ok().filter(|v| !v.trim().is_empty()),
                from: env::var("MAIL_FROM")
                    .unwrap_or_else(|_| "Listings <no-reply@localhost>".to_string()),
                timeout_seconds: env::var("MAIL_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .unwrap_or(15),
                app_base_url: env::var("APP_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            scheduler: SchedulerConfig {
                enabled: parse_flag("SCHEDULER_ENABLED", true),
                reminder_cron: env::var("SCHEDULER_REMINDER_CRON")
                    .unwrap_or_else(|_| "0 9 * * *".to_string()),
                expiration_cron: env::var("SCHEDULER_EXPIRATION_CRON")
                    .unwrap_or_else(|_| "0 0 * * *".to_string()),
                reminder_days: parse_reminder_days(
                    &env::var("SCHEDULER_REMINDER_DAYS").unwrap_or_else(|_| "7,3,1".to_string()),
                )?,
                run_on_startup: parse_flag("SCHEDULER_RUN_ON_STARTUP", false),
            },
            rate_limit: RateLimitConfig {
                payments_per_second: env::var("RATE_LIMIT_PAYMENTS_PER_SECOND")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
                payments_burst: env::var("RATE_LIMIT_PAYMENTS_BURST")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
        };

        // Fail at startup rather than on the first scheduler tick.
        config.scheduler.reminder_schedule()?;
        config.scheduler.expiration_schedule()?;

        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://data/listings.db".to_string(),
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: String::new(),
            },
            payment_gateway: PaymentGatewayConfig {
                base_url: "https://api.paystack.co".to_string(),
                secret_key: String::new(),
                timeout_seconds: 15,
            },
            mail: MailConfig {
                api_url: "https://api.resend.com/emails".to_string(),
                api_key: None,
                from: "Listings <no-reply@localhost>".to_string(),
                timeout_seconds: 15,
                app_base_url: "http://localhost:3000".to_string(),
            },
            scheduler: SchedulerConfig {
                enabled: true,
                reminder_cron: "0 9 * * *".to_string(),
                expiration_cron: "0 0 * * *".to_string(),
                reminder_days: vec![7, 3, 1],
                run_on_startup: false,
            },
            rate_limit: RateLimitConfig {
                payments_per_second: 2,
                payments_burst: 5,
            },
        }
    }
}
