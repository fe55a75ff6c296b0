use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub vnpay: VnpayConfig,
    pub mail: MailConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VnpayConfig {
    pub payment_url: String,
    pub return_url: String,
    pub tmn_code: String,
    pub hash_secret: String,
    pub locale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub relay_url: Option<String>,
    pub sender: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub renewal_window_days: i64,
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "file://rently_billing.db".to_string()),

            vnpay: VnpayConfig {
                payment_url: env::var("VNPAY_PAYMENT_URL")?,
                return_url: env::var("VNPAY_RETURN_URL")?,
                tmn_code: env::var("VNPAY_TMN_CODE")?,
                hash_secret: env::var("VNPAY_HASH_SECRET")?,
                locale: env::var("VNPAY_LOCALE").unwrap_or_else(|_| "vn".to_string()),
            },

            mail: MailConfig {
                relay_url: env::var("MAIL_RELAY_URL").ok(),
                sender: env::var("MAIL_SENDER")
                    .unwrap_or_else(|_| "billing@rently.vn".to_string()),
            },

            app: AppConfig {
                renewal_window_days: env::var("RENEWAL_WINDOW_DAYS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .unwrap_or(86_400),
            },
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            renewal_window_days: 30,
            sweep_interval_secs: 86_400,
        }
    }
}
