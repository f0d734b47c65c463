use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub telegram_api_url: String,
    pub bot_token: String,
    pub link_bot_token: String,
    pub webhook_secret: String,
    pub payment_provider_token: String,
    pub currency: String,
    pub hold_minutes: i64,
    pub grace_minutes: i64,
    pub sweep_interval_secs: u64,
    pub page_size: u32,
    pub support_text: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        Self {
            port: parse_var("PORT", 3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "parkbot.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            telegram_api_url: env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            link_bot_token: env::var("TELEGRAM_LINK_BOT_TOKEN")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| bot_token.clone()),
            bot_token,
            webhook_secret: env::var("TELEGRAM_WEBHOOK_SECRET").unwrap_or_default(),
            payment_provider_token: env::var("PAYMENT_PROVIDER_TOKEN").unwrap_or_default(),
            currency: env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "KZT".to_string()),
            hold_minutes: parse_var("HOLD_MINUTES", 15),
            grace_minutes: parse_var("GRACE_MINUTES", 10),
            sweep_interval_secs: parse_var("SWEEP_INTERVAL_SECS", 60),
            page_size: parse_var("PAGE_SIZE", 6),
            support_text: env::var("SUPPORT_TEXT").unwrap_or_else(|_| {
                "Need help? Write to our support team and we will get back to you.".to_string()
            }),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
