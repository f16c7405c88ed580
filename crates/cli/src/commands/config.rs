use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dentalfly_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// A rendered setting: dotted key, display value and the env var that can
/// override it.
struct Setting {
    key: &'static str,
    value: String,
    env_key: &'static str,
}

impl Setting {
    fn new(key: &'static str, value: impl Into<String>, env_key: &'static str) -> Self {
        Self { key, value: value.into(), env_key }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for setting in settings(&config) {
        let source = field_source(
            setting.key,
            setting.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(setting.key, &setting.value, source));
    }

    lines.join("\n")
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    let auth_token = match &config.api.auth_token {
        Some(token) => redact_token(token.expose_secret()),
        None => "<unset>".to_string(),
    };

    vec![
        Setting::new("database.url", config.database.url.clone(), "DENTALFLY_DATABASE_URL"),
        Setting::new(
            "database.max_connections",
            config.database.max_connections.to_string(),
            "DENTALFLY_DATABASE_MAX_CONNECTIONS",
        ),
        Setting::new(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "DENTALFLY_DATABASE_TIMEOUT_SECS",
        ),
        Setting::new(
            "server.bind_address",
            config.server.bind_address.clone(),
            "DENTALFLY_SERVER_BIND_ADDRESS",
        ),
        Setting::new("server.port", config.server.port.to_string(), "DENTALFLY_SERVER_PORT"),
        Setting::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            "DENTALFLY_SERVER_GRACEFUL_SHUTDOWN_SECS",
        ),
        Setting::new(
            "api.base_url",
            config.api.base_url.as_deref().unwrap_or("<unset>"),
            "DENTALFLY_API_BASE_URL",
        ),
        Setting::new("api.timeout_secs", config.api.timeout_secs.to_string(), "DENTALFLY_API_TIMEOUT_SECS"),
        Setting::new("api.auth_token", auth_token, "DENTALFLY_API_AUTH_TOKEN"),
        Setting::new(
            "pricing.reference_currency",
            config.pricing.reference_currency.clone(),
            "DENTALFLY_PRICING_REFERENCE_CURRENCY",
        ),
        Setting::new(
            "pricing.local_currency",
            config.pricing.local_currency.clone(),
            "DENTALFLY_PRICING_LOCAL_CURRENCY",
        ),
        Setting::new(
            "pricing.degraded_promo_fallback",
            config.pricing.degraded_promo_fallback.to_string(),
            "DENTALFLY_PRICING_DEGRADED_PROMO_FALLBACK",
        ),
        Setting::new("logging.level", config.logging.level.clone(), "DENTALFLY_LOGGING_LEVEL"),
        Setting::new(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            "DENTALFLY_LOGGING_FORMAT",
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("dentalfly.toml"), PathBuf::from("config/dentalfly.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the last four characters so operators can tell tokens apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= 8 {
        return "<redacted>".to_string();
    }

    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}

#[cfg(test)]
mod tests {
    use dentalfly_core::config::AppConfig;
    use toml::Value;

    use super::{contains_path, redact_token, settings};

    #[test]
    fn short_tokens_are_fully_redacted() {
        assert_eq!(redact_token("  "), "<empty>");
        assert_eq!(redact_token("abc123"), "<redacted>");
        assert_eq!(redact_token("pt_live_0123456789abcd"), "***abcd");
    }

    #[test]
    fn nested_keys_are_found_in_config_file() {
        let doc: Value = "[pricing]\nlocal_currency = \"TRY\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "pricing.local_currency"));
        assert!(!contains_path(&doc, "pricing.reference_currency"));
        assert!(!contains_path(&doc, "database.url"));
    }

    #[test]
    fn auth_token_never_rendered_in_clear() {
        let mut config = AppConfig::default();
        config.api.auth_token = Some("patient-portal-secret-9f2c".to_string().into());

        let rendered = settings(&config);
        let token = rendered.iter().find(|setting| setting.key == "api.auth_token").expect("token");
        assert_eq!(token.value, "***9f2c");
        assert!(rendered.iter().all(|setting| !setting.value.contains("patient-portal-secret")));
    }
}
