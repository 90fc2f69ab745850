use std::path::Path;

pub(crate) const CONFIG_FILE: &str = "chat_config.json";

const DEFAULT_FIAT_CURRENCY: &str = "USD";

#[derive(serde::Deserialize, Debug, Clone, Default)]
pub(crate) struct ChatConfig {
    pub(crate) fiat_currency_code: Option<String>,
    pub(crate) fallback_exchange_rate: Option<f64>,
    pub(crate) payment_address: Option<String>,
    pub(crate) language: Option<String>,
    pub(crate) disable_sounds: Option<bool>,
    pub(crate) disable_auto_mark_read: Option<bool>,
}

impl ChatConfig {
    pub(crate) fn fiat_currency_code(&self) -> String {
        self.fiat_currency_code
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_FIAT_CURRENCY)
            .to_uppercase()
    }

    pub(crate) fn fallback_exchange_rate(&self) -> f64 {
        self.fallback_exchange_rate
            .filter(|r| r.is_finite() && *r >= 0.0)
            .unwrap_or(0.0)
    }

    pub(crate) fn sounds_enabled(&self) -> bool {
        self.disable_sounds != Some(true)
    }

    pub(crate) fn auto_mark_read(&self) -> bool {
        self.disable_auto_mark_read != Some(true)
    }
}

/// Read `chat_config.json` from the data dir; a missing or unreadable file
/// means defaults. `TOSHI_FIAT_CURRENCY` and `TOSHI_EXCHANGE_RATE` win over
/// the file.
pub(crate) fn load_chat_config(data_dir: &str) -> ChatConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE);
    let mut cfg = match std::fs::read_to_string(&path) {
        Ok(s) => serde_json::from_str::<ChatConfig>(&s).unwrap_or_else(|e| {
            tracing::warn!(%e, path = %path.display(), "invalid chat config; using defaults");
            ChatConfig::default()
        }),
        Err(_) => ChatConfig::default(),
    };
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    cfg
}

fn apply_env_overrides(cfg: &mut ChatConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(code) = env("TOSHI_FIAT_CURRENCY").filter(|s| !s.trim().is_empty()) {
        cfg.fiat_currency_code = Some(code);
    }
    if let Some(raw) = env("TOSHI_EXCHANGE_RATE") {
        match raw.trim().parse::<f64>() {
            Ok(rate) => cfg.fallback_exchange_rate = Some(rate),
            Err(e) => tracing::warn!(%e, raw = %raw, "ignoring TOSHI_EXCHANGE_RATE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = ChatConfig::default();
        apply_env_overrides(&mut cfg, |_| None);
        assert_eq!(cfg.fiat_currency_code(), "USD");
        assert_eq!(cfg.fallback_exchange_rate(), 0.0);
        assert!(cfg.sounds_enabled());
        assert!(cfg.auto_mark_read());
        // The loader itself never fails on a bare dir.
        let _ = load_chat_config(&dir.path().to_string_lossy());
    }

    #[test]
    fn reads_file_fields() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"fiat_currency_code":"eur","fallback_exchange_rate":250.5,
                "payment_address":"0xme","disable_sounds":true}"#,
        )
        .unwrap();
        let cfg = load_chat_config(&dir.path().to_string_lossy());
        assert_eq!(cfg.fiat_currency_code(), "EUR");
        assert_eq!(cfg.fallback_exchange_rate(), 250.5);
        assert_eq!(cfg.payment_address.as_deref(), Some("0xme"));
        assert!(!cfg.sounds_enabled());
    }

    #[test]
    fn env_overrides_file() {
        let mut cfg = ChatConfig {
            fiat_currency_code: Some("EUR".into()),
            fallback_exchange_rate: Some(1.0),
            ..Default::default()
        };
        apply_env_overrides(&mut cfg, |key| match key {
            "TOSHI_FIAT_CURRENCY" => Some("GBP".into()),
            "TOSHI_EXCHANGE_RATE" => Some("nope".into()),
            _ => None,
        });
        assert_eq!(cfg.fiat_currency_code(), "GBP");
        assert_eq!(cfg.fallback_exchange_rate(), 1.0);
    }

    #[test]
    fn garbage_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();
        let cfg = load_chat_config(&dir.path().to_string_lossy());
        assert!(cfg.payment_address.is_none());
    }
}
