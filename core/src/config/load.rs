use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Default data directory: ~/.autoprobe
pub fn get_autoprobe_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".autoprobe"))
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    Ok(toml::from_str::<AppConfig>(&s)?)
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.autoprobe/config.toml
    let data_dir = get_autoprobe_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./autoprobe.toml
    let local_config = Path::new("autoprobe.toml");

    let cfg = if user_config.exists() {
        load_from_path(&user_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };
    Ok(finish(cfg, &data_dir))
}

/// Loads an explicitly named file, then applies the same defaults and
/// environment overrides as [`load_default`].
pub fn load_explicit(path: &Path) -> anyhow::Result<AppConfig> {
    let cfg = load_from_path(path)?;
    Ok(finish(cfg, &get_autoprobe_data_dir()?))
}

fn finish(mut cfg: AppConfig, data_dir: &Path) -> AppConfig {
    if cfg
        .storage
        .directory
        .as_deref()
        .map_or(true, |s| s.trim().is_empty())
    {
        cfg.storage.directory = Some(data_dir.join("tasks").to_string_lossy().to_string());
    }
    if cfg
        .logging
        .directory
        .as_deref()
        .map_or(true, |s| s.trim().is_empty())
    {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    cfg
}

/// Environment variables take precedence over file values. Blank values are ignored.
pub fn apply_env_overrides(cfg: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("AUTOPROBE_MAX_WORKERS").and_then(|v| v.trim().parse::<usize>().ok()) {
        if v > 0 {
            cfg.registry.max_workers = v;
        }
    }
    if let Some(v) = get("AUTOPROBE_LOG_LEVEL") {
        cfg.logging.level = v;
    }

    if let Some(v) = get("OPENAI_API_KEY") {
        cfg.inference.api_key = v;
    }
    if let Some(v) = get("OPENAI_BASE_URL") {
        cfg.inference.base_url = v;
    }
    if let Some(v) = get("OPENAI_MODEL") {
        cfg.inference.model = v;
    }
    if let Some(v) = get("OPENAI_VISION_MODEL") {
        cfg.inference.vision_model = v;
    }
    if let Some(v) = get("OPENAI_VISION_API_KEY") {
        cfg.inference.vision_api_key = Some(v);
    }
    if let Some(v) = get("OPENAI_VISION_BASE_URL") {
        cfg.inference.vision_base_url = Some(v);
    }

    if let Some(v) = get("APPIUM_DEFAULT_SCHEME") {
        cfg.driver.default_scheme = v.trim().trim_end_matches("://").to_string();
    }
    if let Some(v) = get("APPIUM_FORCE_TLS") {
        cfg.driver.force_tls = is_truthy(&v);
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut cfg: AppConfig = toml::from_str(
            r#"
            [registry]
            max_workers = 2

            [inference]
            model = "from-file"
            "#,
        )
        .unwrap();
        let env: HashMap<&str, &str> = [
            ("AUTOPROBE_MAX_WORKERS", "8"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("OPENAI_API_KEY", "  "),
            ("APPIUM_FORCE_TLS", "yes"),
            ("APPIUM_DEFAULT_SCHEME", "https://"),
        ]
        .into_iter()
        .collect();
        apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.registry.max_workers, 8);
        assert_eq!(cfg.inference.model, "gpt-4o");
        assert_eq!(cfg.inference.api_key, "");
        assert!(cfg.driver.force_tls);
        assert_eq!(cfg.driver.default_scheme, "https");
        assert_eq!(cfg.registry.delete_grace_ms, 10_000);
    }

    #[test]
    fn empty_file_yields_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.engine.max_steps, 60);
        assert_eq!(cfg.engine.parse_retries, 1);
        assert_eq!(cfg.registry.max_repeat, 500);
        assert!(cfg.engine.vision_keywords.iter().any(|k| k == "screenshot"));
    }
}
