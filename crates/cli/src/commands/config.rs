use std::env;
use std::fs;
use std::path::Path;

use tenderdesk_core::config::{resolve_config_path, LoadOptions};
use toml::Value;

use crate::commands::{load_config, CommandResult};

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("config", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let lines = [
        "effective config (source precedence: env > file > default):".to_string(),
        render_line(
            "storage.url",
            &config.storage.url,
            source("storage.url", &["TENDERDESK_STORAGE_URL"]),
        ),
        render_line(
            "storage.max_connections",
            &config.storage.max_connections.to_string(),
            source("storage.max_connections", &["TENDERDESK_STORAGE_MAX_CONNECTIONS"]),
        ),
        render_line(
            "storage.timeout_secs",
            &config.storage.timeout_secs.to_string(),
            source("storage.timeout_secs", &["TENDERDESK_STORAGE_TIMEOUT_SECS"]),
        ),
        render_line(
            "store.latency_ms",
            &config.store.latency_ms.to_string(),
            source("store.latency_ms", &["TENDERDESK_STORE_LATENCY_MS"]),
        ),
        render_line(
            "logging.level",
            &config.logging.level,
            source("logging.level", &["TENDERDESK_LOGGING_LEVEL", "TENDERDESK_LOG_LEVEL"]),
        ),
        render_line(
            "logging.format",
            &format!("{:?}", config.logging.format).to_ascii_lowercase(),
            source("logging.format", &["TENDERDESK_LOGGING_FORMAT", "TENDERDESK_LOG_FORMAT"]),
        ),
    ];

    CommandResult::success("config", lines.join("\n"))
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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

#[cfg(test)]
mod tests {
    use std::path::Path;

    use toml::Value;

    use super::{contains_path, field_source};

    #[test]
    fn nested_keys_are_found_in_config_document() {
        let doc: Value = "[store]\nlatency_ms = 0\n".parse().expect("toml");
        assert!(contains_path(&doc, "store.latency_ms"));
        assert!(!contains_path(&doc, "storage.url"));
    }

    #[test]
    fn file_source_names_the_file() {
        let doc: Value = "[storage]\nurl = \"sqlite://x.db\"\n".parse().expect("toml");
        let source = field_source(
            "storage.url",
            &["TENDERDESK_TEST_UNSET_VARIABLE"],
            Some(&doc),
            Some(Path::new("tenderdesk.toml")),
        );
        assert_eq!(source, "file (tenderdesk.toml)");
        assert_eq!(field_source("store.latency_ms", &[], Some(&doc), None), "default");
    }
}
