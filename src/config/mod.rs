//! Key/value configuration: built-in defaults, overlaid by an optional
//! `.vizflowrc` file, overlaid by environment variables.

use std::{
    collections::HashMap,
    env, fs,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use directories::BaseDirs;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let mut map = default_map();
        let config_path = default_config_path();

        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        map.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }

        // Environment variables take precedence
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Ok(v) = env::var(key) {
            return Some(v);
        }
        self.inner.get(key).cloned()
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "OPENAI_API_KEY",
        "API_BASE_URL",
        "REQUEST_TIMEOUT",
        "GENERATION_MODEL",
        "REFLECTION_MODEL",
        "DATA_PATH",
        "CHARTS_DIR",
        "DEFAULT_INSTRUCTION",
    ];

    KEYS.contains(&k) || k.starts_with("VIZFLOW_") || k.starts_with("OPENAI_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("vizflow").join(".vizflowrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    // Paths
    m.insert("DATA_PATH".into(), "data/coffee_sales.csv".into());
    m.insert("CHARTS_DIR".into(), "outputs/charts".into());

    // Models
    m.insert("GENERATION_MODEL".into(), "gpt-4o-mini".into());
    m.insert("REFLECTION_MODEL".into(), "gpt-4o".into());

    // Numbers
    m.insert("REQUEST_TIMEOUT".into(), "120".into());

    // Strings
    m.insert("API_BASE_URL".into(), "default".into());
    m.insert(
        "DEFAULT_INSTRUCTION".into(),
        "Create a plot comparing Q1 sales in 2024 and 2025.".into(),
    );

    m
}
