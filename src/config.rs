//! Explicit configuration value threaded through every pipeline stage.
//!
//! The original compiler kept configuration as a global singleton; this
//! port makes it a plain value (Design Note, spec §9) so nothing
//! process-wide is mutated during compilation.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One `[Configuration]` block as parsed from source, or the defaults used
/// when a compilation has none.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub debug_mode: bool,
    pub disable_name_group: bool,
    pub disable_custom_origin_type: bool,
    pub disable_style_auto_add_class: bool,
    pub disable_style_auto_add_id: bool,
    pub disable_script_auto_add_class: bool,
    pub disable_script_auto_add_id: bool,
    pub disable_default_namespace: bool,
    pub index_initial_count: i64,

    /// `[Name]` block: renames of built-in keywords (e.g. `text` -> `txt`).
    pub keyword_renames: HashMap<String, String>,
    /// `[OriginType]` block: registers additional origin type tags beyond
    /// the built-in `@Html`/`@Style`/`@JavaScript`.
    pub custom_origin_types: Vec<String>,

    /// Directories searched for `chtl::`-prefixed imports, in order.
    #[serde(skip)]
    pub official_module_paths: Vec<PathBuf>,
    /// Directories searched for bare import paths, after official paths.
    #[serde(skip)]
    pub module_paths: Vec<PathBuf>,

    /// Wall-clock budget for the watchdog, in milliseconds. `None` disables it.
    #[serde(skip)]
    pub timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug_mode: false,
            disable_name_group: false,
            disable_custom_origin_type: false,
            disable_style_auto_add_class: false,
            disable_style_auto_add_id: false,
            disable_script_auto_add_class: false,
            disable_script_auto_add_id: false,
            disable_default_namespace: false,
            index_initial_count: 0,
            keyword_renames: HashMap::new(),
            custom_origin_types: Vec::new(),
            official_module_paths: Vec::new(),
            module_paths: Vec::new(),
            timeout_ms: None,
        }
    }
}

impl Config {
    /// Resolve a keyword through any `[Name]` rename, falling back to the
    /// built-in spelling when no rename (or `DISABLE_NAME_GROUP`) applies.
    pub fn keyword(&self, builtin: &str) -> &str {
        if self.disable_name_group {
            return builtin;
        }
        self.keyword_renames
            .iter()
            .find(|(_, v)| v.as_str() == builtin)
            .map(|(k, _)| k.as_str())
            .unwrap_or(builtin)
    }

    /// Whether `tag` is a recognized origin type, built-in or registered
    /// via `[OriginType]` (unless `DISABLE_CUSTOM_ORIGIN_TYPE` is set).
    pub fn is_known_origin_type(&self, tag: &str) -> bool {
        matches!(tag, "@Html" | "@Style" | "@JavaScript")
            || (!self.disable_custom_origin_type && self.custom_origin_types.iter().any(|t| t == tag))
    }

    /// Apply one `key = value` setting from a `[Configuration]` body.
    /// Returns `false` if `key` is not a recognized setting.
    pub fn apply_setting(&mut self, key: &str, value: &str) -> bool {
        match key {
            "DEBUG_MODE" => self.debug_mode = parse_bool(value),
            "DISABLE_NAME_GROUP" => self.disable_name_group = parse_bool(value),
            "DISABLE_CUSTOM_ORIGIN_TYPE" => self.disable_custom_origin_type = parse_bool(value),
            "DISABLE_STYLE_AUTO_ADD_CLASS" => self.disable_style_auto_add_class = parse_bool(value),
            "DISABLE_STYLE_AUTO_ADD_ID" => self.disable_style_auto_add_id = parse_bool(value),
            "DISABLE_SCRIPT_AUTO_ADD_CLASS" => self.disable_script_auto_add_class = parse_bool(value),
            "DISABLE_SCRIPT_AUTO_ADD_ID" => self.disable_script_auto_add_id = parse_bool(value),
            "DISABLE_DEFAULT_NAMESPACE" => self.disable_default_namespace = parse_bool(value),
            "INDEX_INITIAL_COUNT" => {
                self.index_initial_count = value.parse().unwrap_or(0);
            }
            _ => return false,
        }
        true
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim(), "true" | "1" | "yes")
}

/// Hook interface invoked by the parser at declaration boundaries, mirroring
/// `CompileTimeListener` in the original implementation. Useful for tooling
/// (editors, tests) that want parse-order visibility without coupling to
/// the AST shape.
pub trait CompileListener: std::fmt::Debug {
    fn on_declaration(&mut self, kind: &str, name: &str, line: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive() {
        let config = Config::default();
        assert!(!config.disable_style_auto_add_class);
        assert!(config.is_known_origin_type("@Html"));
        assert!(!config.is_known_origin_type("@Custom"));
    }

    #[test]
    fn apply_setting_parses_known_keys() {
        let mut config = Config::default();
        assert!(config.apply_setting("DISABLE_STYLE_AUTO_ADD_CLASS", "true"));
        assert!(config.disable_style_auto_add_class);
        assert!(!config.apply_setting("NOT_A_REAL_KEY", "true"));
    }

    #[test]
    fn custom_origin_type_respects_disable_flag() {
        let mut config = Config::default();
        config.custom_origin_types.push("@Markdown".to_string());
        assert!(config.is_known_origin_type("@Markdown"));
        config.disable_custom_origin_type = true;
        assert!(!config.is_known_origin_type("@Markdown"));
    }
}
