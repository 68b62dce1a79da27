use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod clash;

/// File name of the cleanup patterns sidecar, looked up next to the executable.
pub const PATTERNS_FILE: &str = "clash-yaml-merge.yaml";

/// Remove / replace patterns as written in the sidecar file.
///
/// ```yaml
/// remove:
///   - /剩余流量/
///   - /^US-.*/i
/// replace:
///   "香港": HK
///   "/^(\\w+)-(\\d+)$/": "${1}_${2}x"
/// ```
///
/// Regex replacements use `$1` / `${1}` group references; a `$` in a literal
/// pattern's replacement is kept as is.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct PatternConfig {
    #[serde(default)]
    pub remove: Vec<String>,

    #[serde(default)]
    pub replace: IndexMap<String, String>,
}

impl PatternConfig {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.replace.is_empty()
    }
}

/// Everything one pipeline run needs, resolved up front by `main`.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub template: PathBuf,
    pub source: PathBuf,
    pub target: PathBuf,
    pub patterns: PathBuf,
    pub ignore_case: bool,
}

impl RunConfig {
    /// Default file locations inside `base_dir`, as used when no flags are given.
    pub fn with_defaults(base_dir: &Path) -> Self {
        Self {
            template: base_dir.join("default.yaml"),
            source: base_dir.join("source.yaml"),
            target: base_dir.join("target.yaml"),
            patterns: base_dir.join(PATTERNS_FILE),
            ignore_case: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_config_parse() {
        let config: PatternConfig = serde_yaml::from_str(
            r#"
remove:
  - 剩余流量
  - /^US-.*/i
replace:
  "香港": HK
  "/日本/": JP
"#,
        )
        .unwrap();

        assert_eq!(config.remove, vec!["剩余流量", "/^US-.*/i"]);
        assert_eq!(config.replace.get("香港").map(String::as_str), Some("HK"));
        assert_eq!(config.replace.len(), 2);
        assert!(!config.is_empty());
    }

    #[test]
    fn test_pattern_config_missing_keys() {
        let config: PatternConfig = serde_yaml::from_str("remove: []").unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn test_run_config_defaults() {
        let config = RunConfig::with_defaults(Path::new("/opt/clash"));
        assert_eq!(config.template, Path::new("/opt/clash/default.yaml"));
        assert_eq!(config.patterns, Path::new("/opt/clash").join(PATTERNS_FILE));
        assert!(config.ignore_case);
    }
}
