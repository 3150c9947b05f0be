//! Compiler and scheduler configuration.
//!
//! Options arrive as JSON from the Node side (camelCase keys) or are built
//! directly in Rust. Every field has a default so partial objects are fine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    /// File extensions treated as component sources during discovery.
    pub extensions: Vec<String>,
    /// Where lowered modules are cached between runs.
    pub cache_dir: PathBuf,
    pub cache: bool,
    /// Indentation used for injected static members.
    pub member_indent: String,
    /// Emit a warning when a tag is not a valid custom element name.
    pub validate_tag_names: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["tsx".to_string(), "ts".to_string()],
            cache_dir: PathBuf::from(".wc/cache"),
            cache: false,
            member_indent: "  ".to_string(),
            validate_tag_names: true,
        }
    }
}

impl CompileOptions {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn accepts(&self, path: &std::path::Path) -> bool {
        let is_declaration = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(".d.ts"))
            .unwrap_or(false);
        if is_declaration {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerOptions {
    /// Upper bound on tick/moduleLoad/write rotations in one `drain_all`.
    pub max_rounds: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self { max_rounds: 1000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_partial_json_uses_defaults() {
        let opts = CompileOptions::from_json(r#"{ "cache": true, "memberIndent": "    " }"#).unwrap();
        assert!(opts.cache);
        assert_eq!(opts.member_indent, "    ");
        assert_eq!(opts.extensions, vec!["tsx", "ts"]);
        assert!(opts.validate_tag_names);
    }

    #[test]
    fn test_accepts_component_sources_only() {
        let opts = CompileOptions::default();
        assert!(opts.accepts(Path::new("src/cmp-a.tsx")));
        assert!(opts.accepts(Path::new("src/util.ts")));
        assert!(!opts.accepts(Path::new("src/components.d.ts")));
        assert!(!opts.accepts(Path::new("src/cmp-a.css")));
    }
}
