#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};

use crate::error::TransformError;

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const DIAG_PARSE_FAILED: &str = "WC-ERR-TRANSFORM-001";
pub const DIAG_READ_FAILED: &str = "WC-ERR-TRANSFORM-003";
pub const DIAG_TAG_NOT_KEBAB: &str = "WC-WARN-TAG-001";
pub const DIAG_DUPLICATE_TAG: &str = "WC-WARN-TAG-002";
pub const DIAG_DYNAMIC_CONFIG: &str = "WC-WARN-CONFIG-001";

fn get_hint(code: &str) -> Option<&'static str> {
    match code {
        DIAG_PARSE_FAILED => Some("Fix the syntax error; other files keep compiling."),
        DIAG_TAG_NOT_KEBAB => {
            Some("Custom element names must be lowercase and contain a hyphen, e.g. \"my-cmp\".")
        }
        DIAG_DUPLICATE_TAG => Some("Each tag may only be declared by one component."),
        DIAG_DYNAMIC_CONFIG => {
            Some("Component options must be literals so they can be lowered at compile time.")
        }
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC RECORD
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: String,
    pub level: String,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub hints: Vec<String>,
}

impl Diagnostic {
    pub fn new(level: DiagnosticLevel, code: &str, message: &str, file: &str) -> Self {
        let level = match level {
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Error => "error",
        };
        Diagnostic {
            code: code.to_string(),
            level: level.to_string(),
            message: message.to_string(),
            file: file.to_string(),
            line: 0,
            column: 0,
            hints: get_hint(code).map(|h| vec![h.to_string()]).unwrap_or_default(),
        }
    }

    pub fn warning(code: &str, message: &str, file: &str) -> Self {
        Self::new(DiagnosticLevel::Warning, code, message, file)
    }

    pub fn error(code: &str, message: &str, file: &str) -> Self {
        Self::new(DiagnosticLevel::Error, code, message, file)
    }

    /// Attach a 1-based position computed from a byte offset into `source`.
    pub fn at_offset(mut self, source: &str, offset: u32) -> Self {
        let (line, column) = line_column(source, offset as usize);
        self.line = line;
        self.column = column;
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == "error"
    }
}

impl From<&TransformError> for Diagnostic {
    fn from(err: &TransformError) -> Self {
        let code = match err {
            TransformError::Parse { .. } => DIAG_PARSE_FAILED,
            TransformError::Read { .. } => DIAG_READ_FAILED,
        };
        Diagnostic::error(code, &err.to_string(), err.file())
    }
}

fn line_column(source: &str, offset: usize) -> (u32, u32) {
    let mut line = 1;
    let mut column = 1;
    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_to_line_column() {
        let source = "a\nbc\nd";
        assert_eq!(line_column(source, 0), (1, 1));
        assert_eq!(line_column(source, 3), (2, 2));
        assert_eq!(line_column(source, 5), (3, 1));
    }

    #[test]
    fn test_transform_error_becomes_error_diagnostic() {
        let err = TransformError::Parse {
            file: "cmp.tsx".to_string(),
            message: "Unexpected token".to_string(),
        };
        let diag = Diagnostic::from(&err);
        assert!(diag.is_error());
        assert_eq!(diag.code, DIAG_PARSE_FAILED);
        assert_eq!(diag.file, "cmp.tsx");
        assert_eq!(diag.hints.len(), 1);
    }

    #[test]
    fn test_serializes_camel_case() {
        let diag = Diagnostic::warning(DIAG_TAG_NOT_KEBAB, "bad tag", "a.tsx");
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["level"], "warning");
        assert_eq!(json["code"], "WC-WARN-TAG-001");
    }
}
