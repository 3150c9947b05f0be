//! # Static Lowering
//!
//! Rewrites decorator-annotated component classes into plain classes with
//! static, read-only members:
//!
//! ```text
//! @Component({ tag: 'cmp-a', shadow: true })      export class CmpA {
//! export class CmpA {                        =>     static get is() { return "cmp-a"; }
//! }                                                 static get encapsulation() { return "shadow"; }
//!                                                 }
//! ```
//!
//! The rewrite is a pure span splice over the original text: every byte that
//! is not a `Component` decorator or an injected member is kept as is, so
//! identical input always lowers to identical output.
//!
//! Decorators are stripped even when their config is invalid; the static
//! members are only injected when a descriptor could be extracted.

#[cfg(feature = "napi")]
use napi_derive::napi;
use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_parser::Parser;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::CompileOptions;
use crate::descriptor::{extract_descriptor, ComponentDescriptor};
use crate::diagnostics::{Diagnostic, DIAG_DUPLICATE_TAG, DIAG_DYNAMIC_CONFIG, DIAG_TAG_NOT_KEBAB};
use crate::error::TransformError;
use crate::metadata::{collect_component_classes, first_error_message, source_type_for};

lazy_static! {
    /// Valid custom element name: lowercase, starts with a letter, at least one hyphen.
    static ref CUSTOM_ELEMENT_NAME_RE: Regex =
        Regex::new(r"^[a-z][a-z0-9]*(?:-[a-z0-9]+)+$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoweredModule {
    pub file_path: String,
    pub code: String,
    pub components: Vec<ComponentDescriptor>,
    pub diagnostics: Vec<Diagnostic>,
}

impl LoweredModule {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// A text edit: replace `source[start..end]` with `text`.
struct Edit {
    start: u32,
    end: u32,
    text: String,
}

pub fn is_valid_custom_element_name(tag: &str) -> bool {
    CUSTOM_ELEMENT_NAME_RE.is_match(tag)
}

/// Lower every component class of one module.
pub fn lower_module(
    source: &str,
    file_path: &str,
    options: &CompileOptions,
) -> Result<LoweredModule, TransformError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type_for(file_path)).parse();
    if ret.panicked || !ret.errors.is_empty() {
        return Err(TransformError::Parse {
            file: file_path.to_string(),
            message: first_error_message(&ret.errors),
        });
    }

    let classes = collect_component_classes(&ret.program);
    let mut edits: Vec<Edit> = Vec::new();
    let mut components = Vec::new();
    let mut diagnostics = Vec::new();
    let mut seen_tags: HashSet<String> = HashSet::new();

    for class in &classes {
        let position = class
            .decorator_spans
            .first()
            .map_or(class.span.start, |span| span.start);
        for span in &class.decorator_spans {
            edits.push(Edit {
                start: span.start,
                end: skip_trailing_whitespace(source, span.end),
                text: String::new(),
            });
        }

        let Some(config) = &class.config else {
            tracing::debug!(
                file = file_path,
                class = class.name.as_deref().unwrap_or("<anonymous>"),
                "component decorator has no readable options, skipping"
            );
            continue;
        };

        for key in &config.dynamic_keys {
            diagnostics.push(
                Diagnostic::warning(
                    DIAG_DYNAMIC_CONFIG,
                    &format!("Component option '{}' is not a literal and is ignored", key),
                    file_path,
                )
                .at_offset(source, position),
            );
        }

        let descriptor = match extract_descriptor(config) {
            Ok(descriptor) => descriptor,
            Err(reason) => {
                tracing::debug!(file = file_path, %reason, "skipping component");
                continue;
            }
        };

        if options.validate_tag_names && !is_valid_custom_element_name(&descriptor.tag) {
            diagnostics.push(
                Diagnostic::warning(
                    DIAG_TAG_NOT_KEBAB,
                    &format!("Tag '{}' is not a valid custom element name", descriptor.tag),
                    file_path,
                )
                .at_offset(source, position),
            );
        }
        if !seen_tags.insert(descriptor.tag.clone()) {
            diagnostics.push(
                Diagnostic::warning(
                    DIAG_DUPLICATE_TAG,
                    &format!("Tag '{}' is declared more than once", descriptor.tag),
                    file_path,
                )
                .at_offset(source, position),
            );
        }

        let body_is_empty = source[class.body_start as usize..].starts_with('}');
        let mut text = render_static_members(&descriptor, &options.member_indent);
        if body_is_empty {
            text.push('\n');
        }
        edits.push(Edit {
            start: class.body_start,
            end: class.body_start,
            text,
        });
        components.push(descriptor);
    }

    Ok(LoweredModule {
        file_path: file_path.to_string(),
        code: apply_edits(source, edits),
        components,
        diagnostics,
    })
}

/// The injected member block, one `static get` per line.
pub fn render_static_members(descriptor: &ComponentDescriptor, indent: &str) -> String {
    let mut out = String::new();
    for (name, value) in descriptor.static_members() {
        out.push('\n');
        out.push_str(indent);
        out.push_str(&format!("static get {}() {{ return {}; }}", name, value.encode()));
    }
    out
}

fn skip_trailing_whitespace(source: &str, from: u32) -> u32 {
    let rest = &source[from as usize..];
    let trimmed = rest.trim_start_matches([' ', '\t', '\r', '\n']);
    from + (rest.len() - trimmed.len()) as u32
}

fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    // Back to front so earlier offsets stay valid.
    edits.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));
    let mut result = source.to_string();
    for edit in edits {
        let start = edit.start as usize;
        let end = edit.end as usize;
        if start <= end && end <= result.len() {
            result.replace_range(start..end, &edit.text);
        }
    }
    result
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lower one module. `options_json` is a partial `CompileOptions` object.
#[cfg(feature = "napi")]
#[napi]
pub fn lower_module_native(
    source: String,
    file_path: String,
    options_json: Option<serde_json::Value>,
) -> napi::Result<serde_json::Value> {
    let options: CompileOptions = match options_json {
        Some(json) => serde_json::from_value(json)
            .map_err(|e| napi::Error::from_reason(format!("Invalid options: {}", e)))?,
        None => CompileOptions::default(),
    };
    let module =
        lower_module(&source, &file_path, &options).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_value(module).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(feature = "napi")]
#[napi]
pub fn is_valid_custom_element_name_native(tag: String) -> bool {
    is_valid_custom_element_name(&tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(source: &str) -> LoweredModule {
        lower_module(source, "cmp.tsx", &CompileOptions::default()).unwrap()
    }

    #[test]
    fn test_skip_trailing_whitespace() {
        assert_eq!(skip_trailing_whitespace("@A()  \n  class", 4), 9);
        assert_eq!(skip_trailing_whitespace("@A()class", 4), 4);
    }

    #[test]
    fn test_apply_edits_back_to_front() {
        let edits = vec![
            Edit { start: 0, end: 1, text: "X".to_string() },
            Edit { start: 3, end: 3, text: "YY".to_string() },
        ];
        assert_eq!(apply_edits("abcdef", edits), "XbcYYdef");
    }

    #[test]
    fn test_custom_element_names() {
        assert!(is_valid_custom_element_name("cmp-a"));
        assert!(is_valid_custom_element_name("my-cmp-2"));
        assert!(!is_valid_custom_element_name("cmp"));
        assert!(!is_valid_custom_element_name("CmpA"));
        assert!(!is_valid_custom_element_name("-cmp"));
    }

    #[test]
    fn test_empty_class_body_gets_closing_newline() {
        let out = lower("@Component({ tag: 'cmp-a' })\nclass CmpA {}\n");
        assert_eq!(out.code, "class CmpA {\n  static get is() { return \"cmp-a\"; }\n}\n");
    }

    #[test]
    fn test_member_indent_option() {
        let options = CompileOptions {
            member_indent: "\t".to_string(),
            ..Default::default()
        };
        let out = lower_module("@Component({ tag: 'cmp-a' })\nclass A {\n}\n", "a.tsx", &options).unwrap();
        assert_eq!(out.code, "class A {\n\tstatic get is() { return \"cmp-a\"; }\n}\n");
    }
}
