//! Metadata extraction from component source.
//!
//! Reads `@Component({...})` decorators and lowered `static get` members out
//! of the oxc AST. Everything here is read-only; rewriting lives in
//! `lowering.rs`.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::{SourceType, Span};

use crate::descriptor::{ComponentConfig, ComponentDescriptor};
use crate::error::TransformError;
use crate::literal::LiteralValue;

pub const COMPONENT_DECORATOR: &str = "Component";

/// Source type for a file path; unknown extensions parse as TSX.
pub fn source_type_for(file_path: &str) -> SourceType {
    SourceType::from_path(file_path).unwrap_or_else(|_| {
        SourceType::default()
            .with_typescript(true)
            .with_module(true)
            .with_jsx(true)
    })
}

/// Convert an expression into a literal, or `Dynamic` when it isn't one.
pub fn literal_from_expression(expr: &Expression) -> LiteralValue {
    match expr {
        Expression::StringLiteral(s) => LiteralValue::String(s.value.to_string()),
        Expression::BooleanLiteral(b) => LiteralValue::Bool(b.value),
        Expression::NumericLiteral(n) => LiteralValue::Number(n.value),
        Expression::NullLiteral(_) => LiteralValue::Null,
        Expression::TemplateLiteral(t) if t.expressions.is_empty() => t
            .quasis
            .first()
            .and_then(|q| q.value.cooked.as_ref())
            .map(|cooked| LiteralValue::String(cooked.to_string()))
            .unwrap_or(LiteralValue::Dynamic),
        Expression::ArrayExpression(arr) => {
            let mut items = Vec::with_capacity(arr.elements.len());
            for element in &arr.elements {
                match element.as_expression() {
                    Some(e) => items.push(literal_from_expression(e)),
                    None => return LiteralValue::Dynamic,
                }
            }
            LiteralValue::Array(items)
        }
        Expression::ObjectExpression(obj) => object_entries(obj)
            .map(LiteralValue::Object)
            .unwrap_or(LiteralValue::Dynamic),
        Expression::ParenthesizedExpression(p) => literal_from_expression(&p.expression),
        Expression::TSAsExpression(e) => literal_from_expression(&e.expression),
        Expression::TSSatisfiesExpression(e) => literal_from_expression(&e.expression),
        _ => LiteralValue::Dynamic,
    }
}

/// Entries of an object literal. `None` when a key is computed or a spread is
/// present, since the record can't be known statically then.
fn object_entries(obj: &ObjectExpression) -> Option<Vec<(String, LiteralValue)>> {
    let mut entries = Vec::with_capacity(obj.properties.len());
    for property in &obj.properties {
        match property {
            ObjectPropertyKind::ObjectProperty(p) => {
                if p.computed {
                    return None;
                }
                let key = p.key.static_name()?.to_string();
                entries.push((key, literal_from_expression(&p.value)));
            }
            ObjectPropertyKind::SpreadProperty(_) => return None,
        }
    }
    Some(entries)
}

/// Name of the function a decorator calls, e.g. `Component` for
/// `@Component({...})`.
pub fn decorator_name<'b>(decorator: &'b Decorator) -> Option<&'b str> {
    match &decorator.expression {
        Expression::CallExpression(call) => match &call.callee {
            Expression::Identifier(id) => Some(id.name.as_str()),
            _ => None,
        },
        Expression::Identifier(id) => Some(id.name.as_str()),
        _ => None,
    }
}

/// Read the options object of a `Component(...)` decorator.
///
/// `None` when the decorator has no argument or the argument is not an object
/// literal; the class is then skipped.
pub fn config_from_decorator(decorator: &Decorator) -> Option<ComponentConfig> {
    let Expression::CallExpression(call) = &decorator.expression else {
        return None;
    };
    let first = call.arguments.first()?.as_expression()?;
    match first {
        Expression::ObjectExpression(obj) => {
            object_entries(obj).map(ComponentConfig::from_entries)
        }
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLASS SCAN
// ═══════════════════════════════════════════════════════════════════════════════

/// What the transformer needs to know about one decorated class.
#[derive(Debug, Clone)]
pub struct ComponentClass {
    pub name: Option<String>,
    pub span: Span,
    /// Spans of every `Component` decorator on the class.
    pub decorator_spans: Vec<Span>,
    /// Config of the first `Component` decorator, if it was readable.
    pub config: Option<ComponentConfig>,
    /// Offset right after the class body's opening brace.
    pub body_start: u32,
}

#[derive(Default)]
struct ComponentClassCollector {
    classes: Vec<ComponentClass>,
}

impl<'a> Visit<'a> for ComponentClassCollector {
    fn visit_class(&mut self, class: &Class<'a>) {
        let component_decorators: Vec<&Decorator> = class
            .decorators
            .iter()
            .filter(|d| decorator_name(d) == Some(COMPONENT_DECORATOR))
            .collect();

        if !component_decorators.is_empty() {
            self.classes.push(ComponentClass {
                name: class.id.as_ref().map(|id| id.name.to_string()),
                span: class.span,
                decorator_spans: component_decorators.iter().map(|d| d.span).collect(),
                config: config_from_decorator(component_decorators[0]),
                body_start: class.body.span.start + 1,
            });
        }

        walk::walk_class(self, class);
    }
}

/// Find every class carrying a `Component` decorator, in source order.
pub fn collect_component_classes(program: &Program) -> Vec<ComponentClass> {
    let mut collector = ComponentClassCollector::default();
    collector.visit_program(program);
    collector.classes.sort_by_key(|c| c.span.start);
    collector.classes
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATIC MEMBER READBACK
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct StaticMemberCollector {
    classes: Vec<Vec<(String, LiteralValue)>>,
}

impl<'a> Visit<'a> for StaticMemberCollector {
    fn visit_class(&mut self, class: &Class<'a>) {
        let mut members = Vec::new();
        for element in &class.body.body {
            let ClassElement::MethodDefinition(method) = element else {
                continue;
            };
            if !method.r#static || method.kind != MethodDefinitionKind::Get {
                continue;
            }
            let Some(name) = method.key.static_name() else {
                continue;
            };
            let returned = method.value.body.as_ref().and_then(|body| {
                body.statements.iter().find_map(|stmt| match stmt {
                    Statement::ReturnStatement(ret) => ret.argument.as_ref(),
                    _ => None,
                })
            });
            if let Some(expr) = returned {
                members.push((name.to_string(), literal_from_expression(expr)));
            }
        }
        if !members.is_empty() {
            self.classes.push(members);
        }
        walk::walk_class(self, class);
    }
}

/// Read descriptors back out of lowered classes (`static get is()` and
/// friends). Classes that still carry decorators contribute nothing.
pub fn read_static_descriptors(
    source: &str,
    file_path: &str,
) -> Result<Vec<ComponentDescriptor>, TransformError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type_for(file_path)).parse();
    if ret.panicked || !ret.errors.is_empty() {
        return Err(TransformError::Parse {
            file: file_path.to_string(),
            message: first_error_message(&ret.errors),
        });
    }

    let mut collector = StaticMemberCollector::default();
    collector.visit_program(&ret.program);
    Ok(collector
        .classes
        .iter()
        .filter_map(|members| ComponentDescriptor::from_static_members(members))
        .collect())
}

pub(crate) fn first_error_message<E: std::fmt::Display>(errors: &[E]) -> String {
    errors
        .first()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "parser aborted".to_string())
}
