//! Client/Server classification of a single component module.
//!
//! A module is Client only when its first significant line is the
//! `'client load'` directive. Restricted-API usage is collected for every
//! module regardless; a Server module that uses any of it is a
//! classification violation.
//!
//! Results depend on text alone. The file path is only used to label
//! diagnostics.

#[cfg(feature = "napi")]
use napi_derive::napi;

use crate::diagnostics::{Diagnostic, Severity, CODE_SERVER_USES_CLIENT_API};
use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingPattern, CallExpression, ComputedMemberExpression, Declaration, Expression,
    ImportOrExportKind, JSXAttribute, JSXAttributeName, ModuleExportName, Statement,
    StaticMemberExpression,
};
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

pub const CLIENT_DIRECTIVE: &str = "client load";
pub const EVENT_HANDLERS: &str = "event handlers";

/// Identifiers shown in a violation message before eliding the rest.
const MAX_REPORTED: usize = 3;

// ═══════════════════════════════════════════════════════════════════════════════
// RESTRICTED API SET
// ═══════════════════════════════════════════════════════════════════════════════

pub const STATE_PRIMITIVES: &[&str] = &[
    "useState",
    "useReducer",
    "useRef",
    "useImperativeHandle",
    "useCallback",
    "useMemo",
    "useDebugValue",
    "useDeferredValue",
    "useTransition",
    "useId",
    "useSyncExternalStore",
    "useOptimistic",
    "useFormStatus",
    "useFormState",
];

pub const EFFECT_PRIMITIVES: &[&str] = &["useEffect", "useLayoutEffect", "useInsertionEffect"];

pub const CONTEXT_PRIMITIVES: &[&str] = &["createContext", "useContext"];

pub const BROWSER_GLOBALS: &[&str] = &[
    "window",
    "document",
    "localStorage",
    "sessionStorage",
    "navigator",
    "location",
    "history",
];

lazy_static! {
    static ref CALLABLE_PRIMITIVES: HashSet<&'static str> = STATE_PRIMITIVES
        .iter()
        .chain(EFFECT_PRIMITIVES)
        .chain(CONTEXT_PRIMITIVES)
        .copied()
        .collect();
    static ref GLOBALS: HashSet<&'static str> = BROWSER_GLOBALS.iter().copied().collect();
    static ref DIRECTIVE_RE: Regex = Regex::new(r#"^(?:'client load'|"client load")\s*;?\s*$"#).unwrap();
    static ref HANDLER_NAME_RE: Regex = Regex::new(r"^on[A-Z][a-zA-Z]*$").unwrap();

    // Fast-path patterns, used when the statement parse fails.
    static ref PRIMITIVE_CALL_RE: Regex = {
        let names: Vec<&str> = CALLABLE_PRIMITIVES.iter().copied().collect();
        Regex::new(&format!(r"\b({})\s*[(<]", names.join("|"))).unwrap()
    };
    static ref GLOBAL_ACCESS_RE: Regex =
        Regex::new(&format!(r"\b({})\s*[.\[]", BROWSER_GLOBALS.join("|"))).unwrap();
    static ref HANDLER_PROP_RE: Regex = Regex::new(r"\bon[A-Z][a-zA-Z]*\s*=").unwrap();
    static ref EXPORT_DEFAULT_RE: Regex = Regex::new(r"(?m)^\s*export\s+default\b").unwrap();
    static ref EXPORT_DECL_RE: Regex = Regex::new(
        r"(?m)^\s*export\s+(?:declare\s+)?(?:async\s+)?(?:function\*?|const|let|var|class)\s+([A-Za-z_$][\w$]*)"
    )
    .unwrap();
    static ref EXPORT_LIST_RE: Regex = Regex::new(r"(?m)^\s*export\s*\{([^}]*)\}").unwrap();
    static ref STATIC_META_RE: Regex =
        Regex::new(r"(?m)^\s*export\s+(?:const|let|var)\s+metadata\b").unwrap();
    static ref TOP_LEVEL_AWAIT_RE: Regex = Regex::new(
        r"(?m)^(?:export\s+)?(?:(?:const|let|var)\s+[^=\n]+=\s*)?await\b"
    )
    .unwrap();
    static ref DYNAMIC_META_RE: Regex = Regex::new(
        r"(?m)^\s*export\s+(?:(?:async\s+)?function\s+|(?:const|let|var)\s+)generateMetadata\b"
    )
    .unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESULT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub is_client: bool,
    /// 1-based line of the directive, 0 when absent.
    pub directive_line: usize,
    #[serde(rename = "usedRestrictedAPIs")]
    pub used_restricted_apis: BTreeSet<String>,
}

/// Classification plus the export and metadata facts the manifest needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModuleAnalysis {
    pub classification: ClassificationResult,
    pub exports: Vec<String>,
    pub has_static_meta: bool,
    pub has_dynamic_meta: bool,
    /// Top-level `await`; the chunk evaluates as an async module.
    pub is_async: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct ClassifyOutput {
    pub is_client: bool,
    pub directive_line: u32,
    pub used_restricted_apis: Vec<String>,
    pub exports: Vec<String>,
    pub violation: Option<Diagnostic>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIRECTIVE
// ═══════════════════════════════════════════════════════════════════════════════

/// Returns the 1-based line of the directive if the first significant line
/// is the directive.
pub fn directive_line(text: &str) -> Option<usize> {
    let mut in_block_comment = false;

    for (index, raw) in text.lines().enumerate() {
        let mut line = raw.trim();

        if in_block_comment {
            match line.find("*/") {
                Some(end) => {
                    in_block_comment = false;
                    line = line[end + 2..].trim();
                }
                None => continue,
            }
        }

        // A line may open and close several block comments before any code.
        while line.starts_with("/*") {
            match line[2..].find("*/") {
                Some(end) => line = line[2 + end + 2..].trim(),
                None => {
                    in_block_comment = true;
                    line = "";
                }
            }
        }

        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        return if DIRECTIVE_RE.is_match(line) {
            Some(index + 1)
        } else {
            None
        };
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESTRICTED API SCAN
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct RestrictedApiCollector {
    used: BTreeSet<String>,
}

impl<'a> Visit<'a> for RestrictedApiCollector {
    fn visit_call_expression(&mut self, expr: &CallExpression<'a>) {
        let callee = match &expr.callee {
            Expression::Identifier(ident) => Some(ident.name.as_str()),
            Expression::StaticMemberExpression(member) => Some(member.property.name.as_str()),
            _ => None,
        };
        if let Some(name) = callee {
            if CALLABLE_PRIMITIVES.contains(name) {
                self.used.insert(name.to_string());
            }
        }
        oxc_ast_visit::walk::walk_call_expression(self, expr);
    }

    fn visit_static_member_expression(&mut self, expr: &StaticMemberExpression<'a>) {
        self.record_global(&expr.object);
        oxc_ast_visit::walk::walk_static_member_expression(self, expr);
    }

    fn visit_computed_member_expression(&mut self, expr: &ComputedMemberExpression<'a>) {
        self.record_global(&expr.object);
        oxc_ast_visit::walk::walk_computed_member_expression(self, expr);
    }

    fn visit_jsx_attribute(&mut self, attr: &JSXAttribute<'a>) {
        if let JSXAttributeName::Identifier(id) = &attr.name {
            if HANDLER_NAME_RE.is_match(id.name.as_str()) {
                self.used.insert(EVENT_HANDLERS.to_string());
            }
        }
        oxc_ast_visit::walk::walk_jsx_attribute(self, attr);
    }
}

impl RestrictedApiCollector {
    fn record_global(&mut self, object: &Expression<'_>) {
        if let Expression::Identifier(ident) = object {
            if GLOBALS.contains(ident.name.as_str()) {
                self.used.insert(ident.name.to_string());
            }
        }
    }
}

fn scan_restricted_regex(text: &str) -> BTreeSet<String> {
    let mut used = BTreeSet::new();
    for cap in PRIMITIVE_CALL_RE.captures_iter(text) {
        used.insert(cap[1].to_string());
    }
    for cap in GLOBAL_ACCESS_RE.captures_iter(text) {
        used.insert(cap[1].to_string());
    }
    if HANDLER_PROP_RE.is_match(text) {
        used.insert(EVENT_HANDLERS.to_string());
    }
    used
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPORT SCAN
// ═══════════════════════════════════════════════════════════════════════════════

fn module_export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(s) => s.value.to_string(),
    }
}

fn collect_bindings(pattern: &BindingPattern<'_>, names: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_bindings(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_bindings(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for pattern in arr.elements.iter().flatten() {
                collect_bindings(pattern, names);
            }
            if let Some(rest) = &arr.rest {
                collect_bindings(&rest.argument, names);
            }
        }
        _ => {}
    }
}

fn collect_exports(body: &[Statement<'_>]) -> Vec<String> {
    let mut exports = Vec::new();

    for stmt in body {
        match stmt {
            Statement::ExportDefaultDeclaration(_) => exports.push("default".to_string()),
            Statement::ExportNamedDeclaration(decl) => {
                if matches!(decl.export_kind, ImportOrExportKind::Type) {
                    continue;
                }
                match &decl.declaration {
                    Some(Declaration::VariableDeclaration(var)) => {
                        for d in &var.declarations {
                            collect_bindings(&d.id, &mut exports);
                        }
                    }
                    Some(Declaration::FunctionDeclaration(func)) => {
                        if let Some(id) = &func.id {
                            exports.push(id.name.to_string());
                        }
                    }
                    Some(Declaration::ClassDeclaration(class)) => {
                        if let Some(id) = &class.id {
                            exports.push(id.name.to_string());
                        }
                    }
                    _ => {}
                }
                for spec in &decl.specifiers {
                    if matches!(spec.export_kind, ImportOrExportKind::Type) {
                        continue;
                    }
                    exports.push(module_export_name(&spec.exported));
                }
            }
            _ => {}
        }
    }

    dedup_preserving_order(exports)
}

fn is_await(expr: Option<&Expression<'_>>) -> bool {
    matches!(expr, Some(Expression::AwaitExpression(_)))
}

fn has_top_level_await(body: &[Statement<'_>]) -> bool {
    body.iter().any(|stmt| match stmt {
        Statement::ExpressionStatement(e) => is_await(Some(&e.expression)),
        Statement::VariableDeclaration(var) => {
            var.declarations.iter().any(|d| is_await(d.init.as_ref()))
        }
        Statement::ExportNamedDeclaration(decl) => match &decl.declaration {
            Some(Declaration::VariableDeclaration(var)) => {
                var.declarations.iter().any(|d| is_await(d.init.as_ref()))
            }
            _ => false,
        },
        _ => false,
    })
}

fn collect_exports_regex(text: &str) -> Vec<String> {
    let mut exports = Vec::new();
    if EXPORT_DEFAULT_RE.is_match(text) {
        exports.push("default".to_string());
    }
    for cap in EXPORT_DECL_RE.captures_iter(text) {
        exports.push(cap[1].to_string());
    }
    for cap in EXPORT_LIST_RE.captures_iter(text) {
        for item in cap[1].split(',') {
            let item = item.trim();
            if item.is_empty() || item.starts_with("type ") {
                continue;
            }
            let exported = item.rsplit(" as ").next().unwrap_or(item).trim();
            exports.push(exported.to_string());
        }
    }
    dedup_preserving_order(exports)
}

fn dedup_preserving_order(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Classifies one module. Pure in `text`.
pub fn classify(text: &str) -> ClassificationResult {
    analyze(text).classification
}

/// Classifies one module and scans its top-level exports and metadata
/// declarations in the same parse.
pub fn analyze(text: &str) -> ModuleAnalysis {
    let directive = directive_line(text);

    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_module(true)
        .with_typescript(true)
        .with_jsx(true);
    let ret = Parser::new(&allocator, text, source_type).parse();

    let (used, exports, is_async) = if ret.panicked || !ret.errors.is_empty() {
        tracing::debug!(
            errors = ret.errors.len(),
            "statement parse failed, using pattern scan"
        );
        (
            scan_restricted_regex(text),
            collect_exports_regex(text),
            TOP_LEVEL_AWAIT_RE.is_match(text),
        )
    } else {
        let mut collector = RestrictedApiCollector::default();
        collector.visit_program(&ret.program);
        (
            collector.used,
            collect_exports(&ret.program.body),
            has_top_level_await(&ret.program.body),
        )
    };

    let has_static_meta = exports.iter().any(|e| e == "metadata") || STATIC_META_RE.is_match(text);
    let has_dynamic_meta =
        exports.iter().any(|e| e == "generateMetadata") || DYNAMIC_META_RE.is_match(text);

    ModuleAnalysis {
        classification: ClassificationResult {
            is_client: directive.is_some(),
            directive_line: directive.unwrap_or(0),
            used_restricted_apis: used,
        },
        exports,
        has_static_meta,
        has_dynamic_meta,
        is_async,
    }
}

/// The classification violation for a Server module that uses restricted
/// APIs, if any.
pub fn violation(path: &str, result: &ClassificationResult, severity: Severity) -> Option<Diagnostic> {
    if result.is_client || result.used_restricted_apis.is_empty() {
        return None;
    }

    let names: Vec<&str> = result
        .used_restricted_apis
        .iter()
        .map(String::as_str)
        .collect();
    let mut listed = names
        .iter()
        .take(MAX_REPORTED)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    if names.len() > MAX_REPORTED {
        listed.push_str(&format!(" and {} more", names.len() - MAX_REPORTED));
    }

    let mut hints = vec![format!(
        "Add '{}' as the first line of {} to make it a client component.",
        CLIENT_DIRECTIVE, path
    )];
    hints.extend(names.iter().map(|name| format!("uses {}", name)));

    Some(Diagnostic::with_hints(
        CODE_SERVER_USES_CLIENT_API,
        severity,
        &format!("Server component uses client-only APIs: {}", listed),
        path,
        0,
        hints,
    ))
}

#[cfg(feature = "napi")]
#[napi]
pub fn classify_native(path: String, text: String) -> ClassifyOutput {
    let analysis = analyze(&text);
    let violation = violation(&path, &analysis.classification, Severity::Error);
    let c = analysis.classification;
    ClassifyOutput {
        is_client: c.is_client,
        directive_line: c.directive_line as u32,
        used_restricted_apis: c.used_restricted_apis.into_iter().collect(),
        exports: analysis.exports,
        violation,
    }
}
