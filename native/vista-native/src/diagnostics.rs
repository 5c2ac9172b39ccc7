#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const CODE_SERVER_USES_CLIENT_API: &str = "VISTA-CLASSIFY-001";
pub const CODE_SERVER_IN_BROWSER_GRAPH: &str = "VISTA-BOUNDARY-001";
pub const CODE_HYDRATION_NODE_MISSING: &str = "VISTA-HYDRATE-001";
pub const CODE_HYDRATION_FAILED: &str = "VISTA-HYDRATE-002";
pub const CODE_HYDRATION_UNKNOWN_MODULE: &str = "VISTA-HYDRATE-003";
pub const CODE_ROUTE_MISS: &str = "VISTA-ROUTE-001";
pub const CODE_ROUTE_CONFLICT: &str = "VISTA-ROUTE-002";
pub const CODE_ROUTE_UNREACHABLE: &str = "VISTA-ROUTE-003";

// ═══════════════════════════════════════════════════════════════════════════════
// GUARANTEES
// ═══════════════════════════════════════════════════════════════════════════════

fn get_guarantee(code: &str) -> &'static str {
    match code {
        CODE_SERVER_USES_CLIENT_API => {
            "Server components never depend on state, effects, event handlers or browser globals."
        }
        CODE_SERVER_IN_BROWSER_GRAPH => {
            "Server component source never reaches the browser bundle."
        }
        CODE_HYDRATION_NODE_MISSING => "Every client reference has a placeholder in the page.",
        CODE_HYDRATION_FAILED => "A failed mount never blocks other mounts on the page.",
        CODE_HYDRATION_UNKNOWN_MODULE => {
            "Only modules present in the client manifest are mounted in the browser."
        }
        CODE_ROUTE_MISS => "An unmatched path renders the nearest not-found page or a 404.",
        CODE_ROUTE_CONFLICT => "Every path resolves to at most one page.",
        CODE_ROUTE_UNREACHABLE => "A catch-all segment is always the last segment of its route.",
        _ => "Unknown guarantee.",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC
// ═══════════════════════════════════════════════════════════════════════════════

/// A reportable boundary problem. Carried by build failures, logged by the
/// manifest builder and rendered by the development overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: String,
    pub severity: String,
    pub message: String,
    pub guarantee: String,
    pub file: String,
    pub line: u32,
    pub hints: Vec<String>,
}

impl Diagnostic {
    pub fn new(code: &str, severity: Severity, message: &str, file: &str, line: u32) -> Self {
        Self::with_hints(code, severity, message, file, line, vec![])
    }

    pub fn with_hints(
        code: &str,
        severity: Severity,
        message: &str,
        file: &str,
        line: u32,
        hints: Vec<String>,
    ) -> Self {
        Diagnostic {
            code: code.to_string(),
            severity: match severity {
                Severity::Warning => "warning".to_string(),
                Severity::Error => "error".to_string(),
            },
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            file: file.to_string(),
            line,
            hints,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == "error"
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)?;
        } else if self.line > 0 {
            write!(f, "[{}] {}:{}: {}", self.code, self.file, self.line, self.message)?;
        } else {
            write!(f, "[{}] {}: {}", self.code, self.file, self.message)?;
        }
        for hint in &self.hints {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guarantee_is_attached() {
        let d = Diagnostic::new(
            CODE_SERVER_IN_BROWSER_GRAPH,
            Severity::Error,
            "imported from browser code",
            "app/page.tsx",
            0,
        );
        assert!(d.is_error());
        assert!(d.guarantee.contains("never reaches the browser"));
        assert_eq!(
            d.to_string(),
            "[VISTA-BOUNDARY-001] app/page.tsx: imported from browser code"
        );
    }

    #[test]
    fn test_display_with_line_and_hints() {
        let d = Diagnostic::with_hints(
            CODE_SERVER_USES_CLIENT_API,
            Severity::Warning,
            "uses useState",
            "app/x.tsx",
            3,
            vec!["add 'client load'".to_string()],
        );
        assert!(!d.is_error());
        assert_eq!(
            d.to_string(),
            "[VISTA-CLASSIFY-001] app/x.tsx:3: uses useState\n  hint: add 'client load'"
        );
    }

    #[test]
    fn test_route_codes_are_distinct() {
        assert_ne!(CODE_ROUTE_MISS, CODE_ROUTE_CONFLICT);
        let miss = Diagnostic::new(CODE_ROUTE_MISS, Severity::Warning, "no route matches /x", "", 0);
        assert_eq!(miss.to_string(), "[VISTA-ROUTE-001] no route matches /x");
        assert!(miss.guarantee.contains("not-found"));
    }
}
