use crate::diagnostics::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed manifest {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("component tree {0} does not exist")]
    MissingRoot(PathBuf),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoadError {
    #[error("module not found: {0}")]
    NotFound(String),
    #[error("module {path} failed to evaluate: {message}")]
    Evaluate { path: String, message: String },
}

/// Everything a component may throw while rendering. `Redirect` and
/// `NotFound` are control signals, not failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RenderError {
    #[error("redirect to {location}")]
    Redirect { location: String, permanent: bool },
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("{component}: {message}")]
    Component { component: String, message: String },
    #[error("no route matches {0}")]
    NoRoute(String),
}

impl RenderError {
    pub fn redirect(location: impl Into<String>) -> Self {
        RenderError::Redirect {
            location: location.into(),
            permanent: false,
        }
    }

    pub fn permanent_redirect(location: impl Into<String>) -> Self {
        RenderError::Redirect {
            location: location.into(),
            permanent: true,
        }
    }

    pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Redirect and not-found abort the tree walk but map to their own
    /// response classes.
    pub fn is_signal(&self) -> bool {
        matches!(self, RenderError::Redirect { .. } | RenderError::NotFound)
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("{} classification violation(s):\n{}", .0.len(), format_diagnostics(.0))]
    Violations(Vec<Diagnostic>),
    #[error("{pass} build failed: {message}")]
    Bundler { pass: String, message: String },
}

fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cloned to every caller awaiting the same mount.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HydrationError {
    #[error("failed to load chunk {url}: {message}")]
    ChunkLoad { url: String, message: String },
    #[error("chunk for {id} has no export named {export}")]
    MissingExport { id: String, export: String },
    #[error("no element with id {0}")]
    NodeMissing(String),
    #[error("{id} is not in the client manifest")]
    UnknownModule { id: String },
    #[error("{id} failed to mount: {message}")]
    Mount { id: String, message: String },
    #[error("malformed page data: {0}")]
    PageData(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Severity, CODE_SERVER_USES_CLIENT_API};

    #[test]
    fn test_signals_are_not_failures() {
        assert!(RenderError::redirect("/login").is_signal());
        assert!(RenderError::NotFound.is_signal());
        assert!(!RenderError::component("Page", "boom").is_signal());
        assert!(!RenderError::from(LoadError::NotFound("app/x.tsx".into())).is_signal());
    }

    #[test]
    fn test_violations_list_every_diagnostic() {
        let err = BuildError::Violations(vec![
            Diagnostic::new(CODE_SERVER_USES_CLIENT_API, Severity::Error, "a", "app/a.tsx", 0),
            Diagnostic::new(CODE_SERVER_USES_CLIENT_API, Severity::Error, "b", "app/b.tsx", 0),
        ]);
        let text = err.to_string();
        assert!(text.starts_with("2 classification violation(s)"));
        assert!(text.contains("app/a.tsx"));
        assert!(text.contains("app/b.tsx"));
    }
}
