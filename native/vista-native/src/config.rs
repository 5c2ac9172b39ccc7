//! Options shared by the manifest builder, the build orchestrator and the
//! server renderer. Loading them from a config file is the host's job; the
//! host hands us JSON.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_APP_DIR: &str = "app";
pub const DEFAULT_OUT_DIR: &str = ".vista";
pub const DEFAULT_ASSET_PREFIX: &str = "/_vista/static/chunks/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    Production,
}

impl Mode {
    /// Reads `NODE_ENV`; anything other than `production` is development.
    pub fn from_env() -> Self {
        match std::env::var("NODE_ENV") {
            Ok(value) if value == "production" => Mode::Production,
            _ => Mode::Development,
        }
    }

    pub fn is_dev(self) -> bool {
        self == Mode::Development
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::from_env()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VistaOptions {
    pub root_dir: PathBuf,
    pub app_dir: PathBuf,
    pub out_dir: PathBuf,
    pub mode: Mode,
    pub asset_prefix: String,
    pub build_id: Option<String>,
    /// On-disk classification cache. In-memory only when unset.
    pub cache_dir: Option<PathBuf>,
}

impl Default for VistaOptions {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            app_dir: PathBuf::from(DEFAULT_APP_DIR),
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            mode: Mode::default(),
            asset_prefix: DEFAULT_ASSET_PREFIX.to_string(),
            build_id: None,
            cache_dir: None,
        }
    }
}

impl VistaOptions {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_build_id(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = Some(build_id.into());
        self
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }

    /// The component-tree directory.
    pub fn app_path(&self) -> PathBuf {
        self.resolve(&self.app_dir)
    }

    pub fn out_path(&self) -> PathBuf {
        self.resolve(&self.out_dir)
    }

    pub fn client_manifest_path(&self) -> PathBuf {
        self.out_path().join("client-manifest.json")
    }

    pub fn server_manifest_path(&self) -> PathBuf {
        self.out_path().join("server").join("server-manifest.json")
    }

    pub fn server_output_path(&self) -> PathBuf {
        self.out_path().join("server").join("app")
    }

    pub fn chunks_output_path(&self) -> PathBuf {
        self.out_path().join("static").join("chunks")
    }

    /// Public URL of a browser chunk.
    pub fn chunk_url(&self, chunk_name: &str) -> String {
        chunk_url(&self.asset_prefix, chunk_name)
    }
}

pub fn chunk_url(asset_prefix: &str, chunk_name: &str) -> String {
    if asset_prefix.ends_with('/') {
        format!("{}{}.js", asset_prefix, chunk_name)
    } else {
        format!("{}/{}.js", asset_prefix, chunk_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_paths() {
        let options = VistaOptions::new("/project").with_mode(Mode::Production);
        assert_eq!(options.app_path(), PathBuf::from("/project/app"));
        assert_eq!(
            options.server_manifest_path(),
            PathBuf::from("/project/.vista/server/server-manifest.json")
        );
        assert_eq!(
            options.chunk_url("components_counter"),
            "/_vista/static/chunks/components_counter.js"
        );
    }

    #[test]
    fn test_options_from_partial_json() {
        let options: VistaOptions =
            serde_json::from_str(r#"{"rootDir":"/srv/site","mode":"production"}"#).unwrap();
        assert_eq!(options.root_dir, PathBuf::from("/srv/site"));
        assert_eq!(options.mode, Mode::Production);
        assert_eq!(options.asset_prefix, DEFAULT_ASSET_PREFIX);
        assert_eq!(chunk_url("/assets", "a"), "/assets/a.js");
    }
}
