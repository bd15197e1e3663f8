//! lumen.yaml project configuration parsing.
//!
//! Reads a project's `lumen.yaml` and turns it into the compile options and
//! include search paths the shader pipeline uses.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use lumen_core::RenderState;

use crate::backend::{Platform, RendererKind};
use crate::shader::CompileOptions;

#[derive(Debug, Deserialize)]
pub struct LumenConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_assets_root")]
    pub assets_root: String,
    #[serde(default)]
    pub include_dirs: Vec<String>,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub baseline_state: Option<BaselineConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RendererConfig {
    pub kind: Option<RendererKind>,
    pub platform: Option<Platform>,
    pub vertex_profile: Option<String>,
    pub fragment_profile: Option<String>,
}

/// Raw state words; hex strings such as `0x0100000000000000` are accepted.
#[derive(Debug, Deserialize)]
pub struct BaselineConfig {
    pub state: String,
    #[serde(default)]
    pub stencil: Option<String>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_assets_root() -> String {
    "assets".to_string()
}

#[derive(Debug)]
pub enum ConfigError {
    NotFound,
    Io(std::io::Error),
    Parse(serde_yaml::Error),
    InvalidState(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound => write!(f, "lumen.yaml not found"),
            ConfigError::Io(e) => write!(f, "IO error reading lumen.yaml: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse lumen.yaml: {}", e),
            ConfigError::InvalidState(s) => write!(f, "Invalid baseline state word: {}", s),
        }
    }
}

/// Walk up from `start_dir` looking for `lumen.yaml`.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = start_dir.to_path_buf();
    loop {
        let candidate = dir.join("lumen.yaml");
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Load and parse a `lumen.yaml` file.
pub fn load_config(path: &Path) -> Result<LumenConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<LumenConfig, ConfigError> {
    serde_yaml::from_str(contents).map_err(ConfigError::Parse)
}

impl LumenConfig {
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            platform: self.renderer.platform.unwrap_or_else(Platform::current),
            vertex_profile: self.renderer.vertex_profile.clone(),
            fragment_profile: self.renderer.fragment_profile.clone(),
        }
    }

    pub fn renderer_kind(&self) -> RendererKind {
        self.renderer.kind.unwrap_or(RendererKind::Noop)
    }

    pub fn assets_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.assets_root)
    }

    pub fn include_paths(&self, project_root: &Path) -> Vec<PathBuf> {
        self.include_dirs.iter().map(|d| project_root.join(d)).collect()
    }

    /// Baseline render state; the engine default when unset.
    pub fn baseline(&self) -> Result<RenderState, ConfigError> {
        let Some(baseline) = &self.baseline_state else {
            return Ok(RenderState::DEFAULT);
        };
        let state = parse_word(&baseline.state)?;
        let stencil = match &baseline.stencil {
            Some(s) => u32::try_from(parse_word(s)?)
                .map_err(|_| ConfigError::InvalidState(s.clone()))?,
            None => 0,
        };
        Ok(RenderState::new(state, stencil))
    }
}

fn parse_word(text: &str) -> Result<u64, ConfigError> {
    let trimmed = text.trim();
    let parsed = match trimmed.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|_| ConfigError::InvalidState(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config = parse_config("name: demo\n").unwrap();
        assert_eq!(config.name, "demo");
        assert_eq!(config.assets_root, "assets");
        assert_eq!(config.renderer_kind(), RendererKind::Noop);
        assert_eq!(config.baseline().unwrap(), RenderState::DEFAULT);
        let options = config.compile_options();
        assert!(options.vertex_profile.is_none());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
name: demo
version: "1.2.0"
assets_root: data
include_dirs: [shaders/common]
renderer:
  kind: vulkan
  platform: android
  fragment_profile: spirv15
baseline_state:
  state: "0x0000_0010_0000_0001"
  stencil: "0x20000"
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.renderer_kind(), RendererKind::Vulkan);
        let options = config.compile_options();
        assert_eq!(options.platform, Platform::Android);
        assert_eq!(options.fragment_profile.as_deref(), Some("spirv15"));
        assert_eq!(
            config.include_paths(Path::new("/p")),
            vec![PathBuf::from("/p/shaders/common")]
        );
        let baseline = config.baseline().unwrap();
        assert_eq!(baseline.state, 0x0000_0010_0000_0001);
        assert_eq!(baseline.stencil, 0x20000);
    }

    #[test]
    fn test_bad_state_word() {
        let config = parse_config("name: x\nbaseline_state:\n  state: nope\n").unwrap();
        assert!(matches!(config.baseline(), Err(ConfigError::InvalidState(_))));
    }

    #[test]
    fn test_find_config_walks_up() {
        let root = std::env::temp_dir().join("lumen_find_config_test");
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join("lumen.yaml"), "name: x\n").unwrap();
        assert_eq!(find_config(&nested), Some(root.join("lumen.yaml")));
        std::fs::remove_dir_all(&root).unwrap();
    }
}
