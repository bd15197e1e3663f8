//! The GPU seam: everything the shader and material layers need from a
//! device, and nothing else.

use serde::{Deserialize, Serialize};

/// Newtype handle to a compiled stage module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShaderModuleHandle(pub u32);

/// Newtype handle to a linked vertex + fragment program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramHandle(pub u32);

/// Newtype handle to a uniform slot. Shared across programs by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniformHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Vertex,
    Fragment,
}

impl StageKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Linux,
    Windows,
    Android,
    Web,
    Ios,
    #[serde(rename = "macos")]
    MacOs,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "android") {
            Self::Android
        } else if cfg!(target_arch = "wasm32") {
            Self::Web
        } else if cfg!(target_os = "ios") {
            Self::Ios
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// Platform name as understood by bgfx-style shader compilers.
    pub fn compiler_name(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::Android => "android",
            Self::Web => "asm.js",
            Self::Ios => "ios",
            Self::MacOs => "osx",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RendererKind {
    Noop,
    #[serde(rename = "d3d11")]
    #[value(name = "d3d11")]
    Direct3D11,
    #[serde(rename = "d3d12")]
    #[value(name = "d3d12")]
    Direct3D12,
    #[serde(rename = "opengl")]
    #[value(name = "opengl")]
    OpenGl,
    #[serde(rename = "opengles")]
    #[value(name = "opengles")]
    OpenGlEs,
    Metal,
    Vulkan,
}

impl RendererKind {
    /// Default shader profile for a stage, or `None` to let the compiler pick.
    pub fn default_profile(self, stage: StageKind) -> Option<&'static str> {
        match (self, stage) {
            (Self::Direct3D11, StageKind::Vertex) => Some("vs_4_0"),
            (Self::Direct3D11, StageKind::Fragment) => Some("ps_4_0"),
            (Self::Direct3D12, StageKind::Vertex) => Some("vs_5_0"),
            (Self::Direct3D12, StageKind::Fragment) => Some("ps_5_0"),
            (Self::OpenGl, _) => Some("120"),
            (Self::OpenGlEs, _) => Some("100_es"),
            (Self::Metal, _) => Some("metal"),
            (Self::Vulkan, _) => Some("spirv"),
            (Self::Noop, _) => None,
        }
    }
}

/// Everything a backend needs to compile one stage of one pass.
#[derive(Debug, Clone)]
pub struct StageRequest<'a> {
    pub stage: StageKind,
    /// Shader asset path; include lookups start from its directory.
    pub path_hint: &'a str,
    pub source: &'a str,
    pub varying: &'a str,
    /// `NAME=VALUE` tokens.
    pub defines: Vec<String>,
    pub platform: Platform,
    pub profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageBytecode {
    pub stage: StageKind,
    pub bytes: Vec<u8>,
}

/// A uniform the backend kept after compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedUniform {
    pub name: String,
    pub handle: UniformHandle,
    /// Array length; 1 for non-arrays.
    pub count: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    Texture2D,
    Cube,
}

#[derive(Debug)]
pub enum BackendError {
    Compile { stage: StageKind, message: String },
    Link(String),
    InvalidBytecode(String),
    UnknownModule(ShaderModuleHandle),
    Io(std::io::Error),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compile { stage, message } => {
                write!(f, "{} stage failed to compile: {}", stage.name(), message)
            }
            Self::Link(msg) => write!(f, "Program link failed: {}", msg),
            Self::InvalidBytecode(msg) => write!(f, "Invalid bytecode: {}", msg),
            Self::UnknownModule(h) => write!(f, "Unknown shader module {}", h.0),
            Self::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for BackendError {}

pub trait GpuBackend {
    fn renderer(&self) -> RendererKind;

    fn compile_stage(&mut self, request: &StageRequest<'_>) -> Result<StageBytecode, BackendError>;

    fn create_shader(&mut self, bytecode: &StageBytecode) -> Result<ShaderModuleHandle, BackendError>;

    /// Uniforms that survived compilation of a stage, in the stage's order.
    fn reflect_uniforms(&self, module: ShaderModuleHandle) -> Vec<ReflectedUniform>;

    /// Release a module that never made it into a program.
    fn destroy_shader(&mut self, module: ShaderModuleHandle);

    /// Link two stages. The modules are owned by the program afterwards;
    /// on failure they stay with the caller.
    fn link_program(
        &mut self,
        vertex: ShaderModuleHandle,
        fragment: ShaderModuleHandle,
    ) -> Result<ProgramHandle, BackendError>;

    fn destroy_program(&mut self, program: ProgramHandle);

    /// 1x1 texture bound when a sampler has nothing better.
    fn create_placeholder_texture(&mut self, kind: PlaceholderKind) -> TextureHandle;

    fn bind_texture(&mut self, slot: u8, uniform: UniformHandle, texture: TextureHandle);

    /// Upload vec4 rows to a uniform.
    fn set_uniform(&mut self, uniform: UniformHandle, rows: &[[f32; 4]]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profiles() {
        assert_eq!(
            RendererKind::Direct3D12.default_profile(StageKind::Fragment),
            Some("ps_5_0")
        );
        assert_eq!(
            RendererKind::Direct3D11.default_profile(StageKind::Vertex),
            Some("vs_4_0")
        );
        assert_eq!(RendererKind::Vulkan.default_profile(StageKind::Vertex), Some("spirv"));
        assert_eq!(RendererKind::Noop.default_profile(StageKind::Vertex), None);
    }

    #[test]
    fn test_platform_name() {
        assert_eq!(Platform::Web.compiler_name(), "asm.js");
        assert_eq!(Platform::MacOs.compiler_name(), "osx");
    }
}
