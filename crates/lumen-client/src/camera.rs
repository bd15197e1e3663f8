use crate::backend::{GpuBackend, PlaceholderKind, TextureHandle};

/// Color and depth targets a camera renders into. Bound to samplers
/// declared with `backBufferColor` / `backBufferDepth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackBuffer {
    pub color: TextureHandle,
    pub depth: TextureHandle,
}

/// The slice of a camera the material layer needs.
#[derive(Debug, Clone)]
pub struct Camera {
    pub name: String,
    pub back_buffer: BackBuffer,
}

impl Camera {
    pub fn new(name: &str, back_buffer: BackBuffer) -> Self {
        Self {
            name: name.to_string(),
            back_buffer,
        }
    }
}

/// Placeholder textures bound when a sampler has nothing assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinTextures {
    pub texture_2d: TextureHandle,
    pub cubemap: TextureHandle,
}

impl BuiltinTextures {
    pub fn create(backend: &mut dyn GpuBackend) -> Self {
        Self {
            texture_2d: backend.create_placeholder_texture(PlaceholderKind::Texture2D),
            cubemap: backend.create_placeholder_texture(PlaceholderKind::Cube),
        }
    }
}
