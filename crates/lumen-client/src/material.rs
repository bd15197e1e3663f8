use std::path::Path;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use lumen_core::defines;
use lumen_core::{name_hash, UniformAttribute, UniformDeclaration, UniformType};

use crate::backend::{GpuBackend, TextureHandle};
use crate::camera::{BuiltinTextures, Camera};
use crate::registry::ShaderHandle;
use crate::shader::{ProgramVariant, Shader, ShaderError};

#[derive(Debug)]
pub enum MaterialError {
    IoError(std::io::Error),
    ParseError(serde_yaml::Error),
    ShaderError(ShaderError),
}

impl std::fmt::Display for MaterialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(e) => write!(f, "Material IO error: {}", e),
            Self::ParseError(e) => write!(f, "Material parse error: {}", e),
            Self::ShaderError(e) => write!(f, "Material shader error: {}", e),
        }
    }
}

/// Material YAML deserialization type.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MaterialFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub shader: String,
    #[serde(default)]
    pub uniforms: Vec<MaterialFileUniform>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MaterialFileUniform {
    pub name: String,
    pub value: serde_yaml::Value,
    #[serde(default)]
    pub define: bool,
}

pub fn load_material_file(path: &Path) -> Result<MaterialFile, MaterialError> {
    let contents = std::fs::read_to_string(path).map_err(MaterialError::IoError)?;
    serde_yaml::from_str(&contents).map_err(MaterialError::ParseError)
}

/// A material uniform value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Bool(bool),
    Sampler2D {
        slot: u8,
        texture: Option<TextureHandle>,
    },
    SamplerCube {
        slot: u8,
        texture: Option<TextureHandle>,
    },
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Color(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl UniformValue {
    /// Initial value for a declaration, from its default literal.
    pub fn from_declaration(decl: &UniformDeclaration) -> Self {
        let text = decl.default_value.trim();
        let components = || -> [f32; 4] {
            let mut out = [0.0; 4];
            for (slot, part) in out.iter_mut().zip(text.split(',')) {
                *slot = part.trim().parse().unwrap_or(0.0);
            }
            out
        };
        match decl.ty {
            UniformType::Int => Self::Int(parse_int(text)),
            UniformType::Float => Self::Float(text.parse().unwrap_or(0.0)),
            UniformType::Bool => Self::Bool(text == "true" || text == "1"),
            UniformType::Sampler2D => Self::Sampler2D {
                slot: text.parse().unwrap_or(0),
                texture: None,
            },
            UniformType::SamplerCube => Self::SamplerCube {
                slot: text.parse().unwrap_or(0),
                texture: None,
            },
            UniformType::Vec2 => Self::Vec2(Vec4::from(components()).truncate().truncate()),
            UniformType::Vec3 => Self::Vec3(Vec4::from(components()).truncate()),
            UniformType::Vec4 => Self::Vec4(Vec4::from(components())),
            UniformType::Color => Self::Color(Vec4::from(components())),
        }
    }

    /// Convert a YAML value. `ty` comes from the shader declaration when
    /// known; otherwise the shape of the value decides.
    pub fn from_yaml(ty: Option<UniformType>, value: &serde_yaml::Value) -> Option<Self> {
        use serde_yaml::Value;

        let floats = |v: &Value| -> Option<Vec<f32>> {
            v.as_sequence()?
                .iter()
                .map(|x| x.as_f64().map(|f| f as f32))
                .collect()
        };
        let vec4 = |parts: &[f32]| {
            let mut out = [0.0; 4];
            for (slot, v) in out.iter_mut().zip(parts) {
                *slot = *v;
            }
            Vec4::from(out)
        };

        match ty {
            Some(UniformType::Int) => value.as_i64().and_then(yaml_int).map(Self::Int),
            Some(UniformType::Float) => value.as_f64().map(|v| Self::Float(v as f32)),
            Some(UniformType::Bool) => match value {
                Value::Bool(b) => Some(Self::Bool(*b)),
                Value::Number(n) => Some(Self::Bool(n.as_i64() == Some(1))),
                _ => None,
            },
            Some(UniformType::Sampler2D) => value
                .as_u64()
                .and_then(yaml_slot)
                .map(|slot| Self::Sampler2D { slot, texture: None }),
            Some(UniformType::SamplerCube) => value
                .as_u64()
                .and_then(yaml_slot)
                .map(|slot| Self::SamplerCube { slot, texture: None }),
            Some(UniformType::Vec2) => floats(value).map(|f| Self::Vec2(vec4(&f[..]).truncate().truncate())),
            Some(UniformType::Vec3) => floats(value).map(|f| Self::Vec3(vec4(&f[..]).truncate())),
            Some(UniformType::Vec4) => floats(value).map(|f| Self::Vec4(vec4(&f[..]))),
            Some(UniformType::Color) => floats(value).map(|f| Self::Color(vec4(&f[..]))),
            None => match value {
                Value::Bool(b) => Some(Self::Bool(*b)),
                Value::Number(n) if n.is_i64() => n.as_i64().and_then(yaml_int).map(Self::Int),
                Value::Number(n) => n.as_f64().map(|v| Self::Float(v as f32)),
                Value::Sequence(_) => {
                    let f = floats(value)?;
                    match f.len() {
                        2 => Some(Self::Vec2(Vec2::new(f[0], f[1]))),
                        3 => Some(Self::Vec3(Vec3::new(f[0], f[1], f[2]))),
                        4 => Some(Self::Vec4(vec4(&f[..]))),
                        9 => Some(Self::Mat3(Mat3::from_cols_slice(&f))),
                        16 => Some(Self::Mat4(Mat4::from_cols_slice(&f))),
                        _ => None,
                    }
                }
                _ => None,
            },
        }
    }

    /// Text used for this value in a `NAME=VALUE` define token.
    pub fn define_value(&self) -> Option<String> {
        match self {
            Self::Int(v) => Some(v.to_string()),
            Self::Float(v) => Some(format!("{:.6}", v)),
            Self::Bool(v) => Some(if *v { "1" } else { "0" }.to_string()),
            Self::Vec2(v) => Some(format!("vec2({:.6},{:.6})", v.x, v.y)),
            Self::Vec3(v) => Some(format!("vec3({:.6},{:.6},{:.6})", v.x, v.y, v.z)),
            Self::Vec4(v) | Self::Color(v) => Some(format!(
                "vec4({:.6},{:.6},{:.6},{:.6})",
                v.x, v.y, v.z, v.w
            )),
            Self::Sampler2D { .. } | Self::SamplerCube { .. } | Self::Mat3(_) | Self::Mat4(_) => None,
        }
    }

    /// vec4 rows uploaded for a non-sampler value.
    pub fn rows(&self) -> Vec<[f32; 4]> {
        match *self {
            Self::Int(v) => vec![[v as f32, 0.0, 0.0, 0.0]],
            Self::Float(v) => vec![[v, 0.0, 0.0, 0.0]],
            Self::Bool(v) => vec![[if v { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0]],
            Self::Vec2(v) => vec![[v.x, v.y, 0.0, 0.0]],
            Self::Vec3(v) => vec![v.extend(0.0).to_array()],
            Self::Vec4(v) | Self::Color(v) => vec![v.to_array()],
            Self::Mat3(m) => m
                .to_cols_array_2d()
                .iter()
                .map(|c| [c[0], c[1], c[2], 0.0])
                .collect(),
            Self::Mat4(m) => {
                let rows: [[f32; 4]; 4] = bytemuck::cast(m.to_cols_array());
                rows.to_vec()
            }
            Self::Sampler2D { .. } | Self::SamplerCube { .. } => Vec::new(),
        }
    }

    pub fn is_sampler(&self) -> bool {
        matches!(self, Self::Sampler2D { .. } | Self::SamplerCube { .. })
    }
}

fn yaml_int(v: i64) -> Option<i32> {
    i32::try_from(v)
        .map_err(|_| tracing::warn!("Integer uniform value {} is out of range", v))
        .ok()
}

fn yaml_slot(v: u64) -> Option<u8> {
    u8::try_from(v)
        .map_err(|_| tracing::warn!("Sampler slot {} is out of range", v))
        .ok()
}

fn parse_int(text: &str) -> i32 {
    text.parse()
        .or_else(|_| text.parse::<f32>().map(|f| f as i32))
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialUniform {
    pub name: String,
    pub name_hash: u64,
    pub value: UniformValue,
    pub is_define: bool,
}

/// Uniform values plus the defines they contribute, bound to one shader.
#[derive(Debug, Clone)]
pub struct Material {
    name: String,
    shader: Option<ShaderHandle>,
    uniforms: Vec<MaterialUniform>,
    /// `NAME=VALUE` tokens contributed by define-uniforms, in insertion order.
    defines_list: Vec<String>,
    defines_string: String,
    dirty: bool,
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            shader: None,
            uniforms: Vec::new(),
            defines_list: Vec::new(),
            defines_string: String::new(),
            dirty: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shader(&self) -> Option<ShaderHandle> {
        self.shader
    }

    pub fn uniforms(&self) -> &[MaterialUniform] {
        &self.uniforms
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.iter().find(|u| u.name == name).map(|u| &u.value)
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniform(name).is_some()
    }

    pub fn is_define(&self, name: &str) -> bool {
        self.uniforms.iter().any(|u| u.name == name && u.is_define)
    }

    /// Raw defines string, `NAME=VALUE;` per define-uniform.
    pub fn defines_string(&self) -> &str {
        &self.defines_string
    }

    /// Hash of the normalized defines string; matches variant lookups.
    pub fn defines_hash(&self) -> u64 {
        defines::defines_hash(&self.defines_string)
    }

    /// The defines changed since the last compile.
    pub fn needs_compile(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_compiled(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Bind to a shader and seed every declared uniform the material does
    /// not already carry.
    pub fn set_shader(&mut self, handle: ShaderHandle, shader: &Shader) {
        if self.shader == Some(handle) {
            return;
        }
        self.shader = Some(handle);
        self.dirty = true;

        for decl in shader.uniforms() {
            if self.has_uniform(&decl.bind_name) {
                continue;
            }
            self.set_uniform(
                &decl.bind_name,
                UniformValue::from_declaration(decl),
                decl.is_define,
            );
        }
    }

    pub fn set_uniform(&mut self, name: &str, value: UniformValue, define: bool) {
        if define && value.define_value().is_none() {
            tracing::warn!(
                "Material '{}': {} cannot be a define, binding it as a uniform",
                self.name,
                name
            );
            return self.set_uniform(name, value, false);
        }

        match self.uniforms.iter_mut().find(|u| u.name == name) {
            Some(existing) => {
                let was_define = existing.is_define;
                let changed = existing.value != value;
                existing.value = value;
                existing.is_define = define;
                if was_define != define || (define && changed) {
                    self.update_define(name, &value, define);
                }
            }
            None => {
                self.uniforms.push(MaterialUniform {
                    name: name.to_string(),
                    name_hash: name_hash(name),
                    value,
                    is_define: define,
                });
                if define {
                    self.update_define(name, &value, true);
                }
            }
        }
    }

    /// Assign a texture to a sampler uniform, keeping its slot.
    pub fn set_texture(&mut self, name: &str, texture: Option<TextureHandle>) -> bool {
        let Some(uniform) = self.uniforms.iter_mut().find(|u| u.name == name) else {
            return false;
        };
        match &mut uniform.value {
            UniformValue::Sampler2D { texture: t, .. } | UniformValue::SamplerCube { texture: t, .. } => {
                *t = texture;
                true
            }
            _ => false,
        }
    }

    fn update_define(&mut self, name: &str, value: &UniformValue, define: bool) {
        let position = self
            .defines_list
            .iter()
            .position(|d| d.split('=').next() == Some(name));
        match (define, position, value.define_value()) {
            (true, Some(i), Some(v)) => self.defines_list[i] = format!("{}={}", name, v),
            (true, None, Some(v)) => self.defines_list.push(format!("{}={}", name, v)),
            (false, Some(i), _) => {
                self.defines_list.remove(i);
            }
            _ => {}
        }

        self.defines_string = self
            .defines_list
            .iter()
            .map(|d| format!("{};", d))
            .collect();
        self.dirty = true;
    }

    /// Copy of this material under a new name, to be compiled again.
    pub fn clone_as(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            dirty: true,
            ..self.clone()
        }
    }

    /// Push every bound uniform value of this material for one draw.
    pub fn submit_uniforms(
        &self,
        backend: &mut dyn GpuBackend,
        variant: &ProgramVariant,
        camera: Option<&Camera>,
        builtins: &BuiltinTextures,
    ) {
        for uniform in &self.uniforms {
            if uniform.is_define {
                continue;
            }
            let Some(binding) = variant.uniform_by_hash(uniform.name_hash) else {
                continue;
            };
            let Some(handle) = binding.handle else {
                continue;
            };

            match uniform.value {
                UniformValue::Sampler2D { slot, texture } => {
                    let texture = match binding.attribute {
                        UniformAttribute::BackBufferColor => camera
                            .map(|c| c.back_buffer.color)
                            .unwrap_or(builtins.texture_2d),
                        UniformAttribute::BackBufferDepth => camera
                            .map(|c| c.back_buffer.depth)
                            .unwrap_or(builtins.texture_2d),
                        UniformAttribute::None => texture.unwrap_or(builtins.texture_2d),
                    };
                    backend.bind_texture(slot, handle, texture);
                }
                UniformValue::SamplerCube { slot, texture } => {
                    backend.bind_texture(slot, handle, texture.unwrap_or(builtins.cubemap));
                }
                value => backend.set_uniform(handle, &value.rows()),
            }
        }
    }
}
