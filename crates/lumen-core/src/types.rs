use serde::{Deserialize, Serialize};

/// Uniform value type as declared in a `params` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniformType {
    Int,
    Float,
    Bool,
    Sampler2D,
    SamplerCube,
    Vec2,
    Vec3,
    Vec4,
    Color,
}

impl UniformType {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "bool" => Some(Self::Bool),
            "sampler2D" => Some(Self::Sampler2D),
            "samplerCube" => Some(Self::SamplerCube),
            "vec2" => Some(Self::Vec2),
            "vec3" => Some(Self::Vec3),
            "vec4" => Some(Self::Vec4),
            "color" => Some(Self::Color),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Sampler2D => "sampler2D",
            Self::SamplerCube => "samplerCube",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Color => "color",
        }
    }

    /// Number of tokens making up the default value literal.
    pub fn value_arity(self) -> usize {
        match self {
            Self::Int | Self::Float | Self::Bool | Self::Sampler2D | Self::SamplerCube => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Color => 4,
        }
    }

    pub fn is_sampler(self) -> bool {
        matches!(self, Self::Sampler2D | Self::SamplerCube)
    }

    /// Only numeric scalars accept a `: min max` range suffix.
    pub fn accepts_range(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }
}

impl std::fmt::Display for UniformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Special binding requested by a uniform declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UniformAttribute {
    #[default]
    None,
    BackBufferColor,
    BackBufferDepth,
}

impl UniformAttribute {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "backBufferColor" => Some(Self::BackBufferColor),
            "backBufferDepth" => Some(Self::BackBufferDepth),
            _ => None,
        }
    }

    pub fn keyword(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::BackBufferColor => Some("backBufferColor"),
            Self::BackBufferDepth => Some("backBufferDepth"),
        }
    }
}

/// One line of a `params` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformDeclaration {
    #[serde(rename = "type")]
    pub ty: UniformType,
    pub bind_name: String,
    pub display_name: String,
    /// Default value literal, components joined with `,`.
    pub default_value: String,
    #[serde(default)]
    pub is_define: bool,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub attribute: UniformAttribute,
    #[serde(default)]
    pub min: Option<f32>,
    #[serde(default)]
    pub max: Option<f32>,
}

impl UniformDeclaration {
    pub fn new(ty: UniformType, bind_name: &str, display_name: &str) -> Self {
        Self {
            ty,
            bind_name: bind_name.to_string(),
            display_name: display_name.to_string(),
            default_value: "0".to_string(),
            is_define: false,
            is_hidden: false,
            attribute: UniformAttribute::None,
            min: None,
            max: None,
        }
    }
}

/// A pass tag, either unconditional or selected by a preprocessor define.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum TagDeclaration {
    Plain {
        name: String,
        values: Vec<String>,
    },
    Conditional {
        name: String,
        define: String,
        if_set: Vec<String>,
        if_unset: Vec<String>,
    },
}

impl TagDeclaration {
    pub fn name(&self) -> &str {
        match self {
            Self::Plain { name, .. } | Self::Conditional { name, .. } => name,
        }
    }
}

/// Raw text of one `pass { }` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassSource {
    #[serde(default)]
    pub varying: String,
    #[serde(default)]
    pub vertex: String,
    #[serde(default)]
    pub fragment: String,
    #[serde(default)]
    pub tags: Vec<TagDeclaration>,
}

impl PassSource {
    pub fn is_empty(&self) -> bool {
        self.varying.trim().is_empty()
            && self.vertex.trim().is_empty()
            && self.fragment.trim().is_empty()
            && self.tags.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    #[default]
    Forward,
    Deferred,
}

impl RenderMode {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "forward" => Some(Self::Forward),
            "deferred" => Some(Self::Deferred),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Deferred => "deferred",
        }
    }
}

/// Parsed form of a whole shader file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShaderSource {
    pub name: String,
    #[serde(default)]
    pub render_mode: RenderMode,
    #[serde(default)]
    pub uniforms: Vec<UniformDeclaration>,
    #[serde(default)]
    pub passes: Vec<PassSource>,
}

/// Non-fatal problem found while parsing. Parsing always continues.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseWarning {
    /// A pass or one of its sections was never closed.
    Unbalanced { pass: usize },
    /// A pass carries neither vertex nor fragment code.
    MissingProgram { pass: usize },
    UnknownRenderMode(String),
    UnknownUniformType { line: usize, keyword: String },
    MalformedUniform { line: usize, text: String },
    MalformedTag { line: usize, text: String },
    NoPasses,
}

impl ParseWarning {
    pub fn pass_index(&self) -> Option<usize> {
        match self {
            Self::Unbalanced { pass } | Self::MissingProgram { pass } => Some(*pass),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unbalanced { pass } => write!(f, "unbalanced braces (Pass {})", pass),
            Self::MissingProgram { pass } => {
                write!(f, "no vertex/fragment source (Pass {})", pass)
            }
            Self::UnknownRenderMode(mode) => write!(f, "unknown render_mode '{}'", mode),
            Self::UnknownUniformType { line, keyword } => {
                write!(f, "unknown uniform type '{}' on params line {}", keyword, line)
            }
            Self::MalformedUniform { line, text } => {
                write!(f, "malformed uniform on params line {}: '{}'", line, text)
            }
            Self::MalformedTag { line, text } => {
                write!(f, "malformed tag on line {}: '{}'", line, text)
            }
            Self::NoPasses => write!(f, "no passes found"),
        }
    }
}

/// Result of parsing shader text: the IR plus everything worth logging.
#[derive(Debug, Clone, Default)]
pub struct ParsedShader {
    pub source: ShaderSource,
    pub warnings: Vec<ParseWarning>,
}
