//! Deterministic in-process [`GpuBackend`].
//!
//! Runs the preprocessor and a light structural check over bgfx-style stage
//! sources, reflects the `uniform` declarations that survive, and records
//! every bind and upload so tests and the CLI can inspect what a draw would
//! have sent to a device.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::{
    BackendError, GpuBackend, PlaceholderKind, ProgramHandle, ReflectedUniform, RendererKind,
    ShaderModuleHandle, StageBytecode, StageKind, StageRequest, TextureHandle, UniformHandle,
};
use crate::preprocess::{IncludeResolver, Preprocessor};

/// Recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    BindTexture {
        slot: u8,
        uniform: UniformHandle,
        texture: TextureHandle,
    },
    SetUniform {
        uniform: UniformHandle,
        rows: Vec<[f32; 4]>,
    },
}

/// Serialized form of a compiled stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HeadlessBytecode {
    stage: StageKind,
    platform: String,
    profile: Option<String>,
    defines: Vec<String>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    uniforms: Vec<BytecodeUniform>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BytecodeUniform {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    count: u16,
}

struct ModuleRecord {
    stage: StageKind,
    inputs: Vec<String>,
    outputs: Vec<String>,
    uniforms: Vec<ReflectedUniform>,
}

struct ProgramRecord {
    vertex: ShaderModuleHandle,
    fragment: ShaderModuleHandle,
}

pub struct HeadlessBackend {
    renderer: RendererKind,
    sources: HashMap<String, String>,
    include_dirs: Vec<PathBuf>,
    modules: Vec<Option<ModuleRecord>>,
    programs: Vec<Option<ProgramRecord>>,
    uniform_handles: HashMap<String, UniformHandle>,
    uniform_names: Vec<String>,
    textures: Vec<PlaceholderKind>,
    events: Vec<BackendEvent>,
    compiled_stages: usize,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::with_renderer(RendererKind::Noop)
    }

    /// A headless backend that reports `renderer`, so profile selection
    /// behaves as it would on that device.
    pub fn with_renderer(renderer: RendererKind) -> Self {
        Self {
            renderer,
            sources: HashMap::new(),
            include_dirs: Vec::new(),
            modules: Vec::new(),
            programs: Vec::new(),
            uniform_handles: HashMap::new(),
            uniform_names: Vec::new(),
            textures: Vec::new(),
            events: Vec::new(),
            compiled_stages: 0,
        }
    }

    /// Make `source` available to `#include "path"`.
    pub fn register_include(&mut self, path: &str, source: &str) {
        self.sources.insert(path.to_string(), source.to_string());
    }

    pub fn add_include_dir(&mut self, dir: impl Into<PathBuf>) {
        self.include_dirs.push(dir.into());
    }

    pub fn events(&self) -> &[BackendEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<BackendEvent> {
        std::mem::take(&mut self.events)
    }

    /// Number of successful `compile_stage` calls so far.
    pub fn compiled_stage_count(&self) -> usize {
        self.compiled_stages
    }

    pub fn live_module_count(&self) -> usize {
        self.modules.iter().filter(|m| m.is_some()).count()
    }

    pub fn live_program_count(&self) -> usize {
        self.programs.iter().filter(|p| p.is_some()).count()
    }

    pub fn is_program_live(&self, program: ProgramHandle) -> bool {
        matches!(self.programs.get(program.0 as usize), Some(Some(_)))
    }

    pub fn uniform_name(&self, handle: UniformHandle) -> Option<&str> {
        self.uniform_names.get(handle.0 as usize).map(String::as_str)
    }

    pub fn uniform_handle(&self, name: &str) -> Option<UniformHandle> {
        self.uniform_handles.get(name).copied()
    }

    pub fn texture_kind(&self, texture: TextureHandle) -> Option<PlaceholderKind> {
        self.textures.get(texture.0 as usize).copied()
    }

    /// Allocate a plain texture handle, standing in for an uploaded image.
    pub fn create_texture(&mut self) -> TextureHandle {
        self.textures.push(PlaceholderKind::Texture2D);
        TextureHandle((self.textures.len() - 1) as u32)
    }

    fn uniform_handle_for(&mut self, name: &str) -> UniformHandle {
        if let Some(&handle) = self.uniform_handles.get(name) {
            return handle;
        }
        let handle = UniformHandle(self.uniform_names.len() as u32);
        self.uniform_names.push(name.to_string());
        self.uniform_handles.insert(name.to_string(), handle);
        handle
    }

    fn module(&self, handle: ShaderModuleHandle) -> Option<&ModuleRecord> {
        self.modules.get(handle.0 as usize).and_then(Option::as_ref)
    }
}

impl GpuBackend for HeadlessBackend {
    fn renderer(&self) -> RendererKind {
        self.renderer
    }

    fn compile_stage(&mut self, request: &StageRequest<'_>) -> Result<StageBytecode, BackendError> {
        let fail = |message: String| BackendError::Compile {
            stage: request.stage,
            message,
        };

        let source = request.source.strip_prefix('\u{feff}').unwrap_or(request.source);

        let base_dir = Path::new(request.path_hint).parent();
        let mut pp = Preprocessor::new(IncludeResolver {
            sources: &self.sources,
            base_dir,
            include_dirs: &self.include_dirs,
        });
        for token in &request.defines {
            match token.split_once('=') {
                Some((name, value)) => pp.define(name.trim(), value.trim()),
                None => pp.define(token.trim(), "1"),
            }
        }
        let stage_macro = match request.stage {
            StageKind::Vertex => "BGFX_SHADER_TYPE_VERTEX",
            StageKind::Fragment => "BGFX_SHADER_TYPE_FRAGMENT",
        };
        pp.define(stage_macro, "1");

        let expanded = pp.run(source).map_err(|e| fail(e.to_string()))?;
        let code = strip_comments(&expanded);

        let varyings = varying_names(request.varying);
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut body = String::with_capacity(code.len());
        for line in code.lines() {
            let trimmed = line.trim();
            let target = if let Some(rest) = trimmed.strip_prefix("$input") {
                Some((rest, &mut inputs))
            } else if let Some(rest) = trimmed.strip_prefix("$output") {
                Some((rest, &mut outputs))
            } else {
                None
            };
            match target {
                Some((rest, list)) => {
                    for name in rest.split(|c: char| c == ',' || c.is_whitespace()) {
                        if name.is_empty() {
                            continue;
                        }
                        if !varyings.contains(name) {
                            return Err(fail(format!("'{}' is not declared in varying", name)));
                        }
                        list.push(name.to_string());
                    }
                }
                None => {
                    body.push_str(line);
                    body.push('\n');
                }
            }
        }

        check_balance(&body).map_err(fail)?;
        if !has_main(&body) {
            return Err(fail("entry point 'main' not found".to_string()));
        }

        let uniforms = reflect_declarations(&body);
        let bytecode = HeadlessBytecode {
            stage: request.stage,
            platform: request.platform.compiler_name().to_string(),
            profile: request.profile.clone(),
            defines: request.defines.clone(),
            inputs,
            outputs,
            uniforms,
        };
        let bytes = serde_json::to_vec(&bytecode).map_err(|e| fail(e.to_string()))?;
        self.compiled_stages += 1;

        Ok(StageBytecode {
            stage: request.stage,
            bytes,
        })
    }

    fn create_shader(&mut self, bytecode: &StageBytecode) -> Result<ShaderModuleHandle, BackendError> {
        let decoded: HeadlessBytecode = serde_json::from_slice(&bytecode.bytes)
            .map_err(|e| BackendError::InvalidBytecode(e.to_string()))?;
        if decoded.stage != bytecode.stage {
            return Err(BackendError::InvalidBytecode(format!(
                "expected {} bytecode, found {}",
                bytecode.stage.name(),
                decoded.stage.name()
            )));
        }

        let uniforms = decoded
            .uniforms
            .iter()
            .map(|u| ReflectedUniform {
                name: u.name.clone(),
                handle: self.uniform_handle_for(&u.name),
                count: u.count,
            })
            .collect();

        self.modules.push(Some(ModuleRecord {
            stage: decoded.stage,
            inputs: decoded.inputs,
            outputs: decoded.outputs,
            uniforms,
        }));
        Ok(ShaderModuleHandle((self.modules.len() - 1) as u32))
    }

    fn reflect_uniforms(&self, module: ShaderModuleHandle) -> Vec<ReflectedUniform> {
        self.module(module)
            .map(|m| m.uniforms.clone())
            .unwrap_or_default()
    }

    fn link_program(
        &mut self,
        vertex: ShaderModuleHandle,
        fragment: ShaderModuleHandle,
    ) -> Result<ProgramHandle, BackendError> {
        let vs = self.module(vertex).ok_or(BackendError::UnknownModule(vertex))?;
        let fs = self.module(fragment).ok_or(BackendError::UnknownModule(fragment))?;
        if vs.stage != StageKind::Vertex || fs.stage != StageKind::Fragment {
            return Err(BackendError::Link("stage kinds do not match".to_string()));
        }
        if let Some(missing) = fs.inputs.iter().find(|name| !vs.outputs.contains(name)) {
            return Err(BackendError::Link(format!(
                "fragment input '{}' is not written by the vertex stage",
                missing
            )));
        }

        self.programs.push(Some(ProgramRecord { vertex, fragment }));
        Ok(ProgramHandle((self.programs.len() - 1) as u32))
    }

    fn destroy_shader(&mut self, module: ShaderModuleHandle) {
        if self.modules.get_mut(module.0 as usize).and_then(Option::take).is_none() {
            tracing::warn!("destroy_shader: unknown module {}", module.0);
        }
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        let Some(record) = self.programs.get_mut(program.0 as usize).and_then(Option::take) else {
            tracing::warn!("destroy_program: unknown program {}", program.0);
            return;
        };
        for module in [record.vertex, record.fragment] {
            if let Some(slot) = self.modules.get_mut(module.0 as usize) {
                *slot = None;
            }
        }
    }

    fn create_placeholder_texture(&mut self, kind: PlaceholderKind) -> TextureHandle {
        self.textures.push(kind);
        TextureHandle((self.textures.len() - 1) as u32)
    }

    fn bind_texture(&mut self, slot: u8, uniform: UniformHandle, texture: TextureHandle) {
        self.events.push(BackendEvent::BindTexture {
            slot,
            uniform,
            texture,
        });
    }

    fn set_uniform(&mut self, uniform: UniformHandle, rows: &[[f32; 4]]) {
        self.events.push(BackendEvent::SetUniform {
            uniform,
            rows: rows.to_vec(),
        });
    }
}

/// Names declared in a varying definition, e.g.
/// `vec2 v_texcoord0 : TEXCOORD0 = vec2(0.0, 0.0);`.
fn varying_names(varying: &str) -> HashSet<&str> {
    varying
        .lines()
        .map(|line| line.split("//").next().unwrap_or_default())
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            words.next()?;
            let name = words.next()?;
            Some(name.trim_end_matches(|c| c == ':' || c == ';'))
        })
        .collect()
}

/// Remove `//` and `/* */` comments, keeping line structure.
fn strip_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    let mut in_block = false;
    while let Some(c) = chars.next() {
        if in_block {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block = false;
            } else if c == '\n' {
                out.push('\n');
            }
            continue;
        }
        let next = chars.peek().copied();
        match (c, next) {
            ('/', Some('/')) => {
                for rest in chars.by_ref() {
                    if rest == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                in_block = true;
            }
            _ => out.push(c),
        }
    }
    out
}

fn check_balance(code: &str) -> Result<(), String> {
    let mut stack = Vec::new();
    for (line_no, line) in code.lines().enumerate() {
        for c in line.chars() {
            match c {
                '{' | '(' | '[' => stack.push(c),
                '}' | ')' | ']' => {
                    let open = match c {
                        '}' => '{',
                        ')' => '(',
                        _ => '[',
                    };
                    if stack.pop() != Some(open) {
                        return Err(format!("unexpected '{}' at line {}", c, line_no + 1));
                    }
                }
                _ => {}
            }
        }
    }
    match stack.last() {
        Some(open) => Err(format!("unclosed '{}'", open)),
        None => Ok(()),
    }
}

fn has_main(code: &str) -> bool {
    words(code).any(|w| w == "main")
}

fn words(code: &str) -> impl Iterator<Item = &str> {
    code.split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
}

/// Reflect `uniform <type> <name>[N];` and bgfx `SAMPLER2D(name, slot);`
/// declarations. A uniform whose name never appears outside its own
/// declaration is treated as optimized out.
fn reflect_declarations(code: &str) -> Vec<BytecodeUniform> {
    let mut declared: Vec<(usize, BytecodeUniform)> = Vec::new();

    for (line_no, line) in code.lines().enumerate() {
        for statement in line.split(';') {
            if let Some(uniform) = parse_uniform_statement(statement.trim()) {
                if !declared.iter().any(|(_, u)| u.name == uniform.name) {
                    declared.push((line_no, uniform));
                }
            }
        }
    }

    declared
        .into_iter()
        .filter(|(decl_line, uniform)| {
            code.lines()
                .enumerate()
                .filter(|(line_no, _)| line_no != decl_line)
                .any(|(_, line)| words(line).any(|w| w == uniform.name))
        })
        .map(|(_, uniform)| uniform)
        .collect()
}

fn parse_uniform_statement(statement: &str) -> Option<BytecodeUniform> {
    for (macro_name, ty) in [
        ("SAMPLER2D", "sampler2D"),
        ("SAMPLERCUBE", "samplerCube"),
        ("SAMPLER3D", "sampler3D"),
    ] {
        if let Some(rest) = statement.strip_prefix(macro_name) {
            let args = rest.trim().strip_prefix('(')?;
            let name = args.split(',').next()?.trim();
            return Some(BytecodeUniform {
                name: name.to_string(),
                ty: ty.to_string(),
                count: 1,
            });
        }
    }

    let rest = statement.strip_prefix("uniform")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let mut parts = rest.split_whitespace();
    let mut ty = parts.next()?;
    if matches!(ty, "lowp" | "mediump" | "highp") {
        ty = parts.next()?;
    }
    let declarator: String = parts.collect();
    let (name, count) = match declarator.split_once('[') {
        Some((name, len)) => (name.to_string(), len.trim_end_matches(']').trim().parse().ok()?),
        None => (declarator, 1),
    };
    if name.is_empty() {
        return None;
    }
    Some(BytecodeUniform {
        name,
        ty: ty.to_string(),
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Platform;

    const VARYING: &str = "vec3 a_position : POSITION;\nvec2 a_texcoord0 : TEXCOORD0;\nvec2 v_texcoord0 : TEXCOORD0 = vec2(0.0, 0.0);\n";

    fn request<'a>(stage: StageKind, source: &'a str, defines: &[&str]) -> StageRequest<'a> {
        StageRequest {
            stage,
            path_hint: "shaders/test.shader",
            source,
            varying: VARYING,
            defines: defines.iter().map(|d| d.to_string()).collect(),
            platform: Platform::Linux,
            profile: None,
        }
    }

    const VS: &str = "$input a_position, a_texcoord0\n$output v_texcoord0\nuniform vec4 u_offset;\nuniform vec4 u_unused;\nvoid main() { v_texcoord0 = a_texcoord0; gl_Position = vec4(a_position, 1.0) + u_offset; }\n";
    const FS: &str = "$input v_texcoord0\nSAMPLER2D(albedoMap, 0);\nuniform vec4 u_tint;\nuniform vec4 u_offset;\nvoid main() {\n#ifdef USE_TINT\n    gl_FragColor = texture2D(albedoMap, v_texcoord0) * u_tint * u_offset;\n#else\n    gl_FragColor = texture2D(albedoMap, v_texcoord0);\n#endif\n}\n";

    #[test]
    fn test_compile_and_reflect() {
        let mut backend = HeadlessBackend::new();
        let vs = backend.compile_stage(&request(StageKind::Vertex, VS, &[])).unwrap();
        let vs = backend.create_shader(&vs).unwrap();
        let names: Vec<String> = backend.reflect_uniforms(vs).into_iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["u_offset"]);

        let fs = backend
            .compile_stage(&request(StageKind::Fragment, FS, &["USE_TINT=1"]))
            .unwrap();
        let fs = backend.create_shader(&fs).unwrap();
        let reflected = backend.reflect_uniforms(fs);
        let names: Vec<&str> = reflected.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["albedoMap", "u_tint", "u_offset"]);

        // Uniform handles are shared by name across modules.
        let vs_offset = backend.reflect_uniforms(vs)[0].handle;
        assert_eq!(reflected[2].handle, vs_offset);

        let program = backend.link_program(vs, fs).unwrap();
        assert!(backend.is_program_live(program));
        backend.destroy_program(program);
        assert!(!backend.is_program_live(program));
        assert!(backend.reflect_uniforms(vs).is_empty());
    }

    #[test]
    fn test_defines_select_reflected_uniforms() {
        let mut backend = HeadlessBackend::new();
        let fs = backend.compile_stage(&request(StageKind::Fragment, FS, &[])).unwrap();
        let fs = backend.create_shader(&fs).unwrap();
        let names: Vec<String> = backend.reflect_uniforms(fs).into_iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["albedoMap"]);
    }

    #[test]
    fn test_undeclared_varying_is_rejected() {
        let mut backend = HeadlessBackend::new();
        let src = "$input v_normal\nvoid main() {}\n";
        let err = backend
            .compile_stage(&request(StageKind::Fragment, src, &[]))
            .unwrap_err();
        assert!(err.to_string().contains("v_normal"));
    }

    #[test]
    fn test_structural_errors() {
        let mut backend = HeadlessBackend::new();
        assert!(backend
            .compile_stage(&request(StageKind::Vertex, "void main() { (", &[]))
            .is_err());
        assert!(backend
            .compile_stage(&request(StageKind::Vertex, "void entry() {}", &[]))
            .is_err());
        // Braces inside comments do not count.
        assert!(backend
            .compile_stage(&request(StageKind::Vertex, "void main() { } // }\n/* { */", &[]))
            .is_ok());
        assert_eq!(backend.compiled_stage_count(), 1);
    }

    #[test]
    fn test_stage_macro_and_include() {
        let mut backend = HeadlessBackend::new();
        backend.register_include("common.sh", "uniform vec4 u_shared;\n");
        let src = "#include \"common.sh\"\n#if BGFX_SHADER_TYPE_VERTEX\nvoid main() { gl_Position = u_shared; }\n#endif\n";
        assert!(backend.compile_stage(&request(StageKind::Vertex, src, &[])).is_ok());
        // The fragment stage sees no `main`.
        assert!(backend.compile_stage(&request(StageKind::Fragment, src, &[])).is_err());
    }

    #[test]
    fn test_link_checks_varyings() {
        let mut backend = HeadlessBackend::new();
        let vs_src = "$input a_position\nvoid main() { gl_Position = vec4(a_position, 1.0); }";
        let vs = backend.compile_stage(&request(StageKind::Vertex, vs_src, &[])).unwrap();
        let fs = backend.compile_stage(&request(StageKind::Fragment, FS, &[])).unwrap();
        let vs = backend.create_shader(&vs).unwrap();
        let fs = backend.create_shader(&fs).unwrap();
        assert!(matches!(backend.link_program(vs, fs), Err(BackendError::Link(_))));
    }

    #[test]
    fn test_array_uniform_declaration() {
        let u = parse_uniform_statement("uniform mat4 u_bones[32]").unwrap();
        assert_eq!(u.name, "u_bones");
        assert_eq!(u.count, 32);
        assert_eq!(u.ty, "mat4");
        assert!(parse_uniform_statement("uniformity x").is_none());
    }

    #[test]
    fn test_records_binds_and_uploads() {
        let mut backend = HeadlessBackend::new();
        let tex = backend.create_placeholder_texture(PlaceholderKind::Cube);
        assert_eq!(backend.texture_kind(tex), Some(PlaceholderKind::Cube));
        backend.bind_texture(2, UniformHandle(0), tex);
        backend.set_uniform(UniformHandle(1), &[[1.0, 0.0, 0.0, 0.0]]);
        assert_eq!(backend.events().len(), 2);
        assert_eq!(backend.take_events().len(), 2);
        assert!(backend.events().is_empty());
    }
}
