use std::collections::HashSet;
use std::path::Path;

use lumen_core::defines::{self, Defines};
use lumen_core::{
    name_hash, parse_shader, ParseWarning, PassSource, RenderMode, RenderSettings, RenderState,
    ShaderSource, UniformAttribute, UniformDeclaration, UniformType,
};

use crate::backend::{
    BackendError, GpuBackend, Platform, ProgramHandle, RendererKind, StageKind, StageRequest,
    UniformHandle,
};

#[derive(Debug)]
pub enum ShaderError {
    IoError(std::io::Error),
    /// A backend rejected one stage or the link of one pass.
    CompileFailed { pass: usize, error: BackendError },
    /// A pass resolved to no vertex or no fragment code.
    MissingSource { pass: usize },
}

impl std::fmt::Display for ShaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(e) => write!(f, "Shader IO error: {}", e),
            Self::CompileFailed { pass, error } => write!(f, "Pass {}: {}", pass, error),
            Self::MissingSource { pass } => {
                write!(f, "Pass {}: missing vertex or fragment source", pass)
            }
        }
    }
}

/// Per-compile knobs a project can override.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub platform: Platform,
    pub vertex_profile: Option<String>,
    pub fragment_profile: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            platform: Platform::current(),
            vertex_profile: None,
            fragment_profile: None,
        }
    }
}

impl CompileOptions {
    fn profile(&self, renderer: RendererKind, stage: StageKind) -> Option<String> {
        let overridden = match stage {
            StageKind::Vertex => &self.vertex_profile,
            StageKind::Fragment => &self.fragment_profile,
        };
        overridden
            .clone()
            .or_else(|| renderer.default_profile(stage).map(str::to_string))
    }
}

/// A declared uniform as seen by one compiled program.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBinding {
    pub name: String,
    pub name_hash: u64,
    pub ty: UniformType,
    /// `None` for define-uniforms, which never reach the GPU.
    pub handle: Option<UniformHandle>,
    pub is_define: bool,
    pub is_hidden: bool,
    pub attribute: UniformAttribute,
    pub default_value: String,
    pub min: Option<f32>,
    pub max: Option<f32>,
}

impl UniformBinding {
    fn new(decl: &UniformDeclaration, handle: Option<UniformHandle>) -> Self {
        Self {
            name: decl.bind_name.clone(),
            name_hash: name_hash(&decl.bind_name),
            ty: decl.ty,
            handle,
            is_define: decl.is_define,
            is_hidden: decl.is_hidden,
            attribute: decl.attribute,
            default_value: decl.default_value.clone(),
            min: decl.min,
            max: decl.max,
        }
    }
}

/// One compiled program of a pass for one normalized defines string.
#[derive(Debug, Clone)]
pub struct ProgramVariant {
    pub defines: String,
    pub defines_hash: u64,
    pub program: ProgramHandle,
    pub uniforms: Vec<UniformBinding>,
    pub settings: RenderSettings,
}

impl ProgramVariant {
    pub fn uniform(&self, name: &str) -> Option<&UniformBinding> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    pub fn uniform_by_hash(&self, hash: u64) -> Option<&UniformBinding> {
        self.uniforms.iter().find(|u| u.name_hash == hash)
    }

    pub fn render_state(&self, baseline: RenderState) -> RenderState {
        self.settings.render_state(baseline)
    }
}

/// Sources a pass compiles with once inheritance is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSources {
    pub varying: String,
    pub vertex: String,
    pub fragment: String,
}

#[derive(Debug, Clone)]
pub struct Pass {
    pub source: PassSource,
    resolved: ResolvedSources,
    variants: Vec<ProgramVariant>,
    /// Defines hashes that failed to compile; not retried until reload.
    failed: HashSet<u64>,
}

impl Pass {
    fn new(source: PassSource) -> Self {
        Self {
            source,
            resolved: ResolvedSources::default(),
            variants: Vec::new(),
            failed: HashSet::new(),
        }
    }

    pub fn resolved(&self) -> &ResolvedSources {
        &self.resolved
    }

    pub fn variants(&self) -> &[ProgramVariant] {
        &self.variants
    }

    pub fn program_variant(&self, defines: &str) -> Option<&ProgramVariant> {
        self.program_variant_by_hash(defines::defines_hash(defines))
    }

    pub fn program_variant_by_hash(&self, hash: u64) -> Option<&ProgramVariant> {
        self.variants.iter().find(|v| v.defines_hash == hash)
    }

    pub fn program_handle(&self, defines: &str) -> Option<ProgramHandle> {
        self.program_variant(defines).map(|v| v.program)
    }

    pub fn has_failed(&self, defines: &str) -> bool {
        self.failed.contains(&defines::defines_hash(defines))
    }

    fn is_settled(&self, hash: u64) -> bool {
        self.failed.contains(&hash) || self.program_variant_by_hash(hash).is_some()
    }

    fn destroy_variants(&mut self, backend: &mut dyn GpuBackend) {
        for variant in self.variants.drain(..) {
            backend.destroy_program(variant.program);
        }
        self.failed.clear();
    }
}

/// A shader asset: declarations, passes and their compiled variants.
#[derive(Debug, Clone, Default)]
pub struct Shader {
    name: String,
    /// Asset path, handed to the backend for include resolution.
    path: String,
    render_mode: RenderMode,
    uniforms: Vec<UniformDeclaration>,
    passes: Vec<Pass>,
    warnings: Vec<ParseWarning>,
    loaded: bool,
}

impl Shader {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Default::default()
        }
    }

    /// Parse `text` into a new shader.
    pub fn from_source(path: &str, text: &str) -> Self {
        let mut shader = Self::new(path);
        shader.load_from_source(text);
        shader
    }

    pub fn load(path: &Path) -> Result<Self, ShaderError> {
        let text = std::fs::read_to_string(path).map_err(ShaderError::IoError)?;
        Ok(Self::from_source(&path.to_string_lossy(), &text))
    }

    /// Replace the IR with a fresh parse. Existing variants must have been
    /// released with [`Shader::unload`] first.
    pub fn load_from_source(&mut self, text: &str) {
        let parsed = parse_shader(text);
        let source = parsed.source;

        self.name = if source.name.is_empty() {
            Path::new(&self.path)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        } else {
            source.name
        };
        for warning in &parsed.warnings {
            tracing::warn!("Shader '{}': {}", self.name, warning);
        }

        self.render_mode = source.render_mode;
        self.uniforms = source.uniforms;
        self.passes = source.passes.into_iter().map(Pass::new).collect();
        self.warnings = parsed.warnings;
        self.loaded = true;
        self.resolve_inheritance();

        tracing::info!(
            "Loaded shader '{}': {} uniforms, {} passes",
            self.name,
            self.uniforms.len(),
            self.passes.len()
        );
    }

    /// Destroy every compiled program and drop the IR.
    pub fn unload(&mut self, backend: &mut dyn GpuBackend) {
        for pass in &mut self.passes {
            pass.destroy_variants(backend);
        }
        self.passes.clear();
        self.uniforms.clear();
        self.warnings.clear();
        self.loaded = false;
    }

    /// Unload, re-parse and recompile each of `defines_list`.
    pub fn reload(&mut self, backend: &mut dyn GpuBackend, text: &str, defines_list: &[String]) {
        self.unload(backend);
        self.load_from_source(text);
        for defines in defines_list {
            self.compile(backend, defines);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    pub fn uniforms(&self) -> &[UniformDeclaration] {
        &self.uniforms
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    pub fn uniform_declaration(&self, name: &str) -> Option<&UniformDeclaration> {
        self.uniforms.iter().find(|u| u.bind_name == name)
    }

    /// First pass whose variant for `defines` binds `name`.
    pub fn uniform_binding(&self, name: &str, defines: &str) -> Option<&UniformBinding> {
        let hash = defines::defines_hash(defines);
        self.passes
            .iter()
            .filter_map(|p| p.program_variant_by_hash(hash))
            .find_map(|v| v.uniform(name))
    }

    pub fn pass(&self, index: usize) -> Option<&Pass> {
        self.passes.get(index)
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Append a pass; returns its index.
    pub fn create_pass(&mut self, source: PassSource) -> usize {
        self.passes.push(Pass::new(source));
        self.resolve_inheritance();
        self.passes.len() - 1
    }

    /// Remove a pass. Later passes may inherit differently afterwards, so
    /// their variants are released too.
    pub fn remove_pass(&mut self, backend: &mut dyn GpuBackend, index: usize) -> bool {
        if index >= self.passes.len() {
            return false;
        }
        let mut removed = self.passes.remove(index);
        removed.destroy_variants(backend);
        for pass in &mut self.passes[index..] {
            pass.destroy_variants(backend);
        }
        self.resolve_inheritance();
        true
    }

    pub fn remove_all_passes(&mut self, backend: &mut dyn GpuBackend) {
        for pass in &mut self.passes {
            pass.destroy_variants(backend);
        }
        self.passes.clear();
    }

    /// The IR in its parsed form, for re-serialization.
    pub fn to_source(&self) -> ShaderSource {
        ShaderSource {
            name: self.name.clone(),
            render_mode: self.render_mode,
            uniforms: self.uniforms.clone(),
            passes: self.passes.iter().map(|p| p.source.clone()).collect(),
        }
    }

    fn resolve_inheritance(&mut self) {
        let mut current = ResolvedSources::default();
        for pass in &mut self.passes {
            let src = &pass.source;
            if !src.varying.trim().is_empty() {
                current.varying = src.varying.clone();
            }
            if !src.vertex.trim().is_empty() {
                current.vertex = src.vertex.clone();
            }
            if !src.fragment.trim().is_empty() {
                current.fragment = src.fragment.clone();
            }
            pass.resolved = current.clone();
        }
    }

    /// Every pass holds either a variant or a recorded failure for the hash.
    pub fn is_settled(&self, defines_hash: u64) -> bool {
        self.passes.iter().all(|p| p.is_settled(defines_hash))
    }

    /// Compile every pass for `defines` with default options.
    pub fn compile(&mut self, backend: &mut dyn GpuBackend, defines: &str) -> usize {
        self.compile_with(backend, defines, &CompileOptions::default())
    }

    /// Compile every pass lacking a variant for `defines`. Failures are
    /// logged and recorded per pass; returns the number of new variants.
    pub fn compile_with(
        &mut self,
        backend: &mut dyn GpuBackend,
        defines: &str,
        options: &CompileOptions,
    ) -> usize {
        let parsed = Defines::parse(defines);
        let normalized = parsed.to_string();
        let hash = parsed.hash();

        if self.is_settled(hash) {
            tracing::debug!("Shader '{}': variant '{}' already compiled", self.name, normalized);
            return 0;
        }

        let tokens = parsed.tokens();
        let mut created = 0;
        for (index, pass) in self.passes.iter_mut().enumerate() {
            if pass.is_settled(hash) {
                continue;
            }

            let result = compile_pass(
                backend,
                &self.path,
                index,
                pass,
                &self.uniforms,
                &normalized,
                &tokens,
                options,
            );
            match result {
                Ok(variant) => {
                    tracing::info!(
                        "Shader '{}' pass {}: compiled variant '{}' ({} bindings)",
                        self.name,
                        index,
                        normalized,
                        variant.uniforms.len()
                    );
                    pass.variants.push(variant);
                    created += 1;
                }
                Err(e) => {
                    tracing::warn!("Shader '{}': {} [defines '{}']", self.name, e, normalized);
                    pass.failed.insert(hash);
                }
            }
        }
        created
    }
}

#[allow(clippy::too_many_arguments)]
fn compile_pass(
    backend: &mut dyn GpuBackend,
    path: &str,
    index: usize,
    pass: &Pass,
    declarations: &[UniformDeclaration],
    defines: &str,
    tokens: &[String],
    options: &CompileOptions,
) -> Result<ProgramVariant, ShaderError> {
    let resolved = &pass.resolved;
    if resolved.vertex.trim().is_empty() || resolved.fragment.trim().is_empty() {
        return Err(ShaderError::MissingSource { pass: index });
    }

    let failed = |error: BackendError| ShaderError::CompileFailed { pass: index, error };
    let renderer = backend.renderer();
    let vs_request = StageRequest {
        stage: StageKind::Vertex,
        path_hint: path,
        source: &resolved.vertex,
        varying: &resolved.varying,
        defines: tokens.to_vec(),
        platform: options.platform,
        profile: options.profile(renderer, StageKind::Vertex),
    };
    let fs_request = StageRequest {
        stage: StageKind::Fragment,
        source: &resolved.fragment,
        profile: options.profile(renderer, StageKind::Fragment),
        ..vs_request.clone()
    };

    let vs_code = backend.compile_stage(&vs_request).map_err(failed)?;
    let fs_code = backend.compile_stage(&fs_request).map_err(failed)?;
    let vs = backend.create_shader(&vs_code).map_err(failed)?;
    let fs = match backend.create_shader(&fs_code) {
        Ok(fs) => fs,
        Err(e) => {
            backend.destroy_shader(vs);
            return Err(failed(e));
        }
    };
    let program = match backend.link_program(vs, fs) {
        Ok(program) => program,
        Err(e) => {
            backend.destroy_shader(vs);
            backend.destroy_shader(fs);
            return Err(failed(e));
        }
    };

    // Vertex reflection first; a name seen in both stages keeps its first slot.
    let mut bindings: Vec<UniformBinding> = Vec::new();
    let reflected = backend
        .reflect_uniforms(vs)
        .into_iter()
        .chain(backend.reflect_uniforms(fs));
    for uniform in reflected {
        if bindings.iter().any(|b| b.name == uniform.name) {
            continue;
        }
        if let Some(decl) = declarations
            .iter()
            .find(|d| !d.is_define && d.bind_name == uniform.name)
        {
            bindings.push(UniformBinding::new(decl, Some(uniform.handle)));
        }
    }

    // Define-uniforms keep their declaration index among the bindings.
    for (position, decl) in declarations.iter().enumerate().filter(|(_, d)| d.is_define) {
        let at = position.min(bindings.len());
        bindings.insert(at, UniformBinding::new(decl, None));
    }

    Ok(ProgramVariant {
        defines: defines.to_string(),
        defines_hash: defines::defines_hash(defines),
        program,
        uniforms: bindings,
        settings: RenderSettings::from_tags(&pass.source.tags, defines),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ShaderModuleHandle;
    use crate::headless::HeadlessBackend;
    use lumen_core::state::{BlendMode, CullMode};

    const SHADER: &str = r#"name "Unlit"
params
{
    define bool USE_TINT "Tint" false
    sampler2D albedoMap "Albedo" 0
    vec4 u_tint "Tint Color" 1 1 1 1
}
pass
{
    tags
    {
        backface_culling off
        blend_mode = Transparent ? alpha : replace
    }
    varying
    {
        vec3 a_position : POSITION;
        vec2 a_texcoord0 : TEXCOORD0;
        vec2 v_texcoord0 : TEXCOORD0 = vec2(0.0, 0.0);
    }
    vertex
    {
        $input a_position, a_texcoord0
        $output v_texcoord0
        void main() { v_texcoord0 = a_texcoord0; gl_Position = vec4(a_position, 1.0); }
    }
    fragment
    {
        $input v_texcoord0
        SAMPLER2D(albedoMap, 0);
        uniform vec4 u_tint;
        void main()
        {
            vec4 color = texture2D(albedoMap, v_texcoord0);
        #if USE_TINT
            color = color * u_tint;
        #endif
            gl_FragColor = color;
        }
    }
}
pass
{
    tags { depth_write off }
}
"#;

    #[test]
    fn test_compile_creates_variant_per_pass() {
        let mut backend = HeadlessBackend::new();
        let mut shader = Shader::from_source("shaders/unlit.shader", SHADER);
        assert_eq!(shader.name(), "Unlit");
        assert_eq!(shader.compile(&mut backend, "USE_TINT=1"), 2);

        let first = shader.pass(0).unwrap().program_variant("USE_TINT=1").unwrap();
        let names: Vec<&str> = first.uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["USE_TINT", "albedoMap", "u_tint"]);
        assert!(first.uniform("USE_TINT").unwrap().handle.is_none());
        assert_eq!(first.settings.cull_mode, CullMode::None);

        // Pass 1 inherits the program of pass 0.
        let second = shader.pass(1).unwrap().program_variant("USE_TINT=1").unwrap();
        assert!(!second.settings.depth_write);
        assert_ne!(first.program, second.program);
    }

    #[test]
    fn test_optimized_out_uniform_has_no_binding() {
        let mut backend = HeadlessBackend::new();
        let mut shader = Shader::from_source("unlit.shader", SHADER);
        shader.compile(&mut backend, "USE_TINT=0");
        let variant = shader.pass(0).unwrap().program_variant("USE_TINT=0").unwrap();
        assert!(variant.uniform("u_tint").is_none());
        assert!(variant.uniform("albedoMap").is_some());
    }

    #[test]
    fn test_compile_is_idempotent_and_normalized() {
        let mut backend = HeadlessBackend::new();
        let mut shader = Shader::from_source("unlit.shader", SHADER);
        assert_eq!(shader.compile(&mut backend, "FOO=1;BAR=0"), 2);
        let stages = backend.compiled_stage_count();
        assert_eq!(shader.compile(&mut backend, "FOO=1;BAR=0"), 0);
        assert_eq!(shader.compile(&mut backend, "BAR=0;FOO=1;"), 0);
        assert_eq!(backend.compiled_stage_count(), stages);
        assert_eq!(shader.pass(0).unwrap().variants().len(), 1);
    }

    #[test]
    fn test_conditional_tag_per_variant() {
        let mut backend = HeadlessBackend::new();
        let mut shader = Shader::from_source("unlit.shader", SHADER);
        shader.compile(&mut backend, "Transparent=1");
        shader.compile(&mut backend, "Transparent=0");
        let pass = shader.pass(0).unwrap();
        let on = pass.program_variant("Transparent=1").unwrap();
        let off = pass.program_variant("Transparent=0").unwrap();
        assert_eq!(on.settings.blend_mode, BlendMode::Alpha);
        assert_eq!(off.settings.blend_mode, BlendMode::Replace);
        assert_eq!(on.settings.cull_mode, off.settings.cull_mode);
    }

    #[test]
    fn test_missing_source_is_contained() {
        let mut backend = HeadlessBackend::new();
        let mut shader = Shader::from_source("x.shader", "pass { tags { depth_write off } }");
        assert_eq!(shader.compile(&mut backend, ""), 0);
        assert!(shader.pass(0).unwrap().has_failed(""));
        assert_eq!(backend.compiled_stage_count(), 0);
    }

    #[test]
    fn test_unload_and_reload() {
        let mut backend = HeadlessBackend::new();
        let mut shader = Shader::from_source("unlit.shader", SHADER);
        shader.compile(&mut backend, "A=1");
        shader.compile(&mut backend, "A=0");
        assert_eq!(backend.live_program_count(), 4);

        shader.reload(&mut backend, SHADER, &["A=1".to_string()]);
        assert_eq!(backend.live_program_count(), 2);
        assert!(shader.pass(0).unwrap().program_variant("A=1").is_some());
        assert!(shader.pass(0).unwrap().program_variant("A=0").is_none());

        shader.unload(&mut backend);
        assert!(!shader.is_loaded());
        assert_eq!(backend.live_program_count(), 0);
    }

    #[test]
    fn test_pass_management() {
        let mut backend = HeadlessBackend::new();
        let mut shader = Shader::from_source("unlit.shader", SHADER);
        let index = shader.create_pass(PassSource::default());
        assert_eq!(index, 2);
        assert_eq!(shader.pass(2).unwrap().resolved(), shader.pass(0).unwrap().resolved());

        shader.compile(&mut backend, "");
        assert_eq!(backend.live_program_count(), 3);
        assert!(shader.remove_pass(&mut backend, 1));
        assert_eq!(shader.pass_count(), 2);
        assert_eq!(backend.live_program_count(), 1);
        assert!(!shader.remove_pass(&mut backend, 7));

        shader.remove_all_passes(&mut backend);
        assert_eq!(shader.pass_count(), 0);
        assert_eq!(backend.live_program_count(), 0);
    }

    #[test]
    fn test_uniform_lookups() {
        let mut backend = HeadlessBackend::new();
        let mut shader = Shader::from_source("unlit.shader", SHADER);
        shader.compile(&mut backend, "USE_TINT=1");
        assert_eq!(shader.uniform_declaration("u_tint").unwrap().display_name, "Tint Color");
        assert!(shader.uniform_declaration("missing").is_none());

        let binding = shader.uniform_binding("u_tint", "USE_TINT=1").unwrap();
        assert_eq!(binding.ty, UniformType::Vec4);
        let variant = shader.pass(0).unwrap().program_variant("USE_TINT=1").unwrap();
        assert_eq!(
            variant.uniform_by_hash(name_hash("u_tint")).map(|u| u.handle),
            Some(binding.handle)
        );
        assert!(shader.uniform_binding("u_tint", "USE_TINT=0").is_none());
    }

    #[test]
    fn test_link_failure_releases_modules() {
        let text = r#"name "Mismatch"
pass
{
    varying
    {
        vec3 a_position : POSITION;
        vec2 v_uv : TEXCOORD0 = vec2(0.0, 0.0);
    }
    vertex
    {
        $input a_position
        uniform vec4 u_offset;
        void main() { gl_Position = vec4(a_position, 1.0) + u_offset; }
    }
    fragment
    {
        $input v_uv
        void main() { gl_FragColor = vec4(v_uv, 0.0, 1.0); }
    }
}
"#;
        let mut backend = HeadlessBackend::new();
        let mut shader = Shader::from_source("mismatch.shader", text);
        assert_eq!(shader.compile(&mut backend, ""), 0);
        assert!(shader.pass(0).unwrap().has_failed(""));
        assert_eq!(backend.live_program_count(), 0);
        assert_eq!(backend.live_module_count(), 0);
        assert!(backend.reflect_uniforms(ShaderModuleHandle(0)).is_empty());
    }
}
