use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lumen_core::RenderState;

use crate::backend::{GpuBackend, ProgramHandle};
use crate::camera::{BuiltinTextures, Camera};
use crate::material::{load_material_file, Material, MaterialError, UniformValue};
use crate::shader::{CompileOptions, Shader, ShaderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub usize);

/// What a draw call needs once a material has been prepared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawState {
    pub program: ProgramHandle,
    pub render_state: RenderState,
}

/// Owns every shader and material, keyed by path.
pub struct AssetRegistry {
    assets_root: PathBuf,
    options: CompileOptions,
    shaders: Vec<Shader>,
    materials: Vec<Material>,
    shader_paths: HashMap<PathBuf, ShaderHandle>,
    material_paths: HashMap<PathBuf, MaterialHandle>,
    builtins: Option<BuiltinTextures>,
}

impl AssetRegistry {
    pub fn new(assets_root: &Path) -> Self {
        Self::with_options(assets_root, CompileOptions::default())
    }

    pub fn with_options(assets_root: &Path, options: CompileOptions) -> Self {
        Self {
            assets_root: assets_root.to_path_buf(),
            options,
            shaders: Vec::new(),
            materials: Vec::new(),
            shader_paths: HashMap::new(),
            material_paths: HashMap::new(),
            builtins: None,
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn assets_root(&self) -> &Path {
        &self.assets_root
    }

    /// Load a shader relative to the assets root; repeated paths share one handle.
    pub fn load_shader(&mut self, path: &str) -> Result<ShaderHandle, ShaderError> {
        let key = PathBuf::from(path);
        if let Some(&handle) = self.shader_paths.get(&key) {
            return Ok(handle);
        }

        let shader = Shader::load(&self.assets_root.join(path))?;
        Ok(self.insert_shader(key, shader))
    }

    /// Register a shader parsed from memory under `path`. A path already
    /// registered is reloaded in place, keeping its handle.
    pub fn add_shader_source(
        &mut self,
        backend: &mut dyn GpuBackend,
        path: &str,
        text: &str,
    ) -> ShaderHandle {
        let key = PathBuf::from(path);
        if let Some(&handle) = self.shader_paths.get(&key) {
            self.reload_shader(backend, handle, text);
            return handle;
        }
        self.insert_shader(key, Shader::from_source(path, text))
    }

    fn insert_shader(&mut self, key: PathBuf, shader: Shader) -> ShaderHandle {
        let handle = ShaderHandle(self.shaders.len());
        self.shaders.push(shader);
        self.shader_paths.insert(key, handle);
        handle
    }

    pub fn shader(&self, handle: ShaderHandle) -> Option<&Shader> {
        self.shaders.get(handle.0)
    }

    pub fn shader_mut(&mut self, handle: ShaderHandle) -> Option<&mut Shader> {
        self.shaders.get_mut(handle.0)
    }

    pub fn find_shader(&self, name: &str) -> Option<ShaderHandle> {
        self.shaders
            .iter()
            .position(|s| s.name() == name)
            .map(ShaderHandle)
    }

    pub fn shader_count(&self) -> usize {
        self.shaders.len()
    }

    /// Load a material YAML file along with the shader it names.
    pub fn load_material(&mut self, path: &str) -> Result<MaterialHandle, MaterialError> {
        let key = PathBuf::from(path);
        if let Some(&handle) = self.material_paths.get(&key) {
            return Ok(handle);
        }

        let file = load_material_file(&self.assets_root.join(path))?;
        let name = file.name.clone().unwrap_or_else(|| {
            Path::new(path)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        });

        let shader = if file.shader.is_empty() {
            None
        } else {
            Some(self.load_shader(&file.shader).map_err(MaterialError::ShaderError)?)
        };
        let handle = self.create_material(&name, shader);

        for entry in &file.uniforms {
            let ty = shader
                .and_then(|h| self.shaders[h.0].uniform_declaration(&entry.name))
                .map(|d| d.ty);
            match UniformValue::from_yaml(ty, &entry.value) {
                Some(value) => self.materials[handle.0].set_uniform(&entry.name, value, entry.define),
                None => tracing::warn!(
                    "Material '{}': unsupported value for uniform '{}'",
                    name,
                    entry.name
                ),
            }
        }

        self.material_paths.insert(key, handle);
        tracing::info!("Loaded material: {}", path);
        Ok(handle)
    }

    pub fn create_material(&mut self, name: &str, shader: Option<ShaderHandle>) -> MaterialHandle {
        let handle = MaterialHandle(self.materials.len());
        self.materials.push(Material::new(name));
        if let Some(shader) = shader {
            self.set_material_shader(handle, shader);
        }
        handle
    }

    /// Duplicate a material; the copy compiles on its own.
    pub fn clone_material(&mut self, source: MaterialHandle, name: &str) -> Option<MaterialHandle> {
        let copy = self.materials.get(source.0)?.clone_as(name);
        let handle = MaterialHandle(self.materials.len());
        self.materials.push(copy);
        Some(handle)
    }

    pub fn set_material_shader(&mut self, material: MaterialHandle, shader: ShaderHandle) -> bool {
        match (self.materials.get_mut(material.0), self.shaders.get(shader.0)) {
            (Some(m), Some(s)) => {
                m.set_shader(shader, s);
                true
            }
            _ => false,
        }
    }

    pub fn material(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle.0)
    }

    pub fn material_mut(&mut self, handle: MaterialHandle) -> Option<&mut Material> {
        self.materials.get_mut(handle.0)
    }

    /// Compile the variant a material's current defines select.
    pub fn compile_material(&mut self, backend: &mut dyn GpuBackend, handle: MaterialHandle) -> usize {
        let Some(material) = self.materials.get_mut(handle.0) else {
            return 0;
        };
        let Some(shader) = material.shader() else {
            return 0;
        };
        let Some(target) = self.shaders.get_mut(shader.0) else {
            return 0;
        };
        if !material.needs_compile() && target.is_settled(material.defines_hash()) {
            return 0;
        }

        let created = target.compile_with(backend, material.defines_string(), &self.options);
        material.mark_compiled();
        created
    }

    /// Distinct defines strings of the materials bound to `shader`.
    pub fn material_defines(&self, shader: ShaderHandle) -> Vec<String> {
        let mut list: Vec<String> = Vec::new();
        for material in self.materials.iter().filter(|m| m.shader() == Some(shader)) {
            let defines = material.defines_string().to_string();
            if !list.contains(&defines) {
                list.push(defines);
            }
        }
        list
    }

    /// Re-parse a shader and recompile every variant its materials use.
    pub fn reload_shader(&mut self, backend: &mut dyn GpuBackend, handle: ShaderHandle, text: &str) -> bool {
        let defines_list = self.material_defines(handle);
        let options = self.options.clone();
        let Some(shader) = self.shaders.get_mut(handle.0) else {
            return false;
        };
        for material in self.materials.iter_mut().filter(|m| m.shader() == Some(handle)) {
            material.mark_dirty();
        }
        shader.unload(backend);
        shader.load_from_source(text);
        for defines in &defines_list {
            shader.compile_with(backend, defines, &options);
        }
        true
    }

    /// Reload a shader from the file it was loaded from.
    pub fn reload_shader_from_disk(
        &mut self,
        backend: &mut dyn GpuBackend,
        handle: ShaderHandle,
    ) -> Result<(), ShaderError> {
        let Some(path) = self.shaders.get(handle.0).map(|s| PathBuf::from(s.path())) else {
            return Ok(());
        };
        let text = std::fs::read_to_string(&path).map_err(ShaderError::IoError)?;
        self.reload_shader(backend, handle, &text);
        Ok(())
    }

    /// Placeholder textures, created on first use.
    pub fn builtins(&mut self, backend: &mut dyn GpuBackend) -> BuiltinTextures {
        *self
            .builtins
            .get_or_insert_with(|| BuiltinTextures::create(backend))
    }

    /// Compile if the variant is missing, push the material's uniforms for `pass` and
    /// return the program plus its render state. `None` when the pass has
    /// no variant for the material's defines.
    pub fn prepare_draw(
        &mut self,
        backend: &mut dyn GpuBackend,
        material: MaterialHandle,
        pass: usize,
        camera: Option<&Camera>,
        baseline: RenderState,
    ) -> Option<DrawState> {
        self.compile_material(backend, material);
        let builtins = self.builtins(backend);

        let material = self.materials.get(material.0)?;
        let shader = self.shaders.get(material.shader()?.0)?;
        let variant = shader
            .pass(pass)?
            .program_variant_by_hash(material.defines_hash())?;

        material.submit_uniforms(backend, variant, camera, &builtins);
        Some(DrawState {
            program: variant.program,
            render_state: variant.render_state(baseline),
        })
    }

    /// Release every compiled program.
    pub fn unload_all(&mut self, backend: &mut dyn GpuBackend) {
        for shader in &mut self.shaders {
            shader.unload(backend);
        }
        self.shaders.clear();
        self.materials.clear();
        self.shader_paths.clear();
        self.material_paths.clear();
    }
}
