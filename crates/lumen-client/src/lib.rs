pub mod backend;
pub mod camera;
pub mod cli;
pub mod headless;
pub mod material;
pub mod pipeline_state;
pub mod preprocess;
pub mod project_config;
pub mod registry;
pub mod shader;

pub use backend::{GpuBackend, RendererKind};
pub use headless::HeadlessBackend;
pub use material::{Material, UniformValue};
pub use registry::{AssetRegistry, MaterialHandle, ShaderHandle};
pub use shader::{Shader, ShaderError};
