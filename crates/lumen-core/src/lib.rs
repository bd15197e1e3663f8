//! Shader DSL front end: scanning, `params`/`tags` parsing, define sets and
//! render-state derivation. Nothing here touches a GPU.

pub mod defines;
pub mod params;
pub mod scanner;
pub mod state;
pub mod tags;
mod tokens;
pub mod types;
pub mod writer;

pub use defines::{name_hash, Defines};
pub use scanner::parse_shader;
pub use state::{RenderSettings, RenderState};
pub use tags::TagSetting;
pub use types::*;
pub use writer::write_shader;
