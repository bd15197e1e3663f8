use clap::{Parser, Subcommand};

use crate::backend::RendererKind;

#[derive(Parser, Debug)]
#[command(name = "lumen", version, about = "Lumen - shader and material toolchain")]
pub struct CliArgs {
    /// Subcommand (parse, fmt, compile, material)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Project root; lumen.yaml is searched upward from here
    #[arg(long, global = true, default_value = ".")]
    pub project: String,

    /// Renderer whose default shader profiles are used
    #[arg(long, global = true)]
    pub renderer: Option<RendererKind>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse a shader file and print its declarations and passes
    Parse {
        /// Path to the .shader file
        shader: String,
        /// Output format
        #[arg(long, default_value = "yaml")]
        format: OutputFormat,
    },
    /// Re-serialize a shader file in canonical form
    Fmt {
        /// Path to the .shader file
        shader: String,
        /// Rewrite the file instead of printing
        #[arg(long)]
        write: bool,
    },
    /// Compile every pass of a shader for one defines string
    Compile {
        /// Path to the .shader file
        shader: String,
        /// Defines, e.g. "USE_FOG=1;LIGHTS=4"
        #[arg(long, default_value = "")]
        defines: String,
    },
    /// Load a material and compile the variant it selects
    Material {
        /// Path to the material YAML, relative to the assets root
        path: String,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Yaml,
    Json,
}
