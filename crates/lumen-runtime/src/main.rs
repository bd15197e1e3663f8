use std::path::{Path, PathBuf};

use clap::Parser;
use lumen_client::cli::{CliArgs, Command, OutputFormat};
use lumen_client::pipeline_state::PipelineState;
use lumen_client::project_config::{self, LumenConfig};
use lumen_client::registry::AssetRegistry;
use lumen_client::shader::{CompileOptions, Shader};
use lumen_client::HeadlessBackend;

/// Settings the commands run with: lumen.yaml when found, CLI overrides on top.
struct Project {
    root: PathBuf,
    config: Option<LumenConfig>,
    backend: HeadlessBackend,
    options: CompileOptions,
}

impl Project {
    fn open(args: &CliArgs) -> Self {
        let start = PathBuf::from(&args.project);
        let config = match project_config::find_config(&start) {
            Some(path) => match project_config::load_config(&path) {
                Ok(c) => {
                    tracing::info!("Loaded project: {} v{}", c.name, c.version);
                    Some((path, c))
                }
                Err(e) => fail(e),
            },
            None => None,
        };

        let root = config
            .as_ref()
            .and_then(|(path, _)| path.parent().map(Path::to_path_buf))
            .unwrap_or(start);
        let config = config.map(|(_, c)| c);

        let renderer = args
            .renderer
            .or_else(|| config.as_ref().map(LumenConfig::renderer_kind))
            .unwrap_or(lumen_client::RendererKind::Noop);
        let mut backend = HeadlessBackend::with_renderer(renderer);
        let options = match &config {
            Some(c) => {
                for dir in c.include_paths(&root) {
                    backend.add_include_dir(dir);
                }
                c.compile_options()
            }
            None => CompileOptions::default(),
        };

        Self {
            root,
            config,
            backend,
            options,
        }
    }

    fn assets_dir(&self) -> PathBuf {
        match &self.config {
            Some(c) => c.assets_dir(&self.root),
            None => self.root.clone(),
        }
    }
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    tracing::info!("Lumen v{}", env!("CARGO_PKG_VERSION"));

    match &args.command {
        // lumen parse <shader> [--format yaml|json]
        Some(Command::Parse { shader, format }) => {
            let text = std::fs::read_to_string(shader).unwrap_or_else(|e| fail(e));
            let parsed = lumen_core::parse_shader(&text);
            for warning in &parsed.warnings {
                tracing::warn!("{}: {}", shader, warning);
            }
            let out = match format {
                OutputFormat::Yaml => serde_yaml::to_string(&parsed.source).map_err(|e| e.to_string()),
                OutputFormat::Json => {
                    serde_json::to_string_pretty(&parsed.source).map_err(|e| e.to_string())
                }
            };
            match out {
                Ok(s) => println!("{}", s),
                Err(e) => fail(e),
            }
        }

        // lumen fmt <shader> [--write]
        Some(Command::Fmt { shader, write }) => {
            let text = std::fs::read_to_string(shader).unwrap_or_else(|e| fail(e));
            let formatted = lumen_core::write_shader(&lumen_core::parse_shader(&text).source);
            if *write {
                if let Err(e) = std::fs::write(shader, &formatted) {
                    fail(e);
                }
                tracing::info!("Formatted {}", shader);
            } else {
                print!("{}", formatted);
            }
        }

        // lumen compile <shader> [--defines X]
        Some(Command::Compile { shader, defines }) => {
            let mut project = Project::open(&args);
            let mut loaded = Shader::load(Path::new(shader)).unwrap_or_else(|e| fail(e));
            let created = loaded.compile_with(&mut project.backend, defines, &project.options);

            let mut failures = 0;
            for (index, pass) in loaded.passes().iter().enumerate() {
                match pass.program_variant(defines) {
                    Some(variant) => {
                        let names: Vec<&str> =
                            variant.uniforms.iter().map(|u| u.name.as_str()).collect();
                        let state = variant.render_state(lumen_core::RenderState::DEFAULT);
                        println!(
                            "pass {}: program {} state 0x{:016x} stencil 0x{:08x} uniforms [{}]",
                            index,
                            variant.program.0,
                            state.state,
                            state.stencil,
                            names.join(", ")
                        );
                        let pipeline =
                            variant.pipeline_state(Some(wgpu::TextureFormat::Depth24PlusStencil8));
                        println!("  {}", describe_pipeline(&pipeline));
                    }
                    None => {
                        failures += 1;
                        println!("pass {}: failed", index);
                    }
                }
            }
            tracing::info!("Compiled {} variant(s) of '{}'", created, loaded.name());
            if failures > 0 {
                std::process::exit(1);
            }
        }

        // lumen material <path>
        Some(Command::Material { path }) => {
            let mut project = Project::open(&args);
            let baseline = match &project.config {
                Some(c) => c.baseline().unwrap_or_else(|e| fail(e)),
                None => lumen_core::RenderState::DEFAULT,
            };
            let mut registry = AssetRegistry::with_options(&project.assets_dir(), project.options.clone());
            let handle = registry.load_material(path).unwrap_or_else(|e| fail(e));

            let Some(material) = registry.material(handle) else {
                fail("material was not registered");
            };
            println!("material '{}' defines '{}'", material.name(), material.defines_string());
            let pass_count = material
                .shader()
                .and_then(|h| registry.shader(h))
                .map(|s| s.pass_count())
                .unwrap_or(0);

            for pass in 0..pass_count {
                match registry.prepare_draw(&mut project.backend, handle, pass, None, baseline) {
                    Some(draw) => println!(
                        "pass {}: program {} state 0x{:016x}",
                        pass, draw.program.0, draw.render_state.state
                    ),
                    None => println!("pass {}: no program", pass),
                }
            }
            for event in project.backend.take_events() {
                tracing::debug!("{:?}", event);
            }
        }

        None => {
            eprintln!("No command given. Run `lumen --help` for usage.");
            std::process::exit(1);
        }
    }
}

/// One-line summary of the wgpu state a variant's pipeline is built with.
fn describe_pipeline(pipeline: &PipelineState) -> String {
    let cull = match pipeline.primitive.cull_mode {
        Some(wgpu::Face::Back) => "back",
        Some(wgpu::Face::Front) => "front",
        None => "none",
    };
    let blend = match pipeline.blend {
        Some(blend) if blend == wgpu::BlendState::REPLACE => "replace".to_string(),
        Some(blend) => format!("{:?} {:?}", blend.color.src_factor, blend.color.dst_factor),
        None => "none".to_string(),
    };
    let depth = match &pipeline.depth_stencil {
        Some(ds) => format!(
            "{:?}{}{}",
            ds.depth_compare,
            if ds.depth_write_enabled { " write" } else { "" },
            if ds.stencil.is_enabled() { " stencil" } else { "" }
        ),
        None => "none".to_string(),
    };
    format!(
        "pipeline: cull {} blend {} depth {} stencil_ref {}",
        cull, blend, depth, pipeline.stencil_reference
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_client::pipeline_state::pipeline_state;
    use lumen_core::state::{BlendMode, CullMode};
    use lumen_core::RenderSettings;

    #[test]
    fn test_describe_pipeline() {
        let depth = Some(wgpu::TextureFormat::Depth24PlusStencil8);
        let opaque = pipeline_state(&RenderSettings::default(), depth);
        assert_eq!(
            describe_pipeline(&opaque),
            "pipeline: cull back blend replace depth LessEqual write stencil_ref 0"
        );

        let settings = RenderSettings {
            blend_mode: BlendMode::Alpha,
            cull_mode: CullMode::None,
            ..Default::default()
        };
        let line = describe_pipeline(&pipeline_state(&settings, None));
        assert_eq!(line, "pipeline: cull none blend SrcAlpha OneMinusSrcAlpha depth none stencil_ref 0");
    }
}
