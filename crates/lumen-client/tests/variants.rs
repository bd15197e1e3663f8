use lumen_client::shader::Shader;
use lumen_client::HeadlessBackend;
use lumen_core::state::BlendMode;
use lumen_core::{parse_shader, write_shader};

const SURFACE: &str = r#"name "Surface"
render_mode forward
params
{
    define bool FOO "Foo" false
    vec4 u_tint "Tint" 1 1 1 1
    float u_gloss "Gloss" 0.5 : 0 1
}
pass
{
    tags
    {
        blend_mode = Transparent ? alpha : replace
        depth_func lequal
    }
    varying
    {
        vec3 a_position : POSITION;
        vec3 v_normal : NORMAL = vec3(0.0, 0.0, 1.0);
    }
    vertex
    {
        $input a_position
        $output v_normal
        void main()
        {
            v_normal = vec3(0.0, 0.0, 1.0);
            gl_Position = vec4(a_position, 1.0);
        }
    }
    fragment
    {
        $input v_normal
        uniform vec4 u_tint;
        uniform float u_gloss;
        void main()
        {
            vec4 color = vec4(v_normal * u_gloss, 1.0);
        #if FOO
            color = color * u_tint;
        #endif
            gl_FragColor = color;
        }
    }
}
"#;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn test_parse_write_parse_is_stable() {
    let first = parse_shader(SURFACE);
    assert!(first.warnings.is_empty());
    let written = write_shader(&first.source);
    let second = parse_shader(&written);
    assert_eq!(first.source, second.source);
    assert_eq!(write_shader(&second.source), written);
}

#[test]
fn test_repeat_compile_reuses_variant() {
    init_logging();
    let mut backend = HeadlessBackend::new();
    let mut shader = Shader::from_source("surface.shader", SURFACE);

    assert_eq!(shader.compile(&mut backend, "FOO=1;BAR=0"), 1);
    let program = shader.pass(0).unwrap().program_handle("FOO=1;BAR=0").unwrap();
    let stages = backend.compiled_stage_count();

    assert_eq!(shader.compile(&mut backend, "FOO=1;BAR=0"), 0);
    assert_eq!(shader.compile(&mut backend, " BAR=0 ; FOO=1 "), 0);
    assert_eq!(backend.compiled_stage_count(), stages);
    assert_eq!(shader.pass(0).unwrap().program_handle("BAR=0;FOO=1"), Some(program));
}

#[test]
fn test_defines_select_isolated_variants() {
    let mut backend = HeadlessBackend::new();
    let mut shader = Shader::from_source("surface.shader", SURFACE);
    shader.compile(&mut backend, "FOO=1");
    shader.compile(&mut backend, "FOO=0");

    let pass = shader.pass(0).unwrap();
    assert_eq!(pass.variants().len(), 2);
    let on = pass.program_variant("FOO=1").unwrap();
    let off = pass.program_variant("FOO=0").unwrap();
    assert_ne!(on.program, off.program);
    assert!(on.uniform("u_tint").is_some());
    assert!(off.uniform("u_tint").is_none());
    assert!(on.uniform("u_gloss").is_some() && off.uniform("u_gloss").is_some());

    // Compiling the second variant leaves the first live.
    assert!(backend.is_program_live(on.program));
    assert!(backend.is_program_live(off.program));
}

#[test]
fn test_conditional_blend_tag() {
    let mut backend = HeadlessBackend::new();
    let mut shader = Shader::from_source("surface.shader", SURFACE);
    shader.compile(&mut backend, "Transparent=1");
    shader.compile(&mut backend, "");

    let pass = shader.pass(0).unwrap();
    assert_eq!(
        pass.program_variant("Transparent=1").unwrap().settings.blend_mode,
        BlendMode::Alpha
    );
    assert_eq!(pass.program_variant("").unwrap().settings.blend_mode, BlendMode::Replace);
}

#[test]
fn test_define_bindings_keep_declaration_order() {
    let text = r#"name "Order"
params
{
    define bool A "A" true
    vec4 B "B" 0 0 0 0
    define int C "C" 2
}
pass
{
    varying { vec3 a_position : POSITION; }
    vertex
    {
        $input a_position
        void main() { gl_Position = vec4(a_position, 1.0); }
    }
    fragment
    {
        uniform vec4 B;
        void main() { gl_FragColor = B; }
    }
}
"#;
    let mut backend = HeadlessBackend::new();
    let mut shader = Shader::from_source("order.shader", text);
    assert_eq!(shader.compile(&mut backend, "A=1;C=2"), 1);

    let variant = shader.pass(0).unwrap().program_variant("A=1;C=2").unwrap();
    let names: Vec<&str> = variant.uniforms.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B", "C"]);
    assert!(variant.uniforms[0].is_define && variant.uniforms[0].handle.is_none());
    assert!(variant.uniforms[1].handle.is_some());
    assert!(variant.uniforms[2].is_define && variant.uniforms[2].handle.is_none());
}

#[test]
fn test_failed_pass_does_not_affect_others() {
    let text = r#"name "Broken"
pass
{
    varying { vec3 a_position : POSITION; }
    vertex
    {
        $input a_position
        void main() { gl_Position = vec4(a_position, 1.0); }
    }
    fragment
    {
        void main() { gl_FragColor = vec4(1.0); }
    }
}
pass
{
    fragment
    {
        void entry() { gl_FragColor = vec4(0.0); }
    }
}
"#;
    init_logging();
    let mut backend = HeadlessBackend::new();
    let mut shader = Shader::from_source("broken.shader", text);
    assert_eq!(shader.pass_count(), 2);

    assert_eq!(shader.compile(&mut backend, ""), 1);
    assert!(shader.pass(0).unwrap().program_variant("").is_some());
    assert!(shader.pass(1).unwrap().program_variant("").is_none());
    assert!(shader.pass(1).unwrap().has_failed(""));

    // The failure is remembered rather than retried.
    let stages = backend.compiled_stage_count();
    assert_eq!(shader.compile(&mut backend, ""), 0);
    assert_eq!(backend.compiled_stage_count(), stages);
    assert_eq!(backend.live_program_count(), 1);
}

#[test]
fn test_includes_resolve_through_backend() {
    let text = r#"name "Included"
pass
{
    varying { vec3 a_position : POSITION; }
    vertex
    {
        $input a_position
        #include "common.sh"
        void main() { gl_Position = transform(a_position); }
    }
    fragment
    {
        void main() { gl_FragColor = vec4(1.0); }
    }
}
"#;
    let mut backend = HeadlessBackend::new();
    let mut shader = Shader::from_source("shaders/included.shader", text);
    assert_eq!(shader.compile(&mut backend, ""), 0);

    backend.register_include("common.sh", "vec4 transform(vec3 p) { return vec4(p, 1.0); }\n");
    shader.reload(&mut backend, text, &[String::new()]);
    assert!(shader.pass(0).unwrap().program_variant("").is_some());
}
