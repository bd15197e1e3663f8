//! Canonical text form of a [`ShaderSource`].
//!
//! Declarations are regenerated from the IR; raw sections are emitted
//! verbatim between their braces, so scanning the output yields the same
//! section text back.

use std::fmt::Write;

use crate::types::{PassSource, ShaderSource, TagDeclaration, UniformDeclaration};

pub fn write_shader(shader: &ShaderSource) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "name \"{}\"", shader.name);
    let _ = writeln!(out, "render_mode {}", shader.render_mode.keyword());

    if !shader.uniforms.is_empty() {
        out.push_str("params\n{\n");
        for uniform in &shader.uniforms {
            let _ = writeln!(out, "    {}", uniform_line(uniform));
        }
        out.push_str("}\n");
    }

    for pass in &shader.passes {
        write_pass(&mut out, pass);
    }
    out
}

fn uniform_line(u: &UniformDeclaration) -> String {
    let mut line = String::new();
    if u.is_define {
        line.push_str("define ");
    }
    if u.is_hidden {
        line.push_str("hidden ");
    }
    let _ = write!(line, "{} {} \"{}\"", u.ty, u.bind_name, u.display_name);
    for value in u.default_value.split(',') {
        let _ = write!(line, " {}", value);
    }
    // `-` stands in for a missing lower bound.
    if u.min.is_some() || u.max.is_some() {
        match u.min {
            Some(min) => {
                let _ = write!(line, " : {}", min);
            }
            None => line.push_str(" : -"),
        }
        if let Some(max) = u.max {
            let _ = write!(line, " {}", max);
        }
    }
    if let Some(attribute) = u.attribute.keyword() {
        let _ = write!(line, " : {}", attribute);
    }
    line
}

fn write_pass(out: &mut String, pass: &PassSource) {
    out.push_str("pass\n{\n");
    if !pass.tags.is_empty() {
        out.push_str("    tags\n    {\n");
        for tag in &pass.tags {
            let _ = writeln!(out, "        {}", tag_line(tag));
        }
        out.push_str("    }\n");
    }
    for (keyword, text) in [
        ("varying", &pass.varying),
        ("vertex", &pass.vertex),
        ("fragment", &pass.fragment),
    ] {
        if !text.is_empty() {
            let _ = writeln!(out, "    {}\n    {{{}}}", keyword, text);
        }
    }
    out.push_str("}\n");
}

fn tag_line(tag: &TagDeclaration) -> String {
    match tag {
        TagDeclaration::Plain { name, values } => format!("{} {}", name, join_values(values)),
        TagDeclaration::Conditional {
            name,
            define,
            if_set,
            if_unset,
        } if if_unset.is_empty() => format!("{} = {} ? {}", name, define, join_values(if_set)),
        TagDeclaration::Conditional {
            name,
            define,
            if_set,
            if_unset,
        } => format!(
            "{} = {} ? {} : {}",
            name,
            define,
            join_values(if_set),
            join_values(if_unset)
        ),
    }
}

fn join_values(values: &[String]) -> String {
    values
        .iter()
        .map(|v| {
            if v.is_empty() || v.contains(char::is_whitespace) {
                format!("\"{}\"", v)
            } else {
                v.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
