//! `params { ... }` block parser.
//!
//! One declaration per line:
//!
//! ```text
//! [define] [hidden] <type> <bindName> "<Display Name>" <default...> [: min max] [: backBufferColor]
//! ```
//!
//! A non-numeric `min` such as `-` leaves the lower bound unset.
//!
//! Output order follows source order. Define-uniforms have no GPU handle, so
//! their position in this list is the only stable identity they carry.

use crate::tokens::{tokenize_line, Token};
use crate::types::{ParseWarning, UniformAttribute, UniformDeclaration, UniformType};

pub fn parse_params(src: &str) -> (Vec<UniformDeclaration>, Vec<ParseWarning>) {
    let mut uniforms: Vec<UniformDeclaration> = Vec::new();
    let mut warnings = Vec::new();

    for (line_no, line) in src.lines().enumerate() {
        let tokens = tokenize_line(line, true);
        if tokens.is_empty() {
            continue;
        }

        let mut cursor = 0;
        let mut is_define = false;
        let mut is_hidden = false;
        while let Some(Token::Word(w)) = tokens.get(cursor) {
            match w.as_str() {
                "define" => is_define = true,
                "hidden" => is_hidden = true,
                _ => break,
            }
            cursor += 1;
        }

        // A line holding only qualifiers tags the declaration above it.
        if cursor == tokens.len() {
            if let Some(prev) = uniforms.last_mut() {
                prev.is_define |= is_define;
                prev.is_hidden |= is_hidden;
            }
            continue;
        }

        let keyword = tokens[cursor].text();
        let Some(ty) = UniformType::from_keyword(keyword) else {
            warnings.push(ParseWarning::UnknownUniformType {
                line: line_no,
                keyword: keyword.to_string(),
            });
            continue;
        };
        cursor += 1;

        match parse_declaration(ty, &tokens[cursor..]) {
            Some(mut decl) => {
                decl.is_define = is_define;
                decl.is_hidden = is_hidden;
                uniforms.push(decl);
            }
            None => warnings.push(ParseWarning::MalformedUniform {
                line: line_no,
                text: line.trim().to_string(),
            }),
        }
    }

    (uniforms, warnings)
}

/// Parse everything after the type keyword.
fn parse_declaration(ty: UniformType, tokens: &[Token]) -> Option<UniformDeclaration> {
    let mut segments = tokens.split(|t| matches!(t, Token::Colon));
    let head = segments.next().unwrap_or(&[]);

    let bind_name = head.first()?.text();
    if bind_name.is_empty() {
        return None;
    }
    let display_name = head.get(1).map(Token::text).unwrap_or(bind_name);

    let mut decl = UniformDeclaration::new(ty, bind_name, display_name);

    let values: Vec<&str> = head
        .iter()
        .skip(2)
        .flat_map(|t| t.text().split(','))
        .filter(|s| !s.is_empty())
        .take(ty.value_arity())
        .collect();
    if !values.is_empty() {
        decl.default_value = values.join(",");
    }

    for segment in segments {
        let Some(first) = segment.first() else {
            continue;
        };
        if let Some(attribute) = UniformAttribute::from_keyword(first.text()) {
            decl.attribute = attribute;
            continue;
        }
        if ty.accepts_range() {
            decl.min = segment.first().and_then(|t| t.text().parse().ok());
            decl.max = segment.get(1).and_then(|t| t.text().parse().ok());
        }
    }

    Some(decl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_and_vector_defaults() {
        let src = r#"
            float u_roughness "Roughness" 0.5 : 0 1
            vec3 u_tint "Tint Color" 1 0.5 0.25
            color u_color "Color" 1 1 1 1
            sampler2D albedoMap "Albedo" 0
        "#;
        let (uniforms, warnings) = parse_params(src);
        assert!(warnings.is_empty());
        assert_eq!(uniforms.len(), 4);

        assert_eq!(uniforms[0].ty, UniformType::Float);
        assert_eq!(uniforms[0].bind_name, "u_roughness");
        assert_eq!(uniforms[0].display_name, "Roughness");
        assert_eq!(uniforms[0].default_value, "0.5");
        assert_eq!(uniforms[0].min, Some(0.0));
        assert_eq!(uniforms[0].max, Some(1.0));

        assert_eq!(uniforms[1].display_name, "Tint Color");
        assert_eq!(uniforms[1].default_value, "1,0.5,0.25");
        assert_eq!(uniforms[2].default_value, "1,1,1,1");
        assert_eq!(uniforms[3].ty, UniformType::Sampler2D);
        assert_eq!(uniforms[3].default_value, "0");
    }

    #[test]
    fn test_qualifiers_prefix_and_standalone() {
        let src = r#"
            define bool USE_FOG "Fog" true
            int u_count "Count" 3
            hidden
            hidden define int u_mode "Mode" 1
        "#;
        let (uniforms, _) = parse_params(src);
        assert_eq!(uniforms.len(), 3);
        assert!(uniforms[0].is_define && !uniforms[0].is_hidden);
        assert!(uniforms[1].is_hidden && !uniforms[1].is_define);
        assert!(uniforms[2].is_hidden && uniforms[2].is_define);
    }

    #[test]
    fn test_back_buffer_attribute() {
        let src = r#"sampler2D u_screen "Screen" 0 : backBufferColor
sampler2D u_depth "Depth" 1 : backBufferDepth"#;
        let (uniforms, _) = parse_params(src);
        assert_eq!(uniforms[0].attribute, UniformAttribute::BackBufferColor);
        assert_eq!(uniforms[1].attribute, UniformAttribute::BackBufferDepth);
        assert_eq!(uniforms[0].min, None);
    }

    #[test]
    fn test_range_ignored_for_vectors() {
        let (uniforms, _) = parse_params(r#"vec2 u_uv "UV" 1 1 : 0 10"#);
        assert_eq!(uniforms[0].min, None);
        assert_eq!(uniforms[0].max, None);
    }

    #[test]
    fn test_unknown_type_is_reported_and_skipped() {
        let src = "mat4 u_bones \"Bones\" 0\nint u_ok \"Ok\" 1\n";
        let (uniforms, warnings) = parse_params(src);
        assert_eq!(uniforms.len(), 1);
        assert_eq!(uniforms[0].bind_name, "u_ok");
        assert_eq!(
            warnings,
            vec![ParseWarning::UnknownUniformType {
                line: 0,
                keyword: "mat4".to_string()
            }]
        );
    }

    #[test]
    fn test_comments_and_missing_default() {
        let src = "// material params\nfloat u_a \"A\"\n";
        let (uniforms, warnings) = parse_params(src);
        assert!(warnings.is_empty());
        assert_eq!(uniforms[0].default_value, "0");
    }

    #[test]
    fn test_upper_bound_only() {
        let (uniforms, _) = parse_params(r#"float u_fade "Fade" 1 : - 4"#);
        assert_eq!(uniforms[0].min, None);
        assert_eq!(uniforms[0].max, Some(4.0));
    }
}
