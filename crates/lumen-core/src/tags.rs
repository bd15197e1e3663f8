//! `tags { ... }` block parser and the typed tag vocabulary.

use crate::state::{
    BlendMode, CullMode, DepthFunction, IterationMode, RenderSettings, StencilFunction, StencilOp,
};
use crate::tokens::tokenize_line;
use crate::types::{ParseWarning, TagDeclaration};

/// Parse the raw text of a `tags` section into declarations, in source order.
pub fn parse_tags(src: &str) -> (Vec<TagDeclaration>, Vec<ParseWarning>) {
    let mut tags = Vec::new();
    let mut warnings = Vec::new();

    for (line_no, line) in src.lines().enumerate() {
        let tokens: Vec<String> = tokenize_line(line, false)
            .into_iter()
            .map(|t| t.text().to_string())
            .collect();
        let Some((name, rest)) = tokens.split_first() else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }

        if rest[0] != "=" {
            tags.push(TagDeclaration::Plain {
                name: name.clone(),
                values: rest.to_vec(),
            });
            continue;
        }

        match parse_conditional(name, &rest[1..]) {
            Some(tag) => tags.push(tag),
            None => warnings.push(ParseWarning::MalformedTag {
                line: line_no,
                text: line.trim().to_string(),
            }),
        }
    }

    (tags, warnings)
}

/// `<define> ? <if_set...> [: <if_unset...>]`. Without a `:` every value
/// belongs to the if-set branch.
fn parse_conditional(name: &str, rest: &[String]) -> Option<TagDeclaration> {
    let (define, rest) = rest.split_first()?;
    if define == "?" || rest.first().map(String::as_str) != Some("?") || rest.len() < 2 {
        return None;
    }

    let mut if_set = Vec::new();
    let mut if_unset = Vec::new();
    let mut otherwise = false;
    for token in &rest[1..] {
        if token == ":" {
            otherwise = true;
        } else if otherwise {
            if_unset.push(token.clone());
        } else {
            if_set.push(token.clone());
        }
    }

    Some(TagDeclaration::Conditional {
        name: name.to_string(),
        define: define.clone(),
        if_set,
        if_unset,
    })
}

impl TagDeclaration {
    /// Values selected for a defines string. Conditional tags test for the
    /// literal `<define>=1` substring.
    pub fn resolve(&self, defines: &str) -> &[String] {
        match self {
            Self::Plain { values, .. } => values,
            Self::Conditional {
                define,
                if_set,
                if_unset,
                ..
            } => {
                if defines.contains(&format!("{}=1", define)) {
                    if_set
                } else {
                    if_unset
                }
            }
        }
    }
}

/// Tag names with render-state meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    BackfaceCulling,
    BlendMode,
    IterationMode,
    DepthWrite,
    DepthFunc,
    StencilMask,
    StencilFunc,
    StencilOp,
}

impl TagKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "backface_culling" => Some(Self::BackfaceCulling),
            "blend_mode" => Some(Self::BlendMode),
            "iteration_mode" => Some(Self::IterationMode),
            "depth_write" => Some(Self::DepthWrite),
            "depth_func" => Some(Self::DepthFunc),
            "stencil_mask" => Some(Self::StencilMask),
            "stencil_func" => Some(Self::StencilFunc),
            "stencil_op" => Some(Self::StencilOp),
            _ => None,
        }
    }
}

/// A tag resolved to a typed value. Unknown values never produce a setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TagSetting {
    Cull(CullMode),
    Blend(BlendMode),
    Iteration(IterationMode),
    DepthWrite(bool),
    DepthFunc(DepthFunction),
    StencilMask(u32),
    StencilFunc {
        func: Option<StencilFunction>,
        reference: Option<u32>,
    },
    StencilOp {
        fail_s: Option<StencilOp>,
        fail_z: Option<StencilOp>,
        pass_z: Option<StencilOp>,
    },
}

impl TagSetting {
    pub fn parse(name: &str, values: &[String]) -> Option<Self> {
        let kind = TagKind::from_name(name)?;
        let first = values.first()?.as_str();

        match kind {
            TagKind::BackfaceCulling => CullMode::from_keyword(first).map(Self::Cull),
            TagKind::BlendMode => BlendMode::from_keyword(first).map(Self::Blend),
            TagKind::IterationMode => IterationMode::from_keyword(first).map(Self::Iteration),
            TagKind::DepthWrite => match first {
                "on" => Some(Self::DepthWrite(true)),
                "off" => Some(Self::DepthWrite(false)),
                _ => None,
            },
            TagKind::DepthFunc => DepthFunction::from_keyword(first).map(Self::DepthFunc),
            TagKind::StencilMask => first.parse().ok().map(Self::StencilMask),
            TagKind::StencilFunc => Some(Self::StencilFunc {
                func: StencilFunction::from_keyword(first),
                reference: values.get(1).and_then(|v| v.parse().ok()),
            }),
            TagKind::StencilOp => {
                let ops: Vec<&str> = values
                    .iter()
                    .flat_map(|v| v.split(','))
                    .filter(|s| !s.is_empty())
                    .collect();
                let op = |i: usize| ops.get(i).and_then(|s| StencilOp::from_keyword(s));
                Some(Self::StencilOp {
                    fail_s: op(0),
                    fail_z: op(1),
                    pass_z: op(2),
                })
            }
        }
    }
}

impl RenderSettings {
    pub fn apply(&mut self, setting: &TagSetting) {
        match *setting {
            TagSetting::Cull(mode) => self.cull_mode = mode,
            TagSetting::Blend(mode) => self.blend_mode = mode,
            TagSetting::Iteration(mode) => self.iteration_mode = mode,
            TagSetting::DepthWrite(on) => self.depth_write = on,
            TagSetting::DepthFunc(func) => self.depth_function = func,
            TagSetting::StencilMask(mask) => self.stencil_mask = Some(mask),
            TagSetting::StencilFunc { func, reference } => {
                if func.is_some() {
                    self.stencil_function = func;
                }
                if reference.is_some() {
                    self.stencil_func_ref = reference;
                }
            }
            TagSetting::StencilOp {
                fail_s,
                fail_z,
                pass_z,
            } => {
                if fail_s.is_some() {
                    self.stencil_op_fail_s = fail_s;
                }
                if fail_z.is_some() {
                    self.stencil_op_fail_z = fail_z;
                }
                if pass_z.is_some() {
                    self.stencil_op_pass_z = pass_z;
                }
            }
        }
    }

    /// Apply a tag list in order for one defines string. Later tags win.
    pub fn apply_tags(&mut self, tags: &[TagDeclaration], defines: &str) {
        for tag in tags {
            if let Some(setting) = TagSetting::parse(tag.name(), tag.resolve(defines)) {
                self.apply(&setting);
            }
        }
    }

    /// Settings for a tag list starting from the defaults.
    pub fn from_tags(tags: &[TagDeclaration], defines: &str) -> Self {
        let mut settings = Self::default();
        settings.apply_tags(tags, defines);
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plain_and_conditional_tags() {
        let src = r#"
            backface_culling off
            blend_mode = Transparent ? alpha : replace
            // comment line
            custom_tag
            stencil_op keep,keep,replace
        "#;
        let (tags, warnings) = parse_tags(src);
        assert!(warnings.is_empty());
        assert_eq!(tags.len(), 3);
        assert_eq!(
            tags[0],
            TagDeclaration::Plain {
                name: "backface_culling".into(),
                values: strings(&["off"]),
            }
        );
        assert_eq!(
            tags[1],
            TagDeclaration::Conditional {
                name: "blend_mode".into(),
                define: "Transparent".into(),
                if_set: strings(&["alpha"]),
                if_unset: strings(&["replace"]),
            }
        );
    }

    #[test]
    fn test_malformed_conditional_is_dropped() {
        let (tags, warnings) = parse_tags("blend_mode = Transparent alpha replace\ndepth_write off");
        assert_eq!(tags.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], ParseWarning::MalformedTag { line: 0, .. }));

        let (tags, warnings) = parse_tags("blend_mode = Transparent ?");
        assert!(tags.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_conditional_without_else_branch() {
        let (tags, warnings) = parse_tags("blend_mode = Transparent ? alpha");
        assert!(warnings.is_empty());
        assert_eq!(
            tags,
            vec![TagDeclaration::Conditional {
                name: "blend_mode".into(),
                define: "Transparent".into(),
                if_set: strings(&["alpha"]),
                if_unset: Vec::new(),
            }]
        );
        assert_eq!(tags[0].resolve("Transparent=1"), strings(&["alpha"]).as_slice());
        assert!(tags[0].resolve("").is_empty());

        let settings = RenderSettings::from_tags(&tags, "Transparent=1");
        assert_eq!(settings.blend_mode, BlendMode::Alpha);
        let settings = RenderSettings::from_tags(&tags, "");
        assert_eq!(settings.blend_mode, BlendMode::Replace);
    }

    #[test]
    fn test_conditional_resolution_uses_literal_match() {
        let tag = TagDeclaration::Conditional {
            name: "blend_mode".into(),
            define: "Transparent".into(),
            if_set: strings(&["alpha"]),
            if_unset: strings(&["replace"]),
        };
        assert_eq!(tag.resolve("Transparent=1"), strings(&["alpha"]).as_slice());
        assert_eq!(tag.resolve("Transparent=0"), strings(&["replace"]).as_slice());
        assert_eq!(tag.resolve(""), strings(&["replace"]).as_slice());
    }

    #[test]
    fn test_unknown_names_and_values_are_ignored() {
        assert_eq!(TagSetting::parse("shadow_caster", &strings(&["on"])), None);
        assert_eq!(TagSetting::parse("blend_mode", &strings(&["screen"])), None);
        assert_eq!(TagSetting::parse("blend_mode", &[]), None);
    }

    #[test]
    fn test_stencil_op_accepts_commas_or_spaces() {
        let expected = TagSetting::StencilOp {
            fail_s: Some(StencilOp::Keep),
            fail_z: Some(StencilOp::Zero),
            pass_z: Some(StencilOp::Replace),
        };
        assert_eq!(
            TagSetting::parse("stencil_op", &strings(&["keep,zero,replace"])),
            Some(expected)
        );
        assert_eq!(
            TagSetting::parse("stencil_op", &strings(&["keep", "zero", "replace"])),
            Some(expected)
        );
    }

    #[test]
    fn test_settings_from_tags() {
        let (tags, _) = parse_tags(
            "depth_write off\ndepth_func always\nstencil_func equal 3\nstencil_mask 255\nblend_mode = FOO ? add : multiply",
        );
        let on = RenderSettings::from_tags(&tags, "FOO=1");
        let off = RenderSettings::from_tags(&tags, "FOO=0");

        assert!(!on.depth_write);
        assert_eq!(on.depth_function, DepthFunction::Always);
        assert_eq!(on.stencil_function, Some(StencilFunction::Equal));
        assert_eq!(on.stencil_func_ref, Some(3));
        assert_eq!(on.stencil_mask, Some(255));
        assert_eq!(on.blend_mode, BlendMode::Add);
        assert_eq!(off.blend_mode, BlendMode::Multiply);
        assert_eq!(on.cull_mode, off.cull_mode);
    }
}
