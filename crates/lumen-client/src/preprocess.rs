//! Minimal C-style preprocessor used by the headless backend.
//!
//! Resolves `#include "path"` / `#include <path>` and evaluates `#define`,
//! `#undef`, `#ifdef`, `#ifndef`, `#if`, `#elif`, `#else` and `#endif`.
//! Other directives (`#version`, `#pragma`, ...) pass through untouched.
//! Macros are not expanded in source lines.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const MAX_INCLUDE_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum PreprocessError {
    IncludeNotFound(String),
    IncludeTooDeep(String),
    UnbalancedConditional { line: usize },
    BadExpression { line: usize, text: String },
}

impl std::fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IncludeNotFound(path) => write!(f, "Include not found: \"{}\"", path),
            Self::IncludeTooDeep(path) => write!(f, "Include nesting too deep at \"{}\"", path),
            Self::UnbalancedConditional { line } => {
                write!(f, "Unbalanced conditional directive at line {}", line)
            }
            Self::BadExpression { line, text } => {
                write!(f, "Cannot evaluate '#if {}' at line {}", text, line)
            }
        }
    }
}

/// Where `#include` targets come from.
pub struct IncludeResolver<'a> {
    /// Sources registered in memory, keyed by include path.
    pub sources: &'a HashMap<String, String>,
    /// Directory of the including shader asset, searched first on disk.
    pub base_dir: Option<&'a Path>,
    pub include_dirs: &'a [PathBuf],
}

impl IncludeResolver<'_> {
    fn resolve(&self, path: &str) -> Option<String> {
        if let Some(src) = self.sources.get(path) {
            return Some(src.clone());
        }
        self.base_dir
            .into_iter()
            .chain(self.include_dirs.iter().map(PathBuf::as_path))
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())
            .and_then(|candidate| std::fs::read_to_string(candidate).ok())
    }
}

struct Frame {
    /// Lines in the current branch are emitted.
    active: bool,
    /// Some branch of this group has already been taken.
    taken: bool,
    parent_active: bool,
}

pub struct Preprocessor<'a> {
    resolver: IncludeResolver<'a>,
    defines: HashMap<String, String>,
    stack: Vec<Frame>,
    included: HashSet<String>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(resolver: IncludeResolver<'a>) -> Self {
        Self {
            resolver,
            defines: HashMap::new(),
            stack: Vec::new(),
            included: HashSet::new(),
        }
    }

    pub fn define(&mut self, name: &str, value: &str) {
        self.defines.insert(name.to_string(), value.to_string());
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defines.contains_key(name)
    }

    pub fn run(mut self, source: &str) -> Result<String, PreprocessError> {
        let mut out = String::with_capacity(source.len());
        self.process(source, &mut out, 0)?;
        if !self.stack.is_empty() {
            return Err(PreprocessError::UnbalancedConditional {
                line: source.lines().count(),
            });
        }
        Ok(out)
    }

    fn active(&self) -> bool {
        self.stack.last().map_or(true, |f| f.active)
    }

    fn process(&mut self, source: &str, out: &mut String, depth: usize) -> Result<(), PreprocessError> {
        for (index, line) in source.lines().enumerate() {
            let line_no = index + 1;
            let trimmed = line.trim();
            let Some(directive) = trimmed.strip_prefix('#') else {
                if self.active() {
                    out.push_str(line);
                    out.push('\n');
                }
                continue;
            };

            let directive = directive.trim_start();
            let (keyword, rest) = match directive.find(|c: char| !c.is_ascii_alphanumeric() && c != '_') {
                Some(i) => (&directive[..i], directive[i..].trim()),
                None => (directive, ""),
            };
            let rest = strip_line_comment(rest);

            match keyword {
                "include" => {
                    if !self.active() {
                        continue;
                    }
                    let Some(path) = parse_include(rest) else {
                        return Err(PreprocessError::IncludeNotFound(rest.to_string()));
                    };
                    if !self.included.insert(path.to_string()) {
                        continue;
                    }
                    if depth >= MAX_INCLUDE_DEPTH {
                        return Err(PreprocessError::IncludeTooDeep(path.to_string()));
                    }
                    let text = self
                        .resolver
                        .resolve(path)
                        .ok_or_else(|| PreprocessError::IncludeNotFound(path.to_string()))?;
                    self.process(&text, out, depth + 1)?;
                }
                "define" => {
                    if self.active() {
                        let mut parts = rest.splitn(2, char::is_whitespace);
                        let name = parts.next().unwrap_or_default();
                        let value = parts.next().map(str::trim).unwrap_or("");
                        if !name.is_empty() {
                            self.define(name, value);
                        }
                    }
                }
                "undef" => {
                    if self.active() {
                        self.defines.remove(rest);
                    }
                }
                "ifdef" | "ifndef" => {
                    let parent_active = self.active();
                    let defined = self.is_defined(rest);
                    let cond = if keyword == "ifdef" { defined } else { !defined };
                    self.stack.push(Frame {
                        active: parent_active && cond,
                        taken: cond,
                        parent_active,
                    });
                }
                "if" => {
                    let parent_active = self.active();
                    let cond = parent_active && self.evaluate(rest, line_no)?;
                    self.stack.push(Frame {
                        active: cond,
                        taken: cond,
                        parent_active,
                    });
                }
                "elif" => {
                    let (parent_active, taken) = match self.stack.last() {
                        Some(f) => (f.parent_active, f.taken),
                        None => return Err(PreprocessError::UnbalancedConditional { line: line_no }),
                    };
                    let cond = parent_active && !taken && self.evaluate(rest, line_no)?;
                    if let Some(frame) = self.stack.last_mut() {
                        frame.active = cond;
                        frame.taken |= cond;
                    }
                }
                "else" => {
                    let Some(frame) = self.stack.last_mut() else {
                        return Err(PreprocessError::UnbalancedConditional { line: line_no });
                    };
                    frame.active = frame.parent_active && !frame.taken;
                    frame.taken = true;
                }
                "endif" => {
                    if self.stack.pop().is_none() {
                        return Err(PreprocessError::UnbalancedConditional { line: line_no });
                    }
                }
                _ => {
                    if self.active() {
                        out.push_str(line);
                        out.push('\n');
                    }
                }
            }
        }
        Ok(())
    }

    fn evaluate(&self, expr: &str, line: usize) -> Result<bool, PreprocessError> {
        let bad = || PreprocessError::BadExpression {
            line,
            text: expr.to_string(),
        };
        let tokens = lex_expression(expr).ok_or_else(bad)?;
        let mut parser = ExprParser {
            tokens: &tokens,
            pos: 0,
            defines: &self.defines,
        };
        let value = parser.or().ok_or_else(bad)?;
        if parser.pos != tokens.len() {
            return Err(bad());
        }
        Ok(value != 0)
    }
}

fn strip_line_comment(s: &str) -> &str {
    match s.find("//") {
        Some(i) => s[..i].trim_end(),
        None => s,
    }
}

fn parse_include(rest: &str) -> Option<&str> {
    if let Some(inner) = rest.strip_prefix('"') {
        inner.strip_suffix('"')
    } else if let Some(inner) = rest.strip_prefix('<') {
        inner.strip_suffix('>')
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ExprToken {
    Num(i64),
    Ident(String),
    Op(&'static str),
    Open,
    Close,
}

fn lex_expression(expr: &str) -> Option<Vec<ExprToken>> {
    const OPS: [&str; 10] = ["&&", "||", "==", "!=", "<=", ">=", "<", ">", "!", "-"];
    let mut tokens = Vec::new();
    let bytes = expr.as_bytes();
    let mut i = 0;

    'outer: while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '(' {
            tokens.push(ExprToken::Open);
            i += 1;
            continue;
        }
        if c == ')' {
            tokens.push(ExprToken::Close);
            i += 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i] as char).is_ascii_alphanumeric() {
                i += 1;
            }
            let digits = expr[start..i].trim_end_matches(|c| c == 'u' || c == 'U' || c == 'l' || c == 'L');
            tokens.push(ExprToken::Num(digits.parse().ok()?));
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len() && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(ExprToken::Ident(expr[start..i].to_string()));
            continue;
        }
        for op in OPS {
            if expr[i..].starts_with(op) {
                tokens.push(ExprToken::Op(op));
                i += op.len();
                continue 'outer;
            }
        }
        return None;
    }
    Some(tokens)
}

/// Recursive descent over `||`, `&&`, equality, relational and unary levels.
struct ExprParser<'t> {
    tokens: &'t [ExprToken],
    pos: usize,
    defines: &'t HashMap<String, String>,
}

impl ExprParser<'_> {
    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(ExprToken::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn or(&mut self) -> Option<i64> {
        let mut lhs = self.and()?;
        while self.peek_op() == Some("||") {
            self.pos += 1;
            let rhs = self.and()?;
            lhs = i64::from(lhs != 0 || rhs != 0);
        }
        Some(lhs)
    }

    fn and(&mut self) -> Option<i64> {
        let mut lhs = self.equality()?;
        while self.peek_op() == Some("&&") {
            self.pos += 1;
            let rhs = self.equality()?;
            lhs = i64::from(lhs != 0 && rhs != 0);
        }
        Some(lhs)
    }

    fn equality(&mut self) -> Option<i64> {
        let mut lhs = self.relational()?;
        while let Some(op @ ("==" | "!=")) = self.peek_op() {
            self.pos += 1;
            let rhs = self.relational()?;
            lhs = i64::from(if op == "==" { lhs == rhs } else { lhs != rhs });
        }
        Some(lhs)
    }

    fn relational(&mut self) -> Option<i64> {
        let mut lhs = self.unary()?;
        while let Some(op @ ("<" | ">" | "<=" | ">=")) = self.peek_op() {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = i64::from(match op {
                "<" => lhs < rhs,
                ">" => lhs > rhs,
                "<=" => lhs <= rhs,
                _ => lhs >= rhs,
            });
        }
        Some(lhs)
    }

    fn unary(&mut self) -> Option<i64> {
        match self.peek_op() {
            Some("!") => {
                self.pos += 1;
                Some(i64::from(self.unary()? == 0))
            }
            Some("-") => {
                self.pos += 1;
                Some(self.unary()?.wrapping_neg())
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Option<i64> {
        let token = self.tokens.get(self.pos)?.clone();
        self.pos += 1;
        match token {
            ExprToken::Num(n) => Some(n),
            ExprToken::Open => {
                let v = self.or()?;
                if self.tokens.get(self.pos) != Some(&ExprToken::Close) {
                    return None;
                }
                self.pos += 1;
                Some(v)
            }
            ExprToken::Ident(name) if name == "defined" => {
                let parenthesized = self.tokens.get(self.pos) == Some(&ExprToken::Open);
                if parenthesized {
                    self.pos += 1;
                }
                let Some(ExprToken::Ident(target)) = self.tokens.get(self.pos) else {
                    return None;
                };
                let defined = self.defines.contains_key(target);
                self.pos += 1;
                if parenthesized {
                    if self.tokens.get(self.pos) != Some(&ExprToken::Close) {
                        return None;
                    }
                    self.pos += 1;
                }
                Some(i64::from(defined))
            }
            // Undefined names evaluate to 0, defined-but-empty ones to 1.
            ExprToken::Ident(name) => Some(match self.defines.get(&name) {
                None => 0,
                Some(v) if v.is_empty() => 1,
                Some(v) => v.parse().unwrap_or(0),
            }),
            ExprToken::Op(_) | ExprToken::Close => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str, defines: &[(&str, &str)], sources: &HashMap<String, String>) -> Result<String, PreprocessError> {
        let mut pp = Preprocessor::new(IncludeResolver {
            sources,
            base_dir: None,
            include_dirs: &[],
        });
        for (k, v) in defines {
            pp.define(k, v);
        }
        pp.run(source)
    }

    #[test]
    fn test_ifdef_else() {
        let src = "#ifdef FOG\nfog();\n#else\nnofog();\n#endif\n";
        let none = HashMap::new();
        assert_eq!(run(src, &[("FOG", "1")], &none).unwrap(), "fog();\n");
        assert_eq!(run(src, &[], &none).unwrap(), "nofog();\n");
    }

    #[test]
    fn test_if_elif_expressions() {
        let src = "#if LIGHTS >= 4 && !defined(LOW)\nmany();\n#elif LIGHTS == 1 || defined(FORCE)\none();\n#else\nnone();\n#endif\n";
        let none = HashMap::new();
        assert_eq!(run(src, &[("LIGHTS", "8")], &none).unwrap(), "many();\n");
        assert_eq!(run(src, &[("LIGHTS", "8"), ("LOW", "1")], &none).unwrap(), "none();\n");
        assert_eq!(run(src, &[("LIGHTS", "1")], &none).unwrap(), "one();\n");
        assert_eq!(run(src, &[("FORCE", "")], &none).unwrap(), "one();\n");
    }

    #[test]
    fn test_negating_smallest_integer() {
        let src = "#if -FLOOR < 0\nwrapped();\n#else\nflipped();\n#endif\n";
        let defines = [("FLOOR", "-9223372036854775808")];
        assert_eq!(run(src, &defines, &HashMap::new()).unwrap(), "wrapped();\n");
    }

    #[test]
    fn test_nested_inactive_groups() {
        let src = "#ifdef A\n#ifdef B\nab();\n#else\na();\n#endif\n#else\n#if 1\nnot_a();\n#endif\n#endif\n";
        let none = HashMap::new();
        assert_eq!(run(src, &[("A", "1")], &none).unwrap(), "a();\n");
        assert_eq!(run(src, &[], &none).unwrap(), "not_a();\n");
    }

    #[test]
    fn test_define_and_undef_inside_source() {
        let src = "#define SKIN 1\n#if SKIN\nskin();\n#endif\n#undef SKIN\n#ifndef SKIN\nrigid();\n#endif\n";
        assert_eq!(run(src, &[], &HashMap::new()).unwrap(), "skin();\nrigid();\n");
    }

    #[test]
    fn test_include_and_double_inclusion() {
        let mut sources = HashMap::new();
        sources.insert("common.sh".to_string(), "float saturate_(float x);".to_string());
        let src = "#include \"common.sh\"\n#include <common.sh>\nvoid main() {}\n";
        let out = run(src, &[], &sources).unwrap();
        assert_eq!(out, "float saturate_(float x);\nvoid main() {}\n");
    }

    #[test]
    fn test_include_in_inactive_branch_is_not_resolved() {
        let src = "#ifdef NEVER\n#include \"missing.sh\"\n#endif\nok\n";
        assert_eq!(run(src, &[], &HashMap::new()).unwrap(), "ok\n");
        assert_eq!(
            run("#include \"missing.sh\"\n", &[], &HashMap::new()),
            Err(PreprocessError::IncludeNotFound("missing.sh".into()))
        );
    }

    #[test]
    fn test_unbalanced_conditionals() {
        let none = HashMap::new();
        assert!(matches!(
            run("#ifdef A\nx\n", &[], &none),
            Err(PreprocessError::UnbalancedConditional { .. })
        ));
        assert!(matches!(
            run("#endif\n", &[], &none),
            Err(PreprocessError::UnbalancedConditional { line: 1 })
        ));
    }

    #[test]
    fn test_passthrough_directives() {
        let out = run("#version 330\n#pragma optimize(on)\n", &[], &HashMap::new()).unwrap();
        assert_eq!(out, "#version 330\n#pragma optimize(on)\n");
    }

    #[test]
    fn test_bad_expression() {
        assert!(matches!(
            run("#if (A\n#endif\n", &[], &HashMap::new()),
            Err(PreprocessError::BadExpression { line: 1, .. })
        ));
    }
}
