//! Character-level state machine splitting shader text into its sections.
//!
//! Keywords are only recognised outside raw sections, either at top level
//! (`name`, `render_mode`, `params`) or directly inside a pass block
//! (`tags`, `varying`, `vertex`, `fragment`). The character that ends a
//! keyword is re-dispatched in the new state, so `vertex{` opens a section.
//! Any `{` at top level opens a pass; the `pass` keyword itself is optional.

use tracing::debug;

use crate::params::parse_params;
use crate::tags::parse_tags;
use crate::types::{ParseWarning, ParsedShader, PassSource, RenderMode, ShaderSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Tags,
    Varying,
    Vertex,
    Fragment,
}

impl Section {
    fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "tags" => Some(Self::Tags),
            "varying" => Some(Self::Varying),
            "vertex" => Some(Self::Vertex),
            "fragment" => Some(Self::Fragment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Reading keywords at pass depth 0 or 1.
    TopLevel,
    NameLine,
    ModeLine,
    /// Saw `params`, waiting for its `{`.
    ParamsOpen,
    Params,
    /// Saw a section keyword, waiting for its `{`.
    SectionOpen(Section),
    Section(Section),
    /// `//` comment outside raw sections.
    Comment,
}

/// Raw section text collected for the pass currently open.
#[derive(Default)]
struct PassText {
    tags: String,
    varying: String,
    vertex: String,
    fragment: String,
}

pub struct Scanner {
    state: ScanState,
    last: Option<char>,
    word: String,
    buffer: String,
    /// Brace depth of pass blocks.
    depth: usize,
    /// Brace depth inside the open raw section.
    section_depth: usize,
    section_comment: bool,
    params_comment: bool,
    params_quote: bool,
    pass: PassText,
    name: String,
    render_mode: RenderMode,
    params_text: String,
    passes: Vec<PassSource>,
    warnings: Vec<ParseWarning>,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::TopLevel,
            last: None,
            word: String::new(),
            buffer: String::new(),
            depth: 0,
            section_depth: 0,
            section_comment: false,
            params_comment: false,
            params_quote: false,
            pass: PassText::default(),
            name: String::new(),
            render_mode: RenderMode::Forward,
            params_text: String::new(),
            passes: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Pass block nesting depth; 0 at top level.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn feed(&mut self, c: char) {
        self.state = self.dispatch(self.state, c);
        self.last = Some(c);
    }

    pub fn feed_str(&mut self, text: &str) {
        for c in text.chars() {
            self.feed(c);
        }
    }

    fn dispatch(&mut self, state: ScanState, c: char) -> ScanState {
        match state {
            ScanState::TopLevel => self.top_level(c),
            ScanState::NameLine => self.name_line(c),
            ScanState::ModeLine => self.mode_line(c),
            ScanState::ParamsOpen => self.params_open(c),
            ScanState::Params => self.params(c),
            ScanState::SectionOpen(section) => self.section_open(section, c),
            ScanState::Section(section) => self.section(section, c),
            ScanState::Comment => self.comment(c),
        }
    }

    fn top_level(&mut self, c: char) -> ScanState {
        if is_ident(c) {
            self.word.push(c);
            return ScanState::TopLevel;
        }

        if !self.word.is_empty() {
            let word = std::mem::take(&mut self.word);
            let next = self.keyword(&word);
            if next != ScanState::TopLevel {
                return self.dispatch(next, c);
            }
        }

        match c {
            '/' if self.last == Some('/') => ScanState::Comment,
            '{' => {
                self.depth += 1;
                ScanState::TopLevel
            }
            '}' => {
                if self.depth > 0 {
                    self.depth -= 1;
                    if self.depth == 0 {
                        self.close_pass();
                    }
                }
                ScanState::TopLevel
            }
            _ => ScanState::TopLevel,
        }
    }

    fn keyword(&mut self, word: &str) -> ScanState {
        match (self.depth, word) {
            (0, "name") => {
                self.buffer.clear();
                ScanState::NameLine
            }
            (0, "render_mode") => {
                self.buffer.clear();
                ScanState::ModeLine
            }
            (0, "params") => ScanState::ParamsOpen,
            (1, w) => match Section::from_keyword(w) {
                Some(section) => ScanState::SectionOpen(section),
                None => ScanState::TopLevel,
            },
            _ => ScanState::TopLevel,
        }
    }

    fn name_line(&mut self, c: char) -> ScanState {
        if c == '\n' {
            self.commit_name();
            return ScanState::TopLevel;
        }
        self.buffer.push(c);
        ScanState::NameLine
    }

    fn mode_line(&mut self, c: char) -> ScanState {
        if c == '\n' {
            self.commit_mode();
            return ScanState::TopLevel;
        }
        self.buffer.push(c);
        ScanState::ModeLine
    }

    fn params_open(&mut self, c: char) -> ScanState {
        match c {
            '{' => {
                self.params_comment = false;
                self.params_quote = false;
                ScanState::Params
            }
            c if c.is_whitespace() => ScanState::ParamsOpen,
            c => self.top_level(c),
        }
    }

    /// Inner braces are dropped; the first `}` outside a comment or a
    /// quoted name closes the block. Quotes end at the line break.
    fn params(&mut self, c: char) -> ScanState {
        if self.params_comment || self.params_quote {
            if c == '\n' {
                self.params_comment = false;
                self.params_quote = false;
            } else if c == '"' && self.params_quote {
                self.params_quote = false;
            }
            self.params_text.push(c);
            return ScanState::Params;
        }

        match c {
            '/' if self.last == Some('/') => {
                self.params_comment = true;
                self.params_text.push(c);
                ScanState::Params
            }
            '"' => {
                self.params_quote = true;
                self.params_text.push(c);
                ScanState::Params
            }
            '}' => {
                self.params_text.push('\n');
                ScanState::TopLevel
            }
            '{' => ScanState::Params,
            c => {
                self.params_text.push(c);
                ScanState::Params
            }
        }
    }

    fn section_open(&mut self, section: Section, c: char) -> ScanState {
        match c {
            '{' => {
                self.buffer.clear();
                self.section_depth = 1;
                self.section_comment = false;
                ScanState::Section(section)
            }
            c if c.is_whitespace() => ScanState::SectionOpen(section),
            c => self.top_level(c),
        }
    }

    fn section(&mut self, section: Section, c: char) -> ScanState {
        if self.section_comment {
            if c == '\n' {
                self.section_comment = false;
            }
            self.buffer.push(c);
            return ScanState::Section(section);
        }

        match c {
            '/' if self.last == Some('/') => self.section_comment = true,
            '{' => self.section_depth += 1,
            '}' => {
                self.section_depth -= 1;
                if self.section_depth == 0 {
                    let text = std::mem::take(&mut self.buffer);
                    match section {
                        Section::Tags => self.pass.tags = text,
                        Section::Varying => self.pass.varying = text,
                        Section::Vertex => self.pass.vertex = text,
                        Section::Fragment => self.pass.fragment = text,
                    }
                    return ScanState::TopLevel;
                }
            }
            _ => {}
        }
        self.buffer.push(c);
        ScanState::Section(section)
    }

    fn comment(&mut self, c: char) -> ScanState {
        if c == '\n' {
            ScanState::TopLevel
        } else {
            ScanState::Comment
        }
    }

    fn commit_name(&mut self) {
        let line = std::mem::take(&mut self.buffer);
        self.name = match line.split_once('"') {
            Some((_, rest)) => rest.split('"').next().unwrap_or_default().to_string(),
            None => line.trim().to_string(),
        };
    }

    fn commit_mode(&mut self) {
        let line = std::mem::take(&mut self.buffer);
        let mode = line.trim();
        self.render_mode = match RenderMode::from_keyword(mode) {
            Some(m) => m,
            None => {
                self.warnings.push(ParseWarning::UnknownRenderMode(mode.to_string()));
                RenderMode::Forward
            }
        };
    }

    fn close_pass(&mut self) {
        let text = std::mem::take(&mut self.pass);
        let index = self.passes.len();
        let (tags, tag_warnings) = parse_tags(&text.tags);
        self.warnings.extend(tag_warnings);

        if text.vertex.trim().is_empty() && text.fragment.trim().is_empty() {
            self.warnings.push(ParseWarning::MissingProgram { pass: index });
        }

        debug!("Scanned pass {} ({} tags)", index, tags.len());
        self.passes.push(PassSource {
            varying: text.varying,
            vertex: text.vertex,
            fragment: text.fragment,
            tags,
        });
    }

    /// End of input: flush whatever is open and build the IR.
    pub fn finish(mut self) -> ParsedShader {
        if !self.word.is_empty() {
            let word = std::mem::take(&mut self.word);
            self.state = self.keyword(&word);
        }

        match self.state {
            ScanState::NameLine => self.commit_name(),
            ScanState::ModeLine => self.commit_mode(),
            _ => {}
        }

        if self.depth > 0 {
            let pass = self.passes.len();
            self.warnings.push(ParseWarning::Unbalanced { pass });
            self.passes.push(PassSource::default());
        }

        let (uniforms, param_warnings) = parse_params(&self.params_text);
        self.warnings.extend(param_warnings);

        if self.passes.is_empty() {
            self.warnings.push(ParseWarning::NoPasses);
        }

        ParsedShader {
            source: ShaderSource {
                name: self.name,
                render_mode: self.render_mode,
                uniforms,
                passes: self.passes,
            },
            warnings: self.warnings,
        }
    }
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Parse complete shader text.
pub fn parse_shader(text: &str) -> ParsedShader {
    let mut scanner = Scanner::new();
    scanner.feed_str(text);
    scanner.finish()
}
