//! Line tokenizer shared by the `params` and `tags` parsers.

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Word(String),
    /// Text between double quotes; may contain spaces.
    Quoted(String),
    /// A `:` separator (only produced when colons are delimiters).
    Colon,
}

impl Token {
    pub(crate) fn text(&self) -> &str {
        match self {
            Token::Word(s) | Token::Quoted(s) => s,
            Token::Colon => ":",
        }
    }
}

/// Split one logical line into tokens. `//` starts a comment running to the
/// end of the line. With `colon_delimits`, `:` is its own token even when
/// glued to a word (`0.0:1.0`).
pub(crate) fn tokenize_line(line: &str, colon_delimits: bool) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut quoted: Option<String> = None;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quoted.as_mut() {
            if c == '"' {
                tokens.push(Token::Quoted(std::mem::take(q)));
                quoted = None;
            } else {
                q.push(c);
            }
            continue;
        }

        match c {
            '/' if chars.peek() == Some(&'/') => break,
            '"' => {
                flush(&mut word, &mut tokens);
                quoted = Some(String::new());
            }
            ':' if colon_delimits => {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Colon);
            }
            c if c.is_whitespace() => flush(&mut word, &mut tokens),
            c => word.push(c),
        }
    }

    // An unterminated quote still yields its text.
    if let Some(q) = quoted {
        tokens.push(Token::Quoted(q));
    }
    flush(&mut word, &mut tokens);
    tokens
}

fn flush(word: &mut String, tokens: &mut Vec<Token>) {
    if !word.is_empty() {
        tokens.push(Token::Word(std::mem::take(word)));
    }
}
