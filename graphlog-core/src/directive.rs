//! Block-directive config syntax.
//!
//! ```text
//! graphite {
//!     server 127.0.0.1
//!     port 2003
//!     path "downloads{{ .DirName }}.{{ .FileName }}.count"
//!     methods GET HEAD
//! }
//! ```
//!
//! Tokens are separated by whitespace. Double quotes group a token and accept
//! `\"` and `\\` escapes. `#` at the start of a token comments out the rest of
//! the line. Inside a block every line is one directive: its first token is
//! the name, the remaining tokens on that line are its arguments.

use crate::error::GraphlogError;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    line: usize,
    quoted: bool,
}

impl Token {
    fn is_open(&self) -> bool {
        !self.quoted && self.text == "{"
    }

    fn is_close(&self) -> bool {
        !self.quoted && self.text == "}"
    }
}

/// A named block, e.g. `graphite { ... }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub name: String,
    /// Arguments after the name on the opening line.
    pub args: Vec<String>,
    pub line: usize,
    pub directives: Vec<Directive>,
}

/// One `name arg...` line inside a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub args: Vec<String>,
    pub line: usize,
}

impl Directive {
    /// First argument, or a config error when there is none.
    pub fn single_arg(&self) -> Result<&str, GraphlogError> {
        self.args.first().map(String::as_str).ok_or_else(|| {
            GraphlogError::Config(format!(
                "line {}: directive {} expects an argument",
                self.line, self.name
            ))
        })
    }
}

/// Parse every top-level block in `src`.
pub fn parse_blocks(src: &str) -> Result<Vec<Block>, GraphlogError> {
    let tokens = tokenize(src)?;
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let head = &tokens[i];
        if head.is_open() || head.is_close() {
            return Err(GraphlogError::Config(format!(
                "line {}: unexpected '{}'",
                head.line, head.text
            )));
        }

        let mut block = Block {
            name: head.text.clone(),
            args: Vec::new(),
            line: head.line,
            directives: Vec::new(),
        };
        i += 1;

        while i < tokens.len() && tokens[i].line == block.line && !tokens[i].is_open() {
            block.args.push(tokens[i].text.clone());
            i += 1;
        }

        if i < tokens.len() && tokens[i].is_open() {
            i = parse_body(&tokens, i + 1, &mut block)?;
        }
        blocks.push(block);
    }

    Ok(blocks)
}

/// Parse directives up to the closing brace; returns the index after it.
fn parse_body(tokens: &[Token], mut i: usize, block: &mut Block) -> Result<usize, GraphlogError> {
    while i < tokens.len() {
        let head = &tokens[i];
        if head.is_close() {
            return Ok(i + 1);
        }
        if head.is_open() {
            return Err(GraphlogError::Config(format!(
                "line {}: nested blocks are not supported",
                head.line
            )));
        }

        let mut directive = Directive {
            name: head.text.clone(),
            args: Vec::new(),
            line: head.line,
        };
        i += 1;
        while i < tokens.len()
            && tokens[i].line == directive.line
            && !tokens[i].is_close()
            && !tokens[i].is_open()
        {
            directive.args.push(tokens[i].text.clone());
            i += 1;
        }
        block.directives.push(directive);
    }

    Err(GraphlogError::Config(format!(
        "line {}: block {} is missing its closing '}}'",
        block.line, block.name
    )))
}

fn tokenize(src: &str) -> Result<Vec<Token>, GraphlogError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        if c == '\n' {
            line += 1;
            chars.next();
            continue;
        }
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '#' {
            while let Some(&c) = chars.peek() {
                if c == '\n' {
                    break;
                }
                chars.next();
            }
            continue;
        }

        let start_line = line;
        if c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => match chars.peek() {
                        Some(&next) if next == '"' || next == '\\' => {
                            text.push(next);
                            chars.next();
                        }
                        _ => text.push('\\'),
                    },
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\n' => {
                        line += 1;
                        text.push('\n');
                    }
                    other => text.push(other),
                }
            }
            if !closed {
                return Err(GraphlogError::Config(format!(
                    "line {start_line}: unterminated quoted string"
                )));
            }
            tokens.push(Token {
                text,
                line: start_line,
                quoted: true,
            });
        } else {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                text.push(c);
                chars.next();
            }
            tokens.push(Token {
                text,
                line: start_line,
                quoted: false,
            });
        }
    }

    Ok(tokens)
}
