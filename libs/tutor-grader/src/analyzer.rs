/// Source Analyzer - Entry Point Resolution
///
/// Finds the name of the function a submission wants graded. Submissions are
/// single-function snippets, so a light lexer is enough: it drops comments,
/// string/template/regex literals and tracks brace depth, then a fixed list
/// of token patterns is tried in priority order:
///
/// 1. `function <name> (`
/// 2. `const <name> = function` / `const <name> = (`
/// 3. `let|const <name> = function`
/// 4. `let|const <name> = (`
///
/// Declarations at the top level win over nested ones; nested matches are
/// only considered when nothing matches at the top level. This is not a
/// parser and will not see through obfuscated or multi-statement code.

use crate::error::{GradeError, GradeResult};

/// How much of the source is echoed back when nothing matches
const SNIPPET_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Ident(&'a str),
    Punct(char),
    Literal,
}

#[derive(Debug, Clone, Copy)]
struct Lexeme<'a> {
    token: Token<'a>,
    depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Brace,
    TemplateExpr,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Keyword(&'static [&'static str]),
    Name,
    Punct(char),
    AnyOf(&'static [Step]),
}

const PATTERNS: [&[Step]; 4] = [
    &[Step::Keyword(&["function"]), Step::Name, Step::Punct('(')],
    &[
        Step::Keyword(&["const"]),
        Step::Name,
        Step::Punct('='),
        Step::AnyOf(&[Step::Keyword(&["function"]), Step::Punct('(')]),
    ],
    &[
        Step::Keyword(&["let", "const"]),
        Step::Name,
        Step::Punct('='),
        Step::Keyword(&["function"]),
    ],
    &[
        Step::Keyword(&["let", "const"]),
        Step::Name,
        Step::Punct('='),
        Step::Punct('('),
    ],
];

const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
    "do", "else", "export", "extends", "finally", "for", "function", "if", "import", "in",
    "instanceof", "let", "new", "return", "super", "switch", "this", "throw", "try", "typeof",
    "var", "void", "while", "with", "yield",
];

/// Words after which a `/` starts a regular expression rather than a division
const EXPRESSION_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case",
    "do", "else", "yield", "await",
];

/// Resolve the callable name a submission exposes.
///
/// Deterministic: the same text always yields the same name.
pub fn resolve_entry_point_name(source: &str) -> GradeResult<String> {
    let lexemes = tokenize(source);

    for top_level_only in [true, false] {
        for pattern in PATTERNS {
            if let Some(name) = find_pattern(&lexemes, pattern, top_level_only) {
                return Ok(name.to_string());
            }
        }
    }

    Err(GradeError::NameResolution {
        snippet: snippet(source),
    })
}

fn snippet(source: &str) -> String {
    let head: String = source.chars().take(SNIPPET_CHARS).collect();
    if source.chars().count() > SNIPPET_CHARS {
        format!("{}...", head)
    } else {
        head
    }
}

fn find_pattern<'a>(lexemes: &[Lexeme<'a>], pattern: &[Step], top_level_only: bool) -> Option<&'a str> {
    if lexemes.len() < pattern.len() {
        return None;
    }

    lexemes.windows(pattern.len()).find_map(|window| {
        if top_level_only && window[0].depth != 0 {
            return None;
        }
        let matched = pattern
            .iter()
            .zip(window)
            .all(|(step, lexeme)| step_matches(step, lexeme));
        if !matched {
            return None;
        }
        pattern
            .iter()
            .zip(window)
            .find_map(|(step, lexeme)| match (step, lexeme.token) {
                (Step::Name, Token::Ident(name)) => Some(name),
                _ => None,
            })
    })
}

fn step_matches(step: &Step, lexeme: &Lexeme<'_>) -> bool {
    match (step, lexeme.token) {
        (Step::Keyword(words), Token::Ident(word)) => words.contains(&word),
        (Step::Name, Token::Ident(word)) => !RESERVED.contains(&word),
        (Step::Punct(expected), Token::Punct(found)) => *expected == found,
        (Step::AnyOf(steps), _) => steps.iter().any(|s| step_matches(s, lexeme)),
        _ => false,
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn slash_starts_regex(previous: Option<&Lexeme<'_>>) -> bool {
    match previous.map(|l| l.token) {
        None => true,
        Some(Token::Literal) => false,
        Some(Token::Ident(word)) => EXPRESSION_KEYWORDS.contains(&word),
        Some(Token::Punct(c)) => !matches!(c, ')' | ']' | '}'),
    }
}

fn tokenize(source: &str) -> Vec<Lexeme<'_>> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let char_at = |i: usize| chars.get(i).map(|&(_, c)| c);
    let offset_at = |i: usize| chars.get(i).map(|&(p, _)| p).unwrap_or(source.len());

    let mut lexemes: Vec<Lexeme<'_>> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut i = 0;

    while let Some(c) = char_at(i) {
        let depth = stack.len();

        if c.is_whitespace() {
            i += 1;
        } else if c == '/' && char_at(i + 1) == Some('/') {
            while char_at(i).is_some_and(|c| c != '\n') {
                i += 1;
            }
        } else if c == '/' && char_at(i + 1) == Some('*') {
            i += 2;
            while char_at(i).is_some() && !(char_at(i) == Some('*') && char_at(i + 1) == Some('/')) {
                i += 1;
            }
            i += 2;
        } else if c == '/' && slash_starts_regex(lexemes.last()) {
            i = skip_regex(&chars, i + 1);
            lexemes.push(Lexeme { token: Token::Literal, depth });
        } else if c == '"' || c == '\'' {
            i = skip_string(&chars, i + 1, c);
            lexemes.push(Lexeme { token: Token::Literal, depth });
        } else if c == '`' {
            let (next, opened) = skip_template(&chars, i + 1);
            if opened {
                stack.push(Frame::TemplateExpr);
            }
            lexemes.push(Lexeme { token: Token::Literal, depth });
            i = next;
        } else if c == '{' {
            lexemes.push(Lexeme { token: Token::Punct('{'), depth });
            stack.push(Frame::Brace);
            i += 1;
        } else if c == '}' {
            match stack.pop() {
                Some(Frame::TemplateExpr) => {
                    let (next, opened) = skip_template(&chars, i + 1);
                    if opened {
                        stack.push(Frame::TemplateExpr);
                    }
                    i = next;
                }
                _ => {
                    lexemes.push(Lexeme {
                        token: Token::Punct('}'),
                        depth: stack.len(),
                    });
                    i += 1;
                }
            }
        } else if c.is_ascii_digit() || (c == '.' && char_at(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            while char_at(i).is_some_and(|c| c.is_alphanumeric() || c == '.' || c == '_') {
                i += 1;
            }
            lexemes.push(Lexeme { token: Token::Literal, depth });
        } else if is_ident_start(c) {
            let start = i;
            while char_at(i).is_some_and(is_ident_continue) {
                i += 1;
            }
            lexemes.push(Lexeme {
                token: Token::Ident(&source[offset_at(start)..offset_at(i)]),
                depth,
            });
        } else {
            lexemes.push(Lexeme { token: Token::Punct(c), depth });
            i += 1;
        }
    }

    lexemes
}

fn skip_string(chars: &[(usize, char)], mut i: usize, quote: char) -> usize {
    while let Some(&(_, c)) = chars.get(i) {
        match c {
            '\\' => i += 2,
            '\n' => return i + 1,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    i
}

/// Returns the index after the literal and whether it stopped at `${`
fn skip_template(chars: &[(usize, char)], mut i: usize) -> (usize, bool) {
    while let Some(&(_, c)) = chars.get(i) {
        match c {
            '\\' => i += 2,
            '`' => return (i + 1, false),
            '$' if chars.get(i + 1).map(|&(_, c)| c) == Some('{') => return (i + 2, true),
            _ => i += 1,
        }
    }
    (i, false)
}

fn skip_regex(chars: &[(usize, char)], mut i: usize) -> usize {
    let mut in_class = false;
    while let Some(&(_, c)) = chars.get(i) {
        match c {
            '\\' => i += 2,
            '[' => {
                in_class = true;
                i += 1;
            }
            ']' => {
                in_class = false;
                i += 1;
            }
            '/' if !in_class => {
                i += 1;
                while chars.get(i).is_some_and(|&(_, c)| is_ident_continue(c)) {
                    i += 1;
                }
                return i;
            }
            '\n' => return i,
            _ => i += 1,
        }
    }
    i
}
