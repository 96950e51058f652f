/// Token stream for the expression language (`spec.md` §4.5). Hand-rolled
/// since route-configured expressions arrive as raw source text, unlike
/// `acteon-rules` which only ever evaluates pre-built `Expr` trees.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    QuestionQuestion,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    AmpAmp,
    PipePipe,
    Plus,
    Minus,
    Star,
    Slash,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError(pub String);

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lex error: {}", self.0)
    }
}

pub fn lex(src: &str) -> Result<Vec<Token>, LexError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '?' => {
                if chars.get(i + 1) == Some(&'?') {
                    tokens.push(Token::QuestionQuestion);
                    i += 2;
                } else {
                    return Err(LexError("unexpected '?'".into()));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(LexError("unexpected '='".into()));
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Lte);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Gte);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::AmpAmp);
                    i += 2;
                } else {
                    return Err(LexError("unexpected '&'".into()));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::PipePipe);
                    i += 2;
                } else {
                    return Err(LexError("unexpected '|'".into()));
                }
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    let ch = chars[i];
                    if ch == '\\' && i + 1 < chars.len() {
                        let esc = chars[i + 1];
                        s.push(match esc {
                            'n' => '\n',
                            't' => '\t',
                            '\\' => '\\',
                            other if other == quote => quote,
                            other => other,
                        });
                        i += 2;
                        continue;
                    }
                    if ch == quote {
                        closed = true;
                        i += 1;
                        break;
                    }
                    s.push(ch);
                    i += 1;
                }
                if !closed {
                    return Err(LexError("unterminated string literal".into()));
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                let mut is_float = false;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    if chars[i] == '.' {
                        if is_float || chars.get(i + 1).map(|c| c.is_ascii_digit()) != Some(true) {
                            break;
                        }
                        is_float = true;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    tokens.push(Token::Float(text.parse().map_err(|_| LexError(format!("bad number '{text}'")))?));
                } else {
                    tokens.push(Token::Int(text.parse().map_err(|_| LexError(format!("bad number '{text}'")))?));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(text));
            }
            other => return Err(LexError(format!("unexpected character '{other}'"))),
        }
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_field_access_chain() {
        let tokens = lex("body.usage.tokens").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("body".into()),
                Token::Dot,
                Token::Ident("usage".into()),
                Token::Dot,
                Token::Ident("tokens".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn lexes_null_coalescing_operator() {
        let tokens = lex("x ?? 1").unwrap();
        assert_eq!(tokens, vec![Token::Ident("x".into()), Token::QuestionQuestion, Token::Int(1), Token::Eof]);
    }

    #[test]
    fn lexes_string_with_escapes() {
        let tokens = lex(r#"'a\'b'"#).unwrap();
        assert_eq!(tokens, vec![Token::Str("a'b".into()), Token::Eof]);
    }

    #[test]
    fn lexes_function_call_with_args() {
        let tokens = lex(r#"json(sseLastData(allData)).usage.tokens"#).unwrap();
        assert_eq!(tokens[0], Token::Ident("json".into()));
        assert_eq!(tokens[1], Token::LParen);
        assert_eq!(tokens[2], Token::Ident("sseLastData".into()));
    }

    #[test]
    fn single_question_mark_is_an_error() {
        assert!(lex("x ? 1").is_err());
    }

    #[test]
    fn lexes_float_and_int_distinctly() {
        let tokens = lex("1 1.5").unwrap();
        assert_eq!(tokens[0], Token::Int(1));
        assert_eq!(tokens[1], Token::Float(1.5));
    }
}
