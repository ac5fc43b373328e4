//! Preprocessing tokens.
//!
//! Macro expansion only needs a coarse view of the source: identifiers (candidates for
//! expansion), literals (never touched), parentheses and commas (argument splitting), and
//! whitespace. Concatenating the text of all tokens of a line reproduces the line exactly.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpTokenKind {
    Identifier,
    Number,
    Literal,
    Punct,
    Space,
    Newline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpToken {
    pub kind: PpTokenKind,
    pub text: String,
}

impl PpToken {
    pub fn new(kind: PpTokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn is_whitespace(&self) -> bool {
        matches!(self.kind, PpTokenKind::Space | PpTokenKind::Newline)
    }

    pub fn is_punct(&self, punct: &str) -> bool {
        self.kind == PpTokenKind::Punct && self.text == punct
    }
}

/// Split text into preprocessing tokens.
pub fn tokenize(text: &str) -> Vec<PpToken> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let start = pos;
        let ch = bytes[pos];
        let kind = match ch {
            b'\n' => {
                pos += 1;
                PpTokenKind::Newline
            }
            b' ' | b'\t' | b'\r' | b'\x0b' | b'\x0c' => {
                while pos < bytes.len() && matches!(bytes[pos], b' ' | b'\t' | b'\r' | b'\x0b' | b'\x0c')
                {
                    pos += 1;
                }
                PpTokenKind::Space
            }
            c if c == b'_' || c.is_ascii_alphabetic() => {
                while pos < bytes.len() && (bytes[pos] == b'_' || bytes[pos].is_ascii_alphanumeric()) {
                    pos += 1;
                }
                PpTokenKind::Identifier
            }
            c if c.is_ascii_digit()
                || (c == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)) =>
            {
                pos += 1;
                while pos < bytes.len() {
                    let c = bytes[pos];
                    let exponent = matches!(c, b'+' | b'-')
                        && matches!(bytes[pos - 1], b'e' | b'E' | b'p' | b'P');
                    if c.is_ascii_alphanumeric() || c == b'.' || c == b'_' || exponent {
                        pos += 1;
                    } else {
                        break;
                    }
                }
                PpTokenKind::Number
            }
            b'"' | b'\'' => {
                pos += 1;
                while pos < bytes.len() && bytes[pos] != ch && bytes[pos] != b'\n' {
                    if bytes[pos] == b'\\' && pos + 1 < bytes.len() {
                        pos += 1;
                    }
                    pos += 1;
                }
                if pos < bytes.len() && bytes[pos] == ch {
                    pos += 1;
                }
                PpTokenKind::Literal
            }
            b'#' if bytes.get(pos + 1) == Some(&b'#') => {
                pos += 2;
                PpTokenKind::Punct
            }
            _ => {
                // Advance by one full character so multi-byte text stays intact.
                pos += text[pos..].chars().next().map(char::len_utf8).unwrap_or(1);
                PpTokenKind::Punct
            }
        };
        tokens.push(PpToken::new(kind, &text[start..pos]));
    }
    tokens
}

/// Concatenate the text of a token sequence.
pub fn untokenize(tokens: &[PpToken]) -> String {
    tokens.iter().map(|t| t.text.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use crate::lexeme::{tokenize, untokenize, PpTokenKind};

    #[test]
    fn test_tokenize_round_trips_text() {
        let text = "x = f(1.5e+3, \"a,b\") + 'c';\n  y";
        let tokens = tokenize(text);
        assert_eq!(untokenize(&tokens), text);
        let kinds = tokens
            .iter()
            .filter(|t| !t.is_whitespace())
            .map(|t| t.kind)
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                PpTokenKind::Identifier,
                PpTokenKind::Punct,
                PpTokenKind::Identifier,
                PpTokenKind::Punct,
                PpTokenKind::Number,
                PpTokenKind::Punct,
                PpTokenKind::Literal,
                PpTokenKind::Punct,
                PpTokenKind::Punct,
                PpTokenKind::Literal,
                PpTokenKind::Punct,
                PpTokenKind::Identifier,
            ]
        );
    }
}
