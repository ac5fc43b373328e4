use crate::{
    IntegerSuffix, InvalidEscapeError, InvalidIntegerLiteralError, ParseError, ParseResult, Token,
    TokenType, UnexpectedCharacterError, UnexpectedEndOfFileError, UnfinishedTokenError,
};
use cwasm_span::{SourcePosition, Span};

/// Maximal-munch lexer over preprocessed C source.
///
/// Tokens are produced on demand through [`Lexer::produce`].
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Current byte position in the input.
    pub fn pos(&self) -> SourcePosition {
        self.pos as SourcePosition
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start as SourcePosition..self.pos as SourcePosition)
    }

    fn skip_trivia(&mut self) {
        loop {
            match (self.peek(), self.peek_nth(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    self.pos += 2;
                    while self.peek().is_some() && !self.input[self.pos..].starts_with("*/") {
                        self.bump();
                    }
                    self.pos = (self.pos + 2).min(self.input.len());
                }
                _ => return,
            }
        }
    }

    /// Produce the next token.
    ///
    /// The end of input is reported as [`ParseError::UnexpectedEndOfFile`]; the parser decides
    /// whether that is an error.
    pub fn produce(&mut self) -> ParseResult<Token> {
        self.skip_trivia();
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Err(ParseError::UnexpectedEndOfFile(UnexpectedEndOfFileError {
                span: self.span_from(start),
            }));
        };
        let ty = match ch {
            c if c == '_' || c.is_ascii_alphabetic() => {
                while self
                    .peek()
                    .is_some_and(|c| c == '_' || c.is_ascii_alphanumeric())
                {
                    self.bump();
                }
                let word = &self.input[start..self.pos];
                TokenType::keyword(word).unwrap_or_else(|| TokenType::Identifier(word.to_string()))
            }
            c if c.is_ascii_digit()
                || (c == '.' && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit())) =>
            {
                self.lex_number(start)?
            }
            '\'' => self.lex_char(start)?,
            '"' => TokenType::StringLiteral(self.lex_string(start)?),
            _ => self.lex_punctuator(start)?,
        };
        Ok(Token::new(ty, self.span_from(start)))
    }

    fn lex_punctuator(&mut self, start: usize) -> ParseResult<TokenType> {
        const PUNCTUATORS: &[(&str, TokenType)] = &[
            ("...", TokenType::Ellipsis),
            ("<<=", TokenType::ShiftLeftEqual),
            (">>=", TokenType::ShiftRightEqual),
            ("->", TokenType::Arrow),
            ("++", TokenType::PlusPlus),
            ("--", TokenType::MinusMinus),
            ("<<", TokenType::ShiftLeft),
            (">>", TokenType::ShiftRight),
            ("<=", TokenType::LessThanEqual),
            (">=", TokenType::GreaterThanEqual),
            ("==", TokenType::EqualEqual),
            ("!=", TokenType::BangEqual),
            ("&&", TokenType::LogicalAnd),
            ("||", TokenType::LogicalOr),
            ("+=", TokenType::PlusEqual),
            ("-=", TokenType::MinusEqual),
            ("*=", TokenType::StarEqual),
            ("/=", TokenType::SlashEqual),
            ("%=", TokenType::PercentEqual),
            ("&=", TokenType::AmpersandEqual),
            ("^=", TokenType::CaretEqual),
            ("|=", TokenType::PipeEqual),
            ("&", TokenType::Ampersand),
            ("!", TokenType::Bang),
            ("^", TokenType::Caret),
            ("}", TokenType::CloseBrace),
            ("]", TokenType::CloseBracket),
            (")", TokenType::CloseParen),
            (":", TokenType::Colon),
            (",", TokenType::Comma),
            (".", TokenType::Dot),
            ("=", TokenType::Equal),
            (">", TokenType::GreaterThan),
            ("<", TokenType::LessThan),
            ("-", TokenType::Minus),
            ("{", TokenType::OpenBrace),
            ("[", TokenType::OpenBracket),
            ("(", TokenType::OpenParen),
            ("%", TokenType::Percent),
            ("|", TokenType::Pipe),
            ("+", TokenType::Plus),
            ("?", TokenType::Question),
            (";", TokenType::Semicolon),
            ("/", TokenType::Slash),
            ("*", TokenType::Star),
            ("~", TokenType::Tilde),
        ];
        let rest = &self.input[start..];
        for (text, ty) in PUNCTUATORS {
            if rest.starts_with(text) {
                self.pos += text.len();
                return Ok(ty.clone());
            }
        }
        let ch = self.bump().unwrap_or_default();
        Err(ParseError::UnexpectedCharacter(UnexpectedCharacterError {
            ch,
            span: self.span_from(start),
        }))
    }

    fn lex_number(&mut self, start: usize) -> ParseResult<TokenType> {
        let bytes = self.input.as_bytes();
        let mut end = start;
        while end < bytes.len() {
            let c = bytes[end];
            let exponent_sign = matches!(c, b'+' | b'-')
                && end > start
                && matches!(bytes[end - 1], b'e' | b'E' | b'p' | b'P')
                && !self.input[start..end].starts_with("0x")
                && !self.input[start..end].starts_with("0X");
            if c.is_ascii_alphanumeric() || c == b'.' || exponent_sign {
                end += 1;
            } else {
                break;
            }
        }
        self.pos = end;
        let text = &self.input[start..end];
        let invalid = || {
            ParseError::InvalidIntegerLiteral(InvalidIntegerLiteralError {
                buf: text.to_string(),
                span: Span::new(start as SourcePosition..end as SourcePosition),
            })
        };
        let is_hex = text.starts_with("0x") || text.starts_with("0X");
        let is_float = !is_hex && (text.contains('.') || text.contains(['e', 'E']));
        if is_float {
            let (digits, single) = match text.strip_suffix(['f', 'F']) {
                Some(digits) => (digits, true),
                None => (text.strip_suffix(['l', 'L']).unwrap_or(text), false),
            };
            let value = digits.parse::<f64>().map_err(|_| invalid())?;
            return Ok(TokenType::FloatLiteral(value, single));
        }
        let digits_end = text
            .char_indices()
            .skip(if is_hex { 2 } else { 0 })
            .find(|(_, c)| matches!(c, 'u' | 'U' | 'l' | 'L'))
            .map_or(text.len(), |(i, _)| i);
        let (digits, suffix_text) = text.split_at(digits_end);
        let mut suffix = IntegerSuffix {
            decimal: !is_hex && !(digits.len() > 1 && digits.starts_with('0')),
            ..IntegerSuffix::default()
        };
        for c in suffix_text.chars() {
            match c {
                'u' | 'U' if !suffix.unsigned => suffix.unsigned = true,
                'l' | 'L' if suffix.long < 2 => suffix.long += 1,
                _ => return Err(invalid()),
            }
        }
        let value = if is_hex {
            u64::from_str_radix(&digits[2..], 16)
        } else if suffix.decimal {
            digits.parse::<u64>()
        } else {
            u64::from_str_radix(&digits[1..], 8)
        }
        .map_err(|_| invalid())?;
        Ok(TokenType::IntegerLiteral(value, suffix))
    }

    /// Decode one possibly escaped character inside a literal.
    fn lex_escaped(&mut self, quote: char, start: usize) -> ParseResult<u8> {
        let unfinished = |lexer: &Self| {
            ParseError::UnfinishedToken(UnfinishedTokenError {
                expected: quote,
                span: lexer.span_from(start),
            })
        };
        let ch = match self.bump() {
            Some('\n') | None => return Err(unfinished(self)),
            Some(ch) => ch,
        };
        if ch != '\\' {
            // Non-ASCII characters are truncated to their low byte.
            return Ok(ch as u32 as u8);
        }
        let escape_start = self.pos;
        let escaped = self.bump().ok_or_else(|| unfinished(self))?;
        let value = match escaped {
            'n' => b'\n',
            't' => b'\t',
            'r' => b'\r',
            'a' => 0x07,
            'b' => 0x08,
            'f' => 0x0c,
            'v' => 0x0b,
            'e' => 0x1b,
            '\\' => b'\\',
            '\'' => b'\'',
            '"' => b'"',
            '?' => b'?',
            'x' => {
                let mut value: u32 = 0;
                let mut count = 0;
                while let Some(digit) = self.peek().and_then(|c| c.to_digit(16)) {
                    value = value.wrapping_mul(16).wrapping_add(digit);
                    self.bump();
                    count += 1;
                }
                if count == 0 {
                    return Err(ParseError::InvalidEscape(InvalidEscapeError {
                        ch: 'x',
                        span: self.span_from(escape_start),
                    }));
                }
                value as u8
            }
            '0'..='7' => {
                let mut value = escaped as u32 - '0' as u32;
                for _ in 0..2 {
                    match self.peek().and_then(|c| c.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            self.bump();
                        }
                        None => break,
                    }
                }
                value as u8
            }
            other => {
                return Err(ParseError::InvalidEscape(InvalidEscapeError {
                    ch: other,
                    span: self.span_from(escape_start),
                }))
            }
        };
        Ok(value)
    }

    fn lex_char(&mut self, start: usize) -> ParseResult<TokenType> {
        self.bump();
        if self.peek() == Some('\'') {
            return Err(ParseError::UnfinishedToken(UnfinishedTokenError {
                expected: '\'',
                span: self.span_from(start),
            }));
        }
        let value = self.lex_escaped('\'', start)?;
        if self.bump() != Some('\'') {
            return Err(ParseError::UnfinishedToken(UnfinishedTokenError {
                expected: '\'',
                span: self.span_from(start),
            }));
        }
        // Plain char is signed.
        Ok(TokenType::CharLiteral(value as i8 as i64))
    }

    fn lex_string(&mut self, start: usize) -> ParseResult<Vec<u8>> {
        self.bump();
        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                Some('"') => {
                    self.bump();
                    return Ok(bytes);
                }
                Some(ch) if ch != '\\' && !ch.is_ascii() => {
                    self.bump();
                    let mut buf = [0; 4];
                    bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
                _ => bytes.push(self.lex_escaped('"', start)?),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::lexer::Lexer;
    use crate::{IntegerSuffix, ParseError, TokenType};
    use cwasm_macros::{assert_err, assert_matches, assert_ok};
    use cwasm_span::Span;

    fn lex(input: &str) -> Vec<TokenType> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            match lexer.produce() {
                Ok(token) => tokens.push(token.ty),
                Err(ParseError::UnexpectedEndOfFile(_)) => return tokens,
                Err(err) => panic!("lexer failed: {err:?}"),
            }
        }
    }

    #[test]
    fn test_lex_keywords_and_identifiers() {
        assert_eq!(
            lex("int integer _Bool __sp"),
            vec![
                TokenType::KeywordInt,
                TokenType::Identifier("integer".to_string()),
                TokenType::KeywordBool,
                TokenType::Identifier("__sp".to_string()),
            ]
        );
    }

    #[test]
    fn test_lex_maximal_munch_punctuators() {
        assert_eq!(
            lex("a<<=b->c...d+++e"),
            vec![
                TokenType::Identifier("a".to_string()),
                TokenType::ShiftLeftEqual,
                TokenType::Identifier("b".to_string()),
                TokenType::Arrow,
                TokenType::Identifier("c".to_string()),
                TokenType::Ellipsis,
                TokenType::Identifier("d".to_string()),
                TokenType::PlusPlus,
                TokenType::Plus,
                TokenType::Identifier("e".to_string()),
            ]
        );
    }

    #[test]
    fn test_lex_integer_literals() {
        let decimal = IntegerSuffix {
            decimal: true,
            ..IntegerSuffix::default()
        };
        assert_eq!(lex("42"), vec![TokenType::IntegerLiteral(42, decimal)]);
        assert_eq!(
            lex("0x1Fu"),
            vec![TokenType::IntegerLiteral(
                31,
                IntegerSuffix {
                    unsigned: true,
                    long: 0,
                    decimal: false
                }
            )]
        );
        assert_eq!(
            lex("017"),
            vec![TokenType::IntegerLiteral(15, IntegerSuffix::default())]
        );
        assert_eq!(
            lex("5ULL"),
            vec![TokenType::IntegerLiteral(
                5,
                IntegerSuffix {
                    unsigned: true,
                    long: 2,
                    decimal: true
                }
            )]
        );
    }

    #[test]
    fn test_lex_float_literals() {
        assert_eq!(lex("1.5"), vec![TokenType::FloatLiteral(1.5, false)]);
        assert_eq!(lex(".25f"), vec![TokenType::FloatLiteral(0.25, true)]);
        assert_eq!(lex("1e-3"), vec![TokenType::FloatLiteral(0.001, false)]);
    }

    #[test]
    fn test_lex_char_and_string_escapes() {
        assert_eq!(
            lex(r#"'\n' '\x41' '\0' '\377' "a\tb\"" "\e""#),
            vec![
                TokenType::CharLiteral(10),
                TokenType::CharLiteral(65),
                TokenType::CharLiteral(0),
                TokenType::CharLiteral(-1),
                TokenType::StringLiteral(b"a\tb\"".to_vec()),
                TokenType::StringLiteral(vec![0x1b]),
            ]
        );
    }

    #[test]
    fn test_lex_errors() {
        let mut lexer = Lexer::new("\"abc");
        let err = assert_err!(lexer.produce());
        assert_matches!(err, ParseError::UnfinishedToken(_));

        let mut lexer = Lexer::new("  @");
        let err = assert_err!(lexer.produce());
        assert_matches!(err, ParseError::UnexpectedCharacter(e) => assert_eq!(e.span, Span::new(2..3)));

        let mut lexer = Lexer::new("'\\q'");
        assert_matches!(assert_err!(lexer.produce()), ParseError::InvalidEscape(_));

        let mut lexer = Lexer::new("99999999999999999999999");
        assert_matches!(assert_err!(lexer.produce()), ParseError::InvalidIntegerLiteral(_));
    }

    #[test]
    fn test_lex_skips_comments() {
        let mut lexer = Lexer::new("/* a */ x // b\n y");
        let token = assert_ok!(lexer.produce());
        assert_eq!(token.span, Span::new(8..9));
        assert_eq!(lex("/* a */ x // b\n y").len(), 2);
    }
}
