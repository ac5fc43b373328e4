use cwasm_span::Span;
use std::fmt;
use std::fmt::Formatter;

/// A single token lexed from the preprocessed source code.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, PartialEq, Clone)]
pub struct Token {
    pub span: Span,
    pub ty: TokenType,
}

impl Token {
    /// Create a new token from a span and a token type.
    pub fn new(ty: TokenType, span: Span) -> Self {
        Self { span, ty }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ty)
    }
}

/// Suffix and radix information of an integer literal.
///
/// The type of an integer constant depends on all three, so the lexer keeps them around for the
/// IR builder instead of deciding on a type itself.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct IntegerSuffix {
    pub unsigned: bool,
    /// Number of `l` characters in the suffix.
    pub long: u8,
    pub decimal: bool,
}

/// Enumeration of all possible token types.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, PartialEq, Clone)]
pub enum TokenType {
    KeywordAuto,
    KeywordBool,
    KeywordBreak,
    KeywordCase,
    KeywordChar,
    KeywordConst,
    KeywordContinue,
    KeywordDefault,
    KeywordDo,
    KeywordDouble,
    KeywordElse,
    KeywordEnum,
    KeywordExtern,
    KeywordFloat,
    KeywordFor,
    KeywordGoto,
    KeywordIf,
    KeywordImport,
    KeywordInline,
    KeywordInt,
    KeywordLong,
    KeywordRegister,
    KeywordReturn,
    KeywordShort,
    KeywordSigned,
    KeywordSizeof,
    KeywordStatic,
    KeywordStruct,
    KeywordSwitch,
    KeywordTypedef,
    KeywordUnion,
    KeywordUnsigned,
    KeywordVoid,
    KeywordVolatile,
    KeywordWhile,

    Identifier(String),
    IntegerLiteral(u64, IntegerSuffix),
    /// Floating literal, `true` when it carries the `f` suffix.
    FloatLiteral(f64, bool),
    CharLiteral(i64),
    /// Decoded bytes of a string literal, without the terminating zero.
    StringLiteral(Vec<u8>),

    Ampersand,
    AmpersandEqual,
    Arrow,
    Bang,
    BangEqual,
    Caret,
    CaretEqual,
    CloseBrace,
    CloseBracket,
    CloseParen,
    Colon,
    Comma,
    Dot,
    Ellipsis,
    Equal,
    EqualEqual,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
    LogicalAnd,
    LogicalOr,
    Minus,
    MinusEqual,
    MinusMinus,
    OpenBrace,
    OpenBracket,
    OpenParen,
    Percent,
    PercentEqual,
    Pipe,
    PipeEqual,
    Plus,
    PlusEqual,
    PlusPlus,
    Question,
    Semicolon,
    ShiftLeft,
    ShiftLeftEqual,
    ShiftRight,
    ShiftRightEqual,
    Slash,
    SlashEqual,
    Star,
    StarEqual,
    Tilde,
}

impl TokenType {
    /// Map an identifier to its keyword token, if it is one.
    pub fn keyword(name: &str) -> Option<TokenType> {
        let ty = match name {
            "auto" => TokenType::KeywordAuto,
            "_Bool" => TokenType::KeywordBool,
            "break" => TokenType::KeywordBreak,
            "case" => TokenType::KeywordCase,
            "char" => TokenType::KeywordChar,
            "const" => TokenType::KeywordConst,
            "continue" => TokenType::KeywordContinue,
            "default" => TokenType::KeywordDefault,
            "do" => TokenType::KeywordDo,
            "double" => TokenType::KeywordDouble,
            "else" => TokenType::KeywordElse,
            "enum" => TokenType::KeywordEnum,
            "extern" => TokenType::KeywordExtern,
            "float" => TokenType::KeywordFloat,
            "for" => TokenType::KeywordFor,
            "goto" => TokenType::KeywordGoto,
            "if" => TokenType::KeywordIf,
            "import" => TokenType::KeywordImport,
            "inline" => TokenType::KeywordInline,
            "int" => TokenType::KeywordInt,
            "long" => TokenType::KeywordLong,
            "register" => TokenType::KeywordRegister,
            "return" => TokenType::KeywordReturn,
            "short" => TokenType::KeywordShort,
            "signed" => TokenType::KeywordSigned,
            "sizeof" => TokenType::KeywordSizeof,
            "static" => TokenType::KeywordStatic,
            "struct" => TokenType::KeywordStruct,
            "switch" => TokenType::KeywordSwitch,
            "typedef" => TokenType::KeywordTypedef,
            "union" => TokenType::KeywordUnion,
            "unsigned" => TokenType::KeywordUnsigned,
            "void" => TokenType::KeywordVoid,
            "volatile" => TokenType::KeywordVolatile,
            "while" => TokenType::KeywordWhile,
            _ => return None,
        };
        Some(ty)
    }

    /// Tokens that can only start a type specifier or qualifier.
    pub fn is_type_keyword(&self) -> bool {
        matches!(
            self,
            TokenType::KeywordBool
                | TokenType::KeywordChar
                | TokenType::KeywordConst
                | TokenType::KeywordDouble
                | TokenType::KeywordEnum
                | TokenType::KeywordFloat
                | TokenType::KeywordInt
                | TokenType::KeywordLong
                | TokenType::KeywordShort
                | TokenType::KeywordSigned
                | TokenType::KeywordStruct
                | TokenType::KeywordUnion
                | TokenType::KeywordUnsigned
                | TokenType::KeywordVoid
                | TokenType::KeywordVolatile
        )
    }

    pub fn is_storage_keyword(&self) -> bool {
        matches!(
            self,
            TokenType::KeywordAuto
                | TokenType::KeywordExtern
                | TokenType::KeywordImport
                | TokenType::KeywordInline
                | TokenType::KeywordRegister
                | TokenType::KeywordStatic
                | TokenType::KeywordTypedef
        )
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenType::KeywordAuto => "auto",
            TokenType::KeywordBool => "_Bool",
            TokenType::KeywordBreak => "break",
            TokenType::KeywordCase => "case",
            TokenType::KeywordChar => "char",
            TokenType::KeywordConst => "const",
            TokenType::KeywordContinue => "continue",
            TokenType::KeywordDefault => "default",
            TokenType::KeywordDo => "do",
            TokenType::KeywordDouble => "double",
            TokenType::KeywordElse => "else",
            TokenType::KeywordEnum => "enum",
            TokenType::KeywordExtern => "extern",
            TokenType::KeywordFloat => "float",
            TokenType::KeywordFor => "for",
            TokenType::KeywordGoto => "goto",
            TokenType::KeywordIf => "if",
            TokenType::KeywordImport => "import",
            TokenType::KeywordInline => "inline",
            TokenType::KeywordInt => "int",
            TokenType::KeywordLong => "long",
            TokenType::KeywordRegister => "register",
            TokenType::KeywordReturn => "return",
            TokenType::KeywordShort => "short",
            TokenType::KeywordSigned => "signed",
            TokenType::KeywordSizeof => "sizeof",
            TokenType::KeywordStatic => "static",
            TokenType::KeywordStruct => "struct",
            TokenType::KeywordSwitch => "switch",
            TokenType::KeywordTypedef => "typedef",
            TokenType::KeywordUnion => "union",
            TokenType::KeywordUnsigned => "unsigned",
            TokenType::KeywordVoid => "void",
            TokenType::KeywordVolatile => "volatile",
            TokenType::KeywordWhile => "while",
            TokenType::Identifier(v) => return write!(f, "{}", v),
            TokenType::IntegerLiteral(v, _) => return write!(f, "{}", v),
            TokenType::FloatLiteral(v, _) => return write!(f, "{}", v),
            TokenType::CharLiteral(v) => return write!(f, "'\\x{:x}'", v),
            TokenType::StringLiteral(v) => {
                return write!(f, "{:?}", String::from_utf8_lossy(v));
            }
            TokenType::Ampersand => "&",
            TokenType::AmpersandEqual => "&=",
            TokenType::Arrow => "->",
            TokenType::Bang => "!",
            TokenType::BangEqual => "!=",
            TokenType::Caret => "^",
            TokenType::CaretEqual => "^=",
            TokenType::CloseBrace => "}",
            TokenType::CloseBracket => "]",
            TokenType::CloseParen => ")",
            TokenType::Colon => ":",
            TokenType::Comma => ",",
            TokenType::Dot => ".",
            TokenType::Ellipsis => "...",
            TokenType::Equal => "=",
            TokenType::EqualEqual => "==",
            TokenType::GreaterThan => ">",
            TokenType::GreaterThanEqual => ">=",
            TokenType::LessThan => "<",
            TokenType::LessThanEqual => "<=",
            TokenType::LogicalAnd => "&&",
            TokenType::LogicalOr => "||",
            TokenType::Minus => "-",
            TokenType::MinusEqual => "-=",
            TokenType::MinusMinus => "--",
            TokenType::OpenBrace => "{",
            TokenType::OpenBracket => "[",
            TokenType::OpenParen => "(",
            TokenType::Percent => "%",
            TokenType::PercentEqual => "%=",
            TokenType::Pipe => "|",
            TokenType::PipeEqual => "|=",
            TokenType::Plus => "+",
            TokenType::PlusEqual => "+=",
            TokenType::PlusPlus => "++",
            TokenType::Question => "?",
            TokenType::Semicolon => ";",
            TokenType::ShiftLeft => "<<",
            TokenType::ShiftLeftEqual => "<<=",
            TokenType::ShiftRight => ">>",
            TokenType::ShiftRightEqual => ">>=",
            TokenType::Slash => "/",
            TokenType::SlashEqual => "/=",
            TokenType::Star => "*",
            TokenType::StarEqual => "*=",
            TokenType::Tilde => "~",
        };
        write!(f, "{}", text)
    }
}
