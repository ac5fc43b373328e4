use crate::ast::{
    AstAssignExpr, AstBasicType, AstBinaryOp, AstBinaryOpExpr, AstBracketIndexExpr,
    AstBreakStmt, AstBuiltin, AstBuiltinExpr, AstCallExpr, AstCaseStmt, AstCastExpr,
    AstCharLiteralExpr, AstCommaExpr, AstCompoundLiteralExpr, AstCompoundStmt,
    AstConditionalExpr, AstContinueStmt, AstDeclaration, AstDeclarationSpecifiers,
    AstDeclarator, AstDefaultStmt, AstDerivedType, AstDesignator, AstDoWhileStmt,
    AstEnumSpecifier, AstEnumerator, AstExpr, AstExprStmt, AstFieldDeclaration,
    AstFloatLiteralExpr, AstForInitializer, AstForStmt, AstFunctionDefinition, AstGotoStmt,
    AstIdentifier, AstIfStmt, AstInitDeclarator, AstInitializer, AstInitializerItem,
    AstInitializerList, AstIntegerLiteralExpr, AstItem, AstLabeledStmt, AstMemberExpr,
    AstParameter, AstParameterList, AstRecordKind, AstRecordSpecifier, AstReturnStmt,
    AstSizeofExprExpr, AstSizeofTypeExpr, AstStmt, AstStorageClass, AstStringLiteralExpr,
    AstSwitchStmt, AstTranslationUnit, AstTypeName, AstTypeSpecifier, AstUnaryOp,
    AstUnaryOpExpr, AstWhileStmt,
};
use crate::lexer::Lexer;
use crate::{
    ParseError, ParseResult, SyntaxError, Token, TokenType, UnexpectedEndOfFileError,
    UnexpectedTokenError,
};
use cwasm_span::Span;
use std::collections::{HashMap, VecDeque};

pub struct ParserInput<'a> {
    lexer: &'a mut Lexer<'a>,
    /// Buffer of lookahead tokens.
    ///
    /// C needs more than a single token of lookahead in a few places: labels (`name :`) and casts
    /// (`( type-name )`) are only recognized by looking past the first token.
    la: VecDeque<Token>,
}

impl<'a> ParserInput<'a> {
    pub fn new(lexer: &'a mut Lexer<'a>) -> Self {
        Self {
            lexer,
            la: VecDeque::new(),
        }
    }

    /// Peek `n` tokens ahead.
    ///
    /// This function will fail the entire parser if the lexer fails to produce a token, except when
    /// the lexer reaches the end of input.
    pub fn lookahead_nth(&mut self, n: usize) -> ParseResult<Option<&Token>> {
        while self.la.len() <= n {
            match self.lexer.produce() {
                Ok(tok) => self.la.push_back(tok),
                // If the end of source is reached, we might be able to recover. For example, if
                // statements may or may not have an `else` after them.
                Err(ParseError::UnexpectedEndOfFile(_)) => return Ok(None),
                Err(err) => return Err(err),
            }
        }
        Ok(self.la.get(n))
    }

    /// Consume the next token from the token stream.
    pub fn eat(&mut self) -> ParseResult<Token> {
        if let Some(token) = self.la.pop_front() {
            return Ok(token);
        }
        self.lexer.produce()
    }
}

/// Recursive descent parser for the supported C subset.
///
/// The parser keeps track of the names declared in each block scope so that identifiers can be
/// classified as typedef names or ordinary identifiers while parsing.
pub struct Parser<'a> {
    input: ParserInput<'a>,
    /// Declared names per scope, mapped to whether they are typedef names.
    scopes: Vec<HashMap<String, bool>>,
}

impl<'a> Parser<'a> {
    /// Create a new parser from a given lexer.
    pub fn new(lexer: &'a mut Lexer<'a>) -> Self {
        Self {
            input: ParserInput::new(lexer),
            scopes: vec![HashMap::new()],
        }
    }

    /// Advance the lexer iterator by one, and return the advanced token.
    pub fn eat(&mut self) -> ParseResult<Token> {
        self.input.eat()
    }

    /// Peek at the next token in the source without consuming it.
    pub fn lookahead(&mut self) -> ParseResult<Option<&Token>> {
        self.input.lookahead_nth(0)
    }

    /// Peek at the type of the `n`-th next token.
    pub fn lookahead_ty(&mut self, n: usize) -> ParseResult<Option<TokenType>> {
        Ok(self.input.lookahead_nth(n)?.map(|t| t.ty.clone()))
    }

    /// Peek at the next token in the source without consuming it.
    ///
    /// As indicated by the name, this function fails the parser if the lexer cannot produce a
    /// next token.
    pub fn lookahead_or_err(&mut self) -> ParseResult<&Token> {
        let pos = self.input.lexer.pos();
        self.input
            .lookahead_nth(0)?
            .ok_or(ParseError::UnexpectedEndOfFile(UnexpectedEndOfFileError {
                span: Span::new(pos..pos),
            }))
    }

    /// Determine if the next token in the token stream matches the given type.
    pub fn lookahead_check(&mut self, ty: &TokenType) -> ParseResult<bool> {
        self.lookahead_check_nth(0, ty)
    }

    pub fn lookahead_check_nth(&mut self, n: usize, ty: &TokenType) -> ParseResult<bool> {
        let token = self.input.lookahead_nth(n)?;
        match token {
            Some(token) if token.ty == *ty => Ok(true),
            _ => Ok(false),
        }
    }

    /// Consume the next token from the token stream and ensure it matches the given type.
    ///
    /// If the token doesn't match, the entire parser fails.
    pub fn check(&mut self, ty: &TokenType) -> ParseResult<Token> {
        let token = self.eat()?;
        match token {
            token if token.ty == *ty => Ok(token),
            _ => Err(unexpected(token)),
        }
    }

    /// Consume the next token if it matches the given type.
    pub fn take(&mut self, ty: &TokenType) -> ParseResult<Option<Token>> {
        if self.lookahead_check(ty)? {
            return Ok(Some(self.eat()?));
        }
        Ok(None)
    }

    /// Apply the given parser `f` to the parser repeatedly until the next token matches the given
    /// circuit breaker.
    ///
    /// Each call to `f` is interleaved by a single consumption of the delimiter token. A trailing
    /// delimiter before the circuit breaker is accepted. The circuit breaker is not consumed.
    pub fn parser_combinator_delimited<T, F>(
        &mut self,
        delimiter: &TokenType,
        circuit_breaker: &TokenType,
        f: F,
    ) -> ParseResult<Vec<T>>
    where
        F: Fn(&mut Parser<'a>) -> ParseResult<T>,
    {
        let mut items = Vec::new();
        while !self.lookahead_check(circuit_breaker)? {
            items.push(f(self)?);
            if !self.lookahead_check(circuit_breaker)? {
                self.check(delimiter)?;
            }
        }
        Ok(items)
    }

    /// Optionally apply `f`, decided by the `matcher` on the next token.
    ///
    /// The combinator does not consume the decision token itself.
    pub fn parser_combinator_take_if<T, F, M>(&mut self, matcher: M, f: F) -> ParseResult<Option<T>>
    where
        F: FnOnce(&mut Parser<'a>) -> ParseResult<T>,
        M: FnOnce(&Token) -> bool,
    {
        let token = self.lookahead()?;
        match token {
            Some(token) if matcher(token) => Ok(Some(f(self)?)),
            _ => Ok(None),
        }
    }

    /// Apply the given parser `f` to the parser repeatedly until the next token matches the given
    /// circuit breaker.
    ///
    /// This function does not consume the circuit breaker token.
    pub fn parser_combinator_many<T, F>(
        &mut self,
        circuit_breaker: &TokenType,
        f: F,
    ) -> ParseResult<Vec<T>>
    where
        F: Fn(&mut Parser<'a>) -> ParseResult<T>,
    {
        let mut items = Vec::new();
        while !self.lookahead_check(circuit_breaker)? {
            if self.lookahead()?.is_none() {
                let pos = self.input.lexer.pos();
                return Err(ParseError::UnexpectedEndOfFile(UnexpectedEndOfFileError {
                    span: Span::new(pos..pos),
                }));
            }
            items.push(f(self)?);
        }
        Ok(items)
    }

    fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn leave_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare_name(&mut self, name: &AstIdentifier, typedef: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.name.clone(), typedef);
        }
    }

    /// Whether `name` currently refers to a typedef.
    pub fn is_typedef_name(&self, name: &str) -> bool {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
            .unwrap_or(false)
    }

    /// Whether the `n`-th next token can start declaration specifiers.
    fn is_declaration_start(&mut self, n: usize) -> ParseResult<bool> {
        Ok(match self.lookahead_ty(n)? {
            Some(TokenType::Identifier(name)) => self.is_typedef_name(&name),
            Some(ty) => ty.is_type_keyword() || ty.is_storage_keyword(),
            None => false,
        })
    }

    /// Whether the `n`-th next token can start a type name.
    fn is_type_name_start(&mut self, n: usize) -> ParseResult<bool> {
        Ok(match self.lookahead_ty(n)? {
            Some(TokenType::Identifier(name)) => self.is_typedef_name(&name),
            Some(ty) => ty.is_type_keyword(),
            None => false,
        })
    }
}

fn unexpected(token: Token) -> ParseError {
    ParseError::UnexpectedToken(UnexpectedTokenError {
        span: token.span,
        token,
    })
}

fn syntax_error(message: impl Into<String>, span: Span) -> ParseError {
    ParseError::Syntax(SyntaxError {
        message: message.into(),
        span,
    })
}

/// Keyword counts gathered while parsing declaration specifiers.
#[derive(Default)]
struct BasicTypeKeywords {
    void: u8,
    bool: u8,
    char: u8,
    short: u8,
    int: u8,
    long: u8,
    float: u8,
    double: u8,
    signed: u8,
    unsigned: u8,
}

impl BasicTypeKeywords {
    fn is_empty(&self) -> bool {
        self.void
            + self.bool
            + self.char
            + self.short
            + self.int
            + self.long
            + self.float
            + self.double
            + self.signed
            + self.unsigned
            == 0
    }

    /// Resolve a keyword multiset such as `unsigned long int` into a basic type.
    fn resolve(&self) -> Option<AstBasicType> {
        let BasicTypeKeywords {
            void,
            bool,
            char,
            short,
            int,
            long,
            float,
            double,
            signed,
            unsigned,
        } = *self;
        if signed + unsigned > 1 || int > 1 {
            return None;
        }
        let ty = match (void, bool, char, short, long, float, double) {
            (1, 0, 0, 0, 0, 0, 0) if int + signed + unsigned == 0 => AstBasicType::Void,
            (0, 1, 0, 0, 0, 0, 0) if int + signed + unsigned == 0 => AstBasicType::Bool,
            (0, 0, 1, 0, 0, 0, 0) if int == 0 => match (signed, unsigned) {
                (1, _) => AstBasicType::SignedChar,
                (_, 1) => AstBasicType::UnsignedChar,
                _ => AstBasicType::Char,
            },
            (0, 0, 0, 1, 0, 0, 0) => match unsigned {
                1 => AstBasicType::UnsignedShort,
                _ => AstBasicType::Short,
            },
            (0, 0, 0, 0, 0, 0, 0) => match unsigned {
                1 => AstBasicType::UnsignedInt,
                _ => AstBasicType::Int,
            },
            (0, 0, 0, 0, 1, 0, 0) => match unsigned {
                1 => AstBasicType::UnsignedLong,
                _ => AstBasicType::Long,
            },
            (0, 0, 0, 0, 2, 0, 0) => match unsigned {
                1 => AstBasicType::UnsignedLongLong,
                _ => AstBasicType::LongLong,
            },
            (0, 0, 0, 0, 0, 1, 0) if int + signed + unsigned == 0 => AstBasicType::Float,
            // `long double` is treated as `double`.
            (0, 0, 0, 0, 0 | 1, 0, 1) if int + signed + unsigned == 0 => AstBasicType::Double,
            _ => return None,
        };
        Some(ty)
    }
}

impl Parser<'_> {
    /// Top-level entry for parsing a translation unit (file).
    pub fn parse(&mut self) -> ParseResult<AstTranslationUnit> {
        self.parse_translation_unit()
    }

    /// Parse a translation unit.
    ///
    /// ```text
    /// translation_unit ::= item*
    /// ```
    pub fn parse_translation_unit(&mut self) -> ParseResult<AstTranslationUnit> {
        let mut items = Vec::new();
        while self.lookahead()?.is_some() {
            // Stray semicolons at file scope are accepted.
            if self.take(&TokenType::Semicolon)?.is_some() {
                continue;
            }
            items.push(self.parse_item()?);
        }
        tracing::trace!(items = items.len(), "parsed translation unit");
        Ok(AstTranslationUnit { items })
    }

    /// Parse a function definition or a declaration at file scope.
    ///
    /// ```text
    /// item ::= declaration_specifiers declarator compound_stmt
    ///        | declaration
    /// ```
    pub fn parse_item(&mut self) -> ParseResult<AstItem> {
        let specifiers = self.parse_declaration_specifiers()?;
        if let Some(end) = self.take(&TokenType::Semicolon)? {
            let node = AstDeclaration {
                span: Span::from_pair(&specifiers.span, &end.span),
                specifiers,
                declarators: vec![],
            };
            return Ok(AstItem::Declaration(node));
        }
        let declarator = self.parse_declarator(false)?;
        let is_function = matches!(declarator.derived.first(), Some(AstDerivedType::Function(_)));
        if is_function && self.lookahead_check(&TokenType::OpenBrace)? {
            return Ok(AstItem::Function(
                self.parse_function_definition(specifiers, declarator)?,
            ));
        }
        Ok(AstItem::Declaration(
            self.parse_declaration_rest(specifiers, declarator)?,
        ))
    }

    fn parse_function_definition(
        &mut self,
        specifiers: AstDeclarationSpecifiers,
        declarator: AstDeclarator,
    ) -> ParseResult<AstFunctionDefinition> {
        if let Some(name) = &declarator.name {
            self.declare_name(name, false);
        }
        self.enter_scope();
        if let Some(AstDerivedType::Function(parameters)) = declarator.derived.first() {
            for parameter in &parameters.parameters {
                if let Some(name) = &parameter.declarator.name {
                    self.declare_name(name, false);
                }
            }
        }
        let body = self.parse_compound_stmt();
        self.leave_scope();
        let body = body?;
        let node = AstFunctionDefinition {
            span: Span::from_pair(&specifiers.span, &body.span),
            specifiers,
            declarator,
            body,
        };
        Ok(node)
    }

    /// Parse a declaration.
    ///
    /// ```text
    /// declaration ::= declaration_specifiers (init_declarator (COMMA init_declarator)*)? SEMICOLON
    /// ```
    pub fn parse_declaration(&mut self) -> ParseResult<AstDeclaration> {
        let specifiers = self.parse_declaration_specifiers()?;
        if let Some(end) = self.take(&TokenType::Semicolon)? {
            let node = AstDeclaration {
                span: Span::from_pair(&specifiers.span, &end.span),
                specifiers,
                declarators: vec![],
            };
            return Ok(node);
        }
        let declarator = self.parse_declarator(false)?;
        self.parse_declaration_rest(specifiers, declarator)
    }

    /// Finish a declaration whose first declarator has already been parsed.
    fn parse_declaration_rest(
        &mut self,
        specifiers: AstDeclarationSpecifiers,
        first: AstDeclarator,
    ) -> ParseResult<AstDeclaration> {
        let typedef = specifiers.storage == Some(AstStorageClass::Typedef);
        let mut declarators = vec![self.parse_init_declarator(first, typedef)?];
        while self.take(&TokenType::Comma)?.is_some() {
            let declarator = self.parse_declarator(false)?;
            declarators.push(self.parse_init_declarator(declarator, typedef)?);
        }
        let end = self.check(&TokenType::Semicolon)?;
        let node = AstDeclaration {
            span: Span::from_pair(&specifiers.span, &end.span),
            specifiers,
            declarators,
        };
        Ok(node)
    }

    /// Parse the optional initializer of a declarator.
    ///
    /// The name is in scope from the end of its declarator, before the initializer.
    fn parse_init_declarator(
        &mut self,
        declarator: AstDeclarator,
        typedef: bool,
    ) -> ParseResult<AstInitDeclarator> {
        if let Some(name) = &declarator.name {
            self.declare_name(name, typedef);
        }
        let initializer = match self.take(&TokenType::Equal)? {
            Some(_) => Some(self.parse_initializer()?),
            None => None,
        };
        let span = match &initializer {
            Some(initializer) => Span::from_pair(&declarator.span, initializer.span()),
            None => declarator.span,
        };
        Ok(AstInitDeclarator {
            span,
            declarator,
            initializer,
        })
    }

    /// Parse declaration specifiers: storage class, qualifiers and one type specifier.
    ///
    /// ```text
    /// declaration_specifiers ::= (storage_class | qualifier | type_specifier)+
    /// ```
    pub fn parse_declaration_specifiers(&mut self) -> ParseResult<AstDeclarationSpecifiers> {
        let start = self.lookahead_or_err()?.span;
        let mut end = start;
        let mut storage = None;
        let mut keywords = BasicTypeKeywords::default();
        let mut specifier: Option<AstTypeSpecifier> = None;
        loop {
            let Some(ty) = self.lookahead_ty(0)? else {
                break;
            };
            let class = match ty {
                TokenType::KeywordTypedef => Some(AstStorageClass::Typedef),
                TokenType::KeywordStatic => Some(AstStorageClass::Static),
                TokenType::KeywordExtern => Some(AstStorageClass::Extern),
                TokenType::KeywordImport => Some(AstStorageClass::Import),
                _ => None,
            };
            if let Some(class) = class {
                let token = self.eat()?;
                if storage.is_some() {
                    return Err(syntax_error("multiple storage classes in declaration", token.span));
                }
                storage = Some(class);
                end = token.span;
                continue;
            }
            let counter = match ty {
                TokenType::KeywordAuto
                | TokenType::KeywordRegister
                | TokenType::KeywordInline
                | TokenType::KeywordConst
                | TokenType::KeywordVolatile => {
                    end = self.eat()?.span;
                    continue;
                }
                TokenType::KeywordVoid => &mut keywords.void,
                TokenType::KeywordBool => &mut keywords.bool,
                TokenType::KeywordChar => &mut keywords.char,
                TokenType::KeywordShort => &mut keywords.short,
                TokenType::KeywordInt => &mut keywords.int,
                TokenType::KeywordLong => &mut keywords.long,
                TokenType::KeywordFloat => &mut keywords.float,
                TokenType::KeywordDouble => &mut keywords.double,
                TokenType::KeywordSigned => &mut keywords.signed,
                TokenType::KeywordUnsigned => &mut keywords.unsigned,
                TokenType::KeywordStruct | TokenType::KeywordUnion | TokenType::KeywordEnum => {
                    if specifier.is_some() || !keywords.is_empty() {
                        let token = self.eat()?;
                        return Err(syntax_error("multiple types in declaration", token.span));
                    }
                    let parsed = match ty {
                        TokenType::KeywordEnum => {
                            AstTypeSpecifier::Enum(self.parse_enum_specifier()?)
                        }
                        _ => AstTypeSpecifier::Record(self.parse_record_specifier()?),
                    };
                    end = *parsed.span();
                    specifier = Some(parsed);
                    continue;
                }
                TokenType::Identifier(name)
                    if specifier.is_none() && keywords.is_empty() && self.is_typedef_name(&name) =>
                {
                    let id = self.parse_identifier()?;
                    end = id.span;
                    specifier = Some(AstTypeSpecifier::TypedefName(id));
                    continue;
                }
                _ => break,
            };
            *counter += 1;
            end = self.eat()?.span;
        }
        let span = Span::from_pair(&start, &end);
        let ty = match specifier {
            Some(_) if !keywords.is_empty() => {
                return Err(syntax_error("multiple types in declaration", span));
            }
            Some(specifier) => specifier,
            None if keywords.is_empty() => {
                let token = self.eat()?;
                return Err(unexpected(token));
            }
            None => {
                let basic = keywords
                    .resolve()
                    .ok_or_else(|| syntax_error("invalid combination of type specifiers", span))?;
                AstTypeSpecifier::Basic(span, basic)
            }
        };
        Ok(AstDeclarationSpecifiers { span, storage, ty })
    }

    /// Parse a struct or union specifier.
    ///
    /// ```text
    /// record_specifier ::= (STRUCT | UNION) identifier? (OPEN_BRACE field_declaration* CLOSE_BRACE)?
    /// ```
    pub fn parse_record_specifier(&mut self) -> ParseResult<AstRecordSpecifier> {
        let start = self.eat()?;
        let kind = match start.ty {
            TokenType::KeywordStruct => AstRecordKind::Struct,
            TokenType::KeywordUnion => AstRecordKind::Union,
            _ => return Err(unexpected(start)),
        };
        let name = self.parser_combinator_take_if(
            |t| matches!(t.ty, TokenType::Identifier(_)),
            |p| p.parse_identifier(),
        )?;
        let mut end = name.as_ref().map_or(start.span, |n| n.span);
        let fields = match self.take(&TokenType::OpenBrace)? {
            Some(_) => {
                let fields = self
                    .parser_combinator_many(&TokenType::CloseBrace, |p| p.parse_field_declaration())?;
                end = self.check(&TokenType::CloseBrace)?.span;
                Some(fields)
            }
            None if name.is_none() => {
                return Err(syntax_error("expected a tag name or a member list", start.span));
            }
            None => None,
        };
        let node = AstRecordSpecifier {
            span: Span::from_pair(&start.span, &end),
            kind,
            name,
            fields,
        };
        Ok(node)
    }

    /// Parse a member declaration inside a struct or union body.
    ///
    /// ```text
    /// field_declaration ::= type_specifier (declarator (COMMA declarator)*)? SEMICOLON
    /// ```
    pub fn parse_field_declaration(&mut self) -> ParseResult<AstFieldDeclaration> {
        let specifiers = self.parse_declaration_specifiers()?;
        if specifiers.storage.is_some() {
            return Err(syntax_error("storage class in member declaration", specifiers.span));
        }
        let mut declarators = Vec::new();
        if !self.lookahead_check(&TokenType::Semicolon)? {
            declarators.push(self.parse_declarator(false)?);
            while self.take(&TokenType::Comma)?.is_some() {
                declarators.push(self.parse_declarator(false)?);
            }
        }
        let end = self.check(&TokenType::Semicolon)?;
        let node = AstFieldDeclaration {
            span: Span::from_pair(&specifiers.span, &end.span),
            ty: specifiers.ty,
            declarators,
        };
        Ok(node)
    }

    /// Parse an enum specifier.
    ///
    /// ```text
    /// enum_specifier ::= ENUM identifier? (OPEN_BRACE enumerator (COMMA enumerator)* COMMA? CLOSE_BRACE)?
    /// enumerator ::= identifier (EQUAL conditional_expr)?
    /// ```
    pub fn parse_enum_specifier(&mut self) -> ParseResult<AstEnumSpecifier> {
        let start = self.check(&TokenType::KeywordEnum)?;
        let name = self.parser_combinator_take_if(
            |t| matches!(t.ty, TokenType::Identifier(_)),
            |p| p.parse_identifier(),
        )?;
        let mut end = name.as_ref().map_or(start.span, |n| n.span);
        let enumerators = match self.take(&TokenType::OpenBrace)? {
            Some(_) => {
                let enumerators = self.parser_combinator_delimited(
                    &TokenType::Comma,
                    &TokenType::CloseBrace,
                    |p| p.parse_enumerator(),
                )?;
                end = self.check(&TokenType::CloseBrace)?.span;
                Some(enumerators)
            }
            None if name.is_none() => {
                return Err(syntax_error("expected a tag name or an enumerator list", start.span));
            }
            None => None,
        };
        let node = AstEnumSpecifier {
            span: Span::from_pair(&start.span, &end),
            name,
            enumerators,
        };
        Ok(node)
    }

    fn parse_enumerator(&mut self) -> ParseResult<AstEnumerator> {
        let name = self.parse_identifier()?;
        self.declare_name(&name, false);
        let value = match self.take(&TokenType::Equal)? {
            Some(_) => Some(self.parse_conditional_expr()?),
            None => None,
        };
        let span = match &value {
            Some(value) => Span::from_pair(&name.span, value.span()),
            None => name.span,
        };
        Ok(AstEnumerator { span, name, value })
    }

    /// Parse a declarator. Abstract declarators (without a name) are only accepted when
    /// `abstract_allowed` is set.
    ///
    /// ```text
    /// declarator ::= STAR* direct_declarator
    /// direct_declarator ::= (identifier | OPEN_PAREN declarator CLOSE_PAREN)? declarator_suffix*
    /// declarator_suffix ::= OPEN_BRACKET conditional_expr? CLOSE_BRACKET
    ///                     | OPEN_PAREN parameter_list CLOSE_PAREN
    /// ```
    pub fn parse_declarator(&mut self, abstract_allowed: bool) -> ParseResult<AstDeclarator> {
        let start = self.lookahead_or_err()?.span;
        let mut end = start;
        let mut pointers = 0;
        while let Some(star) = self.take(&TokenType::Star)? {
            pointers += 1;
            end = star.span;
            while self.take(&TokenType::KeywordConst)?.is_some()
                || self.take(&TokenType::KeywordVolatile)?.is_some()
            {}
        }

        let mut name = None;
        let mut derived = Vec::new();
        match self.lookahead_ty(0)? {
            Some(TokenType::Identifier(_)) => {
                let id = self.parse_identifier()?;
                end = id.span;
                name = Some(id);
            }
            Some(TokenType::OpenParen) if self.is_nested_declarator()? => {
                self.check(&TokenType::OpenParen)?;
                let inner = self.parse_declarator(abstract_allowed)?;
                end = self.check(&TokenType::CloseParen)?.span;
                name = inner.name;
                derived = inner.derived;
            }
            _ if abstract_allowed => {}
            _ => return Err(unexpected(self.eat()?)),
        }

        loop {
            if self.take(&TokenType::OpenBracket)?.is_some() {
                let length = self.parser_combinator_take_if(
                    |t| t.ty != TokenType::CloseBracket,
                    |p| p.parse_conditional_expr(),
                )?;
                end = self.check(&TokenType::CloseBracket)?.span;
                derived.push(AstDerivedType::Array(length.map(Box::new)));
            } else if self.lookahead_check(&TokenType::OpenParen)? {
                let parameters = self.parse_parameter_list()?;
                end = parameters.span;
                derived.push(AstDerivedType::Function(parameters));
            } else {
                break;
            }
        }
        derived.extend(std::iter::repeat(AstDerivedType::Pointer).take(pointers));
        Ok(AstDeclarator {
            span: Span::from_pair(&start, &end),
            name,
            derived,
        })
    }

    /// Decide whether an opening parenthesis at the start of a direct declarator starts a nested
    /// declarator rather than a parameter list.
    fn is_nested_declarator(&mut self) -> ParseResult<bool> {
        Ok(match self.lookahead_ty(1)? {
            Some(TokenType::Star | TokenType::OpenParen | TokenType::OpenBracket) => true,
            Some(TokenType::Identifier(name)) => !self.is_typedef_name(&name),
            _ => false,
        })
    }

    /// Parse a parameter list, including the parentheses.
    ///
    /// ```text
    /// parameter_list ::= OPEN_PAREN (VOID | parameter (COMMA parameter)* (COMMA ELLIPSIS)?)? CLOSE_PAREN
    /// parameter ::= declaration_specifiers declarator
    /// ```
    pub fn parse_parameter_list(&mut self) -> ParseResult<AstParameterList> {
        let start = self.check(&TokenType::OpenParen)?;
        if let Some(end) = self.take(&TokenType::CloseParen)? {
            return Ok(AstParameterList {
                span: Span::from_pair(&start.span, &end.span),
                parameters: vec![],
                variadic: false,
                prototype: false,
            });
        }
        if self.lookahead_check(&TokenType::KeywordVoid)?
            && self.lookahead_check_nth(1, &TokenType::CloseParen)?
        {
            self.eat()?;
            let end = self.eat()?;
            return Ok(AstParameterList {
                span: Span::from_pair(&start.span, &end.span),
                parameters: vec![],
                variadic: false,
                prototype: true,
            });
        }
        let mut parameters = Vec::new();
        let mut variadic = false;
        loop {
            if self.take(&TokenType::Ellipsis)?.is_some() {
                variadic = true;
                break;
            }
            let specifiers = self.parse_declaration_specifiers()?;
            let declarator = self.parse_declarator(true)?;
            parameters.push(AstParameter {
                span: Span::from_pair(&specifiers.span, &declarator.span),
                specifiers,
                declarator,
            });
            if self.take(&TokenType::Comma)?.is_none() {
                break;
            }
        }
        let end = self.check(&TokenType::CloseParen)?;
        Ok(AstParameterList {
            span: Span::from_pair(&start.span, &end.span),
            parameters,
            variadic,
            prototype: true,
        })
    }

    /// Parse a type name.
    ///
    /// ```text
    /// type_name ::= type_specifier abstract_declarator
    /// ```
    pub fn parse_type_name(&mut self) -> ParseResult<AstTypeName> {
        let specifiers = self.parse_declaration_specifiers()?;
        if specifiers.storage.is_some() {
            return Err(syntax_error("storage class in type name", specifiers.span));
        }
        let declarator = self.parse_declarator(true)?;
        if let Some(name) = &declarator.name {
            return Err(syntax_error("unexpected name in type name", name.span));
        }
        Ok(AstTypeName {
            span: Span::from_pair(&specifiers.span, &declarator.span),
            ty: specifiers.ty,
            declarator,
        })
    }

    /// Parse a type name that may be wrapped in any number of parentheses, as macro argument
    /// substitution can leave it.
    ///
    /// ```text
    /// enclosed_type_name ::= OPEN_PAREN enclosed_type_name CLOSE_PAREN | type_name
    /// ```
    pub fn parse_enclosed_type_name(&mut self) -> ParseResult<AstTypeName> {
        if !self.lookahead_check(&TokenType::OpenParen)? {
            return self.parse_type_name();
        }
        self.check(&TokenType::OpenParen)?;
        let ty = self.parse_enclosed_type_name()?;
        self.check(&TokenType::CloseParen)?;
        Ok(ty)
    }

    /// Parse an initializer.
    ///
    /// ```text
    /// initializer ::= assign_expr | initializer_list
    /// ```
    pub fn parse_initializer(&mut self) -> ParseResult<AstInitializer> {
        if self.lookahead_check(&TokenType::OpenBrace)? {
            return Ok(AstInitializer::List(self.parse_initializer_list()?));
        }
        Ok(AstInitializer::Expr(self.parse_assign_expr()?))
    }

    /// Parse a brace-enclosed initializer list.
    ///
    /// ```text
    /// initializer_list ::= OPEN_BRACE (initializer_item (COMMA initializer_item)* COMMA?)? CLOSE_BRACE
    /// initializer_item ::= (designator+ EQUAL)? initializer
    /// designator ::= DOT identifier | OPEN_BRACKET conditional_expr CLOSE_BRACKET
    /// ```
    pub fn parse_initializer_list(&mut self) -> ParseResult<AstInitializerList> {
        let start = self.check(&TokenType::OpenBrace)?;
        let items = self.parser_combinator_delimited(
            &TokenType::Comma,
            &TokenType::CloseBrace,
            |p| p.parse_initializer_item(),
        )?;
        let end = self.check(&TokenType::CloseBrace)?;
        Ok(AstInitializerList {
            span: Span::from_pair(&start.span, &end.span),
            items,
        })
    }

    fn parse_initializer_item(&mut self) -> ParseResult<AstInitializerItem> {
        let start = self.lookahead_or_err()?.span;
        let mut designators = Vec::new();
        loop {
            if self.take(&TokenType::Dot)?.is_some() {
                designators.push(AstDesignator::Field(self.parse_identifier()?));
            } else if self.take(&TokenType::OpenBracket)?.is_some() {
                designators.push(AstDesignator::Index(self.parse_conditional_expr()?));
                self.check(&TokenType::CloseBracket)?;
            } else {
                break;
            }
        }
        if !designators.is_empty() {
            self.check(&TokenType::Equal)?;
        }
        let value = self.parse_initializer()?;
        Ok(AstInitializerItem {
            span: Span::from_pair(&start, value.span()),
            designators,
            value,
        })
    }

    /// Parse a statement.
    ///
    /// ```text
    /// stmt ::= compound_stmt | declaration | if_stmt | while_stmt | do_while_stmt | for_stmt
    ///        | switch_stmt | case_stmt | default_stmt | break_stmt | continue_stmt
    ///        | return_stmt | goto_stmt | labeled_stmt | expr_stmt
    /// ```
    pub fn parse_stmt(&mut self) -> ParseResult<AstStmt> {
        let next = self.lookahead_or_err()?.ty.clone();
        let node = match next {
            TokenType::OpenBrace => {
                self.enter_scope();
                let block = self.parse_compound_stmt();
                self.leave_scope();
                AstStmt::Compound(block?)
            }
            TokenType::KeywordIf => AstStmt::If(self.parse_if_stmt()?),
            TokenType::KeywordWhile => AstStmt::While(self.parse_while_stmt()?),
            TokenType::KeywordDo => AstStmt::DoWhile(self.parse_do_while_stmt()?),
            TokenType::KeywordFor => {
                self.enter_scope();
                let stmt = self.parse_for_stmt();
                self.leave_scope();
                AstStmt::For(stmt?)
            }
            TokenType::KeywordSwitch => AstStmt::Switch(self.parse_switch_stmt()?),
            TokenType::KeywordCase => AstStmt::Case(self.parse_case_stmt()?),
            TokenType::KeywordDefault => AstStmt::Default(self.parse_default_stmt()?),
            TokenType::KeywordBreak => {
                let start = self.eat()?;
                let end = self.check(&TokenType::Semicolon)?;
                AstStmt::Break(AstBreakStmt {
                    span: Span::from_pair(&start.span, &end.span),
                })
            }
            TokenType::KeywordContinue => {
                let start = self.eat()?;
                let end = self.check(&TokenType::Semicolon)?;
                AstStmt::Continue(AstContinueStmt {
                    span: Span::from_pair(&start.span, &end.span),
                })
            }
            TokenType::KeywordReturn => AstStmt::Return(self.parse_return_stmt()?),
            TokenType::KeywordGoto => {
                let start = self.eat()?;
                let label = self.parse_identifier()?;
                let end = self.check(&TokenType::Semicolon)?;
                AstStmt::Goto(AstGotoStmt {
                    span: Span::from_pair(&start.span, &end.span),
                    label,
                })
            }
            TokenType::Identifier(_) if self.lookahead_check_nth(1, &TokenType::Colon)? => {
                let label = self.parse_identifier()?;
                self.check(&TokenType::Colon)?;
                let body = self.parse_stmt()?;
                AstStmt::Labeled(AstLabeledStmt {
                    span: Span::from_pair(&label.span, body.span()),
                    label,
                    body: Box::new(body),
                })
            }
            _ if self.is_declaration_start(0)? => AstStmt::Declaration(self.parse_declaration()?),
            _ => AstStmt::Expr(self.parse_expr_stmt()?),
        };
        Ok(node)
    }

    /// Parse a compound statement. The caller is responsible for the scope.
    ///
    /// ```text
    /// compound_stmt ::= OPEN_BRACE stmt* CLOSE_BRACE
    /// ```
    pub fn parse_compound_stmt(&mut self) -> ParseResult<AstCompoundStmt> {
        let start = self.check(&TokenType::OpenBrace)?;
        let items = self.parser_combinator_many(&TokenType::CloseBrace, |p| p.parse_stmt())?;
        let end = self.check(&TokenType::CloseBrace)?;
        Ok(AstCompoundStmt {
            span: Span::from_pair(&start.span, &end.span),
            items,
        })
    }

    /// Parse an if statement.
    ///
    /// ```text
    /// if_stmt ::= IF OPEN_PAREN expr CLOSE_PAREN stmt (ELSE stmt)?
    /// ```
    pub fn parse_if_stmt(&mut self) -> ParseResult<AstIfStmt> {
        let start = self.check(&TokenType::KeywordIf)?;
        self.check(&TokenType::OpenParen)?;
        let condition = self.parse_expr()?;
        self.check(&TokenType::CloseParen)?;
        let happy_path = self.parse_stmt()?;
        let unhappy_path = match self.take(&TokenType::KeywordElse)? {
            Some(_) => Some(Box::new(self.parse_stmt()?)),
            None => None,
        };
        let end = unhappy_path
            .as_ref()
            .map_or(*happy_path.span(), |stmt| *stmt.span());
        Ok(AstIfStmt {
            span: Span::from_pair(&start.span, &end),
            condition,
            happy_path: Box::new(happy_path),
            unhappy_path,
        })
    }

    /// ```text
    /// while_stmt ::= WHILE OPEN_PAREN expr CLOSE_PAREN stmt
    /// ```
    pub fn parse_while_stmt(&mut self) -> ParseResult<AstWhileStmt> {
        let start = self.check(&TokenType::KeywordWhile)?;
        self.check(&TokenType::OpenParen)?;
        let condition = self.parse_expr()?;
        self.check(&TokenType::CloseParen)?;
        let body = self.parse_stmt()?;
        Ok(AstWhileStmt {
            span: Span::from_pair(&start.span, body.span()),
            condition,
            body: Box::new(body),
        })
    }

    /// ```text
    /// do_while_stmt ::= DO stmt WHILE OPEN_PAREN expr CLOSE_PAREN SEMICOLON
    /// ```
    pub fn parse_do_while_stmt(&mut self) -> ParseResult<AstDoWhileStmt> {
        let start = self.check(&TokenType::KeywordDo)?;
        let body = self.parse_stmt()?;
        self.check(&TokenType::KeywordWhile)?;
        self.check(&TokenType::OpenParen)?;
        let condition = self.parse_expr()?;
        self.check(&TokenType::CloseParen)?;
        let end = self.check(&TokenType::Semicolon)?;
        Ok(AstDoWhileStmt {
            span: Span::from_pair(&start.span, &end.span),
            body: Box::new(body),
            condition,
        })
    }

    /// Parses a for statement.
    ///
    /// ```text
    /// for_stmt ::= FOR OPEN_PAREN (declaration | expr? SEMICOLON) expr? SEMICOLON expr? CLOSE_PAREN stmt
    /// ```
    pub fn parse_for_stmt(&mut self) -> ParseResult<AstForStmt> {
        let start = self.check(&TokenType::KeywordFor)?;
        self.check(&TokenType::OpenParen)?;
        let initializer = if self.take(&TokenType::Semicolon)?.is_some() {
            None
        } else if self.is_declaration_start(0)? {
            Some(AstForInitializer::Declaration(self.parse_declaration()?))
        } else {
            let expr = self.parse_expr()?;
            self.check(&TokenType::Semicolon)?;
            Some(AstForInitializer::Expr(expr))
        };
        let condition =
            self.parser_combinator_take_if(|t| t.ty != TokenType::Semicolon, |p| p.parse_expr())?;
        self.check(&TokenType::Semicolon)?;
        let increment =
            self.parser_combinator_take_if(|t| t.ty != TokenType::CloseParen, |p| p.parse_expr())?;
        self.check(&TokenType::CloseParen)?;
        let body = self.parse_stmt()?;
        Ok(AstForStmt {
            span: Span::from_pair(&start.span, body.span()),
            initializer,
            condition,
            increment,
            body: Box::new(body),
        })
    }

    /// ```text
    /// switch_stmt ::= SWITCH OPEN_PAREN expr CLOSE_PAREN stmt
    /// ```
    pub fn parse_switch_stmt(&mut self) -> ParseResult<AstSwitchStmt> {
        let start = self.check(&TokenType::KeywordSwitch)?;
        self.check(&TokenType::OpenParen)?;
        let value = self.parse_expr()?;
        self.check(&TokenType::CloseParen)?;
        let body = self.parse_stmt()?;
        Ok(AstSwitchStmt {
            span: Span::from_pair(&start.span, body.span()),
            value,
            body: Box::new(body),
        })
    }

    /// ```text
    /// case_stmt ::= CASE conditional_expr COLON stmt
    /// ```
    pub fn parse_case_stmt(&mut self) -> ParseResult<AstCaseStmt> {
        let start = self.check(&TokenType::KeywordCase)?;
        let value = self.parse_conditional_expr()?;
        self.check(&TokenType::Colon)?;
        let body = self.parse_stmt()?;
        Ok(AstCaseStmt {
            span: Span::from_pair(&start.span, body.span()),
            value,
            body: Box::new(body),
        })
    }

    /// ```text
    /// default_stmt ::= DEFAULT COLON stmt
    /// ```
    pub fn parse_default_stmt(&mut self) -> ParseResult<AstDefaultStmt> {
        let start = self.check(&TokenType::KeywordDefault)?;
        self.check(&TokenType::Colon)?;
        let body = self.parse_stmt()?;
        Ok(AstDefaultStmt {
            span: Span::from_pair(&start.span, body.span()),
            body: Box::new(body),
        })
    }

    /// Parses a return statement.
    ///
    /// ```text
    /// return_stmt ::= RETURN expr? SEMICOLON
    /// ```
    pub fn parse_return_stmt(&mut self) -> ParseResult<AstReturnStmt> {
        let start = self.check(&TokenType::KeywordReturn)?;
        let value =
            self.parser_combinator_take_if(|t| t.ty != TokenType::Semicolon, |p| p.parse_expr())?;
        let end = self.check(&TokenType::Semicolon)?;
        Ok(AstReturnStmt {
            span: Span::from_pair(&start.span, &end.span),
            value,
        })
    }

    /// Parse an expression statement.
    ///
    /// ```text
    /// expr_stmt ::= expr? SEMICOLON
    /// ```
    pub fn parse_expr_stmt(&mut self) -> ParseResult<AstExprStmt> {
        let start = self.lookahead_or_err()?.span;
        let expr =
            self.parser_combinator_take_if(|t| t.ty != TokenType::Semicolon, |p| p.parse_expr())?;
        let end = self.check(&TokenType::Semicolon)?;
        Ok(AstExprStmt {
            span: Span::from_pair(&start, &end.span),
            expr,
        })
    }

    /// Parse an expression, including the comma operator.
    ///
    /// ```text
    /// expr ::= assign_expr (COMMA assign_expr)*
    /// ```
    pub fn parse_expr(&mut self) -> ParseResult<AstExpr> {
        let mut lhs = self.parse_assign_expr()?;
        while self.take(&TokenType::Comma)?.is_some() {
            let rhs = self.parse_assign_expr()?;
            lhs = AstExpr::Comma(AstCommaExpr {
                span: Span::from_pair(lhs.span(), rhs.span()),
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    /// Parse an assignment expression. Assignment is right associative.
    ///
    /// ```text
    /// assign_expr ::= conditional_expr (assign_op assign_expr)?
    /// assign_op ::= EQUAL | STAR_EQUAL | SLASH_EQUAL | PERCENT_EQUAL | PLUS_EQUAL | MINUS_EQUAL
    ///             | SHIFT_LEFT_EQUAL | SHIFT_RIGHT_EQUAL | AMPERSAND_EQUAL | CARET_EQUAL | PIPE_EQUAL
    /// ```
    pub fn parse_assign_expr(&mut self) -> ParseResult<AstExpr> {
        let lhs = self.parse_conditional_expr()?;
        let op = match self.lookahead_ty(0)? {
            Some(TokenType::Equal) => None,
            Some(TokenType::StarEqual) => Some(AstBinaryOp::Mul),
            Some(TokenType::SlashEqual) => Some(AstBinaryOp::Div),
            Some(TokenType::PercentEqual) => Some(AstBinaryOp::Rem),
            Some(TokenType::PlusEqual) => Some(AstBinaryOp::Add),
            Some(TokenType::MinusEqual) => Some(AstBinaryOp::Sub),
            Some(TokenType::ShiftLeftEqual) => Some(AstBinaryOp::Shl),
            Some(TokenType::ShiftRightEqual) => Some(AstBinaryOp::Shr),
            Some(TokenType::AmpersandEqual) => Some(AstBinaryOp::BitAnd),
            Some(TokenType::CaretEqual) => Some(AstBinaryOp::BitXor),
            Some(TokenType::PipeEqual) => Some(AstBinaryOp::BitOr),
            _ => return Ok(lhs),
        };
        self.eat()?;
        let rhs = self.parse_assign_expr()?;
        Ok(AstExpr::Assign(AstAssignExpr {
            span: Span::from_pair(lhs.span(), rhs.span()),
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }))
    }

    /// Parse a conditional expression.
    ///
    /// ```text
    /// conditional_expr ::= logical_or_expr (QUESTION expr COLON conditional_expr)?
    /// ```
    pub fn parse_conditional_expr(&mut self) -> ParseResult<AstExpr> {
        let condition = self.parse_logical_or_expr()?;
        if self.take(&TokenType::Question)?.is_none() {
            return Ok(condition);
        }
        let happy_path = self.parse_expr()?;
        self.check(&TokenType::Colon)?;
        let unhappy_path = self.parse_conditional_expr()?;
        Ok(AstExpr::Conditional(AstConditionalExpr {
            span: Span::from_pair(condition.span(), unhappy_path.span()),
            condition: Box::new(condition),
            happy_path: Box::new(happy_path),
            unhappy_path: Box::new(unhappy_path),
        }))
    }

    /// Parse one left-associative binary precedence level.
    fn parse_binary_level(
        &mut self,
        operators: &[(TokenType, AstBinaryOp)],
        next: fn(&mut Self) -> ParseResult<AstExpr>,
    ) -> ParseResult<AstExpr> {
        let mut lhs = next(self)?;
        loop {
            let Some(ty) = self.lookahead_ty(0)? else {
                return Ok(lhs);
            };
            let Some((_, op)) = operators.iter().find(|(candidate, _)| *candidate == ty) else {
                return Ok(lhs);
            };
            self.eat()?;
            let rhs = next(self)?;
            lhs = AstExpr::BinaryOp(AstBinaryOpExpr {
                span: Span::from_pair(lhs.span(), rhs.span()),
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                op: *op,
            });
        }
    }

    /// ```text
    /// logical_or_expr ::= logical_and_expr (LOGICAL_OR logical_and_expr)*
    /// ```
    pub fn parse_logical_or_expr(&mut self) -> ParseResult<AstExpr> {
        self.parse_binary_level(
            &[(TokenType::LogicalOr, AstBinaryOp::Or)],
            Self::parse_logical_and_expr,
        )
    }

    /// ```text
    /// logical_and_expr ::= bit_or_expr (LOGICAL_AND bit_or_expr)*
    /// ```
    pub fn parse_logical_and_expr(&mut self) -> ParseResult<AstExpr> {
        self.parse_binary_level(
            &[(TokenType::LogicalAnd, AstBinaryOp::And)],
            Self::parse_bit_or_expr,
        )
    }

    fn parse_bit_or_expr(&mut self) -> ParseResult<AstExpr> {
        self.parse_binary_level(&[(TokenType::Pipe, AstBinaryOp::BitOr)], Self::parse_bit_xor_expr)
    }

    fn parse_bit_xor_expr(&mut self) -> ParseResult<AstExpr> {
        self.parse_binary_level(
            &[(TokenType::Caret, AstBinaryOp::BitXor)],
            Self::parse_bit_and_expr,
        )
    }

    fn parse_bit_and_expr(&mut self) -> ParseResult<AstExpr> {
        self.parse_binary_level(
            &[(TokenType::Ampersand, AstBinaryOp::BitAnd)],
            Self::parse_equality_expr,
        )
    }

    /// ```text
    /// equality_expr ::= relational_expr ((EQUAL_EQUAL | BANG_EQUAL) relational_expr)*
    /// ```
    pub fn parse_equality_expr(&mut self) -> ParseResult<AstExpr> {
        self.parse_binary_level(
            &[
                (TokenType::EqualEqual, AstBinaryOp::Eq),
                (TokenType::BangEqual, AstBinaryOp::Neq),
            ],
            Self::parse_relational_expr,
        )
    }

    /// ```text
    /// relational_expr ::= shift_expr (comparison_op shift_expr)*
    /// comparison_op ::= LESS_THAN | GREATER_THAN | LESS_THAN_EQUAL | GREATER_THAN_EQUAL
    /// ```
    pub fn parse_relational_expr(&mut self) -> ParseResult<AstExpr> {
        self.parse_binary_level(
            &[
                (TokenType::LessThan, AstBinaryOp::Lt),
                (TokenType::GreaterThan, AstBinaryOp::Gt),
                (TokenType::LessThanEqual, AstBinaryOp::Lte),
                (TokenType::GreaterThanEqual, AstBinaryOp::Gte),
            ],
            Self::parse_shift_expr,
        )
    }

    fn parse_shift_expr(&mut self) -> ParseResult<AstExpr> {
        self.parse_binary_level(
            &[
                (TokenType::ShiftLeft, AstBinaryOp::Shl),
                (TokenType::ShiftRight, AstBinaryOp::Shr),
            ],
            Self::parse_additive_expr,
        )
    }

    /// ```text
    /// additive_expr ::= multiplicative_expr ((PLUS | MINUS) multiplicative_expr)*
    /// ```
    pub fn parse_additive_expr(&mut self) -> ParseResult<AstExpr> {
        self.parse_binary_level(
            &[
                (TokenType::Plus, AstBinaryOp::Add),
                (TokenType::Minus, AstBinaryOp::Sub),
            ],
            Self::parse_multiplicative_expr,
        )
    }

    /// ```text
    /// multiplicative_expr ::= cast_expr ((STAR | SLASH | PERCENT) cast_expr)*
    /// ```
    pub fn parse_multiplicative_expr(&mut self) -> ParseResult<AstExpr> {
        self.parse_binary_level(
            &[
                (TokenType::Star, AstBinaryOp::Mul),
                (TokenType::Slash, AstBinaryOp::Div),
                (TokenType::Percent, AstBinaryOp::Rem),
            ],
            Self::parse_cast_expr,
        )
    }

    /// Parse a cast expression or a compound literal.
    ///
    /// ```text
    /// cast_expr ::= OPEN_PAREN type_name CLOSE_PAREN (cast_expr | initializer_list postfix*)
    ///             | unary_expr
    /// ```
    pub fn parse_cast_expr(&mut self) -> ParseResult<AstExpr> {
        if !(self.lookahead_check(&TokenType::OpenParen)? && self.is_type_name_start(1)?) {
            return self.parse_unary_expr();
        }
        let start = self.check(&TokenType::OpenParen)?;
        let ty = self.parse_type_name()?;
        self.check(&TokenType::CloseParen)?;
        if self.lookahead_check(&TokenType::OpenBrace)? {
            let initializer = self.parse_initializer_list()?;
            let literal = AstExpr::CompoundLiteral(AstCompoundLiteralExpr {
                span: Span::from_pair(&start.span, &initializer.span),
                ty,
                initializer,
            });
            return self.parse_postfix_suffixes(literal);
        }
        let operand = self.parse_cast_expr()?;
        Ok(AstExpr::Cast(AstCastExpr {
            span: Span::from_pair(&start.span, operand.span()),
            ty,
            operand: Box::new(operand),
        }))
    }

    /// Parse an unary expression.
    ///
    /// ```text
    /// unary_expr ::= (PLUS_PLUS | MINUS_MINUS) unary_expr
    ///              | unary_op cast_expr
    ///              | SIZEOF (OPEN_PAREN type_name CLOSE_PAREN | unary_expr)
    ///              | postfix_expr
    /// unary_op ::= AMPERSAND | STAR | PLUS | MINUS | TILDE | BANG
    /// ```
    pub fn parse_unary_expr(&mut self) -> ParseResult<AstExpr> {
        let ty = self.lookahead_or_err()?.ty.clone();
        let op = match ty {
            TokenType::PlusPlus => AstUnaryOp::PreIncrement,
            TokenType::MinusMinus => AstUnaryOp::PreDecrement,
            TokenType::Ampersand => AstUnaryOp::AddressOf,
            TokenType::Star => AstUnaryOp::Deref,
            TokenType::Plus => AstUnaryOp::Plus,
            TokenType::Minus => AstUnaryOp::Neg,
            TokenType::Tilde => AstUnaryOp::BitNot,
            TokenType::Bang => AstUnaryOp::Not,
            TokenType::KeywordSizeof => return self.parse_sizeof_expr(),
            _ => return self.parse_postfix_expr(),
        };
        let start = self.eat()?;
        let operand = match op {
            AstUnaryOp::PreIncrement | AstUnaryOp::PreDecrement => self.parse_unary_expr()?,
            _ => self.parse_cast_expr()?,
        };
        Ok(AstExpr::UnaryOp(AstUnaryOpExpr {
            span: Span::from_pair(&start.span, operand.span()),
            operand: Box::new(operand),
            op,
        }))
    }

    fn parse_sizeof_expr(&mut self) -> ParseResult<AstExpr> {
        let start = self.check(&TokenType::KeywordSizeof)?;
        if self.lookahead_check(&TokenType::OpenParen)? && self.is_type_name_start(1)? {
            self.check(&TokenType::OpenParen)?;
            let ty = self.parse_type_name()?;
            let end = self.check(&TokenType::CloseParen)?;
            return Ok(AstExpr::SizeofType(AstSizeofTypeExpr {
                span: Span::from_pair(&start.span, &end.span),
                ty,
            }));
        }
        let operand = self.parse_unary_expr()?;
        Ok(AstExpr::SizeofExpr(AstSizeofExprExpr {
            span: Span::from_pair(&start.span, operand.span()),
            operand: Box::new(operand),
        }))
    }

    /// Parse a postfix expression.
    ///
    /// ```text
    /// postfix_expr ::= primary_expr postfix*
    /// postfix ::= OPEN_BRACKET expr CLOSE_BRACKET
    ///           | OPEN_PAREN (assign_expr (COMMA assign_expr)*)? CLOSE_PAREN
    ///           | (DOT | ARROW) identifier
    ///           | PLUS_PLUS | MINUS_MINUS
    /// ```
    pub fn parse_postfix_expr(&mut self) -> ParseResult<AstExpr> {
        let primary = self.parse_primary_expr()?;
        self.parse_postfix_suffixes(primary)
    }

    fn parse_postfix_suffixes(&mut self, mut expr: AstExpr) -> ParseResult<AstExpr> {
        loop {
            let Some(ty) = self.lookahead_ty(0)? else {
                return Ok(expr);
            };
            expr = match ty {
                TokenType::OpenBracket => {
                    self.eat()?;
                    let index = self.parse_expr()?;
                    let end = self.check(&TokenType::CloseBracket)?;
                    AstExpr::BracketIndex(AstBracketIndexExpr {
                        span: Span::from_pair(expr.span(), &end.span),
                        origin: Box::new(expr),
                        index: Box::new(index),
                    })
                }
                TokenType::OpenParen => {
                    self.eat()?;
                    let arguments = self.parser_combinator_delimited(
                        &TokenType::Comma,
                        &TokenType::CloseParen,
                        |p| p.parse_assign_expr(),
                    )?;
                    let end = self.check(&TokenType::CloseParen)?;
                    AstExpr::Call(AstCallExpr {
                        span: Span::from_pair(expr.span(), &end.span),
                        callee: Box::new(expr),
                        arguments,
                    })
                }
                TokenType::Dot | TokenType::Arrow => {
                    self.eat()?;
                    let member = self.parse_identifier()?;
                    AstExpr::Member(AstMemberExpr {
                        span: Span::from_pair(expr.span(), &member.span),
                        origin: Box::new(expr),
                        member,
                        arrow: ty == TokenType::Arrow,
                    })
                }
                TokenType::PlusPlus | TokenType::MinusMinus => {
                    let end = self.eat()?;
                    let op = match ty {
                        TokenType::PlusPlus => AstUnaryOp::PostIncrement,
                        _ => AstUnaryOp::PostDecrement,
                    };
                    AstExpr::UnaryOp(AstUnaryOpExpr {
                        span: Span::from_pair(expr.span(), &end.span),
                        operand: Box::new(expr),
                        op,
                    })
                }
                _ => return Ok(expr),
            };
        }
    }

    /// Parse a primary expression.
    ///
    /// ```text
    /// primary_expr ::= identifier | builtin | INTEGER_LITERAL | FLOAT_LITERAL | CHAR_LITERAL
    ///                | STRING_LITERAL+ | OPEN_PAREN expr CLOSE_PAREN
    /// ```
    pub fn parse_primary_expr(&mut self) -> ParseResult<AstExpr> {
        let token = self.eat()?;
        let node = match token.ty {
            TokenType::Identifier(name) if name.starts_with("__builtin_") => {
                let id = AstIdentifier {
                    span: token.span,
                    name,
                };
                self.parse_builtin(id)?
            }
            TokenType::Identifier(name) => AstExpr::Identifier(AstIdentifier {
                span: token.span,
                name,
            }),
            TokenType::IntegerLiteral(value, suffix) => {
                AstExpr::IntegerLiteral(AstIntegerLiteralExpr {
                    span: token.span,
                    value,
                    suffix,
                })
            }
            TokenType::FloatLiteral(value, single) => AstExpr::FloatLiteral(AstFloatLiteralExpr {
                span: token.span,
                value,
                single,
            }),
            TokenType::CharLiteral(value) => AstExpr::CharLiteral(AstCharLiteralExpr {
                span: token.span,
                value,
            }),
            TokenType::StringLiteral(mut value) => {
                let mut span = token.span;
                while let Some(TokenType::StringLiteral(_)) = self.lookahead_ty(0)? {
                    let next = self.eat()?;
                    if let TokenType::StringLiteral(more) = next.ty {
                        value.extend(more);
                    }
                    span = Span::from_pair(&span, &next.span);
                }
                AstExpr::StringLiteral(AstStringLiteralExpr { span, value })
            }
            TokenType::OpenParen => {
                let inner = self.parse_expr()?;
                self.check(&TokenType::CloseParen)?;
                inner
            }
            _ => return Err(unexpected(token)),
        };
        Ok(node)
    }

    /// Parse a compiler builtin invocation.
    ///
    /// ```text
    /// builtin ::= "__builtin_va_start" OPEN_PAREN assign_expr CLOSE_PAREN
    ///           | "__builtin_va_arg" OPEN_PAREN assign_expr COMMA enclosed_type_name CLOSE_PAREN
    ///           | "__builtin_wasm_memory_size" OPEN_PAREN CLOSE_PAREN
    ///           | "__builtin_wasm_memory_grow" OPEN_PAREN assign_expr CLOSE_PAREN
    /// ```
    fn parse_builtin(&mut self, id: AstIdentifier) -> ParseResult<AstExpr> {
        self.check(&TokenType::OpenParen)?;
        let builtin = match id.name.as_str() {
            "__builtin_va_start" => AstBuiltin::VaStart(Box::new(self.parse_assign_expr()?)),
            "__builtin_va_arg" => {
                let list = self.parse_assign_expr()?;
                self.check(&TokenType::Comma)?;
                AstBuiltin::VaArg(Box::new(list), self.parse_enclosed_type_name()?)
            }
            "__builtin_wasm_memory_size" => AstBuiltin::MemorySize,
            "__builtin_wasm_memory_grow" => {
                AstBuiltin::MemoryGrow(Box::new(self.parse_assign_expr()?))
            }
            other => return Err(syntax_error(format!("unknown builtin '{other}'"), id.span)),
        };
        let end = self.check(&TokenType::CloseParen)?;
        Ok(AstExpr::Builtin(AstBuiltinExpr {
            span: Span::from_pair(&id.span, &end.span),
            builtin,
        }))
    }

    /// Parse an identifier.
    pub fn parse_identifier(&mut self) -> ParseResult<AstIdentifier> {
        let token = self.eat()?;
        match token.ty {
            TokenType::Identifier(name) => Ok(AstIdentifier {
                span: token.span,
                name,
            }),
            _ => Err(unexpected(token)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{
        AstBasicType, AstBinaryOp, AstBuiltin, AstDerivedType, AstDesignator, AstExpr,
        AstForInitializer, AstInitializer, AstItem, AstStmt, AstStorageClass, AstTypeSpecifier,
        AstUnaryOp,
    };
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::{ParseError, ParseResult};
    use cwasm_macros::{assert_err, assert_matches, assert_none, assert_ok, assert_some};
    use cwasm_span::Span;

    fn assert_parse<T>(
        input: &str,
        rule: impl FnOnce(&mut Parser) -> ParseResult<T>,
    ) -> ParseResult<T> {
        let mut lexer = Lexer::new(input);
        let mut p = Parser::new(&mut lexer);
        let production = rule(&mut p);
        assert_ok!(&production);
        let next = assert_ok!(p.lookahead());
        assert!(next.is_none(), "expected end of stream, got {:?}", next);
        production
    }

    #[test]
    fn test_parse_basic_type_combinations() {
        let cases = [
            ("char", AstBasicType::Char),
            ("signed char", AstBasicType::SignedChar),
            ("unsigned", AstBasicType::UnsignedInt),
            ("long unsigned int", AstBasicType::UnsignedLong),
            ("long long", AstBasicType::LongLong),
            ("const unsigned short", AstBasicType::UnsignedShort),
            ("long double", AstBasicType::Double),
            ("_Bool", AstBasicType::Bool),
        ];
        for (input, expected) in cases {
            let prod = assert_ok!(assert_parse(input, |p| p.parse_declaration_specifiers()));
            assert_matches!(prod.ty, AstTypeSpecifier::Basic(_, ty) => assert_eq!(ty, expected));
        }
    }

    #[test]
    fn test_parse_invalid_type_combination() {
        let mut lexer = Lexer::new("long char x;");
        let mut parser = Parser::new(&mut lexer);
        let err = assert_err!(parser.parse_declaration());
        assert_matches!(err, ParseError::Syntax(_));
    }

    #[test]
    fn test_parse_pointer_and_array_declarator() {
        let prod = assert_ok!(assert_parse("*a[3]", |p| p.parse_declarator(false)));
        assert_eq!(assert_some!(prod.name).name, "a");
        assert_eq!(prod.derived.len(), 2);
        assert_matches!(&prod.derived[0], AstDerivedType::Array(Some(_)));
        assert_matches!(&prod.derived[1], AstDerivedType::Pointer);
    }

    #[test]
    fn test_parse_function_pointer_declarator() {
        let prod = assert_ok!(assert_parse("(*handler)(int, char *)", |p| {
            p.parse_declarator(false)
        }));
        assert_eq!(assert_some!(prod.name).name, "handler");
        assert_matches!(&prod.derived[0], AstDerivedType::Pointer);
        let params = assert_matches!(&prod.derived[1], AstDerivedType::Function(params) => params);
        assert_eq!(params.parameters.len(), 2);
        assert!(params.prototype);
    }

    #[test]
    fn test_parse_abstract_declarator() {
        let prod = assert_ok!(assert_parse("int (*)(void)", |p| p.parse_type_name()));
        assert_none!(prod.declarator.name);
        assert_matches!(&prod.declarator.derived[0], AstDerivedType::Pointer);
        let params =
            assert_matches!(&prod.declarator.derived[1], AstDerivedType::Function(p) => p);
        assert!(params.parameters.is_empty() && params.prototype);
    }

    #[test]
    fn test_parse_variadic_prototype() {
        let prod = assert_ok!(assert_parse("int printf(const char *fmt, ...);", |p| {
            p.parse_declaration()
        }));
        let declarator = &prod.declarators[0].declarator;
        let params = assert_matches!(&declarator.derived[0], AstDerivedType::Function(p) => p);
        assert!(params.variadic);
        assert_eq!(params.parameters.len(), 1);
    }

    #[test]
    fn test_parse_old_style_empty_parameter_list() {
        let prod = assert_ok!(assert_parse("int f();", |p| p.parse_declaration()));
        let declarator = &prod.declarators[0].declarator;
        let params = assert_matches!(&declarator.derived[0], AstDerivedType::Function(p) => p);
        assert!(!params.prototype);
    }

    #[test]
    fn test_parse_struct_definition_and_initializer() {
        let prod = assert_ok!(assert_parse(
            "struct point { int x, y; } p = { .y = 2, [0] = 1, 3 };",
            |p| p.parse_declaration()
        ));
        let record = assert_matches!(&prod.specifiers.ty, AstTypeSpecifier::Record(r) => r);
        assert_eq!(assert_some!(&record.name).name, "point");
        assert_eq!(assert_some!(&record.fields).len(), 1);
        let init = assert_some!(&prod.declarators[0].initializer);
        let list = assert_matches!(init, AstInitializer::List(list) => list);
        assert_eq!(list.items.len(), 3);
        assert_matches!(&list.items[0].designators[0], AstDesignator::Field(f) => assert_eq!(f.name, "y"));
        assert_matches!(&list.items[1].designators[0], AstDesignator::Index(_));
        assert!(list.items[2].designators.is_empty());
    }

    #[test]
    fn test_parse_enum_with_trailing_comma() {
        let prod = assert_ok!(assert_parse("enum color { RED, GREEN = 4, };", |p| {
            p.parse_declaration()
        }));
        let specifier = assert_matches!(&prod.specifiers.ty, AstTypeSpecifier::Enum(e) => e);
        assert_eq!(assert_some!(&specifier.enumerators).len(), 2);
    }

    #[test]
    fn test_typedef_names_are_tracked_in_scopes() {
        let source = "typedef int T; T x; int f(void) { T y = 1; { int T = 2; T * y; } return y; }";
        let mut lexer = Lexer::new(source);
        let mut parser = Parser::new(&mut lexer);
        let unit = assert_ok!(parser.parse());
        assert_eq!(unit.items.len(), 3);
        let function = assert_matches!(&unit.items[2], AstItem::Function(f) => f);
        assert_matches!(&function.body.items[0], AstStmt::Declaration(_));
        let inner = assert_matches!(&function.body.items[1], AstStmt::Compound(c) => c);
        // With `T` shadowed by a variable, `T * y;` is a multiplication.
        let stmt = assert_matches!(&inner.items[1], AstStmt::Expr(e) => e);
        assert_matches!(
            assert_some!(&stmt.expr),
            AstExpr::BinaryOp(b) => assert_eq!(b.op, AstBinaryOp::Mul)
        );
        assert!(parser.is_typedef_name("T"));
    }

    #[test]
    fn test_parse_storage_classes() {
        let prod = assert_ok!(assert_parse("import void log(int value);", |p| {
            p.parse_declaration()
        }));
        assert_eq!(prod.specifiers.storage, Some(AstStorageClass::Import));
        let mut lexer = Lexer::new("static extern int x;");
        let mut parser = Parser::new(&mut lexer);
        assert_matches!(assert_err!(parser.parse_declaration()), ParseError::Syntax(_));
    }

    #[test]
    fn test_parse_binary_operators_are_left_associative() {
        let prod = assert_ok!(assert_parse("10 - 4 - 3", |p| p.parse_expr()));
        let outer = assert_matches!(prod, AstExpr::BinaryOp(b) => b);
        assert_eq!(outer.op, AstBinaryOp::Sub);
        assert_matches!(*outer.lhs, AstExpr::BinaryOp(_));
        assert_matches!(*outer.rhs, AstExpr::IntegerLiteral(_));
    }

    #[test]
    fn test_parse_precedence() {
        let prod = assert_ok!(assert_parse("a = b || c && d | e ^ f & g == h < i << j + k * l", |p| {
            p.parse_expr()
        }));
        let assign = assert_matches!(prod, AstExpr::Assign(a) => a);
        assert_none!(assign.op);
        let or = assert_matches!(*assign.rhs, AstExpr::BinaryOp(b) => b);
        assert_eq!(or.op, AstBinaryOp::Or);
        let and = assert_matches!(*or.rhs, AstExpr::BinaryOp(b) => b);
        assert_eq!(and.op, AstBinaryOp::And);
    }

    #[test]
    fn test_parse_conditional_and_compound_assignment() {
        let prod = assert_ok!(assert_parse("x += c ? 1 : 2", |p| p.parse_expr()));
        let assign = assert_matches!(prod, AstExpr::Assign(a) => a);
        assert_eq!(assign.op, Some(AstBinaryOp::Add));
        assert_matches!(*assign.rhs, AstExpr::Conditional(_));
    }

    #[test]
    fn test_parse_cast_sizeof_and_compound_literal() {
        let prod = assert_ok!(assert_parse("(unsigned char) x", |p| p.parse_expr()));
        assert_matches!(prod, AstExpr::Cast(_));
        let prod = assert_ok!(assert_parse("sizeof(int *)", |p| p.parse_expr()));
        assert_matches!(prod, AstExpr::SizeofType(_));
        let prod = assert_ok!(assert_parse("sizeof (x) + 1", |p| p.parse_expr()));
        assert_matches!(prod, AstExpr::BinaryOp(_));
        let prod = assert_ok!(assert_parse("(int[]){1, 2}[1]", |p| p.parse_expr()));
        let index = assert_matches!(prod, AstExpr::BracketIndex(i) => i);
        assert_matches!(*index.origin, AstExpr::CompoundLiteral(_));
    }

    #[test]
    fn test_parse_postfix_chain() {
        let prod = assert_ok!(assert_parse("a.b->c[1](2, 3)++", |p| p.parse_expr()));
        let post = assert_matches!(prod, AstExpr::UnaryOp(u) => u);
        assert_eq!(post.op, AstUnaryOp::PostIncrement);
        let call = assert_matches!(*post.operand, AstExpr::Call(c) => c);
        assert_eq!(call.arguments.len(), 2);
    }

    #[test]
    fn test_parse_builtins() {
        let prod = assert_ok!(assert_parse("__builtin_va_arg(ap, double)", |p| p.parse_expr()));
        let builtin = assert_matches!(prod, AstExpr::Builtin(b) => b);
        assert_matches!(builtin.builtin, AstBuiltin::VaArg(_, _));
        let prod = assert_ok!(assert_parse("__builtin_wasm_memory_size()", |p| p.parse_expr()));
        assert_matches!(prod, AstExpr::Builtin(_));
    }

    #[test]
    fn test_parse_va_arg_with_parenthesized_type() {
        for source in ["__builtin_va_arg(ap, (unsigned int))", "__builtin_va_arg(ap, ((char *)))"] {
            let prod = assert_ok!(assert_parse(source, |p| p.parse_expr()));
            let builtin = assert_matches!(prod, AstExpr::Builtin(b) => b);
            assert_matches!(builtin.builtin, AstBuiltin::VaArg(_, _));
        }
        assert_err!(assert_parse("__builtin_va_arg(ap, (unsigned int)", |p| p.parse_expr()));
    }

    #[test]
    fn test_parse_adjacent_strings_concatenate() {
        let prod = assert_ok!(assert_parse("\"ab\" \"cd\"", |p| p.parse_expr()));
        let string = assert_matches!(prod, AstExpr::StringLiteral(s) => s);
        assert_eq!(string.value, b"abcd");
        assert_eq!(string.span, Span::new(0..9));
    }

    #[test]
    fn test_parse_statements() {
        let source = "{ for (int i = 0; i < 3; i++) continue; do x--; while (x); \
                      switch (x) { case 1: break; default: ; } out: goto out; }";
        let prod = assert_ok!(assert_parse(source, |p| p.parse_stmt()));
        let block = assert_matches!(prod, AstStmt::Compound(c) => c);
        let for_stmt = assert_matches!(&block.items[0], AstStmt::For(f) => f);
        assert_matches!(&for_stmt.initializer, Some(AstForInitializer::Declaration(_)));
        assert_matches!(&block.items[1], AstStmt::DoWhile(_));
        assert_matches!(&block.items[2], AstStmt::Switch(_));
        let labeled = assert_matches!(&block.items[3], AstStmt::Labeled(l) => l);
        assert_eq!(labeled.label.name, "out");
        assert_matches!(&*labeled.body, AstStmt::Goto(_));
    }

    #[test]
    fn test_parse_dangling_else_binds_to_nearest_if() {
        let prod = assert_ok!(assert_parse("if (a) if (b) x; else y;", |p| p.parse_stmt()));
        let outer = assert_matches!(prod, AstStmt::If(i) => i);
        assert_none!(outer.unhappy_path);
        let inner = assert_matches!(*outer.happy_path, AstStmt::If(i) => i);
        assert_some!(inner.unhappy_path);
    }

    #[test]
    fn test_parse_unexpected_token() {
        let mut lexer = Lexer::new("int x = ;");
        let mut parser = Parser::new(&mut lexer);
        let err = assert_err!(parser.parse());
        assert_matches!(err, ParseError::UnexpectedToken(e) => assert_eq!(e.span, Span::new(8..9)));
    }

    #[test]
    fn test_parse_unexpected_end_of_file() {
        let mut lexer = Lexer::new("int main() { return 0;");
        let mut parser = Parser::new(&mut lexer);
        assert_matches!(assert_err!(parser.parse()), ParseError::UnexpectedEndOfFile(_));
    }
}
