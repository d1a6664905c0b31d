mod cursor;
mod parse_error;
#[cfg(test)]
mod parser_tests;

use crate::ast::*;
use crate::lexer::{LocatedToken, Token};
use cursor::Cursor;
pub use parse_error::{InnerParseError, ParseError, Result};

use std::collections::HashSet;

/// Binary operator precedence for the climbing loop. Postfix forms are
/// handled in `parse_postfix`; higher binds tighter.
fn get_prec(token: &Token) -> u64 {
    match token {
        Token::Asterisk | Token::FSlash | Token::Percent => 50,
        Token::Plus | Token::Hyphen => 45,
        Token::ShiftLeft | Token::ShiftRight => 40,
        Token::IsLessThan
        | Token::IsLessThanOrEqual
        | Token::IsGreaterThan
        | Token::IsGreaterThanOrEqual => 35,
        Token::IsEqual | Token::IsNotEqual => 30,
        Token::Ampersand => 25,
        Token::BitwiseXor => 20,
        Token::BitwiseOr => 15,
        Token::LogicalAnd => 10,
        Token::LogicalOr => 5,
        Token::QuestionMark => 3,
        Token::Assign => 1,
        t if t.is_compound_assign() => 1,
        Token::Comma => 0,
        _ => 0,
    }
}

/// Assignment expressions sit one level above the comma operator; argument
/// lists and initializers parse at this level so commas separate.
const ASSIGN_PREC: u64 = 1;

impl TryFrom<&Token> for BinaryOp {
    type Error = InnerParseError;
    fn try_from(value: &Token) -> std::result::Result<Self, InnerParseError> {
        match value {
            Token::Plus => Ok(Self::Add),
            Token::Hyphen => Ok(Self::Subtract),
            Token::Asterisk => Ok(Self::Multiply),
            Token::FSlash => Ok(Self::Divide),
            Token::Percent => Ok(Self::Remainder),
            Token::Ampersand => Ok(Self::BitwiseAnd),
            Token::BitwiseOr => Ok(Self::BitwiseOr),
            Token::BitwiseXor => Ok(Self::BitwiseXor),
            Token::ShiftLeft => Ok(Self::ShiftLeft),
            Token::ShiftRight => Ok(Self::ShiftRight),
            Token::IsLessThan => Ok(Self::LessThan),
            Token::IsLessThanOrEqual => Ok(Self::LessOrEqual),
            Token::IsGreaterThan => Ok(Self::GreaterThan),
            Token::IsGreaterThanOrEqual => Ok(Self::GreaterOrEqual),
            Token::IsEqual => Ok(Self::IsEqual),
            Token::IsNotEqual => Ok(Self::IsNotEqual),
            Token::LogicalAnd => Ok(Self::LogicalAnd),
            Token::LogicalOr => Ok(Self::LogicalOr),
            _ => Err(InnerParseError::UnexpectedToken(value.clone())),
        }
    }
}

/// Specifier run collapsed to a canonical tuple.
struct Specifiers {
    base: Type,
    storage: StorageClass,
    is_typedef: bool,
    /// Inline struct/union/enum definition found inside the specifiers.
    tag_dec: Option<Declaration>,
    loc: Loc,
}

/// One parsed declarator: the declared name and its full type.
struct Declarator {
    name: Identifier,
    dtype: Type,
    /// Named parameters when this is a direct function declarator.
    params: Option<Vec<Param>>,
    loc: Loc,
}

struct Parser<'a> {
    cursor: Cursor<'a>,
    typedefs: HashSet<Identifier>,
    errors: Vec<ParseError>,
}

pub fn parse(tokens: &[LocatedToken]) -> std::result::Result<Ast, Vec<ParseError>> {
    let mut parser = Parser {
        cursor: Cursor::new(tokens),
        typedefs: HashSet::new(),
        errors: Vec::new(),
    };

    let mut declarations = Vec::new();
    while !parser.cursor.at_end() {
        match parser.parse_declaration() {
            Ok(decs) => declarations.extend(decs),
            Err(err) => {
                parser.errors.push(err);
                parser.cursor.synchronize();
                // a stray closing brace would stall recovery at top level
                parser.cursor.bump_if(&Token::CloseCurly);
            }
        }
    }

    if parser.errors.is_empty() {
        Ok(Ast { declarations })
    } else {
        Err(parser.errors)
    }
}

impl Parser<'_> {
    fn is_typedef_name(&self, t: &Token) -> bool {
        matches!(t, Token::Identifier(name) if self.typedefs.contains(name))
    }

    /// Whether `t` can begin a declaration or type name here.
    fn starts_type(&self, t: &Token) -> bool {
        t.starts_specifiers() || self.is_typedef_name(t)
    }

    fn parse_identifier(&mut self) -> Result<Identifier> {
        let loc = self.cursor.get_loc();
        let next = self.cursor.next_or_error()?;
        if let Token::Identifier(name) = next {
            Ok(name.clone())
        } else {
            Err(InnerParseError::ExpectedIdentifierButGot(next.clone()).set_loc(loc))
        }
    }

    // ----- specifiers -----

    fn parse_specifiers(&mut self, allow_storage: bool) -> Result<Specifiers> {
        let loc = self.cursor.get_loc();
        let mut storage = None;
        let mut is_typedef = false;
        let mut is_const = false;
        let mut sign: Option<bool> = None;
        let mut base: Option<Type> = None;
        let mut tag_dec = None;
        let mut n_char = 0u32;
        let mut n_short = 0u32;
        let mut n_int = 0u32;
        let mut n_long = 0u32;
        let mut n_void = 0u32;

        loop {
            let Some(peek) = self.cursor.peek() else {
                break;
            };
            let tok_loc = self.cursor.get_loc();
            match peek {
                Token::Typedef => {
                    self.cursor.bump();
                    if is_typedef || storage.is_some() {
                        return Err(InnerParseError::DuplicateStorageClass.set_loc(tok_loc));
                    }
                    is_typedef = true;
                }
                t if t.is_storage_specifier() => {
                    let class = match t {
                        Token::Static => StorageClass::Static,
                        Token::Extern => StorageClass::Extern,
                        Token::Auto => StorageClass::Auto,
                        _ => StorageClass::Register,
                    };
                    self.cursor.bump();
                    if is_typedef || storage.replace(class).is_some() {
                        return Err(InnerParseError::DuplicateStorageClass.set_loc(tok_loc));
                    }
                }
                Token::Const => {
                    self.cursor.bump();
                    is_const = true;
                }
                Token::Volatile => {
                    // accepted and ignored; nothing in the backend reorders
                    self.cursor.bump();
                }
                Token::Signed | Token::Unsigned => {
                    let s = matches!(peek, Token::Signed);
                    self.cursor.bump();
                    if sign.replace(s).is_some() {
                        return Err(InnerParseError::DuplicateSignSpecifier.set_loc(tok_loc));
                    }
                }
                Token::Double | Token::Float => {
                    return Err(
                        InnerParseError::UnsupportedType("floating point".to_owned())
                            .set_loc(tok_loc),
                    );
                }
                Token::Void => {
                    self.cursor.bump();
                    n_void += 1;
                }
                Token::Char => {
                    self.cursor.bump();
                    n_char += 1;
                }
                Token::Short => {
                    self.cursor.bump();
                    n_short += 1;
                }
                Token::Int => {
                    self.cursor.bump();
                    n_int += 1;
                }
                Token::Long => {
                    self.cursor.bump();
                    n_long += 1;
                }
                Token::Struct | Token::Union => {
                    let is_union = matches!(peek, Token::Union);
                    self.cursor.bump();
                    let dec = self.parse_record_specifier(is_union, tok_loc)?;
                    let tag = dec.tag.clone();
                    if dec.members.is_some() {
                        tag_dec = Some(Declaration::Record(dec));
                    }
                    let kind = if is_union {
                        TypeKind::Union(tag)
                    } else {
                        TypeKind::Struct(tag)
                    };
                    if base.replace(Type::new(kind)).is_some() {
                        return Err(InnerParseError::InvalidTypeSpecifiers.set_loc(tok_loc));
                    }
                }
                Token::Enum => {
                    self.cursor.bump();
                    if let Some(dec) = self.parse_enum_specifier(tok_loc)? {
                        tag_dec = Some(Declaration::Enum(dec));
                    }
                    // enumerated types have int representation
                    if base.replace(Type::int()).is_some() {
                        return Err(InnerParseError::InvalidTypeSpecifiers.set_loc(tok_loc));
                    }
                }
                Token::Identifier(name)
                    if base.is_none()
                        && sign.is_none()
                        && n_char + n_short + n_int + n_long + n_void == 0
                        && self.typedefs.contains(name) =>
                {
                    // a typedef name acts as the base type, but only when
                    // no other type specifier has been seen: in `T T;` the
                    // second occurrence is the declarator
                    let aliased = Type::new(TypeKind::Alias(name.clone()));
                    self.cursor.bump();
                    base = Some(aliased);
                }
                _ => break,
            }
        }

        let storage = storage.unwrap_or(StorageClass::None);
        if !allow_storage && (is_typedef || storage != StorageClass::None) {
            return Err(InnerParseError::DuplicateStorageClass.set_loc(loc));
        }

        let keyword_count = n_void + n_char + n_short + n_int + n_long;
        let mut base = match base {
            Some(t) => {
                if keyword_count > 0 || sign.is_some() {
                    return Err(InnerParseError::InvalidTypeSpecifiers.set_loc(loc));
                }
                t
            }
            None => {
                let signed = sign.unwrap_or(true);
                match (n_void, n_char, n_short, n_int, n_long) {
                    (1, 0, 0, 0, 0) if sign.is_none() => Type::void(),
                    (0, 1, 0, 0, 0) => Type::int_of(IntKind::Char, signed),
                    (0, 0, 1, 0 | 1, 0) => Type::int_of(IntKind::Short, signed),
                    (0, 0, 0, 1, 0) => Type::int_of(IntKind::Int, signed),
                    (0, 0, 0, 0 | 1, 1) => Type::int_of(IntKind::Long, signed),
                    (0, 0, 0, 0, 0) if sign.is_some() => Type::int_of(IntKind::Int, signed),
                    (0, 0, 0, 0, 0) => {
                        return Err(InnerParseError::MissingTypeSpecifier.set_loc(loc))
                    }
                    _ => return Err(InnerParseError::InvalidTypeSpecifiers.set_loc(loc)),
                }
            }
        };
        if is_const {
            base = base.into_const();
        }

        Ok(Specifiers {
            base,
            storage,
            is_typedef,
            tag_dec,
            loc,
        })
    }

    fn parse_record_specifier(&mut self, is_union: bool, loc: Loc) -> Result<RecordDec> {
        let tag_loc = self.cursor.get_loc();
        let tag = match self.cursor.peek() {
            Some(Token::Identifier(name)) => {
                let name = name.clone();
                self.cursor.bump();
                name
            }
            _ => {
                let what = if is_union {
                    "anonymous union"
                } else {
                    "anonymous struct"
                };
                return Err(InnerParseError::UnsupportedType(what.to_owned()).set_loc(tag_loc));
            }
        };

        let members = if self.cursor.bump_if(&Token::OpenCurly) {
            Some(self.parse_member_list()?)
        } else {
            None
        };

        Ok(RecordDec {
            tag,
            is_union,
            members,
            loc,
        })
    }

    fn parse_member_list(&mut self) -> Result<Vec<MemberDec>> {
        let mut members = Vec::new();
        while !self.cursor.bump_if(&Token::CloseCurly) {
            let loc = self.cursor.get_loc();
            let peek = self.cursor.peek_or_error()?;
            if !self.starts_type(peek) {
                return Err(InnerParseError::BadMemberDeclaration(peek.clone()).set_loc(loc));
            }
            let specs = self.parse_specifiers(false)?;
            loop {
                let d = self.parse_declarator(specs.base.clone(), true)?;
                members.push(MemberDec {
                    name: d.name,
                    mtype: d.dtype,
                    loc: d.loc,
                });
                if !self.cursor.bump_if(&Token::Comma) {
                    break;
                }
            }
            self.cursor.expect(&Token::Semicolon)?;
        }
        Ok(members)
    }

    fn parse_enum_specifier(&mut self, loc: Loc) -> Result<Option<EnumDec>> {
        let tag = match self.cursor.peek() {
            Some(Token::Identifier(name)) => {
                let name = name.clone();
                self.cursor.bump();
                Some(name)
            }
            _ => None,
        };

        if !self.cursor.bump_if(&Token::OpenCurly) {
            return Ok(None);
        }

        let mut enumerators = Vec::new();
        loop {
            let eloc = self.cursor.get_loc();
            let name = self.parse_identifier()?;
            let value = if self.cursor.bump_if(&Token::Assign) {
                Some(self.parse_exp(ASSIGN_PREC)?)
            } else {
                None
            };
            enumerators.push(Enumerator {
                name,
                value,
                loc: eloc,
            });
            if !self.cursor.bump_if(&Token::Comma) {
                break;
            }
        }
        self.cursor.expect(&Token::CloseCurly)?;

        Ok(Some(EnumDec {
            tag,
            enumerators,
            loc,
        }))
    }

    // ----- declarators -----

    fn parse_pointer_stars(&mut self, mut ty: Type) -> Type {
        while self.cursor.bump_if(&Token::Asterisk) {
            ty = Type::pointer_to(ty);
            loop {
                if self.cursor.bump_if(&Token::Const) {
                    ty = ty.into_const();
                } else if self.cursor.bump_if(&Token::Volatile) {
                    // ignored
                } else {
                    break;
                }
            }
        }
        ty
    }

    fn parse_array_suffix(&mut self, mut ty: Type) -> Result<Type> {
        let mut dims = Vec::new();
        while self.cursor.bump_if(&Token::OpenBracket) {
            let loc = self.cursor.get_loc();
            if self.cursor.bump_if(&Token::CloseBracket) {
                dims.push(None);
                continue;
            }
            let exp = self.parse_exp(ASSIGN_PREC)?;
            let size = fold_const_exp(&exp)
                .filter(|n| *n > 0)
                .ok_or_else(|| InnerParseError::BadArraySize.set_loc(loc))?;
            self.cursor.expect(&Token::CloseBracket)?;
            dims.push(Some(size as u64));
        }
        for dim in dims.into_iter().rev() {
            ty = Type::array_of(ty, dim);
        }
        Ok(ty)
    }

    fn parse_declarator(&mut self, base: Type, require_name: bool) -> Result<Declarator> {
        let ty = self.parse_pointer_stars(base);
        let loc = self.cursor.get_loc();

        // one level of function-pointer declarator: (*name)(params)
        if self.cursor.peek_is(&Token::OpenParanth)
            && self.cursor.peek_nth(1) == Some(&Token::Asterisk)
        {
            self.cursor.bump();
            self.cursor.bump();
            let name = self.parse_identifier()?;
            self.cursor.expect(&Token::CloseParanth)?;
            self.cursor.expect(&Token::OpenParanth)?;
            let (params, variadic) = self.parse_params()?;
            let fun = FunType {
                params: params.into_iter().map(|p| p.ptype).collect(),
                return_type: Box::new(ty),
                variadic,
            };
            return Ok(Declarator {
                name,
                dtype: Type::pointer_to(Type::new(TypeKind::Fun(fun))),
                params: None,
                loc,
            });
        }

        let name = match self.cursor.peek() {
            Some(Token::Identifier(n)) => {
                let n = n.clone();
                self.cursor.bump();
                n
            }
            _ if require_name => {
                let got = self.cursor.peek_or_error()?.clone();
                return Err(InnerParseError::ExpectedIdentifierButGot(got).set_loc(loc));
            }
            _ => Identifier::new(),
        };

        if self.cursor.bump_if(&Token::OpenParanth) {
            let (params, variadic) = self.parse_params()?;
            let fun = FunType {
                params: params.iter().map(|p| p.ptype.clone()).collect(),
                return_type: Box::new(ty),
                variadic,
            };
            return Ok(Declarator {
                name,
                dtype: Type::new(TypeKind::Fun(fun)),
                params: Some(params),
                loc,
            });
        }

        let ty = self.parse_array_suffix(ty)?;
        Ok(Declarator {
            name,
            dtype: ty,
            params: None,
            loc,
        })
    }

    /// Parameter list after the opening parenthesis, consuming the `)`.
    fn parse_params(&mut self) -> Result<(Vec<Param>, bool)> {
        let mut params = Vec::new();
        let mut variadic = false;

        if self.cursor.bump_if(&Token::CloseParanth) {
            return Ok((params, variadic));
        }
        if self.cursor.peek_is(&Token::Void) && self.cursor.peek_nth(1) == Some(&Token::CloseParanth)
        {
            self.cursor.bump();
            self.cursor.bump();
            return Ok((params, variadic));
        }

        loop {
            if self.cursor.bump_if(&Token::Ellipsis) {
                variadic = true;
                break;
            }
            let loc = self.cursor.get_loc();
            let peek = self.cursor.peek_or_error()?;
            if !self.starts_type(peek) {
                return Err(InnerParseError::UnexpectedToken(peek.clone()).set_loc(loc));
            }
            let specs = self.parse_specifiers(false)?;
            let d = self.parse_declarator(specs.base, false)?;
            let ptype = match d.dtype.kind {
                // arrays and functions adjust to pointers in parameter position
                TypeKind::Array(elem, _) => Type::pointer_to(*elem),
                TypeKind::Fun(_) => Type::pointer_to(d.dtype),
                _ => d.dtype,
            };
            params.push(Param {
                name: d.name,
                ptype,
                loc: d.loc,
            });
            if !self.cursor.bump_if(&Token::Comma) {
                break;
            }
            if self.cursor.peek_is(&Token::CloseParanth) {
                return Err(InnerParseError::TrailingComma.set_loc(self.cursor.get_loc()));
            }
        }
        self.cursor.expect(&Token::CloseParanth)?;
        Ok((params, variadic))
    }

    /// Type name for casts and `sizeof`: specifiers plus an abstract
    /// declarator (pointers, then array dimensions).
    fn parse_type_name(&mut self) -> Result<Type> {
        let specs = self.parse_specifiers(false)?;
        let ty = self.parse_pointer_stars(specs.base);
        self.parse_array_suffix(ty)
    }

    // ----- declarations -----

    fn parse_declaration(&mut self) -> Result<Vec<Declaration>> {
        let specs = self.parse_specifiers(true)?;
        let mut result = Vec::new();
        if let Some(tag) = specs.tag_dec {
            result.push(tag);
        }

        if specs.is_typedef {
            let d = self.parse_declarator(specs.base, true)?;
            self.cursor.expect(&Token::Semicolon)?;
            self.typedefs.insert(d.name.clone());
            result.push(Declaration::Typedef(TypedefDec {
                name: d.name,
                aliased: d.dtype,
                loc: d.loc,
            }));
            return Ok(result);
        }

        if self.cursor.bump_if(&Token::Semicolon) {
            if result.is_empty() {
                // `struct tag;` forward-declares; anything else is empty
                match specs.base.kind {
                    TypeKind::Struct(tag) => result.push(Declaration::Record(RecordDec {
                        tag,
                        is_union: false,
                        members: None,
                        loc: specs.loc,
                    })),
                    TypeKind::Union(tag) => result.push(Declaration::Record(RecordDec {
                        tag,
                        is_union: true,
                        members: None,
                        loc: specs.loc,
                    })),
                    _ => {
                        return Err(
                            InnerParseError::UnexpectedToken(Token::Semicolon).set_loc(specs.loc)
                        )
                    }
                }
            }
            return Ok(result);
        }

        loop {
            let d = self.parse_declarator(specs.base.clone(), true)?;
            if let TypeKind::Fun(fun_type) = d.dtype.kind {
                let params = d.params.unwrap_or_default();
                let body = if self.cursor.peek_is(&Token::OpenCurly) {
                    for p in &params {
                        if p.name.is_empty() {
                            return Err(InnerParseError::UnnamedParameter.set_loc(p.loc));
                        }
                    }
                    Some(self.parse_block()?)
                } else {
                    None
                };
                let is_definition = body.is_some();
                result.push(Declaration::Fun(FunDec {
                    name: d.name,
                    params,
                    fun_type,
                    body,
                    storage_class: specs.storage,
                    loc: d.loc,
                }));
                if is_definition {
                    return Ok(result);
                }
            } else {
                let init = self.parse_initializer()?;
                result.push(Declaration::Var(VarDec {
                    name: d.name,
                    var_type: d.dtype,
                    init,
                    storage_class: specs.storage,
                    loc: d.loc,
                }));
            }
            if !self.cursor.bump_if(&Token::Comma) {
                break;
            }
        }
        self.cursor.expect(&Token::Semicolon)?;
        Ok(result)
    }

    fn parse_initializer(&mut self) -> Result<Option<Initializer>> {
        if !self.cursor.bump_if(&Token::Assign) {
            return Ok(None);
        }
        if self.cursor.bump_if(&Token::OpenCurly) {
            let mut elements = Vec::new();
            while !self.cursor.peek_is(&Token::CloseCurly) {
                if !elements.is_empty() {
                    self.cursor.expect(&Token::Comma)?;
                    // a trailing comma before the brace is allowed
                    if self.cursor.peek_is(&Token::CloseCurly) {
                        break;
                    }
                }
                elements.push(self.parse_exp(ASSIGN_PREC)?);
            }
            self.cursor.expect(&Token::CloseCurly)?;
            return Ok(Some(Initializer::List(elements)));
        }
        Ok(Some(Initializer::Scalar(self.parse_exp(ASSIGN_PREC)?)))
    }

    fn parse_local_declaration(&mut self) -> Result<Vec<VarDec>> {
        let specs = self.parse_specifiers(true)?;
        if specs.is_typedef || specs.tag_dec.is_some() {
            return Err(InnerParseError::LocalTagDefinition.set_loc(specs.loc));
        }

        let mut decs = Vec::new();
        loop {
            let d = self.parse_declarator(specs.base.clone(), true)?;
            if d.dtype.is_function() {
                return Err(InnerParseError::BadDeclarator.set_loc(d.loc));
            }
            let init = self.parse_initializer()?;
            decs.push(VarDec {
                name: d.name,
                var_type: d.dtype,
                init,
                storage_class: specs.storage,
                loc: d.loc,
            });
            if !self.cursor.bump_if(&Token::Comma) {
                break;
            }
        }
        self.cursor.expect(&Token::Semicolon)?;
        Ok(decs)
    }

    // ----- statements -----

    fn parse_block(&mut self) -> Result<Block> {
        self.cursor.expect(&Token::OpenCurly)?;
        let mut items = Vec::new();
        loop {
            if self.cursor.bump_if(&Token::CloseCurly) {
                break;
            }
            if self.cursor.at_end() {
                return Err(InnerParseError::UnexpectedEof.set_loc(self.cursor.get_loc()));
            }
            match self.parse_block_item() {
                Ok(its) => items.extend(its),
                Err(err) => {
                    self.errors.push(err);
                    self.cursor.synchronize();
                }
            }
        }
        Ok(Block { items })
    }

    fn parse_block_item(&mut self) -> Result<Vec<BlockItem>> {
        let peek = self.cursor.peek_or_error()?;
        if self.starts_type(peek) {
            let decs = self.parse_local_declaration()?;
            Ok(decs.into_iter().map(BlockItem::D).collect())
        } else {
            let st = self.parse_statement()?;
            Ok(vec![BlockItem::S(st)])
        }
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        let loc = self.cursor.get_loc();
        let peek = self.cursor.peek_or_error()?;
        match peek {
            Token::Goto => self.parse_goto(loc),
            Token::Case => self.parse_case(loc),
            Token::Default => self.parse_default_case(loc),
            Token::Switch => self.parse_switch(),
            Token::Continue => {
                self.cursor.bump();
                self.cursor.expect(&Token::Semicolon)?;
                Ok(Statement::Continue {
                    label: Identifier::new(),
                    loc,
                })
            }
            Token::Break => {
                self.cursor.bump();
                self.cursor.expect(&Token::Semicolon)?;
                Ok(Statement::Break {
                    label: Identifier::new(),
                    loc,
                })
            }
            Token::Return => self.parse_return(loc),
            Token::For => self.parse_for(),
            Token::Do => self.parse_dowhile(),
            Token::While => self.parse_while(),
            Token::If => self.parse_if(),
            Token::Semicolon => {
                self.cursor.bump();
                Ok(Statement::Null)
            }
            Token::OpenCurly => self.parse_block().map(Statement::Compound),
            Token::Identifier(_) if self.cursor.peek_nth(1) == Some(&Token::Colon) => {
                let name = self.parse_identifier()?;
                self.cursor.bump();
                let statement = self.parse_statement().map(Box::new)?;
                Ok(Statement::Labeled(name, statement, loc))
            }
            _ => self.parse_statement_exp(),
        }
    }

    fn parse_statement_exp(&mut self) -> Result<Statement> {
        let exp = self.parse_exp(0)?;
        self.cursor.expect(&Token::Semicolon)?;
        Ok(Statement::Exp(exp))
    }

    fn parse_goto(&mut self, loc: Loc) -> Result<Statement> {
        self.cursor.bump();
        let label = self.parse_identifier()?;
        self.cursor.expect(&Token::Semicolon)?;
        Ok(Statement::Goto { label, loc })
    }

    fn parse_return(&mut self, loc: Loc) -> Result<Statement> {
        self.cursor.bump();
        if self.cursor.bump_if(&Token::Semicolon) {
            return Ok(Statement::Return { exp: None, loc });
        }
        let exp = self.parse_exp(0)?;
        self.cursor.expect(&Token::Semicolon)?;
        Ok(Statement::Return {
            exp: Some(exp),
            loc,
        })
    }

    fn parse_if(&mut self) -> Result<Statement> {
        self.cursor.expect(&Token::If)?;
        self.cursor.expect(&Token::OpenParanth)?;
        let condition = self.parse_exp(0)?;
        self.cursor.expect(&Token::CloseParanth)?;
        let then = self.parse_statement().map(Box::new)?;
        let els = if self.cursor.bump_if(&Token::Else) {
            Some(self.parse_statement().map(Box::new)?)
        } else {
            None
        };
        Ok(Statement::If(If {
            condition,
            then,
            els,
        }))
    }

    fn parse_while(&mut self) -> Result<Statement> {
        self.cursor.expect(&Token::While)?;
        self.cursor.expect(&Token::OpenParanth)?;
        let condition = self.parse_exp(0)?;
        self.cursor.expect(&Token::CloseParanth)?;
        let body = self.parse_statement().map(Box::new)?;
        Ok(Statement::While(While {
            condition,
            body,
            label: Identifier::new(),
        }))
    }

    fn parse_dowhile(&mut self) -> Result<Statement> {
        self.cursor.expect(&Token::Do)?;
        let body = self.parse_statement().map(Box::new)?;
        self.cursor.expect(&Token::While)?;
        self.cursor.expect(&Token::OpenParanth)?;
        let condition = self.parse_exp(0)?;
        self.cursor.expect(&Token::CloseParanth)?;
        self.cursor.expect(&Token::Semicolon)?;
        Ok(Statement::DoWhile(DoWhile {
            body,
            condition,
            label: Identifier::new(),
        }))
    }

    fn parse_for(&mut self) -> Result<Statement> {
        self.cursor.expect(&Token::For)?;
        self.cursor.expect(&Token::OpenParanth)?;

        let init = {
            let peek = self.cursor.peek_or_error()?;
            if self.starts_type(peek) {
                let loc = self.cursor.get_loc();
                let mut decs = self.parse_local_declaration()?;
                if decs.len() != 1 {
                    return Err(InnerParseError::BadForInit.set_loc(loc));
                }
                ForInit::InitDecl(decs.remove(0))
            } else {
                ForInit::InitExp(self.parse_optional_exp(&Token::Semicolon)?)
            }
        };
        let condition = self.parse_optional_exp(&Token::Semicolon)?;
        let post = self.parse_optional_exp(&Token::CloseParanth)?;
        let body = self.parse_statement().map(Box::new)?;
        Ok(Statement::For(For {
            init,
            condition,
            post,
            body,
            label: Identifier::new(),
        }))
    }

    fn parse_optional_exp(&mut self, delim: &Token) -> Result<Option<Exp>> {
        if self.cursor.bump_if(delim) {
            return Ok(None);
        }
        let exp = self.parse_exp(0)?;
        self.cursor.expect(delim)?;
        Ok(Some(exp))
    }

    fn parse_switch(&mut self) -> Result<Statement> {
        self.cursor.expect(&Token::Switch)?;
        self.cursor.expect(&Token::OpenParanth)?;
        let ctrl_exp = self.parse_exp(0)?;
        self.cursor.expect(&Token::CloseParanth)?;
        let body = self.parse_statement().map(Box::new)?;
        Ok(Statement::Switch(Switch {
            ctrl_exp,
            body,
            cases: Cases::new(),
            label: Identifier::new(),
        }))
    }

    fn parse_case(&mut self, loc: Loc) -> Result<Statement> {
        self.cursor.bump();
        let exp = self.parse_exp(0)?;
        self.cursor.expect(&Token::Colon)?;
        let body = self.parse_statement().map(Box::new)?;
        Ok(Statement::Cased(CasedStatement {
            exp,
            body,
            label: Identifier::new(),
            loc,
        }))
    }

    fn parse_default_case(&mut self, loc: Loc) -> Result<Statement> {
        self.cursor.bump();
        self.cursor.expect(&Token::Colon)?;
        let body = self.parse_statement().map(Box::new)?;
        Ok(Statement::DCased(DCasedStatement {
            body,
            label: Identifier::new(),
            loc,
        }))
    }

    // ----- expressions -----

    fn parse_exp(&mut self, min_prec: u64) -> Result<Exp> {
        let mut left = self.parse_factor()?;

        while let Some(next) = self.cursor.peek().filter(|t| t.is_binaryop()) {
            let prec = get_prec(next);
            if prec < min_prec {
                break;
            }
            left = match next {
                Token::Assign => {
                    self.cursor.bump();
                    let rhs = self.parse_exp(prec)?;
                    let loc = left.loc;
                    Exp::new(
                        ExpKind::Assignment {
                            op: None,
                            lhs: Box::new(left),
                            rhs: Box::new(rhs),
                        },
                        loc,
                    )
                }
                t if t.is_compound_assign() => {
                    let single = t.compound_to_single();
                    let op = BinaryOp::try_from(&single)
                        .map_err(|e| e.set_loc(self.cursor.get_loc()))?;
                    self.cursor.bump();
                    let rhs = self.parse_exp(prec)?;
                    let loc = left.loc;
                    Exp::new(
                        ExpKind::Assignment {
                            op: Some(op),
                            lhs: Box::new(left),
                            rhs: Box::new(rhs),
                        },
                        loc,
                    )
                }
                Token::QuestionMark => {
                    self.cursor.bump();
                    let then = self.parse_exp(0)?;
                    self.cursor.expect(&Token::Colon)?;
                    let els = self.parse_exp(prec)?;
                    let loc = left.loc;
                    Exp::new(
                        ExpKind::Conditional {
                            condition: Box::new(left),
                            then: Box::new(then),
                            els: Box::new(els),
                        },
                        loc,
                    )
                }
                Token::Comma => {
                    self.cursor.bump();
                    let rhs = self.parse_exp(prec + 1)?;
                    let loc = left.loc;
                    Exp::new(ExpKind::Comma(Box::new(left), Box::new(rhs)), loc)
                }
                t => {
                    let op =
                        BinaryOp::try_from(t).map_err(|e| e.set_loc(self.cursor.get_loc()))?;
                    self.cursor.bump();
                    let rhs = self.parse_exp(prec + 1)?;
                    Exp::binary(op, left, rhs)
                }
            };
        }

        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Exp> {
        let loc = self.cursor.get_loc();
        let peek = self.cursor.peek_or_error()?;
        match peek {
            Token::Hyphen => {
                self.cursor.bump();
                Ok(Exp::unary(UnaryOp::Negate, self.parse_factor()?))
            }
            Token::Plus => {
                self.cursor.bump();
                Ok(Exp::unary(UnaryOp::Plus, self.parse_factor()?))
            }
            Token::Tilde => {
                self.cursor.bump();
                Ok(Exp::unary(UnaryOp::Complement, self.parse_factor()?))
            }
            Token::LogicalNot => {
                self.cursor.bump();
                Ok(Exp::unary(UnaryOp::LogicalNot, self.parse_factor()?))
            }
            Token::Increment => {
                self.cursor.bump();
                Ok(Exp::unary(UnaryOp::PrefixIncrement, self.parse_factor()?))
            }
            Token::Decrement => {
                self.cursor.bump();
                Ok(Exp::unary(UnaryOp::PrefixDecrement, self.parse_factor()?))
            }
            Token::Asterisk => {
                self.cursor.bump();
                let inner = self.parse_factor()?;
                Ok(Exp::new(ExpKind::Deref(Box::new(inner)), loc))
            }
            Token::Ampersand => {
                self.cursor.bump();
                let inner = self.parse_factor()?;
                Ok(Exp::new(ExpKind::AddrOf(Box::new(inner)), loc))
            }
            Token::Sizeof => self.parse_sizeof(loc),
            Token::OpenParanth => {
                if self
                    .cursor
                    .peek_nth(1)
                    .is_some_and(|t| self.starts_type(t))
                {
                    self.cursor.bump();
                    let target = self.parse_type_name()?;
                    self.cursor.expect(&Token::CloseParanth)?;
                    let inner = self.parse_factor()?;
                    Ok(Exp::new(ExpKind::Cast(target, Box::new(inner)), loc))
                } else {
                    self.parse_postfix_exp()
                }
            }
            _ => self.parse_postfix_exp(),
        }
    }

    fn parse_sizeof(&mut self, loc: Loc) -> Result<Exp> {
        self.cursor.bump();
        if self.cursor.peek_is(&Token::OpenParanth)
            && self
                .cursor
                .peek_nth(1)
                .is_some_and(|t| self.starts_type(t))
        {
            self.cursor.bump();
            let target = self.parse_type_name()?;
            self.cursor.expect(&Token::CloseParanth)?;
            return Ok(Exp::new(ExpKind::SizeofType(target), loc));
        }
        let inner = self.parse_factor()?;
        Ok(Exp::new(ExpKind::SizeofExp(Box::new(inner)), loc))
    }

    fn parse_primary(&mut self) -> Result<Exp> {
        let loc = self.cursor.get_loc();
        let peek = self.cursor.peek_or_error()?;
        match peek {
            Token::Constant(c) => {
                let c = *c;
                self.cursor.bump();
                Ok(Exp::constant(c, loc))
            }
            Token::CharConst(v) => {
                let v = *v;
                self.cursor.bump();
                Ok(Exp::constant(Const::Int(v), loc))
            }
            Token::StringConst(bytes) => {
                let bytes = bytes.clone();
                self.cursor.bump();
                Ok(Exp::new(ExpKind::StringLit { bytes, label: None }, loc))
            }
            Token::Identifier(name) => {
                let name = name.clone();
                self.cursor.bump();
                Ok(Exp::var(name, loc))
            }
            Token::OpenParanth => {
                self.cursor.bump();
                let exp = self.parse_exp(0)?;
                self.cursor.expect(&Token::CloseParanth)?;
                Ok(exp)
            }
            t => Err(InnerParseError::BadFactor(t.clone()).set_loc(loc)),
        }
    }

    fn parse_postfix_exp(&mut self) -> Result<Exp> {
        let mut exp = self.parse_primary()?;
        loop {
            let loc = exp.loc;
            match self.cursor.peek() {
                Some(Token::OpenParanth) => {
                    self.cursor.bump();
                    let args = self.parse_arguments()?;
                    exp = Exp::new(
                        ExpKind::Call {
                            callee: Box::new(exp),
                            args,
                        },
                        loc,
                    );
                }
                Some(Token::OpenBracket) => {
                    self.cursor.bump();
                    let index = self.parse_exp(0)?;
                    self.cursor.expect(&Token::CloseBracket)?;
                    exp = Exp::new(ExpKind::Subscript(Box::new(exp), Box::new(index)), loc);
                }
                Some(Token::Dot) => {
                    self.cursor.bump();
                    let member = self.parse_identifier()?;
                    exp = Exp::new(
                        ExpKind::Member {
                            base: Box::new(exp),
                            member,
                            through_pointer: false,
                        },
                        loc,
                    );
                }
                Some(Token::Arrow) => {
                    self.cursor.bump();
                    let member = self.parse_identifier()?;
                    exp = Exp::new(
                        ExpKind::Member {
                            base: Box::new(exp),
                            member,
                            through_pointer: true,
                        },
                        loc,
                    );
                }
                Some(Token::Increment) => {
                    self.cursor.bump();
                    exp = Exp::unary(UnaryOp::PostfixIncrement, exp);
                }
                Some(Token::Decrement) => {
                    self.cursor.bump();
                    exp = Exp::unary(UnaryOp::PostfixDecrement, exp);
                }
                _ => return Ok(exp),
            }
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Exp>> {
        let mut args = Vec::new();
        while !self.cursor.peek_is(&Token::CloseParanth) {
            if !args.is_empty() {
                self.cursor.expect(&Token::Comma)?;
                if self.cursor.peek_is(&Token::CloseParanth) {
                    return Err(InnerParseError::TrailingComma.set_loc(self.cursor.get_loc()));
                }
            }
            args.push(self.parse_exp(ASSIGN_PREC)?);
        }
        self.cursor.expect(&Token::CloseParanth)?;
        Ok(args)
    }
}

/// Best-effort fold of an integer constant expression made of literals.
/// Used for array sizes; enum constants in sizes are not supported.
fn fold_const_exp(exp: &Exp) -> Option<i64> {
    match &exp.kind {
        ExpKind::Constant(c) => Some(c.as_i64()),
        ExpKind::Unary(UnaryOp::Negate, e) => fold_const_exp(e).map(i64::wrapping_neg),
        ExpKind::Unary(UnaryOp::Complement, e) => fold_const_exp(e).map(|v| !v),
        ExpKind::Unary(UnaryOp::Plus, e) => fold_const_exp(e),
        ExpKind::Binary(op, lhs, rhs) => {
            let l = fold_const_exp(lhs)?;
            let r = fold_const_exp(rhs)?;
            match op {
                BinaryOp::Add => Some(l.wrapping_add(r)),
                BinaryOp::Subtract => Some(l.wrapping_sub(r)),
                BinaryOp::Multiply => Some(l.wrapping_mul(r)),
                BinaryOp::Divide if r != 0 => Some(l.wrapping_div(r)),
                BinaryOp::Remainder if r != 0 => Some(l.wrapping_rem(r)),
                BinaryOp::BitwiseAnd => Some(l & r),
                BinaryOp::BitwiseOr => Some(l | r),
                BinaryOp::BitwiseXor => Some(l ^ r),
                BinaryOp::ShiftLeft => Some(l.wrapping_shl(r as u32)),
                BinaryOp::ShiftRight => Some(l.wrapping_shr(r as u32)),
                _ => None,
            }
        }
        _ => None,
    }
}
