use super::*;

fn kinds(input: &str) -> Vec<Token> {
    lex(input)
        .expect("should lex")
        .into_iter()
        .map(Token::from)
        .collect()
}

#[test]
fn test_basic_function() {
    let tokens = kinds("int main(void) {}");
    let expected = vec![
        Token::Int,
        Token::Identifier(String::from("main")),
        Token::OpenParanth,
        Token::Void,
        Token::CloseParanth,
        Token::OpenCurly,
        Token::CloseCurly,
    ];
    assert_eq!(expected, tokens);
}

#[test]
fn test_operators_longest_match() {
    let tokens = kinds("a <<= b << c <= d < e");
    let expected = vec![
        Token::Identifier("a".into()),
        Token::AssignShl,
        Token::Identifier("b".into()),
        Token::ShiftLeft,
        Token::Identifier("c".into()),
        Token::IsLessThanOrEqual,
        Token::Identifier("d".into()),
        Token::IsLessThan,
        Token::Identifier("e".into()),
    ];
    assert_eq!(expected, tokens);
}

#[test]
fn test_arrow_and_ellipsis() {
    let tokens = kinds("p->x, ...");
    let expected = vec![
        Token::Identifier("p".into()),
        Token::Arrow,
        Token::Identifier("x".into()),
        Token::Comma,
        Token::Ellipsis,
    ];
    assert_eq!(expected, tokens);
}

#[test]
fn test_integer_bases_and_suffixes() {
    use crate::ast::Const;
    let tokens = kinds("123 0x1A 010 7u 7l 7ul 7LU");
    let expected = vec![
        Token::Constant(Const::Int(123)),
        Token::Constant(Const::Int(26)),
        Token::Constant(Const::Int(8)),
        Token::Constant(Const::UInt(7)),
        Token::Constant(Const::Long(7)),
        Token::Constant(Const::ULong(7)),
        Token::Constant(Const::ULong(7)),
    ];
    assert_eq!(expected, tokens);
}

#[test]
fn test_large_decimal_is_long() {
    use crate::ast::Const;
    let tokens = kinds("2147483648");
    assert_eq!(vec![Token::Constant(Const::Long(2_147_483_648))], tokens);
}

#[test]
fn test_char_literals() {
    let tokens = kinds(r"'a' '\n' '\0' '\x41' '\101'");
    let expected = vec![
        Token::CharConst(97),
        Token::CharConst(10),
        Token::CharConst(0),
        Token::CharConst(65),
        Token::CharConst(65),
    ];
    assert_eq!(expected, tokens);
}

#[test]
fn test_string_escapes() {
    let tokens = kinds(r#""hi\n\t\"q\"""#);
    assert_eq!(
        vec![Token::StringConst(b"hi\n\t\"q\"".to_vec())],
        tokens
    );
}

#[test]
fn test_comments_and_hash_lines_skipped() {
    let tokens = kinds("# 1 \"t.c\"\nint x; // trailing\n/* block\n comment */ int y;");
    let expected = vec![
        Token::Int,
        Token::Identifier("x".into()),
        Token::Semicolon,
        Token::Int,
        Token::Identifier("y".into()),
        Token::Semicolon,
    ];
    assert_eq!(expected, tokens);
}

#[test]
fn test_positions() {
    let tokens = lex("int\n  x;").expect("should lex");
    let locs: Vec<(u32, u32)> = tokens
        .iter()
        .map(|t| (t.get_loc().line, t.get_loc().column))
        .collect();
    assert_eq!(vec![(1, 1), (2, 3), (2, 4)], locs);
}

#[test]
fn test_stray_character() {
    let err = lex("int x = 1 @ 2;").expect_err("should fail");
    assert_eq!(InnerLexError::UnexpectedChar('@'), err.inner);
    assert_eq!(1, err.get_loc().line);
    assert_eq!(11, err.get_loc().column);
}

#[test]
fn test_unterminated_comment() {
    let err = lex("int x; /* no end").expect_err("should fail");
    assert_eq!(InnerLexError::UnterminatedComment, err.inner);
}

#[test]
fn test_unterminated_string() {
    let err = lex("char *s = \"oops;\n").expect_err("should fail");
    assert_eq!(InnerLexError::UnterminatedString, err.inner);
}

#[test]
fn test_bad_suffix() {
    let err = lex("return 1foo;").expect_err("should fail");
    assert_eq!(InnerLexError::BadConstantSuffix('f'), err.inner);
}

#[test]
fn test_overlong_char() {
    let err = lex("int c = 'ab';").expect_err("should fail");
    assert_eq!(InnerLexError::OverlongChar, err.inner);
}
