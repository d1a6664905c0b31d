use super::*;
use crate::lexer;

fn parse_ok(src: &str) -> Ast {
    let tokens = lexer::lex(src).expect("should lex");
    parse(&tokens).expect("should parse")
}

fn parse_err(src: &str) -> Vec<ParseError> {
    let tokens = lexer::lex(src).expect("should lex");
    parse(&tokens).expect_err("should fail to parse")
}

fn first_fun(ast: &Ast) -> &FunDec {
    ast.declarations
        .iter()
        .find_map(|d| match d {
            Declaration::Fun(f) => Some(f),
            _ => None,
        })
        .expect("no function in translation unit")
}

fn body_exp(ast: &Ast) -> &Exp {
    let f = first_fun(ast);
    let body = f.body.as_ref().expect("function has no body");
    body.items
        .iter()
        .find_map(|item| match item {
            BlockItem::S(Statement::Return { exp: Some(e), .. }) => Some(e),
            _ => None,
        })
        .expect("expected a return statement")
}

#[test]
fn test_precedence() {
    let ast = parse_ok("int main(void) { return 1 * 2 - 3 * (4 + 5); }");
    let e = body_exp(&ast);
    // (1 * 2) - (3 * (4 + 5))
    let ExpKind::Binary(BinaryOp::Subtract, lhs, rhs) = &e.kind else {
        panic!("expected subtraction at the top: {e:?}");
    };
    assert!(matches!(lhs.kind, ExpKind::Binary(BinaryOp::Multiply, ..)));
    let ExpKind::Binary(BinaryOp::Multiply, _, inner) = &rhs.kind else {
        panic!("expected multiplication on the right");
    };
    assert!(matches!(inner.kind, ExpKind::Binary(BinaryOp::Add, ..)));
}

#[test]
fn test_assignment_is_right_associative() {
    let ast = parse_ok("int main(void) { int a; int b; return a = b = 1; }");
    let f = first_fun(&ast);
    let body = f.body.as_ref().unwrap();
    let Some(BlockItem::S(Statement::Return { exp: Some(e), .. })) = body.items.last() else {
        panic!("expected trailing return");
    };
    let ExpKind::Assignment { op: None, rhs, .. } = &e.kind else {
        panic!("expected assignment");
    };
    assert!(matches!(rhs.kind, ExpKind::Assignment { .. }));
}

#[test]
fn test_comma_operator_binds_loosest() {
    let ast = parse_ok("int main(void) { return 1, 2; }");
    let e = body_exp(&ast);
    assert!(matches!(e.kind, ExpKind::Comma(..)));
}

#[test]
fn test_call_arguments_are_not_comma_exps() {
    let ast = parse_ok("int f(int a, int b); int main(void) { return f(1, 2); }");
    let e = body_exp(&ast);
    let ExpKind::Call { args, .. } = &e.kind else {
        panic!("expected call");
    };
    assert_eq!(2, args.len());
}

#[test]
fn test_declarators() {
    let ast = parse_ok("int *p; int a[3]; int m[2][3]; char *names[4];");
    let types: Vec<&Type> = ast
        .declarations
        .iter()
        .map(|d| match d {
            Declaration::Var(v) => &v.var_type,
            _ => panic!("expected variables"),
        })
        .collect();
    assert_eq!(Type::pointer_to(Type::int()), *types[0]);
    assert_eq!(Type::array_of(Type::int(), Some(3)), *types[1]);
    assert_eq!(
        Type::array_of(Type::array_of(Type::int(), Some(3)), Some(2)),
        *types[2]
    );
    assert_eq!(
        Type::array_of(Type::pointer_to(Type::char_type()), Some(4)),
        *types[3]
    );
}

#[test]
fn test_function_pointer_declarator() {
    let ast = parse_ok("int (*handler)(int, int);");
    let Declaration::Var(v) = &ast.declarations[0] else {
        panic!("expected variable");
    };
    let TypeKind::Pointer(inner) = &v.var_type.kind else {
        panic!("expected pointer type");
    };
    let TypeKind::Fun(ft) = &inner.kind else {
        panic!("expected function type");
    };
    assert_eq!(2, ft.params.len());
    assert_eq!(Type::int(), *ft.return_type);
}

#[test]
fn test_variadic_prototype() {
    let ast = parse_ok("int printf(const char *fmt, ...);");
    let f = first_fun(&ast);
    assert!(f.fun_type.variadic);
    assert_eq!(1, f.fun_type.params.len());
}

#[test]
fn test_struct_definition_and_use() {
    let ast = parse_ok("struct P { int x; int y; }; int main(void) { struct P p; return p.x; }");
    let Declaration::Record(r) = &ast.declarations[0] else {
        panic!("expected struct declaration");
    };
    assert_eq!("P", r.tag);
    assert_eq!(2, r.members.as_ref().unwrap().len());
}

#[test]
fn test_enum_and_typedef() {
    let ast = parse_ok("enum Color { RED, GREEN = 5, BLUE }; typedef unsigned long size_type; size_type n;");
    let Declaration::Enum(e) = &ast.declarations[0] else {
        panic!("expected enum declaration");
    };
    assert_eq!(3, e.enumerators.len());
    let Declaration::Var(v) = &ast.declarations[2] else {
        panic!("expected variable using the typedef");
    };
    assert_eq!(TypeKind::Alias("size_type".into()), v.var_type.kind);
}

#[test]
fn test_cast_vs_parenthesized_exp() {
    let ast = parse_ok("int main(void) { long l; return (int)l; }");
    let f = first_fun(&ast);
    let body = f.body.as_ref().unwrap();
    let Some(BlockItem::S(Statement::Return { exp: Some(e), .. })) = body.items.last() else {
        panic!("expected return");
    };
    assert!(matches!(e.kind, ExpKind::Cast(..)));

    let ast = parse_ok("int main(void) { int l; return (l); }");
    let e = {
        let f = first_fun(&ast);
        match f.body.as_ref().unwrap().items.last() {
            Some(BlockItem::S(Statement::Return { exp: Some(e), .. })) => e.clone(),
            _ => panic!("expected return"),
        }
    };
    assert!(matches!(e.kind, ExpKind::Var(_)));
}

#[test]
fn test_sizeof_forms() {
    let ast = parse_ok("int main(void) { int a[4]; return sizeof(long) + sizeof a; }");
    let e = {
        let f = first_fun(&ast);
        match f.body.as_ref().unwrap().items.last() {
            Some(BlockItem::S(Statement::Return { exp: Some(e), .. })) => e.clone(),
            _ => panic!("expected return"),
        }
    };
    let ExpKind::Binary(BinaryOp::Add, lhs, rhs) = &e.kind else {
        panic!("expected addition");
    };
    assert!(matches!(lhs.kind, ExpKind::SizeofType(_)));
    assert!(matches!(rhs.kind, ExpKind::SizeofExp(_)));
}

#[test]
fn test_postfix_chain() {
    let ast = parse_ok("struct N { int v; }; int main(void) { struct N *ns; return ns[2].v; }");
    let e = body_exp(&ast);
    let ExpKind::Member { base, member, .. } = &e.kind else {
        panic!("expected member access, got {e:?}");
    };
    assert_eq!("v", member);
    assert!(matches!(base.kind, ExpKind::Subscript(..)));
}

#[test]
fn test_error_recovery_reports_multiple() {
    let errors = parse_err("int main(void) { int x = ; return 0 }\nint f(void) { return 1 +; }");
    assert!(errors.len() >= 2, "expected at least two errors: {errors:?}");
}

#[test]
fn test_unsupported_float_is_rejected() {
    let errors = parse_err("double d;");
    assert!(matches!(
        errors[0].inner,
        InnerParseError::UnsupportedType(_)
    ));
}

#[test]
fn test_array_size_folds_constant_expression() {
    let ast = parse_ok("int a[2 * 3 + 1];");
    let Declaration::Var(v) = &ast.declarations[0] else {
        panic!("expected variable");
    };
    assert_eq!(Type::array_of(Type::int(), Some(7)), v.var_type);
}
