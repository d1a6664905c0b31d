use super::*;
use crate::ast::*;
use crate::{lexer, parser};

fn analyze(src: &str) -> Result<(Ast, Env)> {
    let tokens = lexer::lex(src).expect("should lex");
    let ast = parser::parse(&tokens).expect("should parse");
    validate(ast)
}

fn analyze_ok(src: &str) -> (Ast, Env) {
    analyze(src).expect("should validate")
}

fn analyze_err(src: &str) -> InnerSemError {
    analyze(src).expect_err("should fail validation").inner
}

#[test]
fn test_every_expression_is_typed() {
    let (ast, _) = analyze_ok(
        "int add(int a, int b) { return a + b; }\n\
         int main(void) { int x = add(1, 2); return x * 3; }",
    );
    for dec in &ast.declarations {
        let Declaration::Fun(f) = dec else { continue };
        let Some(body) = &f.body else { continue };
        for item in &body.items {
            if let BlockItem::S(Statement::Return { exp: Some(e), .. }) = item {
                assert!(e.ty.is_some(), "untyped return expression");
            }
        }
    }
}

#[test]
fn test_usual_arithmetic_conversions() {
    let (ast, _) = analyze_ok("long f(int i, long l) { return i + l; }");
    let Declaration::Fun(f) = &ast.declarations[0] else {
        panic!("expected function");
    };
    let body = f.body.as_ref().unwrap();
    let Some(BlockItem::S(Statement::Return { exp: Some(e), .. })) = body.items.last() else {
        panic!("expected return");
    };
    assert_eq!(Type::long(), *e.get_type());
}

#[test]
fn test_comparison_has_int_type() {
    let (ast, _) = analyze_ok("int f(long a, long b) { return a < b; }");
    let Declaration::Fun(f) = &ast.declarations[0] else {
        panic!()
    };
    let body = f.body.as_ref().unwrap();
    let Some(BlockItem::S(Statement::Return { exp: Some(e), .. })) = body.items.last() else {
        panic!("expected return");
    };
    let ExpKind::Binary(BinaryOp::LessThan, lhs, _) = &e.kind else {
        panic!("expected comparison");
    };
    assert_eq!(Type::int(), *e.get_type());
    assert_eq!(Type::long(), *lhs.get_type());
}

#[test]
fn test_struct_layout() {
    let (_, env) = analyze_ok("struct S { char c; int x; short s; long l; };");
    let layout = &env.layouts["S"];
    let offsets: Vec<u64> = layout.members.iter().map(|m| m.offset).collect();
    assert_eq!(vec![0, 4, 8, 16], offsets);
    assert_eq!(24, layout.size);
    assert_eq!(8, layout.align);
}

#[test]
fn test_union_layout() {
    let (_, env) = analyze_ok("union U { char c; int x; long l; };");
    let layout = &env.layouts["U"];
    assert!(layout.is_union);
    assert!(layout.members.iter().all(|m| m.offset == 0));
    assert_eq!(8, layout.size);
}

#[test]
fn test_enum_constants_registered() {
    let (_, env) = analyze_ok("enum E { A, B = 10, C };");
    assert_eq!(0, env.enum_consts["A"]);
    assert_eq!(10, env.enum_consts["B"]);
    assert_eq!(11, env.enum_consts["C"]);
}

#[test]
fn test_sizeof_folds_to_constant() {
    let (ast, _) = analyze_ok(
        "struct P { int x; int y; }; unsigned long f(void) { return sizeof(struct P); }",
    );
    let Declaration::Fun(f) = &ast.declarations[1] else {
        panic!()
    };
    let body = f.body.as_ref().unwrap();
    let Some(BlockItem::S(Statement::Return { exp: Some(e), .. })) = body.items.last() else {
        panic!("expected return");
    };
    assert_eq!(Some(Const::ULong(8)), e.get_const());
}

#[test]
fn test_array_decays_in_expressions() {
    let (ast, _) = analyze_ok("int f(void) { int a[3]; int *p = a; return p == a; }");
    let Declaration::Fun(f) = &ast.declarations[0] else {
        panic!()
    };
    let body = f.body.as_ref().unwrap();
    let Some(BlockItem::D(p_dec)) = body.items.get(1) else {
        panic!("expected declaration of p");
    };
    let Some(Initializer::Scalar(init)) = &p_dec.init else {
        panic!("expected scalar initializer");
    };
    assert_eq!(Type::pointer_to(Type::int()), *init.get_type());
}

#[test]
fn test_string_literal_interned() {
    let (_, env) = analyze_ok(
        "int puts(const char *s); int main(void) { puts(\"hi\"); puts(\"hi\"); return 0; }",
    );
    assert_eq!(1, env.string_literals().len());
    assert_eq!(b"hi".to_vec(), env.string_literals()[0].1);
}

#[test]
fn test_global_initializers() {
    let (_, env) = analyze_ok(
        "int x = 42; long big = 1l << 40; int zeroed; int arr[4] = {1, 2}; char *msg = \"m\";",
    );
    let statics = env.static_variables();
    let by_name = |n: &str| statics.iter().find(|v| v.name == n).unwrap();
    assert_eq!(
        StaticInit::Scalar {
            width: Width::B4,
            value: 42
        },
        by_name("x").init
    );
    assert_eq!(
        StaticInit::Scalar {
            width: Width::B8,
            value: 1 << 40
        },
        by_name("big").init
    );
    assert_eq!(StaticInit::Zero(4), by_name("zeroed").init);
    assert_eq!(
        StaticInit::Items(vec![
            StaticItem::Scalar {
                width: Width::B4,
                value: 1
            },
            StaticItem::Scalar {
                width: Width::B4,
                value: 2
            },
            StaticItem::Zero(8),
        ]),
        by_name("arr").init
    );
    assert!(matches!(by_name("msg").init, StaticInit::StringPtr(_)));
}

#[test]
fn test_undeclared_identifier() {
    let err = analyze_err("int main(void) { return nope; }");
    assert!(matches!(err, InnerSemError::VariableNotDeclared(_)));
}

#[test]
fn test_const_assignment_rejected() {
    let err = analyze_err("int main(void) { const int x = 1; x = 2; return x; }");
    assert!(matches!(err, InnerSemError::ConstAssignment(_)));
}

#[test]
fn test_const_through_pointer_rejected() {
    let err = analyze_err("int f(const int *p) { *p = 1; return 0; }");
    assert!(matches!(err, InnerSemError::ConstAssignment(_)));
}

#[test]
fn test_address_of_register_rejected() {
    let err = analyze_err("int main(void) { register int x = 1; int *p = &x; return *p; }");
    assert!(matches!(err, InnerSemError::AddressOfRegister(_)));
}

#[test]
fn test_static_local_rejected() {
    let err = analyze_err("int main(void) { static int x = 1; return x; }");
    assert!(matches!(err, InnerSemError::StaticLocal(_)));
}

#[test]
fn test_duplicate_case_rejected() {
    let err = analyze_err(
        "int main(void) { switch (1) { case 1: return 0; case 1: return 1; } return 2; }",
    );
    assert!(matches!(err, InnerSemError::DuplicateCase(1)));
}

#[test]
fn test_two_defaults_rejected() {
    let err = analyze_err(
        "int main(void) { switch (1) { default: return 0; default: return 1; } return 2; }",
    );
    assert!(matches!(err, InnerSemError::DuplicateDefault));
}

#[test]
fn test_goto_unknown_label() {
    let err = analyze_err("int main(void) { goto missing; return 0; }");
    assert!(matches!(err, InnerSemError::UnknownLabel(_)));
}

#[test]
fn test_break_outside_loop() {
    let err = analyze_err("int main(void) { break; return 0; }");
    assert!(matches!(err, InnerSemError::BreakOutsideOfLoop));
}

#[test]
fn test_void_object_rejected() {
    let err = analyze_err("void v; int main(void) { return 0; }");
    assert!(matches!(err, InnerSemError::VoidObject(_)));
}

#[test]
fn test_extern_with_initializer_rejected() {
    let err = analyze_err("extern int x = 1; int main(void) { return x; }");
    assert!(matches!(err, InnerSemError::InitOnExternVar(_)));
}

#[test]
fn test_call_arity_checked() {
    let err = analyze_err("int f(int a); int main(void) { return f(1, 2); }");
    assert!(matches!(err, InnerSemError::ExpectedArgsCountButGot(1, 2, _)));
}

#[test]
fn test_incompatible_redeclaration() {
    let err = analyze_err("int f(int a); long f(int a);");
    assert!(matches!(err, InnerSemError::IncompatibleFunDec(_)));
}

#[test]
fn test_unknown_member() {
    let err = analyze_err(
        "struct P { int x; }; int main(void) { struct P p; return p.y; }",
    );
    assert!(matches!(err, InnerSemError::UnknownMember(..)));
}

#[test]
fn test_fallthrough_warning() {
    let (_, env) = analyze_ok("int f(int x) { if (x) return 1; }");
    assert!(env
        .warnings
        .iter()
        .any(|w| w.message.contains("end of non-void function")));
}

#[test]
fn test_typedef_resolution() {
    let (ast, env) = analyze_ok("typedef long myint; myint g; int main(void) { return (int)g; }");
    assert_eq!(Type::long(), env.resolve(&Type::new(TypeKind::Alias("myint".into()))));
    let Declaration::Var(v) = &ast.declarations[1] else {
        panic!("expected global");
    };
    assert_eq!(8, env.size_of(&v.var_type).unwrap());
}
