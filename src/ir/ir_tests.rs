use super::*;
use crate::semantic_analysis::Env;
use crate::{lexer, parser, semantic_analysis};

fn lower_src(src: &str) -> (Module, Env) {
    let tokens = lexer::lex(src).expect("should lex");
    let ast = parser::parse(&tokens).expect("should parse");
    let (ast, env) = semantic_analysis::validate(ast).expect("should validate");
    let module = lower(&ast, &env);
    (module, env)
}

fn main_body(module: &Module) -> &Instructions {
    &module
        .functions
        .iter()
        .find(|f| f.name == "main")
        .expect("no main function")
        .body
}

#[test]
fn test_constant_folding_reduces_literals() {
    let (module, _) = lower_src("int main(void) { return 2 * 3 + 10 / 2; }");
    let body = main_body(&module);
    assert!(
        body.iter()
            .all(|i| !matches!(i, Instruction::Binary { .. })),
        "literal arithmetic should fold away: {body:?}"
    );
    assert!(body
        .iter()
        .any(|i| matches!(i, Instruction::Ret(Some((Value::Imm(11), _))))));
}

#[test]
fn test_unsigned_shift_folds_logically() {
    let (module, _) = lower_src("int main(void) { return (int)(0xFFFFFFFFu >> 28); }");
    let body = main_body(&module);
    assert!(body
        .iter()
        .any(|i| matches!(i, Instruction::Ret(Some((Value::Imm(15), _))))));
}

#[test]
fn test_short_circuit_and_lowers_to_jumps() {
    let (module, _) = lower_src("int f(void); int main(void) { return 0 && f(); }");
    let body = main_body(&module);
    let jz = body
        .iter()
        .filter(|i| matches!(i, Instruction::JumpIfZero { .. }))
        .count();
    assert!(jz >= 1, "expected a jump-if-zero chain: {body:?}");
    // the right operand call must be guarded, not emitted before the jump
    let first_jz = body
        .iter()
        .position(|i| matches!(i, Instruction::JumpIfZero { .. }))
        .unwrap();
    let first_call = body
        .iter()
        .position(|i| matches!(i, Instruction::Call { .. }));
    if let Some(call) = first_call {
        assert!(first_jz < call, "call must come after the guard");
    }
}

#[test]
fn test_while_loop_shape() {
    let (module, _) = lower_src("int main(void) { int i = 0; while (i < 10) i = i + 1; return i; }");
    let body = main_body(&module);
    let labels: Vec<&str> = body
        .iter()
        .filter_map(|i| match i {
            Instruction::Label(l) => Some(l.as_str()),
            _ => None,
        })
        .collect();
    assert!(labels.iter().any(|l| l.starts_with("continue_")));
    assert!(labels.iter().any(|l| l.starts_with("break_")));
}

#[test]
fn test_switch_lowers_to_compare_chain() {
    let (module, _) = lower_src(
        "int main(void) { int x = 2; switch (x) { case 1: return 1; case 2: return 2; default: return 9; } }",
    );
    let body = main_body(&module);
    let eq_count = body
        .iter()
        .filter(|i| {
            matches!(
                i,
                Instruction::Binary {
                    op: IrBinaryOp::Eq,
                    ..
                }
            )
        })
        .count();
    assert_eq!(2, eq_count, "one compare per case: {body:?}");
    assert!(body.iter().any(
        |i| matches!(i, Instruction::Jump(l) if l.starts_with("case_default_"))
    ));
}

#[test]
fn test_call_params_in_source_order() {
    let (module, _) = lower_src(
        "int f(int a, int b, int c); int main(void) { return f(1, 2, 3); }",
    );
    let body = main_body(&module);
    let params: Vec<&Value> = body
        .iter()
        .filter_map(|i| match i {
            Instruction::Param(v) => Some(v),
            _ => None,
        })
        .collect();
    assert_eq!(
        vec![&Value::Imm(1), &Value::Imm(2), &Value::Imm(3)],
        params
    );
    assert!(body.iter().any(|i| matches!(
        i,
        Instruction::Call {
            target: CallTarget::Direct(name),
            args: 3,
            ..
        } if name == "f"
    )));
}

#[test]
fn test_subscript_uses_indexed_access() {
    let (module, _) = lower_src(
        "int main(void) { int a[3]; a[0] = 1; int *p = a; return p[0]; }",
    );
    let body = main_body(&module);
    assert!(body
        .iter()
        .any(|i| matches!(i, Instruction::StoreIndex { elem_size: 4, .. })));
    assert!(body
        .iter()
        .any(|i| matches!(i, Instruction::LoadIndex { elem_size: 4, .. })));
    assert!(body.iter().any(|i| matches!(i, Instruction::Lea { .. })));
}

#[test]
fn test_member_access_uses_offsets() {
    let (module, _) = lower_src(
        "struct P { int x; int y; }; int main(void) { struct P p; p.y = 4; return p.y; }",
    );
    let body = main_body(&module);
    assert!(body
        .iter()
        .any(|i| matches!(i, Instruction::StoreMember { offset: 4, .. })));
    assert!(body
        .iter()
        .any(|i| matches!(i, Instruction::LoadMember { offset: 4, .. })));
}

#[test]
fn test_pointer_arithmetic_scales() {
    let (module, _) = lower_src("long f(long *p) { return *(p + 2); }");
    let f = &module.functions[0];
    assert!(f.body.iter().any(|i| matches!(
        i,
        Instruction::Binary {
            op: IrBinaryOp::Add,
            width: Width::B8,
            ..
        }
    )));
    // index 2 scaled by sizeof(long) folds to 16
    assert!(f.body.iter().any(|i| matches!(
        i,
        Instruction::Binary {
            rhs: Value::Imm(16),
            ..
        }
    )));
}

#[test]
fn test_frame_slots_are_assigned() {
    let (module, _) = lower_src("int main(void) { int a; long b; char c; a = 1; b = 2; c = 3; return a; }");
    let f = &module.functions[0];
    assert!(f.frame_size % 16 == 0, "frame is 16-byte aligned");
    let a = f.var_slot(&slot_name(f, "a")).expect("slot for a");
    let b = f.var_slot(&slot_name(f, "b")).expect("slot for b");
    assert_ne!(a, b, "distinct locals get distinct slots");
}

fn slot_name(f: &Function, base: &str) -> String {
    // locals are renamed to `name.N` during validation
    f.body
        .iter()
        .find_map(|i| match i {
            Instruction::Mov {
                dst: Value::Var(name),
                ..
            } if name.starts_with(&format!("{base}.")) => Some(name.clone()),
            _ => None,
        })
        .unwrap_or_else(|| base.to_owned())
}

#[test]
fn test_goto_labels_are_function_scoped() {
    let (module, _) = lower_src(
        "int main(void) { goto done; done: return 0; }",
    );
    let body = main_body(&module);
    assert!(body
        .iter()
        .any(|i| matches!(i, Instruction::Jump(l) if l == "main.done")));
    assert!(body
        .iter()
        .any(|i| matches!(i, Instruction::Label(l) if l == "main.done")));
}

#[test]
fn test_char_reads_sign_extend() {
    let (module, _) = lower_src("int f(char c) { return c; }");
    let f = &module.functions[0];
    assert!(f.body.iter().any(|i| matches!(
        i,
        Instruction::Unary {
            op: IrUnaryOp::SignExtend(Width::B1),
            ..
        }
    )));
}

#[test]
fn test_every_label_defined_once() {
    let (module, _) = lower_src(
        "int main(void) { int i; for (i = 0; i < 3; i = i + 1) { if (i == 1) continue; if (i == 2) break; } switch (i) { case 0: i = 1; break; default: i = 2; } return i; }",
    );
    let body = main_body(&module);
    let mut seen = std::collections::HashSet::new();
    for inst in body {
        if let Instruction::Label(l) = inst {
            assert!(seen.insert(l.clone()), "label {l} defined twice");
        }
    }
    // every jump target must be defined
    for inst in body {
        let target = match inst {
            Instruction::Jump(t)
            | Instruction::JumpIfZero { target: t, .. }
            | Instruction::JumpIfNotZero { target: t, .. } => t,
            _ => continue,
        };
        assert!(seen.contains(target), "jump to undefined label {target}");
    }
}
