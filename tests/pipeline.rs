//! End-to-end pipeline tests: C source in, assembly text out.

use mcc::{codegen, ir, lexer, parser, semantic_analysis};

fn compile(src: &str) -> String {
    let tokens = lexer::lex(src).expect("should lex");
    let ast = parser::parse(&tokens).expect("should parse");
    let (ast, env) = semantic_analysis::validate(ast).expect("should validate");
    let module = ir::lower(&ast, &env);
    codegen::codegen(&module, &env).to_string()
}

#[test]
fn empty_translation_unit_emits_only_the_stack_note() {
    let asm = compile("");
    assert_eq!("\t.section .note.GNU-stack,\"\",@progbits\n", asm);
}

#[test]
fn empty_function_gets_prologue_and_epilogue() {
    let asm = compile("int main(void) {}");
    assert!(asm.contains("\t.globl main"));
    assert!(asm.contains("main:"));
    assert!(asm.contains("pushq %rbp"));
    assert!(asm.contains("movq %rsp, %rbp"));
    assert!(asm.contains("popq %rbp"));
    assert!(asm.contains("\tret"));
    assert!(asm.ends_with(".section .note.GNU-stack,\"\",@progbits\n"));
}

#[test]
fn factorial_compiles_with_recursive_call() {
    let asm = compile(
        "int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); }\n\
         int main(void) { return fact(5); }",
    );
    assert!(asm.contains("fact:"));
    assert!(asm.contains("call fact"));
    assert!(asm.contains("imull"));
    assert!(asm.contains("call fact"));
}

#[test]
fn pointer_indexing_scales_by_element_size() {
    let asm = compile(
        "int main(void) { int a[3]; a[0] = 1; a[1] = 2; a[2] = 4; int *p = a; return p[0] + p[1] + p[2]; }",
    );
    assert!(asm.contains("imulq $4, %rcx"), "index scaling: {asm}");
    assert!(asm.contains("leaq"), "array decay takes an address: {asm}");
}

#[test]
fn struct_member_access_uses_layout_offsets() {
    let asm = compile(
        "struct P { int x; int y; };\n\
         int main(void) { struct P p; p.x = 3; p.y = 4; return p.x * p.y; }",
    );
    // y lives at offset 4; %rdi carries the computed address
    assert!(asm.contains("movl %ecx, 4(%rdi)"), "store to y: {asm}");
}

#[test]
fn switch_lowers_to_compare_chain_with_fallthrough() {
    let asm = compile(
        "int main(void) { int x = 2; int s = 0; switch (x) { case 1: s += 1; case 2: s += 2; case 3: s += 4; break; case 4: s += 100; } return s; }",
    );
    let jne_count = asm.matches("jne .L").count();
    assert!(jne_count >= 4, "one guarded jump per case: {asm}");
    assert!(asm.contains(".Lbreak_switch_label"), "break label: {asm}");
}

#[test]
fn short_circuit_guards_the_right_operand() {
    let asm = compile(
        "int n; int f(void) { n++; return 1; }\n\
         int main(void) { n = 0; if (0 && f()) {} if (1 || f()) {} return n; }",
    );
    let call_pos = asm.find("call f").expect("guarded call still emitted");
    let je_pos = asm.find("je .L").expect("guard jump");
    assert!(je_pos < call_pos, "guard must precede the call");
}

#[test]
fn unsigned_right_shift_is_logical() {
    let asm = compile(
        "int main(void) { unsigned int x = 4294967295u; return (int)(x >> 28); }",
    );
    assert!(asm.contains("shrl %cl"), "unsigned shift uses shr: {asm}");
    assert!(!asm.contains("sarl %cl"), "no arithmetic shift here: {asm}");
}

#[test]
fn signed_right_shift_is_arithmetic() {
    let asm = compile("int main(void) { int x = -16; return x >> 2; }");
    assert!(asm.contains("sarl %cl"), "signed shift uses sar: {asm}");
}

#[test]
fn signed_division_uses_cdq_idiv() {
    let asm = compile("int main(void) { int a = 7; int b = -2; return a / b; }");
    assert!(asm.contains("cdq"));
    assert!(asm.contains("idivl"));
}

#[test]
fn unsigned_division_zeroes_the_high_word() {
    let asm = compile(
        "int main(void) { unsigned int a = 7u; unsigned int b = 2u; return (int)(a / b); }",
    );
    assert!(asm.contains("movl $0, %edx"));
    assert!(asm.contains("divl"));
}

#[test]
fn stack_arguments_keep_sixteen_byte_alignment() {
    let asm = compile(
        "int f(int a, int b, int c, int d, int e, int g, int h);\n\
         int main(void) { return f(1, 2, 3, 4, 5, 6, 7); }",
    );
    // seven arguments: one stack slot plus an eight-byte pad
    assert!(asm.contains("subq $8, %rsp"), "alignment pad: {asm}");
    assert!(asm.contains("pushq"), "stack argument push: {asm}");
    assert!(asm.contains("addq $16, %rsp"), "unwind after call: {asm}");
}

#[test]
fn first_six_arguments_travel_in_registers() {
    let asm = compile(
        "int f(int a, int b, int c, int d, int e, int g);\n\
         int main(void) { return f(1, 2, 3, 4, 5, 6); }",
    );
    for reg in ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"] {
        assert!(asm.contains(reg), "argument register {reg}: {asm}");
    }
}

#[test]
fn globals_emit_into_data_and_bss() {
    let asm = compile("int initialized = 42; int zeroed; long big = 5l;");
    assert!(asm.contains("\t.data"));
    assert!(asm.contains("\t.bss"));
    assert!(asm.contains("initialized:\n\t.long 42"));
    assert!(asm.contains("zeroed:\n\t.zero 4"));
    assert!(asm.contains("big:\n\t.quad 5"));
}

#[test]
fn static_globals_are_not_exported() {
    let asm = compile("static int hidden = 1; int visible = 2;");
    assert!(!asm.contains(".globl hidden"));
    assert!(asm.contains(".globl visible"));
}

#[test]
fn string_literals_land_in_rodata() {
    let asm = compile(
        "int puts(const char *s);\n\
         int main(void) { puts(\"hello\"); return 0; }",
    );
    assert!(asm.contains("\t.section .rodata"));
    assert!(asm.contains(".string \"hello\""));
    assert!(asm.contains("leaq .Lstr0(%rip)"));
}

#[test]
fn string_pointer_global_emits_a_relocation() {
    let asm = compile("char *greeting = \"hi\";");
    assert!(asm.contains("greeting:\n\t.quad .Lstr0"), "{asm}");
}

#[test]
fn array_global_emits_a_blob_with_zero_fill() {
    let asm = compile("int table[4] = {1, 2};");
    assert!(asm.contains("table:\n\t.long 1\n\t.long 2\n\t.zero 8"), "{asm}");
}

#[test]
fn variadic_calls_zero_the_vector_count() {
    let asm = compile(
        "int printf(const char *fmt, ...);\n\
         int main(void) { printf(\"%d\", 1); return 0; }",
    );
    let call = asm.find("call printf").expect("call emitted");
    let zero = asm.find("movl $0, %eax").expect("vector count zeroed");
    assert!(zero < call);
}

#[test]
fn function_pointer_calls_are_indirect() {
    let asm = compile(
        "int add(int a, int b) { return a + b; }\n\
         int main(void) { int (*op)(int, int) = add; return op(1, 2); }",
    );
    assert!(asm.contains("call *%r10"), "indirect call: {asm}");
    assert!(asm.contains("leaq add(%rip)"), "function address: {asm}");
}

#[test]
fn every_emitted_label_is_unique() {
    let asm = compile(
        "int collatz(int n) { int steps = 0; while (n != 1) { if (n % 2 == 0) { n = n / 2; } else { n = 3 * n + 1; } steps++; } return steps; }\n\
         int main(void) { int i; int total = 0; for (i = 1; i < 7; i++) { switch (i % 3) { case 0: total += collatz(i); break; case 1: total++; break; default: total--; } } return total; }",
    );
    let mut seen = std::collections::HashSet::new();
    for line in asm.lines() {
        let trimmed = line.trim();
        if let Some(label) = trimmed.strip_suffix(':') {
            if label.starts_with(".L") {
                assert!(seen.insert(label.to_owned()), "label {label} defined twice");
            }
        }
    }
}

#[test]
fn chars_compare_after_sign_extension() {
    let asm = compile(
        "int main(void) { char c = (char)200; if (c > 127) return 1; return 0; }",
    );
    assert!(asm.contains("movsbl"), "char loads sign-extend: {asm}");
}

#[test]
fn comma_operator_keeps_the_last_value() {
    let asm = compile("int main(void) { int a = 0; return (a = 5, a + 1); }");
    assert!(asm.contains("main:"));
}

#[test]
fn do_while_and_goto_compile() {
    let asm = compile(
        "int main(void) { int i = 0; do { i++; if (i == 3) goto out; } while (i < 10); out: return i; }",
    );
    assert!(asm.contains(".Lmain.out:"), "goto label: {asm}");
    assert!(asm.contains("jmp .Lmain.out"), "goto jump: {asm}");
}
