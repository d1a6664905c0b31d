/*!
A compiler for a practical subset of C89 targeting x86-64 System V assembly.

The pipeline is a straight line of five phases, each consuming the previous
phase's output:

1. **Lexing**: [`lexer::lex`] turns preprocessed source text into a token
   stream with line/column positions. Malformed tokens produce a
   [`LexError`](lexer::LexError) at the offending position.
2. **Parsing**: [`parser::parse`] builds the AST by recursive descent with
   precedence climbing for expressions. Syntax errors are recovered at the
   next `;` or `}` so several can be reported per run; any error means no
   AST is produced.
3. **Validation**: [`semantic_analysis::validate`] runs name resolution,
   loop labeling, case collection, goto checking and type checking, and
   returns the typed AST together with an [`Env`](semantic_analysis::Env)
   holding symbols, struct/union layouts, enum constants, the string-literal
   table and global initializers.
4. **Lowering**: [`ir::lower`] produces a three-address [`Module`](ir::Module)
   with one instruction list and frame layout per defined function. From this
   point on any failure is a compiler bug and panics.
5. **Code generation**: [`codegen::codegen`] selects x86-64 instructions
   into an assembly AST whose [`Display`](std::fmt::Display) impl (the
   [`emission`] module) renders the final GAS/AT&T `.s` text.

The driver binary preprocesses with the system `gcc -E -P`, writes the `.s`
file, and hands it to `gcc` for assembling and linking.

Floating point, VLAs, bit-fields and designated initializers are out of
scope. The supported subset covers the integer types (`char`, `short`,
`int`, `long`, signed and unsigned), pointers, arrays, structs, unions,
enums, typedefs, `sizeof`, string and character literals, the full
statement set including `switch` with fallthrough and `goto`, and calls
into the platform libc, variadic prototypes included.
*/

#![deny(unused_must_use)]
#![warn(clippy::pedantic)]
#![allow(clippy::wildcard_imports)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod args;
pub mod ast;
pub mod codegen;
pub mod emission;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod semantic_analysis;
