use clap::Parser;
use std::path::PathBuf;

/// Command-line interface of the compiler driver.
#[derive(Parser, Debug)]
#[command(name = "mcc", about = "A C89-subset compiler targeting x86-64 System V", version)]
pub struct Args {
    /// Input C source file
    pub input: PathBuf,

    /// Output file; defaults to a path derived from the input
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Stop after lexing and dump the token stream
    #[arg(long)]
    pub lex: bool,

    /// Stop after parsing and dump the AST
    #[arg(long)]
    pub parse: bool,

    /// Stop after semantic analysis and dump the typed AST
    #[arg(long)]
    pub validate: bool,

    /// Stop after lowering and dump the three-address IR
    #[arg(long)]
    pub ir: bool,

    /// Stop after code generation and dump the assembly AST
    #[arg(long)]
    pub codegen: bool,

    /// Compile only; do not assemble or link (emit a .s file)
    #[arg(short = 'S', long)]
    pub no_assemble: bool,

    /// Compile and assemble, but do not link (emit a .o file)
    #[arg(short = 'c', long)]
    pub no_link: bool,

    /// Treat the input as already preprocessed
    #[arg(long)]
    pub no_preprocess: bool,
}
