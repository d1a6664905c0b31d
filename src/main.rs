use clap::Parser;
use mcc::args::Args;
use mcc::ast::Loc;
use mcc::{codegen, ir, lexer, parser, semantic_analysis};

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;
use std::process::Command;

fn report(file: &Path, loc: Loc, severity: &str, message: &dyn std::fmt::Display) {
    eprintln!("{}:{loc}: {severity}: {message}", file.display());
}

fn preprocess(input: &Path) -> Result<String> {
    let mut preprocessed = input.to_path_buf();
    preprocessed.set_extension("i");

    log::debug!("preprocessing {} with gcc -E -P", input.display());
    let status = Command::new("gcc")
        .arg("-E")
        .arg("-P")
        .arg(input)
        .arg("-o")
        .arg(&preprocessed)
        .status()
        .context("failed to spawn the preprocessor")?;
    if !status.success() {
        return Err(anyhow!("preprocessing failed"));
    }

    let source = fs::read_to_string(&preprocessed).context("cannot read preprocessed file")?;
    fs::remove_file(&preprocessed)?;
    Ok(source)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if !fs::exists(&args.input)? {
        return Err(anyhow!("file {} does not exist", args.input.display()));
    }

    let source = if args.no_preprocess {
        fs::read_to_string(&args.input).context("cannot read input file")?
    } else {
        preprocess(&args.input)?
    };

    log::debug!("lexing {} bytes", source.len());
    let tokens = match lexer::lex(&source) {
        Ok(tokens) => tokens,
        Err(err) => {
            report(&args.input, err.get_loc(), "error", &err);
            return Err(anyhow!("lexing failed"));
        }
    };
    if args.lex {
        dbg!(tokens);
        return Ok(());
    }

    log::debug!("parsing {} tokens", tokens.len());
    let ast = match parser::parse(&tokens) {
        Ok(ast) => ast,
        Err(errors) => {
            let count = errors.len();
            for err in errors {
                report(&args.input, err.get_loc(), "error", &err);
            }
            return Err(anyhow!("parsing failed with {count} errors"));
        }
    };
    if args.parse {
        dbg!(ast);
        return Ok(());
    }

    log::debug!("running semantic analysis");
    let (ast, env) = match semantic_analysis::validate(ast) {
        Ok(result) => result,
        Err(err) => {
            report(&args.input, err.get_loc(), "error", &err);
            return Err(anyhow!("semantic analysis failed"));
        }
    };
    for warning in &env.warnings {
        report(&args.input, warning.loc, "warning", &warning.message);
    }
    if args.validate {
        dbg!(ast);
        return Ok(());
    }

    log::debug!("lowering to three-address IR");
    let module = ir::lower(&ast, &env);
    if args.ir {
        dbg!(module);
        return Ok(());
    }

    log::debug!("generating assembly");
    let program = codegen::codegen(&module, &env);
    if args.codegen {
        dbg!(program);
        return Ok(());
    }

    let mut asm_file = args.input.clone();
    asm_file.set_extension("s");
    if args.no_assemble {
        if let Some(output) = &args.output {
            asm_file = output.clone();
        }
    }
    fs::write(&asm_file, program.to_string()).context("cannot write assembly file")?;
    if args.no_assemble {
        return Ok(());
    }

    // -pie is a no-op placeholder when linking
    let c_arg = if args.no_link { "-c" } else { "-pie" };
    let out_file = match &args.output {
        Some(output) => output.clone(),
        None => {
            let mut out = args.input.clone();
            out.set_extension(if args.no_link { "o" } else { "" });
            out
        }
    };

    log::debug!("assembling with gcc into {}", out_file.display());
    let status = Command::new("gcc")
        .arg(&asm_file)
        .arg(c_arg)
        .arg("-o")
        .arg(&out_file)
        .status()
        .context("failed to spawn the assembler")?;
    if !status.success() {
        return Err(anyhow!("assembling failed"));
    }
    fs::remove_file(asm_file)?;

    Ok(())
}
