use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use nub::ast::{Module, Program};
use nub::codegen::IndexBase;
use nub::{CompileOptions, DumpFlags, Target};
use serde_binary::binary_stream::Endian;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Emit {
    /// NASM x86-64 assembly
    Asm,
    /// block based SSA text
    Ir,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Base {
    #[value(name = "0")]
    Zero,
    #[value(name = "1")]
    One,
}

/// Compiles serialized nub module trees to assembly or IR text.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// serde-binary encoded module lists, flattened in order
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    #[arg(short, long)]
    output: PathBuf,

    #[arg(long, value_enum, default_value = "asm")]
    target: Emit,

    #[arg(long, value_enum, default_value = "0")]
    index_base: Base,

    /// also write the typed tree to `<output>.typed`
    #[arg(long)]
    dump_typed: bool,

    /// also write the symbol table to `<output>.symbols`
    #[arg(long)]
    dump_symbols: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut modules = Vec::new();
    for input in &cli.inputs {
        modules.extend(read_modules(input)?);
    }
    let program = Program::new(modules);

    let mut dump = DumpFlags::empty();
    dump.set(DumpFlags::TYPED_AST, cli.dump_typed);
    dump.set(DumpFlags::SYMBOLS, cli.dump_symbols);
    let options = CompileOptions {
        target: match cli.target {
            Emit::Asm => Target::Asm,
            Emit::Ir => Target::Ir,
        },
        index_base: match cli.index_base {
            Base::Zero => IndexBase::Zero,
            Base::One => IndexBase::One,
        },
        dump,
    };

    let artifact = nub::compile(&program, &options).context("compilation failed")?;

    write_file(&cli.output, &artifact.output)?;
    if let Some(typed) = &artifact.dumps.typed_ast {
        write_file(&with_suffix(&cli.output, "typed"), typed)?;
    }
    if let Some(symbols) = &artifact.dumps.symbols {
        write_file(&with_suffix(&cli.output, "symbols"), symbols)?;
    }
    Ok(())
}

fn read_modules(path: &Path) -> Result<Vec<Module>> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_binary::from_vec(bytes, Endian::Little)
        .with_context(|| format!("failed to decode module list in {}", path.display()))
}

// `out.s` -> `out.s.typed`
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}, {} bytes", path.display(), contents.len());
    Ok(())
}
