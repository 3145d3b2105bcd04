//! CLI wrapper around the compiler driver.

pub mod args;
pub mod output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use args::{Command, HqlArgs};

use crate::ast::printer;
use crate::compiler::{self, CompilerOptions};
use crate::errors::HqlError;

pub fn run(cli: HqlArgs) -> ExitCode {
    let options = CompilerOptions {
        verbose: cli.verbose,
        show_timing: cli.timing,
        ..Default::default()
    };
    let result = match cli.command {
        Command::Compile {
            file,
            out,
            no_source_map,
            print,
        } => run_compile(&file, out, no_source_map, print, &options),
        Command::Expand { file } => run_expand(&file, &options),
        Command::Ast { file } => run_ast(&file, &options),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::report_error(err);
            ExitCode::FAILURE
        }
    }
}

fn run_compile(
    file: &Path,
    out: Option<PathBuf>,
    no_source_map: bool,
    print: bool,
    options: &CompilerOptions,
) -> Result<(), HqlError> {
    let mut options = options.clone();
    if no_source_map {
        options.generate_source_map = Some(false);
    }
    let compiled = compiler::compile_file(&file.to_string_lossy(), &options)?;

    if print {
        println!("{}", compiled.code);
        return Ok(());
    }

    let out_path = out.unwrap_or_else(|| file.with_extension("js"));
    let mut code = compiled.code.clone();
    if compiled.source_map.is_some() {
        if let Some(name) = out_path.file_name() {
            code.push_str(&format!("//# sourceMappingURL={}.map\n", name.to_string_lossy()));
        }
    }
    write_output(&out_path, &code)?;

    if let Some(map) = &compiled.source_map {
        let map_path = PathBuf::from(format!("{}.map", out_path.display()));
        write_output(&map_path, map)?;
        output::success(&format!(
            "compiled {} -> {} (+ source map)",
            file.display(),
            out_path.display()
        ));
    } else {
        output::success(&format!("compiled {} -> {}", file.display(), out_path.display()));
    }
    Ok(())
}

fn run_expand(file: &Path, options: &CompilerOptions) -> Result<(), HqlError> {
    let source = read_input(file)?;
    let mut options = options.clone();
    options.current_file = Some(file.to_string_lossy().into_owned());
    let forms = compiler::expand(&source, &options)?;
    println!("{}", printer::print_program(&forms));
    Ok(())
}

fn run_ast(file: &Path, options: &CompilerOptions) -> Result<(), HqlError> {
    let source = read_input(file)?;
    let mut options = options.clone();
    options.current_file = Some(file.to_string_lossy().into_owned());
    options.emit_ir = true;
    options.generate_source_map = Some(false);
    let compiled = compiler::compile(&source, &options)?;
    let ir = compiled.ir.expect("emit_ir was requested");
    let json = serde_json::to_string_pretty(&ir)
        .map_err(|e| HqlError::codegen(format!("Failed to serialize IR: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn read_input(file: &Path) -> Result<String, HqlError> {
    std::fs::read_to_string(file)
        .map_err(|e| HqlError::import(format!("Module '{}' not found: {}", file.display(), e)))
}

fn write_output(path: &Path, content: &str) -> Result<(), HqlError> {
    std::fs::write(path, content).map_err(|e| {
        HqlError::codegen(format!("Failed to write '{}': {}", path.display(), e))
    })
}
