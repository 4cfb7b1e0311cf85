use crate::cli::Commands;
use crate::error::KlvmResult;
use crate::kernel::{Ident, Kernel, Program, ValueOrVar, Var};
use crate::types::KlvmConfig;

use colored::*;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

pub fn execute_command(command: Commands) -> KlvmResult<()> {
    match command {
        Commands::Run {
            file,
            time_slice,
            config,
            time,
        } => execute_run(&file, time_slice, config.as_deref(), time),
        Commands::Config { config } => execute_config(config.as_deref()),
    }
}

/// Configuration file if given, defaults otherwise
pub fn load_config(path: Option<&Path>) -> KlvmResult<KlvmConfig> {
    match path {
        Some(path) => Ok(KlvmConfig::from_file(path)?),
        None => Ok(KlvmConfig::default()),
    }
}

fn execute_run(file: &Path, time_slice: Option<usize>, config: Option<&Path>, time: bool) -> KlvmResult<()> {
    let mut config = load_config(config)?;
    if let Some(time_slice) = time_slice {
        config = config.with_time_slice(time_slice);
    }
    println!("{} {}", "Running:".bright_green(), file.display());

    let content = fs::read_to_string(file)?;
    let program = Program::from_json(&content)?;
    debug!(locals = program.locals.len(), "program loaded");

    let kernel = Kernel::new(config)?;
    let start = Instant::now();
    let locals = kernel.run_program(&program)?;
    let elapsed = start.elapsed();

    for (ident, var) in &locals {
        println!("{} = {}", ident.as_str().bright_cyan(), render_local(ident, var));
    }
    if time {
        println!("{} {:?}", "Elapsed:".bright_blue(), elapsed);
    }
    Ok(())
}

fn render_local(ident: &Ident, var: &Var) -> String {
    match var.resolve() {
        ValueOrVar::Var(_) => "<unbound>".dimmed().to_string(),
        ValueOrVar::Value(value) => match value.check_complete() {
            Ok(complete) => complete.to_json().to_string(),
            Err(e) => {
                debug!(ident = %ident, error = %e, "local is partial; showing kernel text");
                value.to_string()
            }
        },
    }
}

fn execute_config(config: Option<&Path>) -> KlvmResult<()> {
    let config = load_config(config)?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "time_slice = 128").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.time_slice, 128);
    }

    #[test]
    fn test_run_program_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"locals": ["x"], "instr": {{"op": "bind", "x": "x", "y": {{"lit": {{"int32": 7}}}}}}}}"#
        )
        .unwrap();
        let path = file.path().to_path_buf();
        assert!(execute_run(&path, Some(16), None, false).is_ok());
    }

    #[test]
    fn test_factorial_demo() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/factorial.json");
        let program = Program::from_json(&fs::read_to_string(path).unwrap()).unwrap();
        let kernel = Kernel::new(KlvmConfig::default().with_time_slice(32)).unwrap();
        let locals = kernel.run_program(&program).unwrap();
        let (ident, var) = &locals[1];
        assert_eq!(ident.as_str(), "result");
        assert_eq!(render_local(ident, var), "3628800");
    }

    #[test]
    fn test_render_unbound_local() {
        colored::control::set_override(false);
        assert_eq!(render_local(&Ident::new("x"), &Var::new()), "<unbound>");
    }
}
