use std::{env, process::ExitCode, time::Instant};

use tracing_subscriber::EnvFilter;
use typecore::{
    config::EnvConfig,
    errors::errors::{Error, ErrorTip},
    type_checker::env::Environment,
};

fn main() -> ExitCode {
    if let Ok(filter) = EnvFilter::try_from_env("TYPECORE_LOG") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }

    let names: Vec<String> = env::args().skip(1).collect();
    if names.is_empty() {
        eprintln!("usage: typecore <type>...");
        eprintln!("prints what the type environment knows about each type");
        return ExitCode::FAILURE;
    }

    let start = Instant::now();
    let mut environment = match Environment::new(EnvConfig::from_env()) {
        Ok(environment) => environment,
        Err(err) => {
            display_error(&err);
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(elapsed = ?start.elapsed(), "environment ready");

    let mut status = ExitCode::SUCCESS;
    for name in &names {
        match environment.find_type_str(name) {
            Some(t) => print!("{}", environment.apropos(t)),
            None => {
                eprintln!("Error: UndeclaredIdentifier (no type named '{}')", name);
                status = ExitCode::FAILURE;
            }
        }
        println!();
    }

    for warning in environment.diagnostics.warnings() {
        eprintln!("warning: {}", warning.message);
    }
    status
}

fn display_error(error: &Error) {
    if let ErrorTip::None = error.get_tip() {
        eprintln!("Error: {}", error.get_error_name());
    } else {
        eprintln!("Error: {} ({})", error.get_error_name(), error.get_tip());
    }
}
