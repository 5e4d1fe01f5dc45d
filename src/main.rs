use anyhow::Context as _;
use psweep::cli::{build_command, get_verbosity, run_matches};
use psweep::error::{is_structural, SweepError};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let matches = build_command().get_matches();
    let verbosity = get_verbosity(&matches);

    // RUST_LOG wins over the verbosity flags
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("psweep={}", verbosity.filter_directive())));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let command = matches.subcommand_name().unwrap_or("psweep").to_string();
    if let Err(e) = run_matches(&matches).with_context(|| format!("'{}' failed", command)) {
        eprintln!("Error: {:#}", e);
        let code = match e.downcast_ref::<SweepError>() {
            Some(err) if is_structural(err) => 2,
            _ => 1,
        };
        process::exit(code);
    }
}
