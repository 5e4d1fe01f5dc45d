//! Main CLI application

use crate::config::{load_launchers, parse_config_auto, parse_config_file, Config};
use crate::error::{ExpansionError, Result};
use crate::merge::{expand_patterns, merge_paths};
use crate::runner::{
    describe, execute_all, load_tasks, renderer_for, Context, Plan, PlannedInvocation, TaskGraph,
    Verbosity, RENDERER_NAMES,
};
use clap::builder::PossibleValuesParser;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell;
use colored::Colorize;
use std::env;
use std::io;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Environment variables consulted for the rank of this worker, in order
pub const RANK_VARS: &[(&str, &str)] = &[
    ("PSWEEP_RANK", "PSWEEP_SIZE"),
    ("OMPI_COMM_WORLD_RANK", "OMPI_COMM_WORLD_SIZE"),
    ("PMI_RANK", "PMI_SIZE"),
];

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("psweep")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Expand parameter sweeps into concrete runs and merge their output")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Path to psweep.yml config file")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("conf")
                .short('c')
                .long("conf")
                .value_name("FILE")
                .help("Launcher settings file")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print command output and errors")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print verbose output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("plan")
                .about("Show the ordered invocations of the selected tasks")
                .arg(targets_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print the plan as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("graph")
                .about("Print the task dependency graph")
                .arg(
                    Arg::new("format")
                        .long("format")
                        .value_name("FORMAT")
                        .help("Output format")
                        .value_parser(PossibleValuesParser::new(RENDERER_NAMES.iter().copied()))
                        .default_value("tree"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Run the selected tasks, or this worker's share of them")
                .arg(targets_arg())
                .arg(
                    Arg::new("rank")
                        .long("rank")
                        .value_name("N")
                        .help("Index of this worker")
                        .value_parser(value_parser!(usize))
                        .requires("size"),
                )
                .arg(
                    Arg::new("size")
                        .long("size")
                        .value_name("M")
                        .help("Number of workers")
                        .value_parser(value_parser!(usize))
                        .requires("rank"),
                )
                .arg(
                    Arg::new("dry-run")
                        .short('n')
                        .long("dry-run")
                        .help("Print the invocations instead of running them")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("merge")
                .about("Merge output fragments into one renumbered, sorted file")
                .arg(
                    Arg::new("fragments")
                        .value_name("FRAGMENT")
                        .help("Fragment files or glob patterns")
                        .num_args(1..)
                        .required(true),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("OUT")
                        .help("Output file ('-' for stdout)")
                        .value_parser(value_parser!(PathBuf))
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .value_name("SHELL")
                        .value_parser(value_parser!(Shell))
                        .required(true),
                ),
        )
}

fn targets_arg() -> Arg {
    Arg::new("tasks")
        .value_name("TASK")
        .help("Tasks to select (their prerequisites are included); all when omitted")
        .num_args(0..)
}

/// Get verbosity level from matches
pub fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("silent") {
        Verbosity::Silent
    } else if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// Run the CLI application with the process arguments
pub fn run() -> Result<()> {
    run_matches(&build_command().get_matches())
}

/// Run the CLI application with already parsed arguments
pub fn run_matches(matches: &ArgMatches) -> Result<()> {
    let verbosity = get_verbosity(matches);

    match matches.subcommand() {
        Some(("plan", sub)) => cmd_plan(matches, sub, verbosity),
        Some(("graph", sub)) => cmd_graph(matches, sub, verbosity),
        Some(("run", sub)) => cmd_run(matches, sub, verbosity),
        Some(("merge", sub)) => cmd_merge(sub, verbosity),
        Some(("completions", sub)) => {
            if let Some(shell) = sub.get_one::<Shell>("shell") {
                clap_complete::generate(*shell, &mut build_command(), "psweep", &mut io::stdout());
            }
            Ok(())
        }
        _ => {
            build_command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Load the configuration and build the context it runs in
fn load(matches: &ArgMatches, verbosity: Verbosity) -> Result<(Config, Context)> {
    let (config, path) = match matches.get_one::<PathBuf>("file") {
        Some(path) => (parse_config_file(path)?, path.clone()),
        None => parse_config_auto()?,
    };
    debug!(path = %path.display(), "loaded configuration");

    let ctx = Context::new()
        .with_config_path(path)
        .with_verbosity(verbosity);
    let settings = matches.get_one::<PathBuf>("conf");
    let config_dir = ctx.config_dir();
    let launchers = load_launchers(settings.map(PathBuf::as_path), Some(config_dir.as_path()))?;

    Ok((config, ctx.with_launchers(launchers)))
}

fn targets(sub: &ArgMatches) -> Vec<String> {
    sub.get_many::<String>("tasks")
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn cmd_plan(matches: &ArgMatches, sub: &ArgMatches, verbosity: Verbosity) -> Result<()> {
    let (config, mut ctx) = load(matches, verbosity)?;
    let plan = Plan::build(&config, &mut ctx, &targets(sub))?;

    if sub.get_flag("json") {
        println!("{}", plan.to_json()?);
        return Ok(());
    }

    for expansion in plan.expansions() {
        let heading = format!("{} ({} invocations)", expansion.task(), expansion.len());
        println!("{}", heading.bold());
        for (index, invocation) in expansion {
            let env: Vec<String> = invocation
                .env
                .iter()
                .map(|(k, v)| format!("{}={} ", k, v))
                .collect();
            println!("  {:>4}  {}{}", index, env.concat(), invocation.command_line());
        }
    }
    Ok(())
}

fn cmd_graph(matches: &ArgMatches, sub: &ArgMatches, verbosity: Verbosity) -> Result<()> {
    let (config, mut ctx) = load(matches, verbosity)?;
    let tasks = load_tasks(&config, &mut ctx)?;
    let graph = TaskGraph::build(&tasks)?;

    let format = sub
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("tree");
    if let Some(renderer) = renderer_for(format) {
        print!("{}", renderer.render(&graph)?);
    }
    Ok(())
}

fn cmd_run(matches: &ArgMatches, sub: &ArgMatches, verbosity: Verbosity) -> Result<()> {
    let (config, mut ctx) = load(matches, verbosity)?;
    let plan = Plan::build(&config, &mut ctx, &targets(sub))?;

    let explicit = sub
        .get_one::<usize>("rank")
        .copied()
        .zip(sub.get_one::<usize>("size").copied());
    let invocations: Vec<PlannedInvocation> = match explicit.map(Ok).or_else(rank_from_env) {
        Some(world) => {
            let (rank, size) = world?;
            debug!(rank, size, "running slice");
            plan.slice(rank, size)?
        }
        None => plan.iter().collect(),
    };

    if sub.get_flag("dry-run") {
        for planned in &invocations {
            println!("{}", describe(planned));
        }
        return Ok(());
    }

    let count = execute_all(invocations, &ctx)?;
    if verbosity >= Verbosity::Normal {
        eprintln!("{} {} invocation(s)", "[DONE]".green().bold(), count);
    }
    Ok(())
}

/// Rank and world size from the environment, if a launcher set them
///
/// The first variable pair that is fully set wins. A pair with only one of
/// its variables set is skipped with a warning.
pub fn rank_from_env() -> Option<Result<(usize, usize)>> {
    world_from(|name| env::var(name).ok())
}

fn world_from<F>(lookup: F) -> Option<Result<(usize, usize)>>
where
    F: Fn(&str) -> Option<String>,
{
    for &(rank_var, size_var) in RANK_VARS {
        match (lookup(rank_var), lookup(size_var)) {
            (Some(rank), Some(size)) => {
                return Some(parse_world((rank_var, &rank), (size_var, &size)));
            }
            (Some(_), None) => {
                warn!(set = rank_var, missing = size_var, "ignoring rank without world size");
            }
            (None, Some(_)) => {
                warn!(set = size_var, missing = rank_var, "ignoring world size without rank");
            }
            (None, None) => {}
        }
    }
    None
}

fn parse_world(rank: (&str, &str), size: (&str, &str)) -> Result<(usize, usize)> {
    let parse = |(variable, value): (&str, &str)| {
        value
            .trim()
            .parse::<usize>()
            .map_err(|_| ExpansionError::InvalidRankVariable {
                variable: variable.to_string(),
                value: value.to_string(),
            })
    };
    Ok((parse(rank)?, parse(size)?))
}

fn cmd_merge(sub: &ArgMatches, verbosity: Verbosity) -> Result<()> {
    let patterns: Vec<String> = sub
        .get_many::<String>("fragments")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let paths = expand_patterns(&patterns)?;
    let table = merge_paths(&paths)?;

    match sub.get_one::<PathBuf>("output") {
        Some(out) if out.as_os_str() != "-" => {
            table.write_file(out)?;
            if verbosity >= Verbosity::Normal {
                eprintln!(
                    "{} {} fragment(s), {} row(s) -> {}",
                    "[MERGED]".green().bold(),
                    paths.len(),
                    table.rows.len(),
                    out.display()
                );
            }
        }
        _ => table.write_to(io::stdout().lock())?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SweepError;

    #[test]
    fn test_command_is_well_formed() {
        build_command().debug_assert();
    }

    #[test]
    fn test_get_verbosity_normal() {
        let matches = build_command().get_matches_from(vec!["psweep", "graph"]);
        assert_eq!(get_verbosity(&matches), Verbosity::Normal);
    }

    #[test]
    fn test_get_verbosity_flags() {
        let matches = build_command().get_matches_from(vec!["psweep", "-q", "graph"]);
        assert_eq!(get_verbosity(&matches), Verbosity::Quiet);

        let matches = build_command().get_matches_from(vec!["psweep", "plan", "--verbose"]);
        assert_eq!(get_verbosity(&matches), Verbosity::Verbose);

        let matches = build_command().get_matches_from(vec!["psweep", "-s", "-v", "plan"]);
        assert_eq!(get_verbosity(&matches), Verbosity::Silent);
    }

    #[test]
    fn test_run_arguments() {
        let matches = build_command().get_matches_from(vec![
            "psweep", "run", "a", "b", "--rank", "1", "--size", "4", "-n",
        ]);
        let (_, sub) = matches.subcommand().unwrap();
        assert_eq!(targets(sub), vec!["a", "b"]);
        assert_eq!(sub.get_one::<usize>("rank"), Some(&1));
        assert_eq!(sub.get_one::<usize>("size"), Some(&4));
        assert!(sub.get_flag("dry-run"));
    }

    #[test]
    fn test_rank_requires_size() {
        let result = build_command().try_get_matches_from(vec!["psweep", "run", "--rank", "1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_graph_format_values() {
        let result = build_command().try_get_matches_from(vec!["psweep", "graph", "--format", "png"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_world() {
        assert_eq!(parse_world(("R", "2"), ("S", " 8 ")).unwrap(), (2, 8));
    }

    #[test]
    fn test_bad_rank_variable_is_named() {
        let err = parse_world(("OMPI_COMM_WORLD_RANK", "x1"), ("OMPI_COMM_WORLD_SIZE", "8"))
            .unwrap_err();
        match err {
            SweepError::Expansion(ExpansionError::InvalidRankVariable { variable, value }) => {
                assert_eq!(variable, "OMPI_COMM_WORLD_RANK");
                assert_eq!(value, "x1");
            }
            other => panic!("expected an invalid rank variable, got {:?}", other),
        }
        assert!(err_text(parse_world(("R", "1"), ("S", "-4"))).contains("S='-4'"));
    }

    fn err_text(result: Result<(usize, usize)>) -> String {
        result.map(|_| String::new()).unwrap_or_else(|e| e.to_string())
    }

    #[test]
    fn test_world_from_skips_partial_pairs() {
        let env = |vars: &'static [(&'static str, &'static str)]| {
            move |name: &str| {
                vars.iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| v.to_string())
            }
        };

        let world = world_from(env(&[("PSWEEP_RANK", "1"), ("PMI_RANK", "2"), ("PMI_SIZE", "4")]));
        assert_eq!(world.unwrap().unwrap(), (2, 4));

        assert!(world_from(env(&[("OMPI_COMM_WORLD_SIZE", "4")])).is_none());
        assert!(world_from(env(&[])).is_none());
    }
}
