use alr_core::ArtifactTypeId;
use alr_runtime::{RuntimeConfig, VERSION};
use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod demo;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Command::new("alr")
        .version(VERSION)
        .about("Artifact Lifecycle Runtime")
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("graph")
                .about("Print state graphs, successor closures and unreachable states")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .short('c')
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Runtime configuration (TOML)"),
                )
                .arg(
                    Arg::new("type")
                        .long("type")
                        .help("Only this artifact type"),
                ),
        )
        .subcommand(
            Command::new("demo")
                .about("Run a scripted artifact lifecycle against an in-memory runtime")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .short('c')
                        .value_parser(value_parser!(PathBuf))
                        .help("Use this configuration instead of the built-in one"),
                ),
        );

    let matches = cli.get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("graph", args)) => {
            let path = args
                .get_one::<PathBuf>("config")
                .context("--config is required")?;
            let config = RuntimeConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?;
            print_graphs(&config, args.get_one::<String>("type").map(String::as_str))?;
        }
        Some(("demo", args)) => {
            let config = match args.get_one::<PathBuf>("config") {
                Some(path) => RuntimeConfig::load(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => RuntimeConfig::from_toml_str(demo::CONFIG)?,
            };
            demo::run(config).await?;
        }
        _ => unreachable!("subcommand_required"),
    }
    Ok(())
}

fn print_graphs(config: &RuntimeConfig, only: Option<&str>) -> anyhow::Result<()> {
    let engine = config.build_engine()?;
    let mut types: Vec<&ArtifactTypeId> = engine.catalog().artifact_types().collect();
    types.sort();

    for artifact_type in types {
        if only.is_some_and(|only| only != artifact_type.as_str()) {
            continue;
        }
        let Some(graph) = engine.catalog().graph(artifact_type) else {
            continue;
        };
        println!("{artifact_type} (initial: {})", graph.initial_state().id());
        for state in graph.states() {
            let successors: Vec<String> = engine
                .all_recursive_successor_state_ids(artifact_type, state.id())
                .into_iter()
                .map(|id| id.to_string())
                .collect();
            let label = state.label().map(|l| format!(" \"{l}\"")).unwrap_or_default();
            println!("  {}{label} -> [{}]", state.id(), successors.join(", "));
        }
        let unreachable = engine.unreachable_states(artifact_type);
        if !unreachable.is_empty() {
            let names: Vec<String> = unreachable.iter().map(ToString::to_string).collect();
            println!("  unreachable: {}", names.join(", "));
        }
        println!();
    }
    Ok(())
}
