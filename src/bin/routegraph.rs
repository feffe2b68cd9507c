use std::{env, process};

use routegraph::{
    AppConfig, GraphStore, PathOutcome, RouteGraphError, SqliteStore,
    client::CommandLineConfig,
    curriculum::CurriculumRepository,
    metro::{MetroNetwork, render_itinerary},
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", CommandLineConfig::help());
        return;
    }
    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let cli = match CommandLineConfig::from_args(&arg_refs) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            eprint!("{}", CommandLineConfig::help());
            process::exit(2);
        }
    };

    let config = match AppConfig::from_env().and_then(|base| cli.resolve(base)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
    };

    let store = match config.open_store() {
        Ok(store) => store,
        Err(err) => {
            eprintln!("{err}");
            process::exit(2);
        }
    };

    if let Err(err) = run_command(&store, &config, &cli) {
        eprintln!("command failed: {err}");
        process::exit(1);
    }
}

fn run_command(
    store: &SqliteStore,
    config: &AppConfig,
    cli: &CommandLineConfig,
) -> Result<(), RouteGraphError> {
    match cli.command.as_str() {
        "status" => {
            let nodes = store.graph().node_count()?;
            let edges = store.graph().edge_count()?;
            println!("db={} nodes={nodes} edges={edges}", config.database);
            Ok(())
        }
        "load-metro" => {
            let network = MetroNetwork::new(store, config.search_constraints());
            let summary = network.import_file(cli.operand(0))?;
            println!(
                "imported {} stations ({} new), {} links, {} edges",
                summary.stations_processed,
                summary.stations_created,
                summary.links,
                summary.edges_created
            );
            Ok(())
        }
        "load-curriculum" => {
            let repo = CurriculumRepository::new(store).with_max_depth(config.hop_ceiling);
            let summary = repo.import_file(cli.operand(0))?;
            println!(
                "imported {} units ({} new), {} dependencies, {} skipped",
                summary.units,
                summary.units_created,
                summary.dependencies,
                summary.skipped_prerequisites
            );
            Ok(())
        }
        "route" | "hops" => {
            let weighted = cli.command == "route";
            let network = MetroNetwork::new(store, config.search_constraints());
            let (from, to) = (cli.operand(0), cli.operand(1));
            let outcome = if weighted {
                network.fastest_route(from, to)?
            } else {
                network.fewest_hops_route(from, to)?
            };
            match outcome {
                PathOutcome::Found { path, .. } => print!("{}", render_itinerary(&path, weighted)),
                PathOutcome::NotFound { reason, .. } => {
                    println!("No route found between '{from}' and '{to}' ({reason})")
                }
            }
            Ok(())
        }
        "roadmap" => {
            let repo = CurriculumRepository::new(store).with_max_depth(config.hop_ceiling);
            let roadmap = repo.roadmap(cli.operand(0))?;
            println!(
                "Roadmap for {} ({})",
                roadmap.target.title, roadmap.target.slug
            );
            for (idx, unit) in roadmap.study_order.iter().enumerate() {
                println!(
                    "  {}. {} [{}, {} h]",
                    idx + 1,
                    unit.title,
                    unit.category,
                    unit.hours
                );
            }
            println!(
                "total {} h across {} prerequisite chains",
                roadmap.total_hours,
                roadmap.chains.len()
            );
            Ok(())
        }
        "clear" => {
            store.drop_all()?;
            println!("cleared db={}", config.database);
            Ok(())
        }
        other => Err(RouteGraphError::invalid_input(format!(
            "unknown command {other}"
        ))),
    }
}
