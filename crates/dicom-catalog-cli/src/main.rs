mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::path::Path;
use std::process;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dicom_catalog_core::{
    AppConfig, CatalogIndex, ClusterBuilder, ClusterLevel, ClusterNode, PartTenExtractor,
    SilentSink,
};
use dotenv::dotenv;
use progress::BarSink;
use tracing::error;

fn main() -> Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match dicom_catalog_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    match args.command {
        Some(Commands::Index { verbose }) => {
            if let Err(err) = run_index(&config, verbose) {
                error!("Error: {}", err);
            }
        }
        Some(Commands::Browse { tree }) => {
            if let Err(err) = run_browse(&config, tree) {
                error!("Error: {}", err);
            }
        }
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn run_index(config: &AppConfig, verbose: bool) -> Result<()> {
    let mut catalog = CatalogIndex::new(config.max_catalog_files)
        .with_ignore_patterns(config.ignore_patterns.clone());
    let sink = BarSink::new();
    let report = catalog.catalog_indexing(
        Path::new(&config.root_path),
        &PartTenExtractor,
        verbose,
        &sink,
    )?;
    sink.finish();

    println!();
    println!(
        "Enumerate: {}, Hydrate: {}, Reconcile: {}",
        format!("{:.2}s", report.enumerate_duration.as_secs_f64()).green(),
        format!("{:.2}s", report.hydrate_duration.as_secs_f64()).green(),
        format!("{:.2}s", report.reconcile_duration.as_secs_f64()).green(),
    );
    println!(
        "{} directories, {} files, {} snapshot hits, {} re-indexed",
        format!("{}", report.directories_indexed).cyan(),
        format!("{}", report.files_indexed).cyan(),
        format!("{}", report.snapshot_hits).cyan(),
        format!("{}", report.updated_directories).yellow(),
    );
    if report.directories_skipped > 0 {
        println!(
            "{} directories skipped by the {} file ceiling",
            format!("{}", report.directories_skipped).red(),
            config.max_catalog_files,
        );
    }
    if report.cancelled {
        println!("{}", "Indexing was cancelled; catalog is partial".red());
    }

    Ok(())
}

fn run_browse(config: &AppConfig, print_tree: bool) -> Result<()> {
    let mut catalog = CatalogIndex::new(config.max_catalog_files)
        .with_ignore_patterns(config.ignore_patterns.clone());
    catalog.catalog_indexing(
        Path::new(&config.root_path),
        &PartTenExtractor,
        false,
        &SilentSink,
    )?;

    let patients = ClusterBuilder::build(catalog.records());
    if patients.is_empty() {
        println!("Catalog is empty");
        return Ok(());
    }

    if print_tree {
        for patient in &patients {
            print_node(patient, 0);
        }
        return Ok(());
    }

    pick(&patients)
}

fn print_node(node: &ClusterNode, depth: usize) {
    let label = match node.level {
        ClusterLevel::Patient => node.description.cyan().bold(),
        ClusterLevel::Study => node.description.green(),
        ClusterLevel::Series => node.description.yellow(),
        ClusterLevel::Instance => node.description.normal(),
    };
    println!("{}{} {}", "  ".repeat(depth), label, node.id.dimmed());
    for child in &node.children {
        print_node(child, depth + 1);
    }
}

/// Interactive descent through the hierarchy. Levels with exactly one
/// choice are descended automatically; the traversal state lives here, not
/// in the builder.
fn pick(patients: &[ClusterNode]) -> Result<()> {
    let mut current: &[ClusterNode] = patients;
    loop {
        if current.len() == 1 && !current[0].children.is_empty() {
            println!(
                "{}: {}",
                current[0].level,
                current[0].description.bold()
            );
            current = &current[0].children;
            continue;
        }

        for (i, node) in current.iter().enumerate() {
            println!(
                "  {} {} {}",
                format!("{:>3})", i + 1).dimmed(),
                node.description,
                node.id.dimmed(),
            );
        }
        if current.first().map(|node| node.level) == Some(ClusterLevel::Instance) {
            return Ok(());
        }

        match prompt_select(current.len())? {
            Some(choice) => {
                let node = &current[choice];
                println!("{}: {}", node.level, node.description.bold());
                if node.children.is_empty() {
                    return Ok(());
                }
                current = &node.children;
            }
            None => return Ok(()),
        }
    }
}

fn prompt_select(count: usize) -> io::Result<Option<usize>> {
    let mut input = String::new();

    loop {
        input.clear();

        print!("Select 1-{} (q to quit): ", count);
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim() {
            "q" | "Q" => return Ok(None),
            raw => match raw.parse::<usize>() {
                Ok(n) if (1..=count).contains(&n) => return Ok(Some(n - 1)),
                _ => continue,
            },
        }
    }
}
