//! # cellforge CLI
//!
//! Command-line interface for building and inspecting configured cells.

use cellforge_allen::{mechanisms, CellBuilder, ModelParameters, MODEL_ID, MORPHOLOGY_FILE};
use cellforge_core::Offset;
use cellforge_neuron::{Cell, Engine, Group};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cellforge")]
#[command(author = "Yatrogenesis")]
#[command(version = "0.1.0")]
#[command(about = "Build calibrated single-cell models", long_about = None)]
struct Cli {
    /// Log progress (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build model 472352327 from a morphology
    Build {
        /// SWC file
        #[arg(default_value = MORPHOLOGY_FILE)]
        morphology: PathBuf,
        /// Cell name
        #[arg(short, long)]
        name: Option<String>,
        /// Offset along x (um)
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        x: f64,
        /// Offset along y (um)
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        y: f64,
        /// Offset along z (um)
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        z: f64,
        /// Parameter tables to use instead of the built-in calibration
        #[arg(short, long)]
        params: Option<PathBuf>,
        /// Print the whole cell as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the built-in parameter tables as JSON
    Params,

    /// List insertable mechanisms
    Mechanisms,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let engine = mechanisms::engine();

    match cli.command {
        Commands::Build {
            morphology,
            name,
            x,
            y,
            z,
            params,
            json,
        } => {
            let mut builder = CellBuilder::new(&engine)
                .name(name)
                .offset(Offset::new(x, y, z));
            if let Some(path) = params {
                builder = builder.parameters(ModelParameters::from_json_file(path)?);
            }
            let cell = builder.build(&morphology)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&cell)?);
            } else {
                println!("{} {}", "Loaded morphology:".green().bold(), morphology.display());
                print_summary(&cell);
            }
        }

        Commands::Params => {
            println!("{}", ModelParameters::neuron_472352327().to_json()?);
        }

        Commands::Mechanisms => {
            println!("{}", "Insertable mechanisms:".green().bold());
            println!();
            for spec in engine.catalog().iter() {
                let parameters: Vec<_> = spec
                    .parameters
                    .iter()
                    .map(|(name, default)| format!("{}={}", name, default))
                    .collect();
                let ions: Vec<_> = spec.ions.iter().map(|ion| ion.name()).collect();
                println!(
                    "  {:<12} {}  {}",
                    spec.name.cyan(),
                    parameters.join(" "),
                    if ions.is_empty() {
                        String::new()
                    } else {
                        format!("[{}]", ions.join(", ")).dimmed().to_string()
                    }
                );
            }
        }
    }

    Ok(())
}

fn print_summary(cell: &Cell) {
    println!("{} {} ({})", "Cell:".green().bold(), cell, MODEL_ID);
    println!(
        "  {} sections, {} segments, {:.1} um^2 membrane",
        cell.len(),
        cell.total_segments(),
        cell.total_area()
    );
    println!();
    println!(
        "  {:<10} {:<6} {:>9} {:>7} {:>5}  mechanisms",
        "section", "group", "L", "diam", "nseg"
    );

    for group in [Group::Soma, Group::Dend, Group::Axon] {
        for (_, section) in cell.sections(group) {
            let inserted: Vec<_> = section.mechanism_names().collect();
            println!(
                "  {:<10} {:<6} {:>9.2} {:>7.2} {:>5}  {}",
                section.name,
                group.name(),
                section.length,
                section.diam,
                section.nseg,
                inserted.join(" ")
            );
        }
    }
}
