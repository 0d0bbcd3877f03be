use anyhow::Result;
use bag2export::cli::{Cli, Commands};
use bag2export::{ExportConfig, ExportOptions, bag, export_bag, schema};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Inspect { bag } => bag::inspect_bag(&bag),
        Commands::Export {
            config,
            bag,
            out,
            dry_run,
            progress,
            no_progress,
        } => {
            let mut config = ExportConfig::from_path(&config)?;
            if let Some(bag) = bag {
                config.bag_path = bag;
            }
            if let Some(out) = out {
                config.output_dir = out.into();
            }
            let options = ExportOptions {
                config,
                dry_run,
                show_progress: progress && !no_progress,
            };
            export_bag(&options).map(|_| ())
        }
        Commands::Schema {} => schema::print_schema(),
    }
}
