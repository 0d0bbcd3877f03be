use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "bag2export",
    about = "Export ROS1 bag topics into per-topic files with a timestamp index",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List topics, types, message counts and time span of a bag
    Inspect {
        /// Path to the .bag file
        bag: String,
    },

    /// Export the topics listed in a YAML config into per-topic directories
    Export {
        /// Path to the export config (.yaml)
        config: String,
        /// Override the config's bag_path
        #[arg(long = "bag")]
        bag: Option<String>,
        /// Override the config's output_dir
        #[arg(long = "out")]
        out: Option<String>,
        /// Dry-run: route and count messages but write nothing
        #[arg(long = "dry-run")]
        dry_run: bool,
        /// Show progress spinner (enabled by default)
        #[arg(long = "progress", action = ArgAction::SetTrue, default_value_t = true)]
        progress: bool,
        /// Hide the progress spinner
        #[arg(long = "no-progress")]
        no_progress: bool,
    },

    /// Show supported ROS message types and the artifacts they produce
    Schema {},
}
