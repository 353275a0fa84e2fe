mod archive;
mod output;
mod search;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use search::SearchOptions;

#[derive(Parser)]
#[command(name = "qgd")]
#[command(about = "Whole-project code search over a compressed, indexed archive")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project's data file
    Build {
        /// Project directory to pack
        project: PathBuf,
    },
    /// Search the project's data file
    Search {
        /// Project directory (its .qgd file is searched)
        project: PathBuf,

        /// Regular expression (or literal with --literal)
        pattern: String,

        /// Case insensitive search
        #[arg(short = 'i', long)]
        ignore_case: bool,

        /// Treat the pattern as a literal string
        #[arg(long)]
        literal: bool,

        /// Print column numbers
        #[arg(long)]
        column: bool,

        /// Visual Studio output format: path(line): text
        #[arg(long)]
        visual_studio: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { project } => {
            archive::build_project(&project)?;
        }
        Commands::Search {
            project,
            pattern,
            ignore_case,
            literal,
            column,
            visual_studio,
        } => {
            let options = SearchOptions {
                ignore_case,
                literal,
                column,
                visual_studio,
            };
            search::search_project(&project, &pattern, options, Box::new(std::io::stdout()))?;
        }
    }

    Ok(())
}
