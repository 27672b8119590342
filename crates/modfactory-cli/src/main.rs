#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "modfactory")]
#[command(author, version, about = "Resolve bundler requests into module descriptors", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Create the module for a request and print its descriptor
    Resolve {
        /// Request as written in an import, e.g. "style-loader!./a.css?inline"
        request: String,

        /// Path of the importing module
        #[arg(long, value_name = "PATH")]
        issuer: Option<PathBuf>,

        /// Config file (defaults to modfactory.config.json in the working directory)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Split a request into match-resource, flags, inline loaders and resource
    Parse {
        /// Request as written in an import
        request: String,
    },

    /// Show which rule effects apply to a resource
    Rules {
        /// Resource path, optionally with a query
        path: String,

        /// Resource query, replacing any query on the path
        #[arg(long)]
        query: Option<String>,

        /// Path of the importing module
        #[arg(long, value_name = "PATH")]
        issuer: Option<PathBuf>,

        /// Config file (defaults to modfactory.config.json in the working directory)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    logging::init(cli.verbose, cli.json);

    match cli.command {
        None | Some(Commands::Version) => commands::version::run(),
        Some(Commands::Resolve {
            request,
            issuer,
            config,
        }) => commands::resolve::run(
            &cwd,
            &request,
            issuer.as_deref(),
            config.as_deref(),
            cli.json,
        ),
        Some(Commands::Parse { request }) => commands::parse::run(&cwd, &request, cli.json),
        Some(Commands::Rules {
            path,
            query,
            issuer,
            config,
        }) => commands::rules::run(
            &cwd,
            &path,
            query.as_deref(),
            issuer.as_deref(),
            config.as_deref(),
            cli.json,
        ),
    }
}
