use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "Tessera")]
#[command(about = "Build tool for mini programs")]
#[command(long_about = "Tessera: compiles, bundles and watches mini program projects")]
#[command(version)]
#[command(author)]
#[command(styles = get_styles())]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the project once, or keep rebuilding with --watch
    Build {
        #[command(flatten)]
        options: BuildArgs,

        /// Rebuild on file changes
        #[arg(short, long)]
        watch: bool,
    },
    /// Watch the project and serve static resources on the public path
    Dev {
        #[command(flatten)]
        options: BuildArgs,
    },
}

#[derive(Args)]
pub struct BuildArgs {
    /// Project root holding project.config.json
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Configuration file, defaults to <root>/tessera.toml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Pack scripts into a single bundler.js
    #[arg(short, long)]
    pub bundle: bool,

    /// Do not inline source maps
    #[arg(long)]
    pub no_source_map: bool,

    /// Public base URL of static resources
    #[arg(long)]
    pub public_path: Option<String>,

    /// Only print warnings and errors
    #[arg(short, long)]
    pub silence: bool,
}

fn get_styles() -> Styles {
    Styles::styled()
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .header(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Cyan.on_default())
        .invalid(AnsiColor::Red.on_default() | Effects::BOLD)
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
        .valid(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::White.on_default())
}
