//! Wardrobe: admin CLI for the per-world inventory group catalog.
//!
//! # Usage
//!
//! ```text
//! wardrobe init [--force]
//! wardrobe groups [--json]
//! wardrobe group create <name> [--world W]... [--pattern P]... [--priority N] [--parent P]
//! wardrobe group delete <name>
//! wardrobe group show <name> [--json]
//! wardrobe group set <name> <flag> <true|false>
//! wardrobe group priority <name> <n>
//! wardrobe world assign <world> <group>
//! wardrobe world unassign <world>
//! wardrobe pattern add|remove <group> <regex>
//! wardrobe resolve <world>... [--json]
//! wardrobe test-pattern <world> <group>
//! wardrobe check
//! ```
//!
//! Every command reads and writes `~/.wardrobe/`.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    check::CheckArgs, group::GroupCommand, groups::GroupsArgs, init::InitArgs,
    pattern::PatternCommand, resolve::ResolveArgs, resolve::TestPatternArgs, world::WorldCommand,
};

#[derive(Parser, Debug)]
#[command(
    name = "wardrobe",
    version,
    about = "Manage per-world inventory groups",
    long_about = None,
)]
struct Cli {
    /// Log registry activity to stderr (`RUST_LOG` overrides the level).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write default groups.yaml and settings.yaml under ~/.wardrobe.
    Init(InitArgs),

    /// List every group.
    Groups(GroupsArgs),

    /// Create, delete, inspect or edit a single group.
    Group {
        #[command(subcommand)]
        command: GroupCommand,
    },

    /// Explicit world assignment.
    World {
        #[command(subcommand)]
        command: WorldCommand,
    },

    /// Regular-expression world patterns.
    Pattern {
        #[command(subcommand)]
        command: PatternCommand,
    },

    /// Show which group a world resolves to.
    Resolve(ResolveArgs),

    /// Check one group's patterns against a world name.
    TestPattern(TestPatternArgs),

    /// Validate the config files without changing them.
    Check(CheckArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        init_tracing();
    }
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Groups(args) => args.run(),
        Commands::Group { command } => commands::group::run(command),
        Commands::World { command } => commands::world::run(command),
        Commands::Pattern { command } => commands::pattern::run(command),
        Commands::Resolve(args) => args.run(),
        Commands::TestPattern(args) => args.run(),
        Commands::Check(args) => args.run(),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
