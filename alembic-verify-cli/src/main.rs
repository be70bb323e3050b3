//! Command-line companion for alembic-verify.
//!
//! Inspects and moves a database through the revisions of a migration
//! script folder, and compares the schemas of two databases.
//!
//! ```text
//! alembic-verify --url sqlite:///app.db current
//! alembic-verify --url mysql://root:@localhost/app upgrade +1
//! alembic-verify compare sqlite:///migrated.db sqlite:///model.db
//! ```
//!
//! Log output goes to stderr and is controlled by `RUST_LOG`.

use std::path::PathBuf;

use alembic_verify::{
    assert_schemas_match, command, create_engine, get_current_revision, get_current_revisions,
    make_alembic_config, Config, ScriptDirectory,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "alembic-verify", version, about)]
struct Cli {
    /// Database URL the migrations run against
    #[arg(long, env = "DATABASE_URL", global = true)]
    url: Option<String>,

    /// Folder holding the migration scripts (with a `versions/` directory)
    #[arg(
        long,
        env = "ALEMBIC_SCRIPT_LOCATION",
        default_value = "migrations",
        global = true
    )]
    script_location: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show the current revision of the database
    Current {
        /// Show every current head (for branched histories)
        #[arg(long)]
        all: bool,
    },
    /// Show the head revisions of the script folder
    Heads,
    /// List revisions, parents before children
    History,
    /// Upgrade to a later revision
    Upgrade {
        /// `head`, `heads`, `+N` or a revision id
        #[arg(default_value = "head")]
        target: String,
    },
    /// Revert to an earlier revision
    Downgrade {
        /// `base`, `-N` or a revision id
        #[arg(allow_hyphen_values = true)]
        target: String,
    },
    /// Set the version table to a revision without running migrations
    Stamp {
        /// `head`, `heads`, `base` or a revision id
        target: String,
    },
    /// Compare the schemas of two databases
    Compare {
        /// Expected database (usually built by migrations)
        left: String,
        /// Actual database (usually built from the application's model)
        right: String,
    },
}

impl Cli {
    fn config(&self) -> Result<Config, Box<dyn std::error::Error>> {
        let url = self
            .url
            .as_deref()
            .ok_or("No database URL given. Pass --url or set DATABASE_URL.")?;
        Ok(make_alembic_config(url, &self.script_location))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Current { all } => {
            let config = cli.config()?;
            let engine = create_engine(config.url()?)?;
            let script = ScriptDirectory::from_config(&config)?;
            if *all {
                for head in get_current_revisions(&config, &engine, &script)? {
                    println!("{}", head);
                }
            } else {
                match get_current_revision(&config, &engine, &script)? {
                    Some(revision) => println!("{}", revision),
                    None => println!("(base)"),
                }
            }
        }
        Commands::Heads => {
            let config = make_alembic_config("", &cli.script_location);
            for head in ScriptDirectory::from_config(&config)?.get_heads() {
                println!("{} (head)", head);
            }
        }
        Commands::History => {
            let config = make_alembic_config("", &cli.script_location);
            for script in command::history(&config)? {
                let parents = match script.down_revisions() {
                    [] => "<base>".to_string(),
                    parents => parents.join(", "),
                };
                println!(
                    "{} -> {}, {}",
                    parents,
                    script.revision(),
                    script.message().unwrap_or("(no message)")
                );
            }
        }
        Commands::Upgrade { target } => {
            let report = command::upgrade(&cli.config()?, target)?;
            tracing::info!(
                revisions_run = ?report.revisions_run,
                version_table_created = report.version_table_created,
                "Upgrade finished"
            );
        }
        Commands::Downgrade { target } => {
            let report = command::downgrade(&cli.config()?, target)?;
            tracing::info!(revisions_run = ?report.revisions_run, "Downgrade finished");
        }
        Commands::Stamp { target } => {
            command::stamp(&cli.config()?, target)?;
        }
        Commands::Compare { left, right } => {
            assert_schemas_match(left, right)?;
            println!("Schemas match");
        }
    }

    Ok(())
}
