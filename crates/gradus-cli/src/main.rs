mod status;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gradus_config::{AppConfig, ConfigLoader, LogConfig};
use gradus_db::{Direction, Migrator, PositionStore, Span, source};
use rusqlite::Connection;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gradus", version, about = "Sequential, reversible schema migrations for SQLite")]
struct Cli {
    /// Config file (YAML or TOML). Defaults to ./gradus.{yml,yaml,toml} if present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file.
    #[arg(long, env = "GRADUS_DATABASE", global = true)]
    database: Option<PathBuf>,

    /// Directory of `<name>.up.sql` / `<name>.down.sql` files.
    #[arg(long, global = true)]
    steps_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending steps (all of them unless --count is given)
    Up(CountArgs),
    /// Revert applied steps (one unless --count or --all is given)
    Down(CountArgs),
    /// Show declared and recorded steps
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Apply and revert every step twice in a discarded transaction
    Validate,
}

#[derive(Args)]
struct CountArgs {
    /// Maximum number of steps to traverse
    #[arg(short = 'n', long, conflicts_with = "all")]
    count: Option<usize>,

    /// Traverse every step
    #[arg(long)]
    all: bool,
}

impl CountArgs {
    fn span(&self, default: Span) -> Span {
        match (self.count, self.all) {
            (_, true) => Span::All,
            (Some(n), false) => Span::Steps(n),
            (None, false) => default,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    let mut config = ConfigLoader::load_or_default(cli.config.as_deref(), &cwd)
        .context("failed to load configuration")?;
    apply_overrides(&mut config, &cli);
    init_tracing(&config.log);

    let registry = source::load_dir(&config.steps_dir)
        .with_context(|| format!("failed to load steps from {}", config.steps_dir.display()))?;
    let store = PositionStore::new(config.database.table.clone())?;
    let migrator = Migrator::new(registry).with_store(store);
    let mut conn = open_database(&config)?;

    match cli.command {
        Command::Up(args) => run_migrate(&migrator, &mut conn, Direction::Up(args.span(Span::All))),
        Command::Down(args) => run_migrate(
            &migrator,
            &mut conn,
            Direction::Down(args.span(Span::Steps(1))),
        ),
        Command::Status { json } => {
            let statuses = migrator.status(&conn)?;
            let current = migrator.current_position(&conn)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                print!("{}", status::render_status(&statuses, current.as_deref()));
            }
            Ok(())
        }
        Command::Validate => {
            let report = migrator
                .validate_steps(&mut conn)
                .context("step validation failed")?;
            for (pass, counts) in report.passes.iter().enumerate() {
                println!(
                    "pass {}: {} up, {} down",
                    pass + 1,
                    counts.ups,
                    counts.downs
                );
            }
            println!("{} step(s) are reversible", migrator.registry().len());
            Ok(())
        }
    }
}

fn run_migrate(migrator: &Migrator, conn: &mut Connection, direction: Direction) -> Result<()> {
    match migrator.migrate(conn, direction) {
        Ok(0) => {
            println!("nothing to do");
            Ok(())
        }
        Ok(n) => {
            let current = migrator.current_position(conn)?;
            println!(
                "{} {n} step(s), position: {}",
                if direction.is_forward() { "applied" } else { "reverted" },
                current.as_deref().unwrap_or("none")
            );
            Ok(())
        }
        Err(e) => {
            if e.attempted() > 0 {
                warn!("{} step(s) attempted, all rolled back", e.attempted());
            }
            Err(e).context("migration failed")
        }
    }
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    if let Some(dir) = &cli.steps_dir {
        config.steps_dir = dir.clone();
    }
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_database(config: &AppConfig) -> Result<Connection> {
    let path: &Path = &config.database.path;
    info!("opening database at {}", path.display());
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .context("failed to set pragmas")?;
    conn.busy_timeout(Duration::from_millis(config.database.busy_timeout_ms))
        .context("failed to set busy timeout")?;
    Ok(conn)
}
