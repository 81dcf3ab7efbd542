use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use gleaner::commands::{self, Session};
use gleaner::config::default_config_dir;
use gleaner::storage::DatabaseError;

#[derive(Parser, Debug)]
#[command(name = "gleaner", about = "Feed aggregator that polls RSS feeds into SQLite")]
struct Args {
    /// Config file (default: ~/.config/gleaner/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch the current user
    Login { name: String },
    /// List users
    Users,
    /// Delete all users, feeds, follows and posts
    Reset,
    /// Register a feed and follow it
    #[command(name = "addfeed")]
    AddFeed { name: String, url: String },
    /// List registered feeds
    Feeds,
    /// Follow a registered feed by URL
    Follow { url: String },
    /// List the feeds the current user follows
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Show the newest posts from followed feeds
    Browse {
        #[arg(default_value_t = 2)]
        limit: i64,
    },
    /// Poll feeds until interrupted (interval like "30s", "1m", "1h30m")
    Agg { interval: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so reports on stdout stay clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_dir()
            .context("Failed to locate config directory")?
            .join("config.toml"),
    };

    let mut session = match Session::open(config_path).await {
        Ok(session) => session,
        Err(e)
            if matches!(
                e.downcast_ref::<DatabaseError>(),
                Some(DatabaseError::InstanceLocked)
            ) =>
        {
            eprintln!("Error: the database is locked by another gleaner process. Try again later.");
            std::process::exit(1);
        }
        Err(e) => return Err(e),
    };

    let mut out = std::io::stdout();
    match args.command {
        Command::Register { name } => commands::register(&mut session, &name, &mut out).await,
        Command::Login { name } => commands::login(&mut session, &name, &mut out).await,
        Command::Users => commands::users(&session, &mut out).await,
        Command::Reset => commands::reset(&session, &mut out).await,
        Command::AddFeed { name, url } => commands::add_feed(&session, &name, &url, &mut out).await,
        Command::Feeds => commands::feeds(&session, &mut out).await,
        Command::Follow { url } => commands::follow(&session, &url, &mut out).await,
        Command::Following => commands::following(&session, &mut out).await,
        Command::Unfollow { url } => commands::unfollow(&session, &url, &mut out).await,
        Command::Browse { limit } => commands::browse(&session, limit, &mut out).await,
        Command::Agg { interval } => {
            commands::aggregate(&session, interval.as_deref(), &mut out).await
        }
    }
}
