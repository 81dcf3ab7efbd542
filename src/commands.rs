//! CLI command handlers.
//!
//! Each handler takes the [`Session`] for this invocation and writes its
//! report to the given output.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use tokio::sync::mpsc;

use crate::config::{parse_interval, Config};
use crate::feed::build_client;
use crate::report;
use crate::scheduler;
use crate::storage::{Database, User};
use crate::util::{cancel_pair, CancelToken};

const EVENT_BUFFER: usize = 64;

/// Loaded configuration plus the open database for one CLI invocation.
pub struct Session {
    pub config: Config,
    pub config_path: PathBuf,
    pub db: Database,
}

impl Session {
    /// Load the config at `config_path` and open the database it points to.
    pub async fn open(config_path: PathBuf) -> Result<Self> {
        let config = Config::load(&config_path)
            .with_context(|| format!("Failed to load config '{}'", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default();
        let db_path = config.database_path_in(&config_dir);
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory '{}'", parent.display())
                })?;
            }
        }

        let db_path_str = db_path
            .to_str()
            .ok_or_else(|| anyhow!("Database path is not valid UTF-8: {}", db_path.display()))?;
        let db = Database::open(db_path_str)
            .await
            .with_context(|| format!("Failed to open database '{}'", db_path.display()))?;

        Ok(Self {
            config,
            config_path,
            db,
        })
    }

    /// The logged-in user, or an error telling how to log in.
    pub async fn current_user(&self) -> Result<User> {
        let name = self
            .config
            .current_user_name
            .as_deref()
            .ok_or_else(|| anyhow!("Not logged in. Run `gleaner login <name>` first"))?;

        self.db
            .get_user_by_name(name)
            .await?
            .ok_or_else(|| anyhow!("Current user '{}' no longer exists. Log in again", name))
    }
}

pub async fn register(session: &mut Session, name: &str, out: &mut impl Write) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("User name must not be empty");
    }

    let user = session.db.create_user(name, Utc::now()).await.map_err(|e| {
        if e.is_duplicate() {
            anyhow!("User '{}' already exists", name)
        } else {
            anyhow::Error::new(e).context("Failed to create user")
        }
    })?;

    session
        .config
        .set_user(&user.name, &session.config_path)
        .context("Failed to save current user")?;
    tracing::info!(user = %user.name, "Registered user");
    writeln!(out, "User {} created and logged in", user.name)?;
    Ok(())
}

pub async fn login(session: &mut Session, name: &str, out: &mut impl Write) -> Result<()> {
    let user = session
        .db
        .get_user_by_name(name)
        .await?
        .ok_or_else(|| anyhow!("User '{}' does not exist", name))?;

    session
        .config
        .set_user(&user.name, &session.config_path)
        .context("Failed to save current user")?;
    writeln!(out, "Logged in as {}", user.name)?;
    Ok(())
}

pub async fn users(session: &Session, out: &mut impl Write) -> Result<()> {
    let users = session.db.list_users().await?;
    report::write_users(out, &users, session.config.current_user_name.as_deref())?;
    Ok(())
}

pub async fn reset(session: &Session, out: &mut impl Write) -> Result<()> {
    let removed = session.db.reset().await.context("Failed to reset database")?;
    tracing::info!(removed, "Database reset");
    writeln!(out, "Removed {} users and everything they owned", removed)?;
    Ok(())
}

pub async fn add_feed(
    session: &Session,
    name: &str,
    url: &str,
    out: &mut impl Write,
) -> Result<()> {
    let user = session.current_user().await?;
    let now = Utc::now();

    let feed = session
        .db
        .create_feed(name, url, user.id, now)
        .await
        .map_err(|e| {
            if e.is_duplicate() {
                anyhow!("A feed with URL '{}' is already registered", url)
            } else {
                anyhow::Error::new(e).context("Failed to add feed")
            }
        })?;
    let follow = session
        .db
        .create_feed_follow(user.id, feed.id, now)
        .await
        .context("Failed to follow new feed")?;

    tracing::info!(feed = %feed.url, user = %user.name, "Added feed");
    writeln!(out, "Added feed {} ({})", feed.name, feed.url)?;
    report::write_follow(out, &follow)?;
    Ok(())
}

pub async fn feeds(session: &Session, out: &mut impl Write) -> Result<()> {
    let feeds = session.db.list_feeds_with_creators().await?;
    report::write_feeds(out, &feeds)?;
    Ok(())
}

pub async fn follow(session: &Session, url: &str, out: &mut impl Write) -> Result<()> {
    let user = session.current_user().await?;
    let feed = session
        .db
        .get_feed_by_url(url)
        .await?
        .ok_or_else(|| anyhow!("No feed registered with URL '{}'", url))?;

    let follow = session
        .db
        .create_feed_follow(user.id, feed.id, Utc::now())
        .await
        .map_err(|e| {
            if e.is_duplicate() {
                anyhow!("{} already follows {}", user.name, feed.name)
            } else {
                anyhow::Error::new(e).context("Failed to follow feed")
            }
        })?;
    report::write_follow(out, &follow)?;
    Ok(())
}

pub async fn following(session: &Session, out: &mut impl Write) -> Result<()> {
    let user = session.current_user().await?;
    let names = session.db.get_follows_for_user(user.id).await?;
    report::write_following(out, &user.name, &names)?;
    Ok(())
}

pub async fn unfollow(session: &Session, url: &str, out: &mut impl Write) -> Result<()> {
    let user = session.current_user().await?;
    let feed = session
        .db
        .get_feed_by_url(url)
        .await?
        .ok_or_else(|| anyhow!("No feed registered with URL '{}'", url))?;

    if !session.db.delete_feed_follow(user.id, feed.id).await? {
        bail!("{} does not follow {}", user.name, feed.name);
    }
    writeln!(out, "{} unfollowed {}", user.name, feed.name)?;
    Ok(())
}

pub async fn browse(session: &Session, limit: i64, out: &mut impl Write) -> Result<()> {
    let user = session.current_user().await?;
    let posts = session.db.get_posts_for_user(user.id, limit).await?;
    report::write_posts(out, &posts)?;
    Ok(())
}

/// Run the refresh loop until Ctrl-C, printing each ingested post.
///
/// `interval` overrides `poll_interval` from the config.
pub async fn aggregate(
    session: &Session,
    interval: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    let (handle, token) = cancel_pair();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, stopping");
                handle.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    aggregate_until(session, interval, token, out).await
}

/// [`aggregate`] with an externally controlled cancel token.
pub async fn aggregate_until(
    session: &Session,
    interval: Option<&str>,
    cancel: CancelToken,
    out: &mut impl Write,
) -> Result<()> {
    let interval = interval.unwrap_or(session.config.poll_interval.as_str());
    parse_interval(interval)?;
    let client = build_client().context("Failed to build HTTP client")?;

    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(event) = rx.recv().await {
            if let Err(e) = report::write_event(&mut stdout, &event) {
                tracing::warn!(error = %e, "Failed to print ingested post");
            }
        }
    });

    writeln!(out, "Collecting feeds every {}", interval)?;
    scheduler::run_every(
        session.db.clone(),
        client,
        interval,
        session.config.feeds_per_tick,
        Some(tx),
        cancel,
    )
    .await?;

    // The scheduler dropped the sender; drain what is left
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Event printer stopped abnormally");
    }
    Ok(())
}
