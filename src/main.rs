use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use feedimport::config::Config;
use feedimport::feed::{
    build_client, fetch_feed, FeedImporter, FetchOutcome, ImportOptions, ImportStats,
};
use feedimport::storage::{Database, DatabaseError, Feed, NewFeed, NewPerson, RecordKind};
use feedimport::util::validate_feed_url;

/// Get the config directory path (~/.config/feedimport/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedimport"))
}

/// Create the config directory with user-only permissions
fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if config_dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(config_dir, perms) {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "feedimport", about = "Import RSS and Atom feeds into topic articles")]
struct Args {
    /// Config file (default: ~/.config/feedimport/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file, overrides the config file
    #[arg(long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage topics
    Topic {
        #[command(subcommand)]
        action: TopicCommand,
    },
    /// Manage persons articles can be attributed to
    Person {
        #[command(subcommand)]
        action: PersonCommand,
    },
    /// Manage feed subscriptions
    Feed {
        #[command(subcommand)]
        action: FeedCommand,
    },
    /// Fetch feeds and import their items
    Import {
        /// Only import this feed
        #[arg(long, value_name = "ID")]
        feed: Option<i64>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch a feed and print its items without storing anything
    Preview {
        url: String,
        /// Print items as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TopicCommand {
    Add {
        name: String,
        /// Content kind; only `blog` topics accept imports
        #[arg(long)]
        component: Option<String>,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum PersonCommand {
    Add {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        firstname: Option<String>,
        #[arg(long)]
        lastname: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum FeedCommand {
    Add {
        url: String,
        /// Topic the items are imported into
        #[arg(long, value_name = "ID")]
        topic: i64,
        #[arg(long)]
        title: Option<String>,
        /// Approve imported articles right away
        #[arg(long)]
        auto_approve: bool,
        /// Keep articles whose items disappear from the feed
        #[arg(long)]
        keep_removed: bool,
        /// Person used when an item author cannot be matched
        #[arg(long, value_name = "ID")]
        default_author: Option<i64>,
        /// Always attribute items to the default author
        #[arg(long, requires = "default_author")]
        force_author: bool,
    },
    List,
    Remove {
        id: i64,
    },
}

/// Outcome of importing one feed, as printed by `import`
#[derive(Debug, Serialize)]
struct FeedReport {
    feed_id: i64,
    title: String,
    imported: Vec<String>,
    stats: ImportStats,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Previews never touch the database
    if let Command::Preview { url, json } = &args.command {
        return preview(&config, url, *json).await;
    }

    let db_path = match &args.database {
        Some(path) => path.clone(),
        None => {
            ensure_config_dir(&config_dir)?;
            config.database_path(&config_dir)
        }
    };
    let db = open_database(&db_path).await?;

    match args.command {
        Command::Topic { action } => topic_command(&db, action).await,
        Command::Person { action } => person_command(&db, action).await,
        Command::Feed { action } => feed_command(&db, &config, action).await,
        Command::Import { feed, json } => import(&db, &config, feed, json).await,
        Command::Preview { url, json } => preview(&config, &url, json).await,
    }
}

async fn open_database(path: &Path) -> Result<Database> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => anyhow::bail!(
            "Database {} is locked by another process. Please try again later.",
            path.display()
        ),
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

async fn topic_command(db: &Database, action: TopicCommand) -> Result<()> {
    match action {
        TopicCommand::Add { name, component } => {
            let id = db
                .create_topic(&name, component.as_deref())
                .await
                .context("Failed to create topic")?;
            println!("Created topic {id}: {name}");
        }
        TopicCommand::List => {
            for topic in db.get_topics().await.context("Failed to load topics")? {
                println!(
                    "{:>4}  {:<8}  {}",
                    topic.id,
                    topic.component.as_deref().unwrap_or("-"),
                    topic.name
                );
            }
        }
    }
    Ok(())
}

async fn person_command(db: &Database, action: PersonCommand) -> Result<()> {
    match action {
        PersonCommand::Add {
            username,
            email,
            firstname,
            lastname,
        } => {
            let person = db
                .create_person(&NewPerson {
                    username,
                    email,
                    firstname,
                    lastname,
                })
                .await
                .context("Failed to create person")?;
            println!("Created person {} ({})", person.id, person.guid);
        }
    }
    Ok(())
}

async fn feed_command(db: &Database, config: &Config, action: FeedCommand) -> Result<()> {
    match action {
        FeedCommand::Add {
            url,
            topic,
            title,
            auto_approve,
            keep_removed,
            default_author,
            force_author,
        } => {
            let url = validate_feed_url(&url, config.allow_private_urls)
                .with_context(|| format!("Refusing feed URL {url}"))?;
            if db.get_topic(topic).await?.is_none() {
                anyhow::bail!("Topic {topic} does not exist");
            }
            if let Some(author) = default_author {
                if db.get_person(author).await?.is_none() {
                    anyhow::bail!("Person {author} does not exist");
                }
            }

            let id = db
                .insert_feed(&NewFeed {
                    title: title.unwrap_or_else(|| url.to_string()),
                    url: url.to_string(),
                    topic_id: topic,
                    auto_approve,
                    keep_removed,
                    force_author,
                    default_author,
                })
                .await
                .context("Failed to add feed")?;
            println!("Added feed {id}: {url}");
        }
        FeedCommand::List => {
            for feed in db.get_feeds().await.context("Failed to load feeds")? {
                print_feed(&feed);
            }
        }
        FeedCommand::Remove { id } => {
            let feed = db
                .get_feed(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Feed {id} does not exist"))?;
            db.purge(&[feed.guid], RecordKind::Feed)
                .await
                .context("Failed to remove feed")?;
            println!("Removed feed {id}");
        }
    }
    Ok(())
}

fn print_feed(feed: &Feed) {
    let fetched = feed
        .latest_fetch
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "{:>4}  topic {:<4}  {:<16}  {}  {}",
        feed.id, feed.topic_id, fetched, feed.title, feed.url
    );
    if let Some(error) = &feed.last_error {
        println!("      last error: {error}");
    }
}

async fn import(db: &Database, config: &Config, feed_id: Option<i64>, json: bool) -> Result<()> {
    let options: ImportOptions = config
        .import_options()
        .context("Set fallback_author in the config file before importing")?;
    if db.get_person(options.fallback_author).await?.is_none() {
        anyhow::bail!(
            "fallback_author {} does not exist; create it with `person add`",
            options.fallback_author
        );
    }

    let feeds = match feed_id {
        Some(id) => vec![db
            .get_feed(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Feed {id} does not exist"))?],
        None => db.get_feeds().await.context("Failed to load feeds")?,
    };

    let client = build_client(&config.user_agent, options.limits.timeout)
        .context("Failed to create HTTP client")?;

    let mut reports = Vec::with_capacity(feeds.len());
    for feed in feeds {
        let mut importer = FeedImporter::new(db.clone(), client.clone(), feed, options);
        let (imported, mut error) = match importer.import().await {
            Ok(imported) => (imported, None),
            Err(e) => {
                tracing::error!(feed_id = importer.feed().id, error = %e, "Feed import aborted");
                (Vec::new(), Some(e.to_string()))
            }
        };
        if error.is_none() {
            error = importer.last_error().map(str::to_string);
        }

        let feed = importer.feed();
        reports.push(FeedReport {
            feed_id: feed.id,
            title: feed.title.clone(),
            imported,
            stats: importer.stats(),
            error,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        let s = report.stats;
        match &report.error {
            Some(error) => println!("{:>4}  {}: error: {}", report.feed_id, report.title, error),
            None => println!(
                "{:>4}  {}: {} created, {} updated, {} unchanged, {} skipped, {} failed",
                report.feed_id, report.title, s.created, s.updated, s.unchanged, s.skipped, s.failed
            ),
        }
    }
    Ok(())
}

async fn preview(config: &Config, url: &str, json: bool) -> Result<()> {
    let url = validate_feed_url(url, config.allow_private_urls)
        .with_context(|| format!("Refusing feed URL {url}"))?;
    let limits = config.fetch_limits();
    let client = build_client(&config.user_agent, limits.timeout)
        .context("Failed to create HTTP client")?;

    let items = match fetch_feed(&client, url.as_str(), None, &limits)
        .await
        .with_context(|| format!("Failed to fetch {url}"))?
    {
        FetchOutcome::Fetched { items, .. } => items,
        FetchOutcome::NotModified => Vec::new(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    for item in &items {
        let published = item
            .published
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "----------".to_string());
        println!("{}  {}", published, item.title);
        if let Some(link) = &item.link {
            println!("            {link}");
        }
    }
    println!("{} items", items.len());
    Ok(())
}
