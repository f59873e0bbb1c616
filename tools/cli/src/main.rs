//! PageVault CLI - Command line interface for encrypted pages.
//!
//! Every command that touches pages signs in, performs one operation and
//! signs out again, so the password-derived key never outlives the process.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use pagevault_common::{Page, PageId, User};
use pagevault_custody::{CustodyConfig, KeyCustodyContext, SessionToken};
use pagevault_storage::{MemoryCache, SqliteStore};

#[derive(Parser)]
#[command(name = "pagevault")]
#[command(about = "PageVault - Encrypted page storage")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides the configuration).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account.
    Signup {
        /// Account name.
        #[arg(short, long)]
        username: String,

        /// Email address.
        #[arg(short, long)]
        email: String,
    },

    /// Print an account's public salts as JSON.
    Salts {
        /// Account name.
        #[arg(short, long)]
        username: String,
    },

    /// List the titles of every page you can access.
    List {
        /// Account name.
        #[arg(short, long)]
        username: String,
    },

    /// Decrypt and print a page.
    Read {
        /// Account name.
        #[arg(short, long)]
        username: String,

        /// Page id.
        #[arg(short, long)]
        page: i64,
    },

    /// Create a page, or overwrite one you may edit.
    Write {
        /// Account name.
        #[arg(short, long)]
        username: String,

        /// Page id to overwrite (omit to create a new page).
        #[arg(short, long)]
        page: Option<i64>,

        /// Page title.
        #[arg(short, long)]
        title: String,

        /// File holding the page body (default: empty body).
        #[arg(short, long)]
        body: Option<PathBuf>,
    },

    /// Delete a page you own.
    Delete {
        /// Account name.
        #[arg(short, long)]
        username: String,

        /// Page id.
        #[arg(short, long)]
        page: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let ctx = build_context(cli.config.as_deref(), cli.db)?;

    match cli.command {
        Commands::Signup { username, email } => cmd_signup(&ctx, &username, &email).await,

        Commands::Salts { username } => cmd_salts(&ctx, &username).await,

        Commands::List { username } => cmd_list(&ctx, &username).await,

        Commands::Read { username, page } => cmd_read(&ctx, &username, PageId::new(page)).await,

        Commands::Write {
            username,
            page,
            title,
            body,
        } => cmd_write(&ctx, &username, page.map(PageId::new), &title, body.as_deref()).await,

        Commands::Delete { username, page } => {
            cmd_delete(&ctx, &username, PageId::new(page)).await
        }
    }
}

/// Resolve configuration and open the database.
fn build_context(config_path: Option<&Path>, db: Option<PathBuf>) -> Result<KeyCustodyContext> {
    let config = match config_path {
        Some(path) => CustodyConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => CustodyConfig::default(),
    };

    let db_path = match db.or_else(|| config.database_path.clone()) {
        Some(path) => path,
        None => default_database_path()?,
    };
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    debug!(path = %db_path.display(), "Opening database");
    let store = SqliteStore::open(&db_path).context("Failed to open database")?;

    Ok(KeyCustodyContext::new(
        Arc::new(store),
        Arc::new(MemoryCache::new()),
        &config,
    ))
}

fn default_database_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("Could not determine data directory")?;
    Ok(data_dir.join("pagevault").join("pages.db"))
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<Zeroizing<Vec<u8>>> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(password.into_bytes()))
}

/// Prompt for a password and start a session.
async fn sign_in(ctx: &KeyCustodyContext, username: &str) -> Result<(User, SessionToken)> {
    let password = prompt_password("Enter password: ")?;
    ctx.accounts()
        .sign_in(username, &password)
        .await
        .context("Failed to sign in")
}

async fn sign_out(ctx: &KeyCustodyContext, user: &User, token: SessionToken) -> Result<()> {
    ctx.sessions()
        .end_session(user.id, token.as_str())
        .await
        .context("Failed to end session")
}

/// Create a new account.
async fn cmd_signup(ctx: &KeyCustodyContext, username: &str, email: &str) -> Result<()> {
    info!("Creating account: {}", username);

    let password = prompt_password("Enter password: ")?;
    let confirm = prompt_password("Confirm password: ")?;

    if *password != *confirm {
        anyhow::bail!("Passwords do not match");
    }

    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    let user = ctx
        .accounts()
        .signup(username, email, &password)
        .await
        .context("Failed to create account")?;

    println!("Account created successfully!");
    println!("  ID: {}", user.id);
    println!("  Username: {}", user.username);

    Ok(())
}

/// Print public salts.
async fn cmd_salts(ctx: &KeyCustodyContext, username: &str) -> Result<()> {
    let salts = ctx
        .accounts()
        .salts(username)
        .await
        .context("Failed to look up salts")?;

    println!("{}", serde_json::to_string_pretty(&salts)?);
    Ok(())
}

/// List page titles.
async fn cmd_list(ctx: &KeyCustodyContext, username: &str) -> Result<()> {
    let (user, token) = sign_in(ctx, username).await?;
    let titles = ctx.pages().get_page_titles(&user).await;
    sign_out(ctx, &user, token).await?;

    let titles = titles.context("Failed to list pages")?;
    if titles.is_empty() {
        println!("No pages.");
    } else {
        for (id, title) in titles {
            println!("  [{}] {}", id, String::from_utf8_lossy(&title));
        }
    }

    Ok(())
}

/// Decrypt and print one page.
async fn cmd_read(ctx: &KeyCustodyContext, username: &str, page_id: PageId) -> Result<()> {
    let (user, token) = sign_in(ctx, username).await?;
    let page = ctx.pages().load_and_decrypt(page_id, &user).await;
    sign_out(ctx, &user, token).await?;

    let page = page
        .map_err(|e| anyhow::anyhow!(e.boundary_message()))
        .with_context(|| format!("Failed to read page {}", page_id))?;

    println!("# {}", String::from_utf8_lossy(&page.title));
    println!();
    println!("{}", String::from_utf8_lossy(&page.body));
    Ok(())
}

/// Create or overwrite a page.
async fn cmd_write(
    ctx: &KeyCustodyContext,
    username: &str,
    page_id: Option<PageId>,
    title: &str,
    body_file: Option<&Path>,
) -> Result<()> {
    let body = match body_file {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => Vec::new(),
    };

    let mut page = Page::draft(title, body);
    page.id = page_id;

    let (user, token) = sign_in(ctx, username).await?;
    let saved = ctx.pages().save_page(&page, &user).await;
    sign_out(ctx, &user, token).await?;

    let saved = saved.context("Failed to save page")?;
    println!("Page saved: {}", saved);
    Ok(())
}

/// Delete a page.
async fn cmd_delete(ctx: &KeyCustodyContext, username: &str, page_id: PageId) -> Result<()> {
    let (user, token) = sign_in(ctx, username).await?;
    let deleted = ctx.pages().delete_page(page_id, user.id).await;
    sign_out(ctx, &user, token).await?;

    deleted
        .map_err(|e| anyhow::anyhow!(e.boundary_message()))
        .with_context(|| format!("Failed to delete page {}", page_id))?;

    println!("Page deleted: {}", page_id);
    Ok(())
}
