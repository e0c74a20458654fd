//! DropMirror CLI - browse and reorganize a Dropbox account from the terminal.
//!
//! Settings (app credentials, refresh token, policies) live in a JSON file
//! under the user's configuration directory unless `--config` points
//! elsewhere.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use dropmirror_common::{RemotePath, Secret};
use dropmirror_storage::dropbox::AppCredentials;
use dropmirror_storage::{ContentHasher, Entry, RemoteStore};
use dropmirror_sync::{
    expand_selection, ClientSettings, ExistingFilesStrategy, MoveOutcome, Session, UploadOutcome,
};

#[derive(Parser)]
#[command(name = "dropmirror")]
#[command(about = "DropMirror - Dropbox folder tree management")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Settings file (default: per-user config directory).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the app key and secret.
    Setup {
        #[arg(short, long)]
        key: String,

        #[arg(short, long)]
        secret: String,
    },

    /// Start authorization and show the page to visit.
    Authorize {
        /// Print the URL instead of opening a browser.
        #[arg(long)]
        no_browser: bool,
    },

    /// Exchange the code shown after authorization.
    Code {
        code: String,
    },

    /// Show the signed-in account.
    Whoami,

    /// List a folder.
    Ls {
        #[arg(default_value = "/")]
        path: String,

        /// Include everything below the folder.
        #[arg(short, long)]
        recursive: bool,
    },

    /// Create a folder.
    Mkdir {
        /// Parent folder.
        parent: String,

        /// New folder name.
        name: String,
    },

    /// Move an entry into another folder.
    Mv {
        from: String,

        /// Destination folder.
        to_folder: String,
    },

    /// Delete entries.
    Rm {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Upload local files and folders; folders are recreated with their contents.
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Destination folder (default: root).
        #[arg(short, long, default_value = "/")]
        to: String,

        /// What to do when the name already exists (default: from settings).
        #[arg(short, long, value_enum)]
        strategy: Option<StrategyArg>,
    },

    /// Print the content hash of a local file.
    Hash {
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Skip,
    Update,
}

impl From<StrategyArg> for ExistingFilesStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Skip => ExistingFilesStrategy::Skip,
            StrategyArg::Update => ExistingFilesStrategy::Update,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match cli.config {
        Some(path) => path,
        None => ClientSettings::default_path().context("No configuration directory")?,
    };

    match cli.command {
        Commands::Setup { key, secret } => cmd_setup(&config_path, key, secret),

        Commands::Authorize { no_browser } => cmd_authorize(&config_path, no_browser).await,

        Commands::Code { code } => cmd_code(&config_path, &code).await,

        Commands::Whoami => cmd_whoami(&config_path).await,

        Commands::Ls { path, recursive } => cmd_ls(&config_path, &path, recursive).await,

        Commands::Mkdir { parent, name } => cmd_mkdir(&config_path, &parent, &name).await,

        Commands::Mv { from, to_folder } => cmd_mv(&config_path, &from, &to_folder).await,

        Commands::Rm { paths } => cmd_rm(&config_path, &paths).await,

        Commands::Upload { files, to, strategy } => {
            cmd_upload(&config_path, &files, &to, strategy).await
        }

        Commands::Hash { file } => cmd_hash(&file).await,
    }
}

fn load_settings(path: &Path) -> Result<ClientSettings> {
    ClientSettings::load_or_default(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn connect(path: &Path) -> Result<(ClientSettings, Session)> {
    let settings = load_settings(path)?;
    let session = Session::connect(&settings)
        .context("Not set up; run `dropmirror setup --key <KEY> --secret <SECRET>`")?;
    Ok((settings, session))
}

fn parse_path(path: &str) -> Result<RemotePath> {
    RemotePath::parse(path).with_context(|| format!("Invalid path: {}", path))
}

fn print_entry(entry: &Entry) {
    if entry.is_folder() {
        println!("  [DIR]  {}/", entry.path_display);
    } else {
        println!("  [FILE] {} ({} bytes)", entry.path_display, entry.size());
    }
}

/// Store app credentials.
fn cmd_setup(config_path: &Path, key: String, secret: String) -> Result<()> {
    let mut settings = load_settings(config_path)?;
    settings.credentials = AppCredentials::new(key, secret);
    settings.refresh_token = Secret::default();
    settings
        .save(config_path)
        .context("Failed to save settings")?;

    println!("Credentials saved to {}", config_path.display());
    println!("Run `dropmirror authorize` next.");
    Ok(())
}

/// Begin the authorization flow.
async fn cmd_authorize(config_path: &Path, no_browser: bool) -> Result<()> {
    let (mut settings, session) = connect(config_path)?;

    let url = session
        .token_manager()
        .begin_authorization()
        .await
        .context("Failed to build authorization URL")?;

    settings.refresh_token = Secret::default();
    settings
        .save(config_path)
        .context("Failed to save settings")?;

    if no_browser {
        println!("Visit this page and approve access:");
    } else if let Err(e) = open::that(&url) {
        warn!("Could not open a browser: {}", e);
        println!("Visit this page and approve access:");
    } else {
        println!("Opened the authorization page in your browser.");
    }
    println!("  {}", url);
    println!("Then run `dropmirror code <CODE>` with the code shown.");
    Ok(())
}

/// Exchange an authorization code and persist the refresh token.
async fn cmd_code(config_path: &Path, code: &str) -> Result<()> {
    let (mut settings, session) = connect(config_path)?;

    let refresh = session
        .token_manager()
        .exchange_authorization_code(code)
        .await
        .context("Failed to exchange authorization code")?;

    settings.refresh_token = refresh;
    settings
        .save(config_path)
        .context("Failed to save settings")?;

    println!("Authorized.");
    Ok(())
}

/// Show the account.
async fn cmd_whoami(config_path: &Path) -> Result<()> {
    let (_, mut session) = connect(config_path)?;

    let account = session
        .controller()
        .current_account()
        .await
        .context("Failed to fetch account")?;

    println!("{} <{}>", account.display_name, account.email);
    println!("  Account: {}", account.account_id);
    if let Some(country) = &account.country {
        println!("  Country: {}", country);
    }
    Ok(())
}

/// List a folder.
async fn cmd_ls(config_path: &Path, path: &str, recursive: bool) -> Result<()> {
    let (_, mut session) = connect(config_path)?;
    let folder = parse_path(path)?;

    let entries: Vec<Entry> = if recursive {
        session
            .store()
            .list_folder(&folder, true)
            .await
            .context("Failed to list folder")?
    } else {
        let controller = session.controller();
        let children = match controller.locate(&folder).await? {
            Some(id) => controller.open(&id).await?,
            None => controller.tree().roots().to_vec(),
        };
        children
            .iter()
            .filter_map(|id| controller.tree().get(id))
            .map(|node| node.entry.clone())
            .collect()
    };

    if entries.is_empty() {
        println!("Folder is empty.");
    } else {
        println!("Contents of {}:", folder);
        for entry in &entries {
            print_entry(entry);
        }
    }
    Ok(())
}

/// Create a folder.
async fn cmd_mkdir(config_path: &Path, parent: &str, name: &str) -> Result<()> {
    let (_, mut session) = connect(config_path)?;
    let controller = session.controller();

    let parent_id = controller.locate(&parse_path(parent)?).await?;
    let id = controller
        .create_folder(parent_id.as_ref(), name)
        .await
        .context("Failed to create folder")?;

    if let Some(node) = controller.tree().get(&id) {
        println!("Folder created: {}", node.entry.path_display);
    }
    Ok(())
}

/// Move an entry.
async fn cmd_mv(config_path: &Path, from: &str, to_folder: &str) -> Result<()> {
    let (_, mut session) = connect(config_path)?;
    let controller = session.controller();

    let source = parse_path(from)?;
    let id = controller
        .locate(&source)
        .await?
        .context("Cannot move the root folder")?;
    let target = controller.locate(&parse_path(to_folder)?).await?;

    match controller
        .move_node(&id, target.as_ref())
        .await
        .context("Failed to move")?
    {
        MoveOutcome::Moved(entry) => {
            println!("Moved {} -> {}", source, entry.path_display)
        }
        MoveOutcome::Unchanged => println!("Already there."),
    }
    Ok(())
}

/// Delete entries; Ctrl-C abandons a running batch.
async fn cmd_rm(config_path: &Path, paths: &[String]) -> Result<()> {
    let (_, mut session) = connect(config_path)?;
    let controller = session.controller();

    let mut ids = Vec::with_capacity(paths.len());
    for path in paths {
        let id = controller
            .locate(&parse_path(path)?)
            .await?
            .context("Cannot delete the root folder")?;
        ids.push(id);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    info!("Deleting {} entries", ids.len());
    let report = controller
        .delete(&ids, &cancel)
        .await
        .context("Failed to delete")?;

    println!("Deleted {} entries.", report.deleted.len());
    if !report.is_complete() {
        println!("{} entries were not deleted:", report.failed.len());
        for reason in &report.reasons {
            println!("  {}", reason);
        }
    }
    Ok(())
}

/// Upload local files and folders.
///
/// Folders are created first, then each file goes into its folder. Dot files
/// and dot folders are left out.
async fn cmd_upload(
    config_path: &Path,
    files: &[PathBuf],
    to: &str,
    strategy: Option<StrategyArg>,
) -> Result<()> {
    let (settings, mut session) = connect(config_path)?;
    let strategy = strategy.map(Into::into).unwrap_or(settings.existing_files);

    let selection = expand_selection(files).context("Failed to read the selection")?;
    if selection.is_empty() {
        println!("Nothing to upload.");
        return Ok(());
    }

    let controller = session.controller();
    let destination = controller.locate(&parse_path(to)?).await?;

    for folder in &selection.folders {
        controller
            .ensure_folder_path(destination.as_ref(), &folder.target)
            .await
            .with_context(|| format!("Failed to create {}", folder.target))?;
    }

    let (mut uploaded, mut skipped) = (0usize, 0usize);
    for file in &selection.files {
        let name = file
            .target
            .name()
            .with_context(|| format!("{} has no file name", file.source.display()))?;
        let parent = controller
            .ensure_folder_path(destination.as_ref(), &file.target.parent().unwrap_or_default())
            .await?;
        let payload = tokio::fs::read(&file.source)
            .await
            .with_context(|| format!("Failed to read {}", file.source.display()))?;

        match controller
            .upload(parent.as_ref(), name, Bytes::from(payload), strategy)
            .await
            .with_context(|| format!("Failed to upload {}", file.source.display()))?
        {
            UploadOutcome::Uploaded(entry) => {
                uploaded += 1;
                println!("Uploaded {} ({} bytes)", entry.path_display, entry.size())
            }
            UploadOutcome::Skipped(_) => {
                skipped += 1;
                println!("Skipped {}: kept the existing file.", file.target)
            }
        }
    }

    if selection.files.len() > 1 {
        println!(
            "{} uploaded, {} skipped, {} folders.",
            uploaded,
            skipped,
            selection.folders.len()
        );
    }
    Ok(())
}

/// Hash a local file the way the service does.
async fn cmd_hash(file: &Path) -> Result<()> {
    let mut input = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;

    let mut hasher = ContentHasher::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = input.read(&mut buf).await.context("Failed to read file")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    println!("{}  {}", hasher.finalize(), file.display());
    Ok(())
}
