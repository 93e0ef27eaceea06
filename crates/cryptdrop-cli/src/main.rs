//! cryptdrop: encrypt files locally, store and share them
//!
//! Local commands (no storage access):
//!   encrypt <file>            - write <file>.encrypted next to the input
//!   decrypt <file.encrypted>  - recover the original file
//!
//! Account commands:
//!   signup / signin <email>   - create an account or start a session (prints a token)
//!   signout                   - end the session named by --token
//!   whoami                    - show the account behind --token
//!
//! Storage commands (S3 credentials from the environment):
//!   upload <file>             - encrypt if needed, then store under your namespace
//!   list                      - your stored files, newest first
//!   link <id> / share <id>    - signed download URL (owner-only / public)
//!   pull <id>                 - download, optionally decrypting
//!   delete <id>               - remove a stored file
//!   reconcile                 - retry cleanup left over from partial failures
//!   status                    - storage reachability and local state

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};

use cryptdrop_auth::{Credential, LocalAccounts, S3Credentials};
use cryptdrop_core::config::CryptdropConfig;
use cryptdrop_core::{ErrorBody, VaultError};
use cryptdrop_crypto::{FileCodec, LocalFile, ProgressFn, Workflow, ENCRYPTED_MIME};
use cryptdrop_storage::OpendalStore;
use cryptdrop_vault::{JsonCatalog, MetadataCatalog, ReconcileQueue, StorageOrchestrator};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "cryptdrop",
    version,
    about = "Client-side encrypted file storage",
    long_about = "cryptdrop: encrypt files with a password before they leave your machine, \
                  then store, list, share and delete them"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(
        long,
        short = 'c',
        env = "CRYPTDROP_CONFIG",
        default_value = "~/.config/cryptdrop/config.toml",
        global = true
    )]
    config: PathBuf,

    /// Bearer token from `cryptdrop signin`
    #[arg(long, env = "CRYPTDROP_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Log output format (overrides log.format)
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a local file with a password
    Encrypt {
        input: PathBuf,
        /// Output path (default: `<input>.encrypted` alongside the input)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,
    },

    /// Decrypt a `.encrypted` file
    Decrypt {
        input: PathBuf,
        /// Output path (default: the input without `.encrypted`)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },

    /// Create an account and start a session
    Signup { email: String },

    /// Start a session for an existing account
    Signin { email: String },

    /// End the current session
    Signout,

    /// Show the account behind the current token
    Whoami,

    /// Store a file, encrypting it first unless it is already `.encrypted`
    Upload { file: PathBuf },

    /// List stored files
    List {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Signed download URL for one of your files
    Link { id: String },

    /// Public share URL; anyone holding the record id can mint one
    Share { id: String },

    /// Download a stored file
    Pull {
        id: String,
        /// Output path (default: the stored name in the current directory)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Decrypt after downloading
        #[arg(long)]
        decrypt: bool,
        #[arg(long)]
        force: bool,
    },

    /// Delete a stored file
    Delete { id: String },

    /// Retry cleanup tasks left by partial failures
    Reconcile {
        /// Only list pending tasks
        #[arg(long)]
        dry_run: bool,
    },

    /// Show storage reachability and local state
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let body = error_body(&e);
            match serde_json::to_string(&body) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = expand_tilde(&cli.config);
    let config = load_config(&config_path).await?;

    let format = cli.log_format.unwrap_or(if config.log.format == "json" {
        LogFormat::Json
    } else {
        LogFormat::Text
    });
    init_logging(&config.log.level, format);
    tracing::debug!(config = %config_path.display(), "configuration loaded");

    let token = cli.token.as_deref();
    match cli.command {
        Commands::Encrypt { input, output, force } => {
            cmd_encrypt(&config, &input, output.as_deref(), force).await
        }
        Commands::Decrypt { input, output, force } => {
            cmd_decrypt(&config, &input, output.as_deref(), force).await
        }
        Commands::Signup { email } => cmd_signup(&config, &email),
        Commands::Signin { email } => cmd_signin(&config, &email),
        Commands::Signout => cmd_signout(&config, token),
        Commands::Whoami => cmd_whoami(&config, token),
        Commands::Upload { file } => cmd_upload(&config, token, &file).await,
        Commands::List { json } => cmd_list(&config, token, json).await,
        Commands::Link { id } => cmd_link(&config, token, &id, false).await,
        Commands::Share { id } => cmd_link(&config, token, &id, true).await,
        Commands::Pull { id, output, decrypt, force } => {
            cmd_pull(&config, token, &id, output.as_deref(), decrypt, force).await
        }
        Commands::Delete { id } => cmd_delete(&config, token, &id).await,
        Commands::Reconcile { dry_run } => cmd_reconcile(&config, dry_run).await,
        Commands::Status => cmd_status(&config, token).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_env("CRYPTDROP_LOG").unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Machine-readable failure body. Errors that did not originate in the vault
/// are reported as internal.
fn error_body(err: &anyhow::Error) -> ErrorBody {
    match err.downcast_ref::<VaultError>() {
        Some(vault_err) => ErrorBody::from(vault_err),
        None => ErrorBody {
            error: format!("{err:#}"),
            category: "internal",
            status: 500,
        },
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

async fn load_config(path: &Path) -> Result<CryptdropConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(CryptdropConfig::default())
    }
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(format!("{home}/{rest}"))
        }
        None => path.to_path_buf(),
    }
}

// ── Wiring ────────────────────────────────────────────────────────────────────

fn open_accounts(config: &CryptdropConfig) -> Result<Arc<LocalAccounts>> {
    let path = expand_tilde(&config.auth.accounts_path);
    let accounts = LocalAccounts::open(&path, &config.auth)
        .with_context(|| format!("opening accounts: {}", path.display()))?;
    Ok(Arc::new(accounts))
}

/// Build an operator using S3 credentials from environment variables.
fn build_operator_from_env(config: &CryptdropConfig) -> Result<opendal::Operator> {
    let creds = S3Credentials::from_env().context(
        "S3 credentials not set\n\
         Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.\n\
         Example:\n\
         \texport AWS_ACCESS_KEY_ID=your-key\n\
         \texport AWS_SECRET_ACCESS_KEY=your-secret",
    )?;
    cryptdrop_storage::open_from_config(
        &config.storage,
        &creds.access_key_id,
        creds.secret_access_key.expose_secret(),
    )
    .context("building storage operator")
}

fn open_vault(config: &CryptdropConfig) -> Result<StorageOrchestrator> {
    let op = build_operator_from_env(config)?;
    let accounts = open_accounts(config)?;

    let catalog_path = expand_tilde(&config.catalog.path);
    let catalog = JsonCatalog::open(&catalog_path)
        .with_context(|| format!("opening catalog: {}", catalog_path.display()))?;

    let queue_path = expand_tilde(&config.catalog.reconcile_path);
    let queue = ReconcileQueue::open(&queue_path)
        .with_context(|| format!("opening reconcile queue: {}", queue_path.display()))?;
    if !queue.is_empty() {
        tracing::warn!(pending = queue.len(), "cleanup tasks pending; run `cryptdrop reconcile`");
    }

    Ok(StorageOrchestrator::new(
        Arc::new(OpendalStore::new(op)),
        Arc::new(catalog),
        accounts,
        &config.share,
        &config.auth,
    )
    .with_reconcile_queue(queue)
    .with_max_upload_bytes(config.crypto.max_file_bytes))
}

fn require_credential(token: Option<&str>) -> Result<Credential> {
    let token = token.filter(|t| !t.is_empty()).ok_or_else(|| {
        VaultError::Auth("missing bearer token; pass --token or set CRYPTDROP_TOKEN".into())
    })?;
    Ok(Credential::bearer(token))
}

// ── Prompts and progress ──────────────────────────────────────────────────────

/// Read a password from `CRYPTDROP_PASSWORD`, or prompt on the terminal.
fn read_password(prompt: &str) -> Result<SecretString> {
    if let Ok(pw) = std::env::var("CRYPTDROP_PASSWORD") {
        return Ok(SecretString::from(pw));
    }
    let pw = rpassword::prompt_password(prompt).context("reading password")?;
    Ok(SecretString::from(pw))
}

/// Password plus confirmation. The environment variable counts as both.
fn read_new_password() -> Result<(SecretString, SecretString)> {
    if let Ok(pw) = std::env::var("CRYPTDROP_PASSWORD") {
        return Ok((SecretString::from(pw.clone()), SecretString::from(pw)));
    }
    let pw = rpassword::prompt_password("Password: ").context("reading password")?;
    let confirm = rpassword::prompt_password("Confirm password: ").context("reading password")?;
    Ok((SecretString::from(pw), SecretString::from(confirm)))
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}% {msg}")
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn make_progress_bar(prefix: &str) -> (ProgressBar, ProgressFn) {
    let pb = ProgressBar::new(100);
    pb.set_style(bar_style());
    pb.set_prefix(prefix.to_string());

    let pb_clone = pb.clone();
    let progress: ProgressFn = Box::new(move |done, total, msg| {
        pb_clone.set_length(total);
        pb_clone.set_position(done);
        pb_clone.set_message(msg.to_string());
    });
    (pb, progress)
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

async fn write_output(path: &Path, data: &[u8], force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "refusing to overwrite {} (use --force)",
            path.display()
        );
    }
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

/// Default output location: `name` in the input's directory.
fn sibling(input: &Path, name: &str) -> PathBuf {
    input.with_file_name(name)
}

// ── `cryptdrop encrypt` / `decrypt` ───────────────────────────────────────────

/// Run the encrypt step of the workflow on a file read from disk.
fn seal(config: &CryptdropConfig, input: &Path) -> Result<LocalFile> {
    let file = LocalFile::read(input)?;
    let (password, confirm) = read_new_password()?;

    let (pb, progress) = make_progress_bar("encrypt");
    let mut workflow = Workflow::from_config(&config.crypto)?.with_progress(progress);
    workflow.select(file)?;
    let sealed = workflow.encrypt(&password, &confirm)?.clone();
    pb.finish_and_clear();
    Ok(sealed)
}

async fn cmd_encrypt(
    config: &CryptdropConfig,
    input: &Path,
    output: Option<&Path>,
    force: bool,
) -> Result<()> {
    let sealed = seal(config, input)?;
    let out = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| sibling(input, &sealed.name));
    write_output(&out, &sealed.data, force).await?;

    println!("Encrypted {} → {}", input.display(), out.display());
    println!("  bytes:   {}", fmt_bytes(sealed.len() as u64));
    Ok(())
}

async fn cmd_decrypt(
    config: &CryptdropConfig,
    input: &Path,
    output: Option<&Path>,
    force: bool,
) -> Result<()> {
    let file = LocalFile::read(input)?;
    let password = read_password("Password: ")?;

    let (pb, progress) = make_progress_bar("decrypt");
    let mut workflow = Workflow::from_config(&config.crypto)?.with_progress(progress);
    workflow.select(file)?;
    let opened = workflow.decrypt(&password)?.clone();
    pb.finish_and_clear();

    let out = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| sibling(input, &opened.name));
    write_output(&out, &opened.data, force).await?;

    println!("Decrypted {} → {}", input.display(), out.display());
    println!("  bytes:   {}", fmt_bytes(opened.len() as u64));
    Ok(())
}

// ── Account commands ──────────────────────────────────────────────────────────

fn cmd_signup(config: &CryptdropConfig, email: &str) -> Result<()> {
    let accounts = open_accounts(config)?;
    let (password, confirm) = read_new_password()?;
    if password.expose_secret() != confirm.expose_secret() {
        return Err(VaultError::Validation("passwords do not match".into()).into());
    }
    let session = accounts.sign_up(email, &password)?;
    print_session(&session);
    Ok(())
}

fn cmd_signin(config: &CryptdropConfig, email: &str) -> Result<()> {
    let accounts = open_accounts(config)?;
    let password = read_password("Password: ")?;
    let session = accounts.sign_in(email, &password)?;
    print_session(&session);
    Ok(())
}

fn print_session(session: &cryptdrop_auth::Session) {
    println!("Signed in as {} ({})", session.user.email, session.user.user_id);
    println!();
    println!("export CRYPTDROP_TOKEN={}", session.access_token.expose_secret());
}

fn cmd_signout(config: &CryptdropConfig, token: Option<&str>) -> Result<()> {
    let credential = require_credential(token)?;
    open_accounts(config)?.sign_out(&credential)?;
    println!("Signed out");
    Ok(())
}

fn cmd_whoami(config: &CryptdropConfig, token: Option<&str>) -> Result<()> {
    let credential = require_credential(token)?;
    match open_accounts(config)?.session(&credential)? {
        Some(info) => println!("{} ({})", info.email, info.user_id),
        None => println!("no active session for this token"),
    }
    Ok(())
}

// ── Storage commands ──────────────────────────────────────────────────────────

async fn cmd_upload(config: &CryptdropConfig, token: Option<&str>, path: &Path) -> Result<()> {
    let vault = open_vault(config)?;
    let credential = token.map(|t| require_credential(Some(t))).transpose()?;

    let file = LocalFile::read(path)?;
    let file = if file.is_encrypted() {
        file
    } else {
        println!("{} is not encrypted; encrypting before upload", path.display());
        seal(config, path)?
    };

    let pb = make_spinner("upload");
    pb.set_message(file.name.clone());
    let receipt = vault.upload(credential.as_ref(), &file).await;
    pb.finish_and_clear();
    let receipt = receipt?;

    println!("Uploaded {}", file.name);
    println!("  id:      {}", receipt.record_id);
    println!("  path:    {}", receipt.file_path);
    println!("  bytes:   {}", fmt_bytes(file.len() as u64));
    Ok(())
}

async fn cmd_list(config: &CryptdropConfig, token: Option<&str>, json: bool) -> Result<()> {
    let credential = require_credential(token)?;
    let records = open_vault(config)?.list(&credential).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("serializing records")?
        );
        return Ok(());
    }
    if records.is_empty() {
        println!("no stored files");
        return Ok(());
    }
    for r in &records {
        println!(
            "{}  {:>10}  {}  {}",
            r.id,
            fmt_bytes(r.file_size),
            fmt_age(r.uploaded_at),
            r.file_name
        );
    }
    Ok(())
}

async fn cmd_link(
    config: &CryptdropConfig,
    token: Option<&str>,
    id: &str,
    public: bool,
) -> Result<()> {
    let vault = open_vault(config)?;
    let link = if public {
        vault.share_link(id).await?
    } else {
        vault.download_link(id, &require_credential(token)?).await?
    };

    println!("{}", link.url);
    eprintln!(
        "{} (expires in {}s{})",
        link.file_name,
        link.expires_in_secs,
        if link.public { ", public" } else { "" }
    );
    Ok(())
}

async fn cmd_pull(
    config: &CryptdropConfig,
    token: Option<&str>,
    id: &str,
    output: Option<&Path>,
    decrypt: bool,
    force: bool,
) -> Result<()> {
    let credential = require_credential(token)?;
    let vault = open_vault(config)?;

    let pb = make_spinner("pull");
    pb.set_message(id.to_string());
    let fetched = vault.fetch(id, &credential).await;
    pb.finish_and_clear();
    let (record, bytes) = fetched?;

    let mut file = LocalFile::new(record.file_name, ENCRYPTED_MIME, bytes);
    if decrypt {
        let password = read_password("Password: ")?;
        file = FileCodec::from_config(&config.crypto)?.decrypt_file(&file, &password)?;
    }

    let out = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&file.name));
    write_output(&out, &file.data, force).await?;

    println!("Pulled {} → {}", id, out.display());
    println!("  bytes:   {}", fmt_bytes(file.len() as u64));
    Ok(())
}

async fn cmd_delete(config: &CryptdropConfig, token: Option<&str>, id: &str) -> Result<()> {
    let credential = require_credential(token)?;
    let receipt = open_vault(config)?.delete(id, &credential).await?;
    println!("Deleted {}", receipt.record_id);
    Ok(())
}

async fn cmd_reconcile(config: &CryptdropConfig, dry_run: bool) -> Result<()> {
    let vault = open_vault(config)?;
    let pending = vault.reconcile_queue().list();
    if pending.is_empty() {
        println!("nothing to reconcile");
        return Ok(());
    }

    if dry_run {
        println!(
            "{}",
            serde_json::to_string_pretty(&pending).context("serializing tasks")?
        );
        return Ok(());
    }

    let report = vault.reconcile().await;
    println!("Reconcile complete:");
    println!("  resolved:  {}", report.resolved);
    println!("  remaining: {}", report.remaining);
    Ok(())
}

// ── `cryptdrop status` ────────────────────────────────────────────────────────

async fn cmd_status(config: &CryptdropConfig, token: Option<&str>) -> Result<()> {
    println!("cryptdrop v{}", env!("CARGO_PKG_VERSION"));
    println!("  endpoint:  {}", config.storage.endpoint);
    println!("  bucket:    {}", config.storage.bucket);

    let storage = match build_operator_from_env(config) {
        Ok(op) => match cryptdrop_storage::check_health(&op).await {
            Ok(()) => "ok".to_string(),
            Err(e) => format!("UNREACHABLE ({e})"),
        },
        Err(_) => "no credentials (set AWS_ACCESS_KEY_ID)".to_string(),
    };
    println!("  storage:   {storage}");

    let catalog_path = expand_tilde(&config.catalog.path);
    let total = JsonCatalog::open(&catalog_path)?.query(None).await?.len();
    println!("  catalog:   {} ({} records)", catalog_path.display(), total);

    let queue = ReconcileQueue::open(&expand_tilde(&config.catalog.reconcile_path))?;
    println!("  pending:   {} cleanup tasks", queue.len());

    if let Some(t) = token {
        let who = open_accounts(config)?
            .session(&Credential::bearer(t))?
            .map(|info| format!("{} ({})", info.email, info.user_id))
            .unwrap_or_else(|| "invalid or expired token".to_string());
        println!("  session:   {who}");
    }
    println!(
        "  links:     download {}s, share {}s, public {}",
        config.share.download_link_ttl_secs,
        config.share.share_link_ttl_secs,
        if config.share.public_links { "on" } else { "off" }
    );
    Ok(())
}

// ── `cryptdrop config show` ───────────────────────────────────────────────────

fn cmd_config_show(config: &CryptdropConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── Formatting ────────────────────────────────────────────────────────────────

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Coarse age of a Unix-millisecond timestamp, e.g. `5m ago`.
fn fmt_age(uploaded_at_ms: u64) -> String {
    let now = cryptdrop_core::types::now_millis();
    let secs = now.saturating_sub(uploaded_at_ms) / 1000;
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
