//! Cofre CLI - Command line interface for the private vault.
//!
//! Hides photos, videos and contacts from their public locations behind a
//! master secret, and brings them back on demand.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use cofre_common::{BulkResult, ContactRecord};
use cofre_crypto::KdfParams;
use cofre_storage::{
    AccessStatus, ContactDirectory, FileContactDirectory, FileSecretStore, ALL_CONTACT_FIELDS,
};
use cofre_vault::{GateState, PurgeOutcome, UnlockToken, VaultConfig, VaultManager};

const SECRETS_FILENAME: &str = "secrets.json";
const CONTACTS_FILENAME: &str = "contacts.json";

#[derive(Parser)]
#[command(name = "cofre")]
#[command(about = "Cofre - Hide photos, videos and contacts behind a master secret")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// App storage root holding the vault and the secret store.
    #[arg(long, env = "COFRE_ROOT", global = true)]
    root: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Answer yes to confirmation prompts.
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the master secret.
    Init {
        /// KDF strength: "interactive" or "moderate".
        #[arg(short, long, default_value = "moderate")]
        strength: String,
    },

    /// Check the master secret.
    Unlock,

    /// Show what the vault holds.
    Status,

    /// Recovery question management.
    #[command(subcommand)]
    Recovery(RecoveryCommands),

    /// Hidden photos and videos.
    #[command(subcommand)]
    Media(MediaCommands),

    /// Hidden contacts.
    #[command(subcommand)]
    Contacts(ContactCommands),

    /// Delete the whole vault.
    Purge,

    /// Bundle the vault into a backup file.
    Export,

    /// Replay a backup file into the vault.
    Import {
        /// Backup file produced by `export`.
        artifact: PathBuf,
    },
}

#[derive(Subcommand)]
enum RecoveryCommands {
    /// Enroll the question asked before a reset.
    Enroll {
        /// Question shown when resetting.
        #[arg(short, long)]
        question: String,
    },

    /// Reset a forgotten master secret.
    Reset,
}

#[derive(Subcommand)]
enum MediaCommands {
    /// Move files into the vault.
    Hide {
        /// Files to hide.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List hidden media.
    List,

    /// Permanently delete a hidden file.
    Remove {
        /// File name in the vault.
        id: String,
    },

    /// Move a hidden file back out.
    Restore {
        /// File name in the vault.
        id: String,

        /// Destination directory.
        #[arg(long)]
        to: PathBuf,
    },
}

#[derive(Subcommand)]
enum ContactCommands {
    /// List the public address book.
    Public,

    /// Add a contact to the public address book.
    Add(AddContact),

    /// Move contacts from the address book into the vault.
    Hide {
        /// Address book ids.
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// List hidden contacts.
    List,

    /// Put a hidden contact back in the address book.
    Restore {
        /// Record file name, as shown by `contacts list`.
        file_name: String,
    },
}

#[derive(Args)]
struct AddContact {
    /// Contact name.
    #[arg(short, long)]
    name: String,

    /// Phone number; repeat for several.
    #[arg(short, long = "phone")]
    phones: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        if let Some(vault_error) = e.downcast_ref::<cofre_common::Error>() {
            eprintln!("{}", vault_error.guidance());
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.root, cli.config.as_deref()).await?;
    let yes = cli.yes;

    match cli.command {
        Commands::Init { strength } => cmd_init(config, &strength).await,
        Commands::Unlock => cmd_unlock(config).await,
        Commands::Status => cmd_status(config).await,
        Commands::Recovery(RecoveryCommands::Enroll { question }) => {
            cmd_recovery_enroll(config, &question).await
        }
        Commands::Recovery(RecoveryCommands::Reset) => cmd_recovery_reset(config).await,
        Commands::Media(command) => cmd_media(config, command, yes).await,
        Commands::Contacts(command) => cmd_contacts(config, command, yes).await,
        Commands::Purge => cmd_purge(config, yes).await,
        Commands::Export => cmd_export(config).await,
        Commands::Import { artifact } => cmd_import(config, &artifact, yes).await,
    }
}

/// Resolve the configuration: file values first, then the storage root.
async fn load_config(root: Option<PathBuf>, path: Option<&Path>) -> Result<VaultConfig> {
    let root = match root {
        Some(root) => root,
        None => dirs::data_local_dir()
            .context("Could not determine a data directory; pass --root")?
            .join("cofre"),
    };

    let mut config = match path {
        Some(path) => VaultConfig::load(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => VaultConfig::new(&root),
    };
    config.app_root = root;
    config.validate()?;

    debug!(root = %config.app_root.display(), "Configuration loaded");
    Ok(config)
}

fn open_manager(config: VaultConfig) -> Result<VaultManager> {
    let secrets = Arc::new(FileSecretStore::new(config.app_root.join(SECRETS_FILENAME)));
    let directory = Arc::new(FileContactDirectory::new(
        config.app_root.join(CONTACTS_FILENAME),
    ));
    Ok(VaultManager::new(config, secrets, directory)?)
}

/// Read the master secret from `COFRE_PASSWORD` or prompt for it.
fn read_secret(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(secret) = std::env::var("COFRE_PASSWORD") {
        return Ok(Zeroizing::new(secret));
    }
    let secret = rpassword::prompt_password(prompt).context("Failed to read secret")?;
    Ok(Zeroizing::new(secret))
}

/// Prompt twice for a new secret.
fn read_new_secret() -> Result<Zeroizing<String>> {
    if let Ok(secret) = std::env::var("COFRE_PASSWORD") {
        return Ok(Zeroizing::new(secret));
    }
    let secret = read_secret("New secret: ")?;
    let confirm = read_secret("Confirm secret: ")?;
    if *secret != *confirm {
        bail!("Secrets do not match");
    }
    Ok(secret)
}

fn confirm(question: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    Confirm::new()
        .with_prompt(question)
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

async fn unlock(manager: &VaultManager) -> Result<UnlockToken> {
    let mut gate = manager.open_gate().await?;
    if gate.state() == GateState::Uninitialized {
        bail!("No master secret yet; run `cofre init` first");
    }
    let secret = read_secret("Secret: ")?;
    Ok(gate.verify(&secret).await?)
}

fn print_bulk(result: &BulkResult, verb: &str) {
    println!("{} {} of {}", verb, result.succeeded, result.attempted);
    for failure in &result.failures {
        println!("  failed: {} ({})", failure.id, failure.reason);
    }
}

fn print_contact(record: &ContactRecord, key: &str) {
    let phones = if record.phone_numbers.is_empty() {
        "-".to_string()
    } else {
        record.phone_numbers.join(", ")
    };
    println!("  {}  {}  {}", key, record.display_name(), phones);
}

async fn cmd_init(config: VaultConfig, strength: &str) -> Result<()> {
    let kdf_params = match strength {
        "interactive" => KdfParams::interactive(),
        "moderate" => KdfParams::moderate(),
        _ => bail!("Invalid strength. Use: interactive or moderate"),
    };
    let manager = open_manager(config.with_kdf_params(kdf_params))?;

    let mut gate = manager.open_gate().await?;
    if gate.state() != GateState::Uninitialized {
        bail!("A master secret already exists; use `cofre recovery reset` to replace it");
    }

    let secret = read_new_secret()?;
    gate.create_secret(&secret)
        .await
        .context("Failed to create master secret")?;

    println!("Master secret created.");
    println!("  Vault: {}", manager.config().vault_dir().display());
    Ok(())
}

async fn cmd_unlock(config: VaultConfig) -> Result<()> {
    let manager = open_manager(config)?;
    let token = unlock(&manager).await?;

    println!("Vault unlocked.");
    println!("  Session: {}", token.session().as_str());
    Ok(())
}

async fn cmd_status(config: VaultConfig) -> Result<()> {
    let manager = open_manager(config)?;
    let token = unlock(&manager).await?;
    let summary = manager.summary(&token).await?;
    let recovery = manager.recovery_question().await?.is_some();

    println!("Vault: {}", manager.config().vault_dir().display());
    println!("  Photos: {}", summary.photos);
    println!("  Videos: {}", summary.videos);
    println!("  Contacts: {}", summary.contacts);
    println!(
        "  Recovery question: {}",
        if recovery { "enrolled" } else { "not enrolled" }
    );
    Ok(())
}

async fn cmd_recovery_enroll(config: VaultConfig, question: &str) -> Result<()> {
    let manager = open_manager(config)?;
    let token = unlock(&manager).await?;

    let answer = Zeroizing::new(
        rpassword::prompt_password("Answer: ").context("Failed to read answer")?,
    );
    manager.enroll_recovery(&token, question, &answer).await?;

    println!("Recovery question enrolled.");
    Ok(())
}

async fn cmd_recovery_reset(config: VaultConfig) -> Result<()> {
    use cofre_vault::RecoveryChallenge;

    let manager = open_manager(config)?;
    let Some(challenge) = manager.recovery_question().await? else {
        bail!("No recovery question was enrolled");
    };

    println!("{}", challenge.prompt());
    let answer = Zeroizing::new(
        rpassword::prompt_password("Answer: ").context("Failed to read answer")?,
    );
    let new_secret = read_new_secret()?;

    let mut gate = manager.open_gate().await?;
    gate.reset(&challenge, &answer, &new_secret)
        .await
        .context("Failed to reset master secret")?;

    println!("Master secret replaced. Unlock again with the new secret.");
    Ok(())
}

async fn cmd_media(config: VaultConfig, command: MediaCommands, yes: bool) -> Result<()> {
    let manager = open_manager(config)?;
    let token = unlock(&manager).await?;
    let media = manager.media();

    match command {
        MediaCommands::Hide { paths } => {
            let mut result = BulkResult::default();
            for path in &paths {
                match media.hide(&token, path).await {
                    Ok(item) => {
                        println!("  hidden: {} ({})", item.id, item.kind);
                        result.record_success();
                    }
                    Err(e) => result.record_failure(path.display().to_string(), e),
                }
            }
            print_bulk(&result, "Hid");
        }

        MediaCommands::List => {
            let items = media.list(&token).await?;
            if items.is_empty() {
                println!("No hidden media.");
            }
            for item in items {
                println!("  [{}] {}", item.kind, item.id);
            }
        }

        MediaCommands::Remove { id } => {
            let item = media.find(&token, &id).await?;
            if !confirm(&format!("Permanently delete {}?", item.id), yes)? {
                println!("Cancelled.");
                return Ok(());
            }
            media.remove(&token, &item).await?;
            println!("Removed: {}", item.id);
        }

        MediaCommands::Restore { id, to } => {
            let item = media.find(&token, &id).await?;
            let restored = media.restore(&token, &item, &to).await?;
            println!("Restored: {}", restored.display());
        }
    }

    Ok(())
}

async fn cmd_contacts(config: VaultConfig, command: ContactCommands, yes: bool) -> Result<()> {
    let manager = open_manager(config)?;
    let token = unlock(&manager).await?;
    let contacts = manager.contacts();
    let directory = contacts.directory();

    match command {
        ContactCommands::Public => {
            if directory.request_access().await? == AccessStatus::Denied {
                bail!(cofre_common::Error::AccessDenied(
                    "Address book access was denied".to_string()
                ));
            }
            let records = directory.list(ALL_CONTACT_FIELDS).await?;
            if records.is_empty() {
                println!("Address book is empty.");
            }
            for record in &records {
                print_contact(record, record.external_id.as_deref().unwrap_or("-"));
            }
        }

        ContactCommands::Add(AddContact { name, phones }) => {
            let id = directory
                .create(&ContactRecord::new(name, phones))
                .await?;
            println!("Added contact {}", id);
        }

        ContactCommands::Hide { ids } => {
            if !confirm(
                &format!("Hide {} contact(s) from the address book?", ids.len()),
                yes,
            )? {
                println!("Cancelled.");
                return Ok(());
            }
            let result = contacts.hide_many(&token, &ids).await?;
            print_bulk(&result, "Hid");
        }

        ContactCommands::List => {
            let records = contacts.list(&token).await?;
            if records.is_empty() {
                println!("No hidden contacts.");
            }
            for record in &records {
                let file_name = record
                    .vault_path
                    .as_deref()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                print_contact(record, &file_name);
            }
        }

        ContactCommands::Restore { file_name } => {
            let record = contacts.load(&token, &file_name).await?;
            let id = contacts.restore_contact(&token, &record).await?;
            println!("Restored {} as {}", record.display_name(), id);
        }
    }

    Ok(())
}

async fn cmd_purge(config: VaultConfig, yes: bool) -> Result<()> {
    let manager = open_manager(config)?;
    let token = unlock(&manager).await?;

    if !confirm("Delete everything in the vault?", yes)? {
        println!("Cancelled.");
        return Ok(());
    }

    match manager.purge(&token).await? {
        PurgeOutcome::Purged { removed } => println!("Vault purged ({} files).", removed),
        PurgeOutcome::AlreadyEmpty => println!("Vault is already empty."),
    }
    Ok(())
}

async fn cmd_export(config: VaultConfig) -> Result<()> {
    let manager = open_manager(config)?;
    let token = unlock(&manager).await?;

    let path = manager
        .backup()
        .export(&token)
        .await
        .context("Failed to export vault")?;
    info!(path = %path.display(), "Backup written");

    println!("Backup written to {}", path.display());
    Ok(())
}

async fn cmd_import(config: VaultConfig, artifact: &Path, yes: bool) -> Result<()> {
    let manager = open_manager(config)?;
    let token = unlock(&manager).await?;

    if !confirm(&format!("Import {} into the vault?", artifact.display()), yes)? {
        println!("Cancelled.");
        return Ok(());
    }

    let result = manager
        .backup()
        .import(&token, artifact)
        .await
        .context("Failed to import backup")?;
    print_bulk(&result, "Imported");
    Ok(())
}
