use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

use ghostkey::{
    check_delegate, check_ghost_key, initialize_root, issue_into_vault, run_stdio_host,
    verification_engine, RootConfig, RootError, RootState,
};
use ghostkey_cert::SignedMessage;
use ghostkey_core::{DelegateCertificate, GhostkeyCertificate, KeyId};

/// Ghostkey: anonymous, tier-certified keys for proving you are not a bot.
#[derive(Parser, Debug)]
#[command(name = "ghostkey", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Vault password
    #[arg(long, global = true, env = "GHOSTKEY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Base64 Ed25519 master verifying key; overrides the config file
    #[arg(long, global = true, env = "GHOSTKEY_MASTER_KEY")]
    master_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List stored ghost keys
    List,

    /// Import an armored ghost key (certificate and signing key)
    Import {
        /// File holding both armored blocks
        file: PathBuf,

        #[arg(short, long, default_value = "imported")]
        label: String,
    },

    /// Print a stored ghost key in armored form
    Export {
        id: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Delete a stored ghost key
    Delete { id: String },

    /// Make a stored ghost key the active one
    SetActive { id: String },

    /// Sign a message with a ghost key
    Sign {
        /// Message text; read from stdin when omitted
        message: Option<String>,

        /// Key to sign with; defaults to the active key
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Verify an armored signed message
    Verify {
        /// File holding the armored signed message
        file: PathBuf,
    },

    /// Check that a delegate certificate is endorsed by the master key
    VerifyDelegate {
        /// File holding the armored delegate certificate
        file: PathBuf,
    },

    /// Check a ghost key certificate back to the master key
    VerifyGhostKey {
        /// File holding the armored ghost key certificate
        file: PathBuf,
    },

    /// Obtain a new ghost key from the signing service
    Issue {
        /// File holding the armored delegate certificate
        #[arg(long)]
        delegate: PathBuf,

        /// Payment reference the signing service was paid under
        #[arg(long)]
        payment_reference: String,

        #[arg(short, long, default_value = "issued")]
        label: String,
    },

    /// Answer authentication requests as newline-delimited JSON on stdio
    Serve,

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new(
            "ghostkey=debug,ghostkey_cert=debug,ghostkey_vault=debug,ghostkey_bridge=debug",
        )
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ghostkey=info"))
    };

    // stdout belongs to command output and the bridge protocol.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn config_path(path: Option<&PathBuf>) -> PathBuf {
    path.cloned().unwrap_or_else(RootConfig::default_config_path)
}

fn load(config_path: &Path, master_key: Option<String>) -> Result<RootConfig, RootError> {
    let mut config = RootConfig::load(config_path)?;
    if master_key.is_some() {
        config.master_verifying_key = master_key;
        config.validate()?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), RootError> {
    let config_path = config_path(cli.config.as_ref());
    let password = cli.password.map(Zeroizing::new);
    let password = password.as_deref().map(String::as_str);
    let master_key = cli.master_key;
    let open = |path: &Path| -> Result<RootState, RootError> {
        initialize_root(load(path, master_key.clone())?)
    };

    match cli.command {
        Commands::InitConfig { force } => cmd_init_config(&config_path, force),
        Commands::List => cmd_list(&open(&config_path)?),
        Commands::Import { file, label } => {
            cmd_import(&open(&config_path)?, password, &file, &label)
        }
        Commands::Export { id, out } => {
            cmd_export(&open(&config_path)?, password, &id, out.as_deref())
        }
        Commands::Delete { id } => {
            let state = open(&config_path)?;
            state.vault.delete(&KeyId::parse(&id)?)?;
            println!("Deleted {}", id);
            Ok(())
        }
        Commands::SetActive { id } => {
            let state = open(&config_path)?;
            state.vault.set_active(&KeyId::parse(&id)?)?;
            println!("Active key is now {}", id);
            Ok(())
        }
        Commands::Sign { message, key } => {
            cmd_sign(&open(&config_path)?, password, message, key.as_deref())
        }
        Commands::Verify { file } => cmd_verify(&load(&config_path, master_key.clone())?, &file),
        Commands::VerifyDelegate { file } => {
            cmd_verify_delegate(&load(&config_path, master_key.clone())?, &file)
        }
        Commands::VerifyGhostKey { file } => {
            cmd_verify_ghost_key(&load(&config_path, master_key.clone())?, &file)
        }
        Commands::Issue {
            delegate,
            payment_reference,
            label,
        } => {
            let state = open(&config_path)?;
            cmd_issue(&state, password, &delegate, &payment_reference, &label).await
        }
        Commands::Serve => cmd_serve(open(&config_path)?, password).await,
    }
}

fn cmd_init_config(path: &Path, force: bool) -> Result<(), RootError> {
    if path.exists() && !force {
        return Err(RootError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    RootConfig::default().save(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn cmd_list(state: &RootState) -> Result<(), RootError> {
    let keys = state.vault.list()?;
    if keys.is_empty() {
        println!("No ghost keys stored.");
        return Ok(());
    }
    for key in keys {
        println!(
            "{} {}  {}  {}",
            if key.is_active { "*" } else { " " },
            key.id,
            key.created_at.to_rfc3339(),
            key.label
        );
    }
    Ok(())
}

fn cmd_import(
    state: &RootState,
    password: Option<&str>,
    file: &Path,
    label: &str,
) -> Result<(), RootError> {
    let text = Zeroizing::new(std::fs::read_to_string(file)?);
    state.unlock(password)?;
    let id = state.vault.import(&text, label)?;
    info!(key_id = %id, "ghost key imported");
    println!("{}", id);
    Ok(())
}

fn cmd_export(
    state: &RootState,
    password: Option<&str>,
    id: &str,
    out: Option<&Path>,
) -> Result<(), RootError> {
    let id = KeyId::parse(id)?;
    state.unlock(password)?;
    let armored = Zeroizing::new(state.vault.export(&id)?);
    match out {
        Some(path) => {
            std::fs::write(path, armored.as_bytes())?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
                    warn!(path = %path.display(), error = %e, "could not restrict export file permissions");
                }
            }
            println!("Wrote {}", path.display());
        }
        None => print!("{}", armored.as_str()),
    }
    Ok(())
}

fn cmd_sign(
    state: &RootState,
    password: Option<&str>,
    message: Option<String>,
    key: Option<&str>,
) -> Result<(), RootError> {
    let message = match message {
        Some(m) => m,
        None => std::io::read_to_string(std::io::stdin())?,
    };
    let key = key.map(KeyId::parse).transpose()?;
    state.unlock(password)?;
    let signed = state.handler.sign_message(key.as_ref(), message.as_bytes())?;
    println!("{}", signed.to_armored()?);
    Ok(())
}

fn cmd_verify(config: &RootConfig, file: &Path) -> Result<(), RootError> {
    let master = config.master_key()?;
    let text = std::fs::read_to_string(file)?;
    let signed = SignedMessage::from_armored(&text)?;
    let engine = verification_engine(config);
    if !engine.verify_signed_message(&signed, &master) {
        return Err(RootError::VerificationFailed);
    }
    let info = engine.delegate_info(&signed.certificate.delegate_certificate)?;
    println!("Valid signature from a ghost key certified as: {}", info);
    println!("{}", String::from_utf8_lossy(&signed.message));
    Ok(())
}

fn cmd_verify_delegate(config: &RootConfig, file: &Path) -> Result<(), RootError> {
    let master = config.master_key()?;
    let delegate = DelegateCertificate::from_armored(&std::fs::read_to_string(file)?)?;
    let info = check_delegate(&verification_engine(config), &delegate, &master)?;
    println!("Delegate certificate verified");
    println!("Info: {}", info);
    Ok(())
}

fn cmd_verify_ghost_key(config: &RootConfig, file: &Path) -> Result<(), RootError> {
    let master = config.master_key()?;
    let certificate = GhostkeyCertificate::from_armored(&std::fs::read_to_string(file)?)?;
    let info = check_ghost_key(&verification_engine(config), &certificate, &master)?;
    println!("Ghost key certificate verified");
    println!("Info: {}", info);
    Ok(())
}

async fn cmd_issue(
    state: &RootState,
    password: Option<&str>,
    delegate: &Path,
    payment_reference: &str,
    label: &str,
) -> Result<(), RootError> {
    let delegate = DelegateCertificate::from_armored(&std::fs::read_to_string(delegate)?)?;
    state.unlock(password)?;
    let signer = Arc::new(state.http_signer()?);
    info!(endpoint = %signer.endpoint(), "requesting certificate");
    let id = issue_into_vault(state, signer, &delegate, payment_reference, label).await?;
    println!("{}", id);
    Ok(())
}

async fn cmd_serve(state: RootState, password: Option<&str>) -> Result<(), RootError> {
    // Without a password the host still runs; every request is then
    // refused as VAULT_LOCKED.
    if password.is_some() {
        state.unlock(password)?;
    }
    info!(unlocked = state.vault.is_unlocked(), "bridge host on stdio");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run_stdio_host(
        state.handler.clone(),
        state.config.bridge.to_bridge_config(),
        stdin,
        tokio::io::stdout(),
    )
    .await
}
