use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::debug;
use std::path::{Path, PathBuf};

use scriptvault::prelude::*;
use scriptvault::scripts::{generate_key, script_hash, trim_form, ScriptMetadata};

#[derive(Parser, Debug)]
#[command(name = "scriptvault", version, about = "ScriptVault command line client", long_about = None)]
struct Cli {
    /// Project config as exported by the web console. Defaults to SCRIPTVAULT_* variables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct Credentials {
    #[arg(long, env = "SCRIPTVAULT_EMAIL")]
    email: String,

    #[arg(long, env = "SCRIPTVAULT_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the content hash of a file
    Hash { file: PathBuf },
    /// Print the counts stored with a script
    Stats { file: PathBuf },
    /// Generate a share key
    Key,
    /// Upload a script file
    Upload {
        #[command(flatten)]
        credentials: Credentials,
        /// Script name; defaults to the file name
        #[arg(long)]
        name: Option<String>,
        #[arg(long, short)]
        language: String,
        file: PathBuf,
    },
    /// List your scripts, newest first
    List {
        #[command(flatten)]
        credentials: Credentials,
    },
}

fn read_script(path: &Path) -> anyhow::Result<String> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(trim_form(&content).to_string())
}

fn connect(config: Option<&Path>) -> anyhow::Result<ScriptVault> {
    let config = match config {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
            BackendConfig::from_json(&json)?
        }
        None => BackendConfig::from_env()?,
    };
    debug!("Using project {}", config.project_id);
    Ok(ScriptVault::new(config)?)
}

async fn login(vault: &ScriptVault, credentials: &Credentials) -> anyhow::Result<User> {
    let user = vault
        .accounts()
        .login(&credentials.email, &credentials.password)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    Ok(user)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Hash { file } => {
            println!("{}", script_hash(&read_script(&file)?));
        }
        Commands::Stats { file } => {
            let content = read_script(&file)?;
            let metadata = ScriptMetadata::of(&content);
            println!("size:       {}", metadata.content_characters);
            println!("lines:      {}", metadata.content_lines);
            println!("words:      {}", metadata.content_words);
            println!("hash:       {}", script_hash(&content));
        }
        Commands::Key => {
            println!("{}", generate_key());
        }
        Commands::Upload {
            credentials,
            name,
            language,
            file,
        } => {
            let vault = connect(cli.config.as_deref())?;
            let user = login(&vault, &credentials).await?;

            let name = match name {
                Some(name) => name,
                None => file
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            };
            let content = std::fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;

            let record = vault
                .scripts_for(user)
                .submit(ScriptDraft::new(&name, &content, &language))
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("{}\t{}", record.id.unwrap_or_default(), record.hash);
        }
        Commands::List { credentials } => {
            let vault = connect(cli.config.as_deref())?;
            let user = login(&vault, &credentials).await?;

            let scripts = vault.scripts_for(user).load_scripts().await?;
            for script in scripts {
                let when = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(script.timestamp)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    script.id.unwrap_or_default(),
                    when,
                    script.language,
                    script.size,
                    script.name
                );
            }
        }
    }

    Ok(())
}
