//! Command-line access to language data.
//!
//! Usage:
//!   language-store list
//!   language-store show <id>
//!   language-store set <id> <key> <value>
//!   language-store remove <id> <key>
//!   language-store set-audio <id> <key> <path>
//!   language-store remove-audio <id> <key>
//!
//! Configuration comes from the environment (see `Config::from_env`).

use anyhow::{bail, Context, Result};
use language_store::{Config, LanguageManager, LanguageStore, LoadState, RequestRegistry};
use std::sync::Arc;
use tracing::info;

const USAGE: &str = "usage: language-store <list | show <id> | set <id> <key> <value> | remove <id> <key> | set-audio <id> <key> <path> | remove-audio <id> <key>>";

#[derive(Debug)]
enum Command {
    List,
    Show { id: String },
    Set { id: String, key: String, value: String },
    Remove { id: String, key: String },
    SetAudio { id: String, key: String, path: String },
    RemoveAudio { id: String, key: String },
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let command = match args.as_slice() {
            ["list"] => Command::List,
            ["show", id] => Command::Show { id: id.to_string() },
            ["set", id, key, value] => Command::Set {
                id: id.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            },
            ["remove", id, key] => Command::Remove {
                id: id.to_string(),
                key: key.to_string(),
            },
            ["set-audio", id, key, path] => Command::SetAudio {
                id: id.to_string(),
                key: key.to_string(),
                path: path.to_string(),
            },
            ["remove-audio", id, key] => Command::RemoveAudio {
                id: id.to_string(),
                key: key.to_string(),
            },
            _ => bail!(USAGE),
        };
        Ok(command)
    }

    fn language(&self) -> Option<&str> {
        match self {
            Command::List => None,
            Command::Show { id }
            | Command::Set { id, .. }
            | Command::Remove { id, .. }
            | Command::SetAudio { id, .. }
            | Command::RemoveAudio { id, .. } => Some(id.as_str()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("language_store=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let config = Config::from_env()?;
    info!("Language root: {}", config.languages_root);

    let manager = Arc::new(LanguageManager::new(config).context("Failed to set up language manager")?);
    let catalog = manager.reload().await.context("Failed to scan languages")?;

    let Some(id) = command.language() else {
        for (id, header) in catalog.iter() {
            println!(
                "{}\t{}\t{}\t{} files",
                id,
                header.display_name(),
                header.author(),
                header.data_files().len()
            );
        }
        return Ok(());
    };

    manager.header(id)?;

    let registry = RequestRegistry::new();
    registry.set_active_manager(Some(manager));
    let mut request = registry.create_request(id);

    let result = match request.settled().await {
        LoadState::Loaded(store) => run(&command, &store).await,
        LoadState::Failed(e) => Err(anyhow::anyhow!("Failed to load language '{}': {}", id, e)),
        LoadState::Idle | LoadState::Loading => {
            Err(anyhow::anyhow!("Language '{}' is no longer in the catalog", id))
        }
    };

    request.dispose();
    result
}

async fn run(command: &Command, store: &LanguageStore) -> Result<()> {
    match command {
        Command::List => {}
        Command::Show { .. } => {
            println!("[text]");
            for (key, value) in store.texts() {
                println!("{}\t{}", key, value);
            }
            println!("[audio]");
            for (key, path) in store.audio_entries() {
                println!("{}\t{}", key, path);
            }
        }
        Command::Set { key, value, .. } => store.set_text(key.as_str(), value.as_str()),
        Command::Remove { key, .. } => {
            if !store.remove_text(key) {
                bail!("No text entry '{}'", key);
            }
        }
        Command::SetAudio { key, path, .. } => store.set_audio(key.as_str(), path.as_str()),
        Command::RemoveAudio { key, .. } => {
            if !store.remove_audio(key) {
                bail!("No audio entry '{}'", key);
            }
        }
    }

    if store.is_dirty() {
        store.save().await.context("Failed to save language")?;
        info!("Saved changes");
    }

    Ok(())
}
