//! Main module for the `afq` CLI.
//!
//! Parses the command line, loads the configuration and dispatches. Commands
//! that embed text (`ask`, `train`, `serve`) load the model and go through the
//! [`Responder`]; `add` and `stats` only touch the knowledge file. Logs go to
//! stderr; answers go to stdout.
//!
//! # Examples
//!
//! ```sh
//! afq init
//! afq ask "How can I reset my password?"
//! afq add "Is there a music bot?" "Yes, use /play."
//! afq train
//! printf 'what timezone is the server in\n' | afq serve
//! ```

use awful_faq::commands::{Cli, Commands};
use awful_faq::config::{self, FaqConfig};
use awful_faq::embedder::SentenceEmbeddingsModel;
use awful_faq::error::FaqError;
use awful_faq::knowledge::KnowledgeStore;
use awful_faq::responder::{ERROR_REPLY, MessageMeta, Responder, ResponderStatus, render_reply};
use clap::Parser;
use once_cell::sync::OnceCell;
use std::{error::Error, fs, path::Path, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

static TRACING: OnceCell<()> = OnceCell::new();

const SAMPLE_KNOWLEDGE: &str = "\
# Lines starting with '#' are comments. Blocks are separated by a blank line.
Q: How do I reset my password?
A: Go to settings and click 'Reset Password'.

Q: What timezone is the server in?
A: The server runs on UTC.
";

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init => {
            debug!("Initializing configuration");
            init()?;
        }
        Commands::Add { question, answer } => {
            let faq_config = load(config_path)?;
            let mut store = KnowledgeStore::open(&faq_config.data_file)?;
            let pair = store.append(&question, &answer)?;
            println!("Added Q&A pair #{}", pair.id);
        }
        Commands::Stats => {
            let faq_config = load(config_path)?;
            let store = KnowledgeStore::open(&faq_config.data_file)?;
            print_status(&ResponderStatus::idle(&faq_config, &store)?);
        }
        Commands::Ask { question, json } => {
            let faq_config = load(config_path)?;
            let responder = responder(&faq_config, false)?;
            let result = responder.handle_message(&question, &MessageMeta::new("cli"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", render_reply(&result, faq_config.max_response_length));
            }
        }
        Commands::Train => {
            let faq_config = load(config_path)?;
            let count = responder(&faq_config, true)?.retrain()?;
            println!("Training complete! Loaded {count} Q&A pairs.");
        }
        Commands::Serve { requester, channel } => {
            let faq_config = load(config_path)?;
            let responder = Arc::new(responder(&faq_config, true)?);
            responder.warm_up()?;
            let mut meta = MessageMeta::new(requester);
            meta.channel = channel;
            serve(Arc::clone(&responder), meta, faq_config.max_response_length).await?;
            print_status(&responder.status());
        }
    }

    Ok(())
}

/// Load the embedding model and wire up a responder. A model that cannot be
/// loaded is fatal.
fn responder(
    faq_config: &FaqConfig,
    show_progress: bool,
) -> Result<Responder<SentenceEmbeddingsModel>, Box<dyn Error>> {
    let model = SentenceEmbeddingsModel::load(&faq_config.model_id, &faq_config.model_revision)
        .inspect_err(|e| error!("Cannot start without the embedding model: {}", e))?
        .with_progress(show_progress);
    Ok(Responder::from_config(faq_config, model)?)
}

/// Explicit paths must exist; the default location falls back to built-in defaults.
fn load(explicit: Option<&Path>) -> Result<FaqConfig, Box<dyn Error>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => awful_faq::default_config_path()?,
    };

    let faq_config = if explicit.is_some() || path.exists() {
        info!("Loading config from: {}", path.display());
        config::load_config(&path.to_string_lossy())?
    } else {
        warn!(
            "No config at {}, using defaults (run `afq init` to create one)",
            path.display()
        );
        FaqConfig::default()
    };
    debug!("Config loaded: {:?}", faq_config);
    Ok(faq_config)
}

/// Answer stdin line by line. The engine is blocking, so each message goes
/// through `spawn_blocking`.
async fn serve(
    responder: Arc<Responder<SentenceEmbeddingsModel>>,
    meta: MessageMeta,
    max_len: usize,
) -> Result<(), Box<dyn Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let responder = Arc::clone(&responder);
        let meta = meta.clone();
        let outcome =
            tokio::task::spawn_blocking(move || responder.handle_message(&line, &meta)).await?;

        match outcome {
            Ok(result) => println!("{}", render_reply(&result, max_len)),
            Err(FaqError::InvalidInput(_)) => {}
            Err(e) => {
                error!("Error processing message: {}", e);
                println!("{ERROR_REPLY}");
            }
        }
    }
    Ok(())
}

fn print_status(status: &ResponderStatus) {
    println!("Knowledge base: {} Q&A pairs", status.pairs);
    println!("Model: {}", status.model_id);
    println!(
        "Similarity threshold: {} (top {})",
        status.threshold, status.top_k
    );
    println!(
        "Queries: {} total, {} answered, {} abstained ({:.1}% answered, mean score {:.3})",
        status.stats.total_queries,
        status.stats.answered,
        status.stats.abstained,
        status.stats.answer_rate() * 100.0,
        status.stats.mean_score
    );
}

/// Writes a default `config.yaml` and, if missing, a sample knowledge file
/// next to it. An existing config is left alone.
fn init() -> Result<(), Box<dyn Error>> {
    let config_dir = awful_faq::config_dir()?;
    info!("Creating config directory: {}", config_dir.display());
    fs::create_dir_all(&config_dir)?;

    let data_file = config_dir.join(config::DEFAULT_DATA_FILE);
    if !data_file.exists() {
        info!("Creating knowledge file: {}", data_file.display());
        fs::write(&data_file, SAMPLE_KNOWLEDGE)?;
    }

    let config_path = config_dir.join("config.yaml");
    if config_path.exists() {
        warn!("Config already exists at {}, not overwriting", config_path.display());
        return Ok(());
    }
    info!("Creating config file: {}", config_path.display());
    let faq_config = FaqConfig {
        data_file,
        ..FaqConfig::default()
    };
    fs::write(config_path, serde_yaml::to_string(&faq_config)?)?;

    Ok(())
}
