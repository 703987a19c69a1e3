use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chat_engine::{
    utils::{setup_logging, LogConfig},
    ChatEngine, ChatError, ChatSettings, DeviceRequest,
};
use clap::{Parser, ValueEnum};
use tracing::info;

const QUIT_WORDS: [&str; 4] = ["quit", "exit", "bye", "q"];

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DeviceArg {
    Cpu,
    Gpu,
}

impl From<DeviceArg> for DeviceRequest {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Cpu => DeviceRequest::Cpu,
            DeviceArg::Gpu => DeviceRequest::Gpu,
        }
    }
}

/// Chat with a local dialogue model in the terminal
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON settings file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// HuggingFace repo id or local directory
    #[arg(long)]
    model: Option<String>,

    /// Model ids to try in order if the primary fails to load
    #[arg(long = "alternate-model")]
    alternate_models: Vec<String>,

    #[arg(long, value_enum)]
    device: Option<DeviceArg>,

    /// Debug-level diagnostics on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(LogConfig::with_level(if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    }))?;

    let mut settings = match &args.config {
        Some(path) => ChatSettings::from_json_file(path)?,
        None => ChatSettings::default(),
    };
    if let Some(model) = &args.model {
        settings = settings.with_model_id(model.clone());
    }
    if let Some(device) = args.device {
        settings = settings.with_device(device.into());
    }

    println!("Loading {} ...", settings.model_id);
    let alternates = args.alternate_models.clone();
    let built = tokio::task::spawn_blocking(move || {
        let mut builder = ChatEngine::builder().with_settings(settings)?;
        for id in alternates {
            builder = builder.with_alternate_model(id);
        }
        builder.build()
    })
    .await
    .context("model loading task panicked")?;
    let engine = match built {
        Ok(engine) => engine,
        Err(e) => {
            println!("❌ {}", e.user_message());
            return Err(e.into());
        }
    };

    let info = engine.info();
    info!(model = %info.model_id, device = %info.device, "Engine ready");
    println!("Chatting with {} on {}.", info.model_id, info.device);
    println!("Type /clear to start over, /status for session details, quit to leave.\n");

    let session = Arc::new(engine.session());
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("You: ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let command = line.trim();

        if QUIT_WORDS.contains(&command.to_lowercase().as_str()) {
            break;
        }
        match command {
            "/clear" => {
                session.clear()?;
                println!("Conversation cleared.\n");
                continue;
            }
            "/status" => {
                println!("{}\n", serde_json::to_string_pretty(&session.status())?);
                continue;
            }
            _ => {}
        }

        match session.submit_async(line).await {
            Ok(reply) => {
                println!("Bot: {}", reply);
                if reply.is_fallback() {
                    println!("⚠️ There was an issue with the response generation.");
                }
                println!();
            }
            Err(e @ (ChatError::InvalidInput(_) | ChatError::Busy)) => {
                println!("{}\n", e.user_message());
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("Goodbye!");
    Ok(())
}
