//! MADES gateway command-line client.
//!
//! Run with: `mades-client --server https://ecp.example.org --username user connectivity-test 10X1001A1001A450 A01`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mades_client::{
    MadesClient, MadesClientBuilder, MadesClientConfig, MadesService, ReceiveOptions, SentMessage,
};
use secrecy::Secret;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Client for the MADES message-exchange gateway.
///
/// Each invocation connects, runs one operation and prints the result as YAML.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Gateway address; overrides the configuration file
    #[arg(short, long, env = "MADES_SERVER")]
    server: Option<String>,

    /// Basic auth username
    #[arg(short, long, env = "MADES_USERNAME")]
    username: Option<String>,

    /// Basic auth password
    #[arg(short, long, env = "MADES_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Print the last SOAP exchange after the call
    #[arg(short, long)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a connectivity test message
    ConnectivityTest {
        receiver_code: String,
        business_type: String,
    },

    /// Send the content of a file
    Send {
        receiver_code: String,
        business_type: String,
        /// File holding the message content
        file: PathBuf,
        #[arg(long)]
        sender_application: Option<String>,
        #[arg(long)]
        ba_message_id: Option<String>,
        #[arg(long)]
        conversation_id: Option<String>,
    },

    /// Show the state and trace of a message
    Status { message_id: String },

    /// Receive the next waiting message
    Receive {
        /// Business type filter
        #[arg(short, long, default_value = "*")]
        business_type: String,
        /// Fetch metadata only
        #[arg(long)]
        no_download: bool,
        /// Confirm the message once received
        #[arg(long)]
        confirm: bool,
        /// Write the message content to this file instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Confirm a received message
    Confirm { message_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::WARN);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = load_config(&args).await?;
    info!(server = %config.server, debug = config.debug, "Configuration loaded");

    let client = MadesClientBuilder::from_config(config)
        .connect()
        .await
        .context("Failed to connect to the MADES gateway")?;

    let result = run(&client, args.command).await;
    if args.debug {
        client.print_last_exchange();
    }
    result
}

async fn load_config(args: &Args) -> Result<MadesClientConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_yaml::from_str(&content).context("Failed to parse config file")?
        }
        None => MadesClientConfig::default(),
    };

    if let Some(server) = &args.server {
        config.server = server.clone();
    }
    if let Some(username) = &args.username {
        config.username = Some(username.clone());
    }
    if let Some(password) = &args.password {
        config.password = Some(Secret::new(password.clone()));
    }
    config.debug |= args.debug;

    Ok(config)
}

async fn run(client: &MadesClient, command: Command) -> Result<()> {
    match command {
        Command::ConnectivityTest {
            receiver_code,
            business_type,
        } => {
            let message_id = client
                .connectivity_test(&receiver_code, &business_type)
                .await
                .context("ConnectivityTest failed")?;
            print_yaml(&MessageIdOutput { message_id })
        }
        Command::Send {
            receiver_code,
            business_type,
            file,
            sender_application,
            ba_message_id,
            conversation_id,
        } => {
            let content = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mut message = SentMessage::new(receiver_code, business_type, content);
            if let Some(app) = sender_application {
                message = message.with_sender_application(app);
            }
            if let Some(id) = ba_message_id {
                message = message.with_ba_message_id(id);
            }
            let message_id = client
                .send_message(&message, conversation_id.as_deref())
                .await
                .context("SendMessage failed")?;
            print_yaml(&MessageIdOutput { message_id })
        }
        Command::Status { message_id } => {
            let status = client
                .check_message_status(&message_id)
                .await
                .context("CheckMessageStatus failed")?;
            print_yaml(&status)
        }
        Command::Receive {
            business_type,
            no_download,
            confirm,
            output,
        } => {
            let options = ReceiveOptions::default()
                .business_type(business_type)
                .download_message(!no_download)
                .auto_confirm(confirm);
            let mut response = client
                .receive_message(&options)
                .await
                .context("ReceiveMessage failed")?;

            if let (Some(path), Some(message)) = (output, response.received_message.as_mut()) {
                write_content(&path, &message.content).await?;
                message.content.clear();
            }
            print_yaml(&response)
        }
        Command::Confirm { message_id } => {
            let message_id = client
                .confirm_received_message(&message_id)
                .await
                .context("ConfirmReceiveMessage failed")?;
            print_yaml(&MessageIdOutput { message_id })
        }
    }
}

#[derive(Serialize)]
struct MessageIdOutput {
    message_id: String,
}

async fn write_content(path: &Path, content: &[u8]) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = content.len(), "Message content written");
    Ok(())
}

fn print_yaml<T: Serialize>(value: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(value).context("Failed to serialize result")?;
    print!("{}", yaml);
    Ok(())
}
