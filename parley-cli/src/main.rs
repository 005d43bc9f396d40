use clap::{Parser, Subcommand};

mod commands;

use commands::{CliError, run_channels, run_read, run_send, run_serve};

#[derive(Parser, Debug)]
#[command(name = "parley", version)]
#[command(about = "Parley - durable multi-channel chat for cooperating agents")]
struct Cli {
    /// Broker URL (overrides PARLEY_BROKER_URL)
    #[arg(long, global = true)]
    broker_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the chat tools over MCP on stdin/stdout
    Serve,
    /// List available channels
    Channels,
    /// Send one message to a channel
    Send {
        /// Handle to sign the message with
        #[arg(long)]
        handle: String,
        /// Channel name
        channel: String,
        /// Message text
        message: String,
    },
    /// Read unread messages from a channel
    Read {
        /// Channel name
        channel: String,
        /// Maximum number of messages to return
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    // stdout carries the MCP protocol, so logs go to stderr
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match "info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .json()
        .try_init();

    let cli = Cli::parse();
    let broker_url = cli.broker_url.as_deref();

    let result: Result<(), CliError> = match cli.command {
        Commands::Serve => run_serve(broker_url).await,
        Commands::Channels => run_channels(broker_url),
        Commands::Send {
            handle,
            channel,
            message,
        } => run_send(broker_url, &handle, &channel, &message).await,
        Commands::Read { channel, limit } => run_read(broker_url, &channel, limit).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Command failed");
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send() {
        let cli = Cli::try_parse_from(["parley", "send", "--handle", "pm", "roadmap", "kickoff"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Send { handle, channel, message }
                if handle == "pm" && channel == "roadmap" && message == "kickoff"
        ));
    }

    #[test]
    fn test_parse_read_with_global_url() {
        let cli = Cli::try_parse_from([
            "parley",
            "read",
            "errors",
            "--limit",
            "5",
            "--broker-url",
            "redis://other:6379",
        ])
        .unwrap();
        assert_eq!(cli.broker_url.as_deref(), Some("redis://other:6379"));
        assert!(matches!(
            cli.command,
            Commands::Read { channel, limit: Some(5) } if channel == "errors"
        ));
    }

    #[test]
    fn test_send_requires_handle_flag() {
        assert!(Cli::try_parse_from(["parley", "send", "roadmap", "hi"]).is_err());
    }
}
