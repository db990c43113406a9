//! Shexter command line
//!
//! Sends and reads texts through the Shexter app on an Android phone:
//! - resolves the phone's TCP endpoint (stored per network, discovered by
//!   UDP broadcast, or entered manually)
//! - builds the line-oriented request for the chosen command
//! - prints the phone's response

use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use shexter_protocol::broadcast;
use shexter_protocol::config::{self, EndpointStore};
use shexter_protocol::Error;

use crate::prompt::StdinOperator;

mod prompt;
mod requester;

#[derive(Parser)]
#[command(
    name = "shexter",
    version,
    about = "Send and read texts using your Android phone from the command line"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Every request the phone understands, plus local configuration.
/// Anything else fails at parse time with a usage message.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Send a text to a contact
    Send {
        /// Contact to send to (may span multiple words)
        contact_name: Vec<String>,
        /// One-shot message body instead of the interactive prompt
        #[arg(short, long)]
        send: Option<String>,
        /// Keep composing messages until cancelled
        #[arg(short, long)]
        multi: bool,
        /// Use a phone number instead of a contact name
        #[arg(short, long)]
        number: Option<String>,
    },
    /// Read recent messages from a conversation
    Read {
        /// Contact to read from (may span multiple words)
        contact_name: Vec<String>,
        /// How many messages to retrieve
        #[arg(short, long, default_value_t = requester::DEFAULT_READ_COUNT)]
        count: u32,
        /// Use a phone number instead of a contact name
        #[arg(short, long)]
        number: Option<String>,
    },
    /// Show unread messages
    Unread,
    /// List the contacts known to the phone
    Contacts,
    /// Choose the preferred number for a contact with several
    Setpref {
        /// Contact to set the preference for
        contact_name: Vec<String>,
    },
    /// Rediscover the phone and rewrite the saved endpoint
    Config,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    // Blocking prompts and probe waits observe this flag as cancellation.
    let interrupted = Arc::new(AtomicBool::new(false));
    if let Err(err) =
        signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupted))
    {
        log::warn!("could not install SIGINT handler: {}", err);
    }

    match run(cli.command, interrupted) {
        Ok(Some(output)) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(Error::Cancelled) => {
            // Operator interrupt, not a fault; exit quietly.
            println!();
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, interrupted: Arc<AtomicBool>) -> Result<Option<String>, Error> {
    let store = EndpointStore::open_default()?;
    let source = broadcast::platform_source();
    let mut operator = StdinOperator::new(interrupted);

    if let Command::Config = command {
        config::resolve(&store, source.as_ref(), &mut operator, true)?;
        return Ok(Some("Config completed.".to_string()));
    }

    let endpoint = config::resolve(&store, source.as_ref(), &mut operator, false)?;
    log::debug!("using endpoint {}", endpoint);

    requester::run(&command, &endpoint, &mut operator)
}
