//! Stdin-backed operator prompts.
//!
//! Every blocking read observes the SIGINT flag and EOF as cancellation.
//! Prompts that gate the protocol (ready gate, candidate confirmation,
//! manual entry) report it as [`Error::Cancelled`]; message composition
//! treats it as a soft abandon, like the original client.

use std::io::{self, BufRead, Write};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use shexter_protocol::endpoint::Endpoint;
use shexter_protocol::error::Error;
use shexter_protocol::operator::Operator;
use shexter_protocol::port;

pub struct StdinOperator {
    interrupted: Arc<AtomicBool>,
}

impl StdinOperator {
    pub fn new(interrupted: Arc<AtomicBool>) -> Self {
        StdinOperator { interrupted }
    }

    /// One line from stdin; `Cancelled` on EOF or SIGINT.
    fn read_line(&self) -> Result<String, Error> {
        if self.interrupted.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => Err(Error::Cancelled),
            Ok(_) => {
                if self.interrupted.load(Ordering::Relaxed) {
                    return Err(Error::Cancelled);
                }
                Ok(line.trim_end_matches(['\r', '\n']).to_string())
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => Err(Error::Cancelled),
            Err(err) => Err(Error::Io(err)),
        }
    }

    fn ask(&self, prompt: &str) -> Result<String, Error> {
        print!("{}", prompt);
        let _ = io::stdout().flush();
        self.read_line()
    }

    /// Message body for a send: lines until an empty one after the first.
    /// `Ok(None)` when composition is abandoned.
    pub fn compose_message(&self) -> Result<Option<String>, Error> {
        println!("Enter message (press Enter twice to send, Ctrl+C to cancel):");

        let mut body = String::new();
        let mut first = true;
        loop {
            let line = match self.read_line() {
                Ok(line) => line,
                Err(Error::Cancelled) => {
                    println!();
                    return Ok(None);
                }
                Err(err) => return Err(err),
            };
            if line.trim().is_empty() && !first {
                break;
            }
            first = false;
            body.push_str(&line);
            body.push('\n');
        }
        Ok(Some(body))
    }

    /// Contact name prompted until non-empty; `Ok(None)` when abandoned.
    pub fn require_contact_name(&self, initial: &str) -> Result<Option<String>, Error> {
        let mut name = initial.trim().to_string();
        while name.is_empty() {
            println!("A contact name is required for this command.");
            match self.ask("Enter a contact name (Ctrl+C to give up): ") {
                Ok(line) => name = line.trim().to_string(),
                Err(Error::Cancelled) => {
                    println!();
                    return Ok(None);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(Some(name))
    }

    /// 1-based selection in [1, limit], re-prompted until valid.
    pub fn select_number(&self, limit: usize) -> Result<usize, Error> {
        loop {
            let line = self.ask(&format!("Select a number from the above, 1 to {}: ", limit))?;
            match line.trim().parse::<usize>() {
                Ok(choice) if (1..=limit).contains(&choice) => return Ok(choice),
                _ => println!(
                    "Not a valid selection: must be an integer between 1 and {}",
                    limit
                ),
            }
        }
    }
}

impl Operator for StdinOperator {
    fn wait_until_ready(&mut self) -> Result<(), Error> {
        println!("Ready to search for phones.");
        self.ask("Press Enter when the app is open on your phone. ")?;
        Ok(())
    }

    fn confirm_candidate(&mut self, description: &str, sender: Ipv4Addr) -> Result<bool, Error> {
        println!("Got a response from {}", sender);
        println!("Phone info: {}", description);
        let answer = self.ask("Is this your phone? y/N: ")?;
        Ok(answer.trim().eq_ignore_ascii_case("y"))
    }

    fn manual_entry(&mut self) -> Result<Option<Endpoint>, Error> {
        let answer = self.ask("Couldn't find your phone - configure manually? Y/n: ")?;
        if answer.trim().eq_ignore_ascii_case("n") {
            return Ok(None);
        }

        let address = loop {
            let line = self.ask("Enter the IP address shown in the app, e.g. \"192.168.1.100\": ")?;
            match Endpoint::parse_address(&line) {
                Ok(address) => break address,
                Err(err) => println!("{}", err),
            }
        };

        let port = loop {
            let line = self.ask("Enter the port shown in the app, e.g. \"23457\": ")?;
            match port::parse_port(&line) {
                Ok(port) => break port,
                Err(err) => println!("{}", err),
            }
        };

        Ok(Some(Endpoint::new(address, port)))
    }
}
