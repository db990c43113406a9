//! Request building and command flow.
//!
//! Each command becomes one line-oriented request: the command word, the
//! target lines (contact name, or `-number` plus the digits), any
//! command-specific arguments, and a terminating blank line. The phone's
//! response is returned for printing, except when it opens with the
//! `NEED-SETPREF` marker, which triggers a number-selection round trip
//! before the final response comes back.

use shexter_protocol::endpoint::Endpoint;
use shexter_protocol::error::{Error, SessionError};
use shexter_protocol::session;

use crate::prompt::StdinOperator;
use crate::Command;

// Command words, must match the phone app.
const COMMAND_SEND: &str = "send";
const COMMAND_READ: &str = "read";
const COMMAND_CONTACTS: &str = "contacts";
const COMMAND_UNREAD: &str = "unread";
const COMMAND_SETPREF: &str = "setpref";
const COMMAND_SETPREF_LIST: &str = "setpref-list";

/// Marks a target given as a phone number rather than a contact name.
const NUMBER_FLAG: &str = "-number";

/// Response prefix meaning the contact has several numbers and one must
/// be chosen before the request can complete.
const SETPREF_NEEDED: &str = "NEED-SETPREF";

pub const DEFAULT_READ_COUNT: u32 = 20;
const READ_COUNT_LIMIT: u32 = 5000;

const RESTART_MSG: &str = "\nTry restarting the Shexter app, then run \"shexter config\" to change the IP address \
to the one displayed on the app.\n\
Also ensure your phone and computer are connected to the same network.";

/// Terminal width reported to the phone so it can wrap its output.
fn tty_width() -> u16 {
    match crossterm::terminal::size() {
        Ok((cols, _)) => cols,
        Err(_) => 80,
    }
}

// ============================================================================
// Request builders
// ============================================================================

/// The target lines of a request: `-number` plus the digits, or the
/// contact name. Always newline-terminated.
fn target_lines(contact: &str, number: Option<&str>) -> String {
    match number {
        Some(digits) => format!("{}\n{}\n", NUMBER_FLAG, digits),
        None => format!("{}\n", contact),
    }
}

fn read_request(target: &str, count: u32, width: u16) -> String {
    format!("{}\n{}{}\n{}\n\n", COMMAND_READ, target, count, width)
}

fn unread_request(width: u16) -> String {
    format!("{}\n{}\n\n", COMMAND_UNREAD, width)
}

fn contacts_request() -> String {
    format!("{}\n\n", COMMAND_CONTACTS)
}

fn setpref_list_request(target: &str, width: u16) -> String {
    format!("{}\n{}{}\n\n", COMMAND_SETPREF_LIST, target, width)
}

/// `body` carries its own trailing newline per composed line.
fn send_request(target: &str, body: &str) -> String {
    format!("{}\n{}{}\n", COMMAND_SEND, target, body)
}

/// `index` is the zero-based position of the chosen number.
fn setpref_request(contact: &str, index: usize) -> String {
    format!("{}\n{}\n{}\n\n", COMMAND_SETPREF, contact, index)
}

// ============================================================================
// Command flow
// ============================================================================

/// Run one command against the phone. `Ok(Some)` carries output to print;
/// `Ok(None)` means the outcome was already reported to the user.
pub fn run(
    command: &Command,
    endpoint: &Endpoint,
    prompt: &mut StdinOperator,
) -> Result<Option<String>, Error> {
    let width = tty_width();

    let response = match command {
        Command::Send {
            contact_name,
            send,
            multi,
            number,
        } => {
            let target = match resolve_target(contact_name, number.as_deref(), prompt)? {
                Some(target) => target,
                None => return Ok(None),
            };
            return send_command(endpoint, &target, send.as_deref(), *multi, prompt);
        }
        Command::Read {
            contact_name,
            count,
            number,
        } => {
            let target = match resolve_target(contact_name, number.as_deref(), prompt)? {
                Some(target) => target,
                None => return Ok(None),
            };
            let mut count = *count;
            if count > READ_COUNT_LIMIT {
                println!(
                    "Retrieving the maximum number of messages: {}",
                    READ_COUNT_LIMIT
                );
                count = READ_COUNT_LIMIT;
            }
            exchange(endpoint, &read_request(&target, count, width))?
        }
        Command::Unread => exchange(endpoint, &unread_request(width))?,
        Command::Contacts => exchange(endpoint, &contacts_request())?,
        Command::Setpref { contact_name } => {
            let target = match resolve_target(contact_name, None, prompt)? {
                Some(target) => target,
                None => return Ok(None),
            };
            exchange(endpoint, &setpref_list_request(&target, width))?
        }
        // Handled before any request is built.
        Command::Config => return Ok(None),
    };

    finish(endpoint, response, prompt)
}

/// Target lines for commands that need one: the number if given,
/// otherwise the contact name, prompted for when the args left it empty.
/// `Ok(None)` when the user gives up.
fn resolve_target(
    contact_words: &[String],
    number: Option<&str>,
    prompt: &mut StdinOperator,
) -> Result<Option<String>, Error> {
    if number.is_some() {
        return Ok(Some(target_lines("", number)));
    }
    let joined = contact_words.join(" ");
    match prompt.require_contact_name(&joined)? {
        Some(name) => Ok(Some(target_lines(&name, None))),
        None => Ok(None),
    }
}

/// Resolve a `NEED-SETPREF` response if one came back, then hand the
/// final response to the caller.
fn finish(
    endpoint: &Endpoint,
    response: Option<String>,
    prompt: &mut StdinOperator,
) -> Result<Option<String>, Error> {
    match response {
        Some(text) if text.starts_with(SETPREF_NEEDED) => {
            handle_setpref_response(endpoint, &text, prompt)
        }
        other => Ok(other),
    }
}

/// Compose and send one message, or keep going under `-m`. The phone's
/// confirmation is printed per message in multi mode and returned for the
/// last one otherwise.
fn send_command(
    endpoint: &Endpoint,
    target: &str,
    arg_send: Option<&str>,
    multi: bool,
    prompt: &mut StdinOperator,
) -> Result<Option<String>, Error> {
    let mut preset = arg_send.map(|text| format!("{}\n", text));

    let mut output = None;
    let mut first = true;
    while first || multi {
        first = false;

        let body = match preset.take() {
            Some(body) => Some(body),
            None => prompt.compose_message()?,
        };
        let body = match body {
            Some(body) => body,
            None => {
                output = Some("Send cancelled.".to_string());
                break;
            }
        };

        if body.trim().is_empty() {
            output = Some("Not sent: message body was empty.".to_string());
            continue;
        }
        if body.lines().next().unwrap_or("").is_empty() {
            output = Some("Not sent: first line cannot be blank (for now).".to_string());
            continue;
        }

        output = finish(endpoint, exchange(endpoint, &send_request(target, &body))?, prompt)?;
        if multi {
            if let Some(text) = &output {
                println!("{}", text);
            }
        }
    }

    Ok(output)
}

/// The contact has several numbers: print the listing, have the user pick
/// one, and send the preference. The phone replays the original request
/// afterwards, so its answer is the final output.
fn handle_setpref_response(
    endpoint: &Endpoint,
    response: &str,
    prompt: &mut StdinOperator,
) -> Result<Option<String>, Error> {
    // The marker may arrive with nothing after it; never slice past it.
    let listing = response.get(SETPREF_NEEDED.len() + 1..).unwrap_or("");

    let mut count = listing.lines().count().saturating_sub(1);
    if listing.contains("Current:") {
        count = count.saturating_sub(1);
    }
    if count == 0 {
        return Ok(Some(listing.to_string()));
    }

    println!("{}", listing);
    let choice = prompt.select_number(count)?;

    let contact = listing.split(" has").next().unwrap_or("").trim();
    exchange(endpoint, &setpref_request(contact, choice - 1))
}

/// One request/response exchange. Session faults are reported to the user
/// with recovery guidance and collapse to `Ok(None)`; cancellation alone
/// propagates.
fn exchange(endpoint: &Endpoint, request: &str) -> Result<Option<String>, Error> {
    match session::contact_server(endpoint, request) {
        Ok(response) => Ok(Some(response)),
        Err(SessionError::Cancelled) => Err(Error::Cancelled),
        Err(err @ (SessionError::ServerCrashed
        | SessionError::ServerFrozen
        | SessionError::MalformedHeader(_))) => {
            eprintln!("{}", err);
            eprintln!("Restart the app on your phone and try again.");
            Ok(None)
        }
        Err(err) => {
            eprintln!("{}", err);
            eprintln!("{}", RESTART_MSG);
            Ok(None)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
