//! contactgraph command-line tool.
//!
//! One-shot access to a durable contact database: reconcile a pair, audit
//! the graph or compact the WAL. Output is JSON on stdout.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use serde_json::json;

use contactgraph::audit::check_invariants;
use contactgraph::storage::{open_database, ContactStore};
use contactgraph::view::{IdentifyRequest, IdentifyResponse};
use contactgraph::Reconciler;

const USAGE: &str = "\
contactgraph - identity reconciliation tool

USAGE:
    contactgraph [-d <DIR>] <COMMAND>

COMMANDS:
    identify [--email <EMAIL>] [--phone <PHONE>]   Reconcile a pair and print the identity
    identify --json <BODY>                         Same, from an identify request body (`-` reads stdin)
    audit                                          Check graph invariants (exit 1 on violations)
    compact                                        Fold the WAL into a snapshot

OPTIONS:
    -d, --data-dir <DIR>   Data directory [env: CONTACTGRAPH_DATA_DIR] [default: ./contacts.db]
    -h, --help             Print help information";

#[derive(Debug, PartialEq, Eq)]
enum Identify {
    Pair {
        email: Option<String>,
        phone: Option<String>,
    },
    /// A JSON request body, or `-` for stdin.
    Body(String),
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Identify(Identify),
    Audit,
    Compact,
}

struct Args {
    data_dir: PathBuf,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Option<Args>, String> {
    let mut data_dir = std::env::var_os("CONTACTGRAPH_DATA_DIR")
        .map_or_else(|| PathBuf::from("./contacts.db"), PathBuf::from);
    let mut command = None;
    let mut email = None;
    let mut phone = None;
    let mut body = None;

    let mut it = args.iter().skip(1);
    while let Some(arg) = it.next() {
        let mut value = || it.next().cloned().ok_or_else(|| format!("{arg} requires a value"));
        match arg.as_str() {
            "--data-dir" | "-d" => data_dir = PathBuf::from(value()?),
            "--email" => email = Some(value()?),
            "--phone" => phone = Some(value()?),
            "--json" => body = Some(value()?),
            "--help" | "-h" => return Ok(None),
            "identify" | "audit" | "compact" if command.is_none() => command = Some(arg.clone()),
            other => return Err(format!("unexpected argument: {other}")),
        }
    }

    let command = match command.as_deref() {
        Some("identify") => match body {
            Some(_) if email.is_some() || phone.is_some() => {
                return Err("--json cannot be combined with --email or --phone".to_string())
            }
            Some(body) => Command::Identify(Identify::Body(body)),
            None => Command::Identify(Identify::Pair { email, phone }),
        },
        Some("audit") => Command::Audit,
        Some("compact") => Command::Compact,
        _ => return Err("missing command".to_string()),
    };
    Ok(Some(Args { data_dir, command }))
}

/// Resolves the identifiers to reconcile, parsing a request body if given.
fn identifiers(identify: Identify) -> Result<(Option<String>, Option<String>), Box<dyn std::error::Error>> {
    let body = match identify {
        Identify::Pair { email, phone } => return Ok((email, phone)),
        Identify::Body(body) if body == "-" => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
        Identify::Body(body) => body.into_bytes(),
    };
    let request = IdentifyRequest::from_json(&body)?;
    Ok((request.email, request.phone_number))
}

fn run(args: Args) -> Result<bool, Box<dyn std::error::Error>> {
    let store = Arc::new(open_database(&args.data_dir, None)?);

    match args.command {
        Command::Identify(identify) => {
            let (email, phone) = identifiers(identify)?;
            let reconciler = Reconciler::new(store);
            let view = reconciler.reconcile(email, phone)?;
            println!("{}", serde_json::to_string_pretty(&IdentifyResponse::from(view))?);
            Ok(true)
        }
        Command::Audit => {
            let contacts = store.all_contacts()?;
            let violations = check_invariants(&contacts);
            let report = json!({
                "contacts": contacts.len(),
                "primaries": contacts.iter().filter(|c| c.is_primary()).count(),
                "violations": violations,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(violations.is_empty())
        }
        Command::Compact => {
            let result = store.compact()?;
            let report = json!({
                "contacts_written": result.contacts_written,
                "sequence": result.sequence,
                "wal_size_before": result.wal_size_before,
                "wal_size_after": result.wal_size_after,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().collect();
    let args = match parse_args(&argv) {
        Ok(Some(args)) => args,
        Ok(None) => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(msg) => {
            eprintln!("error: {msg}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
