//! Interactive loop and turn interruption.

use crate::error::Result;
use crate::scenario::print_report;
use runtime::{Backend, Session};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::future::Future;
use std::io::Write;
use tokio_util::sync::CancellationToken;

const HELP: &str = "\
Commands:
  help         show this help
  clear        clear the screen
  reset        forget the conversation so far
  exit, quit   leave
Anything else is sent to the model. Ctrl+C cancels a running turn.";

/// A line typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Exit,
    Clear,
    Reset,
    Help,
    Prompt(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let command = if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            Self::Exit
        } else if line.eq_ignore_ascii_case("clear") {
            Self::Clear
        } else if line.eq_ignore_ascii_case("reset") {
            Self::Reset
        } else if line.eq_ignore_ascii_case("help") {
            Self::Help
        } else {
            Self::Prompt(line)
        };
        Some(command)
    }
}

/// Run `fut`, cancelling `cancel` if Ctrl+C arrives first.
pub async fn interruptible<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> T {
    let token = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt received");
            token.cancel();
        }
    });
    let output = fut.await;
    watcher.abort();
    output
}

/// Run one turn and print its outcome.
pub async fn turn<B: Backend>(session: &mut Session<B>, input: &str, verbose: bool) {
    let cancel = CancellationToken::new();
    match interruptible(&cancel, session.chat(input, &cancel)).await {
        Ok(report) => print_report(&report, verbose),
        Err(runtime::Error::Cancelled) => println!("(cancelled)\n"),
        Err(e) => eprintln!("Error: {e}\n"),
    }
}

pub async fn run<B: Backend>(session: &mut Session<B>, model: &str, verbose: bool) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    println!("toolcall v{}", env!("CARGO_PKG_VERSION"));
    println!("Model: {model}");
    println!("Session ID: {}", session.id);
    println!("Type 'help' for commands, 'exit' or Ctrl+D to quit.\n");

    loop {
        let line = match rl.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let Some(command) = Command::parse(&line) else {
            continue;
        };
        match command {
            Command::Exit => break,
            Command::Clear => {
                print!("\x1B[2J\x1B[1;1H");
                std::io::stdout().flush()?;
            }
            Command::Reset => {
                session.reset();
                println!("Conversation cleared.\n");
            }
            Command::Help => println!("{HELP}\n"),
            Command::Prompt(input) => {
                let _ = rl.add_history_entry(input);
                turn(session, input, verbose).await;
            }
        }
    }

    println!("Goodbye.");
    Ok(())
}
