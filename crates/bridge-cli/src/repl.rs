//! Interactive read-answer loop over stdin/stdout.

use bridge_core::{AgentEvent, ChatSession, SessionStep, ends_session};
use bridge_types::{BridgeError, Usage};
use std::io::{self, BufRead, Write};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Why the loop stopped.
pub enum Exit {
    /// Quit command or end of input.
    Quit,
    /// Ctrl+C.
    Interrupted,
    /// The session cannot continue.
    Fatal(anyhow::Error),
}

/// Read lines until the session closes.
pub async fn run(session: &mut ChatSession, interrupt: CancellationToken) -> Exit {
    let mut lines = spawn_line_reader();

    loop {
        eprint!("> ");
        let _ = io::stderr().flush();

        let line = tokio::select! {
            _ = interrupt.cancelled() => {
                eprintln!();
                return Exit::Interrupted;
            }
            line = lines.recv() => line,
        };
        let line = match line {
            Some(Ok(line)) => line,
            None => {
                // EOF behaves like quit
                eprintln!();
                session.close();
                return Exit::Quit;
            }
            Some(Err(e)) => {
                return Exit::Fatal(anyhow::Error::new(e).context("Failed to read input"));
            }
        };

        match session
            .handle_input(&line, interrupt.clone(), render_event)
            .await
        {
            Ok(SessionStep::Answer(answer)) => println!("\n{answer}\n"),
            Ok(SessionStep::Ignored) => {}
            Ok(SessionStep::Closed) => return Exit::Quit,
            Err(BridgeError::Cancelled) => {
                eprintln!();
                return Exit::Interrupted;
            }
            Err(e) if ends_session(&e) => return Exit::Fatal(e.into()),
            Err(e) => eprintln!("\nError: {e}\n"),
        }
    }
}

/// Read stdin lines on a plain thread.
///
/// A blocked read there never holds up runtime shutdown, so Ctrl+C at the
/// prompt exits right away. The channel closes at EOF.
fn spawn_line_reader() -> mpsc::Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

/// Show tool activity as it happens.
fn render_event(event: AgentEvent) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match event {
        AgentEvent::Text(text) => {
            let _ = writeln!(out, "{text}");
        }
        AgentEvent::ToolStart { name, input } => {
            let _ = writeln!(out, "  [calling {name} with {input}]");
        }
        AgentEvent::ToolEnd {
            name,
            output,
            is_error,
        } => {
            if is_error {
                let _ = writeln!(out, "  [tool {name} error: {output}]");
            } else {
                let _ = writeln!(out, "  [tool {name} done: {output}]");
            }
        }
        // Notices come back as the answer, errors as the returned error
        AgentEvent::Notice(_)
        | AgentEvent::Error(_)
        | AgentEvent::Usage(_)
        | AgentEvent::Done
        | AgentEvent::Cancelled => {}
    }
    let _ = out.flush();
}

pub fn print_usage(usage: &Usage, tool_calls: usize) {
    eprintln!(
        "Tokens: prompt {}, completion {}, total {} ({} tool calls)",
        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens, tool_calls
    );
}
