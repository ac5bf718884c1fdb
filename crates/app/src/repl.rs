use policy_rag_core::{ChatSession, ConversationHistory};
use std::future::Future;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

const RULE_WIDTH: usize = 60;
const HISTORY_PREVIEW_CHARS: usize = 100;

const HELP_TEXT: &str = "
FINANCIAL POLICY CHATBOT HELP

This chatbot can answer questions about the financial policy document.

EXAMPLE QUESTIONS:
  - What is the total budget for this year?
  - What are the main debt obligations?
  - How much is allocated for infrastructure?
  - What are the revenue sources?
  - What about education funding?
  - Tell me about capital expenditures

FEATURES:
  - Conversation memory: remembers recent questions
  - Page references: shows where information comes from
  - Context-aware: understands follow-up questions

COMMANDS:
  - Type 'help' to show this help message
  - Type 'history' to show recent conversation
  - Type 'exit' or 'quit' to end the conversation

Just ask your question in plain English!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Exit,
    Help,
    History,
    Ask(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed.to_lowercase().as_str() {
            "" => Command::Empty,
            "exit" | "quit" | "bye" => Command::Exit,
            "help" => Command::Help,
            "history" => Command::History,
            _ => Command::Ask(trimmed.to_string()),
        }
    }
}

pub fn write_banner<W: Write>(output: &mut W) -> std::io::Result<()> {
    writeln!(output, "\n{}", "=".repeat(RULE_WIDTH))?;
    writeln!(output, "FINANCIAL POLICY CHATBOT")?;
    writeln!(output, "{}", "=".repeat(RULE_WIDTH))?;
    writeln!(output, "Ask me anything about the financial policy document!")?;
    writeln!(
        output,
        "Type 'help' for guidance, 'history' for recent chat, or 'exit' to quit."
    )?;
    writeln!(output, "{}", "-".repeat(RULE_WIDTH))
}

pub fn write_history<W: Write>(history: &ConversationHistory, output: &mut W) -> std::io::Result<()> {
    if history.is_empty() {
        return writeln!(output, "No conversation history yet.");
    }

    writeln!(output, "\nRECENT CONVERSATION HISTORY:")?;
    writeln!(output, "{}", "=".repeat(50))?;
    for (position, exchange) in history.iter().enumerate() {
        writeln!(output, "\n{}. User: {}", position + 1, exchange.user)?;
        writeln!(output, "   Bot: {}", preview(&exchange.assistant))?;
    }
    writeln!(output, "{}", "=".repeat(50))
}

fn preview(answer: &str) -> String {
    let mut shown = answer.chars().take(HISTORY_PREVIEW_CHARS).collect::<String>();
    if answer.chars().count() > HISTORY_PREVIEW_CHARS {
        shown.push_str("...");
    }
    shown
}

/// Reads commands until exit, end of input or Ctrl-C. Turn failures are
/// printed and the loop carries on.
pub async fn run<R, W>(session: &mut ChatSession, input: R, output: &mut W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    run_until(session, input, output, tokio::signal::ctrl_c()).await
}

/// Like [`run`], ending the session as soon as `interrupt` resolves, whether
/// the loop is waiting at the prompt or a question is in flight. The
/// in-flight request is dropped.
pub async fn run_until<R, W, I>(
    session: &mut ChatSession,
    input: R,
    output: &mut W,
    interrupt: I,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    I: Future,
{
    write_banner(output)?;
    let mut lines = input.lines();
    tokio::pin!(interrupt);

    loop {
        write!(output, "\nYour question: ")?;
        output.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut interrupt => {
                writeln!(output, "\n\nGoodbye!")?;
                break;
            }
        };

        let Some(line) = line else {
            writeln!(output, "\n\nGoodbye!")?;
            break;
        };

        match Command::parse(&line) {
            Command::Empty => continue,
            Command::Exit => {
                writeln!(output, "\nThank you for using the Financial Policy Chatbot!")?;
                break;
            }
            Command::Help => writeln!(output, "{HELP_TEXT}")?,
            Command::History => write_history(session.history(), output)?,
            Command::Ask(question) => {
                writeln!(output, "\nSearching policy document...")?;
                output.flush()?;
                let outcome = tokio::select! {
                    outcome = session.ask(&question) => outcome,
                    _ = &mut interrupt => {
                        writeln!(output, "\n\nGoodbye!")?;
                        break;
                    }
                };
                let reply = match outcome {
                    Ok(answer) => answer,
                    Err(error) => {
                        warn!(%error, "turn failed");
                        format!("Error generating response: {error}")
                    }
                };
                writeln!(output, "\nResponse:\n{reply}")?;
                writeln!(output, "{}", "-".repeat(RULE_WIDTH))?;
            }
        }
    }

    output.flush()
}
