//! Line-oriented terminal front end.
//!
//! Reads commands from stdin and prints transcript changes from session
//! snapshots. Plain lines are questions; slash commands control voice.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::session::SessionSnapshot;

pub const HELP: &str = "Type a question and press Enter.\n  \
/listen  ask by voice\n  \
/stop    stop speaking\n  \
/quit    exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    Submit(String),
    Listen,
    Stop,
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `None`; questions keep the
/// line exactly as typed.
pub fn parse_line(line: &str) -> Option<TerminalCommand> {
    let command = match line.trim() {
        "" => return None,
        "/listen" | "/l" => TerminalCommand::Listen,
        "/stop" | "/s" => TerminalCommand::Stop,
        "/help" | "/h" | "/?" => TerminalCommand::Help,
        "/quit" | "/q" | "/exit" => TerminalCommand::Quit,
        _ => TerminalCommand::Submit(line.to_string()),
    };
    Some(command)
}

/// Forward parsed stdin lines until EOF, which is reported as `Quit`.
pub fn spawn_stdin_reader(tx: mpsc::Sender<TerminalCommand>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(command) = parse_line(&line) {
                        if tx.send(command).await.is_err() {
                            break;
                        }
                    }
                }
                Ok(None) | Err(_) => {
                    debug!("stdin closed");
                    let _ = tx.send(TerminalCommand::Quit).await;
                    break;
                }
            }
        }
    });
}

/// Turns successive snapshots into the lines that should be printed.
#[derive(Debug, Default)]
pub struct TranscriptPrinter {
    printed: usize,
    last_notice: Option<String>,
    was_awaiting: bool,
    was_listening: bool,
}

impl TranscriptPrinter {
    pub fn render(&mut self, snapshot: &SessionSnapshot) -> Vec<String> {
        let mut lines = Vec::new();

        if snapshot.is_listening && !self.was_listening {
            lines.push("(listening...)".to_string());
        }
        self.was_listening = snapshot.is_listening;

        for message in snapshot.messages.iter().skip(self.printed) {
            lines.push(message.transcript_line());
        }
        self.printed = snapshot.messages.len();

        if snapshot.is_awaiting_reply && !self.was_awaiting {
            lines.push("(thinking...)".to_string());
        }
        self.was_awaiting = snapshot.is_awaiting_reply;

        if snapshot.notice != self.last_notice {
            if let Some(notice) = &snapshot.notice {
                lines.push(format!("! {notice}"));
            }
            self.last_notice = snapshot.notice.clone();
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageHistory;

    fn snapshot(history: &MessageHistory) -> SessionSnapshot {
        SessionSnapshot {
            messages: history.as_slice().to_vec(),
            ..SessionSnapshot::default()
        }
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("  "), None);
        assert_eq!(parse_line("/listen"), Some(TerminalCommand::Listen));
        assert_eq!(parse_line("/q"), Some(TerminalCommand::Quit));
        assert_eq!(
            parse_line("  What is a prime number? "),
            Some(TerminalCommand::Submit("  What is a prime number? ".into()))
        );
    }

    #[test]
    fn test_unknown_slash_text_is_a_question() {
        assert_eq!(
            parse_line("/r/askscience style answer please"),
            Some(TerminalCommand::Submit("/r/askscience style answer please".into()))
        );
    }

    #[test]
    fn test_printer_prints_each_message_once() {
        let mut printer = TranscriptPrinter::default();
        let mut history = MessageHistory::new();
        let user_line = history.push_user("hello").unwrap().transcript_line();
        assert!(user_line.ends_with("] You: hello"));

        let mut snap = snapshot(&history);
        snap.is_awaiting_reply = true;
        assert_eq!(printer.render(&snap), vec![user_line, "(thinking...)".to_string()]);
        assert!(printer.render(&snap).is_empty());

        let bot_line = history.push_bot("Hi there!").unwrap().transcript_line();
        assert!(bot_line.ends_with("] Bot: Hi there!"));
        assert_eq!(printer.render(&snapshot(&history)), vec![bot_line]);
    }

    #[test]
    fn test_printer_shows_new_notice_once() {
        let mut printer = TranscriptPrinter::default();
        let snap = SessionSnapshot {
            notice: Some("I didn't catch that.".into()),
            ..SessionSnapshot::default()
        };
        assert_eq!(printer.render(&snap), vec!["! I didn't catch that."]);
        assert!(printer.render(&snap).is_empty());
        assert!(printer.render(&SessionSnapshot::default()).is_empty());
    }

    #[test]
    fn test_printer_listening_marker() {
        let mut printer = TranscriptPrinter::default();
        let snap = SessionSnapshot {
            is_listening: true,
            ..SessionSnapshot::default()
        };
        assert_eq!(printer.render(&snap), vec!["(listening...)"]);
    }
}
