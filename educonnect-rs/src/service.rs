//! Main service loop.
//!
//! Multiplexes session completions, terminal commands and API commands on
//! one task, so every session mutation happens in a single event turn.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{self, ApiCommand, ApiState};
use crate::session::{SessionController, SessionEvent};
use crate::terminal::{self, TerminalCommand, TranscriptPrinter};

pub struct AssistantService {
    session: SessionController,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    api_port: Option<u16>,
}

impl AssistantService {
    pub fn new(
        session: SessionController,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        api_port: Option<u16>,
    ) -> Self {
        Self {
            session,
            events,
            api_port,
        }
    }

    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        let (api_tx, mut api_rx) = mpsc::channel::<ApiCommand>(16);
        if let Some(port) = self.api_port {
            let state = ApiState {
                commands: api_tx.clone(),
                snapshot: self.session.subscribe(),
            };
            api::start_api(state, port).await;
        }
        // Without the API the channel just stays empty.
        let _api_tx = api_tx;

        let (term_tx, mut term_rx) = mpsc::channel::<TerminalCommand>(16);
        terminal::spawn_stdin_reader(term_tx);

        let mut snapshots = self.session.subscribe();
        let mut printer = TranscriptPrinter::default();

        println!("EduConnect assistant ready.\n{}", terminal::HELP);
        info!("Service ready");

        loop {
            tokio::select! {
                Some(event) = self.events.recv() => {
                    self.session.handle_event(event);
                }
                command = term_rx.recv() => {
                    match command {
                        Some(TerminalCommand::Quit) | None => break,
                        Some(command) => self.on_terminal_command(command),
                    }
                }
                Some(command) = api_rx.recv() => {
                    self.on_api_command(command);
                }
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    for line in printer.render(&snapshot) {
                        println!("{line}");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
        }

        self.session.stop_speaking();
        info!("Service stopped");
        Ok(())
    }

    fn on_terminal_command(&mut self, command: TerminalCommand) {
        match command {
            TerminalCommand::Submit(text) => {
                self.session.set_pending_input(&text);
                if let Err(e) = self.session.submit(&text) {
                    println!("! {e}");
                }
            }
            TerminalCommand::Listen => {
                if let Err(e) = self.session.start_listening() {
                    println!("! {e}");
                }
            }
            TerminalCommand::Stop => self.session.stop_speaking(),
            TerminalCommand::Help => println!("{}", terminal::HELP),
            TerminalCommand::Quit => {}
        }
    }

    fn on_api_command(&mut self, command: ApiCommand) {
        debug!("API command: {command:?}");
        match command {
            ApiCommand::Submit { text, reply } => {
                let result = self.session.submit(&text).map(|_| ());
                if reply.send(result).is_err() {
                    warn!("API client went away before submit result");
                }
            }
            ApiCommand::Listen { reply } => {
                let _ = reply.send(self.session.start_listening());
            }
            ApiCommand::Stop => self.session.stop_speaking(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::oneshot;

    use super::*;
    use crate::config::GenerationConfig;
    use crate::error::{ListenError, SubmitError};
    use crate::prompt::test_support::ScriptedBackend;
    use crate::prompt::PromptClient;
    use crate::session::SessionOptions;
    use crate::speech::input::UnavailableRecognizer;
    use crate::speech::output::MutedSynthesizer;

    fn service() -> AssistantService {
        let prompt = PromptClient::new(
            Arc::new(ScriptedBackend::reply("Hi!")),
            "Be brief.",
            GenerationConfig::default(),
        );
        let (session, events) = SessionController::new(
            prompt,
            Arc::new(UnavailableRecognizer::new("test")),
            Arc::new(MutedSynthesizer),
            SessionOptions::default(),
        );
        AssistantService::new(session, events, None)
    }

    #[tokio::test]
    async fn test_api_submit_goes_through_session() {
        let mut svc = service();

        let (reply, rx) = oneshot::channel();
        svc.on_api_command(ApiCommand::Submit {
            text: "hello".into(),
            reply,
        });
        assert_eq!(rx.await.unwrap(), Ok(()));
        assert_eq!(svc.session.messages().len(), 1);

        let (reply, rx) = oneshot::channel();
        svc.on_api_command(ApiCommand::Submit {
            text: "again".into(),
            reply,
        });
        assert_eq!(rx.await.unwrap(), Err(SubmitError::Busy));

        let (reply, rx) = oneshot::channel();
        svc.on_api_command(ApiCommand::Listen { reply });
        assert_eq!(rx.await.unwrap(), Err(ListenError::Busy));
    }

    #[tokio::test]
    async fn test_terminal_submit_sets_then_clears_pending_input() {
        let mut svc = service();
        svc.on_terminal_command(TerminalCommand::Submit("What is gravity?".into()));
        assert_eq!(svc.session.pending_input(), "");
        assert!(svc.session.is_awaiting_reply());

        let event = svc.events.recv().await.unwrap();
        svc.session.handle_event(event);
        assert_eq!(svc.session.messages().len(), 2);
    }
}
