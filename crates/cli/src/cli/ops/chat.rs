use std::io::Write;

use clap::Args;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use common::prelude::{
    ChatSession, Messenger, NostrRelayClient, RelayClient, SessionError, StatusTracker,
};

use crate::cli::op::verbose_report;
use crate::state::StateError;

const PROMPT: &str = "> ";

#[derive(Args, Debug, Clone)]
pub struct Chat {
    /// Conversation ID
    pub id: String,

    /// Display name (defaults to config, then asks)
    #[arg(long, short)]
    pub name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("failed to load config: {0}")]
    State(#[from] StateError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("terminal error: {0}")]
    Io(#[from] std::io::Error),
    #[error("username cannot be empty")]
    EmptyUsername,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Chat {
    type Error = ChatError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = ctx.config()?;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut out = std::io::stdout();

        let username = match self.name.clone().or(config.default_username.clone()) {
            Some(name) => name,
            None => {
                emit(&mut out, "Enter username: ")?;
                lines.next_line().await?.unwrap_or_default()
            }
        };
        let username = username.trim();
        if username.is_empty() {
            return Err(ChatError::EmptyUsername);
        }

        let messenger = Messenger::<NostrRelayClient>::from_config(&config);
        let session = messenger.chat(&self.id, username).await;

        let result = run_session(&session, lines, ctx.verbose, &mut out).await;
        session.close().await;
        result?;

        emit(&mut out, "\n")?;
        Ok("--- Disconnected ---".to_string())
    }
}

/// Drive one chat session until input ends or Ctrl-C
///
/// Sending keeps working after the listener has stopped.
pub(crate) async fn run_session<C, R, W>(
    session: &ChatSession<C>,
    mut lines: Lines<R>,
    verbose: bool,
    out: &mut W,
) -> Result<(), ChatError>
where
    C: RelayClient,
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    for message in session.backlog() {
        emit(out, &format!("{}\n", message))?;
    }
    emit(
        out,
        &format!("--- Connected as [{}] ---\n{}", session.username(), PROMPT),
    )?;

    let mut incoming_open = true;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let text = line.trim();
                if text.is_empty() {
                    emit(out, PROMPT)?;
                    continue;
                }

                let started = std::time::Instant::now();
                let tracker = StatusTracker::new(verbose);
                let (formatted, report) = session.send_line(text, &tracker).await?;
                // replace the typed line with the formatted one
                emit(out, &format!("\x1b[A\x1b[K{}\n", formatted))?;
                if verbose {
                    eprintln!("{}", verbose_report(&tracker, started.elapsed()));
                }
                if !report.is_delivered() {
                    tracing::warn!("no relay accepted the message");
                }
                emit(out, PROMPT)?;
            }
            message = session.next_message(), if incoming_open => {
                match message {
                    Some(message) => emit(out, &format!("\r\x1b[K{}\n{}", message, PROMPT))?,
                    None => {
                        tracing::warn!("lost every relay subscription, no new messages will arrive");
                        incoming_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

fn emit<W: Write>(out: &mut W, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes())?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    use common::prelude::{MemoryRelayNetwork, RelayCoordinator, RelayEndpoint, Timing};

    fn relay() -> RelayEndpoint {
        "wss://relay0.test".parse().unwrap()
    }

    fn messenger(network: &MemoryRelayNetwork) -> Messenger<MemoryRelayNetwork> {
        let coordinator = RelayCoordinator::new(network.clone(), vec![relay()], Timing::default());
        Messenger::new(coordinator, "test-secret", 5)
    }

    #[tokio::test]
    async fn test_sending_survives_a_dead_listener() {
        let network = MemoryRelayNetwork::with_relays(&[relay()]);
        network.set_unreachable(&relay(), true);

        let session = messenger(&network).chat("room", "alice").await;
        // every subscription failed to connect
        assert!(session.next_message().await.is_none());

        network.set_unreachable(&relay(), false);
        let input = BufReader::new(&b"hello there\n"[..]).lines();
        let mut out = Vec::new();
        run_session(&session, input, false, &mut out).await.unwrap();
        session.close().await;

        assert_eq!(network.records(&relay()).len(), 1);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("--- Connected as [alice] ---"));
        assert!(printed.contains("] alice: hello there"));
    }

    #[tokio::test]
    async fn test_input_end_closes_session() {
        let network = MemoryRelayNetwork::with_relays(&[relay()]);
        let session = messenger(&network).chat("room", "bob").await;

        let input = BufReader::new(&b"\n\n"[..]).lines();
        let mut out = Vec::new();
        run_session(&session, input, false, &mut out).await.unwrap();
        session.close().await;

        assert!(network.records(&relay()).is_empty());
    }
}
