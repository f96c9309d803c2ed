use std::time::Instant;

use clap::Args;

use common::prelude::{Messenger, NostrRelayClient, SessionError};

use crate::cli::op::listen_timeout;
use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Listen {
    /// Conversation ID
    pub id: String,

    /// Seconds to wait for a message, 0 waits forever (defaults to config)
    #[arg(long, short)]
    pub timeout: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    #[error("failed to load config: {0}")]
    State(#[from] StateError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Listen {
    type Error = ListenError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let started = Instant::now();
        let config = ctx.config()?;
        let timeout = listen_timeout(self.timeout, &config);
        let messenger = Messenger::<NostrRelayClient>::from_config(&config);
        let tracker = ctx.tracker();

        match timeout {
            Some(timeout) => ctx.note(&format!(
                "Listening for a message ({}s timeout)...",
                timeout.as_secs()
            )),
            None => ctx.note("Listening for a message..."),
        }
        let result = messenger.listen(&self.id, timeout, &tracker).await;
        ctx.report(&tracker, started);

        Ok(result?.trim_end_matches('\n').to_string())
    }
}
