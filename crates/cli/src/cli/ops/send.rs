use std::time::Instant;

use clap::Args;

use common::prelude::SessionError;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct SendMessage {
    /// Conversation ID
    pub id: String,

    /// Message to encrypt and publish
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("failed to load config: {0}")]
    State(#[from] StateError),
    #[error("failure: {0}")]
    Session(#[from] SessionError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for SendMessage {
    type Error = SendError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let started = Instant::now();
        let messenger = ctx.messenger()?;
        let tracker = ctx.tracker();

        ctx.note("Sending message...");
        let report = messenger.send(&self.id, &self.message, &tracker).await?;
        ctx.report(&tracker, started);

        if !report.is_delivered() {
            tracing::warn!(
                "no relay accepted the message ({} attempted)",
                report.attempted
            );
        }

        Ok("Success".to_string())
    }
}
