use std::time::Instant;

use clap::Args;

use common::prelude::SessionError;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Get {
    /// Conversation ID
    pub id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GetError {
    #[error("failed to load config: {0}")]
    State(#[from] StateError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Get {
    type Error = GetError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let started = Instant::now();
        let messenger = ctx.messenger()?;
        let tracker = ctx.tracker();

        ctx.note("Retrieving message...");
        let result = messenger.retrieve(&self.id, &tracker).await;
        ctx.report(&tracker, started);

        Ok(result?.trim_end_matches('\n').to_string())
    }
}
