use clap::Args;

use common::prelude::Config;

use crate::state::AppState;

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Default chat display name
    #[arg(long)]
    pub username: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = Config {
            default_username: self.username.clone(),
            ..Config::default()
        }
        .normalized();

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let relays = state
            .config
            .relays
            .iter()
            .map(|relay| relay.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let output = format!(
            "Initialized pulse directory at: {}\n\
             - Config: {}\n\
             - Relays: {}\n\
             - History limit: {}",
            state.pulse_dir.display(),
            state.config_path.display(),
            relays,
            state.config.history_limit,
        );

        Ok(output)
    }
}
