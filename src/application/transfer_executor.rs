//! Transfer use case: validate, resolve, redirect

use super::channel_resolver::ChannelResolver;
use crate::domain::{Result, TransferError, TransferRequest, TransferResult};
use crate::infrastructure::ami::{AmiAction, AmiError, ManagerClient};
use metrics::counter;
use std::sync::Arc;
use tracing::{error, info};

pub struct TransferExecutor {
    manager: Arc<dyn ManagerClient>,
    resolver: ChannelResolver,
}

impl TransferExecutor {
    pub fn new(manager: Arc<dyn ManagerClient>, resolver: ChannelResolver) -> Self {
        Self { manager, resolver }
    }

    pub async fn execute(&self, request: TransferRequest) -> Result<TransferResult> {
        let outcome = self.transfer(request).await;
        let label = match &outcome {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        counter!("transfers_total", "outcome" => label).increment(1);
        outcome
    }

    async fn transfer(&self, request: TransferRequest) -> Result<TransferResult> {
        let request = request.validate()?;
        info!(
            "Transfer requested: {} -> {}@{} priority {}",
            request.source, request.destination, request.context, request.priority
        );

        let resolved = self.resolver.resolve(&request.source).await?;

        let action = AmiAction::redirect(
            &resolved.channel,
            &request.context,
            &request.destination,
            request.priority,
        );

        match self.manager.send_action(action).await {
            Ok(_) => {}
            Err(AmiError::ActionError { message, .. }) => {
                error!("Redirect of {} rejected: {}", resolved.channel, message);
                return Err(TransferError::TransferFailed(message));
            }
            Err(e) => {
                error!("Redirect of {} failed: {}", resolved.channel, e);
                return Err(e.into());
            }
        }

        info!(
            "Transferred {} ({:?} leg of {}) to {}@{}",
            resolved.channel, resolved.leg, request.source, request.destination, request.context
        );

        Ok(TransferResult {
            channel: resolved.channel,
            leg: resolved.leg,
            source: request.source,
            destination: request.destination,
            context: request.context,
            priority: request.priority,
        })
    }
}
