use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};

use crate::error::ServiceError;
use crate::types::{ServiceCommand, ServiceState};

#[async_trait]
pub trait ServiceControl: Send + Sync {
    fn service_name(&self) -> &str;

    async fn query_state(&self) -> Result<ServiceState, ServiceError>;

    async fn issue(&self, command: ServiceCommand) -> Result<(), ServiceError>;

    /// Registered command line of the service executable.
    async fn binary_path(&self) -> Result<String, ServiceError>;

    /// Stop, give the service `settle` to wind down, then start it again.
    ///
    /// A failed stop is only logged since the service may already be
    /// stopped; the start result is returned.
    async fn restart(&self, settle: Duration) -> Result<(), ServiceError> {
        info!("Restarting service {}", self.service_name());
        if let Err(error) = self.issue(ServiceCommand::Stop).await {
            warn!("Stopping {} before restart failed: {error}", self.service_name());
        }
        tokio::time::sleep(settle).await;
        self.issue(ServiceCommand::Start).await
    }
}
