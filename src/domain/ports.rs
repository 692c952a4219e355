use crate::domain::errors::SourceError;
use crate::domain::types::{AttributeMap, EngineEndpoint, ObjectIdentifier};
use async_trait::async_trait;

// Need async_trait for async functions in traits
/// Read access to one engine's management interface. Implementations are
/// handed out by a [`SourceConnector`]; dropping the source closes the
/// underlying connection.
#[async_trait]
pub trait AttributeSource: Send + Sync {
    /// List the identifiers of all managed objects matching a query pattern.
    async fn list_identifiers(
        &self,
        pattern: &str,
    ) -> Result<Vec<ObjectIdentifier>, SourceError>;

    /// Fetch the full attribute map of one managed object.
    async fn get_attributes(&self, id: &ObjectIdentifier) -> Result<AttributeMap, SourceError>;

    /// Invoke the no-argument stats-reset operation on one managed object.
    async fn invoke_reset(&self, id: &ObjectIdentifier) -> Result<(), SourceError>;
}

/// Opens attribute sources for engine endpoints. Which implementation
/// serves an endpoint is decided by the endpoint's identity fields.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &EngineEndpoint,
    ) -> Result<Box<dyn AttributeSource>, SourceError>;
}
