use crate::descriptor::ConnectParams;
use crate::error::DriverError;

/// Opens authenticated sessions against a database server
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Connect and authenticate; success means the credentials were accepted
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Session>, DriverError>;

    /// Get the connector type name for display purposes
    fn connector_type(&self) -> &'static str;
}

/// One open, authenticated session
#[async_trait::async_trait]
pub trait Session: Send {
    /// Run `statement` inside a transaction and commit it.
    ///
    /// Nothing is applied unless the commit succeeds; an error at any step leaves
    /// the server unchanged.
    async fn execute_in_transaction(&mut self, statement: &str) -> Result<(), DriverError>;

    /// Close the session. Dropping a session must release it as well.
    async fn close(self: Box<Self>);
}
