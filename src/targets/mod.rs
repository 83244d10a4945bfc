//! Database connector implementations
//!
//! The executor only sees the [`Connector`] and [`Session`] traits; the PostgreSQL
//! wire protocol lives in [`PostgresConnector`].

mod postgres;
mod target;

pub use postgres::PostgresConnector;
pub use target::{Connector, Session};

/// Type alias for connector trait object
pub type ConnectorInstance = Box<dyn Connector>;
