pub mod cmms;
pub mod connector;
pub mod gist;
pub mod health;
pub mod knowledge;
pub mod maintenance;
pub mod renderer;
pub mod shell;
pub mod telemetry;

pub use connector::{ConnectorError, ServiceConnector};
pub use health::Connectors;
