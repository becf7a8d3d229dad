pub mod http_layers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use http_layers::RequestsLoggingLevel;
pub use routes::run_server;
