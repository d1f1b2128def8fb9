pub mod env;
pub mod github;
pub mod telemetry;
