pub mod handler;
pub mod middleware;
pub mod path;
pub mod server;
