//! HTTP server and middleware.

pub mod middleware;
pub mod server;

pub use server::HttpServer;
