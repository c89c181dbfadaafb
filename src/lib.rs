//! Scheduled health checks for HTTP, TCP, UDP, SQL and SSH services,
//! configured in one of two text dialects and published over HTTP,
//! websocket and Prometheus.

pub mod checkers;
pub mod models;
pub mod parsers;
pub mod server;
pub mod version;
pub mod web;
