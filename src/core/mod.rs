pub mod config;
pub mod gateway;
pub mod lifecycle;
pub mod poller;
pub mod telemetry;
pub mod terminal;
