// Plantomio telemetry client - live sensor charts fed by polling and server push
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod presentation;
