// Application layer - Use cases and ports
pub mod live_dashboard;
pub mod renderer;
pub mod stream_manager;
pub mod telemetry_client;
pub mod telemetry_source;
