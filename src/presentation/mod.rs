// Presentation layer - Chart output
pub mod tracing_renderer;
