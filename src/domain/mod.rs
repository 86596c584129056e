// Domain layer - Core business models
pub mod chart;
pub mod metric;
pub mod sample;
pub mod scale;
pub mod tank;
pub mod time_range;
pub mod window;
