pub mod base_logger;
pub mod metrics;
pub mod model_free;
