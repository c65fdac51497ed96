pub mod detection_aggregator;
pub mod detection_batch;
pub mod frame_pipeline;
pub mod pipeline_logger;
pub mod region_filter;
pub mod session_state;
