pub mod bounded_call;
pub mod constants;
pub mod frame;
pub mod model_resolver;
pub mod region;
