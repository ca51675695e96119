pub mod codec;
pub mod config;
pub mod context;
pub mod dataset;
pub mod model;
pub mod pipeline;
pub mod schema;
pub mod util;
