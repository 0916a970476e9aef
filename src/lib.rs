pub mod config;
pub mod dataset;
pub mod descriptor;
pub mod emitter;
pub mod error;
pub mod feature;
pub mod filter;
pub mod frame;
pub mod image;
pub mod my_types;
pub mod optical_flow;
pub mod pipeline;
pub mod pyramid;
pub mod sampler;
pub mod tracker;
pub mod trajectory;
#[cfg(feature = "opencv")]
pub mod video;
pub mod visualization;
