pub mod artifact;
pub mod config;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod preprocess;
#[cfg(feature = "torch")]
pub mod torch;
