pub mod service;

pub use service::{DetectError, DetectionService, DetectionSettings, ImageUpload};
