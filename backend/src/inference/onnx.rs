use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use super::model::{ClassifierError, InferenceBackend};

pub struct OnnxBackend {
    session: Mutex<Session>,
}

impl OnnxBackend {
    pub fn load(model_path: &Path) -> Result<Self, ClassifierError> {
        let session = Session::builder()
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(|e| ClassifierError::ModelUnavailable(e.to_string()))?;
        log::info!("Loaded ONNX model {}", model_path.display());
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl InferenceBackend for OnnxBackend {
    fn forward(&self, input: Array4<f32>) -> Result<Vec<f32>, ClassifierError> {
        let dims = input.shape();
        let shape = [dims[0] as i64, dims[1] as i64, dims[2] as i64, dims[3] as i64];
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_array((shape, data.into_boxed_slice()))
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        Ok(scores.to_vec())
    }
}
