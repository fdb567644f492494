use leafscan_shared::{ClassificationResult, Label};
use ndarray::Array4;
use std::path::Path;
use std::sync::Arc;

use super::config::{OutputActivation, PreprocessingConfig};
use super::preprocess::preprocess;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("Model inference error: {0}")]
    Inference(String),
}

pub trait LeafClassifier: Send + Sync {
    fn classify(&self, image: &[u8]) -> Result<ClassificationResult, ClassifierError>;
}

pub trait InferenceBackend: Send + Sync {
    fn forward(&self, input: Array4<f32>) -> Result<Vec<f32>, ClassifierError>;
}

pub struct Model<B> {
    backend: B,
    preprocessing: PreprocessingConfig,
}

impl<B: InferenceBackend> Model<B> {
    pub fn new(backend: B, preprocessing: PreprocessingConfig) -> Self {
        Self {
            backend,
            preprocessing,
        }
    }

    pub fn inference(&self, image: &[u8]) -> Result<Vec<f32>, ClassifierError> {
        let tensor = preprocess(image, &self.preprocessing)?;
        self.backend.forward(tensor)
    }
}

impl<B: InferenceBackend> LeafClassifier for Model<B> {
    fn classify(&self, image: &[u8]) -> Result<ClassificationResult, ClassifierError> {
        let scores = self.inference(image)?;
        calculate_result(&scores, self.preprocessing.output.activation)
    }
}

pub fn calculate_result(
    scores: &[f32],
    activation: OutputActivation,
) -> Result<ClassificationResult, ClassifierError> {
    if scores.len() != Label::count() {
        return Err(ClassifierError::Inference(format!(
            "model produced {} scores for {} labels",
            scores.len(),
            Label::count()
        )));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(ClassifierError::Inference(
            "model produced non-finite scores".to_string(),
        ));
    }

    let probabilities = match activation {
        OutputActivation::Probabilities => scores.to_vec(),
        OutputActivation::Logits => softmax(scores),
    };

    let (index, probability) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });

    let label = Label::from_index(index).ok_or_else(|| {
        ClassifierError::Inference(format!("no label for output index {index}"))
    })?;

    Ok(ClassificationResult {
        label,
        confidence: (probability * 100.0).clamp(0.0, 100.0),
    })
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::MIN, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Load the model artifact with whichever backend this binary was built with.
pub fn load_classifier(
    model_path: &Path,
    preprocessing: PreprocessingConfig,
) -> Result<Arc<dyn LeafClassifier>, ClassifierError> {
    if !model_path.exists() {
        return Err(ClassifierError::ModelUnavailable(format!(
            "model artifact {} does not exist",
            model_path.display()
        )));
    }
    load_backend(model_path, preprocessing)
}

#[cfg(feature = "onnx")]
fn load_backend(
    model_path: &Path,
    preprocessing: PreprocessingConfig,
) -> Result<Arc<dyn LeafClassifier>, ClassifierError> {
    let backend = super::onnx::OnnxBackend::load(model_path)?;
    Ok(Arc::new(Model::new(backend, preprocessing)))
}

#[cfg(all(feature = "torch", not(feature = "onnx")))]
fn load_backend(
    model_path: &Path,
    preprocessing: PreprocessingConfig,
) -> Result<Arc<dyn LeafClassifier>, ClassifierError> {
    let backend = super::torch::TorchBackend::load(model_path)?;
    Ok(Arc::new(Model::new(backend, preprocessing)))
}

#[cfg(not(any(feature = "onnx", feature = "torch")))]
fn load_backend(
    _model_path: &Path,
    _preprocessing: PreprocessingConfig,
) -> Result<Arc<dyn LeafClassifier>, ClassifierError> {
    Err(ClassifierError::ModelUnavailable(
        "built without an inference backend; enable the `onnx` or `torch` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{png_bytes, FixedScores};

    #[test]
    fn probabilities_pick_the_maximum() {
        let result = calculate_result(
            &[0.01, 0.02, 0.02, 0.923, 0.015, 0.012],
            OutputActivation::Probabilities,
        )
        .unwrap();
        assert_eq!(result.label, Label::RiceBlast);
        assert!((result.confidence - 92.3).abs() < 1e-3);
    }

    #[test]
    fn logits_are_softmaxed() {
        let result =
            calculate_result(&[0.0, 0.0, 0.0, 0.0, 0.0, 5.0], OutputActivation::Logits).unwrap();
        assert_eq!(result.label, Label::NotRiceLeaf);
        let expected = 100.0 * 5f32.exp() / (5.0 + 5f32.exp());
        assert!((result.confidence - expected).abs() < 1e-3);
    }

    #[test]
    fn wrong_output_width_is_rejected() {
        let err = calculate_result(&[0.5, 0.5], OutputActivation::Probabilities).unwrap_err();
        assert!(matches!(err, ClassifierError::Inference(_)));

        let err = calculate_result(&[f32::NAN; 6], OutputActivation::Logits).unwrap_err();
        assert!(matches!(err, ClassifierError::Inference(_)));
    }

    #[test]
    fn every_label_is_reachable_with_bounded_confidence() {
        for index in 0..Label::count() {
            let expected = Label::from_index(index).unwrap();
            let mut logits = vec![-3.0; Label::count()];
            logits[index] = 40.0;
            let model = Model::new(
                FixedScores(logits),
                PreprocessingConfig {
                    output: crate::inference::config::OutputConfig {
                        activation: OutputActivation::Logits,
                    },
                    ..PreprocessingConfig::default()
                },
            );
            let result = model.classify(&png_bytes(16, 16, [10, 200, 30])).unwrap();
            assert_eq!(result.label, expected);
            assert!((0.0..=100.0).contains(&result.confidence));
        }
    }

    #[test]
    fn corrupt_image_never_reaches_the_backend() {
        let model = Model::new(FixedScores(vec![]), PreprocessingConfig::default());
        let err = model.classify(b"\x89PNG broken").unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidImage(_)));
    }

    #[test]
    fn missing_artifact_is_model_unavailable() {
        let err = load_classifier(
            Path::new("/nonexistent/rice_model.onnx"),
            PreprocessingConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ClassifierError::ModelUnavailable(_)));
    }

    #[cfg(not(any(feature = "onnx", feature = "torch")))]
    #[test]
    fn build_without_backend_names_the_feature() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("rice_model.onnx");
        std::fs::write(&model_path, b"not a model").unwrap();

        let err = load_classifier(&model_path, PreprocessingConfig::default())
            .err()
            .unwrap();
        match err {
            ClassifierError::ModelUnavailable(message) => assert!(message.contains("onnx")),
            other => panic!("unexpected error: {}", other),
        }
    }
}
