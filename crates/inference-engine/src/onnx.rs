//! ONNX model execution through tract
//!
//! Expects a classifier graph with a single `[1, n]` float input whose
//! float output is the `[1, classes]` probability matrix. Exports from
//! scikit-learn must be converted with `zipmap=False`.

use crate::forest::ProbabilityModel;
use crate::InferenceError;
use std::path::Path;
use tracing::debug;
use tract_onnx::prelude::*;

type Plan = TypedRunnableModel<TypedModel>;

/// Optimized, runnable ONNX classifier
pub struct OnnxModel {
    plan: Plan,
    n_features: usize,
}

fn load_error(e: impl std::fmt::Display) -> InferenceError {
    InferenceError::ModelLoadError(e.to_string())
}

fn run_error(e: impl std::fmt::Display) -> InferenceError {
    InferenceError::InferenceFailed(e.to_string())
}

impl OnnxModel {
    pub fn load(path: &Path, n_features: usize) -> Result<Self, InferenceError> {
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(load_error)?
            .with_input_fact(0, f32::fact([1, n_features]).into())
            .map_err(load_error)?
            .into_optimized()
            .map_err(load_error)?
            .into_runnable()
            .map_err(load_error)?;
        debug!("ONNX model {} ready ({} inputs)", path.display(), n_features);
        Ok(Self { plan, n_features })
    }
}

impl ProbabilityModel for OnnxModel {
    fn predict_proba(&self, input: &[f64]) -> Result<Vec<f64>, InferenceError> {
        if input.len() != self.n_features {
            return Err(InferenceError::InvalidInputShape {
                expected: self.n_features,
                actual: input.len(),
            });
        }
        let data: Vec<f32> = input.iter().map(|x| *x as f32).collect();
        let tensor = Tensor::from_shape(&[1, self.n_features], &data).map_err(run_error)?;
        let outputs = self.plan.run(tvec!(tensor.into())).map_err(run_error)?;

        // the label output is integer typed; probabilities are the float one
        let probabilities = outputs
            .iter()
            .rev()
            .find(|t| t.datum_type() == f32::datum_type())
            .ok_or_else(|| run_error("model has no float output"))?;
        let view = probabilities.to_array_view::<f32>().map_err(run_error)?;
        Ok(view.iter().map(|p| *p as f64).collect())
    }
}
