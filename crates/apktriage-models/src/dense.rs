//! Feed-forward network over a fixed-width numeric view
//!
//! Weights are stored in safetensors as `dense_{i}.weight` / `dense_{i}.bias`
//! for `input → hidden[0] → … → hidden[n-1] → 1`, ReLU between layers and a
//! sigmoid on the single output unit.

use crate::predictor::{InputKind, ModelInput, Predictor};
use apktriage_core::{Error, PredictionUnit, Result};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use std::path::Path;

pub struct SequenceNeuralModel {
    name: String,
    input_kind: InputKind,
    input_dim: usize,
    layers: Vec<Linear>,
    device: Device,
    threshold: f32,
}

impl SequenceNeuralModel {
    /// Load a network whose layer widths are `input_dim → hidden… → 1`
    pub fn load(
        name: &str,
        input_kind: InputKind,
        input_dim: usize,
        hidden: &[usize],
        weights_path: &Path,
        device: Device,
        threshold: f32,
    ) -> Result<Self> {
        if !weights_path.exists() {
            return Err(Error::artifact_load(
                name,
                format!("weights not found at {}", weights_path.display()),
            ));
        }

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device).map_err(
                |e| Error::artifact_load(name, format!("Failed to load weights: {}", e)),
            )?
        };

        Self::from_var_builder(name, input_kind, input_dim, hidden, vb, threshold)
    }

    pub fn from_var_builder(
        name: &str,
        input_kind: InputKind,
        input_dim: usize,
        hidden: &[usize],
        vb: VarBuilder<'_>,
        threshold: f32,
    ) -> Result<Self> {
        let mut dims = Vec::with_capacity(hidden.len() + 2);
        dims.push(input_dim);
        dims.extend_from_slice(hidden);
        dims.push(1);

        let layers = dims
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                candle_nn::linear(pair[0], pair[1], vb.pp(format!("dense_{}", i))).map_err(|e| {
                    Error::artifact_load(
                        name,
                        format!("layer dense_{} ({} → {}): {}", i, pair[0], pair[1], e),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(model = name, layers = layers.len(), input_dim, "Loaded dense network");

        Ok(Self {
            name: name.to_string(),
            input_kind,
            input_dim,
            layers,
            device: vb.device().clone(),
            threshold,
        })
    }

    fn forward(&self, features: &[f32]) -> candle_core::Result<f32> {
        let mut xs = Tensor::from_slice(features, (1, self.input_dim), &self.device)?;
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            xs = layer.forward(&xs)?;
            if i < last {
                xs = xs.relu()?;
            }
        }
        let logit = xs.flatten_all()?.to_vec1::<f32>()?;
        Ok(logit.first().copied().unwrap_or(0.0))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl Predictor for SequenceNeuralModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_kind(&self) -> InputKind {
        self.input_kind
    }

    fn predict(&self, input: &ModelInput<'_>) -> Result<PredictionUnit> {
        let features = input
            .features()
            .ok_or_else(|| Error::inference(&self.name, "dense network requires a numeric input"))?;

        if features.len() != self.input_dim {
            return Err(Error::inference(
                &self.name,
                format!("expected {} features, got {}", self.input_dim, features.len()),
            ));
        }

        let logit = self
            .forward(features)
            .map_err(|e| Error::inference(&self.name, format!("Forward pass failed: {}", e)))?;

        if !logit.is_finite() {
            return Err(Error::inference(&self.name, "network produced a non-finite output"));
        }

        Ok(PredictionUnit::from_probability(
            &self.name,
            sigmoid(logit),
            self.threshold,
        ))
    }
}
