//! BERT sequence classifier over raw log text
//!
//! A checkpoint is a HuggingFace `BertForSequenceClassification` export:
//! `config.json`, `model.safetensors`, and either `tokenizer.json` or
//! `vocab.txt`. The pooler and the `classifier` head must both be present;
//! a checkpoint without them is a different model and fails to load.
//!
//! Logs are truncated by the tokenizer itself, so a long logcat becomes
//! `[CLS]` + the first `max_length - 2` tokens + `[SEP]`, the same shape the
//! classifier was fine-tuned on.

use crate::predictor::{InputKind, ModelInput, Predictor};
use apktriage_core::{Error, PredictionUnit, Result};
use candle_core::{DType, Device, IndexOp, Tensor, D};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokenizers::{Tokenizer, TruncationParams};

pub struct TransformerSequenceModel {
    name: String,
    tokenizer: Tokenizer,
    encoder: BertModel,
    head: ClassificationHead,
    device: Device,
    threshold: f32,
}

impl TransformerSequenceModel {
    pub fn load(
        name: &str,
        model_dir: &Path,
        device: Device,
        num_labels: usize,
        max_length: usize,
        threshold: f32,
    ) -> Result<Self> {
        if num_labels != 2 {
            return Err(Error::artifact_load(
                name,
                format!("expected a binary classifier, got num_labels = {}", num_labels),
            ));
        }

        let files = CheckpointFiles::locate(name, model_dir)?;
        let (bert_config, positions) = read_encoder_config(name, &files.config)?;
        if max_length < 3 || max_length > positions {
            return Err(Error::artifact_load(
                name,
                format!(
                    "max_length {} must be between 3 and the encoder's {} positions",
                    max_length, positions
                ),
            ));
        }

        let tokenizer = log_tokenizer(name, &files.tokenizer, max_length)?;

        // mmap of a file we just located; candle requires the unsafe block
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights], DType::F32, &device)
                .map_err(|e| Error::artifact_load(name, format!("Failed to map weights: {}", e)))?
        };

        let (encoder, encoder_root) = load_encoder(name, &vb, &bert_config)?;
        let head = ClassificationHead::load(name, &vb, &encoder_root, bert_config.hidden_size, num_labels)?;

        tracing::info!(
            model = name,
            hidden_size = bert_config.hidden_size,
            max_length,
            "Loaded BERT log classifier"
        );

        Ok(Self {
            name: name.to_string(),
            tokenizer,
            encoder,
            head,
            device,
            threshold,
        })
    }

    /// Class probabilities for one log
    fn probabilities(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::inference(&self.name, format!("Tokenization failed: {}", e)))?;
        if encoding.get_ids().is_empty() {
            return Err(Error::inference(&self.name, "tokenizer produced no tokens"));
        }

        let row = |values: &[u32]| Tensor::new(values, &self.device).and_then(|t| t.unsqueeze(0));
        let tensor_err = |what: &str, e: candle_core::Error| {
            Error::inference(&self.name, format!("{}: {}", what, e))
        };

        let input_ids = row(encoding.get_ids()).map_err(|e| tensor_err("Input ids", e))?;
        let token_type_ids =
            row(encoding.get_type_ids()).map_err(|e| tensor_err("Token type ids", e))?;
        let attention_mask =
            row(encoding.get_attention_mask()).map_err(|e| tensor_err("Attention mask", e))?;

        let hidden_states = self
            .encoder
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| tensor_err("Encoder forward pass failed", e))?;

        let cls = hidden_states
            .i((.., 0, ..))
            .map_err(|e| tensor_err("Failed to select [CLS] state", e))?;

        self.head
            .forward(&cls)
            .and_then(|logits| candle_nn::ops::softmax(&logits, D::Minus1))
            .and_then(|p| p.squeeze(0))
            .and_then(|p| p.to_vec1::<f32>())
            .map_err(|e| tensor_err("Classification head failed", e))
    }
}

impl Predictor for TransformerSequenceModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_kind(&self) -> InputKind {
        InputKind::LogText
    }

    fn predict(&self, input: &ModelInput<'_>) -> Result<PredictionUnit> {
        let text = input
            .text()
            .ok_or_else(|| Error::inference(&self.name, "BERT model requires log text input"))?;

        let probs = self.probabilities(text)?;
        Ok(binary_prediction(&self.name, &probs, self.threshold))
    }
}

/// Label from a two-class probability vector: malicious when P(1) is
/// strictly above the threshold
pub(crate) fn binary_prediction(name: &str, probs: &[f32], threshold: f32) -> PredictionUnit {
    let malicious_p = probs.get(1).copied().unwrap_or(0.0);
    PredictionUnit::from_probability(name, malicious_p, threshold)
}

enum TokenizerSource {
    Json(PathBuf),
    Vocab(PathBuf),
}

/// The files of a checkpoint directory, all checked to exist
struct CheckpointFiles {
    config: PathBuf,
    weights: PathBuf,
    tokenizer: TokenizerSource,
}

impl CheckpointFiles {
    /// Reports every missing file at once
    fn locate(name: &str, dir: &Path) -> Result<Self> {
        let config = dir.join("config.json");
        let weights = dir.join("model.safetensors");
        let tokenizer_json = dir.join("tokenizer.json");
        let vocab = dir.join("vocab.txt");

        let tokenizer = if tokenizer_json.is_file() {
            Some(TokenizerSource::Json(tokenizer_json))
        } else if vocab.is_file() {
            Some(TokenizerSource::Vocab(vocab))
        } else {
            None
        };

        let mut missing = Vec::new();
        if !config.is_file() {
            missing.push("config.json");
        }
        if !weights.is_file() {
            missing.push("model.safetensors");
        }
        if tokenizer.is_none() {
            missing.push("tokenizer.json or vocab.txt");
        }

        match tokenizer {
            Some(tokenizer) if missing.is_empty() => Ok(Self {
                config,
                weights,
                tokenizer,
            }),
            _ => Err(Error::artifact_load(
                name,
                format!(
                    "checkpoint {} is missing {}",
                    dir.display(),
                    missing.join(", ")
                ),
            )),
        }
    }
}

#[derive(Deserialize)]
struct PositionLimit {
    max_position_embeddings: usize,
}

/// Encoder config plus the number of positions it can embed
fn read_encoder_config(name: &str, path: &Path) -> Result<(BertConfig, usize)> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::artifact_load(name, format!("Failed to read config.json: {}", e)))?;
    let parse_err = |e: serde_json::Error| {
        Error::artifact_load(name, format!("Failed to parse config.json: {}", e))
    };

    let config: BertConfig = serde_json::from_str(&raw).map_err(parse_err)?;
    let limit: PositionLimit = serde_json::from_str(&raw).map_err(parse_err)?;
    Ok((config, limit.max_position_embeddings))
}

/// Tokenizer for log text, truncating to `max_length` including `[CLS]` and `[SEP]`
fn log_tokenizer(name: &str, source: &TokenizerSource, max_length: usize) -> Result<Tokenizer> {
    let mut tokenizer = match source {
        TokenizerSource::Json(path) => Tokenizer::from_file(path).map_err(|e| {
            Error::artifact_load(name, format!("Failed to load tokenizer.json: {}", e))
        })?,
        TokenizerSource::Vocab(path) => wordpiece_tokenizer(name, path)?,
    };

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| Error::artifact_load(name, format!("Invalid truncation: {}", e)))?;

    Ok(tokenizer)
}

/// Uncased BERT tokenizer built from a bare `vocab.txt`
fn wordpiece_tokenizer(name: &str, vocab: &Path) -> Result<Tokenizer> {
    use tokenizers::models::wordpiece::WordPiece;
    use tokenizers::normalizers::BertNormalizer;
    use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
    use tokenizers::processors::bert::BertProcessing;
    use tokenizers::Model;

    let wordpiece = WordPiece::from_file(vocab.to_string_lossy().as_ref())
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| Error::artifact_load(name, format!("Failed to read vocab.txt: {}", e)))?;

    let special = |token: &str| {
        wordpiece
            .token_to_id(token)
            .map(|id| (token.to_string(), id))
            .ok_or_else(|| Error::artifact_load(name, format!("vocab.txt has no {} token", token)))
    };
    let cls = special("[CLS]")?;
    let sep = special("[SEP]")?;

    let mut tokenizer = Tokenizer::new(wordpiece);
    tokenizer.with_normalizer(Some(BertNormalizer::default()));
    tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));
    tokenizer.with_post_processor(Some(BertProcessing::new(sep, cls)));
    Ok(tokenizer)
}

/// Encoder weights live under `bert.` in a sequence-classification export,
/// or at the root of a bare encoder checkpoint. Returns the root they were
/// found under.
fn load_encoder(
    name: &str,
    vb: &VarBuilder<'static>,
    config: &BertConfig,
) -> Result<(BertModel, VarBuilder<'static>)> {
    let mut attempts = Vec::new();

    for (label, root) in [("bert", vb.pp("bert")), ("<root>", vb.clone())] {
        match BertModel::load(root.clone(), config) {
            Ok(encoder) => {
                tracing::debug!(model = name, root = label, "Loaded BERT encoder");
                return Ok((encoder, root));
            }
            Err(e) => attempts.push(format!("{}: {}", label, e)),
        }
    }

    Err(Error::artifact_load(
        name,
        format!("no BERT encoder weights found ({})", attempts.join(" | ")),
    ))
}

/// `tanh(pooler([CLS]))` followed by the linear classifier
struct ClassificationHead {
    pooler: Linear,
    classifier: Linear,
}

impl ClassificationHead {
    fn load(
        name: &str,
        vb: &VarBuilder<'static>,
        encoder_root: &VarBuilder<'static>,
        hidden_size: usize,
        num_labels: usize,
    ) -> Result<Self> {
        let pooler = candle_nn::linear(hidden_size, hidden_size, encoder_root.pp("pooler.dense"))
            .map_err(|e| {
                Error::artifact_load(name, format!("pooler weights missing or malformed: {}", e))
            })?;

        let classifier = candle_nn::linear(hidden_size, num_labels, vb.pp("classifier"))
            .map_err(|e| {
                Error::artifact_load(
                    name,
                    format!(
                        "classifier head missing or malformed (hidden_size={}, num_labels={}): {}",
                        hidden_size, num_labels, e
                    ),
                )
            })?;

        Ok(Self { pooler, classifier })
    }

    fn forward(&self, cls: &Tensor) -> candle_core::Result<Tensor> {
        let pooled = self.pooler.forward(cls)?.tanh()?;
        self.classifier.forward(&pooled)
    }
}
