//! Model records and metadata decoding.
//!
//! Records are a closed tagged union, one variant per model family, selected
//! at decode time by the `model_type` field of the metadata document. An
//! unknown tag is a decode error, never a silently ignored case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tag the training job writes for ridge-regularized linear regression.
pub const RIDGE_LINEAR_TAG: &str = "Ridge (Linear)";
pub const FAMILY_LINEAR_REGRESSION: &str = "LinearRegression";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("metadata is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unrecognized model_type `{0}`")]
    UnknownModelType(String),
    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Fields shared by every model family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCommon {
    /// Training timestamp; together with the family it keys the cache.
    pub version: String,
    /// Artifact location the serving endpoint is pointed at on promotion.
    pub download_url: String,
    /// Human description of the predicted quantity.
    pub target: String,
    pub feature_names: Vec<String>,
    /// Stamped when the record is loaded, not part of the source metadata.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegressionModel {
    pub common: ModelCommon,
    /// Regularization strength used during training.
    pub alpha: f64,
    /// Cross-validation fold count; a confidence proxy for the metrics below.
    pub cross_val_splits: u32,
    /// Cross-validated root-mean-squared error, in target units (minutes).
    pub rmse_cv: f64,
    /// In-sample explained variance.
    pub r2: f64,
    /// Populated during an evaluation pass only; never compared across passes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelRecord {
    LinearRegression(LinearRegressionModel),
}

impl ModelRecord {
    pub fn family(&self) -> &'static str {
        match self {
            ModelRecord::LinearRegression(_) => FAMILY_LINEAR_REGRESSION,
        }
    }

    pub fn common(&self) -> &ModelCommon {
        match self {
            ModelRecord::LinearRegression(m) => &m.common,
        }
    }

    pub fn version(&self) -> &str {
        &self.common().version
    }

    pub fn download_url(&self) -> &str {
        &self.common().download_url
    }

    pub fn cache_key(&self) -> String {
        format!("{}-{}", self.family(), self.version())
    }

    pub fn computed_score(&self) -> Option<f64> {
        match self {
            ModelRecord::LinearRegression(m) => m.computed_score,
        }
    }
}

/// Wire shape of a linear-regression metadata document (snake_case keys as
/// emitted by the training job).
#[derive(Debug, Deserialize)]
struct LinearRegressionDoc {
    training_timestamp: String,
    target: String,
    #[serde(default)]
    feature_names: Vec<String>,
    alpha: f64,
    cross_val_splits: u32,
    rmse_cv: f64,
    r2: f64,
}

/// Decode a metadata document into a typed record.
///
/// `download_url` is resolved by the caller (suffix substitution on the
/// source URI) since the metadata itself does not carry it.
pub fn decode_model_metadata(raw: &[u8], download_url: String) -> Result<ModelRecord, MetadataError> {
    let value: serde_json::Value = serde_json::from_slice(raw)?;
    let model_type = value
        .get("model_type")
        .and_then(|v| v.as_str())
        .ok_or(MetadataError::MissingField("model_type"))?;
    match model_type {
        RIDGE_LINEAR_TAG => {
            let doc: LinearRegressionDoc = serde_json::from_value(value.clone())?;
            if doc.training_timestamp.is_empty() {
                return Err(MetadataError::MissingField("training_timestamp"));
            }
            if doc.rmse_cv < 0.0 {
                return Err(MetadataError::InvalidField {
                    field: "rmse_cv",
                    reason: format!("must be non-negative, got {}", doc.rmse_cv),
                });
            }
            Ok(ModelRecord::LinearRegression(LinearRegressionModel {
                common: ModelCommon {
                    version: doc.training_timestamp,
                    download_url,
                    target: doc.target,
                    feature_names: doc.feature_names,
                    created_at: Utc::now(),
                },
                alpha: doc.alpha,
                cross_val_splits: doc.cross_val_splits,
                rmse_cv: doc.rmse_cv,
                r2: doc.r2,
                computed_score: None,
            }))
        }
        other => Err(MetadataError::UnknownModelType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ridge_doc() -> serde_json::Value {
        serde_json::json!({
            "model_type": "Ridge (Linear)",
            "training_timestamp": "2024-05-02T08-30-00",
            "target": "minutes_until_dry",
            "feature_names": ["humidity", "temperature", "wind_speed"],
            "alpha": 0.5,
            "cross_val_splits": 5,
            "rmse_cv": 43.93,
            "r2": 0.85
        })
    }

    #[test]
    fn decodes_ridge_linear() {
        let raw = serde_json::to_vec(&ridge_doc()).unwrap();
        let rec = decode_model_metadata(&raw, "https://store/models/m.onnx".into()).unwrap();
        assert_eq!(rec.family(), FAMILY_LINEAR_REGRESSION);
        assert_eq!(rec.version(), "2024-05-02T08-30-00");
        assert_eq!(rec.cache_key(), "LinearRegression-2024-05-02T08-30-00");
        assert_eq!(rec.download_url(), "https://store/models/m.onnx");
        let ModelRecord::LinearRegression(m) = rec;
        assert_eq!(m.cross_val_splits, 5);
        assert!(m.computed_score.is_none());
        assert_eq!(m.common.feature_names.len(), 3);
    }

    #[test]
    fn unknown_model_type_rejected() {
        let mut doc = ridge_doc();
        doc["model_type"] = "GradientBoosting".into();
        let raw = serde_json::to_vec(&doc).unwrap();
        let err = decode_model_metadata(&raw, String::new()).unwrap_err();
        assert!(matches!(err, MetadataError::UnknownModelType(t) if t == "GradientBoosting"));
    }

    #[test]
    fn missing_model_type_rejected() {
        let mut doc = ridge_doc();
        doc.as_object_mut().unwrap().remove("model_type");
        let raw = serde_json::to_vec(&doc).unwrap();
        let err = decode_model_metadata(&raw, String::new()).unwrap_err();
        assert!(matches!(err, MetadataError::MissingField("model_type")));
    }

    #[test]
    fn malformed_json_rejected() {
        let err = decode_model_metadata(b"{not json", String::new()).unwrap_err();
        assert!(matches!(err, MetadataError::Parse(_)));
    }

    #[test]
    fn negative_rmse_rejected() {
        let mut doc = ridge_doc();
        doc["rmse_cv"] = (-1.0).into();
        let raw = serde_json::to_vec(&doc).unwrap();
        let err = decode_model_metadata(&raw, String::new()).unwrap_err();
        assert!(matches!(err, MetadataError::InvalidField { field: "rmse_cv", .. }));
    }
}
