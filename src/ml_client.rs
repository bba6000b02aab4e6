//! ML advisory client adapter (§4.12): algorithm selection, waste/time
//! prediction, and outcome feedback, each behind its own circuit breaker.
//!
//! Uses `reqwest` for the transport, wrapped by [`crate::circuit_breaker`].
//! Fallback construction follows the same fail-closed-to-a-safe-default
//! shape used elsewhere for missing upstream signals: here, no ML signal ⇒
//! a conservative default and the engine proceeds.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::circuit_breaker::{BreakerConfig, CircuitBreaker};
use crate::model::Algorithm;

#[derive(Clone, Debug, Serialize)]
pub struct JobFeatures {
    pub piece_count: u32,
    pub area_variance: f64,
    pub aspect_ratio_mean: f64,
    pub stock_count: u32,
    pub historical_avg_waste_pct: f64,
    pub is_1d: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AlgorithmSuggestion {
    pub name: String,
    pub confidence: f64,
    pub scores: std::collections::HashMap<String, f64>,
    pub model_version: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WastePrediction {
    pub predicted_waste_pct: f64,
    pub model_version: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TimePrediction {
    pub predicted_time_seconds: f64,
    pub model_version: String,
}

pub const FALLBACK_MODEL_VERSION: &str = "fallback";
/// Confidence below which a suggestion is treated as unusable and replaced
/// by the deterministic default (§4.12: "low confidence" is one of the
/// non-success conditions the engine never blocks on).
const MIN_CONFIDENCE: f64 = 0.5;

/// Three independent breakers, one per ML operation, so a slow/failing
/// `predictTime` endpoint cannot trip `selectAlgorithm`'s breaker and vice
/// versa.
pub struct MlAdvisoryClient {
    http: reqwest::Client,
    base_url: String,
    select_breaker: CircuitBreaker,
    waste_breaker: CircuitBreaker,
    time_breaker: CircuitBreaker,
}

impl MlAdvisoryClient {
    pub fn new(base_url: String, config: BreakerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            select_breaker: CircuitBreaker::new("ml.select_algorithm", config.clone()),
            waste_breaker: CircuitBreaker::new("ml.predict_waste", config.clone()),
            time_breaker: CircuitBreaker::new("ml.predict_time", config),
        }
    }

    /// Never fails: any timeout, breaker-open, malformed response, or
    /// low-confidence result is converted to the fallback default.
    pub async fn select_algorithm(&self, features: &JobFeatures, is_1d: bool) -> AlgorithmSuggestion {
        let fallback_name = if is_1d { "1D_FFD" } else { "2D_GUILLOTINE" };
        let url = format!("{}/select-algorithm", self.base_url);
        let http = self.http.clone();
        let body = features.clone();

        let suggestion = self
            .select_breaker
            .call(
                move || async move {
                    let resp = http
                        .post(&url)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| e.to_string())?;
                    resp.json::<AlgorithmSuggestion>()
                        .await
                        .map_err(|e| e.to_string())
                },
                || fallback_algorithm_suggestion(fallback_name),
            )
            .await;

        if suggestion.confidence < MIN_CONFIDENCE || Algorithm::parse(&suggestion.name).is_none() {
            return fallback_algorithm_suggestion(fallback_name);
        }

        suggestion
    }

    pub async fn predict_waste(&self, features: &JobFeatures) -> WastePrediction {
        let url = format!("{}/predict-waste", self.base_url);
        let http = self.http.clone();
        let body = features.clone();

        self.waste_breaker
            .call(
                move || async move {
                    let resp = http
                        .post(&url)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| e.to_string())?;
                    resp.json::<WastePrediction>().await.map_err(|e| e.to_string())
                },
                || WastePrediction {
                    predicted_waste_pct: features.historical_avg_waste_pct,
                    model_version: FALLBACK_MODEL_VERSION.to_string(),
                },
            )
            .await
    }

    pub async fn predict_time(&self, features: &JobFeatures) -> TimePrediction {
        let url = format!("{}/predict-time", self.base_url);
        let http = self.http.clone();
        let body = features.clone();
        let piece_count = features.piece_count;

        self.time_breaker
            .call(
                move || async move {
                    let resp = http
                        .post(&url)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| e.to_string())?;
                    resp.json::<TimePrediction>().await.map_err(|e| e.to_string())
                },
                move || TimePrediction {
                    // Conservative default: a few ms per piece, never zero.
                    predicted_time_seconds: (piece_count as f64 * 0.01).max(0.1),
                    model_version: FALLBACK_MODEL_VERSION.to_string(),
                },
            )
            .await
    }

    /// Fire-and-forget (§4.12): errors are logged and swallowed, never
    /// propagated to the caller.
    pub async fn record_outcome(
        &self,
        prediction_id: Uuid,
        actual_waste_pct: f64,
        actual_time_seconds: f64,
    ) {
        let url = format!("{}/outcomes", self.base_url);
        let payload = serde_json::json!({
            "predictionId": prediction_id,
            "actualWaste": actual_waste_pct,
            "actualTimeSeconds": actual_time_seconds,
        });

        if let Err(e) = self.http.post(&url).json(&payload).send().await {
            tracing::warn!(error = %e, prediction_id = %prediction_id, "recordOutcome failed, swallowing");
        }
    }
}

fn fallback_algorithm_suggestion(name: &str) -> AlgorithmSuggestion {
    AlgorithmSuggestion {
        name: name.to_string(),
        confidence: 1.0,
        scores: std::collections::HashMap::new(),
        model_version: FALLBACK_MODEL_VERSION.to_string(),
    }
}

/// Computes a job's ML feature vector from the expanded pieces and available
/// stock (§4.12).
pub fn build_features(
    piece_lengths_or_areas: &[f64],
    stock_count: u32,
    historical_avg_waste_pct: f64,
    is_1d: bool,
) -> JobFeatures {
    let piece_count = piece_lengths_or_areas.len() as u32;
    let mean = if piece_count > 0 {
        piece_lengths_or_areas.iter().sum::<f64>() / piece_count as f64
    } else {
        0.0
    };
    let area_variance = if piece_count > 0 {
        piece_lengths_or_areas
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / piece_count as f64
    } else {
        0.0
    };

    JobFeatures {
        piece_count,
        area_variance,
        aspect_ratio_mean: 1.0,
        stock_count,
        historical_avg_waste_pct,
        is_1d,
    }
}
