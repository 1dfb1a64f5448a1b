//! LLM audit seam and the Gemini-backed implementation.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use crate::types::{L2Reasoning, OutlierSample};

#[async_trait]
pub trait AuditService: Send + Sync {
    /// Judge a dataset version from drift statistics and its most-outlying
    /// image/caption pairs. May fail or time out; the reconciler owns the
    /// fallback behavior.
    async fn audit(
        &self,
        drift_stats: &HashMap<String, f64>,
        images: &[String],
        captions: &[String],
        outlier_context: &[OutlierSample],
    ) -> anyhow::Result<L2Reasoning>;

    fn model_name(&self) -> &str;
}

pub struct GeminiAudit {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

const SYSTEM_PROMPT: &str = "You are a VLM dataset auditor. Review image-text samples and \
drift statistics, then decide the alignment status. The samples provided are the \
statistically most-outlying cohort; assess whether these outliers also indicate semantic \
misalignment. Return strict JSON with fields: model_name, distribution_drift, \
reasoning_trace {summary, key_observations, decision_rationale, recommended_action}, \
judgment_summary, flagged_samples, confidence_score (0..1), l2_status (PASS|WARN|BLOCK).";

impl GeminiAudit {
    pub fn new(api_key: Option<String>, model: String, base_url: String) -> Self {
        Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AuditService for GeminiAudit {
    async fn audit(
        &self,
        drift_stats: &HashMap<String, f64>,
        images: &[String],
        captions: &[String],
        outlier_context: &[OutlierSample],
    ) -> anyhow::Result<L2Reasoning> {
        let key = self.api_key.as_ref().context("GEMINI_API_KEY is not set")?;

        let pairs: Vec<(&String, &String)> = images.iter().zip(captions.iter()).collect();
        let user_content = format!(
            "[Drift Stats]: {}\n[Samples]: {}\n[Outlier Context]: {}",
            json!(drift_stats),
            json!(pairs),
            json!(outlier_context),
        );

        let body = json!({
            "system_instruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
            "contents": [{ "role": "user", "parts": [{ "text": user_content }] }],
            "generationConfig": { "response_mime_type": "application/json" },
        });

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, key
        );
        let resp = self.client.post(url).json(&body).send().await?.error_for_status()?;
        let json: serde_json::Value = resp.json().await?;

        let text = json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .context("audit response carried no text part")?;

        let mut reasoning: L2Reasoning =
            serde_json::from_str(text).context("audit response did not match L2Reasoning")?;
        if reasoning.model_name.is_empty() {
            reasoning.model_name = self.model.clone();
        }
        Ok(reasoning)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
