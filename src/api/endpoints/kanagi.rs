//! Kanagi reasoning endpoints.
//!
//! - `POST /api/kanagi/reason`: one provisional observation for the input
//! - `POST /api/judge`: the same, plus the plan passes run over the
//!   observation as a verdict
//!
//! Neither endpoint concludes. Every response carries `provisional: true`.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::extract::Ruleset;
use crate::pipeline::plan::passes::{run_passes, PassContext};
use crate::pipeline::plan::Stage;
use crate::pipeline::reasoner::{KanagiTrace, Observation, Spiral};
use crate::pipeline::sanitize::{sanitize_input, MAX_INPUT_CHARS};

const INPUT_REQUIRED_CODE: &str = "KANAGI_INPUT_REQUIRED";
const INPUT_REQUIRED_MESSAGE: &str = "入力が空です。思考を旋回させるには入力が必要です。";

#[derive(Deserialize)]
pub struct KanagiBody {
    #[serde(default)]
    pub input: String,
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
    /// Optional conversation dump or free text the ruleset is built from.
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Serialize)]
pub struct Verdict {
    pub center_claim: String,
    pub warnings: Vec<String>,
    pub chain_order: Vec<Stage>,
}

#[derive(Serialize)]
pub struct KanagiResponse {
    pub session_id: String,
    /// Breath markers that fired.
    pub tai: Vec<String>,
    /// The input as received.
    pub you: Vec<String>,
    pub observation: Observation,
    pub spiral: Spiral,
    pub trace: KanagiTrace,
    pub provisional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
}

/// `POST /api/kanagi/reason`
pub async fn reason(
    State(ctx): State<ApiContext>,
    Json(body): Json<KanagiBody>,
) -> Result<Json<KanagiResponse>, ApiError> {
    let (session_id, trace) = run_reasoner(&ctx, body)?;
    Ok(Json(into_response(session_id, trace, None)))
}

/// `POST /api/judge`
pub async fn judge(
    State(ctx): State<ApiContext>,
    Json(body): Json<KanagiBody>,
) -> Result<Json<KanagiResponse>, ApiError> {
    let (session_id, trace) = run_reasoner(&ctx, body)?;
    let plan = run_passes(trace.to_plan(), &PassContext::default());
    let verdict = Verdict {
        center_claim: plan.center_claim,
        warnings: plan.warnings,
        chain_order: plan.chain_order,
    };
    Ok(Json(into_response(session_id, trace, Some(verdict))))
}

fn run_reasoner(ctx: &ApiContext, body: KanagiBody) -> Result<(String, KanagiTrace), ApiError> {
    let input = sanitize_input(&body.input, MAX_INPUT_CHARS).map_err(|_| ApiError::Rejected {
        code: INPUT_REQUIRED_CODE,
        message: INPUT_REQUIRED_MESSAGE.into(),
    })?;

    let session_id = body
        .session_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("kanagi_{}", chrono::Utc::now().timestamp_millis()));

    let ruleset = body
        .context
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(|c| Ruleset::from_dump(c, "request"))
        .unwrap_or_default();

    let trace = ctx.core.reasoner().reason(&input.text, &session_id, &ruleset);
    tracing::debug!(
        session_id = %session_id,
        depth = trace.spiral.depth,
        iki = %trace.iki.state,
        "Kanagi observation"
    );
    Ok((session_id, trace))
}

fn into_response(session_id: String, trace: KanagiTrace, verdict: Option<Verdict>) -> KanagiResponse {
    KanagiResponse {
        session_id,
        tai: trace.iki.evidence.clone(),
        you: vec![trace.input.clone()],
        observation: trace.observation.clone(),
        spiral: trace.spiral.clone(),
        provisional: trace.provisional,
        trace,
        verdict,
    }
}
