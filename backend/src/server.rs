//! Axum HTTP server: the policy query surface.
//!
//! Heavy computes run on the blocking pool; suggestion and reroll queries
//! are table lookups against immutable `Arc` snapshots. The server keeps the
//! most recently computed upgrade and reroll policies as the implicit
//! session for suggestion/recommendation queries; the bounded cache behind
//! them deduplicates and reuses solves across requests.
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/bootstrap` | Catalogue and defaults for the UI |
//! | POST | `/compute_policy` | Solve and cache an upgrade policy |
//! | POST | `/policy_suggestion` | Continue/abandon advice for one state |
//! | POST | `/compute_reroll_policy` | Solve and retain a reroll policy |
//! | POST | `/query_reroll_recommendation` | Ranked lock-set advice |

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use artifact_solver::catalog::{self, BUFFS, DEFAULT_BUFF_WEIGHTS};
use artifact_solver::constants::{
    BUFF_COUNT, DEFAULT_EXP_REFUND_RATIO, DEFAULT_LAMBDA_MAX_ITER, DEFAULT_LAMBDA_TOLERANCE,
    DEFAULT_TARGET_SCORE, SLOT_COUNT,
};
use artifact_solver::{
    CancelToken, CostWeights, PolicyCache, PolicyRequest, PolicySummary, RerollPolicy, ScorerKind,
    SolveError, SolvedPolicy,
};

/// Shared server state: the policy cache plus the current session handles.
pub struct ServerState {
    pub cache: PolicyCache,
    pub upgrade: Mutex<Option<Arc<SolvedPolicy>>>,
    pub reroll: Mutex<Option<Arc<RerollPolicy>>>,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            cache: PolicyCache::new(),
            upgrade: Mutex::new(None),
            reroll: Mutex::new(None),
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

pub type AppState = Arc<ServerState>;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health_check))
        .route("/bootstrap", get(handle_bootstrap))
        .route("/compute_policy", post(handle_compute_policy))
        .route("/policy_suggestion", post(handle_policy_suggestion))
        .route("/compute_reroll_policy", post(handle_compute_reroll_policy))
        .route(
            "/query_reroll_recommendation",
            post(handle_query_reroll_recommendation),
        )
        .layer(cors)
        .with_state(state)
}

// ── Request/Response types ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CostWeightsInput {
    #[serde(default)]
    w_echo: f64,
    #[serde(default = "default_tuner_weight")]
    w_tuner: f64,
    #[serde(default)]
    w_exp: f64,
}

impl Default for CostWeightsInput {
    fn default() -> Self {
        Self {
            w_echo: 0.0,
            w_tuner: default_tuner_weight(),
            w_exp: 0.0,
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy)]
#[serde(rename_all = "camelCase")]
struct CostWeightsOutput {
    w_echo: f64,
    w_tuner: f64,
    w_exp: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComputePolicyRequest {
    #[serde(default)]
    buff_weights: HashMap<String, f64>,
    target_score: f64,
    #[serde(default = "default_scorer_type")]
    scorer_type: String,
    #[serde(default)]
    cost_weights: CostWeightsInput,
    #[serde(default)]
    exp_refund_ratio: Option<f64>,
    #[serde(default)]
    blend_user_data: bool,
    #[serde(default = "default_lambda_tolerance")]
    lambda_tolerance: f64,
    #[serde(default = "default_lambda_max_iter")]
    lambda_max_iter: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ComputePolicyResponse {
    summary: PolicySummary,
    cost_weights: CostWeightsOutput,
    exp_refund_ratio: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicySuggestionRequest {
    #[serde(default)]
    buff_names: Vec<String>,
    #[serde(default)]
    buff_values: Vec<f64>,
    #[serde(default)]
    total_score: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PolicySuggestionResponse {
    suggestion: String,
    stage: usize,
    target_score: f64,
    success_probability: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComputeRerollPolicyRequest {
    #[serde(default)]
    buff_weights: HashMap<String, f64>,
    target_score: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ComputeRerollPolicyResponse {
    target_score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryRerollRecommendationRequest {
    #[serde(default)]
    baseline_buff_names: Vec<String>,
    #[serde(default)]
    candidate_buff_names: Vec<String>,
    #[serde(default)]
    top_k: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RerollChoiceResponse {
    lock_slot_indices: Vec<usize>,
    expected_cost: f64,
    success_probability: f64,
    regret: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RerollRecommendationResponse {
    valid: bool,
    reason: Option<String>,
    baseline_score: f64,
    candidate_score: Option<f64>,
    accept_candidate: Option<bool>,
    recommended_lock_choices: Vec<RerollChoiceResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BootstrapResponse {
    buff_types: Vec<String>,
    buff_labels: BTreeMap<String, String>,
    buff_type_max_values: Vec<f64>,
    buff_value_options: BTreeMap<String, Vec<u16>>,
    max_selected_types: usize,
    default_buff_weights: BTreeMap<String, f64>,
    default_target_score: f64,
    default_cost_weights: CostWeightsOutput,
    default_exp_refund_ratio: f64,
    default_scorer_type: String,
}

fn default_tuner_weight() -> f64 {
    1.0
}

fn default_scorer_type() -> String {
    "linear".to_string()
}

fn default_lambda_tolerance() -> f64 {
    DEFAULT_LAMBDA_TOLERANCE
}

fn default_lambda_max_iter() -> usize {
    DEFAULT_LAMBDA_MAX_ITER
}

// ── Error mapping ───────────────────────────────────────────────────

type ErrorResponse = (StatusCode, Json<serde_json::Value>);

fn error_response(status: StatusCode, message: &str) -> ErrorResponse {
    (status, Json(serde_json::json!({ "error": message })))
}

fn solve_error_response(error: SolveError) -> ErrorResponse {
    match &error {
        SolveError::Numeric => {
            eprintln!("Internal solver error: {error}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal solver error")
        }
        // An unreachable target carries a structured infinite cost. JSON has
        // no Infinity literal, so expectedCost is null and clients render it
        // as +∞.
        SolveError::UnreachableTarget { .. } => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": error.to_string(),
                "expectedCost": null,
            })),
        ),
        SolveError::InvalidInput { .. } | SolveError::Cancelled | SolveError::NotReady => {
            error_response(StatusCode::BAD_REQUEST, &error.to_string())
        }
    }
}

/// Overlay a name-keyed weight map onto the default preset.
fn build_weight_array(input: &HashMap<String, f64>) -> Result<[f64; BUFF_COUNT], SolveError> {
    let mut weights = DEFAULT_BUFF_WEIGHTS;
    for (name, &value) in input {
        let buff = catalog::buff_index(name).ok_or_else(|| {
            SolveError::invalid("buffWeights", format!("unknown buff id: {name}"))
        })?;
        weights[buff] = value;
    }
    Ok(weights)
}

// ── Handlers ────────────────────────────────────────────────────────

async fn handle_health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}

async fn handle_bootstrap() -> Json<BootstrapResponse> {
    let mut buff_labels = BTreeMap::new();
    let mut buff_value_options = BTreeMap::new();
    let mut default_buff_weights = BTreeMap::new();
    for (buff, def) in BUFFS.iter().enumerate() {
        buff_labels.insert(def.id.to_string(), def.label.to_string());
        buff_value_options.insert(
            def.id.to_string(),
            def.grid.iter().map(|&(value, _)| value).collect(),
        );
        default_buff_weights.insert(def.id.to_string(), DEFAULT_BUFF_WEIGHTS[buff]);
    }

    Json(BootstrapResponse {
        buff_types: BUFFS.iter().map(|def| def.id.to_string()).collect(),
        buff_labels,
        buff_type_max_values: BUFFS.iter().map(|def| def.max_value as f64).collect(),
        buff_value_options,
        max_selected_types: SLOT_COUNT,
        default_buff_weights,
        default_target_score: DEFAULT_TARGET_SCORE,
        default_cost_weights: CostWeightsOutput {
            w_echo: 0.0,
            w_tuner: 1.0,
            w_exp: 0.0,
        },
        default_exp_refund_ratio: DEFAULT_EXP_REFUND_RATIO,
        default_scorer_type: default_scorer_type(),
    })
}

async fn handle_compute_policy(
    State(state): State<AppState>,
    Json(payload): Json<ComputePolicyRequest>,
) -> Result<Json<ComputePolicyResponse>, ErrorResponse> {
    let scorer = ScorerKind::parse(&payload.scorer_type).ok_or_else(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            &format!(
                "unsupported scorerType '{}'; use 'linear' or 'fixed'",
                payload.scorer_type
            ),
        )
    })?;
    let weights = build_weight_array(&payload.buff_weights).map_err(solve_error_response)?;
    let exp_refund_ratio = payload.exp_refund_ratio.unwrap_or(DEFAULT_EXP_REFUND_RATIO);

    let request = PolicyRequest {
        buff_weights: weights,
        target_score: payload.target_score,
        scorer,
        cost_weights: CostWeights {
            echo: payload.cost_weights.w_echo,
            tuner: payload.cost_weights.w_tuner,
            exp: payload.cost_weights.w_exp,
        },
        exp_refund_ratio,
        pool_counts: payload.blend_user_data,
        lambda_tolerance: payload.lambda_tolerance,
        lambda_max_iter: payload.lambda_max_iter,
    };

    let solver_state = state.clone();
    let policy = tokio::task::spawn_blocking(move || {
        solver_state.cache.compute(&request, &CancelToken::new())
    })
    .await
    .map_err(|_| error_response(StatusCode::INTERNAL_SERVER_ERROR, "compute task failed"))?
    .map_err(solve_error_response)?;

    let summary = policy.summary().clone();
    *state.upgrade.lock().expect("upgrade session poisoned") = Some(policy);

    println!(
        "Computed policy: target={} lambda*={:.6} in {:.3}s",
        summary.target_score, summary.lambda_star, summary.compute_seconds
    );

    Ok(Json(ComputePolicyResponse {
        summary,
        cost_weights: CostWeightsOutput {
            w_echo: payload.cost_weights.w_echo,
            w_tuner: payload.cost_weights.w_tuner,
            w_exp: payload.cost_weights.w_exp,
        },
        exp_refund_ratio,
    }))
}

async fn handle_policy_suggestion(
    State(state): State<AppState>,
    Json(payload): Json<PolicySuggestionRequest>,
) -> Result<Json<PolicySuggestionResponse>, ErrorResponse> {
    let policy = state
        .upgrade
        .lock()
        .expect("upgrade session poisoned")
        .clone()
        .ok_or_else(|| solve_error_response(SolveError::NotReady))?;

    let suggestion = policy
        .suggest(&payload.buff_names, &payload.buff_values, payload.total_score)
        .map_err(solve_error_response)?;

    Ok(Json(PolicySuggestionResponse {
        suggestion: suggestion.decision.as_str().to_string(),
        stage: suggestion.stage,
        target_score: suggestion.target_score,
        success_probability: suggestion.success_probability,
    }))
}

async fn handle_compute_reroll_policy(
    State(state): State<AppState>,
    Json(payload): Json<ComputeRerollPolicyRequest>,
) -> Result<Json<ComputeRerollPolicyResponse>, ErrorResponse> {
    let weights = build_weight_array(&payload.buff_weights).map_err(solve_error_response)?;
    let target_score = payload.target_score;

    let solver_state = state.clone();
    let reroll = tokio::task::spawn_blocking(move || {
        RerollPolicy::compute(
            &solver_state.cache,
            weights,
            target_score,
            &CancelToken::new(),
        )
    })
    .await
    .map_err(|_| error_response(StatusCode::INTERNAL_SERVER_ERROR, "compute task failed"))?
    .map_err(solve_error_response)?;

    *state.reroll.lock().expect("reroll session poisoned") = Some(Arc::new(reroll));

    Ok(Json(ComputeRerollPolicyResponse { target_score }))
}

async fn handle_query_reroll_recommendation(
    State(state): State<AppState>,
    Json(payload): Json<QueryRerollRecommendationRequest>,
) -> Result<Json<RerollRecommendationResponse>, ErrorResponse> {
    let reroll = state
        .reroll
        .lock()
        .expect("reroll session poisoned")
        .clone()
        .ok_or_else(|| solve_error_response(SolveError::NotReady))?;

    let recommendation = reroll
        .recommend(
            &payload.baseline_buff_names,
            &payload.candidate_buff_names,
            payload.top_k,
        )
        .map_err(solve_error_response)?;

    Ok(Json(RerollRecommendationResponse {
        valid: recommendation.valid,
        reason: recommendation.reason,
        baseline_score: recommendation.baseline_score,
        candidate_score: recommendation.candidate_score,
        accept_candidate: recommendation.accept_candidate,
        recommended_lock_choices: recommendation
            .choices
            .into_iter()
            .map(|choice| RerollChoiceResponse {
                lock_slot_indices: choice.lock_slot_indices,
                expected_cost: choice.expected_cost,
                success_probability: choice.success_probability,
                regret: choice.regret,
            })
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_request_parses_camel_case_with_defaults() {
        let payload: ComputePolicyRequest = serde_json::from_str(
            r#"{
                "buffWeights": {"Crit_Rate": 80.0},
                "targetScore": 55.0,
                "costWeights": {"wEcho": 0.5}
            }"#,
        )
        .unwrap();
        assert_eq!(payload.target_score, 55.0);
        assert_eq!(payload.scorer_type, "linear");
        assert_eq!(payload.cost_weights.w_echo, 0.5);
        assert_eq!(payload.cost_weights.w_tuner, 1.0);
        assert_eq!(payload.lambda_max_iter, DEFAULT_LAMBDA_MAX_ITER);
        assert!(!payload.blend_user_data);
    }

    #[test]
    fn error_mapping_statuses() {
        let (status, _) = solve_error_response(SolveError::NotReady);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = solve_error_response(SolveError::invalid("targetScore", "bad"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = solve_error_response(SolveError::Numeric);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unreachable_target_carries_infinite_expected_cost() {
        let (status, Json(body)) = solve_error_response(SolveError::UnreachableTarget {
            target_score: 101.0,
            max_attainable: 100.0,
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("unreachable"));
        // Null is the wire sentinel for +∞; the field must be present.
        let cost = body.get("expectedCost").expect("expectedCost field");
        assert!(cost.is_null());
    }

    #[test]
    fn weight_overlay_rejects_unknown_ids() {
        let mut map = HashMap::new();
        map.insert("Haste".to_string(), 1.0);
        assert!(build_weight_array(&map).is_err());

        let mut ok = HashMap::new();
        ok.insert("Crit_Rate".to_string(), 7.0);
        let weights = build_weight_array(&ok).unwrap();
        assert_eq!(weights[0], 7.0);
        assert_eq!(weights[1], DEFAULT_BUFF_WEIGHTS[1]);
    }
}
