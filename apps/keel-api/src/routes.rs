use axum::{
	Json, Router,
	extract::{Path, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use keel_service::{
	AuthContext,
	capability::Role,
	relations::{self, RelationGroup},
	route::{self, RouteResponse},
	shadow,
};
use keel_storage::{EntityStore, FocusRef, RecordKind};

use crate::state::AppState;

pub fn router<S>(state: AppState<S>) -> Router
where
	S: EntityStore + 'static,
{
	Router::new()
		.route("/health", get(health))
		.route("/v1/route", post(route_query::<S>))
		.route("/v1/records/{kind}/{id}/related", get(related::<S>))
		.with_state(state)
}

pub fn admin_router<S>(state: AppState<S>) -> Router
where
	S: EntityStore + 'static,
{
	Router::new().route("/health", get(health)).with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct RouteRequest {
	query: String,
}

async fn route_query<S>(
	State(state): State<AppState<S>>,
	headers: HeaderMap,
	Json(payload): Json<RouteRequest>,
) -> Result<Json<RouteResponse>, ApiError>
where
	S: EntityStore + 'static,
{
	let auth = auth_from_headers(&headers)?;
	let response = route::route_query(
		&payload.query,
		&auth,
		&state.rules,
		state.rules.patterns(),
		&state.registry,
		state.extractor.as_deref(),
		&state.config.classifier,
		state.config.providers.llm_extractor.timeout_ms,
	)
	.await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct RelatedResponse {
	focus: FocusRef,
	groups: Vec<RelationGroup>,
}

async fn related<S>(
	State(state): State<AppState<S>>,
	headers: HeaderMap,
	Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<RelatedResponse>, ApiError>
where
	S: EntityStore + 'static,
{
	let auth = auth_from_headers(&headers)?;
	let kind = RecordKind::parse(&kind).ok_or_else(|| {
		json_error(
			StatusCode::BAD_REQUEST,
			"invalid_request",
			format!("Unknown record kind: {kind}."),
		)
	})?;
	let focus = FocusRef { kind, id };
	let ranking = &state.config.ranking;
	let mut groups = relations::expand(
		state.store.as_ref(),
		&auth.tenant_id,
		&focus,
		&state.config.relations,
	)
	.await?;
	let focus_vec = if ranking.blend_alpha > 0. || ranking.shadow_enabled {
		state.store.focus_embedding(&auth.tenant_id, &focus).await.map_err(keel_service::Error::from)?
	} else {
		None
	};

	if ranking.shadow_enabled {
		let shadow_id = shadow::truncated_id(&auth.tenant_id, &id.to_string());

		shadow::log_shadow(&groups, focus_vec.as_deref(), &shadow_id, ranking);
	}
	if ranking.blend_alpha > 0. {
		for group in &mut groups {
			group.items =
				shadow::blended_ranking(&group.items, focus_vec.as_deref(), ranking.blend_alpha);
		}
	}

	Ok(Json(RelatedResponse { focus, groups }))
}

fn auth_from_headers(headers: &HeaderMap) -> Result<AuthContext, ApiError> {
	let field = |name: &str| {
		// A duplicated identity header must not let the first value win.
		if headers.get_all(name).iter().count() > 1 {
			return Err(json_error(
				StatusCode::BAD_REQUEST,
				"invalid_request",
				format!("Header {name} must appear exactly once."),
			));
		}

		headers
			.get(name)
			.and_then(|value| value.to_str().ok())
			.map(str::trim)
			.filter(|value| !value.is_empty())
			.map(str::to_string)
			.ok_or_else(|| {
				json_error(
					StatusCode::BAD_REQUEST,
					"missing_auth_header",
					format!("Header {name} is required."),
				)
			})
	};
	let user_id = field("x-keel-user")?;
	let tenant_id = field("x-keel-tenant")?;
	let role_raw = field("x-keel-role")?;
	let role = Role::parse(&role_raw).ok_or_else(|| {
		json_error(
			StatusCode::BAD_REQUEST,
			"invalid_request",
			format!("Unknown role: {role_raw}."),
		)
	})?;

	Ok(AuthContext { user_id, tenant_id, role })
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}

fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
	ApiError { status, error_code: code.to_string(), message: message.into() }
}

impl From<keel_service::Error> for ApiError {
	fn from(err: keel_service::Error) -> Self {
		match &err {
			keel_service::Error::MissingTenant =>
				json_error(StatusCode::BAD_REQUEST, "missing_tenant", err.to_string()),
			keel_service::Error::InvalidRequest { .. } =>
				json_error(StatusCode::BAD_REQUEST, "invalid_request", err.to_string()),
			keel_service::Error::Registry { .. } =>
				json_error(StatusCode::INTERNAL_SERVER_ERROR, "registry", err.to_string()),
			keel_service::Error::Storage { .. } => {
				tracing::error!(error = %err, "Storage failure on the request path.");

				json_error(
					StatusCode::INTERNAL_SERVER_ERROR,
					"storage",
					"Storage backend failed.",
				)
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
