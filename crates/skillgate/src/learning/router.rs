use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use super::domain::{ChallengeId, CourseId, InvalidIdentifier, TopicId, UserId};
use super::hints::HintRequest;
use super::ledger::GateSubmission;
use super::service::{ErrorClass, LearningService, LearningServiceError};

/// Router exposing the learning views, gate submissions, and hint requests.
pub fn learning_router(service: Arc<LearningService>) -> Router {
    Router::new()
        .route(
            "/api/v1/learning/users/:user_id/courses/:course_id",
            get(course_handler),
        )
        .route(
            "/api/v1/learning/users/:user_id/courses/:course_id/topics/:topic_id",
            get(topic_handler),
        )
        .route(
            "/api/v1/learning/users/:user_id/courses/:course_id/topics/:topic_id/gate",
            post(gate_handler),
        )
        .route(
            "/api/v1/learning/users/:user_id/courses/:course_id/topics/:topic_id/challenges/:challenge_id/hints",
            post(hint_handler),
        )
        .with_state(service)
}

fn bad_request(message: String) -> Response {
    let payload = json!({ "error": message });
    (StatusCode::BAD_REQUEST, Json(payload)).into_response()
}

pub(crate) fn error_response(error: LearningServiceError) -> Response {
    let status = match error.class() {
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::Forbidden => StatusCode::FORBIDDEN,
        ErrorClass::BadRequest => StatusCode::BAD_REQUEST,
        ErrorClass::Conflict => StatusCode::CONFLICT,
        ErrorClass::Upstream => StatusCode::BAD_GATEWAY,
        ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = match error.retry_after_seconds() {
        Some(seconds) => json!({
            "error": error.to_string(),
            "retryAfterSeconds": seconds,
        }),
        None => json!({ "error": error.to_string() }),
    };
    (status, Json(payload)).into_response()
}

fn course_ids(user_id: &str, course_id: &str) -> Result<(UserId, CourseId), InvalidIdentifier> {
    Ok((UserId::parse(user_id)?, CourseId::parse(course_id)?))
}

pub(crate) async fn course_handler(
    State(service): State<Arc<LearningService>>,
    Path((user_id, course_id)): Path<(String, String)>,
) -> Response {
    let (user_id, course_id) = match course_ids(&user_id, &course_id) {
        Ok(ids) => ids,
        Err(err) => return bad_request(err.to_string()),
    };

    match service.get_course_learning_view(&user_id, &course_id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn topic_handler(
    State(service): State<Arc<LearningService>>,
    Path((user_id, course_id, topic_id)): Path<(String, String, String)>,
) -> Response {
    let ids = course_ids(&user_id, &course_id)
        .and_then(|(user, course)| Ok((user, course, TopicId::parse(&topic_id)?)));
    let (user_id, course_id, topic_id) = match ids {
        Ok(ids) => ids,
        Err(err) => return bad_request(err.to_string()),
    };

    match service
        .get_topic_learning_view(&user_id, &course_id, &topic_id)
        .await
    {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn gate_handler(
    State(service): State<Arc<LearningService>>,
    Path((user_id, course_id, topic_id)): Path<(String, String, String)>,
    payload: Result<Json<GateSubmission>, JsonRejection>,
) -> Response {
    let ids = course_ids(&user_id, &course_id)
        .and_then(|(user, course)| Ok((user, course, TopicId::parse(&topic_id)?)));
    let (user_id, course_id, topic_id) = match ids {
        Ok(ids) => ids,
        Err(err) => return bad_request(err.to_string()),
    };
    let Json(submission) = match payload {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    match service
        .record_topic_gate_result(&user_id, &course_id, &topic_id, submission)
        .await
    {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn hint_handler(
    State(service): State<Arc<LearningService>>,
    Path((user_id, course_id, topic_id, challenge_id)): Path<(String, String, String, String)>,
    payload: Result<Json<HintRequest>, JsonRejection>,
) -> Response {
    let ids = course_ids(&user_id, &course_id).and_then(|(user, course)| {
        Ok((
            user,
            course,
            TopicId::parse(&topic_id)?,
            ChallengeId::parse(&challenge_id)?,
        ))
    });
    let (user_id, course_id, topic_id, challenge_id) = match ids {
        Ok(ids) => ids,
        Err(err) => return bad_request(err.to_string()),
    };
    let request = match payload {
        Ok(Json(body)) => body,
        Err(JsonRejection::MissingJsonContentType(_)) => HintRequest::default(),
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    match service
        .request_hint_for_challenge(&user_id, &course_id, &topic_id, &challenge_id, request)
        .await
    {
        Ok(hint) => (StatusCode::OK, Json(hint)).into_response(),
        Err(err) => error_response(err),
    }
}
