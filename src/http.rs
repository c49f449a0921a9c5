use crate::backend::AppointmentBackend;
use crate::configuration::Configuration;
use crate::error::ApiError;
use crate::scheduling::{day_bounds, has_conflict, list_available_slots, WorkingHours};
use crate::session::{Session, SessionKeys};
use crate::types::{
    AppointmentFilter, AppointmentKind, AppointmentStatus, AppointmentUpdate, Location,
    NewAppointment, NewUser, Notes, Role, DEFAULT_DURATION_MINUTES,
};
use axum::extract::{Path, Query};
use axum::http::HeaderValue;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum::{
    routing::{get, post},
    Router,
};
use axum_valid::Valid;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

const DEFAULT_PAGE_LIMIT: u32 = 10;

#[derive(Clone)]
pub struct AppState<T: AppointmentBackend> {
    pub backend: T,
    pub sessions: SessionKeys,
    pub working_hours: WorkingHours,
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().chars().count() < 3 {
        return Err(ValidationError::new("title")
            .with_message("Title must be at least 3 characters".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateAppointmentRequest {
    designer: Uuid,
    #[validate(custom(function = "validate_title"))]
    title: String,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    description: Option<String>,
    #[serde(rename = "type")]
    kind: AppointmentKind,
    scheduled_date: DateTime<Utc>,
    #[validate(range(min = 15, max = 480, message = "Duration must be between 15 and 480 minutes"))]
    duration: Option<u32>,
    #[serde(default)]
    location: Location,
    project: Option<Uuid>,
}

fn validate_update(request: &UpdateAppointmentRequest) -> Result<(), ValidationError> {
    match &request.title {
        Some(title) => validate_title(title),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_update"))]
#[serde(rename_all = "camelCase")]
struct UpdateAppointmentRequest {
    title: Option<String>,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    description: Option<String>,
    scheduled_date: Option<DateTime<Utc>>,
    #[validate(range(min = 15, max = 480, message = "Duration must be between 15 and 480 minutes"))]
    duration: Option<u32>,
    location: Option<Location>,
    status: Option<AppointmentStatus>,
    notes: Option<Notes>,
}

impl From<UpdateAppointmentRequest> for AppointmentUpdate {
    fn from(request: UpdateAppointmentRequest) -> Self {
        Self {
            title: request.title.map(|title| title.trim().to_string()),
            description: request.description,
            scheduled_date: request.scheduled_date,
            duration: request.duration,
            location: request.location,
            status: request.status,
            notes: request.notes,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
struct ListAppointmentsQuery {
    #[validate(range(min = 1))]
    page: Option<u32>,
    #[validate(range(min = 1, max = 100))]
    limit: Option<u32>,
    status: Option<AppointmentStatus>,
    #[serde(rename = "type")]
    kind: Option<AppointmentKind>,
    date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AvailabilityQuery {
    date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
struct CreateUserRequest {
    #[validate(length(min = 1, max = 50, message = "Name cannot exceed 50 characters"))]
    name: String,
    #[validate(email(message = "Please enter a valid email"))]
    email: String,
    #[serde(default)]
    role: Role,
}

pub fn create_app<T: AppointmentBackend, C: Configuration>(backend: T, configuration: C) -> Router {
    let state = AppState {
        backend,
        sessions: SessionKeys::new(&configuration.jwt_secret()),
        working_hours: configuration.working_hours(),
    };

    let cors = match configuration.frontend_url().parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new().allow_origin(origin),
        Err(err) => {
            warn!(?err, "Invalid frontend url, allowing any origin");
            CorsLayer::new().allow_origin(Any)
        }
    }
    .allow_methods(Any)
    .allow_headers(Any);

    let appointments = Router::new()
        .route("/", post(create_appointment).get(list_appointments))
        .route(
            "/{id}",
            get(get_appointment)
                .put(update_appointment)
                .delete(cancel_appointment),
        )
        .route("/designer/{designer_id}/availability", get(get_availability));

    Router::new()
        .route("/api/health", get(health))
        .route("/api/users", post(create_user))
        .nest("/api/appointments", appointments)
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "message": "Designer appointment backend is running",
        "timestamp": Utc::now(),
    }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Route not found".into())
}

async fn create_user<T: AppointmentBackend>(
    State(state): State<AppState<T>>,
    session: Session,
    Valid(Json(request)): Valid<Json<CreateUserRequest>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if !session.is_admin() {
        return Err(ApiError::Forbidden);
    }

    let user = state.backend.add_user(NewUser {
        name: request.name.trim().to_string(),
        email: request.email,
        role: request.role,
    })?;
    let token = state.sessions.issue(&user).map_err(|err| {
        warn!(?err, "Failed to issue token");
        ApiError::Internal
    })?;
    info!(id = %user.id, role = user.role.as_str(), "User created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "user": user,
            "token": token,
        })),
    ))
}

async fn create_appointment<T: AppointmentBackend>(
    State(state): State<AppState<T>>,
    session: Session,
    Valid(Json(request)): Valid<Json<CreateAppointmentRequest>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let designer = state
        .backend
        .user(request.designer)?
        .filter(|designer| designer.is_active && designer.role.can_take_appointments())
        .ok_or_else(|| ApiError::NotFound("Designer not found".into()))?;
    if designer.id == session.user.id {
        return Err(ApiError::BadRequest(
            "You can't book an appointment with yourself".into(),
        ));
    }
    if request.scheduled_date <= Utc::now() {
        return Err(ApiError::BadRequest(
            "Appointment must be scheduled for a future date".into(),
        ));
    }

    let duration = request.duration.unwrap_or(DEFAULT_DURATION_MINUTES);
    // The store repeats this check atomically with the insert.
    if has_conflict(&state.backend, designer.id, request.scheduled_date, duration)? {
        return Err(ApiError::BadRequest(
            "Designer is not available at the selected time".into(),
        ));
    }

    let appointment = state.backend.book_appointment(NewAppointment {
        client: session.user.id,
        designer: designer.id,
        project: request.project,
        title: request.title.trim().to_string(),
        description: request.description,
        kind: request.kind,
        scheduled_date: request.scheduled_date,
        duration,
        location: request.location,
    })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Appointment created successfully",
            "appointment": appointment,
        })),
    ))
}

async fn list_appointments<T: AppointmentBackend>(
    State(state): State<AppState<T>>,
    session: Session,
    Valid(Query(query)): Valid<Query<ListAppointmentsQuery>>,
) -> Result<Json<Value>, ApiError> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let (scheduled_from, scheduled_until) = match query.date {
        Some(date) => {
            let (start, end) = day_bounds(date, &Local)
                .ok_or_else(|| ApiError::BadRequest("Invalid date".into()))?;
            (Some(start), Some(end))
        }
        None => (None, None),
    };

    let filter = AppointmentFilter {
        participant: (!session.is_admin()).then_some(session.user.id),
        status: query.status,
        kind: query.kind,
        scheduled_from,
        scheduled_until,
        page,
        limit,
    };
    let result = state.backend.appointments(&filter)?;

    Ok(Json(json!({
        "success": true,
        "appointments": result.appointments,
        "pagination": {
            "current": page,
            "pages": result.total.div_ceil(u64::from(limit)),
            "total": result.total,
            "limit": limit,
        },
    })))
}

async fn get_appointment<T: AppointmentBackend>(
    State(state): State<AppState<T>>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let appointment = state.backend.appointment(id)?;
    if !session.can_access(&appointment) {
        return Err(ApiError::Forbidden);
    }

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

async fn update_appointment<T: AppointmentBackend>(
    State(state): State<AppState<T>>,
    session: Session,
    Path(id): Path<Uuid>,
    Valid(Json(request)): Valid<Json<UpdateAppointmentRequest>>,
) -> Result<Json<Value>, ApiError> {
    let appointment = state.backend.appointment(id)?;
    if !session.can_access(&appointment) {
        return Err(ApiError::Forbidden);
    }
    if request
        .scheduled_date
        .is_some_and(|scheduled_date| scheduled_date <= Utc::now())
    {
        return Err(ApiError::BadRequest(
            "Appointment must be scheduled for a future date".into(),
        ));
    }

    let appointment = state.backend.update_appointment(id, request.into())?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment updated successfully",
        "appointment": appointment,
    })))
}

async fn cancel_appointment<T: AppointmentBackend>(
    State(state): State<AppState<T>>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let appointment = state.backend.appointment(id)?;
    if !session.can_access(&appointment) {
        return Err(ApiError::Forbidden);
    }

    state
        .backend
        .update_status(id, AppointmentStatus::Cancelled)?;
    info!(%id, "Appointment cancelled");

    Ok(Json(json!({
        "success": true,
        "message": "Appointment cancelled successfully",
    })))
}

async fn get_availability<T: AppointmentBackend>(
    State(state): State<AppState<T>>,
    _session: Session,
    Path(designer_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, ApiError> {
    let date = query
        .date
        .ok_or_else(|| ApiError::BadRequest("Date parameter is required".into()))?;

    let availability = list_available_slots(
        &state.backend,
        designer_id,
        date,
        &state.working_hours,
        &Local,
        Utc::now(),
    )?;

    Ok(Json(json!({
        "success": true,
        "date": availability.date,
        "availableSlots": availability.available_slots,
        "bookedSlots": availability.booked_slots,
    })))
}
