//! REST CRUD handlers. Mutations publish into the dispatch engine through
//! the registered subjects, the only coupling between this layer and the
//! fan-out core.

use axum::extract::{Path, State};
use axum::Json;

use medsync_core::events::ENTITY_UPDATED;
use medsync_store::dose_history::{
    DoseDaySummary, DoseHistoryEntry, DoseHistoryRepo, DoseStatus, NewDoseHistoryEntry,
};
use medsync_store::doses::{DoseDetails, DoseRepo, DoseSummary, NewDose, UpdatedDose};
use medsync_store::medications::{
    MedicationDetails, MedicationRepo, MedicationSummary, NewMedication, UpdatedMedication,
};
use medsync_store::users::{NewUser, UpdatedUser, UserDetails, UserRepo, UserSummary};
use medsync_store::Database;

use crate::error::ApiError;
use crate::server::AppState;
use crate::subjects::DomainSubjects;

/// Shared state available to all REST handlers.
pub struct HandlerState {
    pub users: UserRepo,
    pub medications: MedicationRepo,
    pub doses: DoseRepo,
    pub dose_history: DoseHistoryRepo,
    pub subjects: DomainSubjects,
}

impl HandlerState {
    pub fn new(db: Database, subjects: DomainSubjects) -> Self {
        Self {
            users: UserRepo::new(db.clone()),
            medications: MedicationRepo::new(db.clone()),
            doses: DoseRepo::new(db.clone()),
            dose_history: DoseHistoryRepo::new(db),
            subjects,
        }
    }
}

// Medications

pub async fn create_medication(
    State(state): State<AppState>,
    Json(new): Json<NewMedication>,
) -> Result<Json<MedicationDetails>, ApiError> {
    let state = &state.handler_state;
    let medication = state.medications.create(&new)?;
    state
        .subjects
        .medications
        .entity_added(medication.id, serde_json::to_value(&medication)?)
        .await;
    Ok(Json(medication))
}

pub async fn list_medications(
    State(state): State<AppState>,
) -> Result<Json<Vec<MedicationSummary>>, ApiError> {
    Ok(Json(state.handler_state.medications.list()?))
}

pub async fn read_medication(
    State(state): State<AppState>,
    Path(medication_id): Path<i64>,
) -> Result<Json<MedicationDetails>, ApiError> {
    Ok(Json(state.handler_state.medications.read(medication_id)?))
}

pub async fn update_medication(
    State(state): State<AppState>,
    Path(medication_id): Path<i64>,
    Json(updated): Json<UpdatedMedication>,
) -> Result<Json<MedicationDetails>, ApiError> {
    let state = &state.handler_state;
    let medication = state.medications.update(medication_id, &updated)?;
    state
        .subjects
        .medications
        .entity_updated(medication.id, serde_json::to_value(medication.to_summary())?)
        .await;
    Ok(Json(medication))
}

pub async fn delete_medication(
    State(state): State<AppState>,
    Path(medication_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = &state.handler_state;
    state.medications.delete(medication_id)?;
    state.subjects.medications.entity_deleted(medication_id).await;
    Ok(Json(serde_json::json!({})))
}

// Users

pub async fn create_user(
    State(state): State<AppState>,
    Json(new): Json<NewUser>,
) -> Result<Json<UserDetails>, ApiError> {
    Ok(Json(state.handler_state.users.create(&new)?))
}

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserSummary>>, ApiError> {
    Ok(Json(state.handler_state.users.list()?))
}

pub async fn read_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserDetails>, ApiError> {
    Ok(Json(state.handler_state.users.read(user_id)?))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(updated): Json<UpdatedUser>,
) -> Result<Json<UserDetails>, ApiError> {
    Ok(Json(state.handler_state.users.update(user_id, &updated)?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.handler_state.users.delete(user_id)?;
    Ok(Json(serde_json::json!({})))
}

// Doses

pub async fn create_dose(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(new): Json<NewDose>,
) -> Result<Json<DoseDetails>, ApiError> {
    let state = &state.handler_state;
    state.users.read(user_id)?;
    let dose = state.doses.create(user_id, &new)?;
    state
        .subjects
        .doses
        .entity_added(user_id, dose.id, serde_json::to_value(dose.to_summary())?)
        .await;
    Ok(Json(dose))
}

pub async fn list_doses(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<DoseSummary>>, ApiError> {
    Ok(Json(state.handler_state.doses.list(user_id)?))
}

pub async fn read_dose(
    State(state): State<AppState>,
    Path((user_id, dose_id)): Path<(i64, i64)>,
) -> Result<Json<DoseDetails>, ApiError> {
    Ok(Json(state.handler_state.doses.read(user_id, dose_id)?))
}

pub async fn update_dose(
    State(state): State<AppState>,
    Path((user_id, dose_id)): Path<(i64, i64)>,
    Json(updated): Json<UpdatedDose>,
) -> Result<Json<DoseDetails>, ApiError> {
    let state = &state.handler_state;
    let dose = state.doses.update(user_id, dose_id, &updated)?;
    state
        .subjects
        .doses
        .entity_updated(user_id, dose.id, serde_json::to_value(dose.to_summary())?)
        .await;
    Ok(Json(dose))
}

pub async fn delete_dose(
    State(state): State<AppState>,
    Path((user_id, dose_id)): Path<(i64, i64)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = &state.handler_state;
    state.doses.delete(user_id, dose_id)?;
    state.subjects.doses.entity_deleted(user_id, dose_id).await;
    Ok(Json(serde_json::json!({})))
}

// Dose history & summaries

pub async fn create_dose_history_entry(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(new): Json<NewDoseHistoryEntry>,
) -> Result<Json<DoseHistoryEntry>, ApiError> {
    let state = &state.handler_state;
    let entry = state.dose_history.create(user_id, &new)?;

    // A dispense changes the user's summaries; push the recomputed set.
    let summaries = state.dose_history.summaries(user_id)?;
    state
        .subjects
        .dose_summaries
        .emit(user_id, ENTITY_UPDATED, serde_json::to_value(summaries)?)
        .await;

    Ok(Json(entry))
}

pub async fn list_dose_history(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<DoseHistoryEntry>>, ApiError> {
    Ok(Json(state.handler_state.dose_history.list(user_id)?))
}

pub async fn list_dose_summaries(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<DoseDaySummary>>, ApiError> {
    Ok(Json(state.handler_state.dose_history.summaries(user_id)?))
}

pub async fn read_dose_summary(
    State(state): State<AppState>,
    Path((user_id, date)): Path<(i64, String)>,
) -> Result<Json<Vec<DoseStatus>>, ApiError> {
    Ok(Json(state.handler_state.dose_history.statuses(user_id, &date)?))
}
