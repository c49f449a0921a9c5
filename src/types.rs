use crate::error::BackendError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

pub const DEFAULT_DURATION_MINUTES: u32 = 60;
pub const MAX_DURATION_MINUTES: u32 = 480;

/// End of a booking of `duration_minutes` starting at `start`, if chrono can
/// represent it.
pub fn end_of(start: DateTime<Utc>, duration_minutes: u32) -> Result<DateTime<Utc>, BackendError> {
    start
        .checked_add_signed(Duration::minutes(i64::from(duration_minutes)))
        .ok_or(BackendError::OutOfRange(start))
}

/// Lifecycle state of an appointment.
///
/// Only `Scheduled` and `Confirmed` occupy the designer's calendar. Cancelling is
/// a transition, records are never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    Rescheduled,
}

impl AppointmentStatus {
    pub const ACTIVE: [AppointmentStatus; 2] =
        [AppointmentStatus::Scheduled, AppointmentStatus::Confirmed];

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed
                | AppointmentStatus::Cancelled
                | AppointmentStatus::Rescheduled
        )
    }

    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;

        if self == next {
            return true;
        }
        match (self, next) {
            (Scheduled, Confirmed) | (Confirmed, InProgress) | (InProgress, Completed) => true,
            (from, Cancelled | Rescheduled) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in-progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Rescheduled => "rescheduled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = BackendError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "in-progress" => Ok(AppointmentStatus::InProgress),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "rescheduled" => Ok(AppointmentStatus::Rescheduled),
            other => Err(BackendError::Corrupt(format!("unknown status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentKind {
    Consultation,
    DesignReview,
    SiteVisit,
    FinalPresentation,
    FollowUp,
}

impl AppointmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentKind::Consultation => "consultation",
            AppointmentKind::DesignReview => "design-review",
            AppointmentKind::SiteVisit => "site-visit",
            AppointmentKind::FinalPresentation => "final-presentation",
            AppointmentKind::FollowUp => "follow-up",
        }
    }
}

impl FromStr for AppointmentKind {
    type Err = BackendError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "consultation" => Ok(AppointmentKind::Consultation),
            "design-review" => Ok(AppointmentKind::DesignReview),
            "site-visit" => Ok(AppointmentKind::SiteVisit),
            "final-presentation" => Ok(AppointmentKind::FinalPresentation),
            "follow-up" => Ok(AppointmentKind::FollowUp),
            other => Err(BackendError::Corrupt(format!("unknown appointment type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocationKind {
    #[default]
    Online,
    ClientLocation,
    Office,
}

impl LocationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LocationKind::Online => "online",
            LocationKind::ClientLocation => "client-location",
            LocationKind::Office => "office",
        }
    }
}

impl FromStr for LocationKind {
    type Err = BackendError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "online" => Ok(LocationKind::Online),
            "client-location" => Ok(LocationKind::ClientLocation),
            "office" => Ok(LocationKind::Office),
            other => Err(BackendError::Corrupt(format!("unknown location type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(rename = "type", default)]
    pub kind: LocationKind,
    pub address: Option<String>,
    pub meeting_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notes {
    pub before_meeting: Option<String>,
    pub after_meeting: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    pub client: Uuid,
    pub designer: Uuid,
    pub project: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: AppointmentKind,
    pub scheduled_date: DateTime<Utc>,
    pub duration: u32,
    pub location: Location,
    pub status: AppointmentStatus,
    pub notes: Notes,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn ends_at(&self) -> Result<DateTime<Utc>, BackendError> {
        end_of(self.scheduled_date, self.duration)
    }

    pub fn is_participant(&self, user: Uuid) -> bool {
        self.client == user || self.designer == user
    }

    /// Applies an edit in place. Returns whether the occupied interval changed.
    /// A rejected edit leaves the appointment untouched.
    pub fn apply(&mut self, update: AppointmentUpdate) -> Result<bool, BackendError> {
        let previous = (self.scheduled_date, self.duration);
        let scheduled_date = update.scheduled_date.unwrap_or(self.scheduled_date);
        let duration = update.duration.unwrap_or(self.duration);
        end_of(scheduled_date, duration)?;

        if let Some(status) = update.status {
            if !self.status.can_transition_to(status) {
                return Err(BackendError::InvalidTransition {
                    from: self.status,
                    to: status,
                });
            }
            self.status = status;
        }

        self.scheduled_date = scheduled_date;
        self.duration = duration;
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(location) = update.location {
            self.location = location;
        }
        if let Some(notes) = update.notes {
            self.notes = notes;
        }
        self.updated_at = Utc::now();

        Ok(previous != (self.scheduled_date, self.duration))
    }
}

/// Everything the store needs to persist a fresh booking.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub client: Uuid,
    pub designer: Uuid,
    pub project: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub kind: AppointmentKind,
    pub scheduled_date: DateTime<Utc>,
    pub duration: u32,
    pub location: Location,
}

impl NewAppointment {
    pub fn into_appointment(self, id: Uuid) -> Appointment {
        let now = Utc::now();
        Appointment {
            id,
            client: self.client,
            designer: self.designer,
            project: self.project,
            title: self.title,
            description: self.description,
            kind: self.kind,
            scheduled_date: self.scheduled_date,
            duration: self.duration,
            location: self.location,
            status: AppointmentStatus::Scheduled,
            notes: Notes::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppointmentUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub duration: Option<u32>,
    pub location: Option<Location>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<Notes>,
}

impl AppointmentUpdate {
    pub fn status(status: AppointmentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Start and length of an occupied calendar entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedSlot {
    pub start: DateTime<Utc>,
    pub duration: u32,
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    /// Restricts results to appointments where this user is client or designer.
    pub participant: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub kind: Option<AppointmentKind>,
    pub scheduled_from: Option<DateTime<Utc>>,
    pub scheduled_until: Option<DateTime<Utc>>,
    pub page: u32,
    pub limit: u32,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.participant
            .map_or(true, |user| appointment.is_participant(user))
            && self.status.map_or(true, |status| appointment.status == status)
            && self.kind.map_or(true, |kind| appointment.kind == kind)
            && self
                .scheduled_from
                .map_or(true, |from| appointment.scheduled_date >= from)
            && self
                .scheduled_until
                .map_or(true, |until| appointment.scheduled_date < until)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentPage {
    pub appointments: Vec<Appointment>,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Designer,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Designer => "designer",
            Role::Admin => "admin",
        }
    }

    pub fn can_take_appointments(self) -> bool {
        matches!(self, Role::Designer | Role::Admin)
    }
}

impl FromStr for Role {
    type Err = BackendError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Role::User),
            "designer" => Ok(Role::Designer),
            "admin" => Ok(Role::Admin),
            other => Err(BackendError::Corrupt(format!("unknown role '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
}
