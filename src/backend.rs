use crate::{
    error::BackendError,
    types::{
        Appointment, AppointmentFilter, AppointmentPage, AppointmentStatus, AppointmentUpdate,
        BookedSlot, NewAppointment, NewUser, User,
    },
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistent store for appointments and the users they reference.
///
/// Implementations must make `book_appointment` and `update_appointment`
/// atomic with their conflict check: two callers racing for overlapping
/// intervals of the same designer can't both succeed.
pub trait AppointmentBackend: Clone + Send + Sync + 'static {
    /// Active appointments of `designer` starting in `[range_start, range_end)`,
    /// ordered by start.
    fn active_in_range(
        &self,
        designer: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<BookedSlot>, BackendError>;

    fn book_appointment(&self, appointment: NewAppointment) -> Result<Appointment, BackendError>;

    fn appointment(&self, id: Uuid) -> Result<Appointment, BackendError>;

    fn appointments(&self, filter: &AppointmentFilter) -> Result<AppointmentPage, BackendError>;

    fn update_appointment(
        &self,
        id: Uuid,
        update: AppointmentUpdate,
    ) -> Result<Appointment, BackendError>;

    fn update_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, BackendError> {
        self.update_appointment(id, AppointmentUpdate::status(status))
    }

    fn user(&self, id: Uuid) -> Result<Option<User>, BackendError>;

    fn add_user(&self, user: NewUser) -> Result<User, BackendError>;

    fn user_count(&self) -> Result<u64, BackendError>;
}
