use crate::schema::{appointments, users};
use crate::{
    backend::AppointmentBackend,
    error::BackendError,
    scheduling::{conflicts_with_any, TimeInterval},
    types::{
        Appointment, AppointmentFilter, AppointmentPage, AppointmentStatus, AppointmentUpdate,
        BookedSlot, Location, NewAppointment, NewUser, Notes, User,
    },
};
use chrono::{DateTime, Utc};
use diesel::{
    pg::Pg,
    result::{DatabaseErrorKind, Error as DieselError},
    sql_types::BigInt,
    BoolExpressionMethods, Connection, ConnectionError, ExpressionMethods, Insertable,
    OptionalExtension, PgConnection, QueryDsl, Queryable, RunQueryDsl, Selectable,
    SelectableHelper,
};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

const OVERLAP_CONSTRAINT: &str = "appointments_no_overlap";
const EMAIL_CONSTRAINT: &str = "users_email_key";

#[derive(Queryable, Selectable, Insertable, diesel::AsChangeset)]
#[diesel(table_name = appointments, treat_none_as_null = true)]
struct AppointmentRow {
    id: Uuid,
    client: Uuid,
    designer: Uuid,
    project: Option<Uuid>,
    title: String,
    description: Option<String>,
    kind: String,
    scheduled_date: DateTime<Utc>,
    duration: i32,
    ends_at: DateTime<Utc>,
    location_kind: String,
    address: Option<String>,
    meeting_link: Option<String>,
    status: String,
    notes_before: Option<String>,
    notes_after: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<&Appointment> for AppointmentRow {
    type Error = BackendError;

    fn try_from(appointment: &Appointment) -> Result<Self, Self::Error> {
        Ok(Self {
            id: appointment.id,
            client: appointment.client,
            designer: appointment.designer,
            project: appointment.project,
            title: appointment.title.clone(),
            description: appointment.description.clone(),
            kind: appointment.kind.as_str().into(),
            scheduled_date: appointment.scheduled_date,
            duration: appointment.duration as i32,
            ends_at: appointment.ends_at()?,
            location_kind: appointment.location.kind.as_str().into(),
            address: appointment.location.address.clone(),
            meeting_link: appointment.location.meeting_link.clone(),
            status: appointment.status.as_str().into(),
            notes_before: appointment.notes.before_meeting.clone(),
            notes_after: appointment.notes.after_meeting.clone(),
            created_at: appointment.created_at,
            updated_at: appointment.updated_at,
        })
    }
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = BackendError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Appointment {
            id: row.id,
            client: row.client,
            designer: row.designer,
            project: row.project,
            title: row.title,
            description: row.description,
            kind: row.kind.parse()?,
            scheduled_date: row.scheduled_date,
            duration: duration_minutes(row.duration)?,
            location: Location {
                kind: row.location_kind.parse()?,
                address: row.address,
                meeting_link: row.meeting_link,
            },
            status: row.status.parse()?,
            notes: Notes {
                before_meeting: row.notes_before,
                after_meeting: row.notes_after,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = users)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = BackendError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            role: row.role.parse()?,
            is_active: row.is_active,
        })
    }
}

fn duration_minutes(duration: i32) -> Result<u32, BackendError> {
    u32::try_from(duration)
        .map_err(|_| BackendError::Corrupt(format!("negative duration {duration}")))
}

fn map_constraint_violation(err: DieselError) -> BackendError {
    if let DieselError::DatabaseError(kind, info) = &err {
        match info.constraint_name() {
            Some(OVERLAP_CONSTRAINT) => return BackendError::Conflict,
            Some(EMAIL_CONSTRAINT) if matches!(kind, DatabaseErrorKind::UniqueViolation) => {
                return BackendError::DuplicateUser(info.message().into())
            }
            _ => {}
        }
    }
    err.into()
}

/// Serializes all calendar writes of one designer until the transaction ends.
fn lock_designer(connection: &mut PgConnection, designer: Uuid) -> Result<(), BackendError> {
    let (key, _) = designer.as_u64_pair();
    diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
        .bind::<BigInt, _>(key as i64)
        .execute(connection)?;
    Ok(())
}

fn booked_in_range(
    connection: &mut PgConnection,
    designer: Uuid,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    excluded: Option<Uuid>,
) -> Result<Vec<BookedSlot>, BackendError> {
    let active: Vec<&str> = AppointmentStatus::ACTIVE
        .iter()
        .map(|status| status.as_str())
        .collect();

    let mut query = appointments::table
        .filter(appointments::designer.eq(designer))
        .filter(appointments::status.eq_any(active))
        .filter(appointments::scheduled_date.ge(range_start))
        .filter(appointments::scheduled_date.lt(range_end))
        .select((appointments::scheduled_date, appointments::duration))
        .order(appointments::scheduled_date.asc())
        .into_boxed();
    if let Some(id) = excluded {
        query = query.filter(appointments::id.ne(id));
    }

    query
        .load::<(DateTime<Utc>, i32)>(connection)?
        .into_iter()
        .map(|(start, duration)| {
            Ok(BookedSlot {
                start,
                duration: duration_minutes(duration)?,
            })
        })
        .collect()
}

fn ensure_free(
    connection: &mut PgConnection,
    designer: Uuid,
    candidate: &TimeInterval,
    excluded: Option<Uuid>,
) -> Result<(), BackendError> {
    let (range_start, range_end) = candidate.search_window()?;
    let booked = booked_in_range(connection, designer, range_start, range_end, excluded)?;
    if conflicts_with_any(&booked, candidate) {
        warn!(%designer, start = %candidate.start, "Designer is busy");
        return Err(BackendError::Conflict);
    }
    Ok(())
}

fn filtered(filter: &AppointmentFilter) -> appointments::BoxedQuery<'static, Pg> {
    let mut query = appointments::table.into_boxed();
    if let Some(user) = filter.participant {
        query = query.filter(
            appointments::client
                .eq(user)
                .or(appointments::designer.eq(user)),
        );
    }
    if let Some(status) = filter.status {
        query = query.filter(appointments::status.eq(status.as_str()));
    }
    if let Some(kind) = filter.kind {
        query = query.filter(appointments::kind.eq(kind.as_str()));
    }
    if let Some(from) = filter.scheduled_from {
        query = query.filter(appointments::scheduled_date.ge(from));
    }
    if let Some(until) = filter.scheduled_until {
        query = query.filter(appointments::scheduled_date.lt(until));
    }
    query
}

#[derive(Clone)]
pub struct DatabaseInterface {
    connection: Arc<Mutex<PgConnection>>,
}

impl DatabaseInterface {
    pub fn new(database_url: &str) -> Result<Self, ConnectionError> {
        let connection = Self::establish_connection(database_url)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn establish_connection(database_url: &str) -> Result<PgConnection, ConnectionError> {
        PgConnection::establish(database_url)
    }
}

impl AppointmentBackend for DatabaseInterface {
    fn active_in_range(
        &self,
        designer: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<BookedSlot>, BackendError> {
        let mut connection = self.connection.lock()?;
        booked_in_range(&mut connection, designer, range_start, range_end, None)
    }

    fn book_appointment(&self, appointment: NewAppointment) -> Result<Appointment, BackendError> {
        let mut connection = self.connection.lock()?;
        let appointment = appointment.into_appointment(Uuid::new_v4());

        let row = connection.transaction::<_, BackendError, _>(|connection| {
            lock_designer(connection, appointment.designer)?;
            let candidate = TimeInterval::new(appointment.scheduled_date, appointment.duration)?;
            ensure_free(connection, appointment.designer, &candidate, None)?;

            diesel::insert_into(appointments::table)
                .values(AppointmentRow::try_from(&appointment)?)
                .returning(AppointmentRow::as_returning())
                .get_result(connection)
                .map_err(map_constraint_violation)
        })?;

        info!(id = %row.id, "Appointment booked");
        row.try_into()
    }

    fn appointment(&self, id: Uuid) -> Result<Appointment, BackendError> {
        let mut connection = self.connection.lock()?;
        appointments::table
            .find(id)
            .select(AppointmentRow::as_select())
            .first(&mut *connection)
            .optional()?
            .ok_or_else(|| BackendError::appointment_not_found(id))?
            .try_into()
    }

    fn appointments(&self, filter: &AppointmentFilter) -> Result<AppointmentPage, BackendError> {
        let mut connection = self.connection.lock()?;

        let total: i64 = filtered(filter).count().get_result(&mut *connection)?;
        let rows = filtered(filter)
            .select(AppointmentRow::as_select())
            .order((appointments::scheduled_date.asc(), appointments::id.asc()))
            .offset(i64::try_from(filter.offset()).unwrap_or(i64::MAX))
            .limit(i64::from(filter.limit))
            .load::<AppointmentRow>(&mut *connection)?;

        Ok(AppointmentPage {
            appointments: rows
                .into_iter()
                .map(Appointment::try_from)
                .collect::<Result<_, _>>()?,
            total: total as u64,
        })
    }

    fn update_appointment(
        &self,
        id: Uuid,
        update: AppointmentUpdate,
    ) -> Result<Appointment, BackendError> {
        let mut connection = self.connection.lock()?;

        let row = connection.transaction::<_, BackendError, _>(|connection| {
            let designer: Uuid = appointments::table
                .find(id)
                .select(appointments::designer)
                .first(connection)
                .optional()?
                .ok_or_else(|| BackendError::appointment_not_found(id))?;
            lock_designer(connection, designer)?;

            let mut appointment: Appointment = appointments::table
                .find(id)
                .select(AppointmentRow::as_select())
                .for_update()
                .first(connection)?
                .try_into()?;
            let was_active = appointment.status.is_active();
            let moved = appointment.apply(update)?;

            if appointment.status.is_active() && (moved || !was_active) {
                let candidate = TimeInterval::new(appointment.scheduled_date, appointment.duration)?;
                ensure_free(connection, designer, &candidate, Some(id))?;
            }

            diesel::update(appointments::table.find(id))
                .set(&AppointmentRow::try_from(&appointment)?)
                .returning(AppointmentRow::as_returning())
                .get_result(connection)
                .map_err(map_constraint_violation)
        })?;

        row.try_into()
    }

    fn user(&self, id: Uuid) -> Result<Option<User>, BackendError> {
        let mut connection = self.connection.lock()?;
        users::table
            .find(id)
            .select(UserRow::as_select())
            .first(&mut *connection)
            .optional()?
            .map(User::try_from)
            .transpose()
    }

    fn add_user(&self, user: NewUser) -> Result<User, BackendError> {
        let mut connection = self.connection.lock()?;
        let row = UserRow {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email.to_lowercase(),
            role: user.role.as_str().into(),
            is_active: true,
            created_at: Utc::now(),
        };

        diesel::insert_into(users::table)
            .values(row)
            .returning(UserRow::as_returning())
            .get_result(&mut *connection)
            .map_err(map_constraint_violation)?
            .try_into()
    }

    fn user_count(&self) -> Result<u64, BackendError> {
        let mut connection = self.connection.lock()?;
        let count: i64 = users::table.count().get_result(&mut *connection)?;
        Ok(count as u64)
    }
}
