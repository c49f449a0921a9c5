use crate::{
    backend::AppointmentBackend,
    error::BackendError,
    scheduling::{conflicts_with_any, TimeInterval},
    types::{
        Appointment, AppointmentFilter, AppointmentPage, AppointmentUpdate, BookedSlot,
        NewAppointment, NewUser, User,
    },
};
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Calendar {
    appointments: HashMap<Uuid, Appointment>,
    users: HashMap<Uuid, User>,
}

impl Calendar {
    fn active_in_range(
        &self,
        designer: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        excluded: Option<Uuid>,
    ) -> Vec<BookedSlot> {
        let mut booked: Vec<BookedSlot> = self
            .appointments
            .values()
            .filter(|appointment| {
                appointment.designer == designer
                    && appointment.status.is_active()
                    && Some(appointment.id) != excluded
                    && appointment.scheduled_date >= range_start
                    && appointment.scheduled_date < range_end
            })
            .map(|appointment| BookedSlot {
                start: appointment.scheduled_date,
                duration: appointment.duration,
            })
            .collect();
        booked.sort_unstable_by_key(|slot| slot.start);
        booked
    }

    fn is_free(
        &self,
        designer: Uuid,
        candidate: &TimeInterval,
        excluded: Option<Uuid>,
    ) -> Result<bool, BackendError> {
        let (range_start, range_end) = candidate.search_window()?;
        let booked = self.active_in_range(designer, range_start, range_end, excluded);
        Ok(!conflicts_with_any(&booked, candidate))
    }
}

/// Impersistent store used when no database is configured.
///
/// A single lock guards the whole calendar, so every conflict check and the
/// write depending on it happen in one critical section.
#[derive(Debug, Clone, Default)]
pub struct LocalAppointments {
    calendar: Arc<Mutex<Calendar>>,
}

impl AppointmentBackend for LocalAppointments {
    fn active_in_range(
        &self,
        designer: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<BookedSlot>, BackendError> {
        let calendar = self.calendar.lock()?;
        Ok(calendar.active_in_range(designer, range_start, range_end, None))
    }

    fn book_appointment(&self, appointment: NewAppointment) -> Result<Appointment, BackendError> {
        let mut calendar = self.calendar.lock()?;

        let candidate = TimeInterval::new(appointment.scheduled_date, appointment.duration)?;
        if !calendar.is_free(appointment.designer, &candidate, None)? {
            warn!(designer = %appointment.designer, start = %candidate.start, "Booking rejected, designer is busy");
            return Err(BackendError::Conflict);
        }

        let appointment = appointment.into_appointment(Uuid::new_v4());
        calendar
            .appointments
            .insert(appointment.id, appointment.clone());
        info!(id = %appointment.id, "Appointment booked");
        Ok(appointment)
    }

    fn appointment(&self, id: Uuid) -> Result<Appointment, BackendError> {
        self.calendar
            .lock()?
            .appointments
            .get(&id)
            .cloned()
            .ok_or_else(|| BackendError::appointment_not_found(id))
    }

    fn appointments(&self, filter: &AppointmentFilter) -> Result<AppointmentPage, BackendError> {
        let calendar = self.calendar.lock()?;

        let mut matching: Vec<&Appointment> = calendar
            .appointments
            .values()
            .filter(|appointment| filter.matches(appointment))
            .collect();
        matching.sort_unstable_by_key(|appointment| (appointment.scheduled_date, appointment.id));

        let total = matching.len() as u64;
        let appointments = matching
            .into_iter()
            .skip(usize::try_from(filter.offset()).unwrap_or(usize::MAX))
            .take(filter.limit as usize)
            .cloned()
            .collect();
        Ok(AppointmentPage {
            appointments,
            total,
        })
    }

    fn update_appointment(
        &self,
        id: Uuid,
        update: AppointmentUpdate,
    ) -> Result<Appointment, BackendError> {
        let mut calendar = self.calendar.lock()?;

        let mut appointment = calendar
            .appointments
            .get(&id)
            .cloned()
            .ok_or_else(|| BackendError::appointment_not_found(id))?;
        let was_active = appointment.status.is_active();
        let moved = appointment.apply(update)?;

        if appointment.status.is_active() && (moved || !was_active) {
            let candidate = TimeInterval::new(appointment.scheduled_date, appointment.duration)?;
            if !calendar.is_free(appointment.designer, &candidate, Some(id))? {
                warn!(%id, start = %candidate.start, "Reschedule rejected, designer is busy");
                return Err(BackendError::Conflict);
            }
        }

        calendar.appointments.insert(id, appointment.clone());
        Ok(appointment)
    }

    fn user(&self, id: Uuid) -> Result<Option<User>, BackendError> {
        Ok(self.calendar.lock()?.users.get(&id).cloned())
    }

    fn add_user(&self, user: NewUser) -> Result<User, BackendError> {
        let mut calendar = self.calendar.lock()?;

        let email = user.email.to_lowercase();
        if calendar.users.values().any(|existing| existing.email == email) {
            return Err(BackendError::DuplicateUser(email));
        }

        let user = User {
            id: Uuid::new_v4(),
            name: user.name,
            email,
            role: user.role,
            is_active: true,
        };
        calendar.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn user_count(&self) -> Result<u64, BackendError> {
        Ok(self.calendar.lock()?.users.len() as u64)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        testutils::{designer_and_client, new_appointment},
        types::{AppointmentStatus, Role},
    };
    use chrono::Duration;
    use std::thread;

    fn tomorrow_at(hour: i64) -> DateTime<Utc> {
        let midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        midnight + Duration::days(1) + Duration::hours(hour)
    }

    #[test]
    fn test_book_and_read_single_appointment() {
        let backend = LocalAppointments::default();
        let (designer, client) = designer_and_client(&backend);

        let appointment = backend
            .book_appointment(new_appointment(designer.id, client.id, tomorrow_at(10), 60))
            .unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Scheduled);
        assert_eq!(backend.appointment(appointment.id).unwrap(), appointment);

        backend.appointment(Uuid::new_v4()).unwrap_err();
    }

    #[test]
    fn test_overlapping_booking_is_rejected() {
        let backend = LocalAppointments::default();
        let (designer, client) = designer_and_client(&backend);

        backend
            .book_appointment(new_appointment(designer.id, client.id, tomorrow_at(10), 90))
            .unwrap();
        let err = backend
            .book_appointment(new_appointment(
                designer.id,
                client.id,
                tomorrow_at(11),
                60,
            ))
            .unwrap_err();
        assert!(matches!(err, BackendError::Conflict));

        backend
            .book_appointment(new_appointment(
                designer.id,
                client.id,
                tomorrow_at(10) + Duration::minutes(90),
                60,
            ))
            .unwrap();
    }

    #[test]
    fn test_concurrent_identical_bookings_admit_one() {
        let backend = LocalAppointments::default();
        let (designer, client) = designer_and_client(&backend);
        let start = tomorrow_at(14);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let backend = backend.clone();
                thread::spawn(move || {
                    backend.book_appointment(new_appointment(designer.id, client.id, start, 60))
                })
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(Result::is_ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[test]
    fn test_reschedule_checks_conflicts_but_ignores_itself() {
        let backend = LocalAppointments::default();
        let (designer, client) = designer_and_client(&backend);

        let first = backend
            .book_appointment(new_appointment(designer.id, client.id, tomorrow_at(10), 60))
            .unwrap();
        backend
            .book_appointment(new_appointment(designer.id, client.id, tomorrow_at(12), 60))
            .unwrap();

        let moved = backend
            .update_appointment(
                first.id,
                AppointmentUpdate {
                    scheduled_date: Some(tomorrow_at(10) + Duration::minutes(30)),
                    ..AppointmentUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(moved.scheduled_date, tomorrow_at(10) + Duration::minutes(30));

        let err = backend
            .update_appointment(
                first.id,
                AppointmentUpdate {
                    duration: Some(120),
                    ..AppointmentUpdate::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::Conflict));
        assert_eq!(backend.appointment(first.id).unwrap().duration, 60);
    }

    #[test]
    fn test_cancel_keeps_the_record() {
        let backend = LocalAppointments::default();
        let (designer, client) = designer_and_client(&backend);

        let appointment = backend
            .book_appointment(new_appointment(designer.id, client.id, tomorrow_at(9), 60))
            .unwrap();
        let cancelled = backend
            .update_status(appointment.id, AppointmentStatus::Cancelled)
            .unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert_eq!(
            backend.appointment(appointment.id).unwrap().status,
            AppointmentStatus::Cancelled
        );

        backend
            .update_status(appointment.id, AppointmentStatus::Confirmed)
            .unwrap_err();
    }

    #[test]
    fn test_filter_and_paginate() {
        let backend = LocalAppointments::default();
        let (designer, client) = designer_and_client(&backend);
        let stranger = backend
            .add_user(NewUser {
                name: String::from("Stranger"),
                email: String::from("stranger@example.com"),
                role: Role::User,
            })
            .unwrap();

        for hour in [15, 9, 12] {
            backend
                .book_appointment(new_appointment(designer.id, client.id, tomorrow_at(hour), 60))
                .unwrap();
        }

        let page = backend
            .appointments(&AppointmentFilter {
                participant: Some(client.id),
                page: 1,
                limit: 2,
                ..AppointmentFilter::default()
            })
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.appointments.len(), 2);
        assert_eq!(page.appointments[0].scheduled_date, tomorrow_at(9));
        assert_eq!(page.appointments[1].scheduled_date, tomorrow_at(12));

        let page = backend
            .appointments(&AppointmentFilter {
                participant: Some(client.id),
                page: 2,
                limit: 2,
                ..AppointmentFilter::default()
            })
            .unwrap();
        assert_eq!(page.appointments.len(), 1);
        assert_eq!(page.appointments[0].scheduled_date, tomorrow_at(15));

        let page = backend
            .appointments(&AppointmentFilter {
                participant: Some(stranger.id),
                page: 1,
                limit: 10,
                ..AppointmentFilter::default()
            })
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn test_duplicate_user_email_is_rejected() {
        let backend = LocalAppointments::default();
        let user = NewUser {
            name: String::from("Ana"),
            email: String::from("Ana@Example.com"),
            role: Role::Designer,
        };
        let created = backend.add_user(user.clone()).unwrap();
        assert_eq!(created.email, "ana@example.com");
        assert_eq!(backend.user(created.id).unwrap(), Some(created));

        backend.add_user(user).unwrap_err();
        assert_eq!(backend.user_count().unwrap(), 1);
    }

    #[test]
    fn test_out_of_range_edit_leaves_store_usable() {
        let backend = LocalAppointments::default();
        let (designer, client) = designer_and_client(&backend);
        let appointment = backend
            .book_appointment(new_appointment(designer.id, client.id, tomorrow_at(10), 60))
            .unwrap();
        let last_hour = DateTime::<Utc>::MAX_UTC - Duration::hours(1);

        let err = backend
            .update_appointment(
                appointment.id,
                AppointmentUpdate {
                    scheduled_date: Some(last_hour),
                    duration: Some(480),
                    ..AppointmentUpdate::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::OutOfRange(_)));

        let err = backend
            .book_appointment(new_appointment(designer.id, client.id, last_hour, 480))
            .unwrap_err();
        assert!(matches!(err, BackendError::OutOfRange(_)));

        assert_eq!(backend.appointment(appointment.id).unwrap(), appointment);
        assert_eq!(backend.user_count().unwrap(), 2);
        backend
            .book_appointment(new_appointment(designer.id, client.id, tomorrow_at(12), 60))
            .unwrap();
    }

    #[test]
    fn test_page_far_past_the_end_is_empty() {
        let backend = LocalAppointments::default();
        let (designer, client) = designer_and_client(&backend);
        backend
            .book_appointment(new_appointment(designer.id, client.id, tomorrow_at(10), 60))
            .unwrap();

        let page = backend
            .appointments(&AppointmentFilter {
                page: u32::MAX,
                limit: 100,
                ..AppointmentFilter::default()
            })
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(page.appointments.is_empty());
    }
}
