use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    backend::AppointmentBackend,
    configuration::Configuration,
    error::BackendError,
    scheduling::WorkingHours,
    types::{
        Appointment, AppointmentFilter, AppointmentKind, AppointmentPage, AppointmentUpdate,
        BookedSlot, Location, NewAppointment, NewUser, Role, User,
    },
};

#[derive(Clone, Default)]
pub struct TestConfiguration;

impl Configuration for TestConfiguration {
    fn port(&self) -> u16 {
        0
    }

    fn database_url(&self) -> Option<String> {
        None
    }

    fn jwt_secret(&self) -> String {
        "test-secret".into()
    }

    fn frontend_url(&self) -> String {
        "http://localhost:5173".into()
    }

    fn working_hours(&self) -> WorkingHours {
        WorkingHours::default()
    }

    fn bootstrap_admin(&self) -> Option<String> {
        None
    }
}

pub fn new_appointment(
    designer: Uuid,
    client: Uuid,
    scheduled_date: DateTime<Utc>,
    duration: u32,
) -> NewAppointment {
    NewAppointment {
        client,
        designer,
        project: None,
        title: String::from("Living room consultation"),
        description: None,
        kind: AppointmentKind::Consultation,
        scheduled_date,
        duration,
        location: Location::default(),
    }
}

pub fn designer_and_client<T: AppointmentBackend>(backend: &T) -> (User, User) {
    let designer = backend
        .add_user(NewUser {
            name: String::from("Dana Designer"),
            email: String::from("dana@example.com"),
            role: Role::Designer,
        })
        .unwrap();
    let client = backend
        .add_user(NewUser {
            name: String::from("Chris Client"),
            email: String::from("chris@example.com"),
            role: Role::User,
        })
        .unwrap();
    (designer, client)
}

pub struct MockAppointmentBackendInner {
    pub success: AtomicBool,
    pub calls_to_active_in_range: AtomicU64,
    pub calls_to_book_appointment: AtomicU64,
    pub calls_to_appointment: AtomicU64,
    pub calls_to_appointments: AtomicU64,
    pub calls_to_update_appointment: AtomicU64,
    pub appointment: Mutex<Option<Appointment>>,
    pub users: Mutex<HashMap<Uuid, User>>,
}

/// Counts calls and answers with canned data. Users behave like a real store
/// so sessions can be resolved.
#[derive(Clone)]
pub struct MockAppointmentBackend(pub Arc<MockAppointmentBackendInner>);

impl MockAppointmentBackendInner {
    fn new() -> Self {
        Self {
            success: AtomicBool::new(true),
            calls_to_active_in_range: AtomicU64::default(),
            calls_to_book_appointment: AtomicU64::default(),
            calls_to_appointment: AtomicU64::default(),
            calls_to_appointments: AtomicU64::default(),
            calls_to_update_appointment: AtomicU64::default(),
            appointment: Mutex::default(),
            users: Mutex::default(),
        }
    }
}

impl MockAppointmentBackend {
    pub fn new() -> Self {
        Self(Arc::new(MockAppointmentBackendInner::new()))
    }

    fn result(&self) -> Result<(), BackendError> {
        match self.0.success.load(Ordering::SeqCst) {
            true => Ok(()),
            false => Err(BackendError::Corrupt("Supposed to fail".into())),
        }
    }

    fn canned(&self, id: Uuid) -> Result<Appointment, BackendError> {
        self.result()?;
        self.0
            .appointment
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BackendError::appointment_not_found(id))
    }
}

impl AppointmentBackend for MockAppointmentBackend {
    fn active_in_range(
        &self,
        _designer: Uuid,
        _range_start: DateTime<Utc>,
        _range_end: DateTime<Utc>,
    ) -> Result<Vec<BookedSlot>, BackendError> {
        self.0
            .calls_to_active_in_range
            .fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(vec![])
    }

    fn book_appointment(&self, appointment: NewAppointment) -> Result<Appointment, BackendError> {
        self.0
            .calls_to_book_appointment
            .fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(appointment.into_appointment(Uuid::new_v4()))
    }

    fn appointment(&self, id: Uuid) -> Result<Appointment, BackendError> {
        self.0.calls_to_appointment.fetch_add(1, Ordering::SeqCst);
        self.canned(id)
    }

    fn appointments(&self, _filter: &AppointmentFilter) -> Result<AppointmentPage, BackendError> {
        self.0.calls_to_appointments.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        let appointments: Vec<_> = self.0.appointment.lock().unwrap().iter().cloned().collect();
        Ok(AppointmentPage {
            total: appointments.len() as u64,
            appointments,
        })
    }

    fn update_appointment(
        &self,
        id: Uuid,
        update: AppointmentUpdate,
    ) -> Result<Appointment, BackendError> {
        self.0
            .calls_to_update_appointment
            .fetch_add(1, Ordering::SeqCst);
        let mut appointment = self.canned(id)?;
        appointment.apply(update)?;
        Ok(appointment)
    }

    fn user(&self, id: Uuid) -> Result<Option<User>, BackendError> {
        Ok(self.0.users.lock().unwrap().get(&id).cloned())
    }

    fn add_user(&self, user: NewUser) -> Result<User, BackendError> {
        let user = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            role: user.role,
            is_active: true,
        };
        self.0.users.lock().unwrap().insert(user.id, user.clone());
        Ok(user)
    }

    fn user_count(&self) -> Result<u64, BackendError> {
        Ok(self.0.users.lock().unwrap().len() as u64)
    }
}
