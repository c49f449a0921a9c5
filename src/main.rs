use std::time::Duration;

use crate::{
    backend::AppointmentBackend, configuration::Configuration,
    configuration_handler::ConfigurationHandler, database_interface::DatabaseInterface,
    http::create_app, local_appointments::LocalAppointments, session::SessionKeys, types::NewUser,
    types::Role,
};
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod backend;
mod configuration;
mod configuration_handler;
mod database_interface;
mod error;
mod http;
mod local_appointments;
mod scheduling;
mod schema;
mod session;
#[cfg(test)]
mod testutils;
mod types;

/// Creates the first admin account so someone can provision designers and clients.
fn bootstrap_admin<T: AppointmentBackend, C: Configuration>(backend: &T, configuration: &C) {
    let Some(email) = configuration.bootstrap_admin() else {
        return;
    };

    match backend.user_count() {
        Ok(0) => {}
        Ok(_) => {
            info!("Users exist already, skipping admin bootstrap");
            return;
        }
        Err(err) => {
            error!(?err, "Failed to count users, skipping admin bootstrap");
            return;
        }
    }

    let admin = match backend.add_user(NewUser {
        name: "Administrator".into(),
        email,
        role: Role::Admin,
    }) {
        Ok(admin) => admin,
        Err(err) => {
            error!(?err, "Failed to create admin account");
            return;
        }
    };

    match SessionKeys::new(&configuration.jwt_secret()).issue(&admin) {
        Ok(token) => info!(id = %admin.id, %token, "Admin account created"),
        Err(err) => warn!(?err, "Admin account created but no token could be issued"),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("#########################");
    println!("# Designer Appointments #");
    println!("#########################");

    let configuration = ConfigurationHandler::parse_arguments();

    let address = format!("0.0.0.0:{}", configuration.port());
    println!("Accessable at:\n{}", address.clone());
    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(?err, "Failed to bind {address}");
            return;
        }
    };

    let app = if let Some(database_url) = configuration.database_url() {
        let backend = loop {
            match DatabaseInterface::new(&database_url) {
                Ok(backend) => {
                    info!("Successfully connected to database");
                    break backend;
                }
                Err(err) => {
                    error!(?err, "Failed to establish database connection. Retry in 1 sec. You may want to restart without a database url (impersistent appointments).");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        };
        bootstrap_admin(&backend, &configuration);
        create_app(backend, configuration)
    } else {
        warn!("No database configured, appointments are kept in memory");
        let backend = LocalAppointments::default();
        bootstrap_admin(&backend, &configuration);
        create_app(backend, configuration)
    };

    if let Err(err) = axum::serve(listener, app).await {
        error!(?err, "Server stopped");
    }
}
