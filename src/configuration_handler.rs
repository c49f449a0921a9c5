use crate::{configuration::Configuration, scheduling::WorkingHours};
use clap::{error::ErrorKind, CommandFactory, Parser};
use tracing::warn;

const DEVELOPMENT_SECRET: &str = "development-secret-change-me";

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Appointment booking service for interior designers")]
pub struct ConfigurationHandler {
    /// Port the HTTP server listens on
    #[arg(long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// PostgreSQL connection URL. Appointments are kept in memory when omitted
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Secret used to sign and verify session tokens
    #[arg(long, env = "JWT_SECRET")]
    jwt_secret: Option<String>,

    /// Origin allowed to call the API from a browser
    #[arg(long, env = "FRONTEND_URL", default_value = "http://localhost:5173")]
    frontend_url: String,

    #[arg(long, env = "WORK_START_HOUR", default_value_t = 9, value_parser = clap::value_parser!(u32).range(0..24))]
    work_start_hour: u32,

    #[arg(long, env = "WORK_END_HOUR", default_value_t = 18, value_parser = clap::value_parser!(u32).range(1..=24))]
    work_end_hour: u32,

    #[arg(long, env = "SLOT_MINUTES", default_value_t = 60, value_parser = clap::value_parser!(u32).range(15..=480))]
    slot_minutes: u32,

    /// Email of an admin account created when the user store is empty
    #[arg(long, env = "BOOTSTRAP_ADMIN")]
    bootstrap_admin: Option<String>,
}

impl ConfigurationHandler {
    pub fn parse_arguments() -> Self {
        if let Err(err) = dotenvy::dotenv() {
            warn!(?err, "No .env file loaded");
        }
        Self::parse().validated().unwrap_or_else(|err| err.exit())
    }

    /// Rejects working hours that leave no room for a single slot.
    fn validated(self) -> Result<Self, clap::Error> {
        if self.work_start_hour >= self.work_end_hour {
            return Err(Self::command().error(
                ErrorKind::ValueValidation,
                format!(
                    "--work-start-hour ({}) must be before --work-end-hour ({})",
                    self.work_start_hour, self.work_end_hour
                ),
            ));
        }
        if (self.work_end_hour - self.work_start_hour) * 60 < self.slot_minutes {
            return Err(Self::command().error(
                ErrorKind::ValueValidation,
                format!(
                    "--slot-minutes ({}) does not fit between {}:00 and {}:00",
                    self.slot_minutes, self.work_start_hour, self.work_end_hour
                ),
            ));
        }
        Ok(self)
    }
}

impl Configuration for ConfigurationHandler {
    fn port(&self) -> u16 {
        self.port
    }

    fn database_url(&self) -> Option<String> {
        self.database_url.clone()
    }

    fn jwt_secret(&self) -> String {
        self.jwt_secret.clone().unwrap_or_else(|| {
            warn!("JWT_SECRET not set, using an insecure development secret");
            DEVELOPMENT_SECRET.into()
        })
    }

    fn frontend_url(&self) -> String {
        self.frontend_url.clone()
    }

    fn working_hours(&self) -> WorkingHours {
        WorkingHours {
            start_hour: self.work_start_hour,
            end_hour: self.work_end_hour,
            slot_minutes: self.slot_minutes,
        }
    }

    fn bootstrap_admin(&self) -> Option<String> {
        self.bootstrap_admin.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    fn parse(args: &[&str]) -> Result<ConfigurationHandler, clap::Error> {
        ConfigurationHandler::try_parse_from(
            ["designer_appointments", "--jwt-secret", "secret"]
                .iter()
                .chain(args)
                .copied(),
        )?
        .validated()
    }

    #[test]
    fn test_defaults_match_fixed_working_day() {
        let configuration = parse(&[]).unwrap();
        assert_eq!(configuration.port(), 5000);
        assert_eq!(configuration.jwt_secret(), "secret");
        assert_eq!(configuration.frontend_url(), "http://localhost:5173");
        assert_eq!(configuration.working_hours(), WorkingHours::default());
    }

    #[test]
    fn test_working_hours_are_configurable() {
        let configuration = parse(&[
            "--work-start-hour",
            "8",
            "--work-end-hour",
            "12",
            "--slot-minutes",
            "30",
        ])
        .unwrap();
        assert_eq!(
            configuration.working_hours(),
            WorkingHours {
                start_hour: 8,
                end_hour: 12,
                slot_minutes: 30,
            }
        );
    }

    #[test_case(&["--slot-minutes", "5"] ; "slot too short")]
    #[test_case(&["--work-start-hour", "18", "--work-end-hour", "9"] ; "start after end")]
    #[test_case(&["--work-start-hour", "12", "--work-end-hour", "12"] ; "empty day")]
    #[test_case(&["--work-start-hour", "17", "--work-end-hour", "18", "--slot-minutes", "90"] ; "slot longer than day")]
    fn test_invalid_working_hours_are_rejected(args: &[&str]) {
        parse(args).unwrap_err();
    }
}
