use crate::scheduling::WorkingHours;

pub trait Configuration: Clone + Send + Sync + 'static {
    fn port(&self) -> u16;
    fn database_url(&self) -> Option<String>;
    fn jwt_secret(&self) -> String;
    fn frontend_url(&self) -> String;
    fn working_hours(&self) -> WorkingHours;
    fn bootstrap_admin(&self) -> Option<String>;
}
