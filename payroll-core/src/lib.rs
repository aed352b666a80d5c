pub mod auth;
pub mod calculations;
pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;

pub use auth::{Action, Actor, Role, RoleResolver, StaticRoleResolver, can};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::PayrollConfig;
pub use db::repository::{PayrollRepository, RepositoryError};
pub use engine::{GenerationReport, PayrollEngine, RunSnapshot};
pub use error::PayrollError;
pub use models::*;
