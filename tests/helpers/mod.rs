pub mod builders;
pub mod db;

pub use builders::{AppointmentBuilder, ModuleBuilder, UserBuilder};
pub use db::TestDb;
