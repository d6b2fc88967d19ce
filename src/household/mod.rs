pub mod environment;
pub mod loader;
pub mod person;

pub use environment::{Device, Environment, PropertyState, StateChange};
pub use person::{Person, ScheduleEntry};
