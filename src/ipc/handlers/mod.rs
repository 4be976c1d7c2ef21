pub mod backup;
pub mod bonuses;
pub mod classes;
pub mod core;
pub mod grades;
pub mod rankings;
pub mod reports;
pub mod setup;
pub mod students;
