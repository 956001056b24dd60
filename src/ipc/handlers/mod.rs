pub mod attendance;
pub mod backup_restore;
pub mod bursary;
pub mod classes;
pub mod core;
pub mod reports;
pub mod scores;
pub mod settings;
pub mod staff;
pub mod students;
