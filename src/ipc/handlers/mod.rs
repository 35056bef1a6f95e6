pub mod backup;
pub mod core;
pub mod courses;
pub mod dashboard;
pub mod grades;
pub mod students;
