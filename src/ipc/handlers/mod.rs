pub mod classrooms;
pub mod core;
pub mod grades;
pub mod submissions;
pub mod tasks;
