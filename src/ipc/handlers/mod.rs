pub mod changes;
pub mod core;
pub mod courses;
pub mod lecturers;
pub mod promotion;
pub mod results;
pub mod students;
pub mod table;
