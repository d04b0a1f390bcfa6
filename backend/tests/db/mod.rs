// Database integration tests module
pub mod attendance_test;
pub mod core_test;
pub mod grades_test;
pub mod rooms_test;
pub mod users_test;
