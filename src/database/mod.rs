pub mod assignment_repo;
pub mod pool;
pub mod progress_repo;
pub mod submission_repo;
