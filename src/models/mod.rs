pub mod assignment;
pub mod prep_time;
pub mod progress;
pub mod submission;
