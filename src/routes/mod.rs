pub mod health;
pub mod notifications;
pub mod practice;
pub mod relay;
pub mod submission;
