pub mod practice_dto;
pub mod relay_dto;
pub mod submission_dto;
