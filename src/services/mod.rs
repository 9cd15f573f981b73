pub mod analysis_service;
pub mod navigation_service;
pub mod notification_service;
pub mod practice_session_service;
pub mod prep_timer_service;
pub mod room_token_service;
pub mod submission_service;
