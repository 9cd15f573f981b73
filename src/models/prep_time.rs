use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Countdown state for the prep → recording sequence of one question.
///
/// At most one of the two phase flags is set. Remaining counters never go
/// below zero; ticking an inactive or exhausted phase leaves the state alone.
/// Deciding when a phase is over is left to the caller (see
/// `services::prep_timer_service`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepTimeState {
    pub current_assignment_id: Option<Uuid>,
    pub current_question_index: usize,
    pub is_prep_time_active: bool,
    pub is_recording_phase_active: bool,
    pub prep_time_remaining: u32,
    pub recording_time_remaining: u32,
    pub prep_time_duration: u32,
    pub recording_time_duration: u32,
}

impl PrepTimeState {
    pub fn initialize(
        &mut self,
        assignment_id: Uuid,
        question_index: usize,
        prep_duration: u32,
        recording_duration: u32,
    ) {
        *self = Self {
            current_assignment_id: Some(assignment_id),
            current_question_index: question_index,
            is_prep_time_active: false,
            is_recording_phase_active: false,
            prep_time_remaining: prep_duration,
            recording_time_remaining: recording_duration,
            prep_time_duration: prep_duration,
            recording_time_duration: recording_duration,
        };
    }

    pub fn start_prep_phase(&mut self) {
        self.is_prep_time_active = true;
        self.is_recording_phase_active = false;
        self.prep_time_remaining = self.prep_time_duration;
    }

    pub fn tick_prep(&mut self) {
        if self.is_prep_time_active && self.prep_time_remaining > 0 {
            self.prep_time_remaining -= 1;
        }
    }

    pub fn end_prep_phase(&mut self) {
        self.start_recording_phase();
    }

    pub fn start_recording_phase(&mut self) {
        self.is_prep_time_active = false;
        self.is_recording_phase_active = true;
        self.recording_time_remaining = self.recording_time_duration;
    }

    pub fn tick_recording(&mut self) {
        if self.is_recording_phase_active && self.recording_time_remaining > 0 {
            self.recording_time_remaining -= 1;
        }
    }

    // Prep is not re-armed.
    pub fn end_recording_phase(&mut self) {
        self.is_recording_phase_active = false;
    }

    pub fn reset_timers(&mut self) {
        self.is_prep_time_active = false;
        self.is_recording_phase_active = false;
        self.prep_time_remaining = self.prep_time_duration;
        self.recording_time_remaining = self.recording_time_duration;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_idle(&self) -> bool {
        !self.is_prep_time_active && !self.is_recording_phase_active
    }

    pub fn is_prep_time_complete(&self) -> bool {
        self.prep_time_remaining == 0 && !self.is_prep_time_active
    }

    pub fn can_start_recording(&self) -> bool {
        self.prep_time_remaining == 0 || self.is_recording_phase_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initialized(prep: u32, recording: u32) -> PrepTimeState {
        let mut state = PrepTimeState::default();
        state.initialize(Uuid::new_v4(), 2, prep, recording);
        state
    }

    #[test]
    fn initialize_arms_both_counters_and_stays_idle() {
        let state = initialized(30, 60);
        assert_eq!(state.current_question_index, 2);
        assert_eq!(state.prep_time_remaining, 30);
        assert_eq!(state.recording_time_remaining, 60);
        assert!(state.is_idle());
    }

    #[test]
    fn tick_prep_is_ignored_while_prep_inactive() {
        let mut state = initialized(10, 20);
        for _ in 0..25 {
            state.tick_prep();
        }
        assert_eq!(state.prep_time_remaining, 10);

        state.start_prep_phase();
        state.end_prep_phase();
        state.tick_prep();
        assert_eq!(state.prep_time_remaining, 10);
    }

    #[test]
    fn prep_countdown_stops_at_zero() {
        for n in [0u32, 1, 5, 42] {
            let mut state = initialized(n, 20);
            state.start_prep_phase();
            for _ in 0..n {
                state.tick_prep();
            }
            assert_eq!(state.prep_time_remaining, 0);
            state.tick_prep();
            assert_eq!(state.prep_time_remaining, 0);
            assert!(state.is_prep_time_active);
        }
    }

    #[test]
    fn end_prep_phase_is_idempotent() {
        let mut once = initialized(5, 45);
        once.start_prep_phase();
        once.tick_prep();
        let mut twice = once.clone();

        once.end_prep_phase();
        twice.end_prep_phase();
        twice.end_prep_phase();

        assert_eq!(once, twice);
        assert!(once.is_recording_phase_active);
        assert!(!once.is_prep_time_active);
        assert_eq!(once.recording_time_remaining, 45);
    }

    #[test]
    fn recording_countdown_and_end() {
        let mut state = initialized(0, 2);
        state.start_recording_phase();
        state.tick_recording();
        state.tick_recording();
        state.tick_recording();
        assert_eq!(state.recording_time_remaining, 0);

        state.end_recording_phase();
        assert!(state.is_idle());
        state.tick_recording();
        assert_eq!(state.recording_time_remaining, 0);
    }

    #[test]
    fn reset_restores_durations_and_clear_zeroes_everything() {
        let mut state = initialized(8, 9);
        state.start_prep_phase();
        state.tick_prep();
        state.end_prep_phase();
        state.tick_recording();

        state.reset_timers();
        assert!(state.is_idle());
        assert_eq!(state.prep_time_remaining, 8);
        assert_eq!(state.recording_time_remaining, 9);
        assert_eq!(state.prep_time_duration, 8);

        state.clear();
        assert_eq!(state, PrepTimeState::default());
    }

    #[test]
    fn derived_flags() {
        let mut state = initialized(1, 5);
        assert!(!state.can_start_recording());
        state.start_prep_phase();
        state.tick_prep();
        assert!(!state.is_prep_time_complete());
        state.end_prep_phase();
        assert!(state.is_prep_time_complete());
        assert!(state.can_start_recording());
    }
}
