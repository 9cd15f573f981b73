use crate::models::prep_time::PrepTimeState;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerEvent {
    PrepEnded { question_index: usize },
    RecordingEnded { question_index: usize },
}

struct TickTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives a [`PrepTimeState`] with a one-second ticker.
///
/// Only one ticker runs at a time. It is cancelled whenever the question
/// changes, the timers are reset, the driver is torn down, or dropped. Phase
/// ends are reported on the event channel.
pub struct PrepTimer {
    state: Arc<Mutex<PrepTimeState>>,
    events: UnboundedSender<TimerEvent>,
    test_mode: bool,
    task: Option<TickTask>,
}

impl PrepTimer {
    pub fn new(test_mode: bool, events: UnboundedSender<TimerEvent>) -> Self {
        Self {
            state: Arc::new(Mutex::new(PrepTimeState::default())),
            events,
            test_mode,
            task: None,
        }
    }

    pub fn is_test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn snapshot(&self) -> PrepTimeState {
        lock(&self.state).clone()
    }

    pub fn sync_question(
        &mut self,
        assignment_id: Uuid,
        question_index: usize,
        prep_duration: u32,
        recording_duration: u32,
    ) {
        self.cancel_task();
        let mut state = lock(&self.state);
        if self.test_mode {
            state.initialize(assignment_id, question_index, prep_duration, recording_duration);
        } else {
            state.clear();
        }
    }

    pub fn start_prep(&mut self) -> bool {
        if !self.test_mode {
            return false;
        }
        lock(&self.state).start_prep_phase();
        self.spawn_ticker();
        true
    }

    pub fn start_recording(&mut self) -> bool {
        if !self.test_mode {
            return false;
        }
        lock(&self.state).start_recording_phase();
        self.spawn_ticker();
        true
    }

    pub fn reset(&mut self) -> bool {
        if !self.test_mode {
            return false;
        }
        self.cancel_task();
        lock(&self.state).reset_timers();
        true
    }

    pub fn teardown(&mut self) {
        self.cancel_task();
        lock(&self.state).clear();
    }

    fn spawn_ticker(&mut self) {
        self.cancel_task();
        let cancel = CancellationToken::new();
        // Anchored here, not at the task's first poll.
        let interval = tokio::time::interval_at(tokio::time::Instant::now() + TICK, TICK);
        let handle = tokio::spawn(run_ticker(
            self.state.clone(),
            self.events.clone(),
            cancel.clone(),
            interval,
        ));
        self.task = Some(TickTask { cancel, handle });
    }

    fn cancel_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel.cancel();
            task.handle.abort();
        }
    }
}

impl Drop for PrepTimer {
    fn drop(&mut self) {
        self.cancel_task();
    }
}

async fn run_ticker(
    state: Arc<Mutex<PrepTimeState>>,
    events: UnboundedSender<TimerEvent>,
    cancel: CancellationToken,
    mut interval: tokio::time::Interval,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }
        if cancel.is_cancelled() {
            return;
        }

        let (event, keep_running) = {
            let mut s = lock(&state);
            advance(&mut s)
        };
        if let Some(event) = event {
            tracing::debug!(?event, "Timer phase ended");
            let _ = events.send(event);
        }
        if !keep_running {
            return;
        }
    }
}

/// One tick of whichever phase is active.
fn advance(s: &mut PrepTimeState) -> (Option<TimerEvent>, bool) {
    let question_index = s.current_question_index;
    if s.is_prep_time_active {
        s.tick_prep();
        if s.prep_time_remaining == 0 {
            s.end_prep_phase();
            return (Some(TimerEvent::PrepEnded { question_index }), true);
        }
        (None, true)
    } else if s.is_recording_phase_active {
        s.tick_recording();
        if s.recording_time_remaining == 0 {
            s.end_recording_phase();
            return (Some(TimerEvent::RecordingEnded { question_index }), false);
        }
        (None, true)
    } else {
        (None, false)
    }
}

fn lock(state: &Mutex<PrepTimeState>) -> MutexGuard<'_, PrepTimeState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
