use crate::error::{Error, Result};
use crate::models::assignment::Assignment;
use crate::models::prep_time::PrepTimeState;
use crate::models::progress::PracticeProgress;
use crate::services::navigation_service::{PendingProgress, ProgressStore, QuestionNavigator};
use crate::services::prep_timer_service::{PrepTimer, TimerEvent};
use crate::utils::time::format_countdown;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

pub type SharedSession = Arc<LiveSession>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationAction {
    Next,
    Previous,
    Goto,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub assignment_id: Uuid,
    pub test_mode: bool,
    pub has_test_started: bool,
    pub current_question_index: usize,
    pub total_questions: usize,
    pub is_first_question: bool,
    pub is_last_question: bool,
    pub completed_questions: BTreeSet<String>,
    pub timer: PrepTimeState,
    pub prep_time_display: String,
    pub recording_time_display: String,
    pub is_prep_time_complete: bool,
    pub can_start_recording: bool,
}

/// One student working through one assignment.
pub struct PracticeSession {
    id: Uuid,
    student_id: Uuid,
    assignment: Assignment,
    navigator: QuestionNavigator,
    timer: PrepTimer,
}

impl PracticeSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn student_id(&self) -> Uuid {
        self.student_id
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let timer = self.timer.snapshot();
        // Outside test mode the countdowns are meaningless.
        let test_mode = self.timer.is_test_mode();
        SessionSnapshot {
            session_id: self.id,
            assignment_id: self.assignment.id,
            test_mode,
            has_test_started: self.navigator.has_test_started(),
            current_question_index: self.navigator.current_question_index(),
            total_questions: self.navigator.total_questions(),
            is_first_question: self.navigator.is_first_question(),
            is_last_question: self.navigator.is_last_question(),
            completed_questions: self.navigator.completed_questions().clone(),
            prep_time_display: format_countdown(timer.prep_time_remaining),
            recording_time_display: format_countdown(timer.recording_time_remaining),
            is_prep_time_complete: !test_mode || timer.is_prep_time_complete(),
            can_start_recording: !test_mode || timer.can_start_recording(),
            timer,
        }
    }

    pub fn start_prep(&mut self) -> bool {
        let started = self.timer.start_prep();
        if started {
            self.navigator.set_test_started(true);
        }
        started
    }

    pub fn start_recording(&mut self) -> bool {
        let started = self.timer.start_recording();
        if started {
            self.navigator.set_test_started(true);
        }
        started
    }

    pub fn reset_timers(&mut self) -> bool {
        self.timer.reset()
    }

    pub fn navigate(&mut self, action: NavigationAction, index: Option<usize>) -> Result<bool> {
        let moved = match action {
            NavigationAction::Next => self.navigator.go_to_next(),
            NavigationAction::Previous => self.navigator.go_to_previous(),
            NavigationAction::Goto => {
                let index = index.ok_or_else(|| {
                    Error::BadRequest("index is required for goto".to_string())
                })?;
                self.navigator.go_to_question(index)
            }
        };
        if moved {
            self.sync_timer();
        }
        Ok(moved)
    }

    /// Marks a question answered and moves on unless it was the last one.
    pub fn complete_question(&mut self, question_id: &str) -> Result<()> {
        if !self
            .assignment
            .questions()
            .iter()
            .any(|q| q.id == question_id)
        {
            return Err(Error::NotFound(format!("Question {} not found", question_id)));
        }
        self.navigator.mark_completed(question_id);
        if self.navigator.go_to_next() {
            self.sync_timer();
        }
        Ok(())
    }

    pub fn teardown(&mut self) {
        self.timer.teardown();
        self.navigator.set_test_started(false);
    }

    fn on_timer_event(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::PrepEnded { question_index } => {
                tracing::debug!(session_id = %self.id, question_index, "Prep time over, recording");
            }
            TimerEvent::RecordingEnded { question_index } => {
                if question_index != self.navigator.current_question_index() {
                    return;
                }
                let Some(question_id) = self
                    .assignment
                    .questions()
                    .get(question_index)
                    .map(|q| q.id.clone())
                else {
                    return;
                };
                tracing::info!(session_id = %self.id, question_index, "Recording time over");
                if let Err(e) = self.complete_question(&question_id) {
                    tracing::warn!(session_id = %self.id, error = %e, "Could not complete question");
                }
            }
        }
    }

    fn sync_timer(&mut self) {
        let index = self.navigator.current_question_index();
        let Some(question) = self.assignment.questions().get(index) else {
            self.timer.teardown();
            return;
        };
        self.timer.sync_question(
            self.assignment.id,
            index,
            question.prep_seconds(),
            question.recording_seconds(),
        );
    }
}

/// A session behind its lock. Progress writes are claimed under the lock and
/// sent to the store after it is released, one at a time and in claim order.
pub struct LiveSession {
    state: tokio::sync::Mutex<PracticeSession>,
    progress: Arc<dyn ProgressStore>,
    last_attempted_seq: tokio::sync::Mutex<u64>,
}

impl LiveSession {
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, PracticeSession> {
        self.state.lock().await
    }

    pub async fn navigate(
        &self,
        action: NavigationAction,
        index: Option<usize>,
    ) -> Result<(bool, SessionSnapshot)> {
        let (moved, snapshot, pending) = {
            let mut session = self.state.lock().await;
            let moved = session.navigate(action, index)?;
            let pending = session.navigator.pending_progress();
            (moved, session.snapshot(), pending)
        };
        self.flush(pending).await;
        Ok((moved, snapshot))
    }

    pub async fn complete_question(&self, question_id: &str) -> Result<SessionSnapshot> {
        let (snapshot, pending) = {
            let mut session = self.state.lock().await;
            session.complete_question(question_id)?;
            let pending = session.navigator.pending_progress();
            (session.snapshot(), pending)
        };
        self.flush(pending).await;
        Ok(snapshot)
    }

    async fn on_timer_event(&self, event: TimerEvent) {
        let pending = {
            let mut session = self.state.lock().await;
            session.on_timer_event(event);
            session.navigator.pending_progress()
        };
        self.flush(pending).await;
    }

    async fn flush(&self, pending: Option<PendingProgress>) {
        let Some(pending) = pending else { return };
        let mut last_attempted = self.last_attempted_seq.lock().await;
        // A newer claim already went out.
        if pending.seq <= *last_attempted {
            return;
        }
        *last_attempted = pending.seq;
        let result = pending.write(self.progress.as_ref()).await;
        drop(last_attempted);

        if let Err(e) = result {
            tracing::debug!(error = %e, "Progress store rejected write");
            self.state.lock().await.navigator.write_failed(&pending);
        }
    }
}

struct SessionEntry {
    student_id: Uuid,
    assignment_id: Uuid,
    session: SharedSession,
    last_seen: Instant,
}

#[derive(Default)]
struct Registry {
    by_id: HashMap<Uuid, SessionEntry>,
    by_owner: HashMap<(Uuid, Uuid), Uuid>,
}

impl Registry {
    fn remove(&mut self, session_id: Uuid) -> Option<SessionEntry> {
        let entry = self.by_id.remove(&session_id)?;
        let owner = (entry.student_id, entry.assignment_id);
        if self.by_owner.get(&owner) == Some(&session_id) {
            self.by_owner.remove(&owner);
        }
        Some(entry)
    }
}

/// Owns the live practice sessions of this process. A student has at most
/// one session per assignment.
#[derive(Clone)]
pub struct PracticeSessionService {
    registry: Arc<Mutex<Registry>>,
    progress: Arc<dyn ProgressStore>,
}

impl PracticeSessionService {
    pub fn new(progress: Arc<dyn ProgressStore>) -> Self {
        Self {
            registry: Arc::default(),
            progress,
        }
    }

    /// Starts a session, replacing and tearing down the student's previous
    /// session for the same assignment.
    pub async fn create(
        &self,
        assignment: Assignment,
        student_id: Uuid,
        test_mode: bool,
        initial: PracticeProgress,
        is_completed: bool,
    ) -> SharedSession {
        let (tx, mut rx) = unbounded_channel();
        let assignment_id = assignment.id;
        let mut navigator = QuestionNavigator::new(
            assignment_id,
            student_id,
            assignment.questions().len(),
            initial,
            test_mode,
        );
        navigator.set_completed(is_completed);

        let id = Uuid::new_v4();
        let mut session = PracticeSession {
            id,
            student_id,
            assignment,
            navigator,
            timer: PrepTimer::new(test_mode, tx),
        };
        session.sync_timer();
        let shared = Arc::new(LiveSession {
            state: tokio::sync::Mutex::new(session),
            progress: self.progress.clone(),
            last_attempted_seq: tokio::sync::Mutex::new(0),
        });

        let weak = Arc::downgrade(&shared);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(session) = weak.upgrade() else { break };
                session.on_timer_event(event).await;
            }
        });

        let replaced = {
            let mut registry = self.lock_registry();
            let replaced = registry
                .by_owner
                .insert((student_id, assignment_id), id)
                .and_then(|old| registry.by_id.remove(&old));
            registry.by_id.insert(
                id,
                SessionEntry {
                    student_id,
                    assignment_id,
                    session: shared.clone(),
                    last_seen: Instant::now(),
                },
            );
            replaced
        };
        if let Some(old) = replaced {
            let mut old = old.session.lock().await;
            old.teardown();
            tracing::info!(session_id = %old.id(), "Practice session replaced");
        }
        tracing::info!(session_id = %id, %student_id, test_mode, "Practice session created");
        shared
    }

    pub fn get(&self, session_id: Uuid, student_id: Uuid) -> Result<SharedSession> {
        let mut registry = self.lock_registry();
        let entry = registry
            .by_id
            .get_mut(&session_id)
            .filter(|entry| entry.student_id == student_id)
            .ok_or_else(|| Error::NotFound("Practice session not found".to_string()))?;
        entry.last_seen = Instant::now();
        Ok(entry.session.clone())
    }

    pub async fn remove(&self, session_id: Uuid, student_id: Uuid) -> Result<()> {
        self.get(session_id, student_id)?;
        let entry = self.lock_registry().remove(session_id);
        if let Some(entry) = entry {
            entry.session.lock().await.teardown();
            tracing::info!(%session_id, "Practice session closed");
        }
        Ok(())
    }

    /// Tears down sessions nobody has touched for `max_idle`. Returns how
    /// many were dropped.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let evicted: Vec<(Uuid, SessionEntry)> = {
            let mut registry = self.lock_registry();
            let stale: Vec<Uuid> = registry
                .by_id
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_seen) >= max_idle)
                .map(|(id, _)| *id)
                .collect();
            stale
                .into_iter()
                .filter_map(|id| registry.remove(id).map(|entry| (id, entry)))
                .collect()
        };
        for (session_id, entry) in &evicted {
            entry.session.lock().await.teardown();
            tracing::info!(%session_id, "Idle practice session evicted");
        }
        evicted.len()
    }

    /// Runs [`Self::evict_idle`] every `every` until the runtime shuts down.
    pub fn spawn_idle_sweeper(&self, every: Duration, max_idle: Duration) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let evicted = service.evict_idle(max_idle).await;
                if evicted > 0 {
                    tracing::debug!(evicted, "Idle sweep finished");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.lock_registry().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::assignment::{QuestionCard, QuestionCardType};
    use crate::services::navigation_service::MockProgressStore;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    fn assignment() -> Assignment {
        let card = |id: &str| QuestionCard {
            id: id.to_string(),
            card_type: QuestionCardType::Normal,
            question: "Talk about your hometown".to_string(),
            bullet_points: None,
            speak_aloud: true,
            time_limit: "0:03".to_string(),
            prep_time: Some("0:02".to_string()),
        };
        Assignment {
            id: Uuid::new_v4(),
            title: "Hometown".to_string(),
            questions: sqlx::types::Json(vec![card("q1"), card("q2")]),
            metadata: Some(serde_json::json!({ "isTest": true })),
            created_at: None,
        }
    }

    fn accepting_store() -> Arc<dyn ProgressStore> {
        let mut store = MockProgressStore::new();
        store.expect_update_progress().returning(|_, _, _| Ok(()));
        Arc::new(store)
    }

    async fn run_for(secs: u64) {
        for _ in 0..secs {
            tokio::time::advance(Duration::from_secs(1)).await;
            for _ in 0..5 {
                tokio::task::yield_now().await;
            }
        }
    }

    /// Holds every write until released.
    #[derive(Default)]
    struct GatedStore {
        entered: Notify,
        release: Notify,
        writes: Mutex<Vec<PracticeProgress>>,
    }

    #[async_trait]
    impl ProgressStore for GatedStore {
        async fn update_progress(
            &self,
            _assignment_id: Uuid,
            _student_id: Uuid,
            progress: PracticeProgress,
        ) -> Result<()> {
            self.entered.notify_one();
            self.release.notified().await;
            self.writes.lock().unwrap().push(progress);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recording_timeout_completes_question_and_advances() {
        let service = PracticeSessionService::new(accepting_store());
        let student = Uuid::new_v4();
        let session = service
            .create(assignment(), student, true, PracticeProgress::default(), false)
            .await;

        {
            let mut s = session.lock().await;
            let snap = s.snapshot();
            assert_eq!(snap.timer.prep_time_remaining, 2);
            assert_eq!(snap.prep_time_display, "0:02");
            assert!(s.start_prep());
        }

        // 2s prep + 3s recording
        run_for(5).await;

        let snap = session.lock().await.snapshot();
        assert_eq!(snap.current_question_index, 1);
        assert!(snap.completed_questions.contains("q1"));
        assert!(snap.timer.is_idle());
        assert_eq!(snap.timer.current_question_index, 1);
        assert!(snap.is_last_question);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_goto_is_blocked_after_test_starts() {
        let service = PracticeSessionService::new(accepting_store());
        let student = Uuid::new_v4();
        let session = service
            .create(assignment(), student, true, PracticeProgress::default(), false)
            .await;

        session.lock().await.start_prep();
        let (moved, snap) = session.navigate(NavigationAction::Goto, Some(1)).await.unwrap();
        assert!(!moved);
        assert_eq!(snap.current_question_index, 0);
        assert!(snap.timer.is_prep_time_active);
    }

    #[tokio::test]
    async fn untimed_session_navigates_freely() {
        let service = PracticeSessionService::new(accepting_store());
        let student = Uuid::new_v4();
        let session = service
            .create(assignment(), student, false, PracticeProgress::default(), false)
            .await;

        assert!(!session.lock().await.start_prep());
        assert!(session.navigate(NavigationAction::Goto, Some(1)).await.unwrap().0);
        assert!(session.navigate(NavigationAction::Previous, None).await.unwrap().0);
        assert!(session.navigate(NavigationAction::Goto, None).await.is_err());

        let snap = session.lock().await.snapshot();
        assert!(snap.can_start_recording);
        assert_eq!(snap.timer, PrepTimeState::default());
    }

    #[tokio::test]
    async fn sessions_are_scoped_to_their_student() {
        let service = PracticeSessionService::new(accepting_store());
        let owner = Uuid::new_v4();
        let session = service
            .create(assignment(), owner, false, PracticeProgress::default(), false)
            .await;
        let id = session.lock().await.id();

        assert!(service.get(id, owner).is_ok());
        assert!(matches!(service.get(id, Uuid::new_v4()), Err(Error::NotFound(_))));

        service.remove(id, owner).await.unwrap();
        assert!(service.get(id, owner).is_err());
        assert!(service.is_empty());
    }

    #[tokio::test]
    async fn completing_unknown_question_is_rejected() {
        let service = PracticeSessionService::new(accepting_store());
        let session = service
            .create(
                assignment(),
                Uuid::new_v4(),
                false,
                PracticeProgress::default(),
                false,
            )
            .await;
        assert!(matches!(
            session.complete_question("nope").await,
            Err(Error::NotFound(_))
        ));
        let snap = session.complete_question("q1").await.unwrap();
        assert_eq!(snap.current_question_index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_session_replaces_previous_one_for_same_assignment() {
        let service = PracticeSessionService::new(accepting_store());
        let student = Uuid::new_v4();
        let a = assignment();

        let first = service
            .create(a.clone(), student, true, PracticeProgress::default(), false)
            .await;
        let first_id = first.lock().await.id();
        assert!(first.lock().await.start_prep());

        let second = service
            .create(a.clone(), student, true, PracticeProgress::default(), false)
            .await;
        let second_id = second.lock().await.id();

        assert!(matches!(service.get(first_id, student), Err(Error::NotFound(_))));
        assert!(service.get(second_id, student).is_ok());
        assert_eq!(service.len(), 1);

        // The replaced session's timer was stopped and its lock released.
        let old = first.lock().await.snapshot();
        assert!(!old.has_test_started);
        assert!(!old.timer.is_prep_time_active);

        // Another student or assignment keeps its own session.
        service
            .create(a, Uuid::new_v4(), false, PracticeProgress::default(), false)
            .await;
        service
            .create(assignment(), student, false, PracticeProgress::default(), false)
            .await;
        assert_eq!(service.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_evicted() {
        let service = PracticeSessionService::new(accepting_store());
        let student = Uuid::new_v4();
        let idle = service
            .create(assignment(), student, false, PracticeProgress::default(), false)
            .await;
        let busy = service
            .create(assignment(), student, false, PracticeProgress::default(), false)
            .await;
        let idle_id = idle.lock().await.id();
        let busy_id = busy.lock().await.id();
        drop(idle);

        tokio::time::advance(Duration::from_secs(20 * 60)).await;
        service.get(busy_id, student).unwrap();
        tokio::time::advance(Duration::from_secs(15 * 60)).await;

        assert_eq!(service.evict_idle(Duration::from_secs(30 * 60)).await, 1);
        assert!(matches!(service.get(idle_id, student), Err(Error::NotFound(_))));
        assert!(service.get(busy_id, student).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sweeper_runs_periodically() {
        let service = PracticeSessionService::new(accepting_store());
        service
            .create(assignment(), Uuid::new_v4(), false, PracticeProgress::default(), false)
            .await;
        let sweeper = service.spawn_idle_sweeper(Duration::from_secs(60), Duration::from_secs(300));

        run_for(240).await;
        assert_eq!(service.len(), 1);
        run_for(120).await;
        assert!(service.is_empty());
        sweeper.abort();
    }

    #[tokio::test]
    async fn progress_is_written_after_the_session_lock_is_released() {
        let store = Arc::new(GatedStore::default());
        let service = PracticeSessionService::new(store.clone());
        let session = service
            .create(assignment(), Uuid::new_v4(), false, PracticeProgress::default(), false)
            .await;

        let completing = tokio::spawn({
            let session = session.clone();
            async move { session.complete_question("q1").await }
        });
        store.entered.notified().await;

        // The write is parked in the store; readers still get through.
        let snap = session.state.try_lock().expect("session lock is free").snapshot();
        assert_eq!(snap.current_question_index, 1);

        store.release.notify_one();
        completing.await.unwrap().unwrap();
        let writes = store.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].completed_questions.contains("q1"));
    }

    #[tokio::test]
    async fn failed_write_is_retried_on_next_completion() {
        let mut store = MockProgressStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_update_progress()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(Error::Internal("db down".into())));
        store
            .expect_update_progress()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, _, p| p.completed_questions.len() == 1)
            .returning(|_, _, _| Ok(()));

        let service = PracticeSessionService::new(Arc::new(store));
        let session = service
            .create(assignment(), Uuid::new_v4(), false, PracticeProgress::default(), false)
            .await;
        session.complete_question("q1").await.unwrap();
        // Going back is not a progress change, but the failed write is owed.
        session.navigate(NavigationAction::Previous, None).await.unwrap();
        session.navigate(NavigationAction::Next, None).await.unwrap();
    }
}
