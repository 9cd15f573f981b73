use crate::error::Result;
use crate::models::progress::PracticeProgress;
use async_trait::async_trait;
use std::collections::BTreeSet;
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn update_progress(
        &self,
        assignment_id: Uuid,
        student_id: Uuid,
        progress: PracticeProgress,
    ) -> Result<()>;
}

/// A progress write decided while the navigator is borrowed and carried out
/// after it is released. `seq` orders writes of the same navigator.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingProgress {
    pub assignment_id: Uuid,
    pub student_id: Uuid,
    pub progress: PracticeProgress,
    pub seq: u64,
}

impl PendingProgress {
    pub async fn write(&self, store: &dyn ProgressStore) -> Result<()> {
        store
            .update_progress(self.assignment_id, self.student_id, self.progress.clone())
            .await
    }
}

/// Tracks the active question of one assignment and mirrors progress to a
/// [`ProgressStore`].
#[derive(Debug, Clone)]
pub struct QuestionNavigator {
    assignment_id: Uuid,
    student_id: Uuid,
    total_questions: usize,
    current_question_index: usize,
    completed_questions: BTreeSet<String>,
    is_completed: bool,
    is_test_mode: bool,
    has_test_started: bool,
    last_emitted_completed: Option<BTreeSet<String>>,
    write_seq: u64,
}

impl QuestionNavigator {
    pub fn new(
        assignment_id: Uuid,
        student_id: Uuid,
        total_questions: usize,
        initial: PracticeProgress,
        is_test_mode: bool,
    ) -> Self {
        let current_question_index = if initial.current_question_index < total_questions {
            initial.current_question_index
        } else {
            0
        };
        Self {
            assignment_id,
            student_id,
            total_questions,
            current_question_index,
            completed_questions: initial.completed_questions,
            is_completed: false,
            is_test_mode,
            has_test_started: false,
            last_emitted_completed: None,
            write_seq: 0,
        }
    }

    pub fn current_question_index(&self) -> usize {
        self.current_question_index
    }

    pub fn total_questions(&self) -> usize {
        self.total_questions
    }

    pub fn completed_questions(&self) -> &BTreeSet<String> {
        &self.completed_questions
    }

    pub fn is_test_mode(&self) -> bool {
        self.is_test_mode
    }

    pub fn has_test_started(&self) -> bool {
        self.has_test_started
    }

    pub fn is_first_question(&self) -> bool {
        self.current_question_index == 0
    }

    pub fn is_last_question(&self) -> bool {
        self.total_questions > 0 && self.current_question_index == self.total_questions - 1
    }

    pub fn set_test_started(&mut self, started: bool) {
        self.has_test_started = started;
    }

    pub fn set_completed(&mut self, completed: bool) {
        self.is_completed = completed;
    }

    /// Returns whether the active index changed.
    pub fn go_to_question(&mut self, index: usize) -> bool {
        if self.is_test_mode && self.has_test_started {
            tracing::debug!(
                assignment_id = %self.assignment_id,
                index,
                "Manual navigation blocked during active test"
            );
            return false;
        }
        if index >= self.total_questions || index == self.current_question_index {
            return false;
        }
        self.current_question_index = index;
        true
    }

    pub fn go_to_next(&mut self) -> bool {
        if self.current_question_index + 1 < self.total_questions {
            self.current_question_index += 1;
            true
        } else {
            false
        }
    }

    pub fn go_to_previous(&mut self) -> bool {
        if self.current_question_index > 0 {
            self.current_question_index -= 1;
            true
        } else {
            false
        }
    }

    pub fn mark_completed(&mut self, question_id: impl Into<String>) -> bool {
        self.completed_questions.insert(question_id.into())
    }

    pub fn snapshot(&self) -> PracticeProgress {
        PracticeProgress {
            current_question_index: self.current_question_index,
            completed_questions: self.completed_questions.clone(),
        }
    }

    /// Claims the next progress write unless the assignment is already
    /// completed or the completed set equals the one last emitted. Moving
    /// between questions alone does not produce a write; the index rides along
    /// with the next completion.
    pub fn pending_progress(&mut self) -> Option<PendingProgress> {
        if self.is_completed {
            return None;
        }
        if self.last_emitted_completed.as_ref() == Some(&self.completed_questions) {
            return None;
        }
        self.write_seq += 1;
        let progress = self.snapshot();
        self.last_emitted_completed = Some(progress.completed_questions.clone());
        Some(PendingProgress {
            assignment_id: self.assignment_id,
            student_id: self.student_id,
            progress,
            seq: self.write_seq,
        })
    }

    /// Forgets the newest claimed write after it failed so the next call
    /// retries. Older failures were already superseded.
    pub fn write_failed(&mut self, pending: &PendingProgress) {
        tracing::warn!(
            assignment_id = %self.assignment_id,
            seq = pending.seq,
            "Failed to persist practice progress"
        );
        if pending.seq == self.write_seq {
            self.last_emitted_completed = None;
        }
    }

    /// [`Self::pending_progress`] followed by the write. Returns whether a
    /// write succeeded.
    pub async fn persist_progress(&mut self, store: &dyn ProgressStore) -> bool {
        let Some(pending) = self.pending_progress() else {
            return false;
        };
        match pending.write(store).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Progress store rejected write");
                self.write_failed(&pending);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn navigator(total: usize, test_mode: bool) -> QuestionNavigator {
        QuestionNavigator::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            total,
            PracticeProgress::default(),
            test_mode,
        )
    }

    #[test]
    fn go_to_question_ignores_out_of_range_indices() {
        let mut nav = navigator(3, false);
        nav.go_to_question(1);
        assert!(!nav.go_to_question(3));
        assert!(!nav.go_to_question(usize::MAX));
        assert_eq!(nav.current_question_index(), 1);
    }

    #[test]
    fn next_and_previous_stop_at_bounds() {
        let mut nav = navigator(3, false);
        assert!(nav.is_first_question());
        assert!(!nav.go_to_previous());
        assert_eq!(nav.current_question_index(), 0);

        nav.go_to_question(2);
        assert!(nav.is_last_question());
        assert!(!nav.go_to_next());
        assert_eq!(nav.current_question_index(), 2);

        assert!(nav.go_to_previous());
        assert!(!nav.is_first_question());
        assert!(!nav.is_last_question());
    }

    #[test]
    fn manual_navigation_is_locked_once_test_started() {
        let mut nav = navigator(4, true);
        assert!(nav.go_to_question(2));
        nav.set_test_started(true);
        for i in 0..4 {
            nav.go_to_question(i);
        }
        assert_eq!(nav.current_question_index(), 2);

        // automatic advancement is still allowed
        assert!(nav.go_to_next());
        assert_eq!(nav.current_question_index(), 3);
    }

    #[test]
    fn started_flag_without_test_mode_does_not_lock() {
        let mut nav = navigator(4, false);
        nav.set_test_started(true);
        assert!(nav.go_to_question(3));
    }

    #[test]
    fn initial_index_out_of_range_falls_back_to_first_question() {
        let nav = QuestionNavigator::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            2,
            PracticeProgress {
                current_question_index: 5,
                completed_questions: BTreeSet::new(),
            },
            false,
        );
        assert_eq!(nav.current_question_index(), 0);
    }

    #[tokio::test]
    async fn unchanged_progress_is_written_once() {
        let mut store = MockProgressStore::new();
        store
            .expect_update_progress()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut nav = navigator(3, false);
        nav.mark_completed("q1");
        assert!(nav.persist_progress(&store).await);
        assert!(!nav.persist_progress(&store).await);
    }

    #[tokio::test]
    async fn only_new_completions_are_written() {
        let mut store = MockProgressStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_update_progress()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, _, p| p.current_question_index == 0 && p.completed_questions.len() == 1)
            .returning(|_, _, _| Ok(()));
        store
            .expect_update_progress()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, _, p| p.current_question_index == 1 && p.completed_questions.len() == 2)
            .returning(|_, _, _| Ok(()));

        let mut nav = navigator(3, false);
        nav.mark_completed("q1");
        assert!(nav.persist_progress(&store).await);
        // Moving alone is not a progress change.
        nav.go_to_next();
        assert!(!nav.persist_progress(&store).await);
        nav.mark_completed("q2");
        assert!(nav.persist_progress(&store).await);
        nav.mark_completed("q1");
        assert!(!nav.persist_progress(&store).await);
    }

    #[tokio::test]
    async fn completion_order_does_not_trigger_rewrite() {
        let mut store = MockProgressStore::new();
        store
            .expect_update_progress()
            .times(1)
            .withf(|_, _, p| p.completed_questions.len() == 2)
            .returning(|_, _, _| Ok(()));

        let mut a = navigator(3, false);
        a.mark_completed("q2");
        a.mark_completed("q1");
        assert!(a.persist_progress(&store).await);

        // Same set inserted in the other order.
        a.completed_questions.clear();
        a.mark_completed("q1");
        a.mark_completed("q2");
        assert!(!a.persist_progress(&store).await);
    }

    #[tokio::test]
    async fn completed_assignment_is_never_written() {
        let mut store = MockProgressStore::new();
        store.expect_update_progress().times(0);

        let mut nav = navigator(2, false);
        nav.set_completed(true);
        nav.mark_completed("q1");
        assert!(!nav.persist_progress(&store).await);
    }

    #[tokio::test]
    async fn failed_write_is_retried() {
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
            .returning(|_, _, _| Ok(()));

        let mut nav = navigator(2, false);
        nav.mark_completed("q1");
        assert!(!nav.persist_progress(&store).await);
        assert!(nav.persist_progress(&store).await);
    }

    #[tokio::test]
    async fn superseded_failure_keeps_newer_claim() {
        let mut nav = navigator(3, false);
        nav.mark_completed("q1");
        let first = nav.pending_progress().unwrap();
        nav.mark_completed("q2");
        let second = nav.pending_progress().unwrap();
        assert!(second.seq > first.seq);

        nav.write_failed(&first);
        assert!(nav.pending_progress().is_none());

        nav.write_failed(&second);
        let retry = nav.pending_progress().unwrap();
        assert_eq!(retry.progress.completed_questions.len(), 2);
    }
}
