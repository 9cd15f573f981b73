use crate::error::{Error, Result};
use crate::models::assignment::{Assignment, QuestionCard};
use crate::models::submission::{NewSubmission, RecordingEntry, Submission, SubmissionStatus};
use crate::services::notification_service::{Notifier, Toast, ToastHandle};
use crate::utils::time;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const DASHBOARD_PATH: &str = "/student/dashboard";
const FALLBACK_FAILURE: &str = "Failed to submit assignment. Please try again.";
const OUTCOME_TOAST: Duration = Duration::from_secs(5);
const FAILURE_TOAST: Duration = Duration::from_secs(8);
const UPLOAD_TOAST: Duration = Duration::from_secs(3);

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Most recent submission by `submitted_at`, if any.
    async fn latest_for(&self, assignment_id: Uuid, student_id: Uuid) -> Result<Option<Submission>>;

    async fn insert(&self, submission: NewSubmission) -> Result<Uuid>;

    async fn mark_pending(
        &self,
        submission_id: Uuid,
        recordings: Vec<RecordingEntry>,
        submitted_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Replaces the entry for `recording.question_id` (or appends it) and puts
    /// the row back to `in_progress`, whatever its status was.
    async fn upsert_recording(&self, submission_id: Uuid, recording: RecordingEntry) -> Result<()>;

    async fn max_attempt(&self, assignment_id: Uuid, student_id: Uuid) -> Result<Option<i32>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioAnalyzer: Send + Sync {
    async fn analyze(&self, audio_urls: Vec<String>, submission_id: Uuid) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioRecording {
    pub url: String,
}

/// Recordings keyed by question position. Persisted recordings win over
/// session-local ones.
#[derive(Debug, Clone, Default)]
pub struct RecordingSources {
    pub session: HashMap<usize, AudioRecording>,
    pub persisted: HashMap<usize, AudioRecording>,
}

impl RecordingSources {
    pub fn url_for(&self, index: usize) -> Option<&str> {
        self.persisted
            .get(&index)
            .or_else(|| self.session.get(&index))
            .map(|r| r.url.as_str())
    }
}

pub fn assemble_recordings(
    questions: &[QuestionCard],
    sources: &RecordingSources,
) -> Result<Vec<RecordingEntry>> {
    questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let url = sources
                .url_for(index)
                .ok_or(Error::MissingRecording { question_number: index + 1 })?;
            Ok(RecordingEntry {
                question_id: question.id.clone(),
                audio_url: url.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Completed { submission_id: Uuid },
    AnalysisPending { submission_id: Uuid },
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NewAttempt {
    pub submission_id: Uuid,
    pub attempt: i32,
}

type InFlightSet = Arc<Mutex<HashSet<(Uuid, Uuid)>>>;

struct InFlightGuard {
    set: InFlightSet,
    key: (Uuid, Uuid),
}

impl InFlightGuard {
    fn acquire(set: &InFlightSet, key: (Uuid, Uuid)) -> Option<Self> {
        let mut guard = set.lock().unwrap_or_else(|p| p.into_inner());
        if !guard.insert(key) {
            return None;
        }
        Some(Self {
            set: set.clone(),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut guard = self.set.lock().unwrap_or_else(|p| p.into_inner());
        guard.remove(&self.key);
    }
}

#[derive(Clone)]
pub struct SubmissionService {
    repo: Arc<dyn SubmissionRepository>,
    analyzer: Arc<dyn AudioAnalyzer>,
    notifier: Arc<dyn Notifier>,
    in_flight: InFlightSet,
}

impl SubmissionService {
    pub fn new(
        repo: Arc<dyn SubmissionRepository>,
        analyzer: Arc<dyn AudioAnalyzer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            repo,
            analyzer,
            notifier,
            in_flight: Arc::default(),
        }
    }

    pub fn is_submitting(&self, assignment_id: Uuid, student_id: Uuid) -> bool {
        let guard = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        guard.contains(&(assignment_id, student_id))
    }

    /// Stores an uploaded recording on the latest submission, reopening it,
    /// or starts a first in-progress attempt holding just this recording.
    pub async fn record_upload(
        &self,
        assignment_id: Uuid,
        student_id: Uuid,
        recording: RecordingEntry,
    ) -> Result<Uuid> {
        let submission_id = match self.repo.latest_for(assignment_id, student_id).await? {
            Some(latest) => {
                self.repo.upsert_recording(latest.id, recording).await?;
                latest.id
            }
            None => {
                self.repo
                    .insert(NewSubmission {
                        assignment_id,
                        student_id,
                        status: SubmissionStatus::InProgress,
                        recordings: vec![recording],
                        attempt: 1,
                        submitted_at: time::now(),
                    })
                    .await?
            }
        };
        tracing::debug!(%submission_id, "Recording stored on submission");
        self.notifier.show(
            student_id,
            Toast::new("Upload Complete!", "Your recording has been uploaded to the cloud.")
                .with_duration(UPLOAD_TOAST),
        );
        Ok(submission_id)
    }

    /// Opens a fresh in-progress attempt; earlier attempts stay untouched.
    pub async fn start_new_attempt(&self, assignment_id: Uuid, student_id: Uuid) -> Result<NewAttempt> {
        if self.is_submitting(assignment_id, student_id) {
            return Err(Error::Conflict("Submission already in progress".to_string()));
        }
        match self.insert_next_attempt(assignment_id, student_id).await {
            Ok(attempt) => {
                tracing::info!(%assignment_id, %student_id, attempt = attempt.attempt, "New attempt started");
                self.notifier.show(
                    student_id,
                    Toast::new(
                        "New Attempt Started",
                        "You can now re-record your assignment. Your previous attempts are still saved.",
                    )
                    .with_duration(OUTCOME_TOAST),
                );
                Ok(attempt)
            }
            Err(err) => {
                tracing::error!(%assignment_id, %student_id, error = %err, "Could not start new attempt");
                self.notifier.show(
                    student_id,
                    Toast::destructive("Failed to Start New Attempt", failure_message(&err))
                        .with_duration(OUTCOME_TOAST),
                );
                Err(err)
            }
        }
    }

    async fn insert_next_attempt(&self, assignment_id: Uuid, student_id: Uuid) -> Result<NewAttempt> {
        let attempt = self
            .repo
            .max_attempt(assignment_id, student_id)
            .await?
            .unwrap_or(0)
            + 1;
        let submission_id = self
            .repo
            .insert(NewSubmission {
                assignment_id,
                student_id,
                status: SubmissionStatus::InProgress,
                recordings: Vec::new(),
                attempt,
                submitted_at: time::now(),
            })
            .await?;
        Ok(NewAttempt {
            submission_id,
            attempt,
        })
    }

    /// Checks preconditions and claims the submission slot. The returned
    /// ticket carries the redirect to follow right away; the network work
    /// happens in [`SubmissionTicket::run`].
    pub fn begin(
        &self,
        assignment: Option<Assignment>,
        assignment_id: Option<Uuid>,
        user_id: Option<Uuid>,
        sources: RecordingSources,
    ) -> Result<SubmissionTicket> {
        let Some(student_id) = user_id else {
            return Err(Error::Unauthorized(
                "Please sign in to submit your assignment".to_string(),
            ));
        };
        let (Some(assignment), Some(assignment_id)) = (assignment, assignment_id) else {
            return Err(Error::BadRequest("Assignment is not loaded".to_string()));
        };

        let guard = InFlightGuard::acquire(&self.in_flight, (assignment_id, student_id))
            .ok_or_else(|| Error::Conflict("Submission already in progress".to_string()))?;

        tracing::info!(%assignment_id, %student_id, "Starting assignment submission");
        let processing = self.notifier.show(
            student_id,
            Toast::new(
                "Processing submission...",
                "Please wait while we analyze your recording.",
            ),
        );

        Ok(SubmissionTicket {
            service: self.clone(),
            assignment,
            assignment_id,
            student_id,
            sources,
            processing: Some(processing),
            _guard: guard,
        })
    }
}

pub struct SubmissionTicket {
    service: SubmissionService,
    assignment: Assignment,
    assignment_id: Uuid,
    student_id: Uuid,
    sources: RecordingSources,
    processing: Option<ToastHandle>,
    _guard: InFlightGuard,
}

impl SubmissionTicket {
    pub fn redirect(&self) -> &'static str {
        DASHBOARD_PATH
    }

    pub async fn run(mut self) -> SubmissionOutcome {
        let notifier = self.service.notifier.clone();
        let processing = self.processing.take();
        let dismiss = move || {
            if let Some(handle) = processing {
                handle.dismiss();
            }
        };

        let (submission_id, recordings) = match self.persist().await {
            Ok(saved) => saved,
            Err(err) => {
                let message = failure_message(&err);
                tracing::error!(
                    assignment_id = %self.assignment_id,
                    student_id = %self.student_id,
                    error = %err,
                    "Assignment submission failed"
                );
                dismiss();
                notifier.show(
                    self.student_id,
                    Toast::destructive("Submission Failed", message.clone())
                        .with_duration(FAILURE_TOAST),
                );
                return SubmissionOutcome::Failed { message };
            }
        };

        let audio_urls = recordings.into_iter().map(|r| r.audio_url).collect();
        match self.service.analyzer.analyze(audio_urls, submission_id).await {
            Ok(()) => {
                dismiss();
                notifier.show(
                    self.student_id,
                    Toast::new(
                        "Assignment Completed!",
                        format!(
                            "You have completed \"{}\" and analysis is complete.",
                            self.assignment.title
                        ),
                    )
                    .with_duration(OUTCOME_TOAST),
                );
                SubmissionOutcome::Completed { submission_id }
            }
            Err(err) => {
                tracing::warn!(
                    %submission_id,
                    error = %err,
                    "Analysis error (submission still succeeded)"
                );
                dismiss();
                notifier.show(
                    self.student_id,
                    Toast::new(
                        "Assignment Submitted",
                        format!(
                            "\"{}\" was submitted but analysis may still be processing.",
                            self.assignment.title
                        ),
                    )
                    .with_duration(OUTCOME_TOAST),
                );
                SubmissionOutcome::AnalysisPending { submission_id }
            }
        }
    }

    async fn persist(&self) -> Result<(Uuid, Vec<RecordingEntry>)> {
        let repo = &self.service.repo;
        let existing = repo.latest_for(self.assignment_id, self.student_id).await?;
        let recordings = assemble_recordings(self.assignment.questions(), &self.sources)?;
        let submitted_at = time::now();

        let submission_id = match existing {
            Some(current) if current.status == SubmissionStatus::InProgress => {
                repo.mark_pending(current.id, recordings.clone(), submitted_at)
                    .await?;
                tracing::info!(submission_id = %current.id, "Resumed in-progress submission");
                current.id
            }
            previous => {
                let attempt = previous.map(|s| s.attempt).unwrap_or(0) + 1;
                let id = repo
                    .insert(NewSubmission {
                        assignment_id: self.assignment_id,
                        student_id: self.student_id,
                        status: SubmissionStatus::Pending,
                        recordings: recordings.clone(),
                        attempt,
                        submitted_at,
                    })
                    .await?;
                tracing::info!(submission_id = %id, attempt, "Created submission attempt");
                id
            }
        };

        Ok((submission_id, recordings))
    }
}

fn failure_message(err: &Error) -> String {
    let message = match err {
        Error::Database(e) => e.to_string(),
        Error::Internal(m) | Error::BadRequest(m) | Error::Analysis(m) => m.clone(),
        other => other.to_string(),
    };
    if message.trim().is_empty() {
        FALLBACK_FAILURE.to_string()
    } else {
        message
    }
}
