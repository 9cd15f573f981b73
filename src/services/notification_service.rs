use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastVariant {
    #[default]
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub variant: ToastVariant,
    /// How long the toast stays up. `None` keeps it until dismissed.
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl Toast {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: ToastVariant::Default,
            duration_ms: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            variant: ToastVariant::Destructive,
            ..Self::new(title, description)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveToast {
    pub id: Uuid,
    #[serde(flatten)]
    pub toast: Toast,
    pub shown_at: DateTime<Utc>,
    #[serde(skip)]
    expires_at: Option<Instant>,
}

impl ActiveToast {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Student-facing notification surface.
pub trait Notifier: Send + Sync {
    fn show(&self, student_id: Uuid, toast: Toast) -> ToastHandle;
}

pub struct ToastHandle {
    dismiss: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ToastHandle {
    pub fn new(dismiss: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            dismiss: Some(Box::new(dismiss)),
        }
    }

    pub fn dismiss(mut self) {
        if let Some(f) = self.dismiss.take() {
            f();
        }
    }
}

/// In-memory toast feed, polled by clients.
#[derive(Clone, Default)]
pub struct ToastCenter {
    inner: Arc<Mutex<HashMap<Uuid, Vec<ActiveToast>>>>,
}

impl ToastCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_for(&self, student_id: Uuid) -> Vec<ActiveToast> {
        let mut guard = self.lock();
        prune(&mut guard, Instant::now());
        guard.get(&student_id).cloned().unwrap_or_default()
    }

    fn remove(&self, student_id: Uuid, toast_id: Uuid) {
        let mut guard = self.lock();
        if let Some(list) = guard.get_mut(&student_id) {
            list.retain(|t| t.id != toast_id);
            if list.is_empty() {
                guard.remove(&student_id);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Vec<ActiveToast>>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Drops expired toasts of every student, and students left with none.
fn prune(feeds: &mut HashMap<Uuid, Vec<ActiveToast>>, now: Instant) {
    feeds.retain(|_, list| {
        list.retain(|t| t.is_live(now));
        !list.is_empty()
    });
}

impl Notifier for ToastCenter {
    fn show(&self, student_id: Uuid, toast: Toast) -> ToastHandle {
        let id = Uuid::new_v4();
        tracing::info!(%student_id, title = %toast.title, "Showing notification");
        let now = Instant::now();
        {
            let mut guard = self.lock();
            prune(&mut guard, now);
            let expires_at = toast.duration_ms.map(|ms| now + Duration::from_millis(ms));
            guard.entry(student_id).or_default().push(ActiveToast {
                id,
                toast,
                shown_at: Utc::now(),
                expires_at,
            });
        }
        let center = self.clone();
        ToastHandle::new(move || center.remove(student_id, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dismiss_removes_only_that_toast() {
        let center = ToastCenter::new();
        let student = Uuid::new_v4();
        let processing = center.show(student, Toast::new("Processing", "wait"));
        let _other = center.show(student, Toast::destructive("Oops", "bad"));
        assert_eq!(center.active_for(student).len(), 2);

        processing.dismiss();
        let remaining = center.active_for(student);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].toast.variant, ToastVariant::Destructive);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_toasts_expire_and_free_their_feed() {
        let center = ToastCenter::new();
        let student = Uuid::new_v4();
        for _ in 0..1000 {
            center.show(
                student,
                Toast::new("Assignment Completed!", "done").with_duration(Duration::from_secs(5)),
            );
        }
        let processing = center.show(student, Toast::new("Processing submission...", "wait"));
        assert_eq!(center.active_for(student).len(), 1001);

        tokio::time::advance(Duration::from_secs(5)).await;
        let remaining = center.active_for(student);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].toast.title, "Processing submission...");

        processing.dismiss();
        assert!(center.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn other_students_expired_toasts_are_pruned_on_show() {
        let center = ToastCenter::new();
        let gone = Uuid::new_v4();
        center.show(gone, Toast::new("Bye", "").with_duration(Duration::from_secs(1)));
        tokio::time::advance(Duration::from_secs(2)).await;

        center.show(Uuid::new_v4(), Toast::new("Hi", ""));
        assert!(!center.lock().contains_key(&gone));
    }

    #[test]
    fn feeds_are_per_student() {
        let center = ToastCenter::new();
        let a = Uuid::new_v4();
        center.show(a, Toast::new("Hi", ""));
        assert!(center.active_for(Uuid::new_v4()).is_empty());
        assert_eq!(center.active_for(a)[0].toast.title, "Hi");
    }
}
