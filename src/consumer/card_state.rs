use std::time::{Duration, Instant, SystemTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardStatus {
    #[default]
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Thinking,
    Executing,
    Complete,
    Step,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub id: String,
    pub text: String,
    pub meta: Option<String>,
    pub kind: StepKind,
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileWriteProgress {
    pub filename: String,
    pub progress: Option<f64>,
    pub complete: bool,
}

/// Everything the thought card shows for the current assistant turn.
#[derive(Debug, Default)]
pub struct ThoughtCardState {
    visible: bool,
    status: CardStatus,
    steps: Vec<Step>,
    live_text: String,
    is_typing: bool,
    file_write: Option<FileWriteProgress>,
    progress: Option<f64>,
    error: Option<String>,
    started_at: Option<Instant>,
    thinking_time: Option<Duration>,
    revision: u64,
}

impl ThoughtCardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when nothing has happened since creation or the last reset.
    pub fn is_pristine(&self) -> bool {
        !self.visible
            && self.status == CardStatus::Processing
            && self.steps.is_empty()
            && self.live_text.is_empty()
            && !self.is_typing
            && self.file_write.is_none()
            && self.progress.is_none()
            && self.error.is_none()
    }

    pub fn show(&mut self) {
        if self.visible {
            return;
        }
        self.visible = true;
        self.started_at.get_or_insert_with(Instant::now);
        self.touch();
    }

    pub fn add_step(&mut self, kind: StepKind, text: impl Into<String>, meta: Option<String>) {
        self.steps.push(Step {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            meta,
            kind,
            timestamp: SystemTime::now(),
        });
        self.touch();
    }

    pub fn set_progress(&mut self, progress: f64) {
        self.progress = Some(progress.clamp(0.0, 1.0));
        self.touch();
    }

    pub fn set_live_text(&mut self, text: impl Into<String>, is_typing: bool) {
        self.live_text = text.into();
        self.is_typing = is_typing;
        self.touch();
    }

    pub fn set_file_write(&mut self, file_write: FileWriteProgress) {
        self.file_write = Some(file_write);
        self.touch();
    }

    pub fn complete(&mut self) {
        self.status = CardStatus::Completed;
        self.is_typing = false;
        self.stop_clock();
        self.touch();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = CardStatus::Error;
        self.error = Some(message.into());
        self.is_typing = false;
        self.stop_clock();
        self.touch();
    }

    /// Clears the card back to its initial state. The revision keeps counting.
    pub fn reset(&mut self) {
        let revision = self.revision;
        *self = Self::default();
        self.revision = revision;
        self.touch();
    }

    fn stop_clock(&mut self) {
        if let Some(started) = self.started_at {
            self.thinking_time.get_or_insert_with(|| started.elapsed());
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn status(&self) -> CardStatus {
        self.status
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn live_text(&self) -> &str {
        &self.live_text
    }

    pub fn is_typing(&self) -> bool {
        self.is_typing
    }

    pub fn file_write(&self) -> Option<&FileWriteProgress> {
        self.file_write.as_ref()
    }

    pub fn progress(&self) -> Option<f64> {
        self.progress
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Time spent thinking: frozen once the turn ends, live while it runs.
    pub fn elapsed(&self) -> Option<Duration> {
        self.thinking_time
            .or_else(|| self.started_at.map(|started| started.elapsed()))
    }

    /// Bumped on every mutation; lets the renderer skip redundant redraws.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
