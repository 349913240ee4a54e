//! Case submission: a bounded pending-file set, strictly sequential photo
//! uploads with per-file progress, then a single case write.
//!
//! Uploads are serialized on purpose: progress stays deterministic and a
//! partial failure leaves a well-defined prefix of completed uploads.
//! Blobs uploaded before a failure are not cleaned up; the orphans are an
//! accepted gap of this design.

use bytes::Bytes;
use tokio::sync::watch;
use tracing::debug;

use crate::backend::{case_photo_path, BlobBackend};
use crate::db::Database;
use crate::model::{CaseId, NewCase, UnixTimeMs, UserProfile};
use crate::{AppError, AppResult, ErrorKind, ValidationError, MAX_CASE_PHOTOS};

/// Progress of one submission, in the order it is reported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitProgress {
    Uploading { current: usize, total: usize },
    Saving,
}

impl std::fmt::Display for SubmitProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uploading { current, total } => {
                write!(f, "Uploading {current} of {total}…")
            }
            Self::Saving => write!(f, "Saving case…"),
        }
    }
}

/// One client-selected image waiting to be uploaded.
#[derive(Clone, Debug)]
pub struct PendingFile {
    name: String,
    bytes: Bytes,
}

impl PendingFile {
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Accumulates up to [`MAX_CASE_PHOTOS`] files (paste and picker feed the
/// same pool) and turns them plus title/description into a persisted case.
pub struct CaseSubmission {
    files: Vec<PendingFile>,
    submitting: bool,
    progress_tx: watch::Sender<Option<SubmitProgress>>,
}

impl Default for CaseSubmission {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseSubmission {
    #[must_use]
    pub fn new() -> Self {
        let (progress_tx, _) = watch::channel(None);
        Self {
            files: Vec::new(),
            submitting: false,
            progress_tx,
        }
    }

    /// Add one file. Files beyond the cap are silently ignored, as are
    /// additions while a submission is in flight; returns whether the file
    /// was accepted.
    pub fn add_file(&mut self, file: PendingFile) -> bool {
        if self.submitting || self.files.len() >= MAX_CASE_PHOTOS {
            debug!(name = file.name(), "ignoring file beyond pending cap");
            return false;
        }
        self.files.push(file);
        true
    }

    /// Add several files at once; the same cap applies.
    pub fn add_files(&mut self, files: impl IntoIterator<Item = PendingFile>) {
        for file in files {
            self.add_file(file);
        }
    }

    /// Remove one pending file before submission.
    pub fn remove_file(&mut self, index: usize) -> Option<PendingFile> {
        if self.submitting || index >= self.files.len() {
            return None;
        }
        Some(self.files.remove(index))
    }

    #[must_use]
    pub fn files(&self) -> &[PendingFile] {
        &self.files
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.files.len() >= MAX_CASE_PHOTOS
    }

    #[must_use]
    pub const fn is_submitting(&self) -> bool {
        self.submitting
    }

    #[must_use]
    pub fn progress(&self) -> Option<SubmitProgress> {
        self.progress_tx.borrow().clone()
    }

    /// Observe progress while a submission runs; holds `None` between
    /// submissions.
    #[must_use]
    pub fn watch_progress(&self) -> watch::Receiver<Option<SubmitProgress>> {
        self.progress_tx.subscribe()
    }

    /// Run the whole flow: upload every pending file in order, then create
    /// the case with the resulting URLs. With zero files this goes straight
    /// to the save step.
    ///
    /// On any failure the flow aborts immediately with `submitting` false
    /// and progress cleared; no case document is written.
    pub async fn submit(
        &mut self,
        blobs: &dyn BlobBackend,
        db: &Database,
        reporter: &UserProfile,
        title: &str,
        description: &str,
    ) -> AppResult<CaseId> {
        if self.submitting {
            return Err(ValidationError::SubmissionInFlight.into());
        }
        if title.trim().is_empty() || description.trim().is_empty() {
            return Err(ValidationError::TitleAndDescriptionRequired.into());
        }

        self.submitting = true;
        let result = self.run(blobs, db, reporter, title, description).await;
        self.submitting = false;
        self.progress_tx.send_replace(None);
        if result.is_ok() {
            self.files.clear();
        }
        result
    }

    async fn run(
        &self,
        blobs: &dyn BlobBackend,
        db: &Database,
        reporter: &UserProfile,
        title: &str,
        description: &str,
    ) -> AppResult<CaseId> {
        let total = self.files.len();
        let mut photo_urls = Vec::with_capacity(total);

        for (index, file) in self.files.iter().enumerate() {
            self.progress_tx.send_replace(Some(SubmitProgress::Uploading {
                current: index + 1,
                total,
            }));
            debug!(name = file.name(), current = index + 1, total, "uploading case photo");

            let path = case_photo_path(&reporter.uid, file.name(), UnixTimeMs::now());
            let handle = blobs
                .upload(&path, file.bytes.clone())
                .await
                .map_err(|e| {
                    AppError::new(ErrorKind::Upload, "case photo upload failed")
                        .with_internal(e.to_string())
                })?;
            let url = blobs.resolve_url(&handle).await.map_err(|e| {
                AppError::new(ErrorKind::Upload, "uploaded photo has no resolvable URL")
                    .with_internal(e.to_string())
            })?;
            photo_urls.push(url.to_string());
        }

        self.progress_tx.send_replace(Some(SubmitProgress::Saving));
        debug!(photos = total, "saving case record");

        let case = NewCase {
            title: title.to_owned(),
            description: description.to_owned(),
            reporter_id: reporter.uid.clone(),
            reporter_name: reporter.username.clone(),
        };
        db.create_case(case, photo_urls).await.map_err(|e| {
            if e.kind == ErrorKind::Validation {
                e
            } else {
                AppError::new(ErrorKind::Persistence, "case record creation failed")
                    .with_internal(e.to_string())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> PendingFile {
        PendingFile::new(name, vec![0u8; 4])
    }

    #[test]
    fn cap_applies_across_mixed_additions() {
        let mut submission = CaseSubmission::new();
        // paste three, pick four more
        submission.add_files((0..3).map(|i| file(&format!("paste{i}.png"))));
        submission.add_files((0..4).map(|i| file(&format!("picked{i}.png"))));
        assert_eq!(submission.files().len(), MAX_CASE_PHOTOS);
        assert!(submission.is_full());
        assert!(!submission.add_file(file("extra.png")));
    }

    #[test]
    fn removal_frees_a_slot() {
        let mut submission = CaseSubmission::new();
        submission.add_files((0..5).map(|i| file(&format!("f{i}.png"))));
        let removed = submission.remove_file(2).unwrap();
        assert_eq!(removed.name(), "f2.png");
        assert!(submission.add_file(file("again.png")));
        assert_eq!(submission.files().len(), MAX_CASE_PHOTOS);
    }

    #[test]
    fn remove_out_of_range_is_none() {
        let mut submission = CaseSubmission::new();
        assert!(submission.remove_file(0).is_none());
    }

    #[test]
    fn progress_display_strings() {
        let uploading = SubmitProgress::Uploading {
            current: 2,
            total: 5,
        };
        assert_eq!(uploading.to_string(), "Uploading 2 of 5…");
        assert_eq!(SubmitProgress::Saving.to_string(), "Saving case…");
    }

    #[test]
    fn fresh_submission_reports_no_progress() {
        let submission = CaseSubmission::new();
        assert!(submission.progress().is_none());
        assert!(!submission.is_submitting());
    }
}
