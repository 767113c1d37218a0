//! Write-once artifact files in a flat reports directory.
//!
//! These are blocking calls; async callers run them on the blocking pool.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::PathBuf;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use smsreport_core::{Campaign, MessageDetail};

use super::ArtifactError;
use super::codec::{self, ReportKind, SummaryRow, artifact_name};

/// Attempts at finding a free file name before giving up.
const MAX_NAME_ATTEMPTS: i64 = 16;

/// Creates uniquely named CSV artifacts under one directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Summary layout (job artifact or per-date report).
    pub fn write_summary(
        &self,
        kind: ReportKind,
        subject: &str,
        rows: &[SummaryRow],
    ) -> Result<PathBuf, ArtifactError> {
        self.create(kind, subject, |file| codec::write_summary(BufWriter::new(file), rows))
    }

    /// Per-message detail layout for one campaign.
    pub fn write_detail(
        &self,
        campaign: &Campaign,
        details: &[MessageDetail],
    ) -> Result<PathBuf, ArtifactError> {
        let subject = campaign.id.to_string();
        self.create(ReportKind::Campaign, &subject, |file| {
            codec::write_detail(BufWriter::new(file), campaign, details)
        })
    }

    /// Open a fresh file (never an existing one) and render into it.
    ///
    /// A partially written file is removed when rendering fails.
    fn create<F>(&self, kind: ReportKind, subject: &str, render: F) -> Result<PathBuf, ArtifactError>
    where
        F: FnOnce(&mut File) -> Result<(), ArtifactError>,
    {
        fs::create_dir_all(&self.dir)?;

        let (path, mut file) = self.open_unique(kind, subject)?;
        let rendered = render(&mut file).and_then(|_| file.sync_all().map_err(Into::into));
        if let Err(err) = rendered {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %cleanup, "failed to remove partial artifact");
            }
            return Err(err);
        }

        debug!(path = %path.display(), kind = kind.prefix(), "artifact written");
        Ok(path)
    }

    fn open_unique(&self, kind: ReportKind, subject: &str) -> Result<(PathBuf, File), ArtifactError> {
        let now = Utc::now();
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let at = now + Duration::microseconds(attempt);
            let path = self.dir.join(artifact_name(kind, subject, at));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(ArtifactError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free artifact name for {}_{}", kind.prefix(), subject),
        )))
    }
}
