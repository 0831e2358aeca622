//! CSV mirror of accepted leads, for spreadsheets and external tooling.
//!
//! Append-only. The header row is written when the file is new or empty.
//! The mirror is a convenience copy: the store remains the source of truth.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use leadscout_common::Lead;

const HEADER: [&str; 7] = ["url", "name", "job_title", "company", "location", "emails", "bio"];

/// Shared by every run of a controller. Appends are serialized so the
/// header check and the write happen as one step.
pub struct LeadMirror {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LeadMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, lead: &Lead) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let needs_header = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        let mut buf = Vec::new();
        if needs_header {
            write_row(&mut buf, &HEADER)?;
        }
        let emails = lead.emails.iter().cloned().collect::<Vec<_>>().join("; ");
        write_row(
            &mut buf,
            &[
                lead.profile_url.as_str(),
                &lead.name,
                &lead.job_title,
                &lead.company,
                &lead.location,
                &emails,
                &lead.bio,
            ],
        )?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening {}", self.path.display()))?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<W: Write>(mut w: W, row: &[&str]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            write!(w, ",")?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{cell}")?;
        }
    }
    writeln!(w)
}
