//! On-disk artifacts produced by a survey: recordings, maps and trajectories.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::error::Result;

/// Directory-rooted store; each artifact kind gets its own subdirectory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
	root: PathBuf,
}

impl ArtifactStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Path of `name` under `kind`. Path separators in `name` are replaced.
	pub fn path(&self, kind: &str, name: &str) -> PathBuf {
		self.root.join(kind).join(sanitize(name))
	}

	/// Writes `value` as pretty JSON, replacing the file atomically.
	pub async fn write_json<T: Serialize + ?Sized>(&self, kind: &str, name: &str, value: &T) -> Result<PathBuf> {
		let path = self.path(kind, name);
		fs::create_dir_all(self.root.join(kind)).await?;

		let bytes = serde_json::to_vec_pretty(value)?;
		let tmp = path.with_extension("json.tmp");
		fs::write(&tmp, &bytes).await?;
		fs::rename(&tmp, &path).await?;

		debug!(path = %path.display(), bytes = bytes.len(), "artifact written");
		Ok(path)
	}

	/// Opens `name` under `kind` for appending, creating it if needed.
	pub async fn open_append(&self, kind: &str, name: &str) -> Result<(PathBuf, fs::File)> {
		let path = self.path(kind, name);
		fs::create_dir_all(self.root.join(kind)).await?;
		let file = fs::OpenOptions::new().create(true).append(true).open(&path).await?;
		Ok((path, file))
	}
}

fn sanitize(name: &str) -> String {
	name.chars()
		.map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
		.collect()
}

/// Milliseconds since the Unix epoch; zero if the clock is before it.
pub(crate) fn unix_millis() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0)
}
