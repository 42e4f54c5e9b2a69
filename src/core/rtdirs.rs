//! Runtime directory info: paths into the single update scratch dir.

use std::path::{Path, PathBuf};


/// The update directory's layout. Unlike the teacher's per-basedir
/// `state.<hash>` split (one `workdir` serving many installs), this
/// domain's update dir already lives under (or is configured
/// specifically for) the one `base` it updates, so there's only ever
/// one of these per invocation.
#[derive(Debug)]
pub(crate) struct RtDirs
{
	dir: PathBuf,
}


impl RtDirs
{
	/// Ensure the update directory exists and is usable.
	pub(crate) fn init(dir: &Path) -> Result<Self, std::io::Error>
	{
		if !dir.exists()
		{
			use std::fs::DirBuilder;
			use std::os::unix::fs::DirBuilderExt as _;
			let mut db = DirBuilder::new();
			db.recursive(true).mode(0o755);
			db.create(dir)?;
		}

		if !dir.is_dir()
		{
			use std::io::{Error, ErrorKind as EK};
			let ds = dir.to_string_lossy();
			return Err(Error::new(EK::AlreadyExists, ds.into_owned()));
		}

		Ok(Self { dir: dir.to_path_buf() })
	}


	pub(crate) fn dir(&self) -> &Path { &self.dir }

	pub(crate) fn current_json(&self) -> PathBuf { self.dir.join("current.json") }
	pub(crate) fn updates_json(&self) -> PathBuf { self.dir.join("updates.json") }
	pub(crate) fn log_path(&self)    -> PathBuf { self.dir.join("log.txt") }

	/// The canonical seed archive built for `module` (§4.5).
	pub(crate) fn module_archive(&self, module: &str) -> PathBuf
	{
		self.dir.join(format!("{module}.update"))
	}

	/// Where the delta tool writes the downloaded archive for `module`.
	pub(crate) fn module_download(&self, module: &str) -> PathBuf
	{
		self.dir.join(format!("{module}.update.new"))
	}

	/// The delta tool's control file for `module`.
	pub(crate) fn module_zsync(&self, module: &str) -> PathBuf
	{
		self.dir.join(format!("{module}.zsync"))
	}
}



#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn init_creates_dir()
	{
		let parent = tempfile::tempdir().unwrap();
		let dir = parent.path().join("update");
		assert!(!dir.exists());

		let rt = RtDirs::init(&dir).unwrap();
		assert!(dir.is_dir());
		assert_eq!(rt.dir(), dir);
	}

	#[test]
	fn paths_are_namespaced_per_module()
	{
		let parent = tempfile::tempdir().unwrap();
		let rt = RtDirs::init(parent.path()).unwrap();

		assert_eq!(rt.module_archive("core"), parent.path().join("core.update"));
		assert_eq!(rt.module_download("core"), parent.path().join("core.update.new"));
		assert_eq!(rt.module_zsync("core"), parent.path().join("core.zsync"));
	}
}
