//! Maps logical (slash-separated) manifest paths to absolute filesystem
//! paths, with a platform shim for macOS app bundles.
//!
//! Selected once at construction, the way `Config::finalize_components`
//! precomputes derived state up front rather than re-deriving it on
//! every lookup.

use std::path::{Component, Path, PathBuf};


#[derive(Debug)]
pub(crate) enum PathResolver
{
	/// Logical paths resolve straight under `base`.
	Plain
	{
		base: PathBuf,
	},

	/// `base` is `<app>.app/Contents/Resources/autorun`; any logical
	/// path whose first segment ends in `.app` resolves under
	/// `app_root` instead of `base`.
	MacAppBundle
	{
		base: PathBuf,
		app_root: PathBuf,
	},
}


impl PathResolver
{
	pub(crate) fn new(base: &Path) -> Self
	{
		match mac_app_root(base) {
			Some(app_root) => Self::MacAppBundle {
				base: base.to_path_buf(),
				app_root,
			},
			None => Self::Plain { base: base.to_path_buf() },
		}
	}


	pub(crate) fn base(&self) -> &Path
	{
		match self {
			Self::Plain { base } => base,
			Self::MacAppBundle { base, .. } => base,
		}
	}


	/// Resolve a logical, slash-separated path into an absolute
	/// filesystem path.
	pub(crate) fn resolve(&self, logical: &str) -> PathBuf
	{
		match self {
			Self::Plain { base } => crate::util::path_join(base, logical),

			Self::MacAppBundle { base, app_root } => {
				let mut segs = logical.split('/');
				match segs.next() {
					Some(first) if first.ends_with(".app") => {
						let rest: Vec<&str> = segs.collect();
						crate::util::path_join(app_root, rest.join("/"))
					},
					_ => crate::util::path_join(base, logical),
				}
			},
		}
	}
}


/// If `base` matches `<something>.app/Contents/Resources/autorun`,
/// return `<something>.app`'s absolute path.
fn mac_app_root(base: &Path) -> Option<PathBuf>
{
	let comps: Vec<Component> = base.components().collect();

	for (i, c) in comps.iter().enumerate()
	{
		let Component::Normal(name) = c else { continue };
		if !name.to_string_lossy().ends_with(".app") { continue }

		let rest: Vec<String> = comps[i + 1..].iter()
				.map(|c| c.as_os_str().to_string_lossy().into_owned())
				.collect();
		if rest == ["Contents", "Resources", "autorun"]
		{
			let app_root: PathBuf = comps[..=i].iter().collect();
			return Some(app_root);
		}
	}

	None
}



#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn plain_resolve()
	{
		let r = PathResolver::new(Path::new("/opt/mygame"));
		assert_eq!(r.resolve("data/script.rpy"),
				PathBuf::from("/opt/mygame/data/script.rpy"));
	}

	#[test]
	fn mac_bundle_detects_and_resolves()
	{
		let base = Path::new("/Applications/MyGame.app/Contents/Resources/autorun");
		let r = PathResolver::new(base);
		assert!(matches!(r, PathResolver::MacAppBundle { .. }));

		let resolved = r.resolve("MyGame.app/Contents/MacOS/MyGame");
		assert_eq!(resolved,
				PathBuf::from("/Applications/MyGame.app/Contents/MacOS/MyGame"));
	}

	#[test]
	fn mac_bundle_non_app_path_resolves_under_base()
	{
		let base = Path::new("/Applications/MyGame.app/Contents/Resources/autorun");
		let r = PathResolver::new(base);

		let resolved = r.resolve("game/script.rpyc");
		assert_eq!(resolved, base.join("game/script.rpyc"));
	}

	#[test]
	fn non_bundle_base_is_plain()
	{
		let r = PathResolver::new(Path::new("/opt/mygame/not/an/app/bundle"));
		assert!(matches!(r, PathResolver::Plain { .. }));
	}
}
