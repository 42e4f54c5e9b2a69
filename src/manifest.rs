//! Server manifest: what the update server says is the current state of
//! each module, fetched and parsed the way `server/http.rs::get_bytes`
//! fetches small JSON blobs.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;


/// One module's entry, as described by either the server manifest or the
/// locally persisted snapshot (see `crate::state`). `digest` and `url`
/// are only ever populated from the server; a snapshot entry built from
/// an unpacked archive leaves them `None`.
#[derive(Debug, Clone, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub(crate) struct ModuleEntry
{
	/// Opaque version string; compared for equality only.
	pub(crate) version: String,

	/// Logical file paths (slash-separated, resolved via the path
	/// resolver before touching disk).
	pub(crate) files: Vec<String>,

	/// Logical directory paths.
	pub(crate) directories: Vec<String>,

	/// Subset of `files` that must be marked executable on disk.
	#[serde(default)]
	pub(crate) xbit: Vec<String>,

	/// Hex SHA-256 of the delivered archive. Server-only.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub(crate) digest: Option<String>,

	/// Relative URL to the archive, resolved against the manifest URL.
	/// Server-only.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub(crate) url: Option<String>,
}


/// Mapping from module name to its entry. Used both for the server
/// manifest and (see `crate::state::Snapshot`) the installed snapshot.
pub(crate) type ModuleMap = HashMap<String, ModuleEntry>;


/// Errors fetching or parsing the server manifest.
#[derive(Debug)]
#[derive(Error)]
pub(crate) enum ManifestErr
{
	#[error("HTTP error fetching manifest: {0}")]
	Http(#[from] Box<ureq::Error>),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Manifest JSON parse error: {0}")]
	Json(#[from] serde_json::Error),
}


/// Fetch the server manifest from `url`, saving a copy to
/// `<updatedir>/updates.json`, and parse it.
///
/// If the parsed document carries a `monkeypatch` field, it's discarded
/// with a warning; honoring it would mean executing server-supplied code
/// at fetch time, which this rewrite refuses unconditionally.
pub(crate) fn fetch(url: &str, updatedir: &Path) -> Result<ModuleMap, ManifestErr>
{
	let body = get_bytes(url)?;

	std::fs::write(updatedir.join("updates.json"), &body)?;

	parse(&body)
}


/// Parse a manifest document already in memory.
pub(crate) fn parse(body: &[u8]) -> Result<ModuleMap, ManifestErr>
{
	let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(body)?;

	if raw.contains_key("monkeypatch")
	{
		eprintln!("warning: manifest contains a 'monkeypatch' field; \
				refusing to honor it, ignoring");
	}

	let mut modules = ModuleMap::new();
	for (name, val) in raw
	{
		if name == "monkeypatch" { continue; }
		let entry: ModuleEntry = serde_json::from_value(val)?;
		modules.insert(name, entry);
	}

	Ok(modules)
}


/// GET a URL's body into memory. Small payloads only (manifests are a
/// few KB to a few hundred KB at most).
fn get_bytes(url: &str) -> Result<Vec<u8>, ManifestErr>
{
	let agent = mk_agent();
	let resp = agent.get(url).call().map_err(Box::new)?;

	let mut buf = Vec::new();
	use std::io::Read as _;
	resp.into_reader().read_to_end(&mut buf)?;
	Ok(buf)
}


fn mk_agent() -> ureq::Agent
{
	ureq::AgentBuilder::new()
		.timeout_connect(std::time::Duration::from_secs(10))
		.timeout(std::time::Duration::from_secs(60))
		.build()
}



#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn parse_basic()
	{
		let doc = br#"{
			"core": {
				"version": "2",
				"files": ["a.txt", "b.txt"],
				"directories": ["dir"],
				"xbit": ["a.txt"],
				"digest": "deadbeef",
				"url": "core.update"
			}
		}"#;

		let modules = parse(doc).unwrap();
		let core = modules.get("core").expect("core module present");
		assert_eq!(core.version, "2");
		assert_eq!(core.files, vec!["a.txt", "b.txt"]);
		assert_eq!(core.xbit, vec!["a.txt"]);
		assert_eq!(core.digest.as_deref(), Some("deadbeef"));
	}

	#[test]
	fn monkeypatch_discarded()
	{
		let doc = br#"{
			"monkeypatch": "os.system('rm -rf /')",
			"core": {"version": "1", "files": [], "directories": []}
		}"#;

		let modules = parse(doc).unwrap();
		assert!(!modules.contains_key("monkeypatch"));
		assert!(modules.contains_key("core"));
	}
}
