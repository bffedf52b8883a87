//! Pointer segment handling.

/// Escapes a key for use as a pointer segment (`~` as `~0`, `/` as `~1`).
pub fn escape(key: &str) -> String {
	key.replace('~', "~0").replace('/', "~1")
}

/// Reverses [`escape`].
pub fn unescape(segment: &str) -> String {
	segment.replace("~1", "/").replace("~0", "~")
}

/// Appends an escaped key to a base pointer.
pub(crate) fn child(base: &str, key: &str) -> String {
	format!("{base}/{}", escape(key))
}

/// Appends a list index to a base pointer.
pub(crate) fn index(base: &str, idx: usize) -> String {
	format!("{base}/{idx}")
}

/// Pointer used when an operation targets `base` itself.
pub(crate) fn target(base: &str) -> &str {
	if base.is_empty() { "/" } else { base }
}

/// Splits a pointer into unescaped segments. Returns `None` for the root
/// (`""` or `"/"`).
pub(crate) fn segments(path: &str) -> Option<Vec<String>> {
	if path.is_empty() || path == "/" {
		return None;
	}
	let rest = path.strip_prefix('/').unwrap_or(path);
	Some(rest.split('/').map(unescape).collect())
}
