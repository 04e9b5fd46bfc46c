//! Path Matcher: four pattern classes selected by syntactic sniffing, each
//! dispatching to the cheapest matcher that fits rather than compiling
//! every pattern down to a single general grammar.

use std::collections::HashMap;

use regex::Regex;

/// A compiled pattern, cached once per rule (patterns don't change without a
/// full config reload, so there's no need to recompile per-request).
#[derive(Debug)]
pub enum CompiledPattern {
	Regex(Regex),
	Exact(String),
	PrefixWildcard(String),
	Segmented(Vec<Segment>),
}

#[derive(Debug, Clone)]
pub enum Segment {
	Literal(String),
	Param(String),
}

#[derive(Debug, Default, Clone)]
pub struct MatchResult {
	pub matched: bool,
	pub path_params: HashMap<String, String>,
}

impl CompiledPattern {
	pub fn compile(pattern: &str) -> Result<CompiledPattern, regex::Error> {
		if pattern.starts_with('^') || pattern.starts_with("(?") {
			return Ok(CompiledPattern::Regex(Regex::new(pattern)?));
		}
		if pattern == "*" || pattern.ends_with("/*") {
			let prefix = pattern.trim_end_matches('*').to_string();
			return Ok(CompiledPattern::PrefixWildcard(prefix));
		}
		if pattern.contains('{') || pattern.contains(':') {
			let segments = pattern
				.trim_matches('/')
				.split('/')
				.map(|seg| {
					if let Some(name) = seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
						Segment::Param(name.to_string())
					} else if let Some(name) = seg.strip_prefix(':') {
						Segment::Param(name.to_string())
					} else {
						Segment::Literal(seg.to_string())
					}
				})
				.collect();
			return Ok(CompiledPattern::Segmented(segments));
		}
		Ok(CompiledPattern::Exact(clean_path(pattern)))
	}

	pub fn matches(&self, path: &str) -> MatchResult {
		let cleaned = clean_path(path);
		match self {
			CompiledPattern::Regex(re) => match re.captures(&cleaned) {
				Some(caps) if caps.get(0).map(|m| m.as_str()) == Some(cleaned.as_str()) => {
					let mut path_params = HashMap::new();
					for name in re.capture_names().flatten() {
						if let Some(m) = caps.name(name) {
							path_params.insert(name.to_string(), m.as_str().to_string());
						}
					}
					MatchResult {
						matched: true,
						path_params,
					}
				},
				_ => MatchResult::default(),
			},
			CompiledPattern::Exact(want) => MatchResult {
				matched: *want == cleaned,
				path_params: HashMap::new(),
			},
			CompiledPattern::PrefixWildcard(prefix) => MatchResult {
				matched: cleaned.starts_with(prefix.as_str()),
				path_params: HashMap::new(),
			},
			CompiledPattern::Segmented(segments) => {
				let parts: Vec<&str> = cleaned.trim_matches('/').split('/').collect();
				if parts.len() != segments.len() {
					return MatchResult::default();
				}
				let mut path_params = HashMap::new();
				for (seg, part) in segments.iter().zip(parts.iter()) {
					match seg {
						Segment::Literal(lit) => {
							if lit != part {
								return MatchResult::default();
							}
						},
						Segment::Param(name) => {
							path_params.insert(name.clone(), part.to_string());
						},
					}
				}
				MatchResult {
					matched: true,
					path_params,
				}
			},
		}
	}
}

/// Normalizes `.` and `..` segments the way an HTTP path cleaner would,
/// without touching the query string (callers pass the path component only).
pub fn clean_path(path: &str) -> String {
	let absolute = path.starts_with('/');
	let mut stack: Vec<&str> = Vec::new();
	for seg in path.split('/') {
		match seg {
			"" | "." => {},
			".." => {
				stack.pop();
			},
			other => stack.push(other),
		}
	}
	let joined = stack.join("/");
	if absolute {
		format!("/{joined}")
	} else {
		joined
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exact_match() {
		let p = CompiledPattern::compile("/foo/bar").unwrap();
		assert!(p.matches("/foo/bar").matched);
		assert!(!p.matches("/foo/bar/baz").matched);
	}

	#[test]
	fn wildcard_suffix() {
		let p = CompiledPattern::compile("/foo/*").unwrap();
		assert!(p.matches("/foo/bar/baz").matched);
		assert!(!p.matches("/other").matched);
	}

	#[test]
	fn segmented_brace_param() {
		let p = CompiledPattern::compile("/users/{id}").unwrap();
		let m = p.matches("/users/42");
		assert!(m.matched);
		assert_eq!(m.path_params.get("id"), Some(&"42".to_string()));
	}

	#[test]
	fn segmented_colon_param() {
		let p = CompiledPattern::compile("/users/:id/posts/:post").unwrap();
		let m = p.matches("/users/42/posts/7");
		assert!(m.matched);
		assert_eq!(m.path_params.get("id"), Some(&"42".to_string()));
		assert_eq!(m.path_params.get("post"), Some(&"7".to_string()));
	}

	#[test]
	fn regex_named_groups() {
		let p = CompiledPattern::compile(r"^/users/(?P<id>\d+)$").unwrap();
		let m = p.matches("/users/42");
		assert!(m.matched);
		assert_eq!(m.path_params.get("id"), Some(&"42".to_string()));
	}

	#[test]
	fn path_cleaning() {
		assert_eq!(clean_path("/foo/../bar"), "/bar");
		assert_eq!(clean_path("/foo/./bar"), "/foo/bar");
	}

	#[test]
	fn segment_count_must_match() {
		let p = CompiledPattern::compile("/a/{x}").unwrap();
		assert!(!p.matches("/a/b/c").matched);
	}
}
