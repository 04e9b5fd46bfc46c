//! Redirect rewriting. When a proxied backend responds with a
//! `Location` header pointing back at itself, rewrite it to point at the
//! mock server's own path prefix instead, so a client following the
//! redirect keeps talking to Mockelot rather than leaking the backend's
//! real address.

use http::HeaderValue;
use url::Url;

use crate::model::TranslationMode;

/// `backend_url` is the endpoint's backend base (captures already
/// substituted, no path suffix). `translation_mode`/`translated_path`
/// describe how the *current* request's path relates to what the backend
/// actually saw, which is needed to invert the translation for the
/// redirect's target path.
pub fn rewrite_location(
	location: &str,
	backend_url: &str,
	path_prefix: &str,
	translation_mode: TranslationMode,
	translated_path: &str,
	public_base: &str,
) -> Option<HeaderValue> {
	let backend = Url::parse(backend_url).ok()?;
	let target = if let Ok(abs) = Url::parse(location) {
		abs
	} else {
		backend.join(location).ok()?
	};

	// Same backend is decided by host/port alone; the scheme is allowed to
	// differ from what `backend_url` declared (§4.9.5's HTTP→HTTPS upgrade
	// case), so it isn't part of the "is this still the same origin" check.
	if target.host_str() != backend.host_str() || target.port_or_known_default() != backend.port_or_known_default() {
		return HeaderValue::from_str(location).ok();
	}

	let backend_path = backend.path().trim_end_matches('/');
	let suffix = target.path().strip_prefix(backend_path).unwrap_or(target.path());

	let rewritten_path = if !translated_path.is_empty() && suffix.starts_with(translated_path) {
		format!("{}{}", path_prefix.trim_end_matches('/'), &suffix[translated_path.len()..])
	} else {
		match translation_mode {
			// Strip mode removed `path_prefix` before the backend ever saw
			// the path, so the redirect's path needs it added back.
			TranslationMode::Strip => format!("{}{}", path_prefix.trim_end_matches('/'), suffix),
			// `none` already included the prefix in what the backend saw;
			// `translate` has no reliable regex inverse, so pass through.
			TranslationMode::None | TranslationMode::Translate => suffix.to_string(),
		}
	};

	let rewritten_base = rewrite_scheme(public_base, target.scheme());
	let rewritten = format!(
		"{}{}{}",
		rewritten_base.trim_end_matches('/'),
		rewritten_path,
		target.query().map(|q| format!("?{q}")).unwrap_or_default()
	);
	HeaderValue::from_str(&rewritten).ok()
}

/// §4.9.5: the rewritten redirect must never downgrade a client that
/// connected over HTTPS to `http://`, but must honor the backend upgrading
/// a same-origin redirect from `http://` to `https://`. `public_base`
/// already carries the scheme the client connected with; this only ever
/// flips it from `http` to `https`, never the other way.
fn rewrite_scheme(public_base: &str, target_scheme: &str) -> String {
	if target_scheme.eq_ignore_ascii_case("https") && public_base.starts_with("http://") {
		format!("https://{}", &public_base["http://".len()..])
	} else {
		public_base.to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rewrites_same_origin_redirect_in_strip_mode() {
		let out = rewrite_location(
			"/after/login",
			"http://backend.internal:8080/app",
			"/svc",
			TranslationMode::Strip,
			"/after",
			"https://mock.local",
		)
		.unwrap();
		assert_eq!(out, "https://mock.local/svc/after/login");
	}

	#[test]
	fn none_mode_passes_through_without_prepending_prefix() {
		let out = rewrite_location(
			"/svc/after/login",
			"http://backend.internal:8080/app",
			"/svc",
			TranslationMode::None,
			"/svc/after",
			"https://mock.local",
		)
		.unwrap();
		assert_eq!(out, "https://mock.local/svc/after/login");
	}

	#[test]
	fn upgrades_scheme_when_backend_redirect_is_https() {
		let out = rewrite_location(
			"https://backend.internal:8080/app/after/login",
			"http://backend.internal:8080/app",
			"/svc",
			TranslationMode::Strip,
			"/after",
			"http://mock.local",
		)
		.unwrap();
		assert_eq!(out, "https://mock.local/svc/after/login");
	}

	#[test]
	fn never_downgrades_an_https_client_even_if_backend_redirect_is_http() {
		let out = rewrite_location(
			"http://backend.internal:8080/app/after/login",
			"http://backend.internal:8080/app",
			"/svc",
			TranslationMode::Strip,
			"/after",
			"https://mock.local",
		)
		.unwrap();
		assert_eq!(out, "https://mock.local/svc/after/login");
	}

	#[test]
	fn leaves_foreign_redirect_untouched() {
		let out = rewrite_location(
			"https://other.example/x",
			"http://backend.internal:8080/app",
			"/svc",
			TranslationMode::Strip,
			"/after",
			"https://mock.local",
		)
		.unwrap();
		assert_eq!(out, "https://other.example/x");
	}
}
