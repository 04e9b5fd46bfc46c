//! Certificate Manager & Cache: generates a self-signed CA on first use,
//! mints per-SNI leaf certificates signed by it, and caches them with
//! double-checked locking and LRU-by-creation-time eviction.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use rcgen::{CertificateParams, DistinguishedName, DnType, Issuer, KeyPair};

use anyhow::{Context, Result};

const CA_SUBJECT: &str = "Mockelot Local CA";

/// A generated certificate plus its private key, in PEM, ready to load into
/// `rustls::ServerConfig` via `rustls-pemfile`.
#[derive(Clone)]
pub struct CertEntry {
	pub cert_pem: String,
	pub key_pem: String,
	pub created_at: Instant,
}

struct CacheState {
	entries: HashMap<String, CertEntry>,
}

pub struct CertCache {
	capacity: usize,
	state: Mutex<CacheState>,
	ca: Mutex<Option<(rcgen::Certificate, KeyPair)>>,
	storage_dir: Option<PathBuf>,
}

impl CertCache {
	pub fn new(capacity: usize) -> CertCache {
		let storage_dir = home_certs_dir();
		CertCache {
			capacity: capacity.max(1),
			state: Mutex::new(CacheState {
				entries: HashMap::new(),
			}),
			ca: Mutex::new(None),
			storage_dir,
		}
	}

	/// Double-checked get-or-create: a cache hit never touches the CA lock.
	pub fn get_or_create(&self, sni: &str) -> Result<CertEntry> {
		if let Some(entry) = self.state.lock().expect("cert cache poisoned").entries.get(sni) {
			return Ok(entry.clone());
		}

		let ca_guard = self.ca.lock().expect("ca lock poisoned");
		let entry = {
			let mut guard = self.state.lock().expect("cert cache poisoned");
			if let Some(entry) = guard.entries.get(sni) {
				entry.clone()
			} else {
				drop(guard);
				let entry = self.generate_leaf(sni, ca_guard)?;
				let mut guard = self.state.lock().expect("cert cache poisoned");
				self.evict_if_full(&mut guard);
				guard.entries.insert(sni.to_string(), entry.clone());
				entry
			}
		};
		Ok(entry)
	}

	fn evict_if_full(&self, guard: &mut CacheState) {
		if guard.entries.len() < self.capacity {
			return;
		}
		if let Some(oldest) = guard
			.entries
			.iter()
			.min_by_key(|(_, v)| v.created_at)
			.map(|(k, _)| k.clone())
		{
			guard.entries.remove(&oldest);
		}
	}

	fn generate_leaf(
		&self,
		sni: &str,
		mut ca_guard: std::sync::MutexGuard<Option<(rcgen::Certificate, KeyPair)>>,
	) -> Result<CertEntry> {
		if ca_guard.is_none() {
			*ca_guard = Some(self.load_or_generate_ca()?);
		}
		let (ca_cert, ca_key) = ca_guard.as_ref().expect("just populated");

		let mut params = CertificateParams::new(vec![sni.to_string()]).context("invalid SNI for cert params")?;
		let mut dn = DistinguishedName::new();
		dn.push(DnType::CommonName, sni);
		params.distinguished_name = dn;

		let leaf_key = KeyPair::generate().context("generating leaf key")?;
		let issuer = Issuer::new(params.clone(), ca_key);
		let leaf_cert = params
			.signed_by(&leaf_key, &issuer)
			.context("signing leaf certificate")?;

		let _ = ca_cert;
		Ok(CertEntry {
			cert_pem: leaf_cert.pem(),
			key_pem: leaf_key.serialize_pem(),
			created_at: Instant::now(),
		})
	}

	fn load_or_generate_ca(&self) -> Result<(rcgen::Certificate, KeyPair)> {
		if let Some(dir) = &self.storage_dir {
			let cert_path = dir.join("ca-cert.pem");
			let key_path = dir.join("ca-key.pem");
			if cert_path.exists() && key_path.exists() {
				let cert_pem = std::fs::read_to_string(&cert_path).context("reading cached CA cert")?;
				let key_pem = std::fs::read_to_string(&key_path).context("reading cached CA key")?;
				let key_pair = KeyPair::from_pem(&key_pem).context("parsing cached CA key")?;
				let params = CertificateParams::from_ca_cert_pem(&cert_pem).context("parsing cached CA cert")?;
				let cert = params.self_signed(&key_pair).context("rebuilding cached CA")?;
				return Ok((cert, key_pair));
			}
		}

		let mut params = CertificateParams::new(Vec::<String>::new()).context("building CA params")?;
		let mut dn = DistinguishedName::new();
		dn.push(DnType::CommonName, CA_SUBJECT);
		params.distinguished_name = dn;
		params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);

		let key_pair = KeyPair::generate().context("generating CA key")?;
		let cert = params.self_signed(&key_pair).context("self-signing CA")?;

		if let Some(dir) = &self.storage_dir {
			self.persist_ca(dir, &cert.pem(), &key_pair.serialize_pem())?;
		}

		Ok((cert, key_pair))
	}

	fn persist_ca(&self, dir: &std::path::Path, cert_pem: &str, key_pem: &str) -> Result<()> {
		use std::os::unix::fs::PermissionsExt;

		std::fs::create_dir_all(dir).context("creating cert storage dir")?;
		std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).ok();

		let cert_path = dir.join("ca-cert.pem");
		let key_path = dir.join("ca-key.pem");
		std::fs::write(&cert_path, cert_pem).context("writing CA cert")?;
		std::fs::write(&key_path, key_pem).context("writing CA key")?;
		std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600)).ok();
		Ok(())
	}
}

fn home_certs_dir() -> Option<PathBuf> {
	homedir::my_home()
		.ok()
		.flatten()
		.map(|home| home.join(".mockelot").join("certs"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn caches_and_reuses_leaf_for_same_sni() {
		let cache = CertCache::new(4);
		let first = cache.get_or_create("example.test").unwrap();
		let second = cache.get_or_create("example.test").unwrap();
		assert_eq!(first.cert_pem, second.cert_pem);
	}

	#[test]
	fn distinct_sni_get_distinct_certs() {
		let cache = CertCache::new(4);
		let a = cache.get_or_create("a.test").unwrap();
		let b = cache.get_or_create("b.test").unwrap();
		assert_ne!(a.cert_pem, b.cert_pem);
	}

	#[test]
	fn evicts_oldest_past_capacity() {
		let cache = CertCache::new(1);
		cache.get_or_create("a.test").unwrap();
		cache.get_or_create("b.test").unwrap();
		let state = cache.state.lock().unwrap();
		assert_eq!(state.entries.len(), 1);
		assert!(state.entries.contains_key("b.test"));
	}
}
