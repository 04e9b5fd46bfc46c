//! Request Logger: a bounded, FIFO-evicting ring buffer of request/response
//! pairs for the admin UI (default capacity 1000, oldest entries evicted
//! first) rather than letting it grow unbounded.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogEntry {
	pub id: String,
	pub endpoint_id: Option<String>,
	pub method: String,
	pub path: String,
	pub started_at: DateTime<Utc>,
	pub status_code: Option<u16>,
	pub completed_at: Option<DateTime<Utc>>,
	pub duration_ms: Option<u64>,
	pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogSummary {
	pub id: String,
	pub endpoint_id: Option<String>,
	pub method: String,
	pub path: String,
	pub status_code: Option<u16>,
	pub duration_ms: Option<u64>,
}

pub struct RequestLogger {
	capacity: usize,
	entries: Mutex<VecDeque<RequestLogEntry>>,
}

impl RequestLogger {
	pub fn new(capacity: usize) -> RequestLogger {
		RequestLogger {
			capacity: capacity.max(1),
			entries: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
		}
	}

	/// Records a new, pending entry and returns its id for later completion.
	pub fn log_request(&self, endpoint_id: Option<String>, method: &str, path: &str) -> String {
		let id = uuid_like();
		let entry = RequestLogEntry {
			id: id.clone(),
			endpoint_id,
			method: method.to_string(),
			path: path.to_string(),
			started_at: Utc::now(),
			status_code: None,
			completed_at: None,
			duration_ms: None,
			error: None,
		};
		let mut entries = self.entries.lock().expect("request logger poisoned");
		if entries.len() >= self.capacity {
			entries.pop_front();
		}
		entries.push_back(entry);
		id
	}

	pub fn update_request_log(&self, id: &str, status_code: Option<u16>, error: Option<String>) {
		let mut entries = self.entries.lock().expect("request logger poisoned");
		if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
			let completed_at = Utc::now();
			entry.duration_ms = Some(
				(completed_at - entry.started_at)
					.num_milliseconds()
					.max(0) as u64,
			);
			entry.completed_at = Some(completed_at);
			entry.status_code = status_code;
			entry.error = error;
		}
	}

	pub fn list_summaries(&self) -> Vec<RequestLogSummary> {
		self.entries
			.lock()
			.expect("request logger poisoned")
			.iter()
			.rev()
			.map(|e| RequestLogSummary {
				id: e.id.clone(),
				endpoint_id: e.endpoint_id.clone(),
				method: e.method.clone(),
				path: e.path.clone(),
				status_code: e.status_code,
				duration_ms: e.duration_ms,
			})
			.collect()
	}

	pub fn get(&self, id: &str) -> Option<RequestLogEntry> {
		self.entries
			.lock()
			.expect("request logger poisoned")
			.iter()
			.find(|e| e.id == id)
			.cloned()
	}

	pub fn clear(&self) {
		self.entries.lock().expect("request logger poisoned").clear();
	}
}

fn uuid_like() -> String {
	use rand::RngCore;
	let mut bytes = [0u8; 16];
	rand::rng().fill_bytes(&mut bytes);
	bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn evicts_oldest_when_full() {
		let logger = RequestLogger::new(2);
		let first = logger.log_request(None, "GET", "/a");
		logger.log_request(None, "GET", "/b");
		logger.log_request(None, "GET", "/c");
		assert!(logger.get(&first).is_none());
		assert_eq!(logger.list_summaries().len(), 2);
	}

	#[test]
	fn update_sets_completion_fields() {
		let logger = RequestLogger::new(10);
		let id = logger.log_request(Some("ep1".into()), "GET", "/x");
		logger.update_request_log(&id, Some(200), None);
		let entry = logger.get(&id).unwrap();
		assert_eq!(entry.status_code, Some(200));
		assert!(entry.completed_at.is_some());
	}
}
