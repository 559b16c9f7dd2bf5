//! Background task ownership

use tokio::task::{AbortHandle, JoinHandle};

/// Handle to a background task that is aborted when the handle is dropped
#[derive(Debug)]
pub struct BackgroundTask {
	handle: AbortHandle,
}

impl BackgroundTask {
	pub(crate) fn new(handle: JoinHandle<()>) -> Self {
		Self {
			handle: handle.abort_handle(),
		}
	}

	/// Stop the task
	pub fn abort(&self) {
		self.handle.abort();
	}

	/// Whether the task has stopped
	pub fn is_finished(&self) -> bool {
		self.handle.is_finished()
	}
}

impl Drop for BackgroundTask {
	fn drop(&mut self) {
		self.handle.abort();
	}
}
