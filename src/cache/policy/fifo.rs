/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use crate::{
	SimError,
	cache::processor::{AccessInfo, EvictionContext, PolicyState},
	dstructures::LruMap,
	workload::FileId,
};

/// Evicts the file which entered the cache first. Re-accesses do not
/// reorder entries.
pub struct FifoState {
	queue: LruMap<()>,
}

impl FifoState {
	pub fn new() -> Self {
		FifoState {
			queue: LruMap::default(),
		}
	}
}

impl PolicyState for FifoState {
	fn pop_eviction_candidates(
		&mut self,
		_ctx: &EvictionContext,
	) -> Result<Vec<FileId>, SimError> {
		let (file, _) = self.queue
			.pop_lru()
			.ok_or(SimError::NoEvictionCandidate)?;

		Ok(vec![file])
	}

	fn contains(&self, file: &FileId) -> bool {
		self.queue.contains(file)
	}

	fn remove_file(&mut self, file: &FileId) -> Result<(), SimError> {
		self.queue
			.remove(file)
			.map(|_| ())
			.ok_or(SimError::NotInCache)
	}

	fn process_access(
		&mut self,
		file: &FileId,
		_ind: usize,
		ensure: bool,
		_info: &AccessInfo,
	) -> Result<(), SimError> {
		if ensure {
			self.queue.insert(file.clone(), ());
			self.queue.access(file);
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache::policy::tests::{drive, uniform_trace};

	#[test]
	fn it_evicts_in_insertion_order() {
		let trace = uniform_trace(&["a", "b", "a", "a", "c", "d"]);
		let infos = drive(Box::new(FifoState::new()), 2, &trace);

		// re-accessing a does not protect it from eviction
		assert_eq!(infos[4].evicted_files, vec!["a".to_string()]);
		assert_eq!(infos[5].evicted_files, vec!["b".to_string()]);
	}
}
