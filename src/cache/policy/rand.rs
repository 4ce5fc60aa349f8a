/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use rand::{Rng, SeedableRng, rngs::StdRng};
use rustc_hash::FxHashMap;

use crate::{
	SimError,
	cache::processor::{AccessInfo, EvictionContext, PolicyState},
	workload::FileId,
};

/// Evicts a uniformly random file.
pub struct RandState {
	files: Vec<FileId>,
	slots: FxHashMap<FileId, usize>,
	rng: StdRng,
}

impl RandState {
	pub fn new(seed: Option<u64>) -> Self {
		let rng = match seed {
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_entropy(),
		};

		RandState {
			files: Vec::new(),
			slots: FxHashMap::default(),
			rng,
		}
	}

	fn swap_remove(&mut self, slot: usize) -> FileId {
		let file = self.files.swap_remove(slot);
		self.slots.remove(&file);

		if let Some(moved) = self.files.get(slot) {
			self.slots.insert(moved.clone(), slot);
		}

		file
	}
}

impl PolicyState for RandState {
	fn pop_eviction_candidates(
		&mut self,
		_ctx: &EvictionContext,
	) -> Result<Vec<FileId>, SimError> {
		if self.files.is_empty() {
			return Err(SimError::NoEvictionCandidate);
		}

		let slot = self.rng.gen_range(0..self.files.len());

		Ok(vec![self.swap_remove(slot)])
	}

	fn contains(&self, file: &FileId) -> bool {
		self.slots.contains_key(file)
	}

	fn remove_file(&mut self, file: &FileId) -> Result<(), SimError> {
		let slot = *self.slots
			.get(file)
			.ok_or(SimError::NotInCache)?;

		self.swap_remove(slot);

		Ok(())
	}

	fn process_access(
		&mut self,
		file: &FileId,
		_ind: usize,
		ensure: bool,
		_info: &AccessInfo,
	) -> Result<(), SimError> {
		if ensure && !self.slots.contains_key(file) {
			self.slots.insert(file.clone(), self.files.len());
			self.files.push(file.clone());
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache::policy::tests::{drive, uniform_trace};

	#[test]
	fn it_tracks_exactly_the_cached_files() {
		let mut state = RandState::new(Some(7));

		let trace = uniform_trace(&["a", "b", "c", "a", "b"]);

		for (ind, access) in trace.iter().enumerate() {
			let info = AccessInfo {
				access: access.clone(),
				file_hit: false,
				bytes_hit: 0,
				bytes_missed: 1,
				bytes_added: 1,
				bytes_removed: 0,
				total_bytes: 1,
				evicted_files: Vec::new(),
			};

			state.process_access(&access.file, ind, true, &info).unwrap();
		}

		assert_eq!(state.files.len(), 3);
		assert!(state.contains(&"a".to_string()));

		state.remove_file(&"b".to_string()).unwrap();
		assert!(!state.contains(&"b".to_string()));
		assert!(state.remove_file(&"b".to_string()).is_err());
	}

	#[test]
	fn evictions_empty_the_cache_one_file_at_a_time() {
		let trace = uniform_trace(&["a", "b", "c", "d", "e", "f"]);
		let infos = drive(Box::new(RandState::new(Some(3))), 3, &trace);

		// every miss beyond the capacity evicts exactly one uniform file
		for info in &infos[3..] {
			assert_eq!(info.evicted_files.len(), 1);
			assert_eq!(info.bytes_removed, 1);
		}
	}

	#[test]
	fn seeded_replays_are_identical() {
		let trace = uniform_trace(&["a", "b", "c", "d", "a", "e", "b", "f", "c"]);

		let first = drive(Box::new(RandState::new(Some(11))), 2, &trace);
		let second = drive(Box::new(RandState::new(Some(11))), 2, &trace);

		assert_eq!(first, second);
	}
}
