/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::rc::Rc;

use crate::{
	SimError,
	cache::processor::{AccessInfo, EvictionContext, PolicyState},
	dstructures::{KeyedPq, ReuseTimer},
	workload::FileId,
};

/// Belady's MIN, replayed offline.
///
/// Evicts the cached file whose next use lies farthest in the future.
/// The reuse index of every access is precomputed over the full trace;
/// on each access a file's priority becomes the index of its next use,
/// infinity if it is never used again. For uniform sizes this yields the
/// best possible hit rate.
pub struct MinState {
	reuse_timer: Rc<ReuseTimer>,
	pq: KeyedPq<()>,
}

impl MinState {
	pub fn new(reuse_timer: Rc<ReuseTimer>) -> Self {
		MinState {
			reuse_timer,
			pq: KeyedPq::new(true),
		}
	}
}

impl PolicyState for MinState {
	fn pop_eviction_candidates(
		&mut self,
		_ctx: &EvictionContext,
	) -> Result<Vec<FileId>, SimError> {
		let (file, _, _) = self.pq
			.pop()
			.ok_or(SimError::NoEvictionCandidate)?;

		Ok(vec![file])
	}

	fn contains(&self, file: &FileId) -> bool {
		self.pq.contains(file)
	}

	fn remove_file(&mut self, file: &FileId) -> Result<(), SimError> {
		self.pq
			.remove(file)
			.map(|_| ())
			.ok_or(SimError::NotInCache)
	}

	fn process_access(
		&mut self,
		file: &FileId,
		ind: usize,
		_ensure: bool,
		_info: &AccessInfo,
	) -> Result<(), SimError> {
		let reuse_ind = self.reuse_timer.reuse_ind_inf(ind);
		self.pq.add_or_change_value(file, reuse_ind, ());

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache::policy::{
		lru::LruState,
		tests::{cyclic_trace, drive, drive_offline, files_hit, uniform_trace},
	};

	#[test]
	fn it_keeps_the_sooner_reused_files() {
		// at the access of d, a is reused sooner than b and c
		let trace = uniform_trace(&["a", "b", "c", "d", "a", "c", "b"]);

		let infos = drive_offline(
			|reuse_timer| Box::new(MinState::new(reuse_timer)),
			3,
			&trace,
		);

		// d evicts the file reused farthest in the future
		assert_eq!(infos[3].evicted_files.len(), 1);
		assert!(infos[4].file_hit, "a must survive the eviction at d");
	}

	#[test]
	fn it_beats_lru_on_a_cyclic_workload() {
		let trace = cyclic_trace(&["a", "b", "c", "d", "e"], 10);

		let min = drive_offline(
			|reuse_timer| Box::new(MinState::new(reuse_timer)),
			3,
			&trace,
		);

		let lru = drive(Box::new(LruState::new()), 3, &trace);

		// LRU degenerates on a cyclic scan while MIN retains part of the
		// working set
		assert!(files_hit(&min) >= files_hit(&lru) + 10);
	}

	#[test]
	fn never_reused_files_are_evicted_first() {
		let trace = uniform_trace(&["a", "b", "c", "d", "b", "a"]);

		let infos = drive_offline(
			|reuse_timer| Box::new(MinState::new(reuse_timer)),
			3,
			&trace,
		);

		// c is never reused and goes first
		assert_eq!(infos[3].evicted_files, vec!["c".to_string()]);
	}
}
