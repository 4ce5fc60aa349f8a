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

/// Evicts the least recently accessed file.
pub struct LruState {
	lru: LruMap<()>,
}

impl LruState {
	pub fn new() -> Self {
		LruState {
			lru: LruMap::default(),
		}
	}
}

impl PolicyState for LruState {
	fn pop_eviction_candidates(
		&mut self,
		_ctx: &EvictionContext,
	) -> Result<Vec<FileId>, SimError> {
		let (file, _) = self.lru
			.pop_lru()
			.ok_or(SimError::NoEvictionCandidate)?;

		Ok(vec![file])
	}

	fn contains(&self, file: &FileId) -> bool {
		self.lru.contains(file)
	}

	fn remove_file(&mut self, file: &FileId) -> Result<(), SimError> {
		self.lru
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
			self.lru.insert(file.clone(), ());
		}

		self.lru.access(file);

		Ok(())
	}
}
