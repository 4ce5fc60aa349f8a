/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use crate::{
	SimError,
	cache::processor::{AccessInfo, EvictionContext, PolicyState},
	dstructures::KeyedPq,
	workload::FileId,
};

/// Evicts the file with the lowest fetch cost, i.e. the smallest cached
/// size.
pub struct McfState {
	pq: KeyedPq<()>,
}

impl McfState {
	pub fn new() -> Self {
		McfState {
			pq: KeyedPq::new(false),
		}
	}
}

impl PolicyState for McfState {
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
		_ind: usize,
		_ensure: bool,
		info: &AccessInfo,
	) -> Result<(), SimError> {
		self.pq.add_or_change_value(file, info.total_bytes as f64, ());

		Ok(())
	}
}
