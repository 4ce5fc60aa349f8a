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

/// Evicts the file with the greatest cached size.
pub struct SizeState {
	pq: KeyedPq<()>,
}

impl SizeState {
	pub fn new() -> Self {
		SizeState {
			pq: KeyedPq::new(true),
		}
	}
}

impl PolicyState for SizeState {
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

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache::policy::tests::{drive, sized_trace};

	#[test]
	fn it_evicts_the_greatest_file_first() {
		let trace = sized_trace(&[("a", 5), ("b", 2), ("c", 8), ("d", 3)]);
		let infos = drive(Box::new(SizeState::new()), 15, &trace);

		assert_eq!(infos[3].evicted_files, vec!["c".to_string()]);
	}

	#[test]
	fn it_may_evict_the_accessed_file_itself() {
		let mut trace = sized_trace(&[("a", 6), ("b", 3)]);

		trace.push(crate::workload::Access {
			access_ts: 3,
			file: "a".to_string(),
			parts: vec![(0, 6), (1, 4)],
		});

		let infos = drive(Box::new(SizeState::new()), 10, &trace);

		// growing a to 10 bytes first evicts the largest file, which is
		// the 6-byte resident copy of a itself; the access becomes a
		// complete miss and b goes too
		assert_eq!(
			infos[2].evicted_files,
			vec!["a".to_string(), "b".to_string()],
		);

		assert_eq!(infos[2].bytes_hit, 0);
		assert_eq!(infos[2].bytes_missed, 10);
		assert_eq!(infos[2].bytes_added, 10);
		assert_eq!(infos[2].total_bytes, 10);
	}
}
