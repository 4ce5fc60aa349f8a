/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use rustc_hash::FxHashMap;

use crate::workload::{Access, BytesSize, PartInd, PartSpec, TimeStamp};

/// Forward reuse index over an access sequence of length `N`.
///
/// For each access `i`, `reuse_ind(i)` is the smallest `j > i` accessing
/// the same file, or `None` if the file is never accessed again. Built in
/// one reverse pass over the sequence.
pub struct ReuseTimer {
	reuse_ind: Vec<u64>,
}

impl ReuseTimer {
	pub fn new(accesses: &[Access]) -> Self {
		let length = accesses.len();
		let mut reuse_ind = vec![length as u64; length];
		let mut next_access = FxHashMap::<&str, usize>::default();

		for (ind, access) in accesses.iter().enumerate().rev() {
			if let Some(&next_ind) = next_access.get(access.file.as_str()) {
				reuse_ind[ind] = next_ind as u64;
			}

			next_access.insert(access.file.as_str(), ind);
		}

		ReuseTimer { reuse_ind }
	}

	pub fn len(&self) -> usize {
		self.reuse_ind.len()
	}

	pub fn is_empty(&self) -> bool {
		self.reuse_ind.is_empty()
	}

	pub fn reuse_ind(&self, ind: usize) -> Option<usize> {
		let reuse_ind = self.reuse_ind[ind] as usize;

		if reuse_ind >= self.reuse_ind.len() {
			return None;
		}

		Some(reuse_ind)
	}

	/// The reuse index as a priority key: `f64::INFINITY` when the file
	/// is never accessed again.
	pub fn reuse_ind_inf(&self, ind: usize) -> f64 {
		match self.reuse_ind(ind) {
			Some(reuse_ind) => reuse_ind as f64,
			None => f64::INFINITY,
		}
	}

	/// Distance to the next access of the same file.
	pub fn reuse_time(&self, ind: usize) -> Option<usize> {
		self.reuse_ind(ind).map(|reuse_ind| reuse_ind - ind)
	}
}

/// Bidirectional reuse index which additionally records each access's
/// timestamp and sorted part list.
///
/// `accessed_after` and `accessed_before` answer, for a set of requested
/// parts, how many bytes of each part are also read by later (earlier)
/// accesses of the same file, capped at the requested sizes.
pub struct FullReuseIndex {
	prev_use_ind: Vec<u64>,
	next_use_ind: Vec<u64>,
	access_ts: Vec<TimeStamp>,

	// parts_offset[i]..parts_offset[i + 1] indexes the flattened part
	// lists of access i
	parts_offset: Vec<usize>,
	parts: Vec<PartInd>,
	part_sizes: Vec<BytesSize>,
}

impl FullReuseIndex {
	pub fn new(accesses: &[Access]) -> Self {
		let length = accesses.len();

		let mut prev_use_ind = vec![length as u64; length];
		let mut access_ts = vec![0; length];
		let mut parts_offset = vec![0; length];
		let mut parts = Vec::new();
		let mut part_sizes = Vec::new();

		let mut prev_access = FxHashMap::<&str, usize>::default();
		let mut running_offset = 0;

		for (ind, access) in accesses.iter().enumerate() {
			if let Some(&prev_ind) = prev_access.get(access.file.as_str()) {
				prev_use_ind[ind] = prev_ind as u64;
			}

			prev_access.insert(access.file.as_str(), ind);
			access_ts[ind] = access.access_ts;

			let mut sorted_parts = access.parts.clone();
			sorted_parts.sort_by_key(|(part_ind, _)| *part_ind);

			parts_offset[ind] = running_offset;
			running_offset += sorted_parts.len();

			for (part_ind, part_bytes) in sorted_parts {
				parts.push(part_ind);
				part_sizes.push(part_bytes);
			}
		}

		FullReuseIndex {
			prev_use_ind,
			next_use_ind: ReuseTimer::new(accesses).reuse_ind,
			access_ts,
			parts_offset,
			parts,
			part_sizes,
		}
	}

	pub fn len(&self) -> usize {
		self.prev_use_ind.len()
	}

	pub fn is_empty(&self) -> bool {
		self.prev_use_ind.is_empty()
	}

	pub fn prev_use_ind(&self, ind: usize) -> Option<usize> {
		let prev = self.prev_use_ind[ind] as usize;

		if prev >= self.len() {
			return None;
		}

		Some(prev)
	}

	pub fn next_use_ind(&self, ind: usize) -> Option<usize> {
		let next = self.next_use_ind[ind] as usize;

		if next >= self.len() {
			return None;
		}

		Some(next)
	}

	pub fn access_ts(&self, ind: usize) -> TimeStamp {
		self.access_ts[ind]
	}

	pub fn parts(&self, ind: usize) -> Vec<PartSpec> {
		self.parts_range(ind)
			.map(|i| (self.parts[i], self.part_sizes[i]))
			.collect()
	}

	/// For each requested part, the greatest size read by accesses after
	/// `ind`, capped at the requested size. Parts never read again are
	/// omitted.
	pub fn accessed_after(&self, ind: usize, parts: &[PartSpec]) -> Vec<PartSpec> {
		self.accessed_following(ind, parts, |i| self.next_use_ind[i] as usize)
	}

	/// As [`Self::accessed_after`] for accesses before `ind`.
	pub fn accessed_before(&self, ind: usize, parts: &[PartSpec]) -> Vec<PartSpec> {
		self.accessed_following(ind, parts, |i| self.prev_use_ind[i] as usize)
	}

	fn accessed_following(
		&self,
		start_ind: usize,
		parts: &[PartSpec],
		following_use_ind: impl Fn(usize) -> usize,
	) -> Vec<PartSpec> {
		// missing[part] = (size requested, greatest size found so far)
		let mut missing: FxHashMap<PartInd, (BytesSize, BytesSize)> = parts
			.iter()
			.map(|&(part_ind, part_bytes)| (part_ind, (part_bytes, 0)))
			.collect();

		let mut found = Vec::<PartSpec>::new();
		let mut next_ind = following_use_ind(start_ind);

		while !missing.is_empty() && next_ind < self.len() {
			for i in self.parts_range(next_ind) {
				let part_ind = self.parts[i];

				let Some(&(size_requested, max_size_found)) = missing.get(&part_ind) else {
					continue;
				};

				let part_size = self.part_sizes[i];

				if part_size >= size_requested {
					missing.remove(&part_ind);
					found.push((part_ind, size_requested));
				} else if part_size > max_size_found {
					missing.insert(part_ind, (size_requested, part_size));
				}
			}

			next_ind = following_use_ind(next_ind);
		}

		for (part_ind, (_, max_size_found)) in missing {
			if max_size_found > 0 {
				found.push((part_ind, max_size_found));
			}
		}

		found.sort_by_key(|(part_ind, _)| *part_ind);
		found
	}

	fn parts_range(&self, ind: usize) -> std::ops::Range<usize> {
		let start = self.parts_offset[ind];

		let end = match self.parts_offset.get(ind + 1) {
			Some(&end) => end,
			None => self.parts.len(),
		};

		start..end
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn access(ts: TimeStamp, file: &str, parts: &[PartSpec]) -> Access {
		Access {
			access_ts: ts,
			file: file.to_string(),
			parts: parts.to_vec(),
		}
	}

	fn trace(files: &[&str]) -> Vec<Access> {
		files
			.iter()
			.enumerate()
			.map(|(ind, file)| access(ind as TimeStamp, file, &[(0, 1)]))
			.collect()
	}

	#[test]
	fn reuse_inds_point_to_the_next_use() {
		let timer = ReuseTimer::new(&trace(&["a", "b", "c", "a", "b"]));

		assert_eq!(timer.len(), 5);

		assert_eq!(timer.reuse_ind(0), Some(3));
		assert_eq!(timer.reuse_ind(1), Some(4));
		assert_eq!(timer.reuse_ind(2), None);
		assert_eq!(timer.reuse_ind(3), None);
		assert_eq!(timer.reuse_ind(4), None);

		assert_eq!(timer.reuse_time(0), Some(3));
		assert_eq!(timer.reuse_time(1), Some(3));
		assert_eq!(timer.reuse_time(2), None);

		assert_eq!(timer.reuse_ind_inf(0), 3.0);
		assert!(timer.reuse_ind_inf(2).is_infinite());
	}

	#[test]
	fn reuse_inds_skip_unrelated_accesses() {
		let accesses = trace(&["a", "b", "a", "a", "c", "b"]);
		let timer = ReuseTimer::new(&accesses);

		for ind in 0..accesses.len() {
			if let Some(reuse_ind) = timer.reuse_ind(ind) {
				assert_eq!(accesses[reuse_ind].file, accesses[ind].file);

				for between in ind + 1..reuse_ind {
					assert_ne!(accesses[between].file, accesses[ind].file);
				}
			}
		}
	}

	#[test]
	fn full_index_tracks_both_directions() {
		let index = FullReuseIndex::new(&trace(&["a", "b", "c", "a", "b"]));

		assert_eq!(index.next_use_ind(0), Some(3));
		assert_eq!(index.next_use_ind(3), None);

		assert_eq!(index.prev_use_ind(0), None);
		assert_eq!(index.prev_use_ind(3), Some(0));
		assert_eq!(index.prev_use_ind(4), Some(1));

		assert_eq!(index.access_ts(2), 2);
		assert_eq!(index.parts(2), vec![(0, 1)]);
	}

	#[test]
	fn accessed_after_caps_at_requested_sizes() {
		let accesses = vec![
			access(0, "f", &[(0, 10), (1, 4)]),
			access(1, "g", &[(0, 100)]),
			access(2, "f", &[(0, 6)]),
			access(3, "f", &[(0, 8), (1, 2)]),
		];

		let index = FullReuseIndex::new(&accesses);

		// part 0: later accesses read up to 8 of the 10 requested bytes;
		// part 1: a later access reads 2 of the 4 requested bytes
		assert_eq!(
			index.accessed_after(0, &[(0, 10), (1, 4)]),
			vec![(0, 8), (1, 2)],
		);

		// requesting no more than what is re-read reports full coverage
		assert_eq!(index.accessed_after(0, &[(0, 5)]), vec![(0, 5)]);

		assert_eq!(
			index.accessed_before(3, &[(0, 20), (1, 10)]),
			vec![(0, 10), (1, 4)],
		);

		assert_eq!(index.accessed_after(3, &[(0, 8)]), vec![]);
	}
}
