/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use rustc_hash::FxHashMap;

use crate::workload::{Access, BytesSize, FileId, PartInd};

#[derive(Debug, Default, Clone)]
pub struct PartStats {
	pub ind: PartInd,
	pub accesses: u64,
	pub total_bytes_accessed: BytesSize,
	pub unique_bytes_accessed: BytesSize,
}

#[derive(Debug, Default, Clone)]
pub struct FileStats {
	pub id: FileId,
	pub accesses: u64,
	pub total_bytes_accessed: BytesSize,
	pub unique_bytes_accessed: BytesSize,
	pub parts: Vec<PartStats>,
}

#[derive(Debug, Default, Clone)]
pub struct TotalStats {
	pub accesses: u64,
	pub total_bytes_accessed: BytesSize,
	pub unique_bytes_accessed: BytesSize,
}

/// Access-side counters over a workload: how much is read, and how much
/// of it is unique, per part, per file and in total.
#[derive(Debug, Default)]
pub struct StatsCounters {
	files_stats: FxHashMap<FileId, FileStats>,
	total_stats: TotalStats,
}

impl StatsCounters {
	#[must_use]
	pub fn total_stats(&self) -> &TotalStats {
		&self.total_stats
	}

	pub fn files_stats(&self) -> impl Iterator<Item = &FileStats> {
		self.files_stats.values()
	}

	pub fn file_stats(&self, file: &FileId) -> Option<&FileStats> {
		self.files_stats.get(file)
	}

	#[must_use]
	pub fn file_count(&self) -> usize {
		self.files_stats.len()
	}

	pub fn reset(&mut self) {
		self.files_stats.clear();
		self.total_stats = TotalStats::default();
	}

	pub fn process_access(&mut self, access: &Access) {
		self.total_stats.accesses += 1;

		let file_stats = self.files_stats
			.entry(access.file.clone())
			.or_insert_with(|| FileStats {
				id: access.file.clone(),
				..FileStats::default()
			});

		for &(ind, bytes_read) in &access.parts {
			let ind = ind as usize;

			if file_stats.parts.len() <= ind {
				file_stats.parts.resize_with(ind + 1, PartStats::default);

				for (part_ind, part_stats) in file_stats.parts.iter_mut().enumerate() {
					part_stats.ind = part_ind as PartInd;
				}
			}

			let part_stats = &mut file_stats.parts[ind];
			part_stats.accesses += 1;

			if bytes_read > part_stats.unique_bytes_accessed {
				let diff = bytes_read - part_stats.unique_bytes_accessed;

				part_stats.unique_bytes_accessed = bytes_read;
				file_stats.unique_bytes_accessed += diff;
				self.total_stats.unique_bytes_accessed += diff;
			}

			part_stats.total_bytes_accessed += bytes_read;
			file_stats.total_bytes_accessed += bytes_read;
			self.total_stats.total_bytes_accessed += bytes_read;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn access(file: &str, parts: &[(PartInd, BytesSize)]) -> Access {
		Access {
			access_ts: 0,
			file: file.to_string(),
			parts: parts.to_vec(),
		}
	}

	#[test]
	fn unique_bytes_track_the_per_part_maximum() {
		let mut counters = StatsCounters::default();

		counters.process_access(&access("f", &[(0, 10)]));
		counters.process_access(&access("f", &[(0, 4)]));
		counters.process_access(&access("f", &[(0, 12), (2, 5)]));
		counters.process_access(&access("g", &[(0, 3)]));

		let totals = counters.total_stats();
		assert_eq!(totals.accesses, 4);
		assert_eq!(totals.total_bytes_accessed, 34);
		assert_eq!(totals.unique_bytes_accessed, 20);

		let file_stats = counters.file_stats(&"f".to_string()).unwrap();
		assert_eq!(file_stats.parts.len(), 3);
		assert_eq!(file_stats.parts[0].unique_bytes_accessed, 12);
		assert_eq!(file_stats.parts[1].accesses, 0);
		assert_eq!(file_stats.parts[2].unique_bytes_accessed, 5);
		assert_eq!(counters.file_count(), 2);
	}
}
