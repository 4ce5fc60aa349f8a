/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use num_traits::AsPrimitive;
use rustc_hash::FxHashMap;

use crate::{
	cache::processor::AccessInfo,
	workload::{Access, BytesSize, FileId, PartInd, PartSpec, TimeStamp},
};

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

	pub hits: u64,
	pub misses: u64,
	pub bytes_hit: BytesSize,
	pub bytes_missed: BytesSize,
	pub bytes_added: BytesSize,

	/// Bytes evicted while making room for accesses to this file. The
	/// bytes evicted *of* this file are not known per file.
	pub bytes_removed_due: BytesSize,

	pub last_residence_begin: TimeStamp,
	pub last_residence_end: TimeStamp,
}

#[derive(Debug, Default, Clone)]
pub struct TotalStats {
	pub accesses: u64,
	pub total_bytes_accessed: BytesSize,
	pub unique_bytes_accessed: BytesSize,

	pub files_hit: u64,
	pub files_missed: u64,
	pub bytes_hit: BytesSize,
	pub bytes_missed: BytesSize,
	pub bytes_added: BytesSize,
	pub bytes_removed: BytesSize,
}

/// Per-file and aggregate counters over a stream of processed accesses.
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

	#[must_use]
	pub fn byte_hit_rate(&self) -> f64 {
		let requested = self.total_stats.bytes_hit + self.total_stats.bytes_missed;

		if requested == 0 {
			return 0.0;
		}

		let bytes_hit: f64 = self.total_stats.bytes_hit.as_();
		let requested: f64 = requested.as_();

		bytes_hit / requested
	}

	pub fn reset(&mut self) {
		self.files_stats.clear();
		self.total_stats = TotalStats::default();
	}

	fn file_stats_mut(&mut self, file: &FileId) -> &mut FileStats {
		self.files_stats
			.entry(file.clone())
			.or_insert_with(|| FileStats {
				id: file.clone(),
				..FileStats::default()
			})
	}

	fn process_access(&mut self, access: &Access) {
		self.total_stats.accesses += 1;

		let file_stats = self.file_stats_mut(&access.file);
		file_stats.accesses += 1;

		let mut unique_diff = 0;
		let mut total_read = 0;

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
				unique_diff += bytes_read - part_stats.unique_bytes_accessed;
				part_stats.unique_bytes_accessed = bytes_read;
			}

			part_stats.total_bytes_accessed += bytes_read;
			total_read += bytes_read;
		}

		file_stats.unique_bytes_accessed += unique_diff;
		file_stats.total_bytes_accessed += total_read;

		self.total_stats.unique_bytes_accessed += unique_diff;
		self.total_stats.total_bytes_accessed += total_read;
	}

	fn process_access_info(&mut self, info: &AccessInfo) {
		let ts = info.access.access_ts;
		let file_stats = self.file_stats_mut(&info.access.file);

		file_stats.bytes_hit += info.bytes_hit;
		file_stats.bytes_missed += info.bytes_missed;
		file_stats.bytes_added += info.bytes_added;
		file_stats.bytes_removed_due += info.bytes_removed;

		if info.file_hit {
			file_stats.hits += 1;
			self.total_stats.files_hit += 1;
		} else {
			file_stats.misses += 1;
			file_stats.last_residence_begin = ts;
			self.total_stats.files_missed += 1;
		}

		self.total_stats.bytes_hit += info.bytes_hit;
		self.total_stats.bytes_missed += info.bytes_missed;
		self.total_stats.bytes_added += info.bytes_added;
		self.total_stats.bytes_removed += info.bytes_removed;

		for file in &info.evicted_files {
			self.file_stats_mut(file).last_residence_end = ts;
		}
	}
}

/// The cached parts of every resident file at the moment of a warm-up
/// reset.
pub type ResidentSnapshot = FxHashMap<FileId, Vec<PartSpec>>;

/// Collects counters over an access-info stream and implements the
/// warm-up reset.
///
/// `reset` clears all counters and installs a one-shot filter over the
/// parts resident at reset time: the first subsequent access to such a
/// part reports the part's already cached bytes as missed instead of
/// hit, so warm-up data contributes no free hits. A file's marks are
/// dropped once all its parts were re-accessed or the file is evicted.
#[derive(Debug, Default)]
pub struct StatsCollector {
	counters: StatsCounters,
	warm_up_filter: Option<ResidentFilter>,
}

#[derive(Debug)]
struct ResidentFilter {
	marked: FxHashMap<FileId, FxHashMap<PartInd, BytesSize>>,
}

impl StatsCollector {
	#[must_use]
	pub fn stats(&self) -> &StatsCounters {
		&self.counters
	}

	pub fn reset(&mut self, resident: ResidentSnapshot) {
		self.counters.reset();

		let marked = resident
			.into_iter()
			.filter(|(_, parts)| !parts.is_empty())
			.map(|(file, parts)| (file, parts.into_iter().collect()))
			.collect::<FxHashMap<FileId, FxHashMap<PartInd, BytesSize>>>();

		self.warm_up_filter = match marked.is_empty() {
			true => None,
			false => Some(ResidentFilter { marked }),
		};
	}

	/// Applies the warm-up filter, updates the counters and returns the
	/// (possibly adjusted) access info.
	pub fn collect(&mut self, mut info: AccessInfo) -> AccessInfo {
		if let Some(filter) = &mut self.warm_up_filter {
			filter.apply(&mut info);

			if filter.marked.is_empty() {
				self.warm_up_filter = None;
			}
		}

		self.counters.process_access(&info.access);
		self.counters.process_access_info(&info);

		info
	}
}

impl ResidentFilter {
	fn apply(&mut self, info: &mut AccessInfo) {
		if let Some(marked_parts) = self.marked.get_mut(&info.access.file) {
			let mut converted: BytesSize = 0;

			for (part_ind, requested_bytes) in &info.access.parts {
				if let Some(marked_bytes) = marked_parts.remove(part_ind) {
					converted += marked_bytes.min(*requested_bytes);
				}
			}

			if marked_parts.is_empty() {
				self.marked.remove(&info.access.file);
			}

			let converted = converted.min(info.bytes_hit);

			if converted > 0 {
				info.bytes_hit -= converted;
				info.bytes_missed += converted;

				if info.bytes_hit == 0 {
					info.file_hit = false;
				}
			}
		}

		for file in &info.evicted_files {
			self.marked.remove(file);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn info(
		ts: TimeStamp,
		file: &str,
		parts: &[PartSpec],
		bytes_hit: BytesSize,
		bytes_added: BytesSize,
	) -> AccessInfo {
		let requested: BytesSize = parts.iter().map(|(_, bytes)| bytes).sum();

		AccessInfo {
			access: Access {
				access_ts: ts,
				file: file.to_string(),
				parts: parts.to_vec(),
			},
			file_hit: bytes_hit > 0,
			bytes_hit,
			bytes_missed: requested - bytes_hit,
			bytes_added,
			bytes_removed: 0,
			total_bytes: bytes_hit + bytes_added,
			evicted_files: Vec::new(),
		}
	}

	#[test]
	fn it_aggregates_access_and_cache_counters() {
		let mut collector = StatsCollector::default();

		collector.collect(info(1, "a", &[(0, 10)], 0, 10));
		collector.collect(info(2, "a", &[(0, 10)], 10, 0));
		collector.collect(info(3, "a", &[(0, 4), (1, 6)], 4, 6));
		collector.collect(info(4, "b", &[(0, 5)], 0, 5));

		let stats = collector.stats();
		let totals = stats.total_stats();

		assert_eq!(totals.accesses, 4);
		assert_eq!(totals.total_bytes_accessed, 35);
		assert_eq!(totals.unique_bytes_accessed, 21);
		assert_eq!(totals.files_hit, 2);
		assert_eq!(totals.files_missed, 2);
		assert_eq!(totals.bytes_hit, 14);
		assert_eq!(totals.bytes_missed, 21);
		assert_eq!(totals.bytes_added, 21);

		let file_stats = stats.file_stats(&"a".to_string()).unwrap();
		assert_eq!(file_stats.accesses, 3);
		assert_eq!(file_stats.unique_bytes_accessed, 16);
		assert_eq!(file_stats.parts.len(), 2);
		assert_eq!(file_stats.parts[0].accesses, 3);
		assert_eq!(file_stats.parts[1].accesses, 1);
	}

	#[test]
	fn reset_converts_the_first_access_to_cached_parts() {
		let mut collector = StatsCollector::default();

		collector.collect(info(1, "a", &[(0, 1)], 0, 1));
		collector.collect(info(2, "a", &[(0, 1)], 1, 0));

		let mut resident = ResidentSnapshot::default();
		resident.insert("a".to_string(), vec![(0, 1)]);
		collector.reset(resident);

		assert_eq!(collector.stats().total_stats().accesses, 0);

		// the first post-reset access to the cached part counts missed
		let adjusted = collector.collect(info(3, "a", &[(0, 1)], 1, 0));

		assert_eq!(adjusted.bytes_hit, 0);
		assert_eq!(adjusted.bytes_missed, 1);
		assert_eq!(adjusted.bytes_added, 0);
		assert!(!adjusted.file_hit);

		let totals = collector.stats().total_stats();
		assert_eq!(totals.bytes_hit, 0);
		assert_eq!(totals.bytes_missed, 1);
		assert_eq!(totals.files_missed, 1);

		// the filter only fires once per part
		let second = collector.collect(info(4, "a", &[(0, 1)], 1, 0));
		assert_eq!(second.bytes_hit, 1);
		assert!(second.file_hit);
	}

	#[test]
	fn reset_marks_are_dropped_on_eviction() {
		let mut collector = StatsCollector::default();

		collector.collect(info(1, "a", &[(0, 2)], 0, 2));

		let mut resident = ResidentSnapshot::default();
		resident.insert("a".to_string(), vec![(0, 2)]);
		collector.reset(resident);

		let mut eviction = info(2, "b", &[(0, 2)], 0, 2);
		eviction.evicted_files = vec!["a".to_string()];
		eviction.bytes_removed = 2;
		collector.collect(eviction);

		// a was evicted, so its re-access is counted as usual
		let re_access = collector.collect(info(3, "a", &[(0, 2)], 0, 2));
		assert_eq!(re_access.bytes_missed, 2);
		assert_eq!(re_access.bytes_added, 2);
	}

	#[test]
	fn partial_marks_convert_at_most_the_marked_bytes() {
		let mut collector = StatsCollector::default();

		let mut resident = ResidentSnapshot::default();
		resident.insert("a".to_string(), vec![(0, 3)]);
		collector.reset(resident);

		// the access grows the part beyond the marked bytes
		let adjusted = collector.collect(info(1, "a", &[(0, 8)], 3, 5));

		assert_eq!(adjusted.bytes_hit, 0);
		assert_eq!(adjusted.bytes_missed, 8);
		assert_eq!(adjusted.bytes_added, 5);
	}
}
