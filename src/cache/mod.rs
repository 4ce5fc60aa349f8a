/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

pub mod storage;
pub mod processor;
pub mod policy;
pub mod stats;
pub mod classification;

use std::vec::IntoIter;

use crate::{
	SimError,
	distributor::AccessAssignment,
	events::EventMerger,
	recorder::Reader,
	workload::{Access, TimeStamp},
};

pub use crate::cache::{
	processor::{AccessInfo, EvictionContext, PolicyState, StateProcessor},
	stats::{ResidentSnapshot, StatsCollector, StatsCounters},
	storage::{Storage, StorageRef},
};

/// A set of cache processors fed from an assignment stream, emitting one
/// [`AccessInfo`] per access and aggregating counters along the way.
pub trait CacheSystem: Iterator<Item = Result<AccessInfo, SimError>> {
	fn stats(&self) -> &StatsCounters;

	/// Clears all counters; the first subsequent access to each
	/// currently cached part counts as a miss.
	fn reset_after_warm_up(&mut self);
}

/// The cached parts across all storages, with per-part sizes merged by
/// maximum. Distinct storages may hold copies of the same file.
fn resident_snapshot<'a>(
	storages: impl Iterator<Item = &'a StorageRef>,
) -> ResidentSnapshot {
	let mut resident = ResidentSnapshot::default();

	for storage in storages {
		let storage = storage.borrow();

		for file in storage.files() {
			let parts = resident.entry(file.clone()).or_default();

			for (part_ind, part_bytes) in storage.parts(file) {
				match parts.iter_mut().find(|(ind, _)| *ind == part_ind) {
					Some((_, bytes)) => *bytes = (*bytes).max(part_bytes),
					None => parts.push((part_ind, part_bytes)),
				}
			}
		}
	}

	resident
}

/// Routes each assignment to its processor as it is pulled, one access
/// at a time.
pub struct OnlineCacheSystem<I>
where
	I: Iterator<Item = Result<AccessAssignment, SimError>>,
{
	processors: Vec<StateProcessor>,
	assignments: I,
	collector: StatsCollector,
}

impl<I> OnlineCacheSystem<I>
where
	I: Iterator<Item = Result<AccessAssignment, SimError>>,
{
	pub fn new(processors: Vec<StateProcessor>, assignments: I) -> Self {
		OnlineCacheSystem {
			processors,
			assignments,
			collector: StatsCollector::default(),
		}
	}
}

impl<I> Iterator for OnlineCacheSystem<I>
where
	I: Iterator<Item = Result<AccessAssignment, SimError>>,
{
	type Item = Result<AccessInfo, SimError>;

	fn next(&mut self) -> Option<Self::Item> {
		let assignment = match self.assignments.next()? {
			Ok(assignment) => assignment,
			Err(err) => return Some(Err(err)),
		};

		let Some(processor) = self.processors.get_mut(assignment.cache_proc) else {
			return Some(Err(SimError::Record(format!(
				"assignment names cache processor {} but only {} exist",
				assignment.cache_proc,
				self.processors.len(),
			))));
		};

		match processor.process(assignment.access) {
			Ok(info) => Some(Ok(self.collector.collect(info))),
			Err(err) => Some(Err(err)),
		}
	}
}

impl<I> CacheSystem for OnlineCacheSystem<I>
where
	I: Iterator<Item = Result<AccessAssignment, SimError>>,
{
	fn stats(&self) -> &StatsCounters {
		self.collector.stats()
	}

	fn reset_after_warm_up(&mut self) {
		let storages: Vec<StorageRef> = self.processors
			.iter()
			.map(|processor| processor.storage().clone())
			.collect();

		self.collector.reset(resident_snapshot(storages.iter()));
	}
}

/// Replays each processor's scoped view of a recorded trace and merges
/// the resulting info streams in access-time order.
pub struct OfflineCacheSystem {
	storages: Vec<StorageRef>,
	merged: EventMerger<Result<AccessInfo, SimError>, MergeKey>,
	collector: StatsCollector,
}

type MergeKey = fn(&Result<AccessInfo, SimError>) -> TimeStamp;

/// One offline processor replaying its buffered access sequence.
struct ProcessorRun {
	processor: StateProcessor,
	accesses: IntoIter<Access>,
	failed: bool,
}

impl Iterator for ProcessorRun {
	type Item = Result<AccessInfo, SimError>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.failed {
			return None;
		}

		let access = self.accesses.next()?;
		let result = self.processor.process(access);

		if result.is_err() {
			self.failed = true;
		}

		Some(result)
	}
}

impl OfflineCacheSystem {
	/// Scopes the trace per processor, builds the offline states from
	/// the full scoped sequences and prepares the merged replay.
	pub fn new(
		specs: Vec<(policy::PolicySpec, StorageRef)>,
		reader: &Reader,
	) -> Result<Self, SimError> {
		let mut storages = Vec::new();
		let mut streams: Vec<Box<dyn Iterator<Item = Result<AccessInfo, SimError>>>> =
			Vec::new();

		for (cache_proc, (spec, storage)) in specs.into_iter().enumerate() {
			let accesses = reader.scoped_accesses(cache_proc)?;
			let processor = spec.offline_processor(storage.clone(), &accesses)?;

			storages.push(storage);

			streams.push(Box::new(ProcessorRun {
				processor,
				accesses: accesses.into_iter(),
				failed: false,
			}));
		}

		// errors key to zero so they surface before further events
		let key: MergeKey = |result| match result {
			Ok(info) => info.access.access_ts,
			Err(_) => 0,
		};

		Ok(OfflineCacheSystem {
			storages,
			merged: EventMerger::new(streams, key),
			collector: StatsCollector::default(),
		})
	}
}

impl Iterator for OfflineCacheSystem {
	type Item = Result<AccessInfo, SimError>;

	fn next(&mut self) -> Option<Self::Item> {
		match self.merged.next()? {
			Ok(info) => Some(Ok(self.collector.collect(info))),
			Err(err) => Some(Err(err)),
		}
	}
}

impl CacheSystem for OfflineCacheSystem {
	fn stats(&self) -> &StatsCounters {
		self.collector.stats()
	}

	fn reset_after_warm_up(&mut self) {
		let snapshot = resident_snapshot(self.storages.iter());
		self.collector.reset(snapshot);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		cache::policy::{PolicyKind, PolicySpec},
		recorder,
		workload::BytesSize,
	};
	use tempfile::NamedTempFile;

	fn assignment(
		ts: TimeStamp,
		file: &str,
		bytes: BytesSize,
		cache_proc: usize,
	) -> AccessAssignment {
		AccessAssignment {
			access: Access {
				access_ts: ts,
				file: file.to_string(),
				parts: vec![(0, bytes)],
			},
			cache_proc,
		}
	}

	fn lru_processor(capacity: BytesSize) -> StateProcessor {
		PolicySpec::from_user_args(PolicyKind::Lru, "")
			.unwrap()
			.online_processor(Storage::new_shared(capacity))
			.unwrap()
	}

	#[test]
	fn online_system_replays_and_counts() {
		let assignments = vec![
			assignment(1, "a", 1, 0),
			assignment(2, "b", 1, 0),
			assignment(3, "a", 1, 0),
		];

		let mut system = OnlineCacheSystem::new(
			vec![lru_processor(2)],
			assignments.into_iter().map(Ok),
		);

		let infos: Vec<AccessInfo> = system
			.by_ref()
			.map(|info| info.unwrap())
			.collect();

		assert_eq!(infos.len(), 3);
		assert!(infos[2].file_hit);

		let totals = system.stats().total_stats();
		assert_eq!(totals.files_hit, 1);
		assert_eq!(totals.files_missed, 2);
	}

	#[test]
	fn unknown_cache_processors_are_rejected() {
		let assignments = vec![assignment(1, "a", 1, 3)];

		let mut system = OnlineCacheSystem::new(
			vec![lru_processor(2)],
			assignments.into_iter().map(Ok),
		);

		assert!(matches!(system.next(), Some(Err(SimError::Record(_)))));
	}

	#[test]
	fn warm_up_reset_hides_pre_reset_hits() {
		let assignments = vec![
			assignment(1, "a", 1, 0),
			assignment(2, "a", 1, 0),
			assignment(3, "a", 1, 0),
		];

		let mut system = OnlineCacheSystem::new(
			vec![lru_processor(2)],
			assignments.into_iter().map(Ok),
		);

		for info in system.by_ref().take(2) {
			info.unwrap();
		}

		system.reset_after_warm_up();

		let totals = system.stats().total_stats();
		assert_eq!(totals.accesses, 0);
		assert_eq!(totals.bytes_hit, 0);

		let info = system.next().unwrap().unwrap();

		assert_eq!(info.bytes_hit, 0);
		assert_eq!(info.bytes_missed, 1);
		assert_eq!(info.bytes_added, 0);
	}

	#[test]
	fn offline_merge_is_ordered_by_access_time() {
		let trace = vec![
			assignment(1, "a", 1, 0),
			assignment(2, "d", 1, 1),
			assignment(3, "e", 1, 1),
			assignment(4, "b", 1, 0),
			assignment(5, "c", 1, 0),
			assignment(6, "f", 1, 1),
		];

		let file = NamedTempFile::new().unwrap();
		recorder::record_path(file.path(), trace).unwrap();

		let specs = vec![
			(
				PolicySpec::from_user_args(PolicyKind::Min, "").unwrap(),
				Storage::new_shared(2),
			),
			(
				PolicySpec::from_user_args(PolicyKind::Min, "").unwrap(),
				Storage::new_shared(2),
			),
		];

		let reader = Reader::open(file.path());
		let system = OfflineCacheSystem::new(specs, &reader).unwrap();

		let timestamps: Vec<TimeStamp> = system
			.map(|info| info.unwrap().access.access_ts)
			.collect();

		assert_eq!(timestamps, vec![1, 2, 3, 4, 5, 6]);
	}

	#[test]
	fn recorded_workloads_replay_online_and_offline() {
		use crate::{
			distributor::{Distributor, NodeSpec},
			workload::generator::RandomModel,
		};

		let model = RandomModel {
			data_set_size: 2000,
			file_size: 100,
			tasks: 3,
			read_fraction: 0.5,
			submit_rate: 50,
		};

		let node_specs = vec![
			NodeSpec { cores: 2, core_throughput: 100, cache_proc: 0 },
			NodeSpec { cores: 2, core_throughput: 100, cache_proc: 1 },
		];

		let distributor = Distributor::new(node_specs, model.build(Some(5)).unwrap());

		let file = NamedTempFile::new().unwrap();
		recorder::record_path(file.path(), distributor.take(200)).unwrap();

		let online_processors = (0..2)
			.map(|_| {
				PolicySpec::from_user_args(PolicyKind::Lru, "")
					.unwrap()
					.online_processor(Storage::new_shared(500))
					.unwrap()
			})
			.collect();

		let mut online = OnlineCacheSystem::new(
			online_processors,
			recorder::replay_path(file.path()).unwrap(),
		);

		for info in online.by_ref() {
			let info = info.unwrap();
			assert_eq!(info.bytes_hit + info.bytes_missed, info.access.requested_bytes());
		}

		let online_totals = online.stats().total_stats();
		assert_eq!(online_totals.accesses, 200);

		assert_eq!(
			online_totals.bytes_hit + online_totals.bytes_missed,
			online_totals.total_bytes_accessed,
		);

		let specs = (0..2)
			.map(|_| {
				(
					PolicySpec::from_user_args(PolicyKind::Min, "").unwrap(),
					Storage::new_shared(500),
				)
			})
			.collect();

		let reader = Reader::open(file.path());
		let mut offline = OfflineCacheSystem::new(specs, &reader).unwrap();

		for info in offline.by_ref() {
			info.unwrap();
		}

		let offline_totals = offline.stats().total_stats();
		assert_eq!(offline_totals.accesses, 200);

		assert_eq!(
			offline_totals.bytes_hit + offline_totals.bytes_missed,
			offline_totals.total_bytes_accessed,
		);
	}

	#[test]
	fn shared_storage_is_contended_by_all_processors() {
		let shared = Storage::new_shared(2);

		let processors = vec![
			PolicySpec::from_user_args(PolicyKind::Lru, "")
				.unwrap()
				.online_processor(shared.clone())
				.unwrap(),
			PolicySpec::from_user_args(PolicyKind::Lru, "")
				.unwrap()
				.online_processor(shared.clone())
				.unwrap(),
		];

		let assignments = vec![
			assignment(1, "a", 1, 0),
			assignment(2, "b", 1, 1),
			assignment(3, "c", 1, 0),
		];

		let mut system = OnlineCacheSystem::new(processors, assignments.into_iter().map(Ok));

		assert!(system.next().unwrap().is_ok());
		assert!(system.next().unwrap().is_ok());

		// both processors filled the shared storage; placing c forces
		// processor zero to evict its own file a
		let info = system.next().unwrap().unwrap();
		assert_eq!(info.evicted_files, vec!["a".to_string()]);
		assert_eq!(shared.borrow().used_bytes(), 2);
	}
}
