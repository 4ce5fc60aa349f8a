/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

mod scheduler;

use serde::{Serialize, Deserialize};

use crate::{
	events::EventMerger,
	workload::{Access, Job, stats::StatsCounters},
};

pub use crate::distributor::scheduler::{AccessScheduler, JobScheduler, NodeSpec};

/// One access routed to exactly one cache processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessAssignment {
	pub access: Access,
	pub cache_proc: usize,
}

/// Merges job streams from a set of tasks, schedules the jobs onto the
/// cores of the node set and emits the per-core access sequences as one
/// assignment stream in access-time order.
pub struct Distributor {
	assignments: AccessScheduler,
	stats: StatsCounters,
}

impl Distributor {
	pub fn new(
		node_specs: Vec<NodeSpec>,
		tasks: Vec<Box<dyn Iterator<Item = Job>>>,
	) -> Self {
		let jobs = EventMerger::new(tasks, |job: &Job| job.submit_ts);
		let job_scheduler = JobScheduler::new(node_specs, Box::new(jobs));

		Distributor {
			assignments: AccessScheduler::new(job_scheduler),
			stats: StatsCounters::default(),
		}
	}

	#[must_use]
	pub fn stats(&self) -> &StatsCounters {
		&self.stats
	}
}

impl Iterator for Distributor {
	type Item = AccessAssignment;

	fn next(&mut self) -> Option<AccessAssignment> {
		let assignment = self.assignments.next()?;
		self.stats.process_access(&assignment.access);

		Some(assignment)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::workload::AccessScheme;

	fn job(submit_ts: u64, file: &str, bytes: u64) -> Job {
		Job {
			submit_ts,
			access_schemes: vec![AccessScheme {
				file: file.to_string(),
				parts: vec![(0, bytes)],
			}],
		}
	}

	#[test]
	fn it_routes_all_accesses_of_its_tasks() {
		let tasks: Vec<Box<dyn Iterator<Item = Job>>> = vec![
			Box::new(vec![job(0, "a", 10), job(5, "b", 10)].into_iter()),
			Box::new(vec![job(2, "c", 10)].into_iter()),
		];

		let node_specs = vec![NodeSpec {
			cores: 2,
			core_throughput: 10,
			cache_proc: 0,
		}];

		let mut distributor = Distributor::new(node_specs, tasks);
		let assignments: Vec<AccessAssignment> = distributor.by_ref().collect();

		assert_eq!(assignments.len(), 3);
		assert!(assignments.iter().all(|assignment| assignment.cache_proc == 0));
		assert_eq!(distributor.stats().total_stats().accesses, 3);

		let mut timestamps: Vec<u64> = assignments
			.iter()
			.map(|assignment| assignment.access.access_ts)
			.collect();

		let sorted = {
			let mut sorted = timestamps.clone();
			sorted.sort_unstable();
			sorted
		};

		assert_eq!(timestamps, sorted);
		timestamps.dedup();
		assert!(!timestamps.is_empty());
	}
}
