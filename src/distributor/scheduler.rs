/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::{
	cmp::Ordering,
	collections::BinaryHeap,
};

use crate::{
	distributor::AccessAssignment,
	events::EventIterator,
	workload::{Access, AccessScheme, BytesSize, Job, TimeStamp},
};

/// Describes the cores of one compute node and the cache processor its
/// reads are routed through.
#[derive(Debug, Clone, Copy)]
pub struct NodeSpec {
	pub cores: u32,
	pub core_throughput: BytesSize,
	pub cache_proc: usize,
}

#[derive(Debug, Clone, Copy)]
struct Core {
	core_throughput: BytesSize,
	cache_proc: usize,
}

/// A job placed on a core. The job occupies the core from `start_ts`
/// until its reads complete at the core's throughput; the end is
/// stretched to the end of the second.
pub struct JobAssignment {
	pub job: Job,
	pub start_ts: TimeStamp,
	pub end_ts: TimeStamp,
	core: Core,
}

/// Schedules each job onto the earliest free core.
pub struct JobScheduler {
	jobs: Box<dyn Iterator<Item = Job>>,
	cores: BinaryHeap<QueuedCore>,
	queue_index: u64,
}

struct QueuedCore {
	free_ts: TimeStamp,
	index: u64,
	core: Core,
}

impl JobScheduler {
	pub fn new(node_specs: Vec<NodeSpec>, jobs: Box<dyn Iterator<Item = Job>>) -> Self {
		let mut cores = BinaryHeap::new();
		let mut queue_index = 0;

		for node_spec in &node_specs {
			for _ in 0..node_spec.cores {
				cores.push(QueuedCore {
					free_ts: 0,
					index: queue_index,
					core: Core {
						core_throughput: node_spec.core_throughput.max(1),
						cache_proc: node_spec.cache_proc,
					},
				});

				queue_index += 1;
			}
		}

		JobScheduler {
			jobs,
			cores,
			queue_index,
		}
	}
}

impl Iterator for JobScheduler {
	type Item = JobAssignment;

	fn next(&mut self) -> Option<JobAssignment> {
		let job = self.jobs.next()?;
		let queued = self.cores.pop()?;

		let start_ts = job.submit_ts.max(queued.free_ts);
		let total_bytes_read = job.total_bytes_read();
		let end_ts = start_ts + total_bytes_read.div_ceil(queued.core.core_throughput);

		self.cores.push(QueuedCore {
			free_ts: end_ts,
			index: self.queue_index,
			core: queued.core,
		});

		self.queue_index += 1;

		Some(JobAssignment {
			job,
			start_ts,
			end_ts,
			core: queued.core,
		})
	}
}

impl Ord for QueuedCore {
	fn cmp(&self, other: &Self) -> Ordering {
		other.free_ts
			.cmp(&self.free_ts)
			.then_with(|| other.index.cmp(&self.index))
	}
}

impl PartialOrd for QueuedCore {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl PartialEq for QueuedCore {
	fn eq(&self, other: &Self) -> bool {
		self.index == other.index
	}
}

impl Eq for QueuedCore {}

/// Spreads the reads of running jobs over their runtime and interleaves
/// them into one assignment stream in access-time order.
///
/// Invariant: all accesses before the earliest pending access have been
/// yielded. Job assignments are pulled lazily, so only jobs starting
/// before that access are materialized.
pub struct AccessScheduler {
	assignments: EventIterator<JobAssignment, fn(&JobAssignment) -> TimeStamp>,
	running: BinaryHeap<RunningJob>,
	queue_index: u64,
}

struct RunningJob {
	next_access_ts: TimeStamp,
	index: u64,
	start_ts: TimeStamp,
	core: Core,
	bytes_read: BytesSize,
	schemes: std::vec::IntoIter<AccessScheme>,
}

impl AccessScheduler {
	pub fn new(job_scheduler: JobScheduler) -> Self {
		AccessScheduler {
			assignments: EventIterator::new(
				Box::new(job_scheduler),
				|assignment| assignment.start_ts,
			),
			running: BinaryHeap::new(),
			queue_index: 0,
		}
	}

	fn push_assignment(&mut self, assignment: JobAssignment) {
		self.running.push(RunningJob {
			next_access_ts: assignment.start_ts,
			index: self.queue_index,
			start_ts: assignment.start_ts,
			core: assignment.core,
			bytes_read: 0,
			schemes: assignment.job.access_schemes.into_iter(),
		});

		self.queue_index += 1;
	}

	/// Ensures every job starting before the earliest pending access is
	/// on the heap.
	fn prepare_heap(&mut self) -> bool {
		if self.running.is_empty() {
			match self.assignments.next() {
				Some(assignment) => self.push_assignment(assignment),
				None => return false,
			}
		}

		loop {
			let ts = match self.running.peek() {
				Some(running) => running.next_access_ts,
				None => return false,
			};

			match self.assignments.next_if_before(ts) {
				Some(assignment) => self.push_assignment(assignment),
				None => return true,
			}
		}
	}
}

impl Iterator for AccessScheduler {
	type Item = AccessAssignment;

	fn next(&mut self) -> Option<AccessAssignment> {
		loop {
			if !self.prepare_heap() {
				return None;
			}

			let mut running = self.running.pop()?;
			let ts = running.next_access_ts;

			let Some(scheme) = running.schemes.next() else {
				// all schemes processed, this job is done
				continue;
			};

			running.bytes_read += scheme.parts
				.iter()
				.map(|(_, part_bytes)| part_bytes)
				.sum::<BytesSize>();

			running.next_access_ts = running.start_ts
				+ running.bytes_read / running.core.core_throughput;

			running.index = self.queue_index;
			self.queue_index += 1;

			let cache_proc = running.core.cache_proc;
			self.running.push(running);

			return Some(AccessAssignment {
				access: Access {
					access_ts: ts,
					file: scheme.file,
					parts: scheme.parts,
				},
				cache_proc,
			});
		}
	}
}

impl Ord for RunningJob {
	fn cmp(&self, other: &Self) -> Ordering {
		other.next_access_ts
			.cmp(&self.next_access_ts)
			.then_with(|| other.index.cmp(&self.index))
	}
}

impl PartialOrd for RunningJob {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl PartialEq for RunningJob {
	fn eq(&self, other: &Self) -> bool {
		self.index == other.index
	}
}

impl Eq for RunningJob {}
