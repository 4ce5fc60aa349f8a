/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
	SimError,
	workload::{AccessScheme, BytesSize, FileId, Job, PartSpec, TimeStamp},
};

/// A set of uniformly sized input files.
#[derive(Debug, Clone)]
pub struct DataSet {
	name: String,
	file_size: BytesSize,
	files: Vec<FileId>,
}

impl DataSet {
	pub fn new(name: impl Into<String>, size: BytesSize, file_size: BytesSize) -> Self {
		let name = name.into();
		let count = (size / file_size.max(1)).max(1);

		let files = (0..count)
			.map(|ind| format!("{name}/file_{ind:06}"))
			.collect();

		DataSet {
			name,
			file_size,
			files,
		}
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub fn file_size(&self) -> BytesSize {
		self.file_size
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.files.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.files.is_empty()
	}

	pub fn files(&self) -> &[FileId] {
		&self.files
	}
}

/// Derives per-task access schemes whose parts overlap in a controlled,
/// non-correlated way.
///
/// For `number` tasks a file is cut into `2^number` parts, one per
/// subset of tasks; task `index` reads the `2^(number-1)` parts whose
/// subset contains it. A part read by `k` tasks holds a
/// `fraction^k * (1-fraction)^(number-k)` share of the file, so each
/// task reads a `fraction` share overall and the overlap of any two
/// tasks' reads is `fraction^2`.
#[derive(Debug, Clone, Copy)]
pub struct NonCorrelatedSchemesGenerator {
	number: u32,
	fraction: f64,
}

impl NonCorrelatedSchemesGenerator {
	pub fn new(number: u32, fraction: f64) -> Result<Self, SimError> {
		if number == 0 || number > 20 {
			return Err(SimError::config("the number of schemes must lie in [1, 20]"));
		}

		if !(0.0..=1.0).contains(&fraction) {
			return Err(SimError::config("the read fraction must lie in [0, 1]"));
		}

		Ok(NonCorrelatedSchemesGenerator { number, fraction })
	}

	#[must_use]
	pub fn number(&self) -> u32 {
		self.number
	}

	/// The parts task `index` reads of a file of `total_bytes`.
	pub fn parts(&self, index: u32, total_bytes: BytesSize) -> Vec<PartSpec> {
		let scheme_parts = 1u32 << (self.number - 1);
		let mut parts = Vec::with_capacity(scheme_parts as usize);

		for i in 0..scheme_parts {
			// insert a 1 bit at position `index` into i, selecting the
			// parts whose task subset contains this task
			let part_index = (((i >> index) << 1 | 1) << index) | (i & ((1 << index) - 1));

			let containing_schemes = part_index.count_ones();

			let share = self.fraction.powi(containing_schemes as i32)
				* (1.0 - self.fraction).powi((self.number - containing_schemes) as i32);

			let part_bytes = (total_bytes as f64 * share).round() as BytesSize;

			parts.push((part_index, part_bytes));
		}

		parts
	}

	pub fn access_scheme(
		&self,
		index: u32,
		file: FileId,
		total_bytes: BytesSize,
	) -> AccessScheme {
		AccessScheme {
			parts: self.parts(index, total_bytes),
			file,
		}
	}
}

/// Parameters of the `random` workload model: a fixed set of tasks, each
/// repeatedly reading its access scheme of a uniformly random file at a
/// fixed byte rate.
#[derive(Debug, Clone)]
pub struct RandomModel {
	pub data_set_size: BytesSize,
	pub file_size: BytesSize,
	pub tasks: u32,
	pub read_fraction: f64,
	pub submit_rate: BytesSize,
}

impl RandomModel {
	/// Builds one endless job stream per task. Streams are bounded by
	/// the caller (by access count or time).
	pub fn build(
		&self,
		seed: Option<u64>,
	) -> Result<Vec<Box<dyn Iterator<Item = Job>>>, SimError> {
		if self.submit_rate == 0 {
			return Err(SimError::config("the submit rate must be positive"));
		}

		let data_set = DataSet::new("input", self.data_set_size, self.file_size);
		let schemes_generator = NonCorrelatedSchemesGenerator::new(self.tasks, self.read_fraction)?;

		let mut tasks: Vec<Box<dyn Iterator<Item = Job>>> = Vec::new();

		for index in 0..self.tasks {
			let rng = match seed {
				Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
				None => StdRng::from_entropy(),
			};

			tasks.push(Box::new(RandomTask {
				data_set: data_set.clone(),
				scheme_parts: schemes_generator.parts(index, data_set.file_size()),
				submit_rate: self.submit_rate,
				rng,
				submitted_bytes: 0,
			}));
		}

		Ok(tasks)
	}
}

struct RandomTask {
	data_set: DataSet,
	scheme_parts: Vec<PartSpec>,
	submit_rate: BytesSize,
	rng: StdRng,
	submitted_bytes: BytesSize,
}

impl Iterator for RandomTask {
	type Item = Job;

	fn next(&mut self) -> Option<Job> {
		let submit_ts: TimeStamp = self.submitted_bytes.div_ceil(self.submit_rate);

		let files = self.data_set.files();
		let file = files[self.rng.gen_range(0..files.len())].clone();

		let scheme = AccessScheme {
			file,
			parts: self.scheme_parts.clone(),
		};

		self.submitted_bytes += scheme.parts
			.iter()
			.map(|(_, part_bytes)| part_bytes)
			.sum::<BytesSize>();

		Some(Job {
			submit_ts,
			access_schemes: vec![scheme],
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn data_set_derives_its_file_list() {
		let data_set = DataSet::new("input", 100, 10);

		assert_eq!(data_set.len(), 10);
		assert_eq!(data_set.files()[0], "input/file_000000");
		assert_eq!(data_set.file_size(), 10);
	}

	#[test]
	fn scheme_parts_partition_the_task_subsets() {
		let generator = NonCorrelatedSchemesGenerator::new(3, 0.25).unwrap();

		let parts = generator.parts(1, 1 << 20);
		assert_eq!(parts.len(), 4);

		// every selected part's subset contains task 1
		for (part_index, _) in &parts {
			assert_ne!(part_index & 0b010, 0);
		}

		// each task reads roughly a `fraction` share of the file
		let read: BytesSize = parts.iter().map(|(_, bytes)| bytes).sum();
		let expected = (1u64 << 20) as f64 * 0.25;

		assert!((read as f64 - expected).abs() / expected < 0.01);
	}

	#[test]
	fn scheme_part_indices_are_disjoint_across_subsets() {
		let generator = NonCorrelatedSchemesGenerator::new(2, 0.5).unwrap();

		let first = generator.parts(0, 1000);
		let second = generator.parts(1, 1000);

		let first_inds: Vec<u32> = first.iter().map(|(ind, _)| *ind).collect();
		let second_inds: Vec<u32> = second.iter().map(|(ind, _)| *ind).collect();

		assert_eq!(first_inds, vec![1, 3]);
		assert_eq!(second_inds, vec![2, 3]);
	}

	#[test]
	fn random_tasks_pace_their_submissions() {
		let model = RandomModel {
			data_set_size: 1000,
			file_size: 100,
			tasks: 2,
			read_fraction: 0.5,
			submit_rate: 10,
		};

		let mut tasks = model.build(Some(1)).unwrap();
		let jobs: Vec<Job> = tasks[0].by_ref().take(10).collect();

		assert_eq!(jobs.len(), 10);
		assert_eq!(jobs[0].submit_ts, 0);

		// submit timestamps advance with the submitted bytes
		for pair in jobs.windows(2) {
			assert!(pair[0].submit_ts <= pair[1].submit_ts);
		}

		assert!(jobs.last().unwrap().submit_ts > 0);
	}

	#[test]
	fn seeded_builds_are_reproducible() {
		let model = RandomModel {
			data_set_size: 1000,
			file_size: 100,
			tasks: 1,
			read_fraction: 0.2,
			submit_rate: 100,
		};

		let first: Vec<FileId> = model.build(Some(7)).unwrap()[0]
			.by_ref()
			.take(20)
			.map(|job| job.access_schemes[0].file.clone())
			.collect();

		let second: Vec<FileId> = model.build(Some(7)).unwrap()[0]
			.by_ref()
			.take(20)
			.map(|job| job.access_schemes[0].file.clone())
			.collect();

		assert_eq!(first, second);
	}
}
