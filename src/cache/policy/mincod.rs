/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::{
	collections::BTreeMap,
	rc::Rc,
};

use crate::{
	SimError,
	cache::processor::{AccessInfo, EvictionContext, PolicyState},
	dstructures::{Binner, BinnedMapping, KeyedPq, ReuseTimer},
	params::UserArgs,
	workload::{BytesSize, FileId},
};

#[derive(Debug, Clone, Copy)]
pub struct Configuration {
	/// Collect files of similar size in log-binned classes instead of
	/// one queue per exact size.
	pub classes: bool,
	pub first_class: u32,
	pub last_class: u32,
	pub class_width: u32,
}

impl Default for Configuration {
	fn default() -> Self {
		Configuration {
			classes: false,
			first_class: 10,
			last_class: 40,
			class_width: 2,
		}
	}
}

impl Configuration {
	pub fn from_user_args(user_args: &str) -> Result<Self, SimError> {
		let args = user_args.parse::<UserArgs>()?;
		args.check_names(&["classes", "first_class", "last_class", "class_width"])?;

		let mut configuration = Configuration::default();

		if let Some(classes) = args.get_parsed::<bool>("classes")? {
			configuration.classes = classes;
		}

		if let Some(first_class) = args.get_parsed::<u32>("first_class")? {
			configuration.first_class = first_class;
		}

		if let Some(last_class) = args.get_parsed::<u32>("last_class")? {
			configuration.last_class = last_class;
		}

		if let Some(class_width) = args.get_parsed::<u32>("class_width")? {
			configuration.class_width = class_width.max(1);
		}

		if configuration.last_class < configuration.first_class {
			return Err(SimError::config("last_class must not precede first_class"));
		}

		Ok(configuration)
	}
}

struct FileInfo {
	size: BytesSize,
}

type SizePq = KeyedPq<FileInfo>;

enum SizeQueues {
	/// One max-heap per exact file size, iterated in size order.
	Exact(BTreeMap<BytesSize, SizePq>),

	/// One max-heap per log-binned size class.
	Classes(BinnedMapping<SizePq>),
}

/// MIN-cod, a cost-over-distance variant of offline MIN.
///
/// Evicts the file minimizing `size / reuse_distance`. Files are grouped
/// by size so each group only needs to be scanned in max-reuse order
/// until its smallest possible cost over distance can no longer undercut
/// the best candidate found so far.
pub struct MincodState {
	reuse_timer: Rc<ReuseTimer>,
	queues: SizeQueues,
}

impl MincodState {
	pub fn new(reuse_timer: Rc<ReuseTimer>, configuration: Configuration) -> Self {
		let queues = if configuration.classes {
			SizeQueues::Classes(BinnedMapping::new(
				Binner::bounded_log(
					configuration.first_class,
					configuration.last_class,
					configuration.class_width,
				),
				|| KeyedPq::new(true),
			))
		} else {
			SizeQueues::Exact(BTreeMap::new())
		};

		MincodState {
			reuse_timer,
			queues,
		}
	}

	fn pop_candidate_exact(
		queues: &mut BTreeMap<BytesSize, SizePq>,
	) -> Result<FileId, SimError> {
		let mut best: Option<(BytesSize, FileId, f64)> = None;

		for (&pq_size, pq) in queues.iter() {
			// queues are dropped when drained, so the head exists
			let Some((file, reuse_ind, info)) = pq.peek() else {
				continue;
			};

			let cod = info.size as f64 / reuse_ind;

			if best.as_ref().is_none_or(|(_, _, best_cod)| cod < *best_cod) {
				best = Some((pq_size, file.clone(), cod));
			}
		}

		let (pq_size, file, _) = best.ok_or(SimError::NoEvictionCandidate)?;

		let drained = {
			let pq = queues
				.get_mut(&pq_size)
				.ok_or(SimError::Internal)?;

			pq.remove(&file);
			pq.is_empty()
		};

		if drained {
			queues.remove(&pq_size);
		}

		Ok(file)
	}

	fn pop_candidate_classes(
		classes: &mut BinnedMapping<SizePq>,
	) -> Result<FileId, SimError> {
		let mut best: Option<(FileId, f64)> = None;

		for (class_min_size, pq) in classes.items() {
			for (file, reuse_ind, info) in pq.ordered_iter() {
				// reuse_ind bounds every later entry of this queue, so
				// class_min_size / reuse_ind bounds their cost over
				// distance from below
				let cod = info.size as f64 / reuse_ind;

				if best.as_ref().is_none_or(|(_, best_cod)| cod < *best_cod) {
					best = Some((file.clone(), cod));
				}

				let best_cod = best.as_ref().map(|(_, cod)| *cod).unwrap_or(f64::INFINITY);

				if class_min_size as f64 / reuse_ind >= best_cod {
					break;
				}
			}
		}

		let (file, _) = best.ok_or(SimError::NoEvictionCandidate)?;

		for pq in classes.values_through_mut(u64::MAX) {
			if pq.remove(&file).is_some() {
				break;
			}
		}

		Ok(file)
	}

	fn queue_for(&mut self, size: BytesSize) -> &mut SizePq {
		match &mut self.queues {
			SizeQueues::Exact(queues) => {
				queues.entry(size).or_insert_with(|| KeyedPq::new(true))
			},

			SizeQueues::Classes(classes) => classes.get_mut(size),
		}
	}

	fn moved(&self, old_size: BytesSize, new_size: BytesSize) -> bool {
		match &self.queues {
			SizeQueues::Exact(_) => old_size != new_size,
			SizeQueues::Classes(classes) => classes.bin(old_size) != classes.bin(new_size),
		}
	}

	fn remove_from(&mut self, size: BytesSize, file: &FileId) -> Option<FileInfo> {
		match &mut self.queues {
			SizeQueues::Exact(queues) => {
				let pq = queues.get_mut(&size)?;
				let removed = pq.remove(file).map(|(_, info)| info);

				if pq.is_empty() {
					queues.remove(&size);
				}

				removed
			},

			SizeQueues::Classes(classes) => {
				classes.get_mut(size).remove(file).map(|(_, info)| info)
			},
		}
	}
}

impl PolicyState for MincodState {
	fn pop_eviction_candidates(
		&mut self,
		_ctx: &EvictionContext,
	) -> Result<Vec<FileId>, SimError> {
		let candidate = match &mut self.queues {
			SizeQueues::Exact(queues) => Self::pop_candidate_exact(queues)?,
			SizeQueues::Classes(classes) => Self::pop_candidate_classes(classes)?,
		};

		Ok(vec![candidate])
	}

	fn contains(&self, file: &FileId) -> bool {
		match &self.queues {
			SizeQueues::Exact(queues) => queues.values().any(|pq| pq.contains(file)),
			SizeQueues::Classes(classes) => classes.values().any(|pq| pq.contains(file)),
		}
	}

	fn remove_file(&mut self, file: &FileId) -> Result<(), SimError> {
		let size = match &self.queues {
			SizeQueues::Exact(queues) => queues
				.iter()
				.find(|(_, pq)| pq.contains(file))
				.map(|(&size, _)| size),

			SizeQueues::Classes(classes) => classes
				.items()
				.find(|(_, pq)| pq.contains(file))
				.map(|(class_min_size, _)| class_min_size),
		};

		let size = size.ok_or(SimError::NotInCache)?;
		self.remove_from(size, file).ok_or(SimError::NotInCache)?;

		Ok(())
	}

	fn process_access(
		&mut self,
		file: &FileId,
		ind: usize,
		_ensure: bool,
		info: &AccessInfo,
	) -> Result<(), SimError> {
		let old_size = info.total_bytes - info.bytes_added;
		let new_size = info.total_bytes;
		let reuse_ind = self.reuse_timer.reuse_ind_inf(ind);

		if old_size == 0 {
			self.queue_for(new_size).add(file.clone(), reuse_ind, FileInfo {
				size: new_size,
			});
		} else if self.moved(old_size, new_size) {
			let mut file_info = self
				.remove_from(old_size, file)
				.ok_or(SimError::NotInCache)?;

			file_info.size = new_size;
			self.queue_for(new_size).add(file.clone(), reuse_ind, file_info);
		} else {
			let pq = self.queue_for(new_size);

			let file_info = pq
				.payload_mut(file)
				.ok_or(SimError::NotInCache)?;

			file_info.size = new_size;
			pq.change_value(file, reuse_ind);
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache::policy::tests::{drive_offline, sized_trace};

	fn mincod(
		reuse_timer: Rc<ReuseTimer>,
		configuration: Configuration,
	) -> Box<MincodState> {
		Box::new(MincodState::new(reuse_timer, configuration))
	}

	#[test]
	fn it_parses_the_configuration() {
		let configuration = Configuration::from_user_args(
			"classes=true,first_class=4,last_class=20,class_width=4",
		)
		.unwrap();

		assert!(configuration.classes);
		assert_eq!(configuration.first_class, 4);
		assert_eq!(configuration.last_class, 20);
		assert_eq!(configuration.class_width, 4);

		assert!(Configuration::from_user_args("first_class=9,last_class=3").is_err());
		assert!(Configuration::from_user_args("widths=2").is_err());
	}

	#[test]
	fn it_minimizes_cost_over_distance() {
		// b is large but reused soon; a is small and reused late; the
		// best cost over distance is a
		let trace = sized_trace(&[("a", 2), ("b", 8), ("c", 2), ("b", 8), ("a", 2)]);

		let infos = drive_offline(
			|reuse_timer| mincod(reuse_timer, Configuration::default()),
			10,
			&trace,
		);

		// a: 2 / (4 - ...) vs b: 8 / 3; a has cod 2/4 = 0.5 at ind 2
		assert_eq!(infos[2].evicted_files, vec!["a".to_string()]);
	}

	#[test]
	fn never_reused_files_have_zero_cost_over_distance() {
		let trace = sized_trace(&[
			("a", 4), ("b", 4), ("c", 4), ("d", 4), ("a", 4), ("b", 4),
		]);

		let infos = drive_offline(
			|reuse_timer| mincod(reuse_timer, Configuration::default()),
			12,
			&trace,
		);

		// c is never reused: its cost over distance is 4 / inf = 0
		assert_eq!(infos[3].evicted_files, vec!["c".to_string()]);
		assert!(infos[4].file_hit);
		assert!(infos[5].file_hit);
	}

	#[test]
	fn class_mode_matches_exact_mode_on_distinct_costs() {
		let trace = sized_trace(&[
			("a", 100), ("b", 5000), ("c", 200), ("e", 600),
			("f", 800), ("a", 100), ("c", 200), ("b", 5000),
		]);

		let exact = drive_offline(
			|reuse_timer| mincod(reuse_timer, Configuration::default()),
			6000,
			&trace,
		);

		let classes = drive_offline(
			|reuse_timer| {
				mincod(reuse_timer, Configuration {
					classes: true,
					..Configuration::default()
				})
			},
			6000,
			&trace,
		);

		assert_eq!(exact.len(), classes.len());

		for (exact_info, class_info) in exact.iter().zip(classes.iter()) {
			assert_eq!(exact_info.evicted_files, class_info.evicted_files);
		}

		// the never-reused e has the least cost over distance, then a
		assert_eq!(
			exact[4].evicted_files,
			vec!["e".to_string(), "a".to_string()],
		);
	}
}
