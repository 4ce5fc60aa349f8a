/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::rc::Rc;

use crate::{
	SimError,
	cache::processor::{AccessInfo, EvictionContext, PolicyState},
	dstructures::{Binner, BinnedMapping, KeyedPq, ReuseTimer},
	params::UserArgs,
	workload::{BytesSize, FileId},
};

#[derive(Debug, Clone, Copy)]
pub struct Configuration {
	pub first_class: u32,
	pub last_class: u32,
	pub class_width: u32,
}

impl Default for Configuration {
	fn default() -> Self {
		Configuration {
			first_class: 10,
			last_class: 40,
			class_width: 2,
		}
	}
}

impl Configuration {
	pub fn from_user_args(user_args: &str) -> Result<Self, SimError> {
		let args = user_args.parse::<UserArgs>()?;
		args.check_names(&["first_class", "last_class", "class_width"])?;

		let mut configuration = Configuration::default();

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

/// One size class: the cached files of the class keyed by reuse index,
/// their total size, and the bytes marked for eviction but not yet freed.
struct Class {
	pq: KeyedPq<FileInfo>,
	total_size: BytesSize,
	eviction_counter: BytesSize,
}

impl Class {
	fn new() -> Self {
		Class {
			pq: KeyedPq::new(true),
			total_size: 0,
			eviction_counter: 0,
		}
	}

	fn pop_file(&mut self) -> Option<(FileId, BytesSize)> {
		let (file, _, info) = self.pq.pop()?;
		self.total_size -= info.size;

		Some((file, info.size))
	}

	fn remove_file(&mut self, file: &FileId) -> Option<FileInfo> {
		let (_, info) = self.pq.remove(file)?;
		self.total_size -= info.size;

		Some(info)
	}

	fn add_file(&mut self, file: FileId, size: BytesSize, reuse_ind: f64) {
		self.pq.add(file, reuse_ind, FileInfo { size });
		self.total_size += size;
	}

	fn update_file(
		&mut self,
		file: &FileId,
		size: BytesSize,
		reuse_ind: f64,
	) -> Result<(), SimError> {
		let info = self.pq
			.payload_mut(file)
			.ok_or(SimError::NotInCache)?;

		self.total_size += size;
		self.total_size -= info.size;
		info.size = size;

		self.pq.change_value(file, reuse_ind);

		Ok(())
	}
}

/// Offline bit-model algorithm: a MIN variant which spreads evictions
/// across file-size classes.
///
/// When `b` bytes must be freed, classes of files no larger than `b`
/// evict files in max-reuse order until `b` bytes are gone. Every larger
/// class adds `b` to an eviction counter and only actually evicts its
/// head once the counter outgrows the head's size, so large files are
/// charged fairly without being evicted for every small request.
pub struct ObmaState {
	reuse_timer: Rc<ReuseTimer>,
	classes: BinnedMapping<Class>,
}

impl ObmaState {
	pub fn new(reuse_timer: Rc<ReuseTimer>, configuration: Configuration) -> Self {
		ObmaState {
			reuse_timer,
			classes: BinnedMapping::new(
				Binner::bounded_log(
					configuration.first_class,
					configuration.last_class,
					configuration.class_width,
				),
				Class::new,
			),
		}
	}

	/// Bytes to charge every class for this round. When the small
	/// classes cannot cover the requested bytes, the head size of the
	/// smallest non-empty larger class is charged instead so its
	/// eviction counter eventually overflows.
	fn round_up_to_evict(&self, required_free_bytes: BytesSize) -> Result<BytesSize, SimError> {
		let covered: BytesSize = self.classes
			.values_through(required_free_bytes)
			.map(|class| class.total_size)
			.sum();

		if covered >= required_free_bytes {
			return Ok(required_free_bytes);
		}

		for class in self.classes.values_after(required_free_bytes) {
			if let Some((_, _, info)) = class.pq.peek() {
				return Ok(info.size);
			}
		}

		Err(SimError::NoEvictionCandidate)
	}
}

impl PolicyState for ObmaState {
	fn pop_eviction_candidates(
		&mut self,
		ctx: &EvictionContext,
	) -> Result<Vec<FileId>, SimError> {
		let required_free_bytes = ctx.required_free_bytes;
		let to_evict_bytes = self.round_up_to_evict(required_free_bytes)?;

		let mut candidates = Vec::new();

		for class in self.classes.values_through_mut(required_free_bytes) {
			// small classes evict files outright, leaving their
			// eviction counters intact
			let mut evicted_bytes = 0;

			while evicted_bytes < to_evict_bytes {
				let Some((candidate, size)) = class.pop_file() else {
					break;
				};

				evicted_bytes += size;
				candidates.push(candidate);
			}
		}

		for class in self.classes.values_after_mut(required_free_bytes) {
			class.eviction_counter += to_evict_bytes;

			while class.pq
				.peek()
				.is_some_and(|(_, _, info)| class.eviction_counter > info.size)
			{
				let Some((candidate, size)) = class.pop_file() else {
					break;
				};

				class.eviction_counter -= size;
				candidates.push(candidate);
			}
		}

		Ok(candidates)
	}

	fn contains(&self, file: &FileId) -> bool {
		self.classes.values().any(|class| class.pq.contains(file))
	}

	fn remove_file(&mut self, file: &FileId) -> Result<(), SimError> {
		for class in self.classes.values_through_mut(u64::MAX) {
			if class.remove_file(file).is_some() {
				return Ok(());
			}
		}

		Err(SimError::NotInCache)
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
			self.classes
				.get_mut(new_size)
				.add_file(file.clone(), new_size, reuse_ind);
		} else if self.classes.bin(old_size) != self.classes.bin(new_size) {
			self.classes
				.get_mut(old_size)
				.remove_file(file)
				.ok_or(SimError::NotInCache)?;

			self.classes
				.get_mut(new_size)
				.add_file(file.clone(), new_size, reuse_ind);
		} else {
			self.classes
				.get_mut(new_size)
				.update_file(file, new_size, reuse_ind)?;
		}

		Ok(())
	}
}
