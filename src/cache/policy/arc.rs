/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use crate::{
	SimError,
	cache::processor::{AccessInfo, EvictionContext, PolicyState},
	dstructures::SizedLruMap,
	params::UserArgs,
	workload::{BytesSize, FileId},
};

#[derive(Debug, Clone, Copy)]
pub struct Configuration {
	/// Ghost directory budget as a fraction of the cache size.
	pub ghosts_factor: f64,
}

impl Default for Configuration {
	fn default() -> Self {
		Configuration {
			ghosts_factor: 1.0,
		}
	}
}

impl Configuration {
	pub fn from_user_args(user_args: &str) -> Result<Self, SimError> {
		let args = user_args.parse::<UserArgs>()?;
		args.check_names(&["ghosts_factor"])?;

		let mut configuration = Configuration::default();

		if let Some(ghosts_factor) = args.get_parsed::<f64>("ghosts_factor")? {
			if ghosts_factor < 0.0 {
				return Err(SimError::config("ghosts_factor must be non-negative"));
			}

			configuration.ghosts_factor = ghosts_factor;
		}

		Ok(configuration)
	}
}

/// Adaptive replacement over byte-sized files.
///
/// Four LRU lists: the tops hold cached files seen once (`top_once`, T1
/// in the ARC paper) and repeatedly (`top_multiple`, T2); the bottoms
/// hold ghost entries of recently evicted files (B1/B2). Hits in the
/// ghost lists steer the target size of the once-list.
///
/// Invariants, in bytes:
///  1. `top_once + top_multiple <= total_size`
///  2. `top_once + bottom_once <= (1 + ghosts_factor) * total_size / 2`
///  3. `bottom_once + bottom_multiple <= ghosts_factor * total_size`
pub struct ArcBitState {
	total_size: BytesSize,

	top_once_target_size: BytesSize,
	ghosts_total_size: BytesSize,
	once_total_size: BytesSize,

	top_once: SizedLruMap,
	bottom_once: SizedLruMap,
	top_multiple: SizedLruMap,
	bottom_multiple: SizedLruMap,
}

impl ArcBitState {
	pub fn new(total_size: BytesSize, configuration: Configuration) -> Self {
		ArcBitState {
			total_size,

			top_once_target_size: 0,
			ghosts_total_size: (total_size as f64 * configuration.ghosts_factor) as BytesSize,
			once_total_size: ((1.0 + configuration.ghosts_factor) * total_size as f64 / 2.0)
				as BytesSize,

			top_once: SizedLruMap::default(),
			bottom_once: SizedLruMap::default(),
			top_multiple: SizedLruMap::default(),
			bottom_multiple: SizedLruMap::default(),
		}
	}

	/// Moves cached files to the ghost lists until `required_bytes` more
	/// fit beside the currently cached bytes.
	fn evict(&mut self, required_bytes: BytesSize, in_once: bool) -> Vec<FileId> {
		let mut candidates = Vec::new();

		while self.top_once.total_size() + self.top_multiple.total_size() + required_bytes
			> self.total_size
		{
			let target = self.top_once_target_size;

			let from_once = self.top_once.len() > 1
				&& (self.top_once.total_size() > target
					|| (!in_once && self.top_once.total_size() + required_bytes > target)
					|| self.top_multiple.is_empty());

			let Some((candidate, candidate_size)) = self.move_lru_to(from_once) else {
				break;
			};

			// invariant 3 may be violated until this loop completes
			while self.bottom_once.total_size()
				+ self.bottom_multiple.total_size()
				+ candidate_size > self.ghosts_total_size
			{
				if self.bottom_multiple.pop_lru().is_none() {
					break;
				}
			}

			candidates.push(candidate);
		}

		candidates
	}

	fn move_lru_to(&mut self, once: bool) -> Option<(FileId, BytesSize)> {
		let (origin, dest) = if once {
			(&mut self.top_once, &mut self.bottom_once)
		} else {
			(&mut self.top_multiple, &mut self.bottom_multiple)
		};

		let (file, size) = origin.pop_lru()?;
		dest.insert(file.clone(), size);

		Some((file, size))
	}

	fn average_file_size(&self) -> BytesSize {
		let count = self.top_once.len()
			+ self.bottom_once.len()
			+ self.top_multiple.len()
			+ self.bottom_multiple.len();

		if count == 0 {
			return 0;
		}

		let total = self.top_once.total_size()
			+ self.bottom_once.total_size()
			+ self.top_multiple.total_size()
			+ self.bottom_multiple.total_size();

		((total as f64) / (count as f64)).round() as BytesSize
	}

	fn ghost_ratio(numerator: BytesSize, denominator: BytesSize) -> f64 {
		if denominator == 0 {
			return 1.0;
		}

		(numerator as f64 / denominator as f64).max(1.0)
	}

	fn move_file_to_multiple(&mut self, file: &FileId) {
		if let Some(size) = self.top_once.remove(file) {
			self.top_multiple.insert(file.clone(), size);
		}
	}
}

impl PolicyState for ArcBitState {
	fn pop_eviction_candidates(
		&mut self,
		ctx: &EvictionContext,
	) -> Result<Vec<FileId>, SimError> {
		let file = ctx.file;
		let missing_bytes = ctx.missing_bytes;

		let in_top_once = self.top_once.contains(file);

		if in_top_once || self.top_multiple.contains(file) {
			// case 1: the file is cached and grows

			if in_top_once {
				self.move_file_to_multiple(file);
			} else {
				self.top_multiple.access(file);
			}

			let mut candidates = self.evict(missing_bytes, in_top_once);

			if candidates.contains(file) {
				// the file itself was pushed out; re-admit it sized at
				// the full request
				candidates.extend(self.evict(ctx.requested_bytes, in_top_once));

				self.bottom_once.remove(file);
				self.bottom_multiple.remove(file);
				self.top_multiple.insert(file.clone(), ctx.requested_bytes);
			} else {
				self.top_multiple.add_bytes_to_file(file, missing_bytes);
			}

			return Ok(candidates);
		}

		if self.bottom_once.contains(file) {
			// case 2: a once-list ghost hit; grow the once-list target

			let ratio = Self::ghost_ratio(
				self.bottom_multiple.total_size(),
				self.bottom_once.total_size(),
			);

			let delta = (ratio * self.average_file_size() as f64).round() as BytesSize;

			self.top_once_target_size = self.total_size
				.min(self.top_once_target_size + delta);

			let candidates = self.evict(missing_bytes, true);

			self.bottom_once.remove(file);
			self.top_multiple.insert(file.clone(), missing_bytes);

			return Ok(candidates);
		}

		if self.bottom_multiple.contains(file) {
			// case 3: a multiple-list ghost hit; shrink the once-list
			// target

			let ratio = Self::ghost_ratio(
				self.bottom_once.total_size(),
				self.bottom_multiple.total_size(),
			);

			let delta = (ratio * self.average_file_size() as f64).round() as BytesSize;

			self.top_once_target_size = self.top_once_target_size.saturating_sub(delta);

			let candidates = self.evict(missing_bytes, false);

			self.bottom_multiple.remove(file);
			self.top_multiple.insert(file.clone(), missing_bytes);

			return Ok(candidates);
		}

		// case 4: the file is neither cached nor tracked as a ghost

		let mut candidates = Vec::new();

		while self.top_once.total_size() + self.bottom_once.total_size() + missing_bytes
			> self.once_total_size
		{
			if self.bottom_once.pop_lru().is_none() {
				match self.top_once.pop_lru() {
					Some((candidate, _)) => candidates.push(candidate),
					None => break,
				}
			}
		}

		candidates.extend(self.evict(missing_bytes, false));

		self.top_once.insert(file.clone(), missing_bytes);

		Ok(candidates)
	}

	fn contains(&self, file: &FileId) -> bool {
		self.top_once.contains(file)
			|| self.top_multiple.contains(file)
			|| self.bottom_once.contains(file)
			|| self.bottom_multiple.contains(file)
	}

	fn remove_file(&mut self, file: &FileId) -> Result<(), SimError> {
		if self.top_once.remove(file).is_some()
			|| self.bottom_once.remove(file).is_some()
			|| self.top_multiple.remove(file).is_some()
			|| self.bottom_multiple.remove(file).is_some()
		{
			return Ok(());
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
		if info.bytes_added == 0 {
			// full hit; no eviction pass ran, so the file sits in one of
			// the top lists
			if self.top_multiple.contains(file) {
				self.top_multiple.access(file);
			} else if self.top_once.contains(file) {
				self.move_file_to_multiple(file);
			} else {
				return Err(SimError::NotInCache);
			}

			return Ok(());
		}

		if info.bytes_removed == 0 {
			// bytes were placed without the eviction pass running; the
			// directory update happens here instead
			let candidates = self.pop_eviction_candidates(&EvictionContext {
				file,
				ts: info.access.access_ts,
				ind,
				requested_bytes: info.bytes_requested(),
				contained_bytes: info.bytes_hit,
				missing_bytes: info.bytes_missed,
				in_cache_bytes: info.bytes_hit,
				free_bytes: info.bytes_missed,
				required_free_bytes: 0,
			})?;

			if !candidates.is_empty() {
				// sufficient spare capacity must not produce evictions
				return Err(SimError::Internal);
			}
		}

		Ok(())
	}
}
