/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use serde::{Serialize, Deserialize};

use crate::{
	SimError,
	cache::storage::StorageRef,
	workload::{Access, BytesSize, FileId, TimeStamp, canonicalize_parts},
};

/// Rounds in a row the eviction loop tolerates an empty candidate list
/// while a policy builds up internal eviction credit.
const MAX_EMPTY_EVICTION_ROUNDS: u32 = 64;

/// What one processed access changed in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessInfo {
	pub access: Access,
	pub file_hit: bool,
	pub bytes_hit: BytesSize,
	pub bytes_missed: BytesSize,
	pub bytes_added: BytesSize,
	pub bytes_removed: BytesSize,

	/// Bytes of the file resident in the storage after the access.
	pub total_bytes: BytesSize,

	/// Files fully removed during this access, in eviction order.
	pub evicted_files: Vec<FileId>,
}

impl AccessInfo {
	#[must_use]
	pub fn bytes_requested(&self) -> BytesSize {
		self.bytes_hit + self.bytes_missed
	}
}

/// Everything a policy may consult when asked for eviction candidates.
#[derive(Debug, Clone, Copy)]
pub struct EvictionContext<'a> {
	pub file: &'a FileId,
	pub ts: TimeStamp,
	pub ind: usize,
	pub requested_bytes: BytesSize,
	pub contained_bytes: BytesSize,
	pub missing_bytes: BytesSize,
	pub in_cache_bytes: BytesSize,
	pub free_bytes: BytesSize,
	pub required_free_bytes: BytesSize,
}

/// Replacement-policy state. Implementations keep their set of tracked
/// files consistent with the storage, except transiently inside an
/// eviction loop.
pub trait PolicyState {
	/// Produces the next files to evict. An empty list is only allowed
	/// while the policy accumulates eviction credit internally; a policy
	/// which cannot make room returns [`SimError::NoEvictionCandidate`].
	fn pop_eviction_candidates(
		&mut self,
		ctx: &EvictionContext,
	) -> Result<Vec<FileId>, SimError>;

	/// Whether the policy tracks the file.
	fn contains(&self, file: &FileId) -> bool;

	/// Drops the file from the policy state, e.g. after an external
	/// eviction. Fails with [`SimError::NotInCache`] for untracked files.
	fn remove_file(&mut self, file: &FileId) -> Result<(), SimError>;

	/// Records the processed access. `ensure` is `true` iff no byte of
	/// the file was in the storage before the access, i.e. the policy
	/// must begin tracking it.
	fn process_access(
		&mut self,
		file: &FileId,
		ind: usize,
		ensure: bool,
		info: &AccessInfo,
	) -> Result<(), SimError>;
}

/// A cache processor: one storage volume plus one policy state, driven by
/// a fixed per-access protocol.
///
/// Online processors are handed accesses one at a time; offline
/// processors are constructed with a state derived from the full access
/// sequence first and then driven the same way.
pub struct StateProcessor {
	storage: StorageRef,
	state: Box<dyn PolicyState>,
	ind: usize,
}

impl StateProcessor {
	pub fn new(storage: StorageRef, state: Box<dyn PolicyState>) -> Self {
		StateProcessor {
			storage,
			state,
			ind: 0,
		}
	}

	#[must_use]
	pub fn storage(&self) -> &StorageRef {
		&self.storage
	}

	pub fn process(&mut self, mut access: Access) -> Result<AccessInfo, SimError> {
		let ind = self.ind;
		self.ind += 1;

		canonicalize_parts(&mut access.parts);

		let mut storage = self.storage.borrow_mut();

		let file_hit = storage.contains_file(&access.file);
		let requested_bytes = access.requested_bytes();
		let mut contained_bytes = storage.contained_bytes(&access.file, &access.parts);
		let mut missing_bytes = requested_bytes - contained_bytes;
		let mut in_cache_bytes = storage.file_bytes(&access.file);

		if missing_bytes == 0 {
			let info = AccessInfo {
				access,
				file_hit: true,
				bytes_hit: contained_bytes,
				bytes_missed: 0,
				bytes_added: 0,
				bytes_removed: 0,
				total_bytes: in_cache_bytes,
				evicted_files: Vec::new(),
			};

			drop(storage);
			self.state.process_access(&info.access.file, ind, false, &info)?;

			return Ok(info);
		}

		let mut free_bytes = storage.free_bytes();
		let mut evicted_files = Vec::<FileId>::new();
		let mut evicted_bytes: BytesSize = 0;
		let mut empty_rounds: u32 = 0;

		while free_bytes < missing_bytes {
			let candidates = self.state.pop_eviction_candidates(&EvictionContext {
				file: &access.file,
				ts: access.access_ts,
				ind,
				requested_bytes,
				contained_bytes,
				missing_bytes,
				in_cache_bytes,
				free_bytes,
				required_free_bytes: missing_bytes - free_bytes,
			})?;

			if candidates.is_empty() {
				empty_rounds += 1;

				if empty_rounds > MAX_EMPTY_EVICTION_ROUNDS {
					return Err(SimError::NoEvictionCandidate);
				}

				continue;
			}

			empty_rounds = 0;

			for candidate in candidates {
				let candidate_bytes = storage.evict(&candidate);

				evicted_bytes += candidate_bytes;
				free_bytes += candidate_bytes;

				if candidate == access.file {
					// the policy evicted the file about to be accessed
					// (possible for size-aware policies on huge files);
					// conceptually the eviction happens first, so the
					// access becomes a complete miss
					contained_bytes = 0;
					missing_bytes = requested_bytes;
					in_cache_bytes = 0;
				}

				evicted_files.push(candidate);
			}
		}

		let placed_bytes = storage.place(&access.file, &access.parts)?;
		let total_bytes = in_cache_bytes + placed_bytes;

		drop(storage);

		let info = AccessInfo {
			access,
			file_hit,
			bytes_hit: contained_bytes,
			bytes_missed: missing_bytes,
			bytes_added: placed_bytes,
			bytes_removed: evicted_bytes,
			total_bytes,
			evicted_files,
		};

		// if any byte was in the storage, the policy already tracks the file
		let ensure = in_cache_bytes == 0;
		self.state.process_access(&info.access.file, ind, ensure, &info)?;

		Ok(info)
	}
}
