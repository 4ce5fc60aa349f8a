/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::{
	cell::RefCell,
	rc::Rc,
};

use rustc_hash::FxHashMap;

use crate::{
	SimError,
	workload::{BytesSize, FileId, PartInd, PartSpec},
};

/// A fixed-capacity storage volume which may be shared by several cache
/// processors. All mutation is serialized through the single-threaded
/// driver.
pub type StorageRef = Rc<RefCell<Storage>>;

/// Byte-accurate bookkeeping of the file parts resident in a volume.
///
/// A resident file is a sparse mapping from part index to the stored
/// prefix size of that part.
pub struct Storage {
	total_bytes: BytesSize,
	used_bytes: BytesSize,
	files: FxHashMap<FileId, FxHashMap<PartInd, BytesSize>>,
}

impl Storage {
	pub fn new(total_bytes: BytesSize) -> Self {
		Storage {
			total_bytes,
			used_bytes: 0,
			files: FxHashMap::default(),
		}
	}

	pub fn new_shared(total_bytes: BytesSize) -> StorageRef {
		Rc::new(RefCell::new(Storage::new(total_bytes)))
	}

	#[must_use]
	pub fn total_bytes(&self) -> BytesSize {
		self.total_bytes
	}

	#[must_use]
	pub fn used_bytes(&self) -> BytesSize {
		self.used_bytes
	}

	#[must_use]
	pub fn free_bytes(&self) -> BytesSize {
		self.total_bytes - self.used_bytes
	}

	pub fn contains_file(&self, file: &FileId) -> bool {
		self.files.contains_key(file)
	}

	/// All parts of the file resident in the storage, sorted by part
	/// index.
	pub fn parts(&self, file: &FileId) -> Vec<PartSpec> {
		let Some(file_parts) = self.files.get(file) else {
			return Vec::new();
		};

		let mut parts: Vec<PartSpec> = file_parts
			.iter()
			.map(|(&part_ind, &part_bytes)| (part_ind, part_bytes))
			.collect();

		parts.sort_by_key(|(part_ind, _)| *part_ind);
		parts
	}

	/// Total bytes of the file resident in the storage.
	pub fn file_bytes(&self, file: &FileId) -> BytesSize {
		self.files
			.get(file)
			.map(|file_parts| file_parts.values().sum())
			.unwrap_or(0)
	}

	/// Sum over the requested parts of the stored size, capped at the
	/// requested size.
	pub fn contained_bytes(&self, file: &FileId, parts: &[PartSpec]) -> BytesSize {
		let Some(file_parts) = self.files.get(file) else {
			return 0;
		};

		parts
			.iter()
			.map(|(part_ind, part_bytes)| {
				file_parts
					.get(part_ind)
					.copied()
					.unwrap_or(0)
					.min(*part_bytes)
			})
			.sum()
	}

	pub fn missing_bytes(&self, file: &FileId, parts: &[PartSpec]) -> BytesSize {
		let requested_bytes: BytesSize = parts
			.iter()
			.map(|(_, part_bytes)| part_bytes)
			.sum();

		requested_bytes - self.contained_bytes(file, parts)
	}

	/// Places the passed parts, taking the element-wise maximum with any
	/// already stored sizes. The caller must have made room first.
	///
	/// Returns the number of bytes added to the storage.
	pub fn place(&mut self, file: &FileId, parts: &[PartSpec]) -> Result<BytesSize, SimError> {
		let missing_bytes = self.missing_bytes(file, parts);

		if self.free_bytes() < missing_bytes {
			return Err(SimError::InsufficientFreeSpace);
		}

		let file_parts = self.files
			.entry(file.clone())
			.or_default();

		for (part_ind, part_bytes) in parts {
			let stored = file_parts.entry(*part_ind).or_insert(0);
			*stored = (*stored).max(*part_bytes);
		}

		self.used_bytes += missing_bytes;

		Ok(missing_bytes)
	}

	/// Evicts all parts of the file.
	///
	/// Returns the number of bytes freed, zero if the file is absent.
	pub fn evict(&mut self, file: &FileId) -> BytesSize {
		let Some(file_parts) = self.files.remove(file) else {
			return 0;
		};

		let evicted_bytes: BytesSize = file_parts.values().sum();
		self.used_bytes -= evicted_bytes;

		evicted_bytes
	}

	pub fn files(&self) -> impl Iterator<Item = &FileId> {
		self.files.keys()
	}
}
