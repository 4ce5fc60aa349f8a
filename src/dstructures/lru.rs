/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use rustc_hash::FxHashMap;
use dlv_list::{VecList, Index};

use crate::workload::{BytesSize, FileId};

/// Ordered mapping over files. The front of the internal list holds the
/// most recently touched entry, the back the least recently touched one.
pub struct LruMap<V> {
	map: FxHashMap<FileId, Index<Entry<V>>>,
	list: VecList<Entry<V>>,
}

struct Entry<V> {
	file: FileId,
	value: V,
}

impl<V> Default for LruMap<V> {
	fn default() -> Self {
		LruMap {
			map: FxHashMap::default(),
			list: VecList::new(),
		}
	}
}

impl<V> LruMap<V> {
	pub fn len(&self) -> usize {
		self.list.len()
	}

	pub fn is_empty(&self) -> bool {
		self.list.is_empty()
	}

	pub fn contains(&self, file: &FileId) -> bool {
		self.map.contains_key(file)
	}

	pub fn get(&self, file: &FileId) -> Option<&V> {
		let index = self.map.get(file)?;
		Some(&self.list.get(*index)?.value)
	}

	pub fn get_mut(&mut self, file: &FileId) -> Option<&mut V> {
		let index = self.map.get(file)?;
		Some(&mut self.list.get_mut(*index)?.value)
	}

	/// Inserts at the most recent end. An existing entry keeps its
	/// position and only has its value replaced.
	pub fn insert(&mut self, file: FileId, value: V) -> Option<V> {
		if let Some(index) = self.map.get(&file) {
			let entry = self.list.get_mut(*index)?;
			return Some(std::mem::replace(&mut entry.value, value));
		}

		let index = self.list.push_front(Entry {
			file: file.clone(),
			value,
		});

		self.map.insert(file, index);

		None
	}

	/// Moves the entry to the most recent end. Returns `false` if the
	/// file is not tracked.
	pub fn access(&mut self, file: &FileId) -> bool {
		let Some(index) = self.map.get(file) else {
			return false;
		};

		if let Some(entry) = self.list.remove(*index) {
			let new_index = self.list.push_front(entry);
			self.map.insert(file.clone(), new_index);
		}

		true
	}

	pub fn remove(&mut self, file: &FileId) -> Option<V> {
		let index = self.map.remove(file)?;
		self.list.remove(index).map(|entry| entry.value)
	}

	/// Removes and returns the least recently touched entry.
	pub fn pop_lru(&mut self) -> Option<(FileId, V)> {
		let entry = self.list.pop_back()?;
		self.map.remove(&entry.file);

		Some((entry.file, entry.value))
	}

	/// Iterates from the most recently to the least recently touched
	/// entry.
	pub fn iter(&self) -> impl Iterator<Item = (&FileId, &V)> {
		self.list
			.iter()
			.map(|entry| (&entry.file, &entry.value))
	}
}

/// Per-entry byte size tracked by a [`SizedLruMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
	pub size: BytesSize,
}

/// [`LruMap`] over [`FileInfo`] entries which additionally maintains the
/// sum of the entry sizes.
#[derive(Default)]
pub struct SizedLruMap {
	lru: LruMap<FileInfo>,
	total_size: BytesSize,
}

impl SizedLruMap {
	pub fn len(&self) -> usize {
		self.lru.len()
	}

	pub fn is_empty(&self) -> bool {
		self.lru.is_empty()
	}

	#[must_use]
	pub fn total_size(&self) -> BytesSize {
		self.total_size
	}

	pub fn contains(&self, file: &FileId) -> bool {
		self.lru.contains(file)
	}

	pub fn size_of(&self, file: &FileId) -> Option<BytesSize> {
		self.lru.get(file).map(|info| info.size)
	}

	pub fn insert(&mut self, file: FileId, size: BytesSize) {
		if let Some(old) = self.lru.insert(file, FileInfo { size }) {
			self.total_size -= old.size;
		}

		self.total_size += size;
	}

	pub fn access(&mut self, file: &FileId) -> bool {
		self.lru.access(file)
	}

	pub fn remove(&mut self, file: &FileId) -> Option<BytesSize> {
		let info = self.lru.remove(file)?;
		self.total_size -= info.size;

		Some(info.size)
	}

	pub fn pop_lru(&mut self) -> Option<(FileId, BytesSize)> {
		let (file, info) = self.lru.pop_lru()?;
		self.total_size -= info.size;

		Some((file, info.size))
	}

	pub fn add_bytes_to_file(&mut self, file: &FileId, bytes: BytesSize) {
		if let Some(info) = self.lru.get_mut(file) {
			info.size += bytes;
			self.total_size += bytes;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn file(name: &str) -> FileId {
		name.to_string()
	}

	#[test]
	fn eviction_order_is_correct() {
		let mut lru = LruMap::<()>::default();

		for access in ["a", "b", "b", "b", "a", "c", "d", "a", "c", "a"] {
			let file = file(access);

			if !lru.access(&file) {
				lru.insert(file, ());
			}
		}

		for eviction in ["b", "d", "c", "a"] {
			assert_eq!(lru.pop_lru(), Some((file(eviction), ())));
		}

		assert_eq!(lru.pop_lru(), None);
	}

	#[test]
	fn insert_keeps_position_of_existing_entries() {
		let mut lru = LruMap::<u32>::default();

		lru.insert(file("a"), 1);
		lru.insert(file("b"), 2);
		lru.insert(file("a"), 3);

		assert_eq!(lru.get(&file("a")), Some(&3));
		assert_eq!(lru.pop_lru(), Some((file("a"), 3)));
	}

	#[test]
	fn sized_map_tracks_total_size() {
		let mut lru = SizedLruMap::default();

		lru.insert(file("a"), 10);
		lru.insert(file("b"), 20);
		assert_eq!(lru.total_size(), 30);

		lru.insert(file("a"), 5);
		assert_eq!(lru.total_size(), 25);

		lru.add_bytes_to_file(&file("b"), 3);
		assert_eq!(lru.total_size(), 28);

		assert_eq!(lru.pop_lru(), Some((file("a"), 5)));
		assert_eq!(lru.remove(&file("b")), Some(23));
		assert_eq!(lru.total_size(), 0);
	}
}
