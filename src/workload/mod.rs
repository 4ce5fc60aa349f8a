/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

pub mod units;
pub mod stats;
pub mod generator;

use serde::{Serialize, Deserialize};

/// Opaque file identity. Compared byte for byte; directory-style ids
/// ("dataset/file_000001") allow classifiers to derive file classes.
pub type FileId = String;

pub type PartInd = u32;
pub type BytesSize = u64;
pub type TimeStamp = u64;

/// The first `BytesSize` bytes of part `PartInd` of a file.
pub type PartSpec = (PartInd, BytesSize);

/// A single read request by a job, covering prefixes of one or more parts
/// of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
	pub access_ts: TimeStamp,
	pub file: FileId,
	pub parts: Vec<PartSpec>,
}

/// The parts of a file a task reads whenever it processes that file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessScheme {
	pub file: FileId,
	pub parts: Vec<PartSpec>,
}

/// One unit of work submitted to the distributor. All access schemes of a
/// job are read by the same core.
#[derive(Debug, Clone)]
pub struct Job {
	pub submit_ts: TimeStamp,
	pub access_schemes: Vec<AccessScheme>,
}

impl Access {
	#[must_use]
	pub fn requested_bytes(&self) -> BytesSize {
		self.parts
			.iter()
			.map(|(_, part_bytes)| part_bytes)
			.sum()
	}
}

impl Job {
	#[must_use]
	pub fn total_bytes_read(&self) -> BytesSize {
		self.access_schemes
			.iter()
			.flat_map(|scheme| scheme.parts.iter())
			.map(|(_, part_bytes)| part_bytes)
			.sum()
	}
}

/// Sorts parts by part index and merges duplicate indices by taking the
/// element-wise maximum of the requested sizes.
pub fn canonicalize_parts(parts: &mut Vec<PartSpec>) {
	parts.sort_by_key(|(part_ind, _)| *part_ind);
	parts.dedup_by(|next, prev| {
		if next.0 == prev.0 {
			prev.1 = prev.1.max(next.1);
			true
		} else {
			false
		}
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn it_canonicalizes_parts() {
		let mut parts = vec![(3, 10), (0, 4), (3, 7), (1, 0)];
		canonicalize_parts(&mut parts);

		assert_eq!(parts, vec![(0, 4), (1, 0), (3, 10)]);
	}

	#[test]
	fn it_sums_requested_bytes() {
		let access = Access {
			access_ts: 0,
			file: "f".to_string(),
			parts: vec![(0, 3), (1, 4)],
		};

		assert_eq!(access.requested_bytes(), 7);
	}
}
