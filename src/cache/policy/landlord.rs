/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::str::FromStr;

use crate::{
	SimError,
	cache::processor::{AccessInfo, EvictionContext, PolicyState},
	dstructures::KeyedPq,
	params::UserArgs,
	workload::{BytesSize, FileId},
};

/// How a file's credit is renewed on re-access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
	/// Credit is the total cached size. Emulates LRU.
	#[default]
	TotalSize,

	/// Credit is the size of the accessed fraction.
	AccessSize,

	/// Credit is the size of the newly fetched fraction.
	FetchSize,

	/// The fetched size is added onto the current credit.
	AddFetchSize,

	/// Credit is never renewed on re-access. Nearly emulates FIFO.
	NoCost,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Configuration {
	pub mode: Mode,
}

impl Configuration {
	pub fn from_user_args(user_args: &str) -> Result<Self, SimError> {
		let args = user_args.parse::<UserArgs>()?;
		args.check_names(&["mode"])?;

		let mut configuration = Configuration::default();

		if let Some(mode) = args.get("mode") {
			configuration.mode = mode.parse()?;
		}

		Ok(configuration)
	}
}

impl FromStr for Mode {
	type Err = SimError;

	fn from_str(value: &str) -> Result<Self, SimError> {
		match value {
			"total_size" => Ok(Mode::TotalSize),
			"access_size" => Ok(Mode::AccessSize),
			"fetch_size" => Ok(Mode::FetchSize),
			"add_fetch_size" => Ok(Mode::AddFetchSize),
			"no_cost" => Ok(Mode::NoCost),
			_ => Err(SimError::config(format!("unknown landlord mode {value:?}"))),
		}
	}
}

struct FileInfo {
	size: BytesSize,
}

/// Evicts the file with the lowest credit per volume, i.e. per cached
/// byte.
///
/// A file enters with credit equal to its fetch cost, so its credit per
/// volume is one. Each eviction raises the rent threshold to the popped
/// per-volume credit, implicitly charging rent to every remaining file.
/// On re-access the credit is renewed according to the mode, but never
/// reduced (except that NoCost leaves it untouched). The rent threshold
/// is monotonically non-decreasing, so absolute priorities grow over
/// long runs; only differences to the threshold are meaningful.
pub struct LandlordState {
	mode: Mode,
	pq: KeyedPq<FileInfo>,
	rent_threshold: f64,
}

impl LandlordState {
	pub fn new(configuration: Configuration) -> Self {
		LandlordState {
			mode: configuration.mode,
			pq: KeyedPq::new(false),
			rent_threshold: 0.0,
		}
	}

	fn credit(
		&self,
		requested_bytes: BytesSize,
		placed_bytes: BytesSize,
		total_bytes: BytesSize,
		current_credit: f64,
	) -> f64 {
		match self.mode {
			Mode::TotalSize => total_bytes as f64,
			Mode::AccessSize => current_credit.max(requested_bytes as f64),
			Mode::FetchSize => current_credit.max(placed_bytes as f64),
			Mode::AddFetchSize => current_credit + placed_bytes as f64,

			Mode::NoCost => {
				if current_credit == 0.0 {
					total_bytes as f64
				} else {
					current_credit
				}
			},
		}
	}
}

impl PolicyState for LandlordState {
	fn pop_eviction_candidates(
		&mut self,
		_ctx: &EvictionContext,
	) -> Result<Vec<FileId>, SimError> {
		let (file, running_volume_credit, _) = self.pq
			.pop()
			.ok_or(SimError::NoEvictionCandidate)?;

		self.rent_threshold = running_volume_credit;

		Ok(vec![file])
	}

	fn contains(&self, file: &FileId) -> bool {
		self.pq.contains(file)
	}

	fn remove_file(&mut self, file: &FileId) -> Result<(), SimError> {
		self.pq
			.remove(file)
			.map(|_| ())
			.ok_or(SimError::NotInCache)
	}

	fn process_access(
		&mut self,
		file: &FileId,
		_ind: usize,
		_ensure: bool,
		info: &AccessInfo,
	) -> Result<(), SimError> {
		let total_bytes = info.total_bytes;

		if total_bytes == 0 {
			// a zero-byte access to an uncached file places nothing
			return Ok(());
		}

		let current_credit = match self.pq.value(file) {
			Some(value) => {
				let size = self.pq
					.payload(file)
					.map(|file_info| file_info.size)
					.unwrap_or(0);

				(value - self.rent_threshold) * size as f64
			},

			None => 0.0,
		};

		let credit = self.credit(
			info.bytes_requested(),
			info.bytes_added,
			total_bytes,
			current_credit,
		);

		let running_volume_credit = credit / total_bytes as f64 + self.rent_threshold;

		self.pq.add_or_change_value(file, running_volume_credit, FileInfo {
			size: total_bytes,
		});

		if let Some(file_info) = self.pq.payload_mut(file) {
			file_info.size = total_bytes;
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache::policy::{
		fifo::FifoState,
		lru::LruState,
		tests::{drive, uniform_trace},
	};

	#[test]
	fn it_parses_the_mode() {
		let configuration = Configuration::from_user_args("mode=add_fetch_size").unwrap();
		assert_eq!(configuration.mode, Mode::AddFetchSize);

		assert!(Configuration::from_user_args("mode=rent").is_err());
	}

	fn landlord(mode: Mode) -> Box<LandlordState> {
		Box::new(LandlordState::new(Configuration { mode }))
	}

	#[test]
	fn total_size_mode_with_uniform_sizes_matches_lru() {
		let trace = uniform_trace(&[
			"a", "b", "c", "a", "d", "b", "e", "a", "c", "b", "d", "e", "a", "d",
		]);

		let landlord = drive(landlord(Mode::TotalSize), 3, &trace);
		let lru = drive(Box::new(LruState::new()), 3, &trace);

		assert_eq!(landlord, lru);
	}

	#[test]
	fn no_cost_mode_with_uniform_sizes_matches_fifo() {
		// re-accesses only touch files from older epochs, where the
		// rent threshold already separates the priorities
		let trace = uniform_trace(&[
			"a", "b", "c", "d", "d", "b", "e", "c", "f", "g", "e",
		]);

		let landlord = drive(landlord(Mode::NoCost), 2, &trace);
		let fifo = drive(Box::new(FifoState::new()), 2, &trace);

		assert_eq!(landlord, fifo);
	}

	#[test]
	fn rent_threshold_never_decreases() {
		let trace = uniform_trace(&[
			"a", "b", "c", "d", "e", "a", "f", "g", "b", "h",
		]);

		let mut state = LandlordState::new(Configuration::default());
		let mut last_threshold = 0.0;

		for (ind, access) in trace.iter().enumerate() {
			let info = AccessInfo {
				access: access.clone(),
				file_hit: false,
				bytes_hit: 0,
				bytes_missed: 1,
				bytes_added: 1,
				bytes_removed: 0,
				total_bytes: 1,
				evicted_files: Vec::new(),
			};

			if ind >= 3 {
				let ctx = EvictionContext {
					file: &access.file,
					ts: access.access_ts,
					ind,
					requested_bytes: 1,
					contained_bytes: 0,
					missing_bytes: 1,
					in_cache_bytes: 0,
					free_bytes: 0,
					required_free_bytes: 1,
				};

				state.pop_eviction_candidates(&ctx).unwrap();

				assert!(state.rent_threshold >= last_threshold);
				last_threshold = state.rent_threshold;
			}

			state.process_access(&access.file, ind, true, &info).unwrap();
		}
	}
}
