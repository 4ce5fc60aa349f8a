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
	workload::FileId,
};

/// Cost assigned to a file on access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
	/// The total cached size of the file.
	#[default]
	TotalSize,

	/// The size of the accessed fraction of the file.
	AccessSize,
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
			_ => Err(SimError::config(format!("unknown greedydual mode {value:?}"))),
		}
	}
}

/// Evicts the file with the lowest credit.
///
/// Credit is set from the file's cost on every access and a running
/// threshold is added, so the effective credit of a surviving file is its
/// priority minus the threshold at the last eviction. Popping an entry
/// raises the threshold to the popped priority, which implicitly deducts
/// the popped credit from every remaining file. With uniform costs this
/// degenerates to LRU.
pub struct GreedyDualState {
	mode: Mode,
	pq: KeyedPq<()>,
	threshold: f64,
}

impl GreedyDualState {
	pub fn new(configuration: Configuration) -> Self {
		GreedyDualState {
			mode: configuration.mode,
			pq: KeyedPq::new(false),
			threshold: 0.0,
		}
	}
}

impl PolicyState for GreedyDualState {
	fn pop_eviction_candidates(
		&mut self,
		_ctx: &EvictionContext,
	) -> Result<Vec<FileId>, SimError> {
		let (file, running_credit, _) = self.pq
			.pop()
			.ok_or(SimError::NoEvictionCandidate)?;

		self.threshold = running_credit;

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
		let current_credit = match self.pq.value(file) {
			Some(value) => value - self.threshold,
			None => 0.0,
		};

		let cost = match self.mode {
			Mode::TotalSize => info.total_bytes as f64,
			Mode::AccessSize => info.bytes_requested() as f64,
		};

		let credit = current_credit.max(cost);
		self.pq.add_or_change_value(file, self.threshold + credit, ());

		Ok(())
	}
}
