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
	dstructures::{KeyedPq, ReuseTimer},
	params::UserArgs,
	workload::{BytesSize, FileId},
};

#[derive(Debug, Clone, Copy)]
pub struct Configuration {
	/// Fraction of the cached files considered per eviction.
	pub d_factor: f64,
	pub min_d: Option<usize>,
	pub max_d: Option<usize>,
}

impl Default for Configuration {
	fn default() -> Self {
		Configuration {
			d_factor: 0.05,
			min_d: Some(8),
			max_d: None,
		}
	}
}

impl Configuration {
	pub fn from_user_args(user_args: &str) -> Result<Self, SimError> {
		let args = user_args.parse::<UserArgs>()?;
		args.check_names(&["d_factor", "min_d", "max_d"])?;

		let mut configuration = Configuration::default();

		if let Some(d_factor) = args.get_parsed::<f64>("d_factor")? {
			if !(0.0..=1.0).contains(&d_factor) {
				return Err(SimError::config("d_factor must lie in [0, 1]"));
			}

			configuration.d_factor = d_factor;
		}

		if let Some(min_d) = args.get_parsed::<usize>("min_d")? {
			configuration.min_d = Some(min_d);
		}

		if let Some(max_d) = args.get_parsed::<usize>("max_d")? {
			configuration.max_d = Some(max_d);
		}

		Ok(configuration)
	}
}

struct FileInfo {
	size: BytesSize,
}

/// MIN-d, a cost-aware variant of offline MIN.
///
/// Among the `d` cached files with the farthest reuse, evicts the one
/// with the smallest size, where
/// `d = clamp(d_factor * cached_files, min_d, max_d)`.
pub struct MindState {
	reuse_timer: Rc<ReuseTimer>,
	d_factor: f64,
	min_d: Option<usize>,
	max_d: Option<usize>,
	pq: KeyedPq<FileInfo>,
}

impl MindState {
	pub fn new(reuse_timer: Rc<ReuseTimer>, configuration: Configuration) -> Self {
		MindState {
			reuse_timer,
			d_factor: configuration.d_factor,
			min_d: configuration.min_d,
			max_d: configuration.max_d,
			pq: KeyedPq::new(true),
		}
	}

	fn d(&self) -> usize {
		let mut d = (self.d_factor * self.pq.len() as f64).ceil() as usize;

		if let Some(min_d) = self.min_d {
			d = d.max(min_d);
		}

		if let Some(max_d) = self.max_d {
			d = d.min(max_d);
		}

		d
	}
}

impl PolicyState for MindState {
	fn pop_eviction_candidates(
		&mut self,
		_ctx: &EvictionContext,
	) -> Result<Vec<FileId>, SimError> {
		let d = self.d();

		let candidate = self.pq
			.ordered_iter()
			.take(d)
			.fold(None::<(&FileId, BytesSize)>, |smallest, (file, _, info)| {
				match smallest {
					Some((_, size)) if size <= info.size => smallest,
					_ => Some((file, info.size)),
				}
			})
			.map(|(file, _)| file.clone())
			.ok_or(SimError::NoEvictionCandidate)?;

		self.pq.remove(&candidate);

		Ok(vec![candidate])
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
		ind: usize,
		_ensure: bool,
		info: &AccessInfo,
	) -> Result<(), SimError> {
		let reuse_ind = self.reuse_timer.reuse_ind_inf(ind);

		if let Some(file_info) = self.pq.payload_mut(file) {
			file_info.size = info.total_bytes;
			self.pq.change_value(file, reuse_ind);
		} else {
			self.pq.add(file.clone(), reuse_ind, FileInfo {
				size: info.total_bytes,
			});
		}

		Ok(())
	}
}
