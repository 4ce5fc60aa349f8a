/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use log::debug;
use rustc_hash::FxHashMap;

use crate::{
	SimError,
	cache::{
		classification::{ClassId, Classifier},
		processor::{AccessInfo, EvictionContext, PolicyState},
	},
	dstructures::{Binner, BinnedCounters, BinnedFloats, KeyedPq},
	params::UserArgs,
	workload::{BytesSize, FileId, TimeStamp},
};

/// How hits and evictions are weighted in the histograms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Weighting {
	/// Every hit or eviction counts once.
	#[default]
	Count,

	/// Hits count their hit bytes, evictions the evicted file's size,
	/// and the estimated value is scaled per byte.
	Bytes,
}

#[derive(Debug, Clone)]
pub struct Configuration {
	pub classifier: Classifier,
	pub age_bin_width: TimeStamp,
	pub ewma_factor: f64,
	pub eva_computation_interval: u64,
	pub weighting: Weighting,
}

impl Default for Configuration {
	fn default() -> Self {
		Configuration {
			classifier: Classifier::Constant(String::new()),
			age_bin_width: 3 * 24 * 60 * 60,
			ewma_factor: 0.0088,
			eva_computation_interval: 10_000,
			weighting: Weighting::Count,
		}
	}
}

impl Configuration {
	pub fn from_user_args(user_args: &str) -> Result<Self, SimError> {
		let args = user_args.parse::<UserArgs>()?;

		args.check_names(&[
			"classifier",
			"age_bin_width",
			"ewma_factor",
			"eva_computation_interval",
		])?;

		let mut configuration = Configuration::default();

		if let Some(classifier) = args.get("classifier") {
			configuration.classifier = classifier.parse()?;
		}

		if let Some(age_bin_width) = args.get_parsed::<TimeStamp>("age_bin_width")? {
			if age_bin_width == 0 {
				return Err(SimError::config("age_bin_width must be positive"));
			}

			configuration.age_bin_width = age_bin_width;
		}

		if let Some(ewma_factor) = args.get_parsed::<f64>("ewma_factor")? {
			if !(0.0..=1.0).contains(&ewma_factor) {
				return Err(SimError::config("ewma_factor must lie in [0, 1]"));
			}

			configuration.ewma_factor = ewma_factor;
		}

		if let Some(interval) = args.get_parsed::<u64>("eva_computation_interval")? {
			if interval == 0 {
				return Err(SimError::config("eva_computation_interval must be positive"));
			}

			configuration.eva_computation_interval = interval;
		}

		Ok(configuration)
	}
}

/// A file class as EVA sees it: whether the file has been re-accessed
/// while cached, combined with the user-supplied classifier's class.
type EvaClass = (bool, ClassId);

struct FileInfo {
	size: BytesSize,
	last_access_ts: TimeStamp,
	file_class: EvaClass,
}

impl FileInfo {
	fn reused(&self) -> bool {
		self.file_class.0
	}
}

struct ClassInfo {
	hit_counters: BinnedCounters,
	eviction_counters: BinnedCounters,
	durable_hit_counters: BinnedCounters,
	durable_eviction_counters: BinnedCounters,
	evas: BinnedFloats,
}

impl ClassInfo {
	fn new(age_binner: Binner) -> Self {
		ClassInfo {
			hit_counters: BinnedCounters::new(age_binner),
			eviction_counters: BinnedCounters::new(age_binner),
			durable_hit_counters: BinnedCounters::new(age_binner),
			durable_eviction_counters: BinnedCounters::new(age_binner),
			evas: BinnedFloats::new(age_binner),
		}
	}
}

/// Evicts the file with the lowest estimated value per access.
///
/// Hits and evictions are recorded per class and age bin. Periodically
/// the per-class histograms are folded into exponentially decayed
/// durable counters, the per-age EVAs are recomputed from reversed
/// cumulative sums and every cached file is re-prioritized.
pub struct EvaState {
	classifier: Classifier,
	age_bin_width: TimeStamp,
	ewma_factor: f64,
	eva_computation_interval: u64,
	weighting: Weighting,

	storage_size: BytesSize,

	pq: KeyedPq<FileInfo>,

	age_binner: Binner,
	class_infos: FxHashMap<EvaClass, ClassInfo>,

	accesses_since_eva_computation: u64,
	last_eva_computation_ts: TimeStamp,
	last_age_bin: usize,
}

impl EvaState {
	pub fn new(storage_size: BytesSize, configuration: Configuration) -> Self {
		let age_binner = Binner::linear(configuration.age_bin_width);

		EvaState {
			classifier: configuration.classifier,
			age_bin_width: configuration.age_bin_width,
			ewma_factor: configuration.ewma_factor,
			eva_computation_interval: configuration.eva_computation_interval,
			weighting: configuration.weighting,

			storage_size,

			pq: KeyedPq::new(false),

			age_binner,
			class_infos: FxHashMap::default(),

			accesses_since_eva_computation: 0,
			last_eva_computation_ts: 0,
			last_age_bin: 0,
		}
	}

	fn class_info(&mut self, class: &EvaClass) -> &mut ClassInfo {
		self.class_infos
			.entry(class.clone())
			.or_insert_with(|| ClassInfo::new(self.age_binner))
	}

	fn eva_of_file_at(&self, file_info: &FileInfo, ts: TimeStamp) -> f64 {
		let age = ts.saturating_sub(file_info.last_access_ts);

		let eva = self.class_infos
			.get(&file_info.file_class)
			.map(|class_info| class_info.evas.get(age))
			.unwrap_or(0.0);

		match self.weighting {
			Weighting::Count => eva,
			Weighting::Bytes => file_info.size as f64 * eva,
		}
	}

	/// Estimated number of items the cache holds, scaled to the full
	/// storage in case the tracked files do not fill it yet.
	fn count_of_items_in_cache(&self) -> f64 {
		match self.weighting {
			Weighting::Bytes => self.storage_size as f64,

			Weighting::Count => {
				let tracked_bytes: BytesSize = self.pq
					.iter()
					.map(|(_, _, info)| info.size)
					.sum();

				if tracked_bytes == 0 {
					return 0.0;
				}

				self.pq.len() as f64 / tracked_bytes as f64 * self.storage_size as f64
			},
		}
	}

	fn hit_weight(&self, info: &AccessInfo) -> u64 {
		match self.weighting {
			Weighting::Count => 1,
			Weighting::Bytes => info.bytes_hit,
		}
	}

	fn eviction_weight(&self, file_info: &FileInfo) -> u64 {
		match self.weighting {
			Weighting::Count => 1,
			Weighting::Bytes => file_info.size,
		}
	}

	/// Re-keys every cached file by its EVA at time `ts`.
	fn set_priorities(&mut self, ts: TimeStamp) {
		let old_pq = std::mem::replace(&mut self.pq, KeyedPq::new(false));

		for (file, _, file_info) in old_pq.into_entries() {
			let eva = self.eva_of_file_at(&file_info, ts);
			self.pq.add(file, eva, file_info);
		}

		self.last_age_bin = self.age_binner.bin(ts);
	}

	fn compute_evas(&mut self, ts: TimeStamp) {
		let mut total_hits: u64 = 0;
		let mut total_events: u64 = 0;
		let mut class_hit_rates = FxHashMap::<EvaClass, Vec<f64>>::default();

		for (class, class_info) in self.class_infos.iter_mut() {
			let ewma_factor = self.ewma_factor;

			class_info.durable_hit_counters.update(&class_info.hit_counters, ewma_factor);

			class_info.durable_eviction_counters
				.update(&class_info.eviction_counters, ewma_factor);

			class_info.hit_counters.reset();
			class_info.eviction_counters.reset();

			class_hit_rates.insert(
				class.clone(),
				cumulative_hit_rates(
					class_info.durable_hit_counters.bin_data(),
					class_info.durable_eviction_counters.bin_data(),
				),
			);

			total_hits += class_info.durable_hit_counters.total();

			total_events += class_info.durable_hit_counters.total()
				+ class_info.durable_eviction_counters.total();
		}

		let total_hit_rate = lenient_div(total_hits as f64, total_events as f64);

		let per_access_gain = lenient_div(total_hit_rate, self.count_of_items_in_cache());

		// if the last computation happened within the same second,
		// pretend it was one second ago
		let time_interval = ts.saturating_sub(self.last_eva_computation_ts).max(1);

		let per_bin_avg_accesses =
			self.age_bin_width as f64 * total_events as f64 / time_interval as f64;

		let per_bin_avg_gain = per_access_gain * per_bin_avg_accesses;

		debug!(
			"eva computation at {ts}: total_hit_rate {total_hit_rate:.4}, \
			per_bin_avg_gain {per_bin_avg_gain:.6}, {} classes",
			self.class_infos.len(),
		);

		for class_info in self.class_infos.values_mut() {
			let hits = class_info.durable_hit_counters.bin_data();
			let evictions = class_info.durable_eviction_counters.bin_data();
			let bins = hits.len().max(evictions.len());

			if bins == 0 {
				class_info.evas.set_bin_data(Vec::new());
				continue;
			}

			// the seed lifetime counts all events of the last bin as if
			// they ended there
			let mut cumulative_lifetimes =
				(bin_value(hits, bins - 1) + bin_value(evictions, bins - 1)) as f64;

			let mut cumulative_hits = 0u64;
			let mut cumulative_evictions = 0u64;
			let mut evas = vec![0.0; bins];

			for bin in (0..bins).rev() {
				if bin < bins - 1 {
					cumulative_lifetimes += cumulative_hits as f64
						+ cumulative_evictions as f64
						+ bin_value(hits, bin) as f64
						+ bin_value(evictions, bin) as f64;
				}

				cumulative_hits += bin_value(hits, bin);
				cumulative_evictions += bin_value(evictions, bin);

				evas[bin] = lenient_div(
					cumulative_hits as f64 - per_bin_avg_gain * cumulative_lifetimes,
					(cumulative_hits + cumulative_evictions) as f64,
				);
			}

			class_info.evas.set_bin_data(evas);
		}

		// bias every class by how much its hit rate differs from the
		// total, measured in the currency of the reused class's value
		let mut biases = FxHashMap::<EvaClass, f64>::default();

		for class in self.class_infos.keys() {
			let reused_class = (true, class.1.clone());

			let Some(reused_info) = self.class_infos.get(&reused_class) else {
				continue;
			};

			let Some(reused_rates) = class_hit_rates.get(&reused_class) else {
				continue;
			};

			let Some(&reused_rate) = reused_rates.first() else {
				continue;
			};

			if reused_rate == 1.0 {
				continue;
			}

			biases.insert(
				class.clone(),
				reused_info.evas.get_bin(0) / (1.0 - reused_rate),
			);
		}

		for (class, bias) in biases {
			let Some(class_info) = self.class_infos.get_mut(&class) else {
				continue;
			};

			let Some(hit_rates) = class_hit_rates.get(&class) else {
				continue;
			};

			for (bin, hit_rate) in hit_rates.iter().enumerate() {
				class_info.evas.add_to_bin(bin, (hit_rate - total_hit_rate) * bias);
			}
		}

		self.accesses_since_eva_computation = 0;
		self.last_eva_computation_ts = ts;
	}
}

impl PolicyState for EvaState {
	fn pop_eviction_candidates(
		&mut self,
		ctx: &EvictionContext,
	) -> Result<Vec<FileId>, SimError> {
		let (file, _, file_info) = self.pq
			.pop()
			.ok_or(SimError::NoEvictionCandidate)?;

		let age = ctx.ts.saturating_sub(file_info.last_access_ts);
		let weight = self.eviction_weight(&file_info);

		self.class_info(&file_info.file_class)
			.eviction_counters
			.increment(age, weight);

		Ok(vec![file])
	}

	fn contains(&self, file: &FileId) -> bool {
		self.pq.contains(file)
	}

	fn remove_file(&mut self, file: &FileId) -> Result<(), SimError> {
		// the file leaves without touching any counters, as if it never
		// entered the cache
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
		let size = info.total_bytes;
		let ts = info.access.access_ts;

		let user_class = self.classifier.classify(&info.access);
		let hit_weight = self.hit_weight(info);

		let tracked = self.pq.contains(file);

		let file_info = if tracked {
			let (age, old_class) = {
				let file_info = self.pq
					.payload(file)
					.ok_or(SimError::Internal)?;

				(
					ts.saturating_sub(file_info.last_access_ts),
					file_info.file_class.clone(),
				)
			};

			self.class_info(&old_class)
				.hit_counters
				.increment(age, hit_weight);

			FileInfo {
				size,
				last_access_ts: ts,
				file_class: (true, user_class),
			}
		} else {
			FileInfo {
				size,
				last_access_ts: ts,
				file_class: (false, user_class),
			}
		};

		let eva = self.eva_of_file_at(&file_info, ts);

		if tracked {
			let payload = self.pq
				.payload_mut(file)
				.ok_or(SimError::Internal)?;

			*payload = file_info;
			self.pq.change_value(file, eva);
		} else {
			self.pq.add(file.clone(), eva, file_info);
		}

		self.accesses_since_eva_computation += 1;

		if self.accesses_since_eva_computation >= self.eva_computation_interval {
			self.compute_evas(ts);
			self.set_priorities(ts);
		} else if self.age_binner.bin(ts) != self.last_age_bin {
			self.set_priorities(ts);
		}

		Ok(())
	}
}

fn bin_value(bins: &[u64], bin: usize) -> u64 {
	bins.get(bin).copied().unwrap_or(0)
}

/// For each age bin, the hit rate over all events at that age or later.
fn cumulative_hit_rates(hits: &[u64], evictions: &[u64]) -> Vec<f64> {
	let bins = hits.len().max(evictions.len());

	let mut cumulative_hits = 0u64;
	let mut cumulative_events = 0u64;
	let mut rates = vec![0.0; bins];

	for bin in (0..bins).rev() {
		cumulative_hits += bin_value(hits, bin);
		cumulative_events += bin_value(hits, bin) + bin_value(evictions, bin);

		rates[bin] = lenient_div(cumulative_hits as f64, cumulative_events as f64);
	}

	rates
}

fn lenient_div(dividend: f64, divisor: f64) -> f64 {
	if divisor == 0.0 {
		return 0.0;
	}

	dividend / divisor
}
