/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use num_traits::AsPrimitive;

use crate::dstructures::Binner;

/// Per-bin event counters over a binned axis (e.g. ages). Bins grow on
/// demand for unbounded binners; reads past the grown range return zero.
#[derive(Debug, Clone)]
pub struct BinnedCounters {
	binner: Binner,
	bins: Vec<u64>,
	total: u64,
}

impl BinnedCounters {
	pub fn new(binner: Binner) -> Self {
		let bins = match binner.bins() {
			Some(bins) => vec![0; bins],
			None => Vec::new(),
		};

		BinnedCounters {
			binner,
			bins,
			total: 0,
		}
	}

	#[must_use]
	pub fn binner(&self) -> &Binner {
		&self.binner
	}

	#[must_use]
	pub fn total(&self) -> u64 {
		self.total
	}

	#[must_use]
	pub fn bin_data(&self) -> &[u64] {
		&self.bins
	}

	pub fn get(&self, num: u64) -> u64 {
		self.bins
			.get(self.binner.bin(num))
			.copied()
			.unwrap_or(0)
	}

	pub fn increment(&mut self, num: u64, incr: impl AsPrimitive<u64>) {
		let bin = self.binner.bin(num);

		if bin >= self.bins.len() {
			self.bins.resize(bin + 1, 0);
		}

		self.bins[bin] += incr.as_();
		self.total += incr.as_();
	}

	/// Folds `counters` into this histogram bin by bin using an
	/// exponentially weighted moving average:
	/// `bin := ewma_factor * other + (1 - ewma_factor) * bin`.
	pub fn update(&mut self, counters: &BinnedCounters, ewma_factor: f64) {
		if self.bins.len() < counters.bins.len() {
			self.bins.resize(counters.bins.len(), 0);
		}

		let mut total = 0;

		for (bin, value) in self.bins.iter_mut().enumerate() {
			let incoming = counters.bins.get(bin).copied().unwrap_or(0);

			*value = (ewma_factor * incoming as f64 + (1.0 - ewma_factor) * *value as f64) as u64;
			total += *value;
		}

		self.total = total;
	}

	pub fn reset(&mut self) {
		self.bins.iter_mut().for_each(|bin| *bin = 0);
		self.total = 0;
	}
}

/// Per-bin float values over a binned axis, used as a read-mostly view of
/// derived statistics (e.g. per-age EVAs).
#[derive(Debug, Clone)]
pub struct BinnedFloats {
	binner: Binner,
	bins: Vec<f64>,
}

impl BinnedFloats {
	pub fn new(binner: Binner) -> Self {
		BinnedFloats {
			binner,
			bins: Vec::new(),
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.bins.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.bins.is_empty()
	}

	#[must_use]
	pub fn bin_data(&self) -> &[f64] {
		&self.bins
	}

	pub fn get(&self, num: u64) -> f64 {
		self.bins
			.get(self.binner.bin(num))
			.copied()
			.unwrap_or(0.0)
	}

	pub fn get_bin(&self, bin: usize) -> f64 {
		self.bins
			.get(bin)
			.copied()
			.unwrap_or(0.0)
	}

	pub fn add_to_bin(&mut self, bin: usize, delta: f64) {
		if bin >= self.bins.len() {
			self.bins.resize(bin + 1, 0.0);
		}

		self.bins[bin] += delta;
	}

	pub fn set_bin_data(&mut self, bins: Vec<f64>) {
		self.bins = bins;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn it_counts_into_growing_bins() {
		let mut counters = BinnedCounters::new(Binner::linear(10));

		counters.increment(3, 1u64);
		counters.increment(7, 2u64);
		counters.increment(25, 1u64);

		assert_eq!(counters.bin_data(), &[3, 0, 1]);
		assert_eq!(counters.total(), 4);
		assert_eq!(counters.get(5), 3);
		assert_eq!(counters.get(1000), 0);
	}

	#[test]
	fn it_combines_counters_with_ewma() {
		let mut durable = BinnedCounters::new(Binner::linear(1));
		let mut recent = BinnedCounters::new(Binner::linear(1));

		durable.increment(0, 1000u64);
		recent.increment(0, 500u64);
		recent.increment(1, 200u64);

		durable.update(&recent, 0.5);

		assert_eq!(durable.bin_data(), &[750, 100]);
		assert_eq!(durable.total(), 850);
	}

	#[test]
	fn it_resets_counters() {
		let mut counters = BinnedCounters::new(Binner::linear(1));

		counters.increment(0, 7u64);
		counters.reset();

		assert_eq!(counters.total(), 0);
		assert_eq!(counters.get(0), 0);
	}

	#[test]
	fn float_bins_default_to_zero() {
		let mut floats = BinnedFloats::new(Binner::linear(10));

		floats.set_bin_data(vec![0.5, -0.25]);

		assert_eq!(floats.get(5), 0.5);
		assert_eq!(floats.get(15), -0.25);
		assert_eq!(floats.get(500), 0.0);

		floats.add_to_bin(3, 1.5);
		assert_eq!(floats.get_bin(3), 1.5);
		assert_eq!(floats.get_bin(2), 0.0);
	}
}
