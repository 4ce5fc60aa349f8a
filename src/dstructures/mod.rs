/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

mod lru;
mod pq;
mod binning;
mod histogram;
mod accessseq;

pub use crate::dstructures::{
	lru::{LruMap, SizedLruMap},
	pq::KeyedPq,
	binning::{Binner, BinnedMapping},
	histogram::{BinnedCounters, BinnedFloats},
	accessseq::{ReuseTimer, FullReuseIndex},
};
