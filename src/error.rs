/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
	#[error("invalid configuration: {0}")]
	Config(String),

	#[error("the storage does not have enough free space to place the requested parts")]
	InsufficientFreeSpace,

	#[error("the policy produced no eviction candidate though more space is required")]
	NoEvictionCandidate,

	#[error("the file is not tracked by the policy state")]
	NotInCache,

	#[error("malformed record: {0}")]
	Record(String),

	#[error("internal error")]
	Internal,

	#[error(transparent)]
	Io(#[from] io::Error),
}

impl SimError {
	pub fn config(message: impl Into<String>) -> Self {
		SimError::Config(message.into())
	}
}

impl PartialEq for SimError {
	fn eq(&self, other: &Self) -> bool {
		use SimError::*;

		match (self, other) {
			(Config(a), Config(b)) => a == b,
			(InsufficientFreeSpace, InsufficientFreeSpace) => true,
			(NoEvictionCandidate, NoEvictionCandidate) => true,
			(NotInCache, NotInCache) => true,
			(Record(a), Record(b)) => a == b,
			(Internal, Internal) => true,
			(Io(a), Io(b)) => a.kind() == b.kind(),

			_ => false,
		}
	}
}
