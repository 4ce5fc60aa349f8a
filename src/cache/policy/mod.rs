/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

pub mod fifo;
pub mod lru;
pub mod rand;
pub mod mcf;
pub mod size;
pub mod greedydual;
pub mod landlord;
pub mod arc;
pub mod min;
pub mod mind;
pub mod mincod;
pub mod obma;
pub mod eva;

use std::{
	rc::Rc,
	str::FromStr,
};

use crate::{
	SimError,
	cache::{
		processor::{PolicyState, StateProcessor},
		storage::StorageRef,
	},
	dstructures::ReuseTimer,
	workload::Access,
};

/// All replacement policies known to the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
	Fifo,
	Lru,
	Rand,
	Mcf,
	Size,
	GreedyDual,
	Landlord,
	ArcBit,
	Min,
	MinD,
	MinCod,
	Obma,
	Eva,
	EvaBit,
}

impl PolicyKind {
	/// Offline policies need the full access sequence before processing
	/// the first access.
	#[must_use]
	pub fn is_offline(&self) -> bool {
		matches!(
			self,
			PolicyKind::Min | PolicyKind::MinD | PolicyKind::MinCod | PolicyKind::Obma,
		)
	}
}

impl FromStr for PolicyKind {
	type Err = SimError;

	fn from_str(value: &str) -> Result<Self, SimError> {
		match value {
			"fifo" => Ok(PolicyKind::Fifo),
			"lru" => Ok(PolicyKind::Lru),
			"rand" => Ok(PolicyKind::Rand),
			"mcf" => Ok(PolicyKind::Mcf),
			"size" => Ok(PolicyKind::Size),
			"greedydual" => Ok(PolicyKind::GreedyDual),
			"landlord" => Ok(PolicyKind::Landlord),
			"arcbit" => Ok(PolicyKind::ArcBit),
			"min" => Ok(PolicyKind::Min),
			"mind" => Ok(PolicyKind::MinD),
			"mincod" => Ok(PolicyKind::MinCod),
			"obma" => Ok(PolicyKind::Obma),
			"eva" => Ok(PolicyKind::Eva),
			"evabit" => Ok(PolicyKind::EvaBit),
			_ => Err(SimError::config(format!("unknown policy {value:?}"))),
		}
	}
}

enum Configuration {
	None,
	GreedyDual(greedydual::Configuration),
	Landlord(landlord::Configuration),
	ArcBit(arc::Configuration),
	MinD(mind::Configuration),
	MinCod(mincod::Configuration),
	Obma(obma::Configuration),
	Eva(eva::Configuration),
	Seed(Option<u64>),
}

/// A policy kind together with its parsed configuration, ready to build
/// processor states.
pub struct PolicySpec {
	kind: PolicyKind,
	configuration: Configuration,
}

impl PolicySpec {
	/// Parses the policy's configuration from its key=value user args.
	/// Policies without parameters reject any args.
	pub fn from_user_args(kind: PolicyKind, user_args: &str) -> Result<Self, SimError> {
		let configuration = match kind {
			PolicyKind::GreedyDual => {
				Configuration::GreedyDual(greedydual::Configuration::from_user_args(user_args)?)
			},

			PolicyKind::Landlord => {
				Configuration::Landlord(landlord::Configuration::from_user_args(user_args)?)
			},

			PolicyKind::ArcBit => {
				Configuration::ArcBit(arc::Configuration::from_user_args(user_args)?)
			},

			PolicyKind::MinD => {
				Configuration::MinD(mind::Configuration::from_user_args(user_args)?)
			},

			PolicyKind::MinCod => {
				Configuration::MinCod(mincod::Configuration::from_user_args(user_args)?)
			},

			PolicyKind::Obma => {
				Configuration::Obma(obma::Configuration::from_user_args(user_args)?)
			},

			PolicyKind::Eva | PolicyKind::EvaBit => {
				let mut configuration = eva::Configuration::from_user_args(user_args)?;

				if kind == PolicyKind::EvaBit {
					configuration.weighting = eva::Weighting::Bytes;
				}

				Configuration::Eva(configuration)
			},

			PolicyKind::Rand => {
				let args = user_args.parse::<crate::params::UserArgs>()?;
				args.check_names(&["seed"])?;

				Configuration::Seed(args.get_parsed::<u64>("seed")?)
			},

			_ => {
				if !user_args.trim().is_empty() {
					return Err(SimError::config(format!(
						"policy {kind:?} takes no arguments",
					)));
				}

				Configuration::None
			},
		};

		Ok(PolicySpec {
			kind,
			configuration,
		})
	}

	#[must_use]
	pub fn kind(&self) -> PolicyKind {
		self.kind
	}

	/// Builds a processor for an online policy over the given storage.
	pub fn online_processor(&self, storage: StorageRef) -> Result<StateProcessor, SimError> {
		let total_bytes = storage.borrow().total_bytes();

		let state: Box<dyn PolicyState> = match (&self.kind, &self.configuration) {
			(PolicyKind::Fifo, _) => Box::new(fifo::FifoState::new()),
			(PolicyKind::Lru, _) => Box::new(lru::LruState::new()),
			(PolicyKind::Mcf, _) => Box::new(mcf::McfState::new()),
			(PolicyKind::Size, _) => Box::new(size::SizeState::new()),

			(PolicyKind::Rand, Configuration::Seed(seed)) => {
				Box::new(rand::RandState::new(*seed))
			},

			(PolicyKind::GreedyDual, Configuration::GreedyDual(configuration)) => {
				Box::new(greedydual::GreedyDualState::new(*configuration))
			},

			(PolicyKind::Landlord, Configuration::Landlord(configuration)) => {
				Box::new(landlord::LandlordState::new(*configuration))
			},

			(PolicyKind::ArcBit, Configuration::ArcBit(configuration)) => {
				Box::new(arc::ArcBitState::new(total_bytes, *configuration))
			},

			(PolicyKind::Eva | PolicyKind::EvaBit, Configuration::Eva(configuration)) => {
				Box::new(eva::EvaState::new(total_bytes, configuration.clone()))
			},

			_ => {
				return Err(SimError::config(format!(
					"policy {:?} cannot run online",
					self.kind,
				)));
			},
		};

		Ok(StateProcessor::new(storage, state))
	}

	/// Builds a processor for an offline policy from its scoped access
	/// sequence.
	pub fn offline_processor(
		&self,
		storage: StorageRef,
		accesses: &[Access],
	) -> Result<StateProcessor, SimError> {
		let reuse_timer = Rc::new(ReuseTimer::new(accesses));

		let state: Box<dyn PolicyState> = match (&self.kind, &self.configuration) {
			(PolicyKind::Min, _) => Box::new(min::MinState::new(reuse_timer)),

			(PolicyKind::MinD, Configuration::MinD(configuration)) => {
				Box::new(mind::MindState::new(reuse_timer, *configuration))
			},

			(PolicyKind::MinCod, Configuration::MinCod(configuration)) => {
				Box::new(mincod::MincodState::new(reuse_timer, *configuration))
			},

			(PolicyKind::Obma, Configuration::Obma(configuration)) => {
				Box::new(obma::ObmaState::new(reuse_timer, *configuration))
			},

			_ => {
				return Err(SimError::config(format!(
					"policy {:?} cannot run offline",
					self.kind,
				)));
			},
		};

		Ok(StateProcessor::new(storage, state))
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use std::rc::Rc;

	use crate::{
		cache::{
			Storage,
			processor::{AccessInfo, PolicyState, StateProcessor},
		},
		dstructures::ReuseTimer,
		workload::{Access, BytesSize, TimeStamp},
	};

	use super::PolicyKind;

	pub fn uniform_trace(files: &[&str]) -> Vec<Access> {
		files
			.iter()
			.enumerate()
			.map(|(ind, file)| Access {
				access_ts: ind as TimeStamp + 1,
				file: file.to_string(),
				parts: vec![(0, 1)],
			})
			.collect()
	}

	pub fn sized_trace(files: &[(&str, BytesSize)]) -> Vec<Access> {
		files
			.iter()
			.enumerate()
			.map(|(ind, (file, size))| Access {
				access_ts: ind as TimeStamp + 1,
				file: file.to_string(),
				parts: vec![(0, *size)],
			})
			.collect()
	}

	pub fn cyclic_trace(files: &[&str], rounds: usize) -> Vec<Access> {
		let repeated: Vec<&str> = files
			.iter()
			.cycle()
			.take(files.len() * rounds)
			.copied()
			.collect();

		uniform_trace(&repeated)
	}

	pub fn drive(
		state: Box<dyn PolicyState>,
		capacity: BytesSize,
		trace: &[Access],
	) -> Vec<AccessInfo> {
		let mut processor = StateProcessor::new(Storage::new_shared(capacity), state);

		trace
			.iter()
			.map(|access| {
				processor
					.process(access.clone())
					.expect("processing the access failed")
			})
			.collect()
	}

	pub fn drive_offline(
		make_state: impl FnOnce(Rc<ReuseTimer>) -> Box<dyn PolicyState>,
		capacity: BytesSize,
		trace: &[Access],
	) -> Vec<AccessInfo> {
		let reuse_timer = Rc::new(ReuseTimer::new(trace));
		drive(make_state(reuse_timer), capacity, trace)
	}

	pub fn files_hit(infos: &[AccessInfo]) -> usize {
		infos.iter().filter(|info| info.file_hit).count()
	}

	#[test]
	fn policy_names_resolve() {
		for (name, offline) in [
			("fifo", false),
			("lru", false),
			("rand", false),
			("mcf", false),
			("size", false),
			("greedydual", false),
			("landlord", false),
			("arcbit", false),
			("min", true),
			("mind", true),
			("mincod", true),
			("obma", true),
			("eva", false),
			("evabit", false),
		] {
			let kind: PolicyKind = name.parse().expect("known policy name");
			assert_eq!(kind.is_offline(), offline, "{name}");
		}

		assert!("clock".parse::<PolicyKind>().is_err());
	}

	#[test]
	fn parameterless_policies_reject_arguments() {
		use super::PolicySpec;

		assert!(PolicySpec::from_user_args(PolicyKind::Lru, "").is_ok());
		assert!(PolicySpec::from_user_args(PolicyKind::Lru, "mode=x").is_err());

		assert!(PolicySpec::from_user_args(PolicyKind::Landlord, "mode=no_cost").is_ok());
		assert!(PolicySpec::from_user_args(PolicyKind::Rand, "seed=42").is_ok());
	}

	#[test]
	fn online_and_offline_construction_are_exclusive() {
		use super::PolicySpec;

		let lru = PolicySpec::from_user_args(PolicyKind::Lru, "").unwrap();
		let min = PolicySpec::from_user_args(PolicyKind::Min, "").unwrap();

		assert!(lru.online_processor(Storage::new_shared(10)).is_ok());
		assert!(lru.offline_processor(Storage::new_shared(10), &[]).is_err());

		assert!(min.offline_processor(Storage::new_shared(10), &[]).is_ok());
		assert!(min.online_processor(Storage::new_shared(10)).is_err());
	}
}
