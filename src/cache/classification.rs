/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::str::FromStr;

use crate::{
	SimError,
	workload::Access,
};

pub type ClassId = String;

/// Derives a file class from an access, based on the directory-style
/// structure of file ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classifier {
	/// Every access falls into one constant class.
	Constant(String),

	/// The directory containing the file, `levels` above it.
	DirectoryName { levels: usize },

	/// The directory `levels` below the root, i.e. the data set for ids
	/// like `dataset/file_000001`.
	RootDirectoryName { levels: usize },

	/// The classes of all inner classifiers, combined.
	Combine(Vec<Classifier>),
}

impl Classifier {
	pub fn classify(&self, access: &Access) -> ClassId {
		match self {
			Classifier::Constant(class) => class.clone(),

			Classifier::DirectoryName { levels } => {
				let components = path_components(&access.file);
				let keep = components.len().saturating_sub(levels + 1);

				components[..keep].join("/")
			},

			Classifier::RootDirectoryName { levels } => {
				let components = path_components(&access.file);
				let keep = (levels + 1).min(components.len().saturating_sub(1));

				components[..keep].join("/")
			},

			Classifier::Combine(classifiers) => {
				let classes: Vec<ClassId> = classifiers
					.iter()
					.map(|classifier| classifier.classify(access))
					.collect();

				classes.join("&")
			},
		}
	}
}

fn path_components(file: &str) -> Vec<&str> {
	file.split('/')
		.filter(|component| !component.is_empty())
		.collect()
}

impl FromStr for Classifier {
	type Err = SimError;

	fn from_str(value: &str) -> Result<Self, SimError> {
		if value.contains('&') {
			let classifiers = value
				.split('&')
				.map(|name| name.parse())
				.collect::<Result<Vec<Classifier>, SimError>>()?;

			return Ok(Classifier::Combine(classifiers));
		}

		match value {
			"constant" => Ok(Classifier::Constant(String::new())),
			"dataset" => Ok(Classifier::RootDirectoryName { levels: 0 }),
			"dirname" => Ok(Classifier::DirectoryName { levels: 0 }),
			_ => Err(SimError::config(format!("unknown classifier {value:?}"))),
		}
	}
}
