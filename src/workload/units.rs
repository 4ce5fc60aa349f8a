/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use crate::{
	SimError,
	workload::{BytesSize, TimeStamp},
};

pub const KIB: BytesSize = 1 << 10;
pub const MIB: BytesSize = 1 << 20;
pub const GIB: BytesSize = 1 << 30;
pub const TIB: BytesSize = 1 << 40;
pub const PIB: BytesSize = 1 << 50;
pub const EIB: BytesSize = 1 << 60;

pub const MINUTE: TimeStamp = 60;
pub const HOUR: TimeStamp = 60 * 60;
pub const DAY: TimeStamp = 24 * 60 * 60;
pub const WEEK: TimeStamp = 7 * 24 * 60 * 60;

/// Parses a byte size of the form `<digits>[.<digits>] (KMGTPEZY)?iB`,
/// e.g. `10 GiB` or `1.5MiB`. A bare integer is taken as bytes.
pub fn parse_bytes_size(value: &str) -> Result<BytesSize, SimError> {
	let value = value.trim();

	let unit_start = value
		.find(|c: char| !c.is_ascii_digit() && c != '.')
		.unwrap_or(value.len());

	let (number, unit) = value.split_at(unit_start);

	let number = number
		.parse::<f64>()
		.map_err(|_| SimError::config(format!("invalid byte size {value:?}")))?;

	let multiplier = match unit.trim() {
		"" | "iB" => 1.0,
		"KiB" => KIB as f64,
		"MiB" => MIB as f64,
		"GiB" => GIB as f64,
		"TiB" => TIB as f64,
		"PiB" => PIB as f64,
		"EiB" => EIB as f64,
		"ZiB" => (EIB as f64) * 1024.0,
		"YiB" => (EIB as f64) * 1024.0 * 1024.0,
		_ => return Err(SimError::config(format!("unknown byte size unit {unit:?}"))),
	};

	let bytes = number * multiplier;

	if !bytes.is_finite() || bytes < 0.0 || bytes > BytesSize::MAX as f64 {
		return Err(SimError::config(format!("byte size {value:?} out of range")));
	}

	Ok(bytes.round() as BytesSize)
}

/// Parses a byte rate of the form `<byte size>/s`, e.g. `1 MiB/s`.
pub fn parse_bytes_rate(value: &str) -> Result<BytesSize, SimError> {
	let value = value.trim();

	let size = value
		.strip_suffix("/s")
		.unwrap_or(value);

	parse_bytes_size(size)
}
