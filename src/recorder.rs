/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::{
	fs::File,
	io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write},
	path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};

use crate::{
	SimError,
	cache::AccessInfo,
	distributor::AccessAssignment,
	workload::{Access, TimeStamp},
};

const REVERSE_CHUNK_SIZE: u64 = 64 * 1024;

/// Appends one assignment record as a self-delimited JSON line.
pub fn write_assignment<W: Write>(
	writer: &mut W,
	assignment: &AccessAssignment,
) -> Result<(), SimError> {
	write_record(writer, assignment)
}

/// Appends one access-info record as a self-delimited JSON line.
pub fn write_access_info<W: Write>(
	writer: &mut W,
	info: &AccessInfo,
) -> Result<(), SimError> {
	write_record(writer, info)
}

pub fn record<W: Write>(
	writer: &mut W,
	assignments: impl IntoIterator<Item = AccessAssignment>,
) -> Result<(), SimError> {
	for assignment in assignments {
		write_assignment(writer, &assignment)?;
	}

	Ok(())
}

pub fn record_path(
	path: impl AsRef<Path>,
	assignments: impl IntoIterator<Item = AccessAssignment>,
) -> Result<(), SimError> {
	let mut writer = io::BufWriter::new(File::create(path)?);
	record(&mut writer, assignments)?;
	writer.flush()?;

	Ok(())
}

/// Iterates assignment records from a buffered reader in file order.
pub fn replay<R: BufRead>(
	reader: R,
) -> impl Iterator<Item = Result<AccessAssignment, SimError>> {
	replay_records(reader)
}

pub fn replay_path(
	path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<AccessAssignment, SimError>>, SimError> {
	let reader = BufReader::new(File::open(path)?);
	Ok(replay(reader))
}

pub fn replay_access_info_path(
	path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<AccessInfo, SimError>>, SimError> {
	let reader = BufReader::new(File::open(path)?);
	Ok(replay_records::<AccessInfo, _>(reader))
}

fn write_record<W: Write, T: Serialize>(writer: &mut W, record: &T) -> Result<(), SimError> {
	serde_json::to_writer(&mut *writer, record)
		.map_err(|err| SimError::Record(err.to_string()))?;

	writer.write_all(b"\n")?;

	Ok(())
}

fn parse_record<T: DeserializeOwned>(line: &str) -> Result<T, SimError> {
	serde_json::from_str(line).map_err(|err| SimError::Record(err.to_string()))
}

fn replay_records<T: DeserializeOwned, R: BufRead>(
	mut reader: R,
) -> impl Iterator<Item = Result<T, SimError>> {
	let mut line = String::new();
	let mut failed = false;

	std::iter::from_fn(move || {
		if failed {
			return None;
		}

		loop {
			line.clear();

			match reader.read_line(&mut line) {
				Ok(0) => return None,
				Ok(_) => {},

				Err(err) => {
					failed = true;
					return Some(Err(SimError::Io(err)));
				},
			}

			if line.trim().is_empty() {
				continue;
			}

			let record = parse_record(line.trim_end());

			if record.is_err() {
				failed = true;
			}

			return Some(record);
		}
	})
}

/// Decides, record by record, whether an assignment belongs to the
/// window of interest. The window must be one contiguous range of the
/// sequence.
pub trait Predicate {
	fn check(&mut self, assignment: &AccessAssignment) -> bool;
}

/// Window from the start of the sequence up to a time or access-count
/// bound. As soon as any bound is surpassed, the window ends.
pub struct StopEarlyWindow {
	time: Option<TimeStamp>,
	accesses: Option<usize>,
	seen: usize,
}

impl StopEarlyWindow {
	pub fn new(time: Option<TimeStamp>, accesses: Option<usize>) -> Self {
		StopEarlyWindow {
			time,
			accesses,
			seen: 0,
		}
	}
}

impl Predicate for StopEarlyWindow {
	fn check(&mut self, assignment: &AccessAssignment) -> bool {
		if let Some(time) = self.time {
			if assignment.access.access_ts > time {
				return false;
			}
		}

		if let Some(accesses) = self.accesses {
			self.seen += 1;

			if self.seen > accesses {
				return false;
			}
		}

		true
	}
}

/// A re-iterable, reversible view onto the assignment records of a file.
///
/// A predicate restricts the view to one contiguous range of records; the
/// range is resolved to byte offsets once, so every subsequent iteration
/// seeks straight to it.
pub struct Reader {
	path: PathBuf,
	begin_pos: u64,
	end_pos: Option<u64>,
	len: Option<usize>,
}

impl Reader {
	pub fn open(path: impl Into<PathBuf>) -> Self {
		Reader {
			path: path.into(),
			begin_pos: 0,
			end_pos: None,
			len: None,
		}
	}

	/// Opens a view restricted to the contiguous range of records for
	/// which the predicate holds.
	pub fn with_predicate(
		path: impl Into<PathBuf>,
		predicate: &mut dyn Predicate,
	) -> Result<Self, SimError> {
		let path = path.into();

		let mut reader = BufReader::new(File::open(&path)?);
		let mut line = String::new();

		let mut pos: u64 = 0;
		let mut begin_pos: u64 = 0;
		let mut end_pos: u64 = 0;
		let mut length: usize = 0;
		let mut in_range = false;

		loop {
			let line_start = pos;
			line.clear();

			if reader.read_line(&mut line)? == 0 {
				break;
			}

			pos += line.len() as u64;

			if line.trim().is_empty() {
				continue;
			}

			let assignment: AccessAssignment = parse_record(line.trim_end())?;

			if predicate.check(&assignment) {
				if !in_range {
					in_range = true;
					begin_pos = line_start;
				}

				end_pos = pos;
				length += 1;
			} else if in_range {
				break;
			}
		}

		if !in_range {
			begin_pos = 0;
			end_pos = 0;
		}

		Ok(Reader {
			path,
			begin_pos,
			end_pos: Some(end_pos),
			len: Some(length),
		})
	}

	/// Number of records in the view. Counted on first use by iterating
	/// the file once.
	pub fn len(&mut self) -> Result<usize, SimError> {
		if let Some(len) = self.len {
			return Ok(len);
		}

		let mut length = 0;

		for assignment in self.iter()? {
			assignment?;
			length += 1;
		}

		self.len = Some(length);

		Ok(length)
	}

	pub fn iter(
		&self,
	) -> Result<impl Iterator<Item = Result<AccessAssignment, SimError>>, SimError> {
		let mut file = File::open(&self.path)?;
		file.seek(SeekFrom::Start(self.begin_pos))?;

		let end_pos = self.end_pos;
		let mut pos = self.begin_pos;
		let mut reader = BufReader::new(file);
		let mut line = String::new();
		let mut failed = false;

		Ok(std::iter::from_fn(move || {
			if failed {
				return None;
			}

			loop {
				if end_pos.is_some_and(|end| pos >= end) {
					return None;
				}

				line.clear();

				match reader.read_line(&mut line) {
					Ok(0) => return None,
					Ok(read) => pos += read as u64,

					Err(err) => {
						failed = true;
						return Some(Err(SimError::Io(err)));
					},
				}

				if line.trim().is_empty() {
					continue;
				}

				let record = parse_record(line.trim_end());

				if record.is_err() {
					failed = true;
				}

				return Some(record);
			}
		}))
	}

	/// Iterates the view's records in reverse order by scanning the file
	/// backwards in fixed-size chunks and splitting on newlines.
	pub fn rev_iter(
		&self,
	) -> Result<impl Iterator<Item = Result<AccessAssignment, SimError>>, SimError> {
		let mut file = File::open(&self.path)?;

		let end_pos = match self.end_pos {
			Some(end) => end,
			None => file.seek(SeekFrom::End(0))?,
		};

		let mut scanner = ReverseLineScanner {
			file,
			pos: end_pos,
			begin_pos: self.begin_pos,
			buf: Vec::new(),
			exhausted: end_pos <= self.begin_pos,
		};

		let mut failed = false;

		Ok(std::iter::from_fn(move || {
			if failed {
				return None;
			}

			let line = match scanner.next_line() {
				Ok(Some(line)) => line,
				Ok(None) => return None,

				Err(err) => {
					failed = true;
					return Some(Err(SimError::Io(err)));
				},
			};

			let record = match String::from_utf8(line) {
				Ok(line) => parse_record(&line),
				Err(err) => Err(SimError::Record(err.to_string())),
			};

			if record.is_err() {
				failed = true;
			}

			Some(record)
		}))
	}

	/// Collects the accesses of the view assigned to one cache
	/// processor.
	pub fn scoped_accesses(&self, cache_proc: usize) -> Result<Vec<Access>, SimError> {
		let mut accesses = Vec::new();

		for assignment in self.iter()? {
			let assignment = assignment?;

			if assignment.cache_proc == cache_proc {
				accesses.push(assignment.access);
			}
		}

		Ok(accesses)
	}
}

struct ReverseLineScanner {
	file: File,
	pos: u64,
	begin_pos: u64,
	buf: Vec<u8>,
	exhausted: bool,
}

impl ReverseLineScanner {
	fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
		loop {
			while self.buf
				.last()
				.is_some_and(|byte| byte.is_ascii_whitespace())
			{
				self.buf.pop();
			}

			if let Some(newline) = self.buf.iter().rposition(|&byte| byte == b'\n') {
				let line = self.buf.split_off(newline + 1);
				return Ok(Some(line));
			}

			if self.exhausted {
				if self.buf.is_empty() {
					return Ok(None);
				}

				return Ok(Some(std::mem::take(&mut self.buf)));
			}

			// read the previous chunk and prepend it to the buffer
			let chunk_start = self.pos
				.saturating_sub(REVERSE_CHUNK_SIZE)
				.max(self.begin_pos);

			let mut chunk = vec![0u8; (self.pos - chunk_start) as usize];
			self.file.seek(SeekFrom::Start(chunk_start))?;
			self.file.read_exact(&mut chunk)?;

			chunk.extend_from_slice(&self.buf);
			self.buf = chunk;
			self.pos = chunk_start;
			self.exhausted = chunk_start == self.begin_pos;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::NamedTempFile;

	fn assignment(ts: TimeStamp, file: &str, cache_proc: usize) -> AccessAssignment {
		AccessAssignment {
			access: Access {
				access_ts: ts,
				file: file.to_string(),
				parts: vec![(0, 10), (1, 20)],
			},
			cache_proc,
		}
	}

	fn write_trace(assignments: &[AccessAssignment]) -> NamedTempFile {
		let file = NamedTempFile::new().expect("could not create temp file");
		record_path(file.path(), assignments.to_vec()).expect("could not record");
		file
	}

	#[test]
	fn records_are_line_delimited_json() {
		let mut buffer = Vec::new();
		write_assignment(&mut buffer, &assignment(1, "a", 2)).unwrap();

		let line = String::from_utf8(buffer).unwrap();

		assert_eq!(
			line,
			"{\"access\":{\"access_ts\":1,\"file\":\"a\",\"parts\":[[0,10],[1,20]]},\"cache_proc\":2}\n",
		);
	}

	#[test]
	fn replay_round_trips_the_sequence() {
		let assignments: Vec<AccessAssignment> = (0..100)
			.map(|i| assignment(i, &format!("file_{i}"), (i % 3) as usize))
			.collect();

		let file = write_trace(&assignments);

		let replayed: Vec<AccessAssignment> = Reader::open(file.path())
			.iter().unwrap()
			.map(|record| record.unwrap())
			.collect();

		assert_eq!(replayed, assignments);
	}

	#[test]
	fn reverse_replay_yields_the_reverse_sequence() {
		let assignments: Vec<AccessAssignment> = (0..100)
			.map(|i| assignment(i, &format!("file_{i}"), 0))
			.collect();

		let file = write_trace(&assignments);

		let mut replayed: Vec<AccessAssignment> = Reader::open(file.path())
			.rev_iter().unwrap()
			.map(|record| record.unwrap())
			.collect();

		replayed.reverse();
		assert_eq!(replayed, assignments);
	}

	#[test]
	fn predicate_restricts_the_view_to_one_range() {
		let assignments: Vec<AccessAssignment> = (0..50)
			.map(|i| assignment(i, &format!("file_{i}"), 0))
			.collect();

		let file = write_trace(&assignments);

		let mut window = StopEarlyWindow::new(None, Some(10));
		let mut reader = Reader::with_predicate(file.path(), &mut window).unwrap();

		assert_eq!(reader.len().unwrap(), 10);

		let forward: Vec<TimeStamp> = reader
			.iter().unwrap()
			.map(|record| record.unwrap().access.access_ts)
			.collect();

		assert_eq!(forward, (0..10).collect::<Vec<TimeStamp>>());

		let backward: Vec<TimeStamp> = reader
			.rev_iter().unwrap()
			.map(|record| record.unwrap().access.access_ts)
			.collect();

		assert_eq!(backward, (0..10).rev().collect::<Vec<TimeStamp>>());
	}

	#[test]
	fn time_window_ends_at_the_bound() {
		let assignments: Vec<AccessAssignment> = (0..50)
			.map(|i| assignment(i, &format!("file_{i}"), 0))
			.collect();

		let file = write_trace(&assignments);

		let mut window = StopEarlyWindow::new(Some(24), None);
		let mut reader = Reader::with_predicate(file.path(), &mut window).unwrap();

		assert_eq!(reader.len().unwrap(), 25);
	}

	#[test]
	fn scoped_accesses_filter_by_cache_processor() {
		let assignments: Vec<AccessAssignment> = (0..30)
			.map(|i| assignment(i, &format!("file_{i}"), (i % 3) as usize))
			.collect();

		let file = write_trace(&assignments);
		let reader = Reader::open(file.path());

		let scoped = reader.scoped_accesses(1).unwrap();

		assert_eq!(scoped.len(), 10);
		assert!(scoped.iter().all(|access| access.access_ts % 3 == 1));
	}

	#[test]
	fn access_info_records_round_trip() {
		let info = AccessInfo {
			access: Access {
				access_ts: 7,
				file: "f".to_string(),
				parts: vec![(0, 3)],
			},
			file_hit: true,
			bytes_hit: 3,
			bytes_missed: 0,
			bytes_added: 0,
			bytes_removed: 0,
			total_bytes: 3,
			evicted_files: vec!["g".to_string()],
		};

		let file = NamedTempFile::new().unwrap();

		{
			let mut writer = io::BufWriter::new(File::create(file.path()).unwrap());
			write_access_info(&mut writer, &info).unwrap();
			writer.flush().unwrap();
		}

		let replayed: Vec<AccessInfo> = replay_access_info_path(file.path())
			.unwrap()
			.map(|record| record.unwrap())
			.collect();

		assert_eq!(replayed, vec![info]);
	}
}
