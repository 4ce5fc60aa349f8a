/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::{
	fs::File,
	io::{self, BufWriter, Write},
	path::PathBuf,
	process::ExitCode,
};

use clap::{Args, Parser, Subcommand};
use log::{error, info};

use htc_cache_sim::{
	SimError,
	cache::{
		CacheSystem,
		OfflineCacheSystem,
		OnlineCacheSystem,
		Storage,
		StorageRef,
		policy::{PolicyKind, PolicySpec},
	},
	distributor::{AccessAssignment, Distributor, NodeSpec},
	recorder::{self, Reader, StopEarlyWindow},
	workload::{
		TimeStamp,
		generator::RandomModel,
		stats::StatsCounters as WorkloadStatsCounters,
		units::{parse_bytes_rate, parse_bytes_size},
	},
};

#[derive(Parser)]
#[command(version, about = "Simulate an HTC data-tier cache.")]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Generate accesses from a workload model, schedule them onto a
	/// node set and record the assignment stream.
	Record(RecordArgs),

	/// Replay a recorded assignment stream against a cache policy.
	Replay(ReplayArgs),

	/// Compute access statistics directly from a recorded stream.
	WorkloadStats(WorkloadStatsArgs),
}

#[derive(Args)]
struct RecordArgs {
	/// Output file for the recorded assignments.
	#[arg(short, long)]
	file: PathBuf,

	/// Number of accesses to generate.
	#[arg(long)]
	generate_accesses: Option<usize>,

	/// Number of seconds of workload to generate.
	#[arg(long)]
	generate_time: Option<TimeStamp>,

	/// Workload model to generate from.
	#[arg(long, default_value = "random")]
	model: String,

	/// Total size of the input data set, e.g. "1 TiB".
	#[arg(long, default_value = "1 TiB")]
	data_set_size: String,

	/// Size of each input file, e.g. "1 GiB".
	#[arg(long, default_value = "1 GiB")]
	file_size: String,

	/// Number of computing tasks.
	#[arg(long, default_value_t = 7)]
	tasks: u32,

	/// Fraction of a file each task reads.
	#[arg(long, default_value_t = 0.2)]
	read_fraction: f64,

	/// Byte rate at which each task submits work, e.g. "1 MiB/s".
	#[arg(long, default_value = "1 MiB/s")]
	submit_rate: String,

	/// Seed for the workload model's random source.
	#[arg(long)]
	seed: Option<u64>,

	/// Number of compute nodes.
	#[arg(long, default_value_t = 100)]
	node_count: usize,

	/// Cores per compute node.
	#[arg(long, default_value_t = 32)]
	node_cores: u32,

	/// Read throughput of one core, e.g. "10 MiB/s".
	#[arg(long, default_value = "10 MiB/s")]
	core_throughput: String,

	/// Number of cache processors the nodes are spread over.
	#[arg(long, default_value_t = 1)]
	cache_processor_count: usize,

	/// Output file for the aggregated workload stats as CSV.
	#[arg(long)]
	stats_file: Option<PathBuf>,

	/// Disable the CSV header row in --stats-file.
	#[arg(long)]
	stats_no_header: bool,
}

#[derive(Args)]
struct ReplayArgs {
	/// Input file with the recorded assignments.
	#[arg(short, long)]
	file: PathBuf,

	/// Number of accesses considered cache warm-up.
	#[arg(long)]
	warm_up_accesses: Option<usize>,

	/// Number of seconds considered cache warm-up.
	#[arg(long)]
	warm_up_time: Option<TimeStamp>,

	/// Number of accesses to process, including warm-up.
	#[arg(long)]
	process_accesses: Option<usize>,

	/// Number of seconds to process, including warm-up.
	#[arg(long)]
	process_time: Option<TimeStamp>,

	/// Number of simulated cache processors; must match the recording.
	#[arg(long, default_value_t = 1)]
	cache_processor_count: usize,

	/// Cache policy to simulate.
	#[arg(long)]
	cache_processor: String,

	/// key=value arguments passed to each cache processor.
	#[arg(long)]
	cache_processor_args: Option<String>,

	/// Size of the cache storage volume, e.g. "10 GiB".
	#[arg(long)]
	storage_size: String,

	/// Give each cache processor its own storage volume.
	#[arg(long)]
	non_shared_storage: bool,

	/// Output file for the per-access info records.
	#[arg(long)]
	cache_info_file: Option<PathBuf>,

	/// Output file for the aggregated cache stats as CSV.
	#[arg(long)]
	stats_file: Option<PathBuf>,

	/// Disable the CSV header row in --stats-file.
	#[arg(long)]
	stats_no_header: bool,
}

#[derive(Args)]
struct WorkloadStatsArgs {
	/// Input file with the recorded assignments.
	#[arg(short, long)]
	file: PathBuf,

	/// Output file for the stats as CSV; stdout if omitted.
	#[arg(long)]
	stats_file: Option<PathBuf>,

	/// Disable the CSV header row.
	#[arg(long)]
	stats_no_header: bool,

	/// Emit one row per file instead of the aggregate row.
	#[arg(long)]
	per_file: bool,
}

fn main() -> ExitCode {
	env_logger::init();

	let cli = Cli::parse();

	let result = match cli.command {
		Command::Record(args) => record(args),
		Command::Replay(args) => replay(args),
		Command::WorkloadStats(args) => workload_stats(args),
	};

	if let Err(err) = result {
		error!("{err}");
		return ExitCode::FAILURE;
	}

	ExitCode::SUCCESS
}

fn record(args: RecordArgs) -> Result<(), SimError> {
	if args.generate_accesses.is_none() && args.generate_time.is_none() {
		return Err(SimError::config(
			"either --generate-accesses or --generate-time must be specified",
		));
	}

	if args.model != "random" {
		return Err(SimError::config(format!("unknown workload model {:?}", args.model)));
	}

	if args.cache_processor_count == 0 {
		return Err(SimError::config("--cache-processor-count must be positive"));
	}

	let model = RandomModel {
		data_set_size: parse_bytes_size(&args.data_set_size)?,
		file_size: parse_bytes_size(&args.file_size)?,
		tasks: args.tasks,
		read_fraction: args.read_fraction,
		submit_rate: parse_bytes_rate(&args.submit_rate)?,
	};

	let tasks = model.build(args.seed)?;
	let core_throughput = parse_bytes_rate(&args.core_throughput)?;

	let node_specs: Vec<NodeSpec> = (0..args.node_count)
		.map(|node| NodeSpec {
			cores: args.node_cores,
			core_throughput,
			cache_proc: node % args.cache_processor_count,
		})
		.collect();

	let mut distributor = Distributor::new(node_specs, tasks);

	let mut writer = BufWriter::new(File::create(&args.file)?);
	let mut written: usize = 0;

	for assignment in distributor.by_ref() {
		if let Some(time) = args.generate_time {
			if assignment.access.access_ts > time {
				break;
			}
		}

		recorder::write_assignment(&mut writer, &assignment)?;
		written += 1;

		if args.generate_accesses.is_some_and(|accesses| written >= accesses) {
			break;
		}
	}

	writer.flush()?;
	info!("recorded {written} accesses to {}", args.file.display());

	if let Some(stats_file) = &args.stats_file {
		let mut writer = BufWriter::new(File::create(stats_file)?);

		write_workload_stats_csv(&mut writer, distributor.stats(), !args.stats_no_header)?;
	}

	Ok(())
}

fn replay(args: ReplayArgs) -> Result<(), SimError> {
	if args.warm_up_accesses.is_some() && args.warm_up_time.is_some() {
		return Err(SimError::config(
			"only either --warm-up-time or --warm-up-accesses may be specified",
		));
	}

	let mut cache_system = cache_system_from_args(&args)?;

	if args.warm_up_time.is_some() || args.warm_up_accesses.is_some() {
		if let Some(warm_up_time) = args.warm_up_time {
			for info in cache_system.by_ref() {
				if info?.access.access_ts >= warm_up_time {
					break;
				}
			}
		}

		if let Some(warm_up_accesses) = args.warm_up_accesses {
			for info in cache_system.by_ref().take(warm_up_accesses) {
				info?;
			}
		}

		cache_system.reset_after_warm_up();
	}

	if let Some(cache_info_file) = &args.cache_info_file {
		let mut writer = BufWriter::new(File::create(cache_info_file)?);

		for info in cache_system.by_ref() {
			recorder::write_access_info(&mut writer, &info?)?;
		}

		writer.flush()?;
	} else {
		for info in cache_system.by_ref() {
			info?;
		}
	}

	if let Some(stats_file) = &args.stats_file {
		let mut writer = BufWriter::new(File::create(stats_file)?);

		write_cache_stats_csv(&mut writer, cache_system.stats(), !args.stats_no_header)?;
	}

	info!(
		"replay complete: {} accesses, byte hit rate {:.4}",
		cache_system.stats().total_stats().accesses,
		cache_system.stats().byte_hit_rate(),
	);

	Ok(())
}

fn cache_system_from_args(args: &ReplayArgs) -> Result<Box<dyn CacheSystem + '_>, SimError> {
	if args.cache_processor_count == 0 {
		return Err(SimError::config("--cache-processor-count must be positive"));
	}

	let kind: PolicyKind = args.cache_processor.parse()?;
	let user_args = args.cache_processor_args.as_deref().unwrap_or("");

	let storage_size = parse_bytes_size(&args.storage_size)?;

	if storage_size == 0 {
		return Err(SimError::config("--storage-size must be positive"));
	}

	let shared_storage = Storage::new_shared(storage_size);

	let storages: Vec<StorageRef> = (0..args.cache_processor_count)
		.map(|_| {
			if args.non_shared_storage {
				Storage::new_shared(storage_size)
			} else {
				shared_storage.clone()
			}
		})
		.collect();

	if kind.is_offline() {
		let mut specs = Vec::new();

		for storage in storages {
			specs.push((PolicySpec::from_user_args(kind, user_args)?, storage));
		}

		let reader = match (args.process_time, args.process_accesses) {
			(None, None) => Reader::open(&args.file),

			(time, accesses) => {
				let mut window = StopEarlyWindow::new(time, accesses);
				Reader::with_predicate(&args.file, &mut window)?
			},
		};

		return Ok(Box::new(OfflineCacheSystem::new(specs, &reader)?));
	}

	let mut processors = Vec::new();

	for storage in storages {
		let spec = PolicySpec::from_user_args(kind, user_args)?;
		processors.push(spec.online_processor(storage)?);
	}

	let process_time = args.process_time;
	let mut remaining = args.process_accesses;

	let assignments = recorder::replay_path(&args.file)?
		.take_while(move |assignment| match assignment {
			Ok(assignment) => {
				if process_time.is_some_and(|time| assignment.access.access_ts > time) {
					return false;
				}

				match &mut remaining {
					Some(0) => false,

					Some(remaining) => {
						*remaining -= 1;
						true
					},

					None => true,
				}
			},

			Err(_) => true,
		});

	Ok(Box::new(OnlineCacheSystem::new(processors, assignments)))
}

fn workload_stats(args: WorkloadStatsArgs) -> Result<(), SimError> {
	let mut counters = WorkloadStatsCounters::default();

	for assignment in recorder::replay_path(&args.file)? {
		let assignment: AccessAssignment = assignment?;
		counters.process_access(&assignment.access);
	}

	let mut writer: Box<dyn Write> = match &args.stats_file {
		Some(stats_file) => Box::new(BufWriter::new(File::create(stats_file)?)),
		None => Box::new(io::stdout().lock()),
	};

	if args.per_file {
		write_per_file_stats_csv(&mut writer, &counters, !args.stats_no_header)?;
	} else {
		write_workload_stats_csv(&mut writer, &counters, !args.stats_no_header)?;
	}

	writer.flush()?;

	Ok(())
}

fn write_workload_stats_csv<W: Write>(
	writer: &mut W,
	counters: &WorkloadStatsCounters,
	header: bool,
) -> Result<(), SimError> {
	if header {
		writeln!(writer, "accesses,files,total_bytes_accessed,unique_bytes_accessed")?;
	}

	let totals = counters.total_stats();

	writeln!(
		writer,
		"{},{},{},{}",
		totals.accesses,
		counters.file_count(),
		totals.total_bytes_accessed,
		totals.unique_bytes_accessed,
	)?;

	Ok(())
}

fn write_per_file_stats_csv<W: Write>(
	writer: &mut W,
	counters: &WorkloadStatsCounters,
	header: bool,
) -> Result<(), SimError> {
	if header {
		writeln!(writer, "file,accesses,total_bytes_accessed,unique_bytes_accessed")?;
	}

	let mut files_stats: Vec<_> = counters.files_stats().collect();
	files_stats.sort_by(|a, b| a.id.cmp(&b.id));

	for file_stats in files_stats {
		writeln!(
			writer,
			"{},{},{},{}",
			file_stats.id,
			file_stats.accesses,
			file_stats.total_bytes_accessed,
			file_stats.unique_bytes_accessed,
		)?;
	}

	Ok(())
}

fn write_cache_stats_csv<W: Write>(
	writer: &mut W,
	counters: &htc_cache_sim::cache::StatsCounters,
	header: bool,
) -> Result<(), SimError> {
	if header {
		writeln!(
			writer,
			"accesses,files,total_bytes_accessed,unique_bytes_accessed,\
			files_hit,files_missed,bytes_hit,bytes_missed,bytes_added,bytes_removed",
		)?;
	}

	let totals = counters.total_stats();

	writeln!(
		writer,
		"{},{},{},{},{},{},{},{},{},{}",
		totals.accesses,
		counters.file_count(),
		totals.total_bytes_accessed,
		totals.unique_bytes_accessed,
		totals.files_hit,
		totals.files_missed,
		totals.bytes_hit,
		totals.bytes_missed,
		totals.bytes_added,
		totals.bytes_removed,
	)?;

	Ok(())
}
