//! Diagnostic commands for exercising [`concur_lock_manager::LockManager`]
//! and [`concur_cuckoo_map::CuckooMap`] from a shell: `concur lock bench`,
//! `concur cuckoo bench`, `concur cuckoo fuzz`. Not a product surface —
//! no persistence, no server, just enough driving of both primitives to
//! sanity-check a build and print contention/rehash metrics.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use concur_core::{Config, Rng64, global_metrics, init_tracing, seed_from_env};
use concur_cuckoo_map::CuckooMap;
use concur_lock_manager::LockManager;

const ABSENT: i64 = i64::MIN + 1;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("lock manager error: {0}")]
    LockManager(#[from] concur_lock_manager::Error),
    #[error("cuckoo map error: {0}")]
    CuckooMap(#[from] concur_cuckoo_map::Error),
}

pub type CliResult<T> = Result<T, CliError>;

#[derive(Parser, Debug)]
#[command(name = "concur", version, about = "Diagnostics for concur-lock-manager and concur-cuckoo-map")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive LockManager from multiple threads and report throughput.
    #[command(name = "lock")]
    Lock {
        #[command(subcommand)]
        action: LockCommand,
    },
    /// Drive CuckooMap from one or more threads.
    #[command(name = "cuckoo")]
    Cuckoo {
        #[command(subcommand)]
        action: CuckooCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum LockCommand {
    /// Acquire/release a spread of named exclusive locks from several
    /// threads and report acquisitions/sec plus contention metrics.
    Bench {
        #[arg(long, default_value_t = 4)]
        threads: usize,
        #[arg(long, default_value_t = 8)]
        locks: usize,
        #[arg(long, default_value_t = 100_000)]
        iterations: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum CuckooCommand {
    /// Single-thread put/get throughput over a fresh map.
    Bench {
        #[arg(long, default_value_t = 16_384)]
        capacity_hint: usize,
        #[arg(long, default_value_t = 100_000)]
        keys: u64,
    },
    /// Concurrent randomized put/get/remove/`compute_if_absent` mixture
    /// against a shared map, seeded for reproducibility.
    Fuzz {
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value_t = 4)]
        threads: usize,
        #[arg(long, default_value_t = 100_000)]
        ops: u64,
        #[arg(long, default_value_t = 16)]
        capacity_hint: usize,
    },
}

/// Parse arguments, dispatch, print a result, and return a process exit
/// code (0 on success, 1 on failure).
#[must_use]
pub fn run() -> i32 {
    init_tracing();
    let cli = Cli::parse();
    match dispatch(&cli.command) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

fn dispatch(command: &Commands) -> CliResult<()> {
    match command {
        Commands::Lock { action } => match action {
            LockCommand::Bench { threads, locks, iterations } => {
                lock_bench(*threads, *locks, *iterations)
            }
        },
        Commands::Cuckoo { action } => match action {
            CuckooCommand::Bench { capacity_hint, keys } => cuckoo_bench(*capacity_hint, *keys),
            CuckooCommand::Fuzz { seed, threads, ops, capacity_hint } => {
                cuckoo_fuzz(seed.unwrap_or_else(seed_from_env), *threads, *ops, *capacity_hint)
            }
        },
    }
}

fn lock_bench(threads: usize, locks: usize, iterations: u64) -> CliResult<()> {
    let manager = Arc::new(LockManager::with_config(Config::default()));
    let started = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|worker| {
            let manager = manager.clone();
            std::thread::spawn(move || -> CliResult<()> {
                let mut rng = Rng64::new(seed_from_env()).fork(worker as u64);
                for _ in 0..iterations {
                    let name = format!("bench-lock-{}", rng.next_bounded(locks as u64));
                    let handle = manager.exclusive(&name);
                    handle.acquire()?;
                    handle.release()?;
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("lock bench worker panicked")?;
    }

    let elapsed = started.elapsed();
    let total_ops = threads as u64 * iterations;
    print_throughput("lock acquire/release", total_ops, elapsed);
    print_lock_metrics();
    Ok(())
}

fn cuckoo_bench(capacity_hint: usize, keys: u64) -> CliResult<()> {
    let map = CuckooMap::new(capacity_hint);
    let started = Instant::now();
    for k in 0..keys as i64 {
        map.put(k, -k, ABSENT)?;
    }
    let put_elapsed = started.elapsed();
    print_throughput("cuckoo put", keys, put_elapsed);

    let started = Instant::now();
    for k in 0..keys as i64 {
        map.get(k, ABSENT)?;
    }
    let get_elapsed = started.elapsed();
    print_throughput("cuckoo get", keys, get_elapsed);
    println!("final capacity: {}, rehashes: {}", map.capacity(), map.rehash_count());
    print_cuckoo_metrics();
    Ok(())
}

fn cuckoo_fuzz(seed: u64, threads: usize, ops: u64, capacity_hint: usize) -> CliResult<()> {
    let map = Arc::new(CuckooMap::new(capacity_hint));
    println!("seed: {seed}");
    let started = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|worker| {
            let map = map.clone();
            std::thread::spawn(move || -> CliResult<()> {
                let mut rng = Rng64::new(seed).fork(worker as u64);
                for _ in 0..ops {
                    let key = rng.next_range(0, 1000) as i64;
                    match rng.next_bounded(4) {
                        0 => {
                            map.put(key, rng.next_range(0, i64::MAX as u64) as i64, ABSENT)?;
                        }
                        1 => {
                            map.get(key, ABSENT)?;
                        }
                        2 => {
                            map.remove(key, ABSENT)?;
                        }
                        _ => {
                            map.compute_if_absent(key, |k| k * 2)?;
                        }
                    }
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("cuckoo fuzz worker panicked")?;
    }

    let elapsed = started.elapsed();
    print_throughput("cuckoo fuzz op", threads as u64 * ops, elapsed);
    println!("final capacity: {}, rehashes: {}", map.capacity(), map.rehash_count());
    print_cuckoo_metrics();
    Ok(())
}

fn print_throughput(label: &str, total_ops: u64, elapsed: Duration) {
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    let per_sec = total_ops as f64 / secs;
    println!("{label}: {total_ops} ops in {elapsed:?} ({per_sec:.0} ops/sec)");
}

fn print_lock_metrics() {
    let snapshot = global_metrics().lock_manager.snapshot();
    println!("{snapshot:#?}");
}

fn print_cuckoo_metrics() {
    let snapshot = global_metrics().cuckoo_map.snapshot();
    println!("{snapshot:#?}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_bench_runs_without_error() {
        lock_bench(2, 4, 1_000).unwrap();
    }

    #[test]
    fn cuckoo_bench_runs_without_error() {
        cuckoo_bench(64, 2_000).unwrap();
    }

    #[test]
    fn cuckoo_fuzz_runs_without_error() {
        cuckoo_fuzz(42, 3, 2_000, 8).unwrap();
    }

    #[test]
    fn cli_parses_lock_bench() {
        let cli = Cli::parse_from(["concur", "lock", "bench", "--threads", "2"]);
        match cli.command {
            Commands::Lock { action: LockCommand::Bench { threads, .. } } => {
                assert_eq!(threads, 2);
            }
            other => panic!("unexpected command parsed: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_cuckoo_fuzz() {
        let cli = Cli::parse_from(["concur", "cuckoo", "fuzz", "--seed", "7", "--ops", "10"]);
        match cli.command {
            Commands::Cuckoo { action: CuckooCommand::Fuzz { seed, ops, .. } } => {
                assert_eq!(seed, Some(7));
                assert_eq!(ops, 10);
            }
            other => panic!("unexpected command parsed: {other:?}"),
        }
    }
}
