//! Transform parallelism sizing.
//!
//! Workers are assumed to hold roughly 0.5 GB of model/processor state each,
//! and the pool never takes more than 75% of the machine's CPUs.

use sysinfo::System;

const GB_PER_WORKER_INVERSE: f64 = 2.0;
const CPU_FRACTION: f64 = 0.75;

/// Compute a safe worker count from CPU count and available memory.
///
/// Pure and deterministic: `max(1, min(min(cpu, gb * 2), cpu * 0.75))`.
#[must_use]
pub fn worker_count(cpu_count: usize, available_gb: f64) -> usize {
    let cpu_count = cpu_count.max(1);
    let by_memory = (available_gb.max(0.0) * GB_PER_WORKER_INVERSE).floor() as usize;
    let memory_constrained = cpu_count.min(by_memory);
    let cpu_ceiling = (cpu_count as f64 * CPU_FRACTION).floor() as usize;
    memory_constrained.min(cpu_ceiling).max(1)
}

/// Probe the running machine and size the worker pool.
#[must_use]
pub fn detect_workers() -> usize {
    let sys = System::new_all();
    let cpus = sys.cpus().len().max(1);
    let available_gb = sys.available_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
    let workers = worker_count(cpus, available_gb);
    tracing::info!(cpus, available_gb = format!("{available_gb:.1}"), workers, "sized worker pool");
    workers
}
