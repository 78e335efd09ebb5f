use std::sync::Arc;
use std::time::Duration;

use sysinfo::{CpuExt, System, SystemExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metrics::AgentMetrics;
use crate::rate_limiter::RateLimiter;

/// Runtime sampler (`GetStats` in the source): ticks every `poll_interval`,
/// takes a rate-limit token, and refreshes the runtime gauges plus
/// `RandomValue`/`PollCount`. Exits as soon as `cancel` fires, holding no
/// token across ticks.
pub(crate) async fn run_runtime_sampler(
    metrics: Arc<AgentMetrics>,
    limiter: Arc<RateLimiter>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("runtime sampler stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        let Some(_permit) = limiter.acquire(&cancel).await else {
            debug!("runtime sampler stopping while waiting for a rate-limit token");
            return;
        };

        let resident = process_resident_bytes();
        metrics.apply_runtime_sample(resident);
    }
}

/// Host sampler (`GetExtendedStats` in the source): ticks every
/// `poll_interval` on its own token budget and refreshes host memory and
/// per-CPU utilization via `sysinfo`.
pub(crate) async fn run_host_sampler(
    metrics: Arc<AgentMetrics>,
    limiter: Arc<RateLimiter>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    let system = Mutex::new(System::new());
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("host sampler stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        let Some(_permit) = limiter.acquire(&cancel).await else {
            debug!("host sampler stopping while waiting for a rate-limit token");
            return;
        };

        let mut system = system.lock().await;
        system.refresh_memory();
        system.refresh_cpu();

        let total_memory = system.total_memory() as f64;
        let free_memory = system.free_memory() as f64;
        let cpu_utilization = system.cpus().iter().map(|cpu| cpu.cpu_usage() as f64).collect();

        metrics.apply_host_sample(total_memory, free_memory, cpu_utilization);
    }
}

fn process_resident_bytes() -> u64 {
    let mut system = System::new();
    let pid = sysinfo::get_current_pid().ok();
    match pid {
        Some(pid) => {
            system.refresh_process(pid);
            system.process(pid).map(|process| process.memory()).unwrap_or(0)
        }
        None => 0,
    }
}
