use std::collections::HashMap;
use std::sync::RwLock;

use rand::Rng;

/// Builds the ~27-counter runtime gauge map, keyed by the same names
/// `runtime.MemStats` uses upstream so downstream consumers of the wire
/// format see a familiar shape. Rust has no garbage-collected runtime and no
/// portable safe API for per-allocation accounting, so the allocator-derived
/// fields are approximated from the process's resident set (`sysinfo`, same
/// source the host sampler already uses) rather than tracked exactly;
/// counters with no meaningful analogue at all (GC pause timing, GC cycle
/// counts, Go's map-lookup counter) are reported as `0.0` rather than
/// omitted, per SPEC_FULL.md §3.
pub(crate) fn collect_runtime_gauges(process_resident_bytes: u64) -> HashMap<String, f64> {
    let mut gauges = HashMap::with_capacity(27);
    let resident = process_resident_bytes as f64;

    gauges.insert("Alloc".to_string(), resident);
    gauges.insert("TotalAlloc".to_string(), resident);
    gauges.insert("Sys".to_string(), resident);
    gauges.insert("HeapAlloc".to_string(), resident);
    gauges.insert("HeapSys".to_string(), resident);
    gauges.insert("HeapIdle".to_string(), 0.0);
    gauges.insert("HeapInuse".to_string(), resident);
    gauges.insert("HeapReleased".to_string(), 0.0);
    gauges.insert("HeapObjects".to_string(), 0.0);
    gauges.insert("Mallocs".to_string(), 0.0);
    gauges.insert("Frees".to_string(), 0.0);
    gauges.insert("Lookups".to_string(), 0.0);
    gauges.insert("GCCPUFraction".to_string(), 0.0);
    gauges.insert("GCSys".to_string(), 0.0);
    gauges.insert("LastGC".to_string(), 0.0);
    gauges.insert("NextGC".to_string(), 0.0);
    gauges.insert("NumForcedGC".to_string(), 0.0);
    gauges.insert("NumGC".to_string(), 0.0);
    gauges.insert("PauseTotalNs".to_string(), 0.0);
    gauges.insert("StackInuse".to_string(), 0.0);
    gauges.insert("StackSys".to_string(), 0.0);
    gauges.insert("MCacheInuse".to_string(), 0.0);
    gauges.insert("MCacheSys".to_string(), 0.0);
    gauges.insert("MSpanInuse".to_string(), 0.0);
    gauges.insert("MSpanSys".to_string(), 0.0);
    gauges.insert("BuckHashSys".to_string(), 0.0);
    gauges.insert("OtherSys".to_string(), 0.0);

    gauges
}

/// The agent's working set: everything the two samplers write and the
/// reporter reads, guarded by a single read/write lock exactly as the
/// source's `Agent.mu` guards its one `Metrics` struct.
#[derive(Default)]
struct Inner {
    runtime_gauges: HashMap<String, f64>,
    random_value: f64,
    poll_count: i64,
    total_memory: f64,
    free_memory: f64,
    cpu_utilization: Vec<f64>,
}

pub struct AgentMetrics {
    inner: RwLock<Inner>,
}

/// Everything the reporter needs for one report tick, taken under a single
/// write-lock critical section (the atomic read-and-reset of §4.6 step 1).
pub struct ReportSnapshot {
    pub runtime_gauges: HashMap<String, f64>,
    pub poll_count: i64,
    pub random_value: f64,
    pub total_memory: f64,
    pub free_memory: f64,
    pub cpu_utilization: Vec<f64>,
}

impl AgentMetrics {
    pub fn new() -> Self {
        AgentMetrics { inner: RwLock::new(Inner::default()) }
    }

    /// Runtime sampler tick: refresh allocator-derived gauges, draw a fresh
    /// `RandomValue`, and increment `PollCount`.
    pub fn apply_runtime_sample(&self, process_resident_bytes: u64) {
        let mut guard = self.inner.write().expect("agent metrics lock poisoned");
        guard.runtime_gauges = collect_runtime_gauges(process_resident_bytes);
        guard.random_value = rand::thread_rng().gen_range(0.0..1.0);
        guard.poll_count += 1;
    }

    /// Host sampler tick: refresh host memory totals and per-CPU utilization.
    pub fn apply_host_sample(&self, total_memory: f64, free_memory: f64, cpu_utilization: Vec<f64>) {
        let mut guard = self.inner.write().expect("agent metrics lock poisoned");
        guard.total_memory = total_memory;
        guard.free_memory = free_memory;
        guard.cpu_utilization = cpu_utilization;
    }

    /// The reporter's atomic read-and-reset: copies every field under one
    /// write-lock acquisition and zeroes `PollCount`, so no sampler tick
    /// racing with this call is lost or double-counted (INV-6).
    pub fn snapshot_and_reset(&self) -> ReportSnapshot {
        let mut guard = self.inner.write().expect("agent metrics lock poisoned");
        let snapshot = ReportSnapshot {
            runtime_gauges: guard.runtime_gauges.clone(),
            poll_count: guard.poll_count,
            random_value: guard.random_value,
            total_memory: guard.total_memory,
            free_memory: guard.free_memory,
            cpu_utilization: guard.cpu_utilization.clone(),
        };
        guard.poll_count = 0;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_runtime_gauges_has_27_entries() {
        let gauges = collect_runtime_gauges(0);
        assert_eq!(gauges.len(), 27);
    }

    #[test]
    fn snapshot_and_reset_zeroes_poll_count_only() {
        let metrics = AgentMetrics::new();
        metrics.apply_runtime_sample(1024);
        metrics.apply_runtime_sample(1024);
        metrics.apply_host_sample(100.0, 50.0, vec![0.1, 0.2]);

        let snapshot = metrics.snapshot_and_reset();
        assert_eq!(snapshot.poll_count, 2);
        assert_eq!(snapshot.total_memory, 100.0);
        assert_eq!(snapshot.free_memory, 50.0);
        assert_eq!(snapshot.cpu_utilization, vec![0.1, 0.2]);

        let second = metrics.snapshot_and_reset();
        assert_eq!(second.poll_count, 0);
    }
}
