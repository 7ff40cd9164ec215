//! System and process metric collection
//!
//! Reads memory, swap, per-CPU utilisation and the agent's own process
//! figures through `sysinfo`. A source that cannot be read is logged and
//! left out of the batch; collection itself never fails.

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{trace, warn};

use crate::Metric;

/// Gauge reporting a fresh random number each poll
pub const RANDOM_VALUE: &str = "RandomValue";

/// Counter holding the number of polls since the last successful report
pub const POLL_COUNT: &str = "PollCount";

pub struct Collector {
    system: System,
    pid: Option<Pid>,
}

impl Collector {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("cannot determine own pid, process metrics disabled: {}", e);
                None
            }
        };

        Self {
            system: System::new(),
            pid,
        }
    }

    /// Refresh every source and return the gauges of this poll
    pub fn collect(&mut self) -> Vec<Metric> {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();

        let mut gauges = Vec::with_capacity(16);
        self.memory_gauges(&mut gauges);
        self.cpu_gauges(&mut gauges);
        self.process_gauges(&mut gauges);
        gauges.push(Metric::gauge(RANDOM_VALUE, rand::random::<f64>()));

        // JSON has no NaN; one null value would get the whole batch rejected
        gauges.retain(|gauge| gauge.value.is_some_and(f64::is_finite));

        trace!("collected {} gauges", gauges.len());
        gauges
    }

    fn memory_gauges(&self, out: &mut Vec<Metric>) {
        let total = self.system.total_memory();
        if total == 0 {
            warn!("memory statistics unavailable");
            return;
        }

        out.push(Metric::gauge("TotalMemory", total as f64));
        out.push(Metric::gauge("FreeMemory", self.system.free_memory() as f64));
        out.push(Metric::gauge("UsedMemory", self.system.used_memory() as f64));
        out.push(Metric::gauge("TotalSwap", self.system.total_swap() as f64));
        out.push(Metric::gauge("UsedSwap", self.system.used_swap() as f64));
    }

    fn cpu_gauges(&self, out: &mut Vec<Metric>) {
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            warn!("cpu utilisation unavailable");
            return;
        }

        for (i, cpu) in cpus.iter().enumerate() {
            out.push(Metric::gauge(
                format!("CPUutilization{}", i + 1),
                cpu.cpu_usage() as f64,
            ));
        }
    }

    fn process_gauges(&mut self, out: &mut Vec<Metric>) {
        let Some(pid) = self.pid else {
            return;
        };

        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        match self.system.process(pid) {
            Some(process) => {
                out.push(Metric::gauge("ProcessMemory", process.memory() as f64));
                out.push(Metric::gauge(
                    "ProcessVirtualMemory",
                    process.virtual_memory() as f64,
                ));
                out.push(Metric::gauge("ProcessCPU", process.cpu_usage() as f64));
                out.push(Metric::gauge("ProcessUptime", process.run_time() as f64));
            }
            None => warn!("process {} not found, skipping process metrics", pid),
        }
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}
