//! Reading and zeroing the per-location counters
//!
//! The reporting loop only sees [`CounterSource`]; [`CounterHandle`] is the
//! implementation backed by the kernel-side `COUNTS` per-CPU array. The
//! handle also owns the loaded programs, so dropping it detaches every probe.

use aya::maps::{MapData, PerCpuArray, PerCpuValues};
use aya::Ebpf;
use log::info;
use std::collections::BTreeMap;

use crate::domain::{FuncCountError, Location, Result};

/// Calls per location for one reporting interval
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountSnapshot {
    counts: BTreeMap<Location, u64>,
}

impl CountSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, location: Location, count: u64) {
        self.counts.insert(location, count);
    }

    /// Non-zero counts, ascending by count, ties by location
    #[must_use]
    pub fn nonzero_ascending(&self) -> Vec<(Location, u64)> {
        let mut hits: Vec<(Location, u64)> = self
            .counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(&location, &count)| (location, count))
            .collect();
        // Stable sort keeps location order among equal counts
        hits.sort_by_key(|&(_, count)| count);
        hits
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

impl FromIterator<(Location, u64)> for CountSnapshot {
    fn from_iter<I: IntoIterator<Item = (Location, u64)>>(iter: I) -> Self {
        Self { counts: iter.into_iter().collect() }
    }
}

/// Where the reporting loop gets its numbers from
pub trait CounterSource {
    /// Current count for every location
    ///
    /// # Errors
    /// Returns an error if the aggregation map cannot be read
    fn snapshot(&self) -> Result<CountSnapshot>;

    /// Zero every location for the next interval
    ///
    /// # Errors
    /// Returns an error if the aggregation map cannot be written
    fn reset(&mut self) -> Result<()>;
}

impl<T: CounterSource + ?Sized> CounterSource for &mut T {
    fn snapshot(&self) -> Result<CountSnapshot> {
        (**self).snapshot()
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }
}

/// Attached counting programs plus their `COUNTS` map
pub struct CounterHandle {
    counts: PerCpuArray<MapData, u64>,
    locations: Vec<Location>,
    nr_cpus: usize,
    // Keeps the programs (and their links) alive
    bpf: Ebpf,
}

impl CounterHandle {
    pub(crate) fn new(
        bpf: Ebpf,
        counts: PerCpuArray<MapData, u64>,
        locations: Vec<Location>,
        nr_cpus: usize,
    ) -> Self {
        Self { counts, locations, nr_cpus, bpf }
    }

    /// Detach every probe
    pub fn detach(self) {
        let programs = self.bpf.programs().count();
        drop(self);
        info!("Detached {programs} counting programs");
    }
}

impl CounterSource for CounterHandle {
    fn snapshot(&self) -> Result<CountSnapshot> {
        self.locations
            .iter()
            .map(|&location| {
                let per_cpu = self.counts.get(&location.0, 0)?;
                let total: u64 = per_cpu.iter().sum();
                Ok::<_, FuncCountError>((location, total))
            })
            .collect()
    }

    fn reset(&mut self) -> Result<()> {
        for location in &self.locations {
            let zeroes = PerCpuValues::try_from(vec![0u64; self.nr_cpus])?;
            self.counts.set(location.0, zeroes, 0)?;
        }
        Ok(())
    }
}
