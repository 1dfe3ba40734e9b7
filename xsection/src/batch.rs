//! Parallel conversion of many sections.
//!
//! Independent sections convert in parallel. Work on the same section id is
//! serialised by a per-section lock, and the mapping store itself is only
//! touched for the short read and compare-and-set steps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rayon::prelude::*;

use crate::config::XsecConfig;
use crate::dataset::{Convention, SectionDataset};
use crate::error::Result;
use crate::mapping::{convert_guarded, ConversionOutcome, MappingRecord, MappingStore};

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One mutex per section id, created on first use.
#[derive(Debug, Default)]
pub struct SectionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_section(&self, section_id: &str) -> Arc<Mutex<()>> {
        lock(&self.locks)
            .entry(section_id.to_string())
            .or_default()
            .clone()
    }
}

/// A store behind a mutex, locked only for each individual store call.
struct SharedStore<'a, S: ?Sized>(&'a Mutex<S>);

impl<S: MappingStore + ?Sized> MappingStore for SharedStore<'_, S> {
    fn get(&self, section_id: &str) -> Result<Option<MappingRecord>> {
        lock(self.0).get(section_id)
    }

    fn compare_and_set(
        &mut self,
        section_id: &str,
        expected_version: u64,
        convention: Convention,
    ) -> Result<MappingRecord> {
        lock(self.0).compare_and_set(section_id, expected_version, convention)
    }

    fn records(&self) -> Result<Vec<MappingRecord>> {
        lock(self.0).records()
    }
}

/// Mapping-guarded conversion against a store shared between threads.
pub fn convert_shared<S: MappingStore + ?Sized>(
    store: &Mutex<S>,
    locks: &SectionLocks,
    dataset: &SectionDataset,
    target: Convention,
    config: &XsecConfig,
) -> Result<ConversionOutcome> {
    let section_lock = locks.for_section(dataset.section_id());
    let _writer = lock(&section_lock);
    convert_guarded(&mut SharedStore(store), dataset, target, config)
}

/// Converts every dataset to `target` in parallel.
///
/// Results come back in input order; a failure on one dataset does not
/// affect the others.
pub fn convert_batch<S: MappingStore + Send + ?Sized>(
    datasets: &[SectionDataset],
    target: Convention,
    store: &Mutex<S>,
    config: &XsecConfig,
) -> Vec<Result<ConversionOutcome>> {
    let locks = SectionLocks::new();
    let results: Vec<Result<ConversionOutcome>> = datasets
        .par_iter()
        .map(|ds| convert_shared(store, &locks, ds, target, config))
        .collect();
    let failed = results.iter().filter(|r| r.is_err()).count();
    log::info!(
        "batch conversion to {}: {} dataset(s), {} failed",
        target,
        datasets.len(),
        failed
    );
    results
}
