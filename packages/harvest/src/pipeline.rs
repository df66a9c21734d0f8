//! The harvest run: partitions in, one summary table out.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use madzi_api::MadziApi;
use madzi_api_models::{Agency, AgencyId, FlatRecord, PartitionKey};
use serde_json::Value;

use crate::HarvestError;
use crate::config::HarvestConfig;
use crate::coordinates::CoordinateCache;
use crate::enrich::RecordEnricher;
use crate::paths::{ensure_dir, year_dir};
use crate::progress::HarvestProgress;
use crate::scheduler::{Scheduler, split};
use crate::store::{PartitionStore, load_path};

/// Where a partition's records came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionSource {
    Cache,
    Fetched,
}

/// A record that could not be enriched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    /// Position of the row in the partition listing.
    pub index: usize,
    pub error: String,
}

/// A partition that produced a (possibly partial) record set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    pub key: PartitionKey,
    pub source: PartitionSource,
    pub record_count: usize,
    /// Rows missing from this partition. Always empty for cache hits.
    pub failed_records: Vec<RecordFailure>,
    /// Why the fetched records could not be written to the cache. They
    /// still reach the summary table.
    pub cache_error: Option<String>,
}

/// A partition that produced nothing, typically because its listing failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFailure {
    pub key: PartitionKey,
    pub error: String,
}

/// Outcome of a harvest run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    /// Settled partitions in submission order.
    pub partitions: Vec<PartitionSummary>,
    pub failed_partitions: Vec<PartitionFailure>,
    /// Rows written to the summary table.
    pub record_count: usize,
    pub summary_path: PathBuf,
}

impl HarvestReport {
    #[must_use]
    pub fn count_from(&self, source: PartitionSource) -> usize {
        self.partitions.iter().filter(|p| p.source == source).count()
    }

    #[must_use]
    pub fn failed_record_count(&self) -> usize {
        self.partitions.iter().map(|p| p.failed_records.len()).sum()
    }

    /// `true` if every partition and every record settled successfully
    /// and every fetched partition was cached.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed_partitions.is_empty()
            && self.failed_record_count() == 0
            && self.partitions.iter().all(|p| p.cache_error.is_none())
    }
}

/// A summary table rebuilt from cache files alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuiltTable {
    pub partition_count: usize,
    pub record_count: usize,
    pub summary_path: PathBuf,
}

struct PartitionOutcome {
    summary: PartitionSummary,
    records: Vec<FlatRecord>,
}

/// Drives one harvest run against an API.
///
/// The coordinate cache lives as long as the harvester, so one harvester
/// equals one run's worth of memoized source lookups.
pub struct Harvester {
    api: Arc<dyn MadziApi>,
    config: HarvestConfig,
    store: PartitionStore,
    coordinates: CoordinateCache,
}

impl Harvester {
    #[must_use]
    pub fn new(api: Arc<dyn MadziApi>, config: HarvestConfig) -> Self {
        let store = PartitionStore::new(&config.data_dir);
        Self {
            api,
            config,
            store,
            coordinates: CoordinateCache::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &HarvestConfig {
        &self.config
    }

    #[must_use]
    pub const fn coordinates(&self) -> &CoordinateCache {
        &self.coordinates
    }

    /// Lists agencies, then harvests every (year, agency) partition.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError`] if the configuration is invalid, the agency
    /// listing fails, or the summary table cannot be written. Partition and
    /// record failures are reported in the [`HarvestReport`] instead.
    pub async fn run(&self, progress: &HarvestProgress) -> Result<HarvestReport, HarvestError> {
        self.config.validate()?;

        let agencies = self.api.list_agencies().await?;
        log::info!("Found {} agencies", agencies.len());

        self.harvest(&agencies, progress).await
    }

    /// Harvests every partition of `agencies` over the configured years and
    /// writes the summary table.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError`] if the configuration is invalid, the data
    /// directories cannot be created, or the summary table cannot be
    /// written.
    pub async fn harvest(
        &self,
        agencies: &[Agency],
        progress: &HarvestProgress,
    ) -> Result<HarvestReport, HarvestError> {
        self.config.validate()?;

        ensure_dir(&self.config.data_dir)?;
        for year in self.config.years() {
            ensure_dir(&year_dir(&self.config.data_dir, year))?;
        }

        let all_keys: Vec<PartitionKey> = self
            .config
            .years()
            .flat_map(|year| {
                agencies
                    .iter()
                    .map(move |agency| PartitionKey::new(year, agency))
            })
            .collect();
        let (keys, mut failed_partitions) = self.claim_cache_paths(all_keys);

        progress.partitions.set_total(keys.len() as u64);
        progress.partitions.set_message("partitions".to_owned());
        progress.records.set_message("records".to_owned());

        let scheduler = Scheduler::new("partition", self.config.partition_concurrency);
        let outcomes = scheduler
            .run(keys.iter().map(|key| async move {
                let result = self.process_partition(key, progress).await;
                progress.partitions.inc(1);
                result
            }))
            .await;

        let mut partitions = Vec::with_capacity(outcomes.len());
        let mut records = Vec::new();

        for outcome in outcomes {
            match outcome.result {
                Ok(PartitionOutcome {
                    summary,
                    records: partition_records,
                }) => {
                    records.extend(partition_records);
                    partitions.push(summary);
                }
                Err(e) => failed_partitions.push(PartitionFailure {
                    key: keys[outcome.index].clone(),
                    error: e.to_string(),
                }),
            }
        }

        log::info!("Number of records: {}", records.len());

        let summary_path = self.config.summary_path();
        write_summary(&records, &summary_path, &self.config)?;

        progress.partitions.finish(format!(
            "{} partitions, {} failed",
            partitions.len(),
            failed_partitions.len()
        ));
        progress
            .records
            .finish(format!("{} records", records.len()));

        Ok(HarvestReport {
            partitions,
            failed_partitions,
            record_count: records.len(),
            summary_path,
        })
    }

    /// Keeps the first key for every cache path. Later keys whose agency
    /// name sanitizes to an already claimed file are failed up front so two
    /// agencies never share, or race on, one cache file.
    fn claim_cache_paths(
        &self,
        keys: Vec<PartitionKey>,
    ) -> (Vec<PartitionKey>, Vec<PartitionFailure>) {
        let mut owners: BTreeMap<PathBuf, (AgencyId, String)> = BTreeMap::new();
        let mut claimed = Vec::with_capacity(keys.len());
        let mut collisions = Vec::new();

        for key in keys {
            let path = self.store.path_for(&key);
            if let Some((owner_id, owner_name)) = owners.get(&path) {
                let error = format!(
                    "cache file {} already belongs to agency {owner_name} ({owner_id})",
                    path.display()
                );
                log::error!("Skipping {key} (agency {}): {error}", key.agency_id);
                collisions.push(PartitionFailure { key, error });
            } else {
                owners.insert(path, (key.agency_id, key.agency_name.clone()));
                claimed.push(key);
            }
        }

        (claimed, collisions)
    }

    async fn process_partition(
        &self,
        key: &PartitionKey,
        progress: &HarvestProgress,
    ) -> Result<PartitionOutcome, HarvestError> {
        if self.store.has(key) {
            log::info!(
                "Reading file {} for breakdown data for {key}",
                self.store.path_for(key).display()
            );
            let records = self.store.load(key)?;
            return Ok(PartitionOutcome {
                summary: PartitionSummary {
                    key: key.clone(),
                    source: PartitionSource::Cache,
                    record_count: records.len(),
                    failed_records: Vec::new(),
                    cache_error: None,
                },
                records,
            });
        }

        log::info!("Fetching breakdown data for {key}");
        let listing = self.api.list_partition_records(key.year, key.agency_id).await?;
        log::info!("{} records for {key}", listing.len());
        progress.records.add_total(listing.len() as u64);

        let enricher = RecordEnricher::new(self.api.as_ref(), &self.coordinates);
        let enricher = &enricher;
        let scheduler = Scheduler::new("record", self.config.record_concurrency);
        let outcomes = scheduler
            .run(listing.into_iter().map(|record| async move {
                let result = enricher.enrich(record).await;
                progress.records.inc(1);
                result
            }))
            .await;

        let (mut records, failures) = split(outcomes);
        for record in &mut records {
            record.insert("agencyId".to_owned(), Value::from(key.agency_id));
            record.insert(
                "agencyName".to_owned(),
                Value::String(key.agency_name.clone()),
            );
        }

        if !failures.is_empty() {
            log::warn!(
                "Encountered {} errors for {key}, caching the partial result",
                failures.len()
            );
        }

        let cache_error = match self.store.save(key, &records) {
            Ok(path) => {
                log::debug!("Wrote {} records to {}", records.len(), path.display());
                None
            }
            Err(e) => {
                log::error!("Could not cache {key}, keeping its records for this run: {e}");
                Some(e.to_string())
            }
        };

        Ok(PartitionOutcome {
            summary: PartitionSummary {
                key: key.clone(),
                source: PartitionSource::Fetched,
                record_count: records.len(),
                failed_records: failures
                    .into_iter()
                    .map(|(index, e)| RecordFailure {
                        index,
                        error: e.to_string(),
                    })
                    .collect(),
                cache_error,
            },
            records,
        })
    }
}

/// Rebuilds the summary table from the cache files of the configured years
/// without touching the network.
///
/// # Errors
///
/// Returns [`HarvestError`] if a cache file cannot be read or the summary
/// table cannot be written.
pub fn rebuild_summary(config: &HarvestConfig) -> Result<RebuiltTable, HarvestError> {
    config.validate()?;

    let store = PartitionStore::new(&config.data_dir);
    let years = config.years();

    let mut partition_count = 0;
    let mut records = Vec::new();
    for cached in store.cached_partitions()? {
        if !years.contains(&cached.year) {
            continue;
        }
        log::info!("Reading file {}", cached.path.display());
        records.extend(load_path(&cached.path)?);
        partition_count += 1;
    }

    log::info!("Number of records: {}", records.len());

    let summary_path = config.summary_path();
    write_summary(&records, &summary_path, config)?;

    Ok(RebuiltTable {
        partition_count,
        record_count: records.len(),
        summary_path,
    })
}

fn write_summary(
    records: &[FlatRecord],
    path: &Path,
    config: &HarvestConfig,
) -> Result<(), HarvestError> {
    let table = madzi_table::to_table(records, config.table_format)?;
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    std::fs::write(path, table)?;
    log::info!("Wrote summary table to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use madzi_api::ApiError;
    use madzi_api_models::{
        AgencyId, AnswerId, CoarseLocationRecord, DetailRecord, SecondarySourceRecord,
    };
    use serde_json::json;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("madzi_pipeline_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn agency(id: AgencyId, name: &str) -> Agency {
        Agency {
            id,
            name: name.to_owned(),
            address: None,
            agency_code: None,
            comment: None,
            phone: None,
            agency_additional_pinpoints: Vec::new(),
            agency_water_sources: Vec::new(),
        }
    }

    fn config(data_dir: &Path, years: std::ops::RangeInclusive<i32>) -> HarvestConfig {
        HarvestConfig {
            data_dir: data_dir.to_path_buf(),
            first_year: *years.start(),
            last_year: *years.end(),
            ..HarvestConfig::default()
        }
    }

    fn failure() -> ApiError {
        ApiError::Status {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            url: "https://madzi.test/".to_owned(),
        }
    }

    /// In-memory API. Every partition lists `records_per_partition` rows;
    /// every detail points at `source_code`. Answer ids are
    /// `year * 10_000 + agency * 1_000 + row`.
    struct FakeApi {
        agencies: Vec<Agency>,
        records_per_partition: usize,
        source_code: String,
        failing_listings: Vec<(i32, AgencyId)>,
        failing_sources: Vec<String>,
        failing_details: Vec<AnswerId>,
        agency_calls: AtomicUsize,
        listing_calls: AtomicUsize,
        detail_calls: AtomicUsize,
        source_calls: Mutex<BTreeMap<String, usize>>,
    }

    impl FakeApi {
        fn new(agencies: Vec<Agency>, records_per_partition: usize) -> Self {
            Self {
                agencies,
                records_per_partition,
                source_code: "ABC".to_owned(),
                failing_listings: Vec::new(),
                failing_sources: Vec::new(),
                failing_details: Vec::new(),
                agency_calls: AtomicUsize::new(0),
                listing_calls: AtomicUsize::new(0),
                detail_calls: AtomicUsize::new(0),
                source_calls: Mutex::new(BTreeMap::new()),
            }
        }

        fn network_calls(&self) -> usize {
            self.listing_calls.load(Ordering::SeqCst)
                + self.detail_calls.load(Ordering::SeqCst)
                + self.source_calls.lock().unwrap().values().sum::<usize>()
        }
    }

    #[async_trait]
    impl MadziApi for FakeApi {
        async fn list_agencies(&self) -> Result<Vec<Agency>, ApiError> {
            self.agency_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.agencies.clone())
        }

        async fn list_partition_records(
            &self,
            year: i32,
            agency_id: AgencyId,
        ) -> Result<Vec<CoarseLocationRecord>, ApiError> {
            self.listing_calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.failing_listings.contains(&(year, agency_id)) {
                return Err(failure());
            }

            Ok((0..self.records_per_partition)
                .map(|i| {
                    let answer_id =
                        i64::from(year) * 10_000 + agency_id * 1_000 + i64::try_from(i).unwrap();
                    serde_json::from_value(json!({
                        "answerId": answer_id,
                        "locationId": format!("L{i}"),
                        "visitDate": format!("{year}-06-01")
                    }))
                    .unwrap()
                })
                .collect())
        }

        async fn record_detail(&self, answer_id: AnswerId) -> Result<DetailRecord, ApiError> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.failing_details.contains(&answer_id) {
                return Err(failure());
            }
            Ok(serde_json::from_value(json!({
                "answerId": answer_id,
                "newSourceCode": self.source_code,
                "informationSection": [
                    { "questionId": 472, "questionText": "How many strokes?", "answerText": "48" }
                ]
            }))
            .unwrap())
        }

        async fn secondary_source(&self, code: &str) -> Result<SecondarySourceRecord, ApiError> {
            *self
                .source_calls
                .lock()
                .unwrap()
                .entry(code.to_owned())
                .or_default() += 1;
            tokio::task::yield_now().await;
            if self.failing_sources.iter().any(|c| c == code) {
                return Err(failure());
            }
            Ok(
                serde_json::from_value(json!({ "code": code, "sourceLatLng": [-15.78, 35.0] }))
                    .unwrap(),
            )
        }
    }

    #[tokio::test]
    async fn fresh_run_writes_partitions_and_summary() {
        let dir = scratch_dir("fresh");
        let api = Arc::new(FakeApi::new(
            vec![agency(1, "Alpha"), agency(2, "Beta/Gamma")],
            2,
        ));
        let harvester = Harvester::new(api.clone(), config(&dir, 2020..=2021));

        let report = harvester.run(&HarvestProgress::default()).await.unwrap();

        assert_eq!(api.agency_calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.partitions.len(), 4);
        assert_eq!(report.count_from(PartitionSource::Fetched), 4);
        assert_eq!(report.record_count, 8);
        assert!(report.is_complete());

        let keys: Vec<(i32, AgencyId)> = report
            .partitions
            .iter()
            .map(|p| (p.key.year, p.key.agency_id))
            .collect();
        assert_eq!(keys, vec![(2020, 1), (2020, 2), (2021, 1), (2021, 2)]);

        let cached = load_path(&dir.join("2021").join("Beta-Gamma.json")).unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0]["agencyId"], json!(2));
        assert_eq!(cached[0]["agencyName"], json!("Beta/Gamma"));
        assert_eq!(cached[0]["472 : How many strokes?"], json!("48"));
        assert_eq!(cached[0]["latitude"], json!(-15.78));

        let table = std::fs::read_to_string(dir.join("data.csv")).unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 9);
        assert!(lines[0].starts_with("\"answerId\",\"locationId\",\"visitDate\""));
        assert!(lines[0].contains("\"agencyName\""));
        assert!(lines[1].starts_with("\"20201000\","));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn cached_partitions_make_no_network_calls() {
        let dir = scratch_dir("rerun");
        let agencies = vec![agency(1, "Alpha"), agency(2, "Beta")];

        let first = Arc::new(FakeApi::new(agencies.clone(), 3));
        Harvester::new(first.clone(), config(&dir, 2019..=2020))
            .harvest(&agencies, &HarvestProgress::default())
            .await
            .unwrap();
        assert!(first.network_calls() > 0);
        let first_table = std::fs::read_to_string(dir.join("data.csv")).unwrap();

        let second = Arc::new(FakeApi::new(agencies.clone(), 3));
        let report = Harvester::new(second.clone(), config(&dir, 2019..=2020))
            .harvest(&agencies, &HarvestProgress::default())
            .await
            .unwrap();

        assert_eq!(second.network_calls(), 0);
        assert_eq!(report.count_from(PartitionSource::Cache), 4);
        assert_eq!(report.record_count, 12);
        assert_eq!(
            std::fs::read_to_string(dir.join("data.csv")).unwrap(),
            first_table
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn hundred_records_sharing_a_code_fetch_the_source_once() {
        let dir = scratch_dir("single_flight");
        let api = Arc::new(FakeApi::new(vec![agency(7, "Busy")], 100));
        let harvester = Harvester::new(api.clone(), config(&dir, 2022..=2022));

        let report = harvester.run(&HarvestProgress::default()).await.unwrap();

        assert_eq!(report.record_count, 100);
        assert_eq!(api.detail_calls.load(Ordering::SeqCst), 100);
        assert_eq!(api.source_calls.lock().unwrap().get("ABC"), Some(&1));
        assert_eq!(harvester.coordinates().len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_listing_leaves_sibling_partitions_intact() {
        let dir = scratch_dir("failed_listing");
        let mut api = FakeApi::new(vec![agency(1, "Alpha"), agency(2, "Beta")], 2);
        api.failing_listings.push((2020, 2));
        let api = Arc::new(api);
        let harvester = Harvester::new(api.clone(), config(&dir, 2020..=2021));

        let report = harvester.run(&HarvestProgress::default()).await.unwrap();

        assert_eq!(report.partitions.len(), 3);
        assert_eq!(report.failed_partitions.len(), 1);
        assert_eq!(report.failed_partitions[0].key.year, 2020);
        assert_eq!(report.failed_partitions[0].key.agency_id, 2);
        assert!(!report.is_complete());
        assert_eq!(report.record_count, 6);
        assert!(!dir.join("2020").join("Beta.json").exists());
        assert!(dir.join("2021").join("Beta.json").exists());

        let table = std::fs::read_to_string(dir.join("data.csv")).unwrap();
        assert_eq!(table.lines().count(), 7);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_shared_source_leaves_both_records_without_coordinates() {
        let dir = scratch_dir("failed_source");
        let mut api = FakeApi::new(vec![agency(3, "Gamma")], 2);
        api.source_code = "BROKEN".to_owned();
        api.failing_sources.push("BROKEN".to_owned());
        let api = Arc::new(api);
        let harvester = Harvester::new(api.clone(), config(&dir, 2018..=2018));

        let report = harvester.run(&HarvestProgress::default()).await.unwrap();

        assert_eq!(report.record_count, 2);
        assert!(report.is_complete());
        assert_eq!(api.source_calls.lock().unwrap().get("BROKEN"), Some(&1));

        let cached = load_path(&dir.join("2018").join("Gamma.json")).unwrap();
        assert_eq!(cached.len(), 2);
        for record in &cached {
            assert!(!record.contains_key("latitude"));
            assert!(!record.contains_key("longitude"));
            assert_eq!(record["newSourceCode"], json!("BROKEN"));
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn rebuild_reads_only_cache_files_in_range() {
        let dir = scratch_dir("rebuild");
        let agencies = vec![agency(1, "Alpha")];
        let api = Arc::new(FakeApi::new(agencies.clone(), 2));
        Harvester::new(api, config(&dir, 2010..=2012))
            .harvest(&agencies, &HarvestProgress::default())
            .await
            .unwrap();
        std::fs::remove_file(dir.join("data.csv")).unwrap();

        let rebuilt = rebuild_summary(&config(&dir, 2011..=2012)).unwrap();

        assert_eq!(rebuilt.partition_count, 2);
        assert_eq!(rebuilt.record_count, 4);
        let table = std::fs::read_to_string(&rebuilt.summary_path).unwrap();
        assert_eq!(table.lines().count(), 5);
        assert!(!table.contains("\"2010"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_details_leave_a_partial_partition() {
        let dir = scratch_dir("failed_details");
        let mut api = FakeApi::new(vec![agency(4, "Delta")], 4);
        api.failing_details.extend([20_174_001, 20_174_003]);
        let api = Arc::new(api);
        let harvester = Harvester::new(api.clone(), config(&dir, 2017..=2017));

        let report = harvester.run(&HarvestProgress::default()).await.unwrap();

        assert!(report.failed_partitions.is_empty());
        assert!(!report.is_complete());
        assert_eq!(report.failed_record_count(), 2);
        assert_eq!(report.record_count, 2);

        let partition = &report.partitions[0];
        assert_eq!(partition.source, PartitionSource::Fetched);
        assert_eq!(partition.record_count, 2);
        let indices: Vec<usize> = partition.failed_records.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert!(partition.cache_error.is_none());

        let cached = load_path(&dir.join("2017").join("Delta.json")).unwrap();
        let ids: Vec<&Value> = cached.iter().map(|r| &r["answerId"]).collect();
        assert_eq!(ids, vec![&json!(20_174_000), &json!(20_174_002)]);

        let table = std::fs::read_to_string(dir.join("data.csv")).unwrap();
        assert_eq!(table.lines().count(), 3);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn agencies_sharing_a_cache_file_keep_the_first() {
        let dir = scratch_dir("shared_file");
        let api = Arc::new(FakeApi::new(vec![agency(1, "A/B"), agency(2, "A-B")], 2));
        let harvester = Harvester::new(api.clone(), config(&dir, 2016..=2016));

        let report = harvester.run(&HarvestProgress::default()).await.unwrap();

        assert_eq!(api.listing_calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.partitions.len(), 1);
        assert_eq!(report.partitions[0].key.agency_id, 1);
        assert_eq!(report.failed_partitions.len(), 1);
        assert_eq!(report.failed_partitions[0].key.agency_id, 2);
        assert!(report.failed_partitions[0].error.contains("A-B.json"));
        assert!(report.failed_partitions[0].error.contains("agency A/B (1)"));
        assert!(!report.is_complete());

        let cached = load_path(&dir.join("2016").join("A-B.json")).unwrap();
        assert_eq!(cached.len(), 2);
        assert!(cached.iter().all(|r| r["agencyId"] == json!(1)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unwritable_cache_file_keeps_records_in_the_summary() {
        let dir = scratch_dir("unwritable");
        std::fs::create_dir_all(dir.join("2015").join("Echo.json")).unwrap();
        let agencies = vec![agency(5, "Echo"), agency(6, "Foxtrot")];
        let api = Arc::new(FakeApi::new(agencies.clone(), 3));
        let harvester = Harvester::new(api.clone(), config(&dir, 2015..=2015));

        let report = harvester
            .harvest(&agencies, &HarvestProgress::default())
            .await
            .unwrap();

        assert!(report.failed_partitions.is_empty());
        assert_eq!(report.record_count, 6);
        assert!(!report.is_complete());

        let echo = &report.partitions[0];
        assert_eq!(echo.key.agency_id, 5);
        assert_eq!(echo.record_count, 3);
        assert!(echo.cache_error.is_some());
        assert!(!dir.join("2015").join("Echo.json.partial").exists());
        assert!(report.partitions[1].cache_error.is_none());
        assert!(dir.join("2015").join("Foxtrot.json").is_file());

        let table = std::fs::read_to_string(dir.join("data.csv")).unwrap();
        assert_eq!(table.lines().count(), 7);
        assert!(table.contains("\"Echo\""));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn inverted_year_range_fails_before_any_call() {
        let dir = scratch_dir("inverted");
        let api = Arc::new(FakeApi::new(vec![agency(1, "Alpha")], 1));
        let harvester = Harvester::new(api.clone(), config(&dir, 2022..=2021));

        let err = harvester.run(&HarvestProgress::default()).await.unwrap_err();

        assert!(matches!(err, HarvestError::Config { .. }));
        assert_eq!(api.agency_calls.load(Ordering::SeqCst), 0);
        assert!(!dir.exists());
    }
}
