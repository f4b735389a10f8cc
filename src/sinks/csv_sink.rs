use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::carry_forward;
use crate::errors::SinkError;
use crate::models::{canonical_address, index_labels, AddressLabel, Evidence, ExistingLabels, LabelKind};
use crate::sinks::LabelSink;

const FILE_PREFIX: &str = "address_labels_";
const FILE_SUFFIX: &str = ".csv";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// One CSV line. Evidence is embedded as a JSON string.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    address: String,
    label: String,
    confidence: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    source_rule: String,
    #[serde(default)]
    evidence: String,
}

impl CsvRow {
    fn from_label(label: &AddressLabel) -> Result<Self, SinkError> {
        Ok(Self {
            address: label.address.clone(),
            label: label.kind.as_str().to_string(),
            confidence: label.confidence,
            created_at: label.created_at,
            updated_at: label.updated_at,
            source_rule: label.source_rule.clone(),
            evidence: serde_json::to_string(&label.evidence)?,
        })
    }

    fn into_label(self) -> Result<AddressLabel, SinkError> {
        let address = canonical_address(&self.address)
            .ok_or_else(|| SinkError::Malformed(format!("invalid address {:?}", self.address)))?;
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(SinkError::Malformed(format!(
                "confidence {} out of range for {address}",
                self.confidence
            )));
        }
        let evidence: Evidence = if self.evidence.trim().is_empty() {
            Evidence::new()
        } else {
            serde_json::from_str(&self.evidence)?
        };

        Ok(AddressLabel {
            address,
            kind: LabelKind::from(self.label),
            confidence: self.confidence,
            source_rule: self.source_rule,
            evidence,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Writes the full label set to `address_labels_<YYYYMMDD_HHMMSS>.csv` in the
/// output directory on every run. The newest such file is the previous state.
#[derive(Debug, Clone)]
pub struct CsvLabelSink {
    dir: PathBuf,
}

impl CsvLabelSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name_for(stamp: DateTime<Utc>) -> String {
        format!("{FILE_PREFIX}{}{FILE_SUFFIX}", stamp.format(STAMP_FORMAT))
    }

    fn is_label_file(name: &str) -> bool {
        name.strip_prefix(FILE_PREFIX)
            .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
            .is_some_and(|stamp| {
                stamp.len() == 15 && stamp.chars().all(|c| c.is_ascii_digit() || c == '_')
            })
    }

    /// Export time encoded in a label file's name.
    fn stamp_of(path: &Path) -> Option<DateTime<Utc>> {
        let stamp = path
            .file_name()?
            .to_str()?
            .strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_SUFFIX)?;
        NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Newest export in the output directory; the stamp sorts lexicographically.
    pub async fn latest_file(&self) -> Result<Option<PathBuf>, SinkError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut newest: Option<String> = None;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if Self::is_label_file(&name) && newest.as_deref().map_or(true, |n| name.as_str() > n) {
                newest = Some(name);
            }
        }

        Ok(newest.map(|name| self.dir.join(name)))
    }

    fn decode(bytes: &[u8]) -> Result<Vec<AddressLabel>, SinkError> {
        let mut reader = csv::Reader::from_reader(bytes);
        let mut labels = Vec::new();
        for row in reader.deserialize::<CsvRow>() {
            labels.push(row?.into_label()?);
        }
        Ok(labels)
    }

    fn encode(labels: &[AddressLabel]) -> Result<Vec<u8>, SinkError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for label in labels {
            writer.serialize(CsvRow::from_label(label)?)?;
        }
        writer
            .into_inner()
            .map_err(|e| SinkError::Io(e.into_error()))
    }

    async fn read_file(path: &Path) -> Result<Vec<AddressLabel>, SinkError> {
        let bytes = tokio::fs::read(path).await?;
        let labels = Self::decode(&bytes)?;
        tracing::info!(path = %path.display(), count = labels.len(), "Loaded existing labels");
        Ok(labels)
    }

    async fn read_latest(&self) -> Result<Vec<AddressLabel>, SinkError> {
        match self.latest_file().await? {
            Some(path) => Self::read_file(&path).await,
            None => Ok(Vec::new()),
        }
    }
}

impl LabelSink for CsvLabelSink {
    async fn load_existing(&self) -> Result<ExistingLabels, SinkError> {
        Ok(index_labels(self.read_latest().await?))
    }

    /// Writes earlier labels plus `labels` to a new file named after the run
    /// time (the latest `updated_at`). The name never sorts before the newest
    /// existing export, otherwise the next load would miss this write.
    async fn persist(&self, labels: &[AddressLabel]) -> Result<usize, SinkError> {
        let latest = self.latest_file().await?;
        let existing = match &latest {
            Some(path) => index_labels(Self::read_file(path).await?),
            None => ExistingLabels::new(),
        };
        let all = carry_forward(&existing, labels);

        let run_stamp = labels
            .iter()
            .map(|l| l.updated_at)
            .max()
            .unwrap_or_else(Utc::now);
        let stamp = match latest.as_deref().and_then(Self::stamp_of) {
            Some(newest) if newest > run_stamp => {
                tracing::warn!(
                    run_stamp = %run_stamp,
                    newest_export = %newest,
                    "Run time precedes newest export, reusing its stamp"
                );
                newest
            }
            _ => run_stamp,
        };
        let path = self.dir.join(Self::file_name_for(stamp));
        let tmp = path.with_extension("csv.tmp");

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&tmp, Self::encode(&all)?).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::info!(path = %path.display(), count = all.len(), "Labels exported");
        Ok(all.len())
    }

    async fn prepare(&self) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn check(&self) -> Result<(), SinkError> {
        let labels = self.read_latest().await?;
        if labels.is_empty() {
            tracing::info!(dir = %self.dir.display(), "No earlier label export found");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    fn make_label(address: &str, kind: LabelKind, confidence: f64, at: DateTime<Utc>) -> AddressLabel {
        let mut evidence = Evidence::new();
        evidence.insert("eth_balance".into(), json!("1500"));
        AddressLabel {
            address: address.into(),
            kind,
            confidence,
            source_rule: "whale/v1:eth_balance >= 1000".into(),
            evidence,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_file_name_for() {
        assert_eq!(CsvLabelSink::file_name_for(t0()), "address_labels_20240102_030405.csv");
        assert!(CsvLabelSink::is_label_file("address_labels_20240102_030405.csv"));
        assert!(!CsvLabelSink::is_label_file("address_labels_latest.csv"));
        assert!(!CsvLabelSink::is_label_file("address_labels_20240102_030405.csv.tmp"));
    }

    #[tokio::test]
    async fn test_empty_dir_has_no_existing_labels() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvLabelSink::new(dir.path().join("missing"));
        assert!(sink.load_existing().await.unwrap().is_empty());
        assert!(sink.check().await.is_ok());
    }

    #[tokio::test]
    async fn test_persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvLabelSink::new(dir.path());
        let labels = vec![
            make_label("0x00000000000000000000000000000000000000aa", LabelKind::Whale, 0.625, t0()),
            make_label("0x00000000000000000000000000000000000000bb", LabelKind::NftTrader, 0.9, t0()),
        ];

        assert_eq!(sink.persist(&labels).await.unwrap(), 2);
        assert!(dir.path().join("address_labels_20240102_030405.csv").exists());

        let existing = sink.load_existing().await.unwrap();
        assert_eq!(existing.len(), 2);
        let whale = &existing[&labels[0].key()];
        assert_eq!(whale, &labels[0]);
    }

    #[tokio::test]
    async fn test_persist_carries_earlier_labels_forward() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvLabelSink::new(dir.path());
        let first = make_label("0x00000000000000000000000000000000000000aa", LabelKind::Whale, 0.5, t0());
        sink.persist(std::slice::from_ref(&first)).await.unwrap();

        let later = t0() + Duration::days(1);
        let second = make_label("0x00000000000000000000000000000000000000bb", LabelKind::DexUser, 0.3, later);
        assert_eq!(sink.persist(std::slice::from_ref(&second)).await.unwrap(), 2);

        let latest = sink.latest_file().await.unwrap().unwrap();
        assert!(latest.ends_with("address_labels_20240103_030405.csv"));

        let existing = sink.load_existing().await.unwrap();
        assert_eq!(existing.len(), 2);
        assert_eq!(existing[&first.key()].created_at, t0());
    }

    #[tokio::test]
    async fn test_backdated_persist_is_not_shadowed() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvLabelSink::new(dir.path());
        let later = t0() + Duration::days(1);
        let first = make_label("0x00000000000000000000000000000000000000aa", LabelKind::Whale, 0.5, later);
        sink.persist(std::slice::from_ref(&first)).await.unwrap();

        let backdated = make_label("0x00000000000000000000000000000000000000bb", LabelKind::DexUser, 0.3, t0());
        assert_eq!(sink.persist(std::slice::from_ref(&backdated)).await.unwrap(), 2);

        let latest = sink.latest_file().await.unwrap().unwrap();
        assert!(latest.ends_with("address_labels_20240103_030405.csv"));
        assert!(!dir.path().join("address_labels_20240102_030405.csv").exists());

        let existing = sink.load_existing().await.unwrap();
        assert_eq!(existing.len(), 2);
        assert_eq!(existing[&first.key()].created_at, later);
        assert_eq!(existing[&backdated.key()], backdated);
    }

    #[test]
    fn test_stamp_of_parses_file_name() {
        let path = Path::new("/tmp/out/address_labels_20240102_030405.csv");
        assert_eq!(CsvLabelSink::stamp_of(path), Some(t0()));
        assert_eq!(CsvLabelSink::stamp_of(Path::new("address_labels_latest.csv")), None);
    }

    #[tokio::test]
    async fn test_load_rejects_out_of_range_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let content = "address,label,confidence,created_at,updated_at,source_rule,evidence\n\
            0x00000000000000000000000000000000000000aa,whale,1.5,2024-01-01T00:00:00Z,2024-01-01T00:00:00Z,whale/v1,{}\n";
        std::fs::write(dir.path().join("address_labels_20240101_000000.csv"), content).unwrap();

        let sink = CsvLabelSink::new(dir.path());
        assert!(matches!(sink.load_existing().await, Err(SinkError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_load_canonicalises_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let content = "address,label,confidence,created_at,updated_at,source_rule,evidence\n\
            0x00000000000000000000000000000000000000AA,whale,0.7,2024-01-01T00:00:00Z,2024-01-01T00:00:00Z,whale/v1,\n";
        std::fs::write(dir.path().join("address_labels_20240101_000000.csv"), content).unwrap();

        let existing = CsvLabelSink::new(dir.path()).load_existing().await.unwrap();
        let label = existing.values().next().unwrap();
        assert_eq!(label.address, "0x00000000000000000000000000000000000000aa");
        assert!(label.evidence.is_empty());
    }
}
