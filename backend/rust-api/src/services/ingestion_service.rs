use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;

use crate::ingest::{run_import, ImportProfile, IngestError, ReportSink};
use crate::metrics::{record_import_rows, IMPORT_DURATION_SECONDS, IMPORT_RUNS_TOTAL};
use crate::models::UploadResult;

use super::object_storage::ObjectStorageClient;

#[derive(Debug, thiserror::Error)]
pub enum ImportFailure {
    /// The workbook itself is unusable; nothing was written
    #[error(transparent)]
    Rejected(#[from] IngestError),
    #[error("object storage unavailable: {0}")]
    Archive(anyhow::Error),
    #[error("failed to store report rows: {0}")]
    Storage(anyhow::Error),
    #[error("file {0} is not an upload of this shop and import type")]
    ForeignFile(String),
}

pub struct ImportRequest {
    pub shop_id: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Archives the upload, parses it off the async runtime and stores the rows.
pub struct IngestionService {
    sink: Arc<dyn ReportSink>,
    object_storage: Option<ObjectStorageClient>,
    max_upload_bytes: usize,
}

impl IngestionService {
    pub fn new(
        sink: Arc<dyn ReportSink>,
        object_storage: Option<ObjectStorageClient>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            sink,
            object_storage,
            max_upload_bytes,
        }
    }

    pub async fn import(
        &self,
        profile: &'static ImportProfile,
        request: ImportRequest,
    ) -> Result<UploadResult, ImportFailure> {
        let file_ref = self.archive(profile, &request).await;
        self.import_bytes(profile, &request.shop_id, request.bytes, file_ref)
            .await
    }

    /// Runs an archived upload again, e.g. after a parser fix.
    ///
    /// Only files archived for the same shop and import type are accepted.
    pub async fn reimport(
        &self,
        profile: &'static ImportProfile,
        shop_id: &str,
        file_ref: &str,
    ) -> Result<UploadResult, ImportFailure> {
        let storage = self
            .object_storage
            .as_ref()
            .ok_or_else(|| ImportFailure::Archive(anyhow!("object storage is not configured")))?;
        if !storage.owns_upload(file_ref, shop_id, profile.name) {
            tracing::warn!(
                profile = profile.name,
                shop_id = %shop_id,
                file_ref = %file_ref,
                "reimport refused for a file outside the shop's uploads"
            );
            return Err(ImportFailure::ForeignFile(file_ref.to_string()));
        }
        let bytes = storage
            .download_bytes(file_ref, self.max_upload_bytes)
            .await
            .map_err(ImportFailure::Archive)?;

        self.import_bytes(profile, shop_id, bytes, Some(file_ref.to_string()))
            .await
    }

    async fn archive(&self, profile: &ImportProfile, request: &ImportRequest) -> Option<String> {
        let storage = self.object_storage.as_ref()?;
        let key = storage.build_upload_key(&request.shop_id, profile.name, &request.file_name);

        match storage
            .upload_bytes(&key, request.bytes.clone(), content_type_for(&request.file_name))
            .await
        {
            Ok(file_ref) => Some(file_ref),
            Err(err) => {
                tracing::warn!(
                    shop_id = %request.shop_id,
                    error = %err,
                    "failed to archive upload, importing without a file reference"
                );
                None
            }
        }
    }

    async fn import_bytes(
        &self,
        profile: &'static ImportProfile,
        shop_id: &str,
        bytes: Vec<u8>,
        file_ref: Option<String>,
    ) -> Result<UploadResult, ImportFailure> {
        let started = Instant::now();

        let parsed = tokio::task::spawn_blocking(move || run_import(profile, bytes))
            .await
            .map_err(|err| ImportFailure::Storage(anyhow!("import task failed: {}", err)))?;

        let batch = match parsed {
            Ok(batch) => batch,
            Err(err) => {
                IMPORT_RUNS_TOTAL
                    .with_label_values(&[profile.name, "rejected"])
                    .inc();
                tracing::warn!(profile = profile.name, shop_id = %shop_id, error = %err, "import rejected");
                return Err(err.into());
            }
        };

        let upserted = match self
            .sink
            .upsert_reports(profile, shop_id, &batch.records)
            .await
        {
            Ok(upserted) => upserted,
            Err(err) => {
                IMPORT_RUNS_TOTAL
                    .with_label_values(&[profile.name, "error"])
                    .inc();
                return Err(ImportFailure::Storage(err));
            }
        };

        let mut result = batch.result;
        result.upserted_rows = upserted;
        result.file_ref = file_ref;

        let outcome = if result.skipped_count > 0 { "partial" } else { "success" };
        IMPORT_RUNS_TOTAL
            .with_label_values(&[profile.name, outcome])
            .inc();
        record_import_rows(profile.name, result.processed_rows, result.skipped_count);
        IMPORT_DURATION_SECONDS
            .with_label_values(&[profile.name])
            .observe(started.elapsed().as_secs_f64());

        tracing::info!(
            profile = profile.name,
            shop_id = %shop_id,
            total_rows = result.total_rows,
            processed_rows = result.processed_rows,
            skipped = result.skipped_count,
            upserted = result.upserted_rows,
            "import finished"
        );

        Ok(result)
    }
}

fn content_type_for(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".xlsx") {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    } else if lower.ends_with(".xls") {
        "application/vnd.ms-excel"
    } else if lower.ends_with(".ods") {
        "application/vnd.oasis.opendocument.spreadsheet"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::profile::ADS;
    use crate::ingest::MemoryReportSink;

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for("a.XLSX"), "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet");
        assert_eq!(content_type_for("a.xls"), "application/vnd.ms-excel");
        assert_eq!(content_type_for("a.csv"), "application/octet-stream");
    }

    #[tokio::test]
    async fn unreadable_upload_is_rejected_without_writes() {
        let sink = Arc::new(MemoryReportSink::new());
        let service = IngestionService::new(sink.clone(), None, 1024 * 1024);

        let err = service
            .import(
                &ADS,
                ImportRequest {
                    shop_id: "shop-1".into(),
                    file_name: "ads.xlsx".into(),
                    bytes: b"garbage".to_vec(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ImportFailure::Rejected(IngestError::Workbook(_))));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn reimport_needs_object_storage() {
        let service = IngestionService::new(Arc::new(MemoryReportSink::new()), None, 1024);
        let err = service.reimport(&ADS, "shop-1", "imports/x.xlsx").await.unwrap_err();
        assert!(matches!(err, ImportFailure::Archive(_)));
    }

    #[tokio::test]
    async fn reimport_refuses_another_shops_upload() {
        let storage = ObjectStorageClient::new(crate::config::ObjectStorageSettings {
            bucket: "shop-uploads".into(),
            region: "ap-southeast-1".into(),
            endpoint: Some("https://storage.invalid".into()),
            access_key: "key".into(),
            secret_key: "secret".into(),
            uploads_prefix: String::new(),
        })
        .unwrap();
        let sink = Arc::new(MemoryReportSink::new());
        let service = IngestionService::new(sink.clone(), Some(storage), 1024);

        let err = service
            .reimport(&ADS, "shop-2", "imports/shop-1/ads/20240301T000000-t3.xlsx")
            .await
            .unwrap_err();

        assert!(matches!(err, ImportFailure::ForeignFile(_)));
        assert!(sink.is_empty());
    }
}
