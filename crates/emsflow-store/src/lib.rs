//! REST persistence gateway for emsflow.
//!
//! Talks to a PostgREST-style backend (`/rest/v1/...` tables plus a
//! `/storage/v1/object/...` bucket API) and implements the
//! [`EstimateStore`] seam the pipeline is written against. All
//! idempotency lives here: estimates upsert by number or file
//! fingerprint, line items are replaced wholesale, parts insert with
//! duplicate resolution, processing logs append only.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use emsflow_core::assoc::ImageKind;
use emsflow_core::error::StoreError;
use emsflow_core::models::{
    Estimate, LineItem, Part, ProcessingLogEntry, ProcessingStats, ProcessingStatus, StoreConfig,
};
use emsflow_core::ocr::OcrText;
use emsflow_core::store::{EstimateRef, EstimateStore, ImageRef, UpsertOutcome};

const ESTIMATES: &str = "estimates";
const LINE_ITEMS: &str = "estimate_line_items";
const PARTS: &str = "parts";
const IMAGES: &str = "estimate_images";
const LOGS: &str = "processing_logs";

/// [`EstimateStore`] backed by a PostgREST-style REST API.
pub struct RestStore {
    client: Client,
    base_url: String,
    bucket: String,
}

impl RestStore {
    /// Build a client with the service key baked into default headers.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        if config.url.is_empty() {
            return Err(StoreError::Request("backend url is not configured".into()));
        }
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.service_key)
            .map_err(|e| StoreError::Request(format!("invalid service key: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_key))
            .map_err(|e| StoreError::Request(format!("invalid service key: {e}")))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| StoreError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn storage_url(&self, object_path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{object_path}",
            self.base_url, self.bucket
        )
    }

    /// Replace an estimate's line items with the parsed set.
    async fn replace_line_items(
        &self,
        estimate_id: Uuid,
        items: &[LineItem],
    ) -> Result<(), StoreError> {
        let delete = self
            .client
            .delete(self.table_url(LINE_ITEMS))
            .query(&[("estimate_id", format!("eq.{estimate_id}"))])
            .send()
            .await
            .map_err(transport_error)?;
        expect_success(delete).await?;

        if items.is_empty() {
            return Ok(());
        }
        let rows = line_item_rows(estimate_id, items);
        let insert = self
            .client
            .post(self.table_url(LINE_ITEMS))
            .json(&rows)
            .send()
            .await
            .map_err(transport_error)?;
        expect_success(insert).await?;
        Ok(())
    }

    /// Insert parts into the shared catalog; existing part numbers win.
    async fn upsert_parts(&self, parts: &[Part]) -> Result<(), StoreError> {
        let rows = part_rows(parts);
        if rows.is_empty() {
            return Ok(());
        }
        let response = self
            .client
            .post(self.table_url(PARTS))
            .header("Prefer", "resolution=ignore-duplicates")
            .query(&[("on_conflict", "part_number")])
            .json(&rows)
            .send()
            .await
            .map_err(transport_error)?;
        expect_success(response).await?;
        Ok(())
    }

    async fn find_one(
        &self,
        query: &[(&str, String)],
    ) -> Result<Option<EstimateRef>, StoreError> {
        #[derive(Deserialize)]
        struct Row {
            id: Uuid,
            estimate_number: String,
            file_name: String,
        }

        let response = self
            .client
            .get(self.table_url(ESTIMATES))
            .query(&[("select", "id,estimate_number,file_name"), ("limit", "1")])
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;
        let response = expect_success(response).await?;
        let rows: Vec<Row> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(rows.into_iter().next().map(|row| EstimateRef {
            id: row.id,
            estimate_number: row.estimate_number,
            source_file: row.file_name,
        }))
    }
}

#[async_trait]
impl EstimateStore for RestStore {
    async fn upsert_estimate(&self, estimate: &Estimate) -> Result<UpsertOutcome, StoreError> {
        self.upsert_parts(&estimate.parts).await?;

        let existing = self
            .find_by_number_or_fingerprint(&estimate.estimate_number, &estimate.fingerprint)
            .await?;
        let row = estimate_row(estimate);

        let outcome = match existing {
            Some(found) => {
                let response = self
                    .client
                    .patch(self.table_url(ESTIMATES))
                    .query(&[("id", format!("eq.{}", found.id))])
                    .json(&row)
                    .send()
                    .await
                    .map_err(transport_error)?;
                expect_success(response).await?;
                UpsertOutcome {
                    id: found.id,
                    updated: true,
                }
            }
            None => {
                // Supplying the key client-side avoids a representation
                // round-trip.
                let id = Uuid::new_v4();
                let mut insert = row;
                insert["id"] = json!(id);
                let response = self
                    .client
                    .post(self.table_url(ESTIMATES))
                    .json(&insert)
                    .send()
                    .await
                    .map_err(transport_error)?;
                expect_success(response).await?;
                UpsertOutcome { id, updated: false }
            }
        };

        self.replace_line_items(outcome.id, &estimate.line_items)
            .await?;
        debug!(
            estimate = %estimate.estimate_number,
            updated = outcome.updated,
            line_items = estimate.line_items.len(),
            "estimate upserted"
        );
        Ok(outcome)
    }

    async fn find_by_number_or_fingerprint(
        &self,
        estimate_number: &str,
        fingerprint: &str,
    ) -> Result<Option<EstimateRef>, StoreError> {
        let query = identity_filter(estimate_number, fingerprint);
        self.find_one(&[(query.0, query.1)]).await
    }

    async fn find_recent_by_file_name(
        &self,
        fragment: &str,
    ) -> Result<Option<EstimateRef>, StoreError> {
        self.find_one(&[
            ("file_name", format!("ilike.*{fragment}*")),
            ("order", "created_at.desc".to_string()),
        ])
        .await
    }

    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        estimate_id: Uuid,
        kind: ImageKind,
    ) -> Result<ImageRef, StoreError> {
        let object_path = format!("{estimate_id}/{file_name}");
        let content_type = mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .to_string();
        let size = bytes.len();

        let upload = self
            .client
            .post(self.storage_url(&object_path))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(transport_error)?;
        expect_success(upload).await?;

        let id = Uuid::new_v4();
        let row = json!({
            "id": id,
            "estimate_id": estimate_id,
            "file_name": file_name,
            "storage_path": object_path,
            "image_type": kind.as_str(),
            "size_bytes": size,
            "created_at": Utc::now(),
        });
        let insert = self
            .client
            .post(self.table_url(IMAGES))
            .json(&row)
            .send()
            .await
            .map_err(transport_error)?;
        expect_success(insert).await?;
        debug!(file = file_name, kind = kind.as_str(), "image uploaded");
        Ok(ImageRef { id })
    }

    async fn attach_ocr(&self, image_id: Uuid, ocr: &OcrText) -> Result<(), StoreError> {
        let patch = json!({
            "ocr_text": ocr.text,
            "ocr_confidence": ocr.confidence,
            "ocr_entities": ocr.entities,
        });
        let response = self
            .client
            .patch(self.table_url(IMAGES))
            .query(&[("id", format!("eq.{image_id}"))])
            .json(&patch)
            .send()
            .await
            .map_err(transport_error)?;
        expect_success(response).await?;
        Ok(())
    }

    async fn append_log(&self, entry: &ProcessingLogEntry) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.table_url(LOGS))
            .json(entry)
            .send()
            .await
            .map_err(transport_error)?;
        expect_success(response).await?;
        Ok(())
    }

    async fn recent_stats(&self, limit: usize) -> Result<ProcessingStats, StoreError> {
        #[derive(Deserialize)]
        struct Row {
            status: ProcessingStatus,
            records_processed: usize,
            errors_count: usize,
        }

        let response = self
            .client
            .get(self.table_url(LOGS))
            .query(&[
                ("select", "status,records_processed,errors_count".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .map_err(transport_error)?;
        let response = expect_success(response).await?;
        let rows: Vec<Row> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let mut stats = ProcessingStats::default();
        for row in rows {
            stats.total_entries += 1;
            stats.total_records += row.records_processed;
            stats.total_errors += row.errors_count;
            match row.status {
                ProcessingStatus::Completed => stats.successful += 1,
                ProcessingStatus::Error => stats.failed += 1,
                ProcessingStatus::Processing => {}
            }
        }
        Ok(stats)
    }

    async fn check_connection(&self) -> Result<(), StoreError> {
        let response = self
            .client
            .get(self.table_url(ESTIMATES))
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await
            .map_err(transport_error)?;
        expect_success(response).await?;
        Ok(())
    }
}

/// PostgREST filter selecting an estimate by number or file fingerprint.
/// Files with no header record fall back to fingerprint-only identity.
fn identity_filter(estimate_number: &str, fingerprint: &str) -> (&'static str, String) {
    if estimate_number.is_empty() {
        ("file_hash", format!("eq.{fingerprint}"))
    } else {
        (
            "or",
            format!("(estimate_number.eq.{estimate_number},file_hash.eq.{fingerprint})"),
        )
    }
}

/// Flatten an estimate into its backend row. Effective totals are used,
/// so an explicit totals record wins over line-item sums.
fn estimate_row(estimate: &Estimate) -> Value {
    json!({
        "estimate_number": estimate.estimate_number,
        "claim_number": estimate.claim_number,
        "estimate_date": estimate.estimate_date,
        "completion_date": estimate.completion_date,
        "status": estimate.status,
        "drp_provider": estimate.drp_provider,
        "vin": estimate.vehicle.vin,
        "vehicle_year": estimate.vehicle.year,
        "vehicle_make": estimate.vehicle.make,
        "vehicle_model": estimate.vehicle.model,
        "vehicle_color": estimate.vehicle.color,
        "mileage": estimate.vehicle.mileage,
        "insurance_company": estimate.insurance.company,
        "policy_number": estimate.insurance.policy_number,
        "deductible": estimate.insurance.deductible,
        "labor_total": estimate.labor_total(),
        "parts_total": estimate.parts_total(),
        "tax_total": estimate.tax_total(),
        "total_cost": estimate.total_cost(),
        "file_name": estimate.source_file,
        "file_hash": estimate.fingerprint,
        "raw_data": estimate,
        "updated_at": Utc::now(),
    })
}

fn line_item_rows(estimate_id: Uuid, items: &[LineItem]) -> Vec<Value> {
    items
        .iter()
        .map(|item| {
            json!({
                "estimate_id": estimate_id,
                "line_number": item.line_number,
                "operation": item.operation.as_str(),
                "part_description": item.part_description,
                "part_number": item.part_number,
                "quantity": item.quantity,
                "labor_hours": item.labor_hours,
                "labor_rate": item.labor_rate,
                "labor_cost": item.labor_cost,
                "part_cost": item.part_cost,
                "total_cost": item.total_cost,
                "category": item.category,
                "notes": item.notes,
            })
        })
        .collect()
}

fn part_rows(parts: &[Part]) -> Vec<Value> {
    parts
        .iter()
        .filter(|part| !part.part_number.is_empty())
        .map(|part| {
            json!({
                "part_number": part.part_number,
                "part_name": part.part_name,
                "oem_number": part.oem_number,
                "aftermarket_number": part.aftermarket_number,
                "list_price": part.list_price,
                "cost": part.cost,
                "availability": part.availability,
                "supplier": part.supplier,
                "category": part.category,
                "description": part.description,
            })
        })
        .collect()
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_connect() || err.is_timeout() {
        StoreError::Unreachable(err.to_string())
    } else {
        StoreError::Request(err.to_string())
    }
}

/// Turn non-2xx responses into request errors carrying the backend's
/// message body.
async fn expect_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::BAD_GATEWAY {
        warn!(%status, "backend unavailable");
        return Err(StoreError::Unreachable(format!("{status}: {body}")));
    }
    Err(StoreError::Request(format!("{status}: {body}")))
}
