use crate::config::SheetsConfig;
use crate::credentials::TokenSource;
use crate::record::AdmissionRecord;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Response, Url};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Header labels, one per mirrored column starting at column A
pub const SHEET_COLUMNS: [&str; 18] = [
    "Date",
    "Application ID",
    "Full Name",
    "Aadhaar",
    "DOB",
    "Course",
    "Mobile",
    "Referral",
    "Email",
    "Address",
    "City",
    "State",
    "Pincode",
    "Reg Fee",
    "App Fee",
    "Hostel",
    "Mess Fee",
    "Photo URL",
];

const FIRST_COLUMN: &str = "A";
const LAST_COLUMN: &str = "R";
/// Column holding the application identifier
const ID_COLUMN: &str = "B";
/// Cells are stored as given; Sheets must not parse numbers or formulas
const VALUE_INPUT_OPTION: &str = "RAW";

/// A located sheet row (1-based index as the sheet numbers it)
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub row_index: usize,
    pub values: Vec<String>,
}

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Appended,
    Updated { row_index: usize },
}

/// Key-value projection of admission records keyed by application id
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SheetProjection: Send + Sync {
    async fn get(&self, application_id: &str) -> Result<Option<SheetRow>>;

    async fn upsert(&self, record: &AdmissionRecord) -> Result<UpsertAction>;
}

/// Encode a record in mirrored column order
pub fn row_values(record: &AdmissionRecord) -> Vec<String> {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();

    vec![
        record.date.to_rfc3339(),
        record.application_id.clone(),
        record.full_name.clone(),
        record.aadhaar.clone(),
        record.dob.clone(),
        record.course.clone(),
        record.mobile.clone(),
        opt(&record.referral),
        opt(&record.email),
        opt(&record.address),
        opt(&record.city),
        opt(&record.state),
        opt(&record.pincode),
        record.reg_fee_status.to_string(),
        record.app_fee_status.to_string(),
        record.hostel.clone(),
        record.mess_fee_status.to_string(),
        opt(&record.photo_url),
    ]
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<String>,
    major_dimension: &'static str,
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

fn cell_text(cell: &serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Google Sheets v4 backend.
///
/// Rows are addressed positionally: lookups read the whole identifier
/// column and scan it, so cost grows with the number of rows. Nothing
/// serializes concurrent find-then-write sequences for the same id.
pub struct GoogleSheetsProjection {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    base_url: Url,
    spreadsheet_id: String,
    sheet_name: String,
}

impl GoogleSheetsProjection {
    pub fn new(
        config: &SheetsConfig,
        http: reqwest::Client,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self> {
        let base_url = Url::parse(&config.api_base_url)
            .with_context(|| format!("Invalid Sheets API base URL {}", config.api_base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("Sheets API base URL {} cannot be a base", config.api_base_url);
        }

        Ok(Self {
            http,
            tokens,
            base_url,
            spreadsheet_id: config.spreadsheet_id.clone(),
            sheet_name: config.sheet_name.clone(),
        })
    }

    /// `…/v4/spreadsheets/{id}/values/{range}{suffix}`
    fn values_url(&self, range: &str, suffix: &str) -> Result<Url> {
        let target = format!("{range}{suffix}");
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Sheets API base URL cannot be a base"))?
            .pop_if_empty()
            .extend([
                "v4",
                "spreadsheets",
                self.spreadsheet_id.as_str(),
                "values",
                target.as_str(),
            ]);
        Ok(url)
    }

    fn row_range(&self, row_index: usize) -> String {
        format!(
            "{}!{FIRST_COLUMN}{row_index}:{LAST_COLUMN}{row_index}",
            self.sheet_name
        )
    }

    async fn check(response: Response, action: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        bail!("Sheets API {action} failed with {status}: {detail}")
    }

    /// Append one row after the last populated row
    #[instrument(skip(self, record), fields(application_id = %record.application_id))]
    pub async fn append(&self, record: &AdmissionRecord) -> Result<()> {
        let range = format!("{}!{FIRST_COLUMN}1:{LAST_COLUMN}1", self.sheet_name);
        let mut url = self.values_url(&range, ":append")?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", VALUE_INPUT_OPTION)
            .append_pair("insertDataOption", "INSERT_ROWS");

        let body = ValueRange {
            range: None,
            major_dimension: "ROWS",
            values: vec![row_values(record)],
        };

        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context("Failed to send append request")?;
        Self::check(response, "append").await?;

        debug!("Row appended");
        Ok(())
    }

    /// Scan the identifier column for the first exact match
    #[instrument(skip(self))]
    pub async fn find_row_by_application_id(&self, application_id: &str) -> Result<Option<usize>> {
        let range = format!("{}!{ID_COLUMN}:{ID_COLUMN}", self.sheet_name);
        let rows = self.read_values(&range).await?;

        Ok(rows
            .iter()
            .position(|row| row.first().map(cell_text).as_deref() == Some(application_id))
            .map(|i| i + 1))
    }

    /// Overwrite the mirrored column range of `row_index`
    #[instrument(skip(self, record), fields(application_id = %record.application_id))]
    pub async fn update_row(&self, row_index: usize, record: &AdmissionRecord) -> Result<()> {
        let range = self.row_range(row_index);
        let mut url = self.values_url(&range, "")?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", VALUE_INPUT_OPTION);

        let body = ValueRange {
            range: Some(range),
            major_dimension: "ROWS",
            values: vec![row_values(record)],
        };

        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .put(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context("Failed to send update request")?;
        Self::check(response, "update").await?;

        debug!(row_index, "Row updated");
        Ok(())
    }

    async fn read_values(&self, range: &str) -> Result<Vec<Vec<serde_json::Value>>> {
        let url = self.values_url(range, "")?;
        let token = self.tokens.access_token().await?;

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to send read request")?;
        let parsed: ValuesResponse = Self::check(response, "read")
            .await?
            .json()
            .await
            .context("Failed to parse values response")?;

        Ok(parsed.values)
    }
}

#[async_trait]
impl SheetProjection for GoogleSheetsProjection {
    async fn get(&self, application_id: &str) -> Result<Option<SheetRow>> {
        let Some(row_index) = self.find_row_by_application_id(application_id).await? else {
            return Ok(None);
        };

        let values = self
            .read_values(&self.row_range(row_index))
            .await?
            .into_iter()
            .next()
            .unwrap_or_default()
            .iter()
            .map(cell_text)
            .collect();

        Ok(Some(SheetRow { row_index, values }))
    }

    async fn upsert(&self, record: &AdmissionRecord) -> Result<UpsertAction> {
        match self.find_row_by_application_id(&record.application_id).await? {
            Some(row_index) => {
                self.update_row(row_index, record).await?;
                Ok(UpsertAction::Updated { row_index })
            }
            None => {
                self.append(record).await?;
                Ok(UpsertAction::Appended)
            }
        }
    }
}
