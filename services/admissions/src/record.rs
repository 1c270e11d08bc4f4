//! Admission record schema and the request shapes that create or mutate it.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hostel value for a freshly registered student
pub const HOSTEL_NOT_BOOKED: &str = "Not Booked";

/// Payment state of a fee
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeStatus {
    #[default]
    Pending,
    Paid,
}

impl FeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeStatus::Pending => "Pending",
            FeeStatus::Paid => "Paid",
        }
    }
}

impl fmt::Display for FeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(FeeStatus::Pending),
            "Paid" => Ok(FeeStatus::Paid),
            other => Err(format!("unknown fee status: {other}")),
        }
    }
}

/// A student's admission application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRecord {
    pub application_id: String,
    pub full_name: String,
    pub aadhaar: String,
    pub dob: String,
    pub course: String,
    pub mobile: String,
    pub referral: Option<String>,
    /// Submission date
    pub date: DateTime<Utc>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    /// Admission fee; gates login
    pub reg_fee_status: FeeStatus,
    /// Application fee
    pub app_fee_status: FeeStatus,
    pub hostel: String,
    pub mess_fee_status: FeeStatus,
    pub photo_url: Option<String>,
}

/// Registration form payload
///
/// Any `applicationId` sent by the client is ignored; identifiers are
/// always generated server-side.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub full_name: String,
    #[serde(default)]
    pub aadhaar: String,
    pub dob: String,
    #[serde(default)]
    pub course: String,
    pub mobile: String,
    pub referral: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
}

impl Registration {
    /// Build a new record with fee and hostel defaults applied
    pub fn into_record(self, application_id: String, date: DateTime<Utc>) -> AdmissionRecord {
        AdmissionRecord {
            application_id,
            full_name: self.full_name,
            aadhaar: self.aadhaar,
            dob: self.dob,
            course: self.course,
            mobile: self.mobile,
            referral: self.referral,
            date,
            email: self.email,
            address: self.address,
            city: self.city,
            state: self.state,
            pincode: self.pincode,
            reg_fee_status: FeeStatus::Pending,
            app_fee_status: FeeStatus::Pending,
            hostel: HOSTEL_NOT_BOOKED.to_string(),
            mess_fee_status: FeeStatus::Pending,
            photo_url: None,
        }
    }
}

/// Partial update of an application; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationPatch {
    pub full_name: Option<String>,
    pub aadhaar: Option<String>,
    pub dob: Option<String>,
    pub course: Option<String>,
    pub mobile: Option<String>,
    pub referral: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub reg_fee_status: Option<FeeStatus>,
    pub app_fee_status: Option<FeeStatus>,
    pub hostel: Option<String>,
    pub mess_fee_status: Option<FeeStatus>,
    pub photo_url: Option<String>,
}

impl ApplicationPatch {
    /// Merge the supplied fields into `record`
    pub fn apply(&self, record: &mut AdmissionRecord) {
        fn merge<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }
        fn merge_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *target = value.clone();
            }
        }

        merge(&mut record.full_name, &self.full_name);
        merge(&mut record.aadhaar, &self.aadhaar);
        merge(&mut record.dob, &self.dob);
        merge(&mut record.course, &self.course);
        merge(&mut record.mobile, &self.mobile);
        merge_opt(&mut record.referral, &self.referral);
        merge_opt(&mut record.email, &self.email);
        merge_opt(&mut record.address, &self.address);
        merge_opt(&mut record.city, &self.city);
        merge_opt(&mut record.state, &self.state);
        merge_opt(&mut record.pincode, &self.pincode);
        merge(&mut record.reg_fee_status, &self.reg_fee_status);
        merge(&mut record.app_fee_status, &self.app_fee_status);
        merge(&mut record.hostel, &self.hostel);
        merge(&mut record.mess_fee_status, &self.mess_fee_status);
        merge_opt(&mut record.photo_url, &self.photo_url);
    }
}

/// Generates `<prefix><4 digits>` application identifiers
#[derive(Debug, Clone)]
pub struct ApplicationIdGenerator {
    prefix: String,
}

impl ApplicationIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn generate(&self) -> String {
        let digits: u16 = rand::thread_rng().gen_range(1000..=9999);
        format!("{}{}", self.prefix, digits)
    }

    /// Check whether `id` has the shape this generator produces
    pub fn matches(&self, id: &str) -> bool {
        id.strip_prefix(self.prefix.as_str())
            .map(|digits| digits.len() == 4 && digits.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(false)
    }
}

impl Default for ApplicationIdGenerator {
    fn default() -> Self {
        Self::new("PPSU")
    }
}
