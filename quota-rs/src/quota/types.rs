use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{QuotaError, Result};

/// Calendar month a quota counter belongs to, keyed as `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    /// Always the first day of the month
    first_day: NaiveDate,
}

impl Period {
    /// Period containing the given date
    pub fn from_date(date: NaiveDate) -> Self {
        Period {
            first_day: date - Days::new(u64::from(date.day0())),
        }
    }

    /// `YYYY-MM` key
    pub fn key(&self) -> String {
        format!("{:04}-{:02}", self.first_day.year(), self.first_day.month())
    }

    /// First day of the month, used as the local cache reset marker
    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    /// Period immediately after this one
    pub fn next(&self) -> Self {
        let last_day = self
            .first_day
            .checked_add_days(Days::new(31))
            .unwrap_or(self.first_day);
        Period::from_date(last_day)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for Period {
    type Err = QuotaError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 7 || bytes[4] != b'-' {
            return Err(QuotaError::InvalidPeriod(s.to_string()));
        }

        NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d")
            .map(Period::from_date)
            .map_err(|_| QuotaError::InvalidPeriod(s.to_string()))
    }
}

impl TryFrom<String> for Period {
    type Error = QuotaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.key()
    }
}

/// Who is downloading: a generated browser token or a signed-in account.
/// The two namespaces are never merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Identity {
    Anonymous(String),
    Account(String),
}

impl Identity {
    /// Build an identity from its path/storage representation
    pub fn from_parts(kind: &str, id: &str) -> Result<Self> {
        match kind {
            "anonymous" => Ok(Identity::Anonymous(id.to_string())),
            "account" => Ok(Identity::Account(id.to_string())),
            other => Err(QuotaError::Store(format!("unknown identity kind: {}", other))),
        }
    }

    pub fn from_record(identity: &str, is_authenticated: bool) -> Self {
        if is_authenticated {
            Identity::Account(identity.to_string())
        } else {
            Identity::Anonymous(identity.to_string())
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Identity::Anonymous(id) | Identity::Account(id) => id,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Account(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Identity::Anonymous(_) => "anonymous",
            Identity::Account(_) => "account",
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Server-side counter row, one per identity per period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    /// Client token or account id
    pub identity: String,
    /// Month the count applies to
    pub period: Period,
    /// Downloads consumed this period
    pub count: u32,
    /// Discriminates account ids from anonymous tokens
    pub is_authenticated: bool,
    /// Time of the last upsert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl QuotaRecord {
    pub fn new(identity: &Identity, period: Period, count: u32) -> Self {
        QuotaRecord {
            identity: identity.id().to_string(),
            period,
            count,
            is_authenticated: identity.is_authenticated(),
            updated_at: None,
        }
    }

    pub fn owner(&self) -> Identity {
        Identity::from_record(&self.identity, self.is_authenticated)
    }
}

/// Outcome of a server-side point lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(QuotaRecord),
    NotFound,
    Failed(String),
}

impl Lookup {
    /// Count carried by the record, if one was found
    pub fn count(&self) -> Option<u32> {
        match self {
            Lookup::Found(record) => Some(record.count),
            Lookup::NotFound | Lookup::Failed(_) => None,
        }
    }
}

impl From<Result<Option<QuotaRecord>>> for Lookup {
    fn from(result: Result<Option<QuotaRecord>>) -> Self {
        match result {
            Ok(Some(record)) => Lookup::Found(record),
            Ok(None) => Lookup::NotFound,
            Err(e) => Lookup::Failed(e.to_string()),
        }
    }
}

/// Donor flag as exchanged with the donor lookup endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorStatus {
    pub account_id: String,
    pub has_donated: bool,
}

/// Usage snapshot for one identity in one period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    /// Downloads consumed
    pub used: u32,
    /// Monthly cap, `None` when unlimited
    pub cap: Option<u32>,
}

impl QuotaUsage {
    pub fn remaining(&self) -> Option<u32> {
        self.cap.map(|cap| cap.saturating_sub(self.used))
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.cap, Some(cap) if self.used >= cap)
    }
}

/// Result of a quota check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "DecisionView")]
pub enum Decision {
    Allowed {
        usage: QuotaUsage,
        message: String,
    },
    Blocked {
        usage: QuotaUsage,
        message: String,
        /// Where the user can go to lift the limit
        redirect: String,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    pub fn usage(&self) -> QuotaUsage {
        match self {
            Decision::Allowed { usage, .. } | Decision::Blocked { usage, .. } => *usage,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Decision::Allowed { message, .. } | Decision::Blocked { message, .. } => message,
        }
    }

    pub fn redirect(&self) -> Option<&str> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Blocked { redirect, .. } => Some(redirect),
        }
    }
}

/// Flat wire shape of a [`Decision`]
#[derive(Serialize)]
struct DecisionView {
    allowed: bool,
    message: String,
    redirect: Option<String>,
    used: u32,
    remaining: Option<u32>,
    cap: Option<u32>,
}

impl From<Decision> for DecisionView {
    fn from(decision: Decision) -> Self {
        let usage = decision.usage();
        let allowed = decision.is_allowed();
        let (message, redirect) = match decision {
            Decision::Allowed { message, .. } => (message, None),
            Decision::Blocked { message, redirect, .. } => (message, Some(redirect)),
        };

        DecisionView {
            allowed,
            message,
            redirect,
            used: usage.used,
            remaining: usage.remaining(),
            cap: usage.cap,
        }
    }
}
