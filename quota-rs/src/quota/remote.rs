//! HTTP clients for a remote quota server
//!
//! These talk to the routes served by [`crate::api::ApiServer`].

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;

use super::donor::DonorDirectory;
use super::store::QuotaStore;
use super::types::{DonorStatus, Identity, Lookup, Period, QuotaRecord};
use crate::error::{QuotaError, Result};

fn build_client() -> Result<Client> {
    Ok(Client::builder().timeout(Duration::from_secs(10)).build()?)
}

fn parse_base(base_url: &str) -> Result<Url> {
    let url = Url::parse(base_url)
        .map_err(|e| QuotaError::Config(format!("invalid server url {}: {}", base_url, e)))?;
    if url.cannot_be_a_base() {
        return Err(QuotaError::Config(format!("invalid server url {}", base_url)));
    }
    Ok(url)
}

/// Append path segments to the base url, percent-encoding each one
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| QuotaError::Config(format!("invalid server url {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Quota store backed by `/api/quotas`
#[derive(Debug, Clone)]
pub struct HttpQuotaStore {
    client: Client,
    base_url: Url,
}

impl HttpQuotaStore {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: parse_base(base_url)?,
        })
    }

    fn record_url(&self, identity: &Identity, period: &Period) -> Result<Url> {
        let period = period.key();
        endpoint(
            &self.base_url,
            &["api", "quotas", identity.kind(), identity.id(), period.as_str()],
        )
    }

    async fn fetch(&self, identity: &Identity, period: &Period) -> Result<Option<QuotaRecord>> {
        let url = self.record_url(identity, period)?;

        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let record = response.error_for_status()?.json::<QuotaRecord>().await?;
        Ok(Some(record))
    }
}

#[async_trait]
impl QuotaStore for HttpQuotaStore {
    async fn lookup(&self, identity: &Identity, period: &Period) -> Lookup {
        self.fetch(identity, period).await.into()
    }

    async fn upsert(&self, record: &QuotaRecord) -> Result<()> {
        self.client
            .put(endpoint(&self.base_url, &["api", "quotas"])?)
            .json(record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Donor lookup backed by `/api/donors`
#[derive(Debug, Clone)]
pub struct HttpDonorDirectory {
    client: Client,
    base_url: Url,
}

impl HttpDonorDirectory {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: parse_base(base_url)?,
        })
    }
}

#[async_trait]
impl DonorDirectory for HttpDonorDirectory {
    async fn has_donated(&self, account_id: &str) -> Result<bool> {
        let url = endpoint(&self.base_url, &["api", "donors", account_id])?;
        let status = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<DonorStatus>()
            .await?;

        Ok(status.has_donated)
    }
}
