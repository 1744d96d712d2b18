//! Cloud Monitoring v3 REST client.
//!
//! Token minting is out of scope: callers hand in an OAuth access token
//! obtained elsewhere (e.g. `gcloud auth print-access-token` or a metadata
//! server sidecar).

use std::time::Duration;

use {
    async_trait::async_trait,
    reqwest::{Client, RequestBuilder, Response},
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tracing::debug,
};

use crate::{
    backend::{MonitoringBackend, project_name},
    error::{Context, Error, Result},
    timeseries::{CreateTimeSeriesRequest, MetricDescriptor, TimeSeries},
};

pub const DEFAULT_ENDPOINT: &str = "https://monitoring.googleapis.com/v3";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Google API error envelope.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDescriptorsResponse {
    #[serde(default)]
    metric_descriptors: Vec<MetricDescriptor>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// HTTP backend for the Cloud Monitoring API.
pub struct HttpBackend {
    client: Client,
    endpoint: String,
    token: Option<Secret<String>>,
}

impl HttpBackend {
    /// Build a client against `endpoint`, e.g. [`DEFAULT_ENDPOINT`].
    pub fn new(
        endpoint: &str,
        token: Option<Secret<String>>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("cloudmon/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client for Cloud Monitoring")?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token.expose_secret()),
            None => req,
        }
    }

    /// Turn non-2xx responses into [`Error::Api`].
    async fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) if envelope.error.status.is_empty() => envelope.error.message,
            Ok(envelope) => format!("{} ({})", envelope.error.message, envelope.error.status),
            Err(_) if body.trim().is_empty() => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
            Err(_) => body,
        };
        Err(Error::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl MonitoringBackend for HttpBackend {
    async fn create_time_series(&self, project: &str, series: &[TimeSeries]) -> Result<()> {
        let url = self.url(&format!("{}/timeSeries", project_name(project)));
        let body = CreateTimeSeriesRequest {
            time_series: series,
        };
        let resp = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await?;
        Self::check(resp).await?;
        debug!(count = series.len(), "wrote time series");
        Ok(())
    }

    async fn create_metric_descriptor(
        &self,
        project: &str,
        descriptor: &MetricDescriptor,
    ) -> Result<()> {
        let url = self.url(&format!("{}/metricDescriptors", project_name(project)));
        let resp = self
            .authorize(self.client.post(&url))
            .json(descriptor)
            .send()
            .await?;
        match Self::check(resp).await {
            Ok(_) => Ok(()),
            // Already declared.
            Err(Error::Api { status: 409, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list_metric_descriptors(
        &self,
        project: &str,
        filter: Option<&str>,
    ) -> Result<Vec<MetricDescriptor>> {
        let url = self.url(&format!("{}/metricDescriptors", project_name(project)));
        let mut descriptors = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self.authorize(self.client.get(&url));
            if let Some(filter) = filter {
                req = req.query(&[("filter", filter)]);
            }
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }
            let resp = Self::check(req.send().await?).await?;
            let page: ListDescriptorsResponse = resp.json().await?;
            descriptors.extend(page.metric_descriptors);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(descriptors)
    }

    async fn delete_metric_descriptor(&self, project: &str, metric_type: &str) -> Result<()> {
        let url = self.url(&format!(
            "{}/metricDescriptors/{metric_type}",
            project_name(project)
        ));
        let resp = self.authorize(self.client.delete(&url)).send().await?;
        Self::check(resp).await?;
        Ok(())
    }
}
