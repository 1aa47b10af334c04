//! Lister backed by an HTTP resource API.

use async_trait::async_trait;

use pollcast_proto::ResourceList;

use super::ResourceLister;
use crate::error::Error;

/// Lists resources with `GET {base}/tenants/{tenant}/resources/{kind}`.
#[derive(Debug, Clone)]
pub struct HttpLister {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLister {
    /// Create a lister for the API at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a lister reusing an existing HTTP client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// URL listing `kind` for `tenant`.
    pub fn url_for(&self, tenant: &str, kind: &str) -> String {
        format!("{}/tenants/{}/resources/{}", self.base_url, tenant, kind)
    }
}

#[async_trait]
impl ResourceLister for HttpLister {
    async fn list(&self, tenant: &str, kind: &str) -> Result<ResourceList, Error> {
        let url = self.url_for(tenant, kind);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::lister(tenant, kind, format!("upstream returned {}", status)));
        }

        let list = response.json::<ResourceList>().await?;
        tracing::trace!(tenant, kind, items = list.items.len(), "listed resources");
        Ok(list)
    }
}
