use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::HeaderValue;
use tracing::debug;

use crate::error::KiraError;
use crate::http;

pub const TAXDUMP_URL: &str = "https://ftp.ncbi.nlm.nih.gov/pub/taxonomy/taxdmp.zip";

#[derive(Debug, Clone, Copy)]
pub struct DownloadInfo {
    pub bytes: u64,
}

pub trait NcbiClient: Send + Sync {
    /// Downloads the taxonomy dump archive to `destination`.
    fn download_taxdump(&self, destination: &Path) -> Result<DownloadInfo, KiraError>;
}

#[derive(Clone)]
pub struct NcbiHttpClient {
    client: Client,
    taxdump_url: String,
}

impl NcbiHttpClient {
    pub fn new() -> Result<Self, KiraError> {
        let mut headers = http::user_agent_headers().map_err(KiraError::NcbiHttp)?;
        if let Ok(api_key) = std::env::var("NCBI_API_KEY") {
            if !api_key.trim().is_empty() {
                headers.insert(
                    "api-key",
                    HeaderValue::from_str(api_key.trim())
                        .map_err(|err| KiraError::NcbiHttp(err.to_string()))?,
                );
            }
        }

        // taxdmp.zip is tens of megabytes.
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|err| KiraError::NcbiHttp(err.to_string()))?;

        Ok(Self {
            client,
            taxdump_url: TAXDUMP_URL.to_string(),
        })
    }

    pub fn with_taxdump_url(mut self, url: impl Into<String>) -> Self {
        self.taxdump_url = url.into();
        self
    }
}

impl NcbiClient for NcbiHttpClient {
    fn download_taxdump(&self, destination: &Path) -> Result<DownloadInfo, KiraError> {
        let response = http::send_with_retries("ncbi", || self.client.get(&self.taxdump_url))
            .map_err(KiraError::NcbiHttp)?;
        let mut response = http::check_status(response, "NCBI request failed")
            .map_err(|(status, message)| KiraError::NcbiStatus { status, message })?;

        let mut file =
            File::create(destination).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let bytes = std::io::copy(&mut response, &mut file)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        debug!(url = %self.taxdump_url, bytes, "taxdump downloaded");
        Ok(DownloadInfo { bytes })
    }
}
