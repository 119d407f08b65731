//! HTTP client for Open-Elevation compatible lookup services.
//!
//! This module provides the remote DEM server with:
//! - Batched `POST /api/v1/lookup` requests
//! - Parallel batches with configurable concurrency
//! - Automatic retry with exponential backoff on 429 and transport errors
//!
//! Batch results are re-assembled in input order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use geo::Coord;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::runtime::RuntimeFlavor;
use tokio::sync::Semaphore;

use crate::{DemServer, ElevationSource, Result, TrackError};

/// Open-Elevation client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OpenElevationConfig {
    /// Lookup endpoint
    pub endpoint: String,
    /// Locations per request. Default: 100
    pub batch_size: usize,
    /// Parallel requests. Default: 4
    pub max_concurrency: usize,
    /// Per-request timeout in seconds. Default: 30
    pub timeout_secs: u64,
    /// Retries per batch. Default: 3
    pub max_retries: u32,
}

impl Default for OpenElevationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.open-elevation.com/api/v1/lookup".to_string(),
            batch_size: 100,
            max_concurrency: 4,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Serialize)]
struct LookupRequest {
    locations: Vec<Location>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Location {
    latitude: f64,
    longitude: f64,
}

/// API response for the lookup endpoint
#[derive(Debug, Deserialize)]
struct LookupResponse {
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    elevation: f64,
}

fn build_request(batch: &[Coord<f64>]) -> LookupRequest {
    LookupRequest {
        locations: batch
            .iter()
            .map(|c| Location {
                latitude: c.y,
                longitude: c.x,
            })
            .collect(),
    }
}

fn parse_response(response: LookupResponse, expected: usize) -> Result<Vec<f64>> {
    if response.results.len() != expected {
        return Err(TrackError::ElevationCountMismatch {
            expected,
            actual: response.results.len(),
        });
    }
    Ok(response.results.into_iter().map(|r| r.elevation).collect())
}

fn unavailable(message: String) -> TrackError {
    TrackError::ProviderUnavailable {
        provider: DemServer::OpenElevation.to_string(),
        message,
    }
}

/// Remote elevation provider
#[derive(Debug, Clone)]
pub struct OpenElevationClient {
    client: Client,
    config: OpenElevationConfig,
}

impl OpenElevationClient {
    pub fn new(config: OpenElevationConfig) -> Result<Self> {
        if config.batch_size == 0 || config.max_concurrency == 0 {
            return Err(TrackError::Config {
                message: "open-elevation batch size and concurrency must be positive".to_string(),
            });
        }

        let client = Client::builder()
            .pool_max_idle_per_host(config.max_concurrency)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TrackError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OpenElevationConfig {
        &self.config
    }

    /// Fetch altitudes for all coordinates, in input order.
    pub async fn fetch_elevations(&self, coords: &[Coord<f64>]) -> Result<Vec<f64>> {
        if coords.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let batches: Vec<&[Coord<f64>]> = coords.chunks(self.config.batch_size).collect();
        let total = batches.len();

        info!(
            "[OpenElevation] Fetching {} locations in {} batches",
            coords.len(),
            total
        );
        let start = Instant::now();

        let tasks = batches.into_iter().enumerate().map(|(index, batch)| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| unavailable(format!("semaphore closed: {}", e)))?;
                self.fetch_batch(index, batch).await
            }
        });

        let mut altitudes = Vec::with_capacity(coords.len());
        for result in join_all(tasks).await {
            altitudes.extend(result?);
        }

        info!(
            "[OpenElevation] Completed {} batches in {:.2}s",
            total,
            start.elapsed().as_secs_f64()
        );
        Ok(altitudes)
    }

    async fn fetch_batch(&self, index: usize, batch: &[Coord<f64>]) -> Result<Vec<f64>> {
        let body = build_request(batch);
        let mut retries = 0;

        loop {
            let response = self
                .client
                .post(&self.config.endpoint)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        retries += 1;
                        if retries > self.config.max_retries {
                            return Err(unavailable("Max retries exceeded (429)".to_string()));
                        }
                        let backoff = Duration::from_millis(1000 * (1 << retries.min(4)));
                        warn!(
                            "[OpenElevation] 429 for batch {}, retry {} after {:?}",
                            index, retries, backoff
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    if !status.is_success() {
                        return Err(unavailable(format!("HTTP {}", status)));
                    }

                    let parsed = resp
                        .json::<LookupResponse>()
                        .await
                        .map_err(|e| unavailable(format!("Parse error: {}", e)))?;
                    debug!("[OpenElevation] Batch {} ok ({} locations)", index, batch.len());
                    return parse_response(parsed, batch.len());
                }
                Err(e) => {
                    retries += 1;
                    if retries > self.config.max_retries {
                        return Err(unavailable(format!("Request error: {}", e)));
                    }
                    let backoff = Duration::from_millis(500 * (1 << retries.min(4)));
                    warn!(
                        "[OpenElevation] Error for batch {}: {}, retry {} after {:?}",
                        index, e, retries, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Blocking wrapper around [`fetch_elevations`](Self::fetch_elevations).
    ///
    /// Inside a multi-threaded tokio runtime the current worker is handed over
    /// with `block_in_place`. A current-thread runtime cannot block, so the
    /// lookup runs on a helper thread with its own runtime, as it does when no
    /// runtime is running.
    pub fn fetch_elevations_sync(&self, coords: &[Coord<f64>]) -> Result<Vec<f64>> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(self.fetch_elevations(coords)))
            }
            Ok(_) => std::thread::scope(|scope| {
                scope
                    .spawn(|| self.fetch_on_own_runtime(coords))
                    .join()
                    .unwrap_or_else(|_| Err(unavailable("Lookup thread panicked".to_string())))
            }),
            Err(_) => self.fetch_on_own_runtime(coords),
        }
    }

    fn fetch_on_own_runtime(&self, coords: &[Coord<f64>]) -> Result<Vec<f64>> {
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| unavailable(format!("Runtime error: {}", e)))?;
        rt.block_on(self.fetch_elevations(coords))
    }
}

impl ElevationSource for OpenElevationClient {
    fn elevations(&self, coords: &[Coord<f64>]) -> Result<Vec<f64>> {
        self.fetch_elevations_sync(coords)
    }
}
