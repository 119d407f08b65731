//! # Elevation Providers
//!
//! Altitude estimation for tracks recorded without elevation.
//!
//! A provider answers one question: given an ordered list of horizontal
//! coordinates, what is the ground altitude at each of them? Providers are a
//! closed set ([`ElevationProvider`]) behind one capability trait
//! ([`ElevationSource`]), registered by [`DemServer`] identifier in
//! [`ElevationProviders`].
//!
//! `DemServer::None` is not a provider: it means "do not simulate" and is
//! handled by the normalizer without any lookup.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Mutex;

use geo::Coord;
use log::{debug, info};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::{EditorConfig, Result, TrackError};

#[cfg(feature = "http")]
use crate::OpenElevationClient;

/// Capability shared by every elevation provider.
pub trait ElevationSource {
    /// Altitudes in meters for `coords`, same length and order.
    fn elevations(&self, coords: &[Coord<f64>]) -> Result<Vec<f64>>;
}

// ============================================================================
// DEM Server Identifier
// ============================================================================

/// Identifier of the elevation service configured on a track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DemServer {
    /// Do not simulate altitude
    #[default]
    None,
    /// Sample the configured terrain grid
    Internal,
    /// Query an Open-Elevation service
    OpenElevation,
}

impl DemServer {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemServer::None => "none",
            DemServer::Internal => "internal",
            DemServer::OpenElevation => "open-elevation",
        }
    }
}

impl fmt::Display for DemServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DemServer {
    type Err = TrackError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(DemServer::None),
            "internal" => Ok(DemServer::Internal),
            "open-elevation" => Ok(DemServer::OpenElevation),
            other => Err(TrackError::Config {
                message: format!("unknown DEM server '{}'", other),
            }),
        }
    }
}

// ============================================================================
// Terrain Grid (internal DEM server)
// ============================================================================

/// Regular longitude/latitude grid of ground heights.
///
/// `heights` is row-major: row 0 lies on `origin_latitude`, rows go north and
/// columns go east, one `cell_size` degree apart. Heights between nodes are
/// bilinearly interpolated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerrainGrid {
    pub origin_longitude: f64,
    pub origin_latitude: f64,
    pub cell_size: f64,
    pub columns: usize,
    pub rows: usize,
    pub heights: Vec<f64>,
}

impl TerrainGrid {
    pub fn new(
        origin_longitude: f64,
        origin_latitude: f64,
        cell_size: f64,
        columns: usize,
        rows: usize,
        heights: Vec<f64>,
    ) -> Result<Self> {
        let grid = Self {
            origin_longitude,
            origin_latitude,
            cell_size,
            columns,
            rows,
            heights,
        };
        grid.validate()?;
        Ok(grid)
    }

    pub fn validate(&self) -> Result<()> {
        if self.columns < 2 || self.rows < 2 {
            return Err(TrackError::Config {
                message: "terrain grid needs at least 2x2 nodes".to_string(),
            });
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(TrackError::Config {
                message: format!("invalid terrain cell size {}", self.cell_size),
            });
        }
        if self.heights.len() != self.columns * self.rows {
            return Err(TrackError::Config {
                message: format!(
                    "terrain grid has {} heights for {}x{} nodes",
                    self.heights.len(),
                    self.columns,
                    self.rows
                ),
            });
        }
        Ok(())
    }

    fn height_at(&self, column: usize, row: usize) -> f64 {
        self.heights[row * self.columns + column]
    }

    /// Interpolated height at a position, `None` outside the grid or when
    /// the grid fails [`validate`](Self::validate).
    pub fn sample(&self, longitude: f64, latitude: f64) -> Option<f64> {
        if self.validate().is_err() {
            return None;
        }
        let fx = (longitude - self.origin_longitude) / self.cell_size;
        let fy = (latitude - self.origin_latitude) / self.cell_size;
        let max_x = (self.columns - 1) as f64;
        let max_y = (self.rows - 1) as f64;
        if !(fx >= 0.0 && fx <= max_x && fy >= 0.0 && fy <= max_y) {
            return None;
        }

        let col = (fx.floor() as usize).min(self.columns - 2);
        let row = (fy.floor() as usize).min(self.rows - 2);
        let tx = fx - col as f64;
        let ty = fy - row as f64;

        let south = self.height_at(col, row) * (1.0 - tx) + self.height_at(col + 1, row) * tx;
        let north =
            self.height_at(col, row + 1) * (1.0 - tx) + self.height_at(col + 1, row + 1) * tx;
        Some(south * (1.0 - ty) + north * ty)
    }
}

impl ElevationSource for TerrainGrid {
    fn elevations(&self, coords: &[Coord<f64>]) -> Result<Vec<f64>> {
        coords
            .iter()
            .map(|c| {
                self.sample(c.x, c.y)
                    .ok_or_else(|| TrackError::ProviderUnavailable {
                        provider: DemServer::Internal.to_string(),
                        message: format!("({}, {}) is outside the terrain grid", c.x, c.y),
                    })
            })
            .collect()
    }
}

// ============================================================================
// Provider Variants
// ============================================================================

/// The concrete elevation providers.
#[derive(Debug)]
pub enum ElevationProvider {
    Terrain(TerrainGrid),
    #[cfg(feature = "http")]
    OpenElevation(OpenElevationClient),
}

impl ElevationSource for ElevationProvider {
    fn elevations(&self, coords: &[Coord<f64>]) -> Result<Vec<f64>> {
        match self {
            ElevationProvider::Terrain(grid) => grid.elevations(coords),
            #[cfg(feature = "http")]
            ElevationProvider::OpenElevation(client) => client.elevations(coords),
        }
    }
}

// ============================================================================
// Provider Registry
// ============================================================================

/// Cache key: provider plus coordinate quantized to 1e-6 degree.
type CacheKey = (DemServer, i64, i64);

fn cache_key(server: DemServer, c: &Coord<f64>) -> CacheKey {
    (
        server,
        (c.x * 1e6).round() as i64,
        (c.y * 1e6).round() as i64,
    )
}

/// Registered providers keyed by DEM server, with a shared LRU altitude cache.
pub struct ElevationProviders {
    providers: HashMap<DemServer, ElevationProvider>,
    cache: Mutex<LruCache<CacheKey, f64>>,
}

impl ElevationProviders {
    /// Create an empty registry caching up to `cache_capacity` altitudes.
    pub fn new(cache_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            providers: HashMap::new(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Register the providers described by the configuration.
    pub fn from_config(config: &EditorConfig) -> Result<Self> {
        let mut providers = Self::new(config.elevation_cache_capacity);

        if let Some(grid) = &config.terrain {
            providers.register(DemServer::Internal, ElevationProvider::Terrain(grid.clone()))?;
        }

        #[cfg(feature = "http")]
        if let Some(open_elevation) = &config.open_elevation {
            let client = OpenElevationClient::new(open_elevation.clone())?;
            providers.register(DemServer::OpenElevation, ElevationProvider::OpenElevation(client))?;
        }

        info!(
            "[ElevationProviders] Registered {:?}",
            providers.servers()
        );
        Ok(providers)
    }

    /// Register a provider, returning the one it replaces.
    ///
    /// Terrain grids are validated here, so every registered grid can be
    /// sampled.
    pub fn register(
        &mut self,
        server: DemServer,
        provider: ElevationProvider,
    ) -> Result<Option<ElevationProvider>> {
        if server == DemServer::None {
            return Err(TrackError::Config {
                message: "no provider can be registered for DEM server 'none'".to_string(),
            });
        }
        if let ElevationProvider::Terrain(grid) = &provider {
            grid.validate()?;
        }
        self.invalidate(server);
        Ok(self.providers.insert(server, provider))
    }

    pub fn is_registered(&self, server: DemServer) -> bool {
        self.providers.contains_key(&server)
    }

    pub fn servers(&self) -> Vec<DemServer> {
        let mut servers: Vec<DemServer> = self.providers.keys().copied().collect();
        servers.sort_by_key(|s| s.as_str());
        servers
    }

    /// Cached lookup handle for one DEM server.
    pub fn source(&self, server: DemServer) -> Result<ProviderHandle<'_>> {
        let provider =
            self.providers
                .get(&server)
                .ok_or_else(|| TrackError::ProviderUnavailable {
                    provider: server.to_string(),
                    message: "no provider registered".to_string(),
                })?;
        Ok(ProviderHandle {
            server,
            provider,
            cache: &self.cache,
        })
    }

    /// Number of altitudes currently cached.
    pub fn cached_len(&self) -> usize {
        self.lock_cache().len()
    }

    fn invalidate(&self, server: DemServer) {
        let mut cache = self.lock_cache();
        let stale: Vec<CacheKey> = cache
            .iter()
            .filter(|(key, _)| key.0 == server)
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            cache.pop(&key);
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LruCache<CacheKey, f64>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One provider seen through the shared altitude cache.
pub struct ProviderHandle<'a> {
    server: DemServer,
    provider: &'a ElevationProvider,
    cache: &'a Mutex<LruCache<CacheKey, f64>>,
}

impl ProviderHandle<'_> {
    pub fn server(&self) -> DemServer {
        self.server
    }
}

impl ElevationSource for ProviderHandle<'_> {
    fn elevations(&self, coords: &[Coord<f64>]) -> Result<Vec<f64>> {
        let keys: Vec<CacheKey> = coords.iter().map(|c| cache_key(self.server, c)).collect();

        let mut altitudes: Vec<Option<f64>> = {
            let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
            keys.iter().map(|k| cache.get(k).copied()).collect()
        };

        let missing: Vec<usize> = (0..coords.len())
            .filter(|&i| altitudes[i].is_none())
            .collect();

        if !missing.is_empty() {
            let query: Vec<Coord<f64>> = missing.iter().map(|&i| coords[i]).collect();
            let fetched = self.provider.elevations(&query)?;
            if fetched.len() != query.len() {
                return Err(TrackError::ElevationCountMismatch {
                    expected: query.len(),
                    actual: fetched.len(),
                });
            }

            let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
            for (&i, altitude) in missing.iter().zip(fetched) {
                cache.put(keys[i], altitude);
                altitudes[i] = Some(altitude);
            }
        }

        debug!(
            "[ElevationProviders] {}: {} coords, {} from cache",
            self.server,
            coords.len(),
            coords.len() - missing.len()
        );

        Ok(altitudes.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> TerrainGrid {
        // 3x2 nodes, 0.01 degree cells starting at (6.0, 45.0)
        TerrainGrid::new(6.0, 45.0, 0.01, 3, 2, vec![100.0, 200.0, 300.0, 110.0, 210.0, 310.0])
            .unwrap()
    }

    #[test]
    fn test_dem_server_identifiers() {
        for server in [DemServer::None, DemServer::Internal, DemServer::OpenElevation] {
            assert_eq!(server.as_str().parse::<DemServer>().unwrap(), server);
        }
        assert!("srtm".parse::<DemServer>().is_err());
        assert_eq!(
            serde_json::to_string(&DemServer::OpenElevation).unwrap(),
            "\"open-elevation\""
        );
    }

    #[test]
    fn test_grid_validation() {
        assert!(TerrainGrid::new(0.0, 0.0, 0.01, 1, 2, vec![0.0, 0.0]).is_err());
        assert!(TerrainGrid::new(0.0, 0.0, 0.0, 2, 2, vec![0.0; 4]).is_err());
        assert!(TerrainGrid::new(0.0, 0.0, 0.01, 2, 2, vec![0.0; 3]).is_err());
    }

    #[test]
    fn test_register_rejects_malformed_grid() {
        let degenerate = TerrainGrid {
            origin_longitude: 6.0,
            origin_latitude: 45.0,
            cell_size: 0.01,
            columns: 1,
            rows: 2,
            heights: vec![0.0; 2],
        };
        assert_eq!(degenerate.sample(6.0, 45.0), None);

        let short = TerrainGrid {
            columns: 3,
            heights: vec![0.0; 4],
            ..degenerate.clone()
        };
        assert_eq!(short.sample(6.01, 45.005), None);

        let mut providers = ElevationProviders::new(16);
        for grid in [degenerate, short] {
            assert!(matches!(
                providers.register(DemServer::Internal, ElevationProvider::Terrain(grid)),
                Err(TrackError::Config { .. })
            ));
        }
        assert!(!providers.is_registered(DemServer::Internal));
    }

    #[test]
    fn test_grid_sampling() {
        let g = grid();
        assert!((g.sample(6.0, 45.0).unwrap() - 100.0).abs() < 1e-9);
        assert!((g.sample(6.02, 45.01).unwrap() - 310.0).abs() < 1e-9);
        // Halfway between the first two columns on the south row
        assert!((g.sample(6.005, 45.0).unwrap() - 150.0).abs() < 1e-6);
        // Center of the first cell
        assert!((g.sample(6.005, 45.005).unwrap() - 155.0).abs() < 1e-6);
        assert_eq!(g.sample(5.99, 45.0), None);
        assert_eq!(g.sample(6.0, 45.02), None);
    }

    #[test]
    fn test_grid_outside_is_unavailable() {
        let g = grid();
        let result = g.elevations(&[Coord { x: 6.0, y: 45.0 }, Coord { x: 7.0, y: 45.0 }]);
        assert!(matches!(
            result,
            Err(TrackError::ProviderUnavailable { .. })
        ));
    }

    #[test]
    fn test_registry_rejects_none() {
        let mut providers = ElevationProviders::new(16);
        assert!(providers
            .register(DemServer::None, ElevationProvider::Terrain(grid()))
            .is_err());
        assert!(matches!(
            providers.source(DemServer::Internal),
            Err(TrackError::ProviderUnavailable { .. })
        ));
    }

    #[test]
    fn test_cached_lookup() {
        let mut providers = ElevationProviders::new(16);
        providers
            .register(DemServer::Internal, ElevationProvider::Terrain(grid()))
            .unwrap();
        assert_eq!(providers.servers(), vec![DemServer::Internal]);

        let coords = vec![Coord { x: 6.0, y: 45.0 }, Coord { x: 6.01, y: 45.0 }];
        let source = providers.source(DemServer::Internal).unwrap();
        let first = source.elevations(&coords).unwrap();
        assert_eq!(first.len(), 2);
        assert!((first[1] - 200.0).abs() < 1e-9);
        assert_eq!(providers.cached_len(), 2);

        let again = source.elevations(&coords).unwrap();
        assert_eq!(first, again);
        assert_eq!(providers.cached_len(), 2);
    }

    #[test]
    fn test_register_replaces_and_invalidates() {
        let mut providers = ElevationProviders::new(16);
        providers
            .register(DemServer::Internal, ElevationProvider::Terrain(grid()))
            .unwrap();
        let coords = vec![Coord { x: 6.0, y: 45.0 }];
        providers
            .source(DemServer::Internal)
            .unwrap()
            .elevations(&coords)
            .unwrap();
        assert_eq!(providers.cached_len(), 1);

        let flat = TerrainGrid::new(6.0, 45.0, 0.01, 2, 2, vec![5.0; 4]).unwrap();
        let previous = providers
            .register(DemServer::Internal, ElevationProvider::Terrain(flat))
            .unwrap();
        assert!(previous.is_some());
        assert_eq!(providers.cached_len(), 0);

        let altitudes = providers
            .source(DemServer::Internal)
            .unwrap()
            .elevations(&coords)
            .unwrap();
        assert_eq!(altitudes, vec![5.0]);
    }
}
