//! Monitored region types and the bounded region allocator.
//!
//! A region is a circular geographic area tied to a task and a proximity
//! tier. The platform can only watch a small, fixed number of regions at
//! once, so [`RegionAllocator`] owns the active set and evicts by
//! priority when the ceiling is hit.

pub mod allocator;

pub use allocator::{CapacityChange, RegionAllocator, RegisterOutcome, UnregisterAllOutcome};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Geographic coordinate (WGS84 degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        let point = Self {
            latitude,
            longitude,
        };
        point.validate()?;
        Ok(point)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.latitude.is_finite() || self.latitude.abs() > 90.0 {
            return Err(ValidationError::InvalidLatitude(self.latitude));
        }
        if !self.longitude.is_finite() || self.longitude.abs() > 180.0 {
            return Err(ValidationError::InvalidLongitude(self.longitude));
        }
        Ok(())
    }

    /// Great-circle distance to `other` in meters (haversine).
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();
        EARTH_RADIUS_M * c
    }
}

/// Proximity tier of a monitored region.
///
/// Ordering matters: variants are declared lowest priority first so the
/// derived `Ord` matches eviction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegionType {
    #[serde(rename = "approach-5mi")]
    Approach5Mi,
    #[serde(rename = "approach-3mi")]
    Approach3Mi,
    #[serde(rename = "approach-1mi")]
    Approach1Mi,
    #[serde(rename = "arrival")]
    Arrival,
    #[serde(rename = "post-arrival")]
    PostArrival,
}

impl RegionType {
    /// Derived priority, 1 (lowest) to 5 (highest).
    pub fn priority(self) -> u8 {
        match self {
            RegionType::Approach5Mi => 1,
            RegionType::Approach3Mi => 2,
            RegionType::Approach1Mi => 3,
            RegionType::Arrival => 4,
            RegionType::PostArrival => 5,
        }
    }

    /// Default radius for the tier in meters.
    pub fn default_radius_meters(self) -> f64 {
        match self {
            RegionType::Approach5Mi => 8_046.7,
            RegionType::Approach3Mi => 4_828.0,
            RegionType::Approach1Mi => 1_609.3,
            RegionType::Arrival => 100.0,
            RegionType::PostArrival => 50.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegionType::Approach5Mi => "approach-5mi",
            RegionType::Approach3Mi => "approach-3mi",
            RegionType::Approach1Mi => "approach-1mi",
            RegionType::Arrival => "arrival",
            RegionType::PostArrival => "post-arrival",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approach-5mi" => Some(RegionType::Approach5Mi),
            "approach-3mi" => Some(RegionType::Approach3Mi),
            "approach-1mi" => Some(RegionType::Approach1Mi),
            "arrival" => Some(RegionType::Arrival),
            "post-arrival" => Some(RegionType::PostArrival),
            _ => None,
        }
    }

    pub fn all() -> [RegionType; 5] {
        [
            RegionType::Approach5Mi,
            RegionType::Approach3Mi,
            RegionType::Approach1Mi,
            RegionType::Arrival,
            RegionType::PostArrival,
        ]
    }
}

/// A circular geographic area monitored on behalf of a task.
///
/// One task may own multiple regions, one per proximity tier. Regions are
/// owned exclusively by [`RegionAllocator`] and destroyed when their task
/// is deleted, completed, or muted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredRegion {
    pub id: String,
    pub task_id: String,
    pub center: GeoPoint,
    pub radius_meters: f64,
    pub region_type: RegionType,
    pub created_at: DateTime<Utc>,
}

impl MonitoredRegion {
    /// Build a region with a fresh id, validating coordinates and radius.
    ///
    /// # Errors
    /// Returns a validation error for out-of-range coordinates or a
    /// non-positive radius; invalid regions never reach eviction logic.
    pub fn new(
        task_id: impl Into<String>,
        center: GeoPoint,
        radius_meters: f64,
        region_type: RegionType,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        center.validate()?;
        if !radius_meters.is_finite() || radius_meters <= 0.0 {
            return Err(ValidationError::InvalidRadius(radius_meters));
        }
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            center,
            radius_meters,
            region_type,
            created_at: now,
        })
    }

    /// Derived priority of the region, 1-5 (post-arrival highest).
    pub fn priority(&self) -> u8 {
        self.region_type.priority()
    }
}
