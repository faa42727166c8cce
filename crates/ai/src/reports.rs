use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use missionai_core::MissionId;

/// WGS84 coordinate.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance in meters.
    pub fn haversine_m(&self, other: &GeoPoint) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// Field report as seen by the AI handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldReport {
    pub id: String,
    pub mission_id: MissionId,
    /// Report category, e.g. `medical`, `fire`, `flood`.
    pub report_type: String,
    /// 0 (informational) to 4 (critical).
    pub severity: u8,
    pub message: String,
    pub location: Option<GeoPoint>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("report source unavailable: {0}")]
pub struct ReadError(pub String);

/// Read access to field reports.
pub trait ReportReader: Send + Sync {
    fn get_report(&self, id: &str) -> Result<Option<FieldReport>, ReadError>;

    /// Fetch the reports that exist among `ids`, in the order given.
    fn get_reports(&self, ids: &[&str]) -> Result<Vec<FieldReport>, ReadError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(r) = self.get_report(id)? {
                out.push(r);
            }
        }
        Ok(out)
    }
}

impl<T: ReportReader + ?Sized> ReportReader for std::sync::Arc<T> {
    fn get_report(&self, id: &str) -> Result<Option<FieldReport>, ReadError> {
        (**self).get_report(id)
    }

    fn get_reports(&self, ids: &[&str]) -> Result<Vec<FieldReport>, ReadError> {
        (**self).get_reports(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_is_zero_for_same_point() {
        let p = GeoPoint::new(25.0330, 121.5654);
        assert!(p.haversine_m(&p) < 1e-6);
    }

    #[test]
    fn haversine_matches_known_distance() {
        // ~0.0045 degrees of latitude is ~500 m.
        let a = GeoPoint::new(25.0, 121.0);
        let b = GeoPoint::new(25.0045, 121.0);
        let d = a.haversine_m(&b);
        assert!((d - 500.4).abs() < 1.0, "distance was {d}");
    }
}
