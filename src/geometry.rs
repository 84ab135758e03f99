use serde::{Deserialize, Serialize};

/// Mean earth radius in nautical miles.
pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Nautical miles per degree of latitude.
pub const NM_PER_DEG: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat_deg: f64,
    pub lon_deg: f64,
}

impl GeoPoint {
    pub fn new(lat_deg: f64, lon_deg: f64) -> Self {
        Self {
            lat_deg,
            lon_deg: normalize_lon(lon_deg),
        }
    }

    /// Great-circle distance in nautical miles (haversine).
    pub fn distance_nm(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.lat_deg.to_radians();
        let lat2 = other.lat_deg.to_radians();
        let dlat = (other.lat_deg - self.lat_deg).to_radians();
        let dlon = (other.lon_deg - self.lon_deg).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * a.sqrt().min(1.0).asin() * EARTH_RADIUS_NM
    }

    /// Initial great-circle bearing towards `other`, degrees clockwise from north.
    pub fn bearing_deg_to(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.lat_deg.to_radians();
        let lat2 = other.lat_deg.to_radians();
        let dlon = (other.lon_deg - self.lon_deg).to_radians();

        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
        normalize_heading(y.atan2(x).to_degrees())
    }

    /// Destination point after travelling `dist_nm` on the given initial bearing.
    pub fn project(&self, bearing_deg: f64, dist_nm: f64) -> GeoPoint {
        let delta = dist_nm / EARTH_RADIUS_NM;
        let theta = bearing_deg.to_radians();
        let lat1 = self.lat_deg.to_radians();
        let lon1 = self.lon_deg.to_radians();

        let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
        let lon2 = lon1
            + (theta.sin() * delta.sin() * lat1.cos())
                .atan2(delta.cos() - lat1.sin() * lat2.sin());

        GeoPoint::new(lat2.to_degrees(), lon2.to_degrees())
    }
}

/// Wraps a heading into [0, 360).
pub fn normalize_heading(deg: f64) -> f64 {
    let d = deg % 360.0;
    if d < 0.0 {
        d + 360.0
    } else {
        d
    }
}

/// Wraps a longitude into [-180, 180).
pub fn normalize_lon(deg: f64) -> f64 {
    let d = (deg + 180.0) % 360.0;
    if d < 0.0 {
        d + 360.0 - 180.0
    } else {
        d - 180.0
    }
}

/// Signed shortest longitude difference `to - from` in degrees.
fn lon_delta(from: f64, to: f64) -> f64 {
    normalize_lon(to - from)
}

/// Flat tangent frame aligned with a first-leg heading. `along` runs with the
/// heading, `across` 90 degrees to its right. Accurate to well under a percent
/// at search-pattern scales; the full spherical machinery stays behind the
/// `PlanScorer` trait.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    origin: GeoPoint,
    cos_lat: f64,
    sin_h: f64,
    cos_h: f64,
}

impl LocalFrame {
    pub fn new(origin: GeoPoint, heading_deg: f64) -> Self {
        let h = heading_deg.to_radians();
        Self {
            origin,
            cos_lat: origin.lat_deg.to_radians().cos(),
            sin_h: h.sin(),
            cos_h: h.cos(),
        }
    }

    pub fn origin(&self) -> GeoPoint {
        self.origin
    }

    /// (along, across) coordinates of `p` in nautical miles.
    pub fn to_local(&self, p: &GeoPoint) -> (f64, f64) {
        let east = lon_delta(self.origin.lon_deg, p.lon_deg) * self.cos_lat * NM_PER_DEG;
        let north = (p.lat_deg - self.origin.lat_deg) * NM_PER_DEG;

        let along = north * self.cos_h + east * self.sin_h;
        let across = east * self.cos_h - north * self.sin_h;
        (along, across)
    }

    pub fn to_geo(&self, along_nm: f64, across_nm: f64) -> GeoPoint {
        let east = along_nm * self.sin_h + across_nm * self.cos_h;
        let north = along_nm * self.cos_h - across_nm * self.sin_h;

        let lat = self.origin.lat_deg + north / NM_PER_DEG;
        let lon = self.origin.lon_deg + east / (self.cos_lat.max(1e-9) * NM_PER_DEG);
        GeoPoint::new(lat, lon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_then_measure_round_trips() {
        let start = GeoPoint::new(37.5, -123.0);
        let there = start.project(63.0, 42.0);
        assert!((start.distance_nm(&there) - 42.0).abs() < 1e-6);
        assert!((start.bearing_deg_to(&there) - 63.0).abs() < 0.05);
    }

    #[test]
    fn local_frame_round_trips() {
        let frame = LocalFrame::new(GeoPoint::new(40.0, -70.0), 25.0);
        let p = frame.to_geo(12.0, -7.5);
        let (along, across) = frame.to_local(&p);
        assert!((along - 12.0).abs() < 0.05);
        assert!((across + 7.5).abs() < 0.05);
    }
}
