use std::ops::RangeInclusive;

use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use sea_orm::prelude::Decimal;
use tracing::debug;

use crate::error::{ImportError, Result};

/// EPSG:5174, Korean 1985 / Modified Central Belt.
const KOREAN_CENTRAL_BELT: &str = concat!(
    "+proj=tmerc +lat_0=38 +lon_0=127.0028902777778 +k=1 +x_0=200000 +y_0=500000",
    " +ellps=bessel +towgs84=-146.43,507.89,681.46,0,0,0,0 +units=m +no_defs"
);

/// EPSG:4326
const WGS84: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// Mainland Korea plus islands, with some margin.
const LATITUDE_BOUNDS: RangeInclusive<f64> = 33.0..=39.0;
const LONGITUDE_BOUNDS: RangeInclusive<f64> = 124.0..=132.0;

const DECIMAL_PLACES: u32 = 7;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub latitude: Decimal,
    pub longitude: Decimal,
}

/// Reprojects planar TM coordinates from the public datasets into WGS84.
/// Built once per run and shared by every row.
pub struct TmConverter {
    from: Proj,
    to: Proj,
}

impl TmConverter {
    pub fn new() -> Result<TmConverter> {
        let from = Proj::from_proj_string(KOREAN_CENTRAL_BELT)
            .map_err(|err| ImportError::Projection(err.to_string()))?;
        let to = Proj::from_proj_string(WGS84)
            .map_err(|err| ImportError::Projection(err.to_string()))?;

        Ok(TmConverter { from, to })
    }

    /// `x` is the easting and `y` the northing, exactly as they appear in the CSV.
    /// Anything unusable yields `None` instead of an error.
    pub fn convert(&self, x: &str, y: &str) -> Option<GeoPoint> {
        let x = parse_ordinate(x)?;
        let y = parse_ordinate(y)?;

        let mut point = (x, y, 0.0);
        if let Err(err) = transform(&self.from, &self.to, &mut point) {
            debug!(x, y, %err, "coordinate transform failed");
            return None;
        }

        let longitude = point.0.to_degrees();
        let latitude = point.1.to_degrees();

        if !within_korea(latitude, longitude) {
            debug!(x, y, latitude, longitude, "coordinate outside of Korea, dropped");
            return None;
        }

        Some(GeoPoint {
            latitude: round(latitude)?,
            longitude: round(longitude)?,
        })
    }
}

fn within_korea(latitude: f64, longitude: f64) -> bool {
    LATITUDE_BOUNDS.contains(&latitude) && LONGITUDE_BOUNDS.contains(&longitude)
}

fn parse_ordinate(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;

    (value != 0.0 && value.is_finite()).then_some(value)
}

fn round(value: f64) -> Option<Decimal> {
    Decimal::from_f64_retain(value).map(|d| d.round_dp(DECIMAL_PLACES))
}
