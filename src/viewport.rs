use crate::models::Vehicle;

/// A geographic point in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lon: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Axis-aligned rectangle in geographic coordinates, closed on every edge.
///
/// When `southwest.lon > northeast.lon` the rectangle crosses the antimeridian,
/// the same convention map SDKs use for their visible-region bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub southwest: LatLng,
    pub northeast: LatLng,
}

impl Bounds {
    pub const fn new(southwest: LatLng, northeast: LatLng) -> Self {
        Self { southwest, northeast }
    }

    pub fn contains(&self, point: LatLng) -> bool {
        let lat_ok = self.southwest.lat <= point.lat && point.lat <= self.northeast.lat;
        let (west, east) = (self.southwest.lon, self.northeast.lon);
        let lon_ok = if west <= east {
            west <= point.lon && point.lon <= east
        } else {
            point.lon >= west || point.lon <= east
        };
        lat_ok && lon_ok
    }

    /// Smallest rectangle holding every point, or `None` for an empty input.
    /// Never produces a wrapped rectangle.
    pub fn including<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = LatLng>,
    {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Bounds::new(p, p),
                Some(b) => Bounds::new(
                    LatLng::new(b.southwest.lat.min(p.lat), b.southwest.lon.min(p.lon)),
                    LatLng::new(b.northeast.lat.max(p.lat), b.northeast.lon.max(p.lon)),
                ),
            })
        })
    }

    /// Approximate visible region of a Web Mercator map of `width_px` x `height_px`
    /// centered on `center` at `zoom`.
    pub fn around(center: LatLng, zoom: f32, width_px: u32, height_px: u32) -> Self {
        let world_px = 256.0 * 2f64.powf(f64::from(zoom));
        let lon_span = 360.0 * f64::from(width_px) / world_px;
        // Mercator stretches latitude by 1/cos(lat)
        let lat_span = lon_span * f64::from(height_px) / f64::from(width_px.max(1))
            * center.lat.to_radians().cos();

        Bounds::new(
            LatLng::new(
                (center.lat - lat_span / 2.0).max(-85.0),
                wrap_lon(center.lon - lon_span / 2.0),
            ),
            LatLng::new(
                (center.lat + lat_span / 2.0).min(85.0),
                wrap_lon(center.lon + lon_span / 2.0),
            ),
        )
    }
}

fn wrap_lon(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}

/// Vehicles whose position lies inside `bounds`, in input order
pub fn filter_within(bounds: &Bounds, vehicles: &[Vehicle]) -> Vec<Vehicle> {
    vehicles
        .iter()
        .filter(|v| bounds.contains(LatLng::new(v.lat, v.lon)))
        .cloned()
        .collect()
}

/// Bounds enclosing every vehicle, used to fit the camera to a line
pub fn bounds_of(vehicles: &[Vehicle]) -> Option<Bounds> {
    Bounds::including(vehicles.iter().map(|v| LatLng::new(v.lat, v.lon)))
}
