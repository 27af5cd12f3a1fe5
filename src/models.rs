use serde::{Deserialize, Serialize};

/// A single vehicle position as reported by one poll of the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Line identifier (e.g. "123", "N61", "E-2")
    #[serde(rename = "Lines")]
    pub line: String,

    /// Current latitude
    #[serde(rename = "Lat")]
    pub lat: f64,

    /// Current longitude
    #[serde(rename = "Lon")]
    pub lon: f64,

    /// Time of the GPS fix, as formatted by the API
    #[serde(rename = "Time")]
    pub timestamp: String,

    /// Unique vehicle identifier (side number)
    #[serde(rename = "VehicleNumber")]
    pub vehicle_id: String,

    /// Brigade (duty) identifier within the line
    #[serde(rename = "Brigade", default)]
    pub brigade: String,
}

impl Vehicle {
    /// Create a vehicle with an empty timestamp and brigade
    pub fn new(line: &str, vehicle_id: &str, lat: f64, lon: f64) -> Self {
        Self {
            line: line.to_string(),
            lat,
            lon,
            timestamp: String::new(),
            vehicle_id: vehicle_id.to_string(),
            brigade: String::new(),
        }
    }

    /// Check if this vehicle runs on the given line
    pub fn is_line(&self, line: &str) -> bool {
        self.line == line
    }

    /// The API reports unknown positions as zero coordinates
    pub fn has_position(&self) -> bool {
        self.lat != 0.0 && self.lon != 0.0
    }
}

impl std::fmt::Display for Vehicle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Vehicle {} on line {} (brigade {}) at ({:.6}, {:.6}) [{}]",
            self.vehicle_id, self.line, self.brigade, self.lat, self.lon, self.timestamp
        )
    }
}

/// Marker descriptor handed to the map presentation
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    /// Short text drawn on the marker itself (the line)
    pub label: String,
    /// Info window title
    pub title: String,
    /// Whether the user last clicked this marker
    pub selected: bool,
}

impl Marker {
    pub fn for_vehicle(vehicle: &Vehicle, selected_id: Option<&str>) -> Self {
        Self {
            id: vehicle.vehicle_id.clone(),
            lat: vehicle.lat,
            lon: vehicle.lon,
            label: vehicle.line.clone(),
            title: format!("Line: {} | Vehicle: {}", vehicle.line, vehicle.vehicle_id),
            selected: selected_id == Some(vehicle.vehicle_id.as_str()),
        }
    }
}

/// Build markers for every vehicle with a known position, keeping input order
pub fn markers_for(vehicles: &[Vehicle], selected_id: Option<&str>) -> Vec<Marker> {
    vehicles
        .iter()
        .filter(|v| v.has_position())
        .map(|v| Marker::for_vehicle(v, selected_id))
        .collect()
}
