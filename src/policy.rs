//! Refresh policy for the vehicle map.
//!
//! [`RefreshPolicy`] owns all mutable screen state (last result set, poll
//! timestamps, line selection) and turns inputs into [`Command`]s for the
//! driver to execute. It never sleeps, spawns or reads the clock: every input
//! that depends on time takes `now` explicitly.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};

use crate::api::{FailureKind, FetchError, VehicleQuery};
use crate::config::RefreshConfig;
use crate::lines;
use crate::models::{markers_for, Marker, Vehicle};
use crate::viewport::{bounds_of, filter_within, Bounds, LatLng};

/// Coarse state exposed to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Polling,
    LineFiltered,
}

/// Result of asking the host for the user's location
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationAccess {
    /// Permission granted; `None` when no fix is available yet
    Granted(Option<LatLng>),
    Denied,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CameraMove {
    Center { target: LatLng, zoom: f32 },
    Fit { bounds: Bounds, padding: u32 },
}

/// Transient, non-blocking message for the user
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    NoNewData { since: DateTime<Utc> },
    ApiError { since: DateTime<Utc> },
    ConnectionError { since: DateTime<Utc> },
    /// Nothing to show at all; carries the failure if the poll failed
    NoData { cause: Option<FailureKind> },
    NoVehiclesForLine(String),
    PermissionDenied,
    LineSelected(String),
    ShowingAll,
    LocationUnavailable,
}

fn format_since(since: &DateTime<Utc>) -> String {
    since
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NoNewData { since } => {
                write!(f, "no new data, showing data from {}", format_since(since))
            }
            Notice::ApiError { since } => {
                write!(f, "API error, showing data from {}", format_since(since))
            }
            Notice::ConnectionError { since } => {
                write!(f, "connection error, showing data from {}", format_since(since))
            }
            Notice::NoData { .. } => write!(f, "no data available"),
            Notice::NoVehiclesForLine(line) => write!(f, "no buses for line {}", line),
            Notice::PermissionDenied => write!(f, "permission denied for location"),
            Notice::LineSelected(line) => write!(f, "selected line {}", line),
            Notice::ShowingAll => write!(f, "showing all buses"),
            Notice::LocationUnavailable => write!(f, "could not determine current location"),
        }
    }
}

/// A poll the driver must hand to the worker
#[derive(Debug, Clone, PartialEq)]
pub struct PollTicket {
    pub seq: u64,
    pub query: VehicleQuery,
    pub forced: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Replace all markers with these
    Render(Vec<Marker>),
    ClearMarkers,
    MoveCamera(CameraMove),
    Notify(Notice),
    Poll(PollTicket),
    /// (Re)arm the debounced viewport apply, replacing any pending one
    ScheduleApply(Duration),
    /// (Re)arm the periodic refresh tick
    ScheduleTick(Duration),
}

pub type PollOutcome = Result<Vec<Vehicle>, FetchError>;

pub struct RefreshPolicy {
    config: RefreshConfig,
    center: Option<LatLng>,
    bounds: Option<Bounds>,
    zoom: f32,
    last_poll_at: Option<DateTime<Utc>>,
    initial_load: bool,
    selected_line: Option<String>,
    selected_vehicle: Option<String>,
    last_result: Vec<Vehicle>,
    next_seq: u64,
    applied_seq: u64,
    in_flight: usize,
    stopped: bool,
}

impl RefreshPolicy {
    pub fn new(config: RefreshConfig) -> Self {
        let zoom = config.default_zoom;
        Self {
            config,
            center: None,
            bounds: None,
            zoom,
            last_poll_at: None,
            initial_load: true,
            selected_line: None,
            selected_vehicle: None,
            last_result: Vec::new(),
            next_seq: 0,
            applied_seq: 0,
            in_flight: 0,
            stopped: false,
        }
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn state(&self) -> RefreshState {
        if self.selected_line.is_some() {
            RefreshState::LineFiltered
        } else if self.in_flight > 0 {
            RefreshState::Polling
        } else {
            RefreshState::Idle
        }
    }

    pub fn last_result(&self) -> &[Vehicle] {
        &self.last_result
    }

    pub fn last_poll_at(&self) -> Option<DateTime<Utc>> {
        self.last_poll_at
    }

    pub fn is_initial_load(&self) -> bool {
        self.initial_load
    }

    pub fn selected_line(&self) -> Option<&str> {
        self.selected_line.as_deref()
    }

    pub fn center(&self) -> Option<LatLng> {
        self.center
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Entries for the line picker
    pub fn line_menu(&self) -> Vec<String> {
        lines::line_menu(&self.last_result)
    }

    /// Vehicles of the last result set inside the current viewport
    pub fn visible(&self) -> Vec<Vehicle> {
        match &self.bounds {
            Some(bounds) => filter_within(bounds, &self.last_result),
            None => Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn start(&mut self, location: LocationAccess) -> Vec<Command> {
        if self.stopped {
            return Vec::new();
        }

        let mut commands = Vec::new();
        let center = match location {
            LocationAccess::Granted(Some(position)) => position,
            LocationAccess::Granted(None) => self.config.default_center,
            LocationAccess::Denied => {
                commands.push(Command::Notify(Notice::PermissionDenied));
                self.config.default_center
            }
        };

        tracing::info!(lat = center.lat, lon = center.lon, "Starting vehicle map");
        self.center = Some(center);
        self.zoom = self.config.default_zoom;
        commands.push(Command::MoveCamera(CameraMove::Center {
            target: center,
            zoom: self.config.default_zoom,
        }));

        if let Some(poll) = self.issue_poll(true) {
            commands.push(poll);
        }
        commands.push(Command::ScheduleTick(self.config.refresh_high_zoom));
        commands
    }

    /// Terminal: every later input is ignored
    pub fn stop(&mut self) {
        tracing::info!("Stopping vehicle map");
        self.stopped = true;
    }

    // ------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------

    pub fn camera_idle(&mut self, center: LatLng, bounds: Bounds, zoom: f32) -> Vec<Command> {
        if self.stopped {
            return Vec::new();
        }

        // While a line is shown the camera sits on that line; keep the
        // pre-filter center for "show all"
        if self.selected_line.is_none() {
            self.center = Some(center);
        }
        self.bounds = Some(bounds);
        self.zoom = zoom;

        vec![Command::ScheduleApply(self.config.debounce)]
    }

    /// Debounced reaction to the camera settling
    pub fn apply_viewport(&mut self, now: DateTime<Utc>) -> Vec<Command> {
        if self.stopped || self.selected_line.is_some() {
            return Vec::new();
        }

        tracing::debug!(zoom = self.zoom, "Applying viewport");

        if self.below_threshold() {
            tracing::debug!(zoom = self.zoom, "Zoom below threshold, clearing markers");
            return vec![Command::ClearMarkers];
        }

        let mut commands = Vec::new();
        if !self.last_result.is_empty() {
            if let Some(render) = self.render_current() {
                commands.push(render);
            }
        }

        if self.initial_load || self.poll_due(now) {
            if let Some(poll) = self.issue_poll(self.initial_load) {
                commands.push(poll);
            }
        }
        commands
    }

    /// Periodic refresh timer fired
    pub fn tick(&mut self, _now: DateTime<Utc>) -> Vec<Command> {
        if self.stopped {
            return Vec::new();
        }

        if self.below_threshold() {
            return vec![Command::ScheduleTick(self.config.refresh_low_zoom)];
        }

        let mut commands = Vec::new();
        if self.selected_line.is_none() {
            if let Some(poll) = self.issue_poll(true) {
                commands.push(poll);
            }
        }
        commands.push(Command::ScheduleTick(self.config.refresh_high_zoom));
        commands
    }

    /// User picked an entry from the line menu
    pub fn select_line(&mut self, line: &str) -> Vec<Command> {
        if self.stopped {
            return Vec::new();
        }
        if line == lines::SHOW_ALL {
            return self.show_all();
        }

        tracing::info!(line, "Line selected");
        self.selected_line = Some(line.to_string());

        let matching: Vec<Vehicle> = self
            .last_result
            .iter()
            .filter(|v| v.is_line(line))
            .cloned()
            .collect();

        if matching.is_empty() {
            return vec![
                Command::ClearMarkers,
                Command::Notify(Notice::NoVehiclesForLine(line.to_string())),
            ];
        }

        let mut commands = vec![
            Command::Notify(Notice::LineSelected(line.to_string())),
            Command::Render(markers_for(&matching, self.selected_vehicle.as_deref())),
        ];

        let positioned: Vec<Vehicle> = matching.into_iter().filter(|v| v.has_position()).collect();
        if let Some(bounds) = bounds_of(&positioned) {
            commands.push(Command::MoveCamera(CameraMove::Fit {
                bounds,
                padding: self.config.line_fit_padding,
            }));
        }
        commands
    }

    /// Leave the line filter and show the whole last result set
    pub fn show_all(&mut self) -> Vec<Command> {
        if self.stopped {
            return Vec::new();
        }

        tracing::info!("Showing all lines");
        self.selected_line = None;

        let mut commands = vec![Command::Notify(Notice::ShowingAll)];
        if let Some(center) = self.center {
            commands.push(Command::MoveCamera(CameraMove::Center {
                target: center,
                zoom: self.config.default_zoom,
            }));
        }
        commands.push(Command::Render(markers_for(
            &self.last_result,
            self.selected_vehicle.as_deref(),
        )));
        commands
    }

    pub fn marker_clicked(&mut self, vehicle_id: &str) {
        if !self.stopped {
            tracing::debug!(vehicle_id, "Marker selected");
            self.selected_vehicle = Some(vehicle_id.to_string());
        }
    }

    /// "My location" button
    pub fn locate_user(&mut self, location: LocationAccess) -> Vec<Command> {
        if self.stopped {
            return Vec::new();
        }
        match location {
            LocationAccess::Granted(Some(target)) => vec![Command::MoveCamera(CameraMove::Center {
                target,
                zoom: self.config.default_zoom,
            })],
            LocationAccess::Granted(None) => vec![Command::Notify(Notice::LocationUnavailable)],
            LocationAccess::Denied => vec![Command::Notify(Notice::PermissionDenied)],
        }
    }

    /// Worker finished a poll
    pub fn poll_completed(
        &mut self,
        seq: u64,
        outcome: PollOutcome,
        now: DateTime<Utc>,
    ) -> Vec<Command> {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.stopped {
            return Vec::new();
        }

        if seq <= self.applied_seq {
            tracing::debug!(seq, applied = self.applied_seq, "Discarding stale poll result");
            return Vec::new();
        }
        self.applied_seq = seq;

        match outcome {
            Ok(vehicles) if !vehicles.is_empty() => {
                tracing::info!(seq, count = vehicles.len(), "Poll succeeded");
                self.last_result = vehicles;
                self.last_poll_at = Some(match self.last_poll_at {
                    Some(previous) => previous.max(now),
                    None => now,
                });
                self.initial_load = false;
                self.render_current().into_iter().collect()
            }
            Ok(_) => {
                tracing::info!(seq, "Poll returned no vehicles");
                self.fallback(None, now)
            }
            Err(err) => {
                tracing::warn!(seq, error = %err, "Poll failed, will retry on next refresh");
                self.fallback(Some(err.kind()), now)
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn below_threshold(&self) -> bool {
        self.zoom < self.config.zoom_threshold
    }

    fn poll_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_poll_at {
            Some(last) => {
                (now - last).num_milliseconds() >= self.config.min_poll_interval.as_millis() as i64
            }
            None => true,
        }
    }

    fn issue_poll(&mut self, forced: bool) -> Option<Command> {
        // Without a viewport there is nothing to show the result in
        if self.bounds.is_none() {
            return None;
        }

        self.next_seq += 1;
        self.in_flight += 1;
        tracing::debug!(seq = self.next_seq, forced, "Requesting poll");
        Some(Command::Poll(PollTicket {
            seq: self.next_seq,
            query: VehicleQuery::all(),
            forced,
        }))
    }

    /// Render command for the current mode, if anything should be on the map
    fn render_current(&self) -> Option<Command> {
        let selected = self.selected_vehicle.as_deref();
        if let Some(line) = &self.selected_line {
            let matching: Vec<Vehicle> = self
                .last_result
                .iter()
                .filter(|v| v.is_line(line))
                .cloned()
                .collect();
            return Some(Command::Render(markers_for(&matching, selected)));
        }
        if self.below_threshold() {
            return None;
        }
        if self.bounds.is_none() {
            return None;
        }
        Some(Command::Render(markers_for(&self.visible(), selected)))
    }

    fn fallback(&self, cause: Option<FailureKind>, now: DateTime<Utc>) -> Vec<Command> {
        if self.last_result.is_empty() {
            return vec![Command::Notify(Notice::NoData { cause })];
        }

        let since = self.last_poll_at.unwrap_or(now);
        let notice = match cause {
            None => Notice::NoNewData { since },
            Some(FailureKind::Api) => Notice::ApiError { since },
            Some(FailureKind::Network) => Notice::ConnectionError { since },
        };

        let mut commands = vec![Command::Notify(notice)];
        commands.extend(self.render_current());
        commands
    }
}
