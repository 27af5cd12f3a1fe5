//! Async driver for the vehicle map screen.
//!
//! One UI task owns the [`RefreshPolicy`] and the [`Presentation`]; it is the
//! only place screen state changes. Polls run on a single worker task that
//! executes requests strictly one after another and reports back over a
//! channel. The debounced viewport apply and the periodic refresh are single
//! deadlines in the UI task's `select!` loop, so re-arming one replaces the
//! previous deadline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::api::VehicleSource;
use crate::config::RefreshConfig;
use crate::models::Marker;
use crate::policy::{
    CameraMove, Command, LocationAccess, Notice, PollOutcome, PollTicket, RefreshPolicy,
    RefreshState,
};
use crate::viewport::{Bounds, LatLng};

/// The map front end: draws markers, moves the camera, shows notices
pub trait Presentation: Send + 'static {
    /// Replace every marker on the map with `markers`
    fn render(&mut self, markers: &[Marker]);
    fn clear(&mut self);
    fn move_camera(&mut self, camera: &CameraMove);
    fn notify(&mut self, notice: &Notice);
}

enum ScreenEvent {
    CameraIdle {
        center: LatLng,
        bounds: Bounds,
        zoom: f32,
    },
    MarkerClicked(String),
    SelectLine(String),
    ShowAll,
    LocateUser(LocationAccess),
    LineMenu(oneshot::Sender<Vec<String>>),
    State(oneshot::Sender<RefreshState>),
    Stop,
}

struct PollCompletion {
    seq: u64,
    outcome: PollOutcome,
}

/// Wall clock derived from the runtime's monotonic clock, so it never runs
/// backwards and follows paused time in tests
struct ScreenClock {
    wall: DateTime<Utc>,
    origin: Instant,
}

impl ScreenClock {
    fn new() -> Self {
        Self {
            wall: Utc::now(),
            origin: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

/// Handle to a running screen
pub struct ScreenHandle {
    events: mpsc::UnboundedSender<ScreenEvent>,
    task: JoinHandle<()>,
}

impl ScreenHandle {
    fn send(&self, event: ScreenEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Screen already stopped, dropping event");
        }
    }

    /// The camera settled on a new viewport
    pub fn camera_idle(&self, center: LatLng, bounds: Bounds, zoom: f32) {
        self.send(ScreenEvent::CameraIdle {
            center,
            bounds,
            zoom,
        });
    }

    pub fn marker_clicked(&self, vehicle_id: impl Into<String>) {
        self.send(ScreenEvent::MarkerClicked(vehicle_id.into()));
    }

    pub fn select_line(&self, line: impl Into<String>) {
        self.send(ScreenEvent::SelectLine(line.into()));
    }

    pub fn show_all(&self) {
        self.send(ScreenEvent::ShowAll);
    }

    pub fn locate_user(&self, location: LocationAccess) {
        self.send(ScreenEvent::LocateUser(location));
    }

    /// Current line picker entries, `None` once stopped
    pub async fn line_menu(&self) -> Option<Vec<String>> {
        let (tx, rx) = oneshot::channel();
        self.send(ScreenEvent::LineMenu(tx));
        rx.await.ok()
    }

    pub async fn state(&self) -> Option<RefreshState> {
        let (tx, rx) = oneshot::channel();
        self.send(ScreenEvent::State(tx));
        rx.await.ok()
    }

    /// Cancel pending timers, abort the poll worker and wait for both tasks
    pub async fn stop(self) {
        self.send(ScreenEvent::Stop);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Screen task failed");
        }
    }
}

/// Start a screen on the current tokio runtime
pub fn spawn<S, P>(
    source: Arc<S>,
    presentation: P,
    config: RefreshConfig,
    location: LocationAccess,
) -> ScreenHandle
where
    S: VehicleSource,
    P: Presentation,
{
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (completion_tx, completion_rx) = mpsc::unbounded_channel();

    let worker = tokio::spawn(run_worker(source, request_rx, completion_tx));

    let driver = Driver {
        policy: RefreshPolicy::new(config),
        presentation,
        requests: request_tx,
        clock: ScreenClock::new(),
        apply_at: None,
        tick_at: None,
    };
    let task = tokio::spawn(driver.run(location, event_rx, completion_rx, worker));

    ScreenHandle {
        events: event_tx,
        task,
    }
}

/// Single sequential poll executor
async fn run_worker<S: VehicleSource>(
    source: Arc<S>,
    mut requests: mpsc::UnboundedReceiver<PollTicket>,
    completions: mpsc::UnboundedSender<PollCompletion>,
) {
    while let Some(ticket) = requests.recv().await {
        tracing::debug!(seq = ticket.seq, forced = ticket.forced, "Worker polling");
        let outcome = source.fetch(&ticket.query).await;
        let completion = PollCompletion {
            seq: ticket.seq,
            outcome,
        };
        if completions.send(completion).is_err() {
            break;
        }
    }
    tracing::debug!("Poll worker finished");
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

struct Driver<P> {
    policy: RefreshPolicy,
    presentation: P,
    requests: mpsc::UnboundedSender<PollTicket>,
    clock: ScreenClock,
    apply_at: Option<Instant>,
    tick_at: Option<Instant>,
}

impl<P: Presentation> Driver<P> {
    async fn run(
        mut self,
        location: LocationAccess,
        mut events: mpsc::UnboundedReceiver<ScreenEvent>,
        mut completions: mpsc::UnboundedReceiver<PollCompletion>,
        worker: JoinHandle<()>,
    ) {
        let commands = self.policy.start(location);
        self.execute(commands);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    None | Some(ScreenEvent::Stop) => break,
                    Some(event) => self.handle(event),
                },
                Some(done) = completions.recv() => {
                    let now = self.clock.now();
                    let commands = self.policy.poll_completed(done.seq, done.outcome, now);
                    self.execute(commands);
                }
                _ = wait_until(self.apply_at) => {
                    self.apply_at = None;
                    let now = self.clock.now();
                    let commands = self.policy.apply_viewport(now);
                    self.execute(commands);
                }
                _ = wait_until(self.tick_at) => {
                    self.tick_at = None;
                    let now = self.clock.now();
                    let commands = self.policy.tick(now);
                    self.execute(commands);
                }
            }
        }

        self.policy.stop();
        self.apply_at = None;
        self.tick_at = None;
        drop(self.requests);

        worker.abort();
        if let Err(e) = worker.await {
            if !e.is_cancelled() {
                tracing::error!(error = %e, "Poll worker failed");
            }
        }
        tracing::info!("Screen stopped");
    }

    fn handle(&mut self, event: ScreenEvent) {
        let commands = match event {
            ScreenEvent::CameraIdle {
                center,
                bounds,
                zoom,
            } => self.policy.camera_idle(center, bounds, zoom),
            ScreenEvent::MarkerClicked(id) => {
                self.policy.marker_clicked(&id);
                Vec::new()
            }
            ScreenEvent::SelectLine(line) => self.policy.select_line(&line),
            ScreenEvent::ShowAll => self.policy.show_all(),
            ScreenEvent::LocateUser(location) => self.policy.locate_user(location),
            ScreenEvent::LineMenu(reply) => {
                let _ = reply.send(self.policy.line_menu());
                Vec::new()
            }
            ScreenEvent::State(reply) => {
                let _ = reply.send(self.policy.state());
                Vec::new()
            }
            ScreenEvent::Stop => Vec::new(),
        };
        self.execute(commands);
    }

    fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::Render(markers) => {
                    tracing::debug!(count = markers.len(), "Rendering markers");
                    self.presentation.render(&markers);
                }
                Command::ClearMarkers => self.presentation.clear(),
                Command::MoveCamera(camera) => self.presentation.move_camera(&camera),
                Command::Notify(notice) => {
                    tracing::info!(notice = %notice, "User notice");
                    self.presentation.notify(&notice);
                }
                Command::Poll(ticket) => {
                    if self.requests.send(ticket).is_err() {
                        tracing::warn!("Poll worker is gone, skipping poll");
                    }
                }
                Command::ScheduleApply(delay) => self.apply_at = Some(Instant::now() + delay),
                Command::ScheduleTick(delay) => self.tick_at = Some(Instant::now() + delay),
            }
        }
    }
}
