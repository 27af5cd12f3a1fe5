use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use trackmybus::api::WarsawClient;
use trackmybus::config::Config;
use trackmybus::lines;
use trackmybus::models::Marker;
use trackmybus::policy::{CameraMove, LocationAccess, Notice};
use trackmybus::screen::{self, Presentation};
use trackmybus::viewport::Bounds;

/// Viewport size assumed for the headless map
const VIEWPORT_WIDTH_PX: u32 = 1080;
const VIEWPORT_HEIGHT_PX: u32 = 1920;

/// Prints what a map would show
#[derive(Default)]
struct ConsolePresentation {
    render_count: u64,
}

impl Presentation for ConsolePresentation {
    fn render(&mut self, markers: &[Marker]) {
        self.render_count += 1;

        println!("\n┌─ Update #{} ─────────────────────────────────────", self.render_count);
        println!("│ Time: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
        println!("└────────────────────────────────────────────────────");

        if markers.is_empty() {
            println!("\n⚠️  No vehicles in view");
            return;
        }

        let mut by_line: BTreeMap<&str, Vec<&Marker>> = BTreeMap::new();
        for marker in markers {
            by_line.entry(marker.label.as_str()).or_default().push(marker);
        }
        let mut line_ids: Vec<&str> = by_line.keys().copied().collect();
        lines::sort_lines(&mut line_ids);

        println!("\n📊 Summary: {} vehicles on {} lines", markers.len(), line_ids.len());
        for line in line_ids {
            let vehicles = &by_line[line];
            println!("\n🚌 Line {} ({} vehicles):", line, vehicles.len());
            for marker in vehicles.iter().take(3) {
                let flag = if marker.selected { " ◀" } else { "" };
                println!("  {} at ({:.6}, {:.6}){}", marker.id, marker.lat, marker.lon, flag);
            }
            if vehicles.len() > 3 {
                println!("  ... and {} more", vehicles.len() - 3);
            }
        }
    }

    fn clear(&mut self) {
        println!("\n🧹 Zoomed out, markers cleared");
    }

    fn move_camera(&mut self, camera: &CameraMove) {
        match camera {
            CameraMove::Center { target, zoom } => {
                tracing::info!(lat = target.lat, lon = target.lon, zoom, "Camera centered")
            }
            CameraMove::Fit { bounds, padding } => {
                tracing::info!(?bounds, padding, "Camera fitted")
            }
        }
    }

    fn notify(&mut self, notice: &Notice) {
        println!("\n💬 {}", notice);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .init();

    tracing::info!("Warsaw Live Bus Map (headless)");

    let config = Config::from_env().context("Failed to load configuration")?;
    let client = WarsawClient::new(config.api.clone()).context("Failed to create HTTP client")?;
    tracing::info!(endpoint = %client.endpoint(), "API client ready");

    let center = config.refresh.default_center;
    let zoom = config.refresh.default_zoom;

    let screen = screen::spawn(
        Arc::new(client),
        ConsolePresentation::default(),
        config.refresh.clone(),
        LocationAccess::Granted(None),
    );

    // No real map here: report a settled camera over the default center
    screen.camera_idle(
        center,
        Bounds::around(center, zoom, VIEWPORT_WIDTH_PX, VIEWPORT_HEIGHT_PX),
        zoom,
    );

    tracing::info!("Polling; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    screen.stop().await;
    Ok(())
}
