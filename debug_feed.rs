use anyhow::Context;
use trackmybus::api::{parse_response, VehicleQuery, WarsawClient};
use trackmybus::config::Config;
use trackmybus::lines;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let client = WarsawClient::new(config.api).context("Failed to create HTTP client")?;

    // Optional line filter as the first argument
    let query = match std::env::args().nth(1) {
        Some(line) => VehicleQuery::line(line),
        None => VehicleQuery::all(),
    };

    println!("Fetching from: {}", client.endpoint());
    let bytes = client.fetch_raw(&query).await?;

    println!("Received {} bytes", bytes.len());

    let vehicles = parse_response(&bytes)?;

    println!("Number of vehicles: {}", vehicles.len());
    println!("Lines: {}", lines::distinct_lines(&vehicles).join(", "));

    for (i, vehicle) in vehicles.iter().enumerate() {
        println!("\n--- Vehicle {} ---", i);
        println!("  Line: {}", vehicle.line);
        println!("  Vehicle number: {}", vehicle.vehicle_id);
        println!("  Brigade: {}", vehicle.brigade);

        if vehicle.has_position() {
            println!("  Position: {}, {}", vehicle.lat, vehicle.lon);
        } else {
            println!("  Position: NONE");
        }

        println!("  Time: {}", vehicle.timestamp);
    }

    Ok(())
}
