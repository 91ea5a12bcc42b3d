//! Connect to an OpenIGTLink peer and log every message it sends
//!
//! # Usage
//!
//! ```bash
//! IGTL_HOST=127.0.0.1 IGTL_PORT=18944 RUST_LOG=info cargo run --bin igtl-listen
//! ```
//!
//! Exits on Ctrl+C or when the peer closes the connection.

use openigtlink_codec::config::SessionConfig;
use openigtlink_codec::io::{AsyncSession, SessionEvent};
use openigtlink_codec::mesh::TriangleMesh;
use openigtlink_codec::protocol::AnyMessage;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SessionConfig::from_env()?;
    let mut session = AsyncSession::connect(&config).await?;
    info!(addr = %config.address(), "Listening, press Ctrl+C to exit");

    let mut received = 0usize;
    let mut dropped = 0usize;
    let result = session
        .run_until(tokio::signal::ctrl_c(), |event| match event {
            SessionEvent::Message(msg) => {
                received += 1;
                describe(&msg);
            }
            SessionEvent::Dropped(err) => {
                dropped += 1;
                warn!(error = %err, "Frame dropped");
            }
            SessionEvent::Stalled {
                buffered, elapsed, ..
            } => warn!(
                buffered = buffered,
                elapsed_s = elapsed.as_secs(),
                "Waiting for the rest of a frame"
            ),
        })
        .await;

    info!(received = received, dropped = dropped, "Session ended");
    if let Err(e) = result {
        error!(error = %e, "Session failed");
        return Err(e.into());
    }
    Ok(())
}

fn describe(msg: &AnyMessage) {
    let device = msg.device_name().unwrap_or("UNKNOWN");
    let timestamp = msg.header().timestamp.to_f64();
    match msg {
        AnyMessage::Transform(m) => {
            let [x, y, z] = m.content.position();
            info!(device = device, timestamp = timestamp, x = x, y = y, z = z, "TRANSFORM");
        }
        AnyMessage::Image(m) => {
            let image = &m.content;
            info!(
                device = device,
                timestamp = timestamp,
                size = ?image.size,
                scalar_type = ?image.scalar_type,
                components = image.num_components,
                "IMAGE"
            );
        }
        AnyMessage::PolyData(m) => match TriangleMesh::from_polydata(&m.content) {
            Ok(mesh) => info!(
                device = device,
                points = mesh.positions.len(),
                triangles = mesh.triangle_count(),
                colored = mesh.colors.is_some(),
                "POLYDATA"
            ),
            Err(e) => warn!(device = device, error = %e, "POLYDATA without a usable mesh"),
        },
        AnyMessage::String(m) => {
            info!(device = device, text = m.content.as_str(), "STRING");
        }
    }
    for entry in msg.metadata() {
        info!(
            key = %entry.key,
            value = %entry.value_str().unwrap_or_default(),
            "  metadata"
        );
    }
}
