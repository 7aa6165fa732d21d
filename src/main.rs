//! Perilink demo binary
//!
//! Drives one full session lifecycle against the simulated platform
//! stack: scan, connect, an unsolicited link loss, alert acknowledge.
//! Every snapshot the session publishes is printed as a JSON line on
//! stdout; progress notes go to stderr.

use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;

use perilink_core::types::{Advertisement, DisconnectCause, PeripheralId, SelectionPredicate};
use perilink_radio::{ConnectScript, SimRadio, SimScript};
use perilink_session::{spawn_session, ConnectOutcome, SessionConfig};

/// Peripheral id used by the scripted scenario.
const SIM_PERIPHERAL: &str = "AA:BB:CC:DD";

#[derive(Parser, Debug)]
#[command(name = "perilink")]
#[command(about = "BLE central session demo against a simulated stack", long_about = None)]
struct Args {
    /// Advertised name of the peripheral to connect to
    #[arg(long, default_value = "Cart-01")]
    device: String,

    /// Discovery window in seconds
    #[arg(long, default_value_t = 8)]
    scan_window: u64,

    /// Advertise a different name, so the scan window closes empty
    #[arg(long)]
    no_match: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    perilink_core::logging::init()?;

    let advertised = if args.no_match {
        format!("not-{}", args.device)
    } else {
        args.device.clone()
    };
    let script = SimScript::new()
        .advertise(
            Duration::from_millis(400),
            Advertisement {
                id: PeripheralId::new(SIM_PERIPHERAL),
                name: Some(advertised),
                rssi: -48,
                services: Vec::new(),
            },
        )
        .on_connect(SIM_PERIPHERAL, ConnectScript::Succeed);
    let (link, sim) = SimRadio::spawn(script);

    let config = SessionConfig::default().with_scan_window(Duration::from_secs(args.scan_window));
    let session = spawn_session(config, link);

    // Mirror every published snapshot to stdout.
    let mut states = session.subscribe_state();
    let printer = tokio::spawn(async move {
        while let Some(snapshot) = states.next().await {
            match serde_json::to_string(&snapshot) {
                Ok(line) => println!("{line}"),
                Err(err) => eprintln!("snapshot encode failed: {err}"),
            }
        }
    });

    let predicate = SelectionPredicate::NameExact(args.device.clone());
    match session.request_scan_and_connect(predicate).await? {
        ConnectOutcome::Connected(handle) => {
            info!("demo connected to {}", handle.id);
            eprintln!("connected to {} ({})", handle.id, handle.display_name());
        }
        ConnectOutcome::NoMatch => {
            eprintln!("no peripheral named {:?} found", args.device);
            session.shutdown().await;
            printer.await?;
            return Ok(());
        }
    }

    // Let the link live briefly, then have the peripheral drop it.
    tokio::time::sleep(Duration::from_secs(1)).await;
    eprintln!("peripheral drops the link");
    sim.drop_link(SIM_PERIPHERAL, DisconnectCause::RemoteDropped);
    tokio::time::sleep(Duration::from_millis(200)).await;

    if session.session_state().alert.is_some() {
        eprintln!("alert raised; acknowledging");
        session.acknowledge_alert()?;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    // Ending the session closes the snapshot stream, which lets the
    // printer task finish on its own.
    session.shutdown().await;
    printer.await?;
    Ok(())
}
