//! Live inbox status line.
//!
//! Demonstrates:
//! - Building a Realtime facade for an authenticated endpoint
//! - Registering handlers with use_connection
//! - Watching connection state and unread count reactively
//! - Marking everything read
//!
//! Usage:
//!   SAFAR_TOKEN=... cargo run --example inbox_status
//!   SAFAR_TOKEN=... cargo run --example inbox_status -- --url ws://localhost:8000/ws/
//!   SAFAR_TOKEN=... cargo run --example inbox_status -- --debug

// ============================================================================
// Imports
// ============================================================================

use safar_realtime::{Action, ConnectionState, Endpoint, Handlers, Realtime, Result};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_URL: &str = "ws://localhost:8000/ws/";
const PREVIEW_CHARS: usize = 30;

// ============================================================================
// Args
// ============================================================================

#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    url: String,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let url = args
            .iter()
            .position(|a| a == "--url")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .unwrap_or_else(|| DEFAULT_URL.to_string());

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            url,
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "safar_realtime=debug"
    } else {
        "safar_realtime=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Inbox Status ===\n");

    let endpoint = match std::env::var("SAFAR_TOKEN") {
        Ok(token) => Endpoint::new(&args.url, token)?,
        Err(_) => {
            println!("[Setup] SAFAR_TOKEN not set, connecting anonymously");
            Endpoint::anonymous(&args.url)?
        }
    };

    let realtime = Realtime::builder().endpoint(endpoint).build()?;

    let subscription = realtime.use_connection(
        Handlers::new()
            .on_connect(|info| println!("[Connect] {} ({} retries)", info.session_id, info.retries))
            .on_disconnect(|info| {
                println!(
                    "[Disconnect] {:?} (reconnect: {})",
                    info.reason, info.will_reconnect
                )
            })
            .on_error(|notice| println!("[Error] {notice}"))
            .on_new_message(|event| {
                println!(
                    "[Message] {}: {}",
                    event.message.sender.display_name(),
                    event.message.preview(PREVIEW_CHARS)
                )
            })
            .on_new_notification(|event| println!("[Notification] {}", event.notification.message)),
    );

    let mut state = subscription.state_changes();
    let mut unread = subscription.unread_changes();

    println!("Press Ctrl+C to mark all read and exit...\n");

    loop {
        tokio::select! {
            Ok(()) = state.changed() => {
                let current = *state.borrow_and_update();
                println!("[State] {current}");
            }
            Ok(()) = unread.changed() => {
                let count = *unread.borrow_and_update();
                println!("[Unread] {count}");
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if subscription.connection_state() == ConnectionState::Connected {
        subscription.send(Action::mark_all_notifications_read())?;
    }
    subscription.acknowledge();

    println!("\n=== Done ===");
    Ok(())
}
