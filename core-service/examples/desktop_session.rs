//! Drive the session screen from a terminal.
//!
//! Run with:
//! ```bash
//! cargo run -p core-service --example desktop_session -- path/to/auth_config.json
//! ```
//!
//! Then type `signin`, `signout`, `call`, `silent` or `quit`. The sign-in page
//! URL is logged; open it in a browser and the loopback presenter picks up
//! the redirect.

use bridge_traits::logger::LogLevel;
use bridge_traits::ui::{ControlState, UiSurface};
use core_runtime::config::{AppConfig, AuthConfig};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_service::{CoreService, UserAction};
use tokio::io::{AsyncBufReadExt, BufReader};

struct ConsoleScreen;

impl UiSurface for ConsoleScreen {
    fn set_controls(&self, controls: ControlState) {
        println!(
            "[controls] sign-in={} sign-out={} call={} silent={}",
            controls.sign_in,
            controls.sign_out,
            controls.call_api_interactive,
            controls.call_api_silent
        );
    }

    fn set_current_user(&self, text: &str) {
        println!("[user] {}", text);
    }

    fn set_result_text(&self, text: &str) {
        println!("[result]\n{}", text);
    }

    fn show_notice(&self, text: &str) {
        println!("[notice] {}", text);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Info),
    )?;

    let path = std::env::args()
        .nth(1)
        .ok_or("usage: desktop_session <auth_config.json>")?;
    let config = AppConfig::builder().auth(AuthConfig::load(path)?).build()?;

    let core = CoreService::bootstrap(config).await?;
    let (controller, mut ui) = core.session();
    let screen = ConsoleScreen;

    controller.on_start().await;
    ui.apply_pending(&screen);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let action = match line.trim() {
            "signin" => UserAction::SignIn,
            "signout" => UserAction::SignOut,
            "call" => UserAction::CallApiInteractive,
            "silent" => UserAction::CallApiSilent,
            "quit" => break,
            other => {
                println!("unknown command: {}", other);
                continue;
            }
        };

        controller.perform(action).await;
        ui.apply_pending(&screen);
    }

    Ok(())
}
