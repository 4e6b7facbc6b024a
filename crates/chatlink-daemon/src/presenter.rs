//! Prints session notices for the operator.
//!
//! Linking codes go to stdout as a terminal QR code followed by the raw
//! code.

use chatlink_core::{EventBus, SessionNotice};
use qrcode::render::unicode::Dense1x2;
use qrcode::QrCode;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Subscribe to the bus and print notices until it closes.
pub fn spawn(bus: &EventBus) -> JoinHandle<()> {
    let mut notices = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => {
                    if let Some(line) = render(&notice) {
                        println!("{}", line);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Presenter skipped {} session notice(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Operator-facing line for a notice, if it warrants one.
pub fn render(notice: &SessionNotice) -> Option<String> {
    match notice {
        SessionNotice::LinkingCode { code } => match render_qr(code) {
            Some(qr) => Some(format!("Scan to link this device:\n{}\n{}", qr, code)),
            None => Some(format!("Scan to link this device:\n{}", code)),
        },
        SessionNotice::StateChanged { to, .. } if to == "ready" => {
            Some("Session ready".to_string())
        }
        SessionNotice::StateChanged { .. } => None,
    }
}

/// Two rows of modules per text line, light-on-dark for terminals.
fn render_qr(code: &str) -> Option<String> {
    match QrCode::new(code.as_bytes()) {
        Ok(qr) => Some(
            qr.render::<Dense1x2>()
                .dark_color(Dense1x2::Light)
                .light_color(Dense1x2::Dark)
                .build(),
        ),
        Err(e) => {
            log::warn!("Cannot render linking code as QR: {}", e);
            None
        }
    }
}
