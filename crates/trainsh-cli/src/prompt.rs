//! Prompt rendering.

use owo_colors::OwoColorize;
use trainsh_session::{Session, SessionId};

use crate::PRODUCT;

/// Text before the product name: `OK ` or `E<code> `.
#[must_use]
pub fn exit_status_badge(status: Option<i32>, color: bool) -> String {
    match status {
        None | Some(0) if color => format!("{} ", "OK".green()),
        None | Some(0) => "OK ".to_string(),
        Some(code) if color => format!("{} ", format!("E{code:02}").red()),
        Some(code) => format!("E{code:02} "),
    }
}

/// `OK trainsh(@0 docker://d9443b195d16)> `
#[must_use]
pub fn render(
    status: Option<i32>,
    id: SessionId,
    backend: &str,
    host: &str,
    color: bool,
) -> String {
    format!(
        "{}{PRODUCT}(@{id} {backend}://{host})> ",
        exit_status_badge(status, color)
    )
}

/// Prompt for a session.
#[must_use]
pub fn for_session(id: SessionId, session: &Session, color: bool) -> String {
    let host = session.host().unwrap_or_else(|| "unknown".to_string());
    render(
        session.last_exit_status(),
        id,
        session.backend(),
        &host,
        color,
    )
}

/// Prompt when nothing is connected.
#[must_use]
pub fn disconnected() -> String {
    format!("{PRODUCT}> ")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use trainsh_core::{TransportRegistry, fake::FakeTransport};
    use trainsh_session::SessionRegistry;

    use super::*;

    #[test]
    fn test_badges() {
        assert_eq!(exit_status_badge(None, false), "OK ");
        assert_eq!(exit_status_badge(Some(0), false), "OK ");
        assert_eq!(exit_status_badge(Some(1), false), "E01 ");
        assert_eq!(exit_status_badge(Some(127), false), "E127 ");
        assert_eq!(exit_status_badge(Some(-1), false), "E-1 ");
    }

    #[test]
    fn test_colored_badge_keeps_text() {
        let badge = exit_status_badge(Some(2), true);
        assert!(badge.contains("E02"));
        assert_ne!(badge, "E02 ");
    }

    #[tokio::test]
    async fn test_session_prompt() {
        let transports = TransportRegistry::new().with(FakeTransport::posix());
        let mut registry = SessionRegistry::new(transports);
        let id = registry.use_session("fake://box").await.unwrap();
        let session = registry.get(id).unwrap();

        assert_eq!(for_session(id, &session, false), "OK trainsh(@0 fake://box)> ");
        session.run("false").await.unwrap();
        assert_eq!(for_session(id, &session, false), "E01 trainsh(@0 fake://box)> ");
    }
}
