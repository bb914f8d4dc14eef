//! UI update dispatch.
//!
//! Controller operations run on tokio worker threads, but a [`UiSurface`]
//! may only be touched from the thread that owns it. The controller sends
//! [`UiUpdate`]s through a [`UiDispatcher`]; the UI thread drains them with
//! [`UiReceiver::apply_pending`] (from its own event loop) or
//! [`UiReceiver::run`] (as a local task).

use bridge_traits::ui::{ControlState, UiSurface};
use tokio::sync::mpsc;
use tracing::debug;

/// A single change to the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiUpdate {
    Controls(ControlState),
    CurrentUser(String),
    ResultText(String),
    Notice(String),
}

impl UiUpdate {
    pub fn apply(&self, surface: &dyn UiSurface) {
        match self {
            UiUpdate::Controls(controls) => surface.set_controls(*controls),
            UiUpdate::CurrentUser(text) => surface.set_current_user(text),
            UiUpdate::ResultText(text) => surface.set_result_text(text),
            UiUpdate::Notice(text) => surface.show_notice(text),
        }
    }
}

/// Sending half, cloned into every controller task.
#[derive(Debug, Clone)]
pub struct UiDispatcher {
    sender: mpsc::UnboundedSender<UiUpdate>,
}

/// Receiving half, owned by the UI thread.
#[derive(Debug)]
pub struct UiReceiver {
    receiver: mpsc::UnboundedReceiver<UiUpdate>,
}

/// Create a connected dispatcher/receiver pair.
pub fn ui_channel() -> (UiDispatcher, UiReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (UiDispatcher { sender }, UiReceiver { receiver })
}

impl UiDispatcher {
    /// Queue an update. Updates sent after the receiver is gone are dropped.
    pub fn send(&self, update: UiUpdate) {
        if self.sender.send(update).is_err() {
            debug!("UI receiver dropped, discarding update");
        }
    }

    pub fn set_controls(&self, controls: ControlState) {
        self.send(UiUpdate::Controls(controls));
    }

    pub fn set_current_user(&self, text: impl Into<String>) {
        self.send(UiUpdate::CurrentUser(text.into()));
    }

    pub fn set_result_text(&self, text: impl Into<String>) {
        self.send(UiUpdate::ResultText(text.into()));
    }

    pub fn show_notice(&self, text: impl Into<String>) {
        self.send(UiUpdate::Notice(text.into()));
    }
}

impl UiReceiver {
    /// Apply every queued update without waiting. Returns how many were applied.
    pub fn apply_pending(&mut self, surface: &dyn UiSurface) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.receiver.try_recv() {
            update.apply(surface);
            applied += 1;
        }
        applied
    }

    /// Apply updates as they arrive until every dispatcher is dropped.
    pub async fn run(mut self, surface: &dyn UiSurface) {
        while let Some(update) = self.receiver.recv().await {
            update.apply(surface);
        }
        debug!("All UI dispatchers dropped");
    }

    /// Wait for the next update.
    pub async fn recv(&mut self) -> Option<UiUpdate> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Screen {
        log: RefCell<Vec<String>>,
    }

    impl UiSurface for Screen {
        fn set_controls(&self, controls: ControlState) {
            self.log
                .borrow_mut()
                .push(format!("controls:{}", controls.is_authenticated()));
        }

        fn set_current_user(&self, text: &str) {
            self.log.borrow_mut().push(format!("user:{text}"));
        }

        fn set_result_text(&self, text: &str) {
            self.log.borrow_mut().push(format!("result:{text}"));
        }

        fn show_notice(&self, text: &str) {
            self.log.borrow_mut().push(format!("notice:{text}"));
        }
    }

    #[test]
    fn test_apply_pending_preserves_order() {
        let (dispatcher, mut receiver) = ui_channel();
        let screen = Screen::default();

        dispatcher.set_controls(ControlState::authenticated());
        dispatcher.set_current_user("ada");
        dispatcher.show_notice("hello");

        assert_eq!(receiver.apply_pending(&screen), 3);
        assert_eq!(
            *screen.log.borrow(),
            vec!["controls:true", "user:ada", "notice:hello"]
        );
        assert_eq!(receiver.apply_pending(&screen), 0);
    }

    #[tokio::test]
    async fn test_run_stops_when_dispatchers_dropped() {
        let (dispatcher, receiver) = ui_channel();
        let screen = Screen::default();

        let worker = dispatcher.clone();
        tokio::spawn(async move {
            worker.set_result_text("done");
        })
        .await
        .unwrap();
        drop(dispatcher);

        receiver.run(&screen).await;
        assert_eq!(*screen.log.borrow(), vec!["result:done"]);
    }

    #[test]
    fn test_send_after_receiver_dropped_is_ignored() {
        let (dispatcher, receiver) = ui_channel();
        drop(receiver);
        dispatcher.show_notice("nobody listening");
    }
}
