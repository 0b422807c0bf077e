//! Current vehicle focus, shared with the decode loop.

use tokio::sync::watch;
use wind_common::FocusPoint;

/// Publishing side of the focus channel. Held by the query path.
#[derive(Debug, Clone)]
pub struct FocusPublisher {
    tx: watch::Sender<FocusPoint>,
}

/// Reading side of the focus channel. Each read sees one whole value.
#[derive(Debug, Clone)]
pub struct FocusReader {
    rx: watch::Receiver<FocusPoint>,
}

pub fn focus_channel(initial: FocusPoint) -> (FocusPublisher, FocusReader) {
    let (tx, rx) = watch::channel(initial);
    (FocusPublisher { tx }, FocusReader { rx })
}

impl FocusPublisher {
    pub fn publish(&self, focus: FocusPoint) {
        self.tx.send_replace(focus);
    }

    pub fn current(&self) -> FocusPoint {
        *self.tx.borrow()
    }
}

impl FocusReader {
    pub fn current(&self) -> FocusPoint {
        *self.rx.borrow()
    }
}
