/// Named signals exchanged with the configuration store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Inbound: encode the current composite and write it as `filename`.
    CaptureRequested { filename: String },
    /// Outbound: `filename` is fully written.
    CaptureCompleted { filename: String },
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::CaptureRequested { .. } => "capture.requested",
            Signal::CaptureCompleted { .. } => "capture.completed",
        }
    }
}

/// Unbounded multi-producer channel carrying [`Signal`]s to the frame loop.
#[derive(Debug)]
pub struct SignalBus {
    sender: flume::Sender<Signal>,
    receiver: flume::Receiver<Signal>,
}

impl SignalBus {
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }

    pub fn publish(&self, signal: Signal) {
        log::trace!("Publishing {}", signal.name());
        if let Err(err) = self.sender.send(signal) {
            log::error!("Failed to publish signal: {}", err);
        }
    }

    /// Handle for producers on other threads.
    pub fn sender(&self) -> flume::Sender<Signal> {
        self.sender.clone()
    }

    /// Everything published so far, in order, without blocking.
    pub fn drain(&self) -> Vec<Signal> {
        self.receiver.try_iter().collect()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}
