use std::sync::mpsc;

use crate::PipelineEvent;

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: PipelineEvent) {}
}

pub struct ChannelProgressSink {
    tx: mpsc::Sender<PipelineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}
