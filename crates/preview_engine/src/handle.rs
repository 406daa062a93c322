use std::io;
use std::sync::{mpsc, Arc};
use std::thread;

use preview_logging::preview_debug;

use crate::sink::ChannelProgressSink;
use crate::{EnrichmentRequest, Pipeline, PipelineEvent};

enum HandleCommand {
    Enqueue(Vec<EnrichmentRequest>),
    Shutdown,
}

/// Runs a [`Pipeline`] on a background thread with its own Tokio runtime, for
/// front ends that poll from a synchronous loop.
///
/// Each `enqueue` call is enriched as its own batch; results arrive as
/// [`PipelineEvent::Completed`] through [`PipelineHandle::try_recv`].
pub struct PipelineHandle {
    pipeline: Pipeline,
    cmd_tx: mpsc::Sender<HandleCommand>,
    event_rx: mpsc::Receiver<PipelineEvent>,
}

impl PipelineHandle {
    pub fn new(pipeline: Pipeline) -> io::Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let runtime = tokio::runtime::Runtime::new()?;
        let worker = pipeline.clone();

        thread::Builder::new()
            .name("preview-pipeline".to_string())
            .spawn(move || {
                let sink = Arc::new(ChannelProgressSink::new(event_tx));
                let limit = worker.settings().concurrency_limit;
                while let Ok(command) = cmd_rx.recv() {
                    match command {
                        HandleCommand::Enqueue(requests) => {
                            let pipeline = worker.clone();
                            let sink = sink.clone();
                            runtime.spawn(async move {
                                pipeline.run(requests, limit, sink).await;
                            });
                        }
                        HandleCommand::Shutdown => break,
                    }
                }
                runtime.block_on(worker.shutdown());
                preview_debug!("pipeline thread stopped");
            })?;

        Ok(Self {
            pipeline,
            cmd_tx,
            event_rx,
        })
    }

    pub fn enqueue(&self, requests: Vec<EnrichmentRequest>) {
        let _ = self.cmd_tx.send(HandleCommand::Enqueue(requests));
    }

    /// Cancel everything queued or in flight. Pending URLs still report a
    /// `Cancelled` result.
    pub fn cancel(&self) {
        self.pipeline.cancel();
    }

    pub fn try_recv(&self) -> Option<PipelineEvent> {
        self.event_rx.try_recv().ok()
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.pipeline.cancel();
        let _ = self.cmd_tx.send(HandleCommand::Shutdown);
    }
}
