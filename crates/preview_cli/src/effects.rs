use std::sync::Arc;

use preview_core::{Effect, Msg, PreviewImage, PreviewUpdate, RowOutcome, RowStage};
use preview_engine::{
    EnrichmentRequest, EnrichmentResult, Outcome, Pipeline, PipelineEvent, ProgressSink, Stage,
    ThumbnailSource,
};
use preview_logging::{preview_debug, preview_info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Forwards pipeline events into the CLI's event loop.
struct ForwardingSink {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ProgressSink for ForwardingSink {
    fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Performs the effects requested by the viewer state against a [`Pipeline`].
pub struct EffectRunner {
    pipeline: Pipeline,
    force_render: bool,
    events: Option<mpsc::UnboundedSender<PipelineEvent>>,
    batches: Vec<JoinHandle<Vec<EnrichmentResult>>>,
}

impl EffectRunner {
    pub fn new(
        pipeline: Pipeline,
        force_render: bool,
    ) -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runner = Self {
            pipeline,
            force_render,
            events: Some(tx),
            batches: Vec::new(),
        };
        (runner, rx)
    }

    pub fn perform(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Enrich { urls } => self.spawn_batch(urls),
                Effect::Cancel => {
                    preview_info!("cancelling outstanding previews");
                    self.pipeline.cancel();
                }
            }
        }
    }

    fn spawn_batch(&mut self, urls: Vec<String>) {
        let Some(tx) = &self.events else {
            return;
        };
        preview_debug!("enqueue batch of {} urls", urls.len());
        let requests: Vec<EnrichmentRequest> = urls
            .into_iter()
            .map(|url| EnrichmentRequest::new(url).with_force_render(self.force_render))
            .collect();
        let sink: Arc<dyn ProgressSink> = Arc::new(ForwardingSink { tx: tx.clone() });
        let pipeline = self.pipeline.clone();
        let limit = pipeline.settings().concurrency_limit;
        self.batches.push(tokio::spawn(async move {
            pipeline.run(requests, limit, sink).await
        }));
    }

    /// Stops accepting new batches; the event receiver ends once every
    /// running batch has finished.
    pub fn close(&mut self) {
        self.events = None;
    }

    pub async fn finish(mut self) -> anyhow::Result<Vec<EnrichmentResult>> {
        self.close();
        let mut results = Vec::new();
        for batch in self.batches {
            results.extend(batch.await?);
        }
        Ok(results)
    }
}

pub fn to_msg(event: PipelineEvent) -> Msg {
    match event {
        PipelineEvent::Progress { url, stage } => Msg::Progress {
            url,
            stage: map_stage(stage),
        },
        PipelineEvent::Completed(result) => Msg::ResultReady(preview_update(&result)),
    }
}

fn map_stage(stage: Stage) -> RowStage {
    match stage {
        Stage::Queued => RowStage::Queued,
        Stage::Fetching => RowStage::Fetching,
        Stage::Retrying => RowStage::Retrying,
        Stage::Rendering => RowStage::Rendering,
        Stage::Extracting => RowStage::Extracting,
        Stage::Thumbnailing => RowStage::Thumbnailing,
    }
}

fn preview_update(result: &EnrichmentResult) -> PreviewUpdate {
    let reason = result
        .error_kind
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unknown error".to_string());
    let metadata = result.metadata.as_ref();
    PreviewUpdate {
        url: result.url.clone(),
        title: metadata.and_then(|m| m.title.clone()),
        description: metadata.and_then(|m| m.description.clone()),
        outcome: match result.outcome {
            Outcome::Ok => RowOutcome::Ok,
            Outcome::PartialFailure => RowOutcome::Partial { reason },
            Outcome::Failure => RowOutcome::Failed { reason },
        },
        thumbnail: result.thumbnail.as_ref().map(|thumb| PreviewImage {
            width: thumb.width,
            height: thumb.height,
            jpeg: thumb.image_bytes.clone(),
            placeholder: thumb.source == ThumbnailSource::Placeholder,
        }),
    }
}
