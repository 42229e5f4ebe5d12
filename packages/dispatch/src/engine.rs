//! Pull-based pipeline engine: stages, descriptors and the run loop.
//!
//! A run pulls documents from a [`CollectionReader`] one at a time, pushes
//! each through every stage in order and resets the shared [`WorkBuffer`]
//! before the next one. When the reader reports no more work the stages'
//! completion hooks run once and the run ends.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use stream_core::WorkBuffer;

use crate::error::{EngineError, JobError, StageError, panic_message};
use crate::sink::{ResultHandler, ResultSink};

/// A single processing step of a pipeline.
///
/// Each worker owns its own stage instances, so implementations may keep
/// mutable state without synchronization.
pub trait Stage: Send {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Called once after construction, before the first document.
    fn initialize(&mut self) -> Result<(), StageError> {
        Ok(())
    }

    /// Process the document currently in `buffer`.
    fn process(&mut self, buffer: &mut WorkBuffer) -> Result<(), StageError>;

    /// Called once when the reader has no more documents.
    fn collection_process_complete(&mut self) -> Result<(), StageError> {
        Ok(())
    }
}

/// Source of documents for a pipeline run.
pub trait CollectionReader {
    /// Block until a document is staged (true) or no more will come (false).
    fn has_next(&mut self) -> bool;

    /// Load the staged document into `buffer`.
    fn get_next(&mut self, buffer: &mut WorkBuffer) -> Result<(), EngineError>;
}

type BuildFn = dyn Fn() -> Result<Box<dyn Stage>, StageError> + Send + Sync;

/// Recipe for creating fresh instances of one stage.
#[derive(Clone)]
pub struct StageFactory {
    name: String,
    build: Arc<BuildFn>,
}

impl StageFactory {
    /// Create a factory from a fallible constructor.
    pub fn new<S, F>(name: impl Into<String>, build: F) -> Self
    where
        S: Stage + 'static,
        F: Fn() -> Result<S, StageError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            build: Arc::new(move || build().map(|stage| Box::new(stage) as Box<dyn Stage>)),
        }
    }

    /// Create a factory that clones a template stage for each instance.
    pub fn cloned<S>(stage: S) -> Self
    where
        S: Stage + Clone + Sync + 'static,
    {
        let name = stage.name().to_string();
        Self::new(name, move || Ok(stage.clone()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self) -> Result<Box<dyn Stage>, StageError> {
        let mut stage = (self.build)()?;
        stage.initialize()?;
        Ok(stage)
    }
}

impl std::fmt::Debug for StageFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageFactory").field("name", &self.name).finish()
    }
}

/// Ordered description of a stream's pipeline.
///
/// The optional metadata stage always runs first, followed by the
/// pipeline stages in registration order.
#[derive(Debug, Clone, Default)]
pub struct PipelineDescriptor {
    metadata: Option<StageFactory>,
    stages: Vec<StageFactory>,
}

impl PipelineDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stage that processes metadata before the pipeline proper.
    pub fn with_metadata_stage(mut self, factory: StageFactory) -> Self {
        self.metadata = Some(factory);
        self
    }

    /// Append a pipeline stage.
    pub fn with_stage(mut self, factory: StageFactory) -> Self {
        self.stages.push(factory);
        self
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.metadata
            .iter()
            .chain(self.stages.iter())
            .map(StageFactory::name)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Check that the descriptor can produce a working pipeline.
    pub fn validate(&self) -> Result<(), StageError> {
        if self.is_empty() {
            return Err(StageError::new("pipeline", "no pipeline stages registered"));
        }
        self.instantiate().map(|_| ())
    }

    /// Instantiate every stage without the result handler.
    pub fn instantiate(&self) -> Result<Pipeline, StageError> {
        let stages = self
            .metadata
            .iter()
            .chain(self.stages.iter())
            .map(StageFactory::instantiate)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Pipeline { stages })
    }

    /// Instantiate the pipeline with a result handler as its terminal stage.
    pub fn build(&self, sink: ResultSink) -> Result<Pipeline, StageError> {
        let mut pipeline = self.instantiate()?;
        pipeline.stages.push(Box::new(ResultHandler::new(sink)));
        Ok(pipeline)
    }
}

/// How one document's trip through the stages ended.
#[derive(Debug)]
pub enum StepOutcome {
    Done,
    /// A stage returned an error; the pipeline is still usable.
    Failed(JobError),
    /// A stage panicked; its state can no longer be trusted.
    Panicked { stage: String, message: String },
}

/// Instantiated stages owned by a single worker.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage over the current document, stopping at the first failure.
    pub fn process(&mut self, buffer: &mut WorkBuffer) -> StepOutcome {
        for stage in self.stages.iter_mut() {
            match panic::catch_unwind(AssertUnwindSafe(|| stage.process(buffer))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => return StepOutcome::Failed(err.into()),
                Err(payload) => {
                    return StepOutcome::Panicked {
                        stage: stage.name().to_string(),
                        message: panic_message(payload.as_ref()),
                    };
                }
            }
        }
        StepOutcome::Done
    }

    /// Notify every stage that the collection is finished.
    pub fn collection_process_complete(&mut self) -> Result<(), EngineError> {
        for stage in self.stages.iter_mut() {
            stage
                .collection_process_complete()
                .map_err(EngineError::Completion)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.stages.iter().map(|s| s.name()).collect();
        f.debug_struct("Pipeline").field("stages", &names).finish()
    }
}

/// Drive one full pipeline run until the reader is exhausted.
///
/// Stage errors fail only the current job and the loop continues. A panic
/// fails the current job and then ends the run with
/// [`EngineError::Poisoned`] so the caller can rebuild the stages and
/// start a fresh run.
pub fn run_pipeline<R: CollectionReader>(
    reader: &mut R,
    pipeline: &mut Pipeline,
    sink: &ResultSink,
) -> Result<(), EngineError> {
    let mut buffer = WorkBuffer::new();
    while reader.has_next() {
        reader.get_next(&mut buffer)?;
        match pipeline.process(&mut buffer) {
            StepOutcome::Done => {}
            StepOutcome::Failed(error) => sink.fail(buffer.job_id(), error),
            StepOutcome::Panicked { stage, message } => {
                sink.fail(
                    buffer.job_id(),
                    JobError::Panicked {
                        stage: stage.clone(),
                        message: message.clone(),
                    },
                );
                return Err(EngineError::Poisoned { stage, message });
            }
        }
        buffer.reset();
    }
    pipeline.collection_process_complete()
}
