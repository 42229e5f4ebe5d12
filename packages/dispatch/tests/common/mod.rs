#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use dispatch::{
    DispatchContext, PipelineDescriptor, RestartPolicy, Stage, StageError, StageFactory, Stream,
    StreamConfig, WorkBuffer,
};

/// Appends a suffix to the job metadata.
#[derive(Clone)]
pub struct AppendStage {
    pub suffix: &'static str,
}

impl Stage for AppendStage {
    fn name(&self) -> &str {
        "append"
    }

    fn process(&mut self, buffer: &mut WorkBuffer) -> Result<(), StageError> {
        let metadata = format!("{}{}", buffer.metadata().unwrap_or_default(), self.suffix);
        buffer.set_metadata(Some(metadata));
        let worker = std::thread::current().name().unwrap_or_default().to_string();
        buffer.annotate("worker", worker.into());
        Ok(())
    }
}

/// Fails documents equal to "fail" and panics on documents equal to "panic".
#[derive(Clone)]
pub struct TroubleStage;

impl Stage for TroubleStage {
    fn name(&self) -> &str {
        "trouble"
    }

    fn process(&mut self, buffer: &mut WorkBuffer) -> Result<(), StageError> {
        match buffer.document() {
            "fail" => Err(StageError::new("trouble", "document rejected")),
            "panic" => panic!("trouble stage blew up"),
            _ => Ok(()),
        }
    }
}

/// Blocks documents until opened; counts how many are waiting.
#[derive(Clone, Default)]
pub struct Gate {
    state: Arc<(Mutex<bool>, Condvar)>,
    entered: Arc<AtomicUsize>,
}

impl Gate {
    pub fn open(&self) {
        let (open, cvar) = &*self.state;
        *open.lock().unwrap() = true;
        cvar.notify_all();
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Poll until `count` documents have reached the gate.
    pub async fn wait_entered(&self, count: usize) {
        for _ in 0..500 {
            if self.entered() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("gate saw {} documents, expected {}", self.entered(), count);
    }
}

impl Stage for Gate {
    fn name(&self) -> &str {
        "gate"
    }

    fn process(&mut self, _buffer: &mut WorkBuffer) -> Result<(), StageError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let (open, cvar) = &*self.state;
        let mut guard = open.lock().unwrap();
        while !*guard {
            guard = cvar.wait(guard).unwrap();
        }
        Ok(())
    }
}

/// Stream settings with short timings for tests.
pub fn fast_config(workers: usize) -> StreamConfig {
    StreamConfig::default()
        .with_workers(workers)
        .with_poll_interval(Duration::from_millis(20))
        .with_restart(RestartPolicy {
            max_restarts: 2,
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
            stable_after_secs: 60,
        })
}

/// One stage appending " processed" to the metadata.
pub fn echo_descriptor() -> PipelineDescriptor {
    PipelineDescriptor::new().with_stage(StageFactory::cloned(AppendStage { suffix: " processed" }))
}

pub fn trouble_descriptor() -> PipelineDescriptor {
    PipelineDescriptor::new()
        .with_stage(StageFactory::cloned(TroubleStage))
        .with_stage(StageFactory::cloned(AppendStage { suffix: " processed" }))
}

/// Builds the trouble stage once; every later build fails.
pub fn single_build_descriptor(builds: Arc<AtomicUsize>) -> PipelineDescriptor {
    PipelineDescriptor::new()
        .with_stage(StageFactory::new("trouble", move || {
            if builds.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(TroubleStage)
            } else {
                Err(StageError::new("trouble", "model unloaded"))
            }
        }))
        .with_stage(StageFactory::cloned(AppendStage { suffix: " processed" }))
}

pub fn gated_descriptor(gate: &Gate) -> PipelineDescriptor {
    PipelineDescriptor::new()
        .with_stage(StageFactory::cloned(gate.clone()))
        .with_stage(StageFactory::cloned(AppendStage { suffix: " processed" }))
}

pub async fn start_stream(
    name: &str,
    workers: usize,
    descriptor: PipelineDescriptor,
) -> (Stream, DispatchContext) {
    let ctx = DispatchContext::default();
    let stream = Stream::start(name, fast_config(workers), descriptor, ctx.clone())
        .await
        .expect("stream should start");
    (stream, ctx)
}

/// Poll `check` until it holds or a few seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
