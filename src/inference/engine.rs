//! Inference engine
//!
//! A bounded job queue in front of a fixed pool of worker threads. Each worker
//! owns its own handle on the loaded model and blocks on the shared receiver,
//! so forward passes never run on the async runtime. With a single worker the
//! model sees strictly one request at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use super::prediction::PredictionResult;
use crate::model::{ModelHandle, ModelStore};
use crate::preprocess::ImageTensor;
use crate::utils::error::{Result, ServeError};

/// Worker pool sizing and result shaping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of worker threads running forward passes
    pub workers: usize,
    /// Requests allowed to wait for a worker before callers are held back
    pub queue_capacity: usize,
    /// Predictions returned per image, 0 for all classes
    pub top_k: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 64,
            top_k: 5,
        }
    }
}

struct Job {
    tensor: ImageTensor,
    reply: oneshot::Sender<Result<PredictionResult>>,
}

#[derive(Debug, Default)]
struct EngineCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
}

/// Point-in-time engine statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub workers: usize,
    pub queue_capacity: usize,
    pub queue_depth: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    /// Jobs dropped because the caller gave up before a worker picked them up
    pub abandoned: u64,
}

/// Runs forward passes for preprocessed images
pub struct InferenceEngine {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    input_shape: [usize; 3],
    config: EngineConfig,
    counters: Arc<EngineCounters>,
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("input_shape", &self.input_shape)
            .field("config", &self.config)
            .finish()
    }
}

impl InferenceEngine {
    /// Spawn the worker pool for a loaded model
    pub fn start(store: &ModelStore, config: EngineConfig) -> Result<Self> {
        if config.workers == 0 {
            return Err(ServeError::Config("workers must be at least 1".to_string()));
        }
        if config.queue_capacity == 0 {
            return Err(ServeError::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::channel::<Job>(config.queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let labels: Arc<[String]> = store.manifest().labels.clone().into();
        let counters = Arc::new(EngineCounters::default());

        let mut workers = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            let worker = Worker {
                id,
                handle: store.handle(),
                labels: Arc::clone(&labels),
                top_k: config.top_k,
                counters: Arc::clone(&counters),
            };
            let receiver = Arc::clone(&receiver);
            let join = std::thread::Builder::new()
                .name(format!("inference-{}", id))
                .spawn(move || worker.run(receiver))?;
            workers.push(join);
        }

        tracing::info!(
            "Inference engine started: {} worker(s), queue capacity {}",
            config.workers,
            config.queue_capacity
        );

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            input_shape: store.manifest().input_shape(),
            config,
            counters,
        })
    }

    /// Input shape every tensor must match
    pub fn input_shape(&self) -> [usize; 3] {
        self.input_shape
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Queue an image for inference and wait for its ranked predictions
    pub async fn predict(&self, tensor: ImageTensor) -> Result<PredictionResult> {
        if tensor.shape() != self.input_shape {
            return Err(ServeError::ShapeMismatch {
                expected: self.input_shape,
                actual: tensor.shape(),
            });
        }

        let sender = self
            .current_sender()
            .ok_or_else(|| ServeError::Inference("Inference engine is shut down".to_string()))?;

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        let (reply, response) = oneshot::channel();
        sender
            .send(Job { tensor, reply })
            .await
            .map_err(|_| ServeError::Inference("Inference workers have stopped".to_string()))?;

        response
            .await
            .map_err(|_| ServeError::Inference("Inference worker dropped the request".to_string()))?
    }

    pub fn stats(&self) -> EngineStats {
        let queue_depth = self
            .current_sender()
            .map(|s| s.max_capacity() - s.capacity())
            .unwrap_or(0);

        EngineStats {
            workers: self.config.workers,
            queue_capacity: self.config.queue_capacity,
            queue_depth,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting work, let queued jobs drain and join the workers.
    ///
    /// Blocks the calling thread; call from `spawn_blocking` inside a runtime.
    pub fn shutdown(&self) {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let workers = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("Inference worker panicked during shutdown");
            }
        }
        tracing::info!("Inference engine stopped");
    }

    fn current_sender(&self) -> Option<mpsc::Sender<Job>> {
        match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

struct Worker {
    id: usize,
    handle: ModelHandle,
    labels: Arc<[String]>,
    top_k: usize,
    counters: Arc<EngineCounters>,
}

impl Worker {
    fn run(self, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) {
        tracing::debug!("Inference worker {} started", self.id);

        loop {
            let job = {
                let mut guard = match receiver.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                guard.blocking_recv()
            };

            let Some(job) = job else { break };

            if job.reply.is_closed() {
                self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let result = self.infer(job.tensor);
            match &result {
                Ok(_) => self.counters.completed.fetch_add(1, Ordering::Relaxed),
                Err(_) => self.counters.failed.fetch_add(1, Ordering::Relaxed),
            };
            let _ = job.reply.send(result);
        }

        tracing::debug!("Inference worker {} stopped", self.id);
    }

    fn infer(&self, tensor: ImageTensor) -> Result<PredictionResult> {
        let start = Instant::now();
        let scores = self.handle.run(tensor.into_data())?;
        if scores.len() != self.labels.len() {
            return Err(ServeError::Inference(format!(
                "Model produced {} scores for {} labels",
                scores.len(),
                self.labels.len()
            )));
        }
        Ok(PredictionResult::from_scores(
            &scores,
            &self.labels,
            self.top_k,
            start.elapsed(),
        ))
    }
}
