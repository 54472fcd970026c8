use crossbeam_channel::{Sender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use voxstream_common::ChunkCoord;

use crate::error::StreamError;

/// Runs for every job a worker picks up.
pub(crate) type JobHandler = Arc<dyn Fn(ChunkCoord) + Send + Sync>;

/// Fixed set of background threads fed by a bounded job queue.
pub(crate) struct GenerationWorkers {
    sender: Option<Sender<ChunkCoord>>,
    handles: Vec<JoinHandle<()>>,
}

impl GenerationWorkers {
    pub(crate) fn spawn(
        threads: usize,
        queue_capacity: usize,
        handler: JobHandler,
    ) -> Result<Self, StreamError> {
        let (sender, receiver) = crossbeam_channel::bounded::<ChunkCoord>(queue_capacity);
        let mut handles = Vec::with_capacity(threads);
        for i in 0..threads {
            let receiver = receiver.clone();
            let handler = Arc::clone(&handler);
            let handle = std::thread::Builder::new()
                .name(format!("chunk-gen-{i}"))
                .spawn(move || {
                    while let Ok(coord) = receiver.recv() {
                        handler(coord);
                    }
                    tracing::trace!("generation worker exiting");
                })
                .map_err(StreamError::WorkerSpawn)?;
            handles.push(handle);
        }
        tracing::debug!(threads, queue_capacity, "generation workers started");
        Ok(Self {
            sender: Some(sender),
            handles,
        })
    }

    /// Queue a job without blocking. Hands the coordinate back if the queue is full.
    pub(crate) fn submit(&self, coord: ChunkCoord) -> Result<(), ChunkCoord> {
        let Some(sender) = &self.sender else {
            return Err(coord);
        };
        sender.try_send(coord).map_err(|e| match e {
            TrySendError::Full(c) | TrySendError::Disconnected(c) => c,
        })
    }
}

impl Drop for GenerationWorkers {
    /// Closes the queue and waits for workers to drain it.
    fn drop(&mut self) {
        self.sender.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("generation worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn workers_run_every_job_before_shutdown() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let workers = GenerationWorkers::spawn(
            2,
            16,
            Arc::new(move |coord: ChunkCoord| sink.lock().unwrap().push(coord)),
        )
        .unwrap();
        for x in 0..10 {
            workers.submit(ChunkCoord::new(x, 0, 0)).unwrap();
        }
        drop(workers);

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, (0..10).map(|x| ChunkCoord::new(x, 0, 0)).collect::<Vec<_>>());
    }

    #[test]
    fn full_queue_rejects_job() {
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let workers = GenerationWorkers::spawn(
            1,
            1,
            Arc::new(move |_: ChunkCoord| {
                let _ = release_rx.recv();
            }),
        )
        .unwrap();

        // One job blocks the only worker, one fills the queue; retry until the
        // worker has taken the first so the queue state is known.
        workers.submit(ChunkCoord::new(0, 0, 0)).unwrap();
        let mut queued = 1;
        let rejected = loop {
            match workers.submit(ChunkCoord::new(queued, 0, 0)) {
                Ok(()) => queued += 1,
                Err(coord) => break coord,
            }
            assert!(queued < 4, "queue of capacity 1 accepted too many jobs");
        };
        assert_eq!(rejected, ChunkCoord::new(queued, 0, 0));

        for _ in 0..queued {
            release_tx.send(()).unwrap();
        }
        drop(workers);
    }
}
