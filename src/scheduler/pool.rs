//! The fixed-size worker pool backing multi-section order levels.
//!
//! Workers are long-lived tasks blocking on one bounded queue; dropping
//! the sender shuts them down. Completion callbacks run under the pool's
//! own serialization lock, and each work item reports back on a per-batch
//! channel so the processor can hold the order barrier.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::graph::KernelGraph;
use crate::manager::ExecMode;

use super::executor::run_section;
use super::{ExecContext, SectionComplete};

pub(crate) struct WorkItem {
    pub graph: Arc<KernelGraph>,
    pub section_index: usize,
    pub on_complete: Option<SectionComplete>,
    /// Per-batch completion tally; one message per finished section.
    pub done: mpsc::Sender<u32>,
}

pub(crate) struct WorkerPool {
    tx: parking_lot::Mutex<Option<flume::Sender<WorkItem>>>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn spawn(workers: usize, queue_depth: usize, ctx: Arc<ExecContext>) -> Self {
        let (tx, rx) = flume::bounded::<WorkItem>(workers * queue_depth);
        let callback_lock = Arc::new(tokio::sync::Mutex::new(()));
        let handles = (0..workers)
            .map(|index| {
                let rx = rx.clone();
                let ctx = ctx.clone();
                let callback_lock = callback_lock.clone();
                tokio::spawn(async move {
                    debug!(worker = index, "graph worker running");
                    while let Ok(item) = rx.recv_async().await {
                        let processed = {
                            let mut section =
                                item.graph.section_cell(item.section_index).lock().await;
                            run_section(
                                &ctx.registry,
                                &ctx.load,
                                &ctx.admission,
                                &mut section,
                                ExecMode::Queued,
                            )
                            .await
                        };
                        {
                            let _serialized = callback_lock.lock().await;
                            if let Some(callback) = &item.on_complete {
                                callback(item.section_index, processed);
                            }
                        }
                        debug!(
                            worker = index,
                            section = item.section_index,
                            processed,
                            "section complete"
                        );
                        let _ = item.done.send(processed).await;
                    }
                    debug!(worker = index, "graph worker exiting");
                })
            })
            .collect();
        Self {
            tx: parking_lot::Mutex::new(Some(tx)),
            workers: parking_lot::Mutex::new(handles),
        }
    }

    pub(crate) async fn submit(&self, item: WorkItem) {
        let tx = self.tx.lock().clone();
        if let Some(tx) = tx {
            let _ = tx.send_async(item).await;
        }
    }

    /// Close the queue and join the workers. The gate guarantees no
    /// submissions are racing with this.
    pub(crate) async fn shutdown(&self) {
        drop(self.tx.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.await;
        }
    }
}
