//! Pool of OS threads driving connection tasks.
//!
//! - Every thread runs the same `smol::Executor`, so a connection task may be polled by any of them
//!   while each connection is still only ever driven by its own task.
//! - The world tick never runs here. It stays on the main thread and only talks to connection tasks
//!   through queues and socket handles.
//! - Stopping drops the executor, which drops every task still running on it (the accept loop
//!   included), then joins the threads.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use smol::{Executor, Task};

use crate::prelude::*;

pub struct NetworkThreads {
    executor: Option<Arc<Executor<'static>>>,
    stop_sender: Option<flume::Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

impl NetworkThreads {
    pub fn start(count: usize) -> Result<Self> {
        let count = count.max(1);
        let executor = Arc::new(Executor::new());
        let (stop_sender, stop_receiver) = flume::bounded::<()>(1);

        let mut threads = Vec::with_capacity(count);
        for index in 0..count {
            let executor = executor.clone();
            let stop_receiver = stop_receiver.clone();
            let thread = std::thread::Builder::new()
                .name(format!("network-{index}"))
                .spawn(move || {
                    // Returns once the sender is dropped.
                    smol::block_on(executor.run(async move {
                        let _ = stop_receiver.recv_async().await;
                    }));
                })?;
            threads.push(thread);
        }

        info!("Started {} network thread(s)", count);
        Ok(Self {
            executor: Some(executor),
            stop_sender: Some(stop_sender),
            threads,
        })
    }

    pub fn spawn<F>(&self, future: F) -> Option<Task<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.executor.as_ref().map(|executor| executor.spawn(future))
    }

    /// Long-lived tasks hold the executor weakly so they never keep it alive past `stop`.
    pub fn downgrade(&self) -> Weak<Executor<'static>> {
        self.executor.as_ref().map(Arc::downgrade).unwrap_or_default()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn stop(&mut self) {
        if self.stop_sender.take().is_none() {
            return;
        }

        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                error!("Network thread panicked");
            }
        }
        self.executor = None;
        info!("Network threads stopped");
    }
}

impl Drop for NetworkThreads {
    fn drop(&mut self) {
        self.stop();
    }
}
