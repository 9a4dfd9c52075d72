use std::future::Future;

use futures::FutureExt;
use smol::Task;

trait PendingQuery<C>: Send {
    /// Polls the query once without blocking. True once its result is available.
    fn poll_ready(&mut self) -> bool;

    fn invoke(self: Box<Self>, context: &mut C);
}

struct QueryCallback<T, F> {
    task: Task<T>,
    result: Option<T>,
    callback: F,
}

impl<C, T, F> PendingQuery<C> for QueryCallback<T, F>
where
    T: Send,
    F: FnOnce(&mut C, T) + Send,
{
    fn poll_ready(&mut self) -> bool {
        if self.result.is_none() {
            self.result = (&mut self.task).now_or_never();
        }
        self.result.is_some()
    }

    fn invoke(self: Box<Self>, context: &mut C) {
        let QueryCallback { result, callback, .. } = *self;
        if let Some(result) = result {
            callback(context, result);
        }
    }
}

/// Runs queries in the background and hands their results to callbacks on the owner's thread.
///
/// Queries are spawned immediately. Callbacks only ever run from `process_ready_callbacks`, so
/// the owner decides when results are applied and never has to share itself with the query.
pub struct QueryCallbackProcessor<C> {
    callbacks: Vec<Box<dyn PendingQuery<C>>>,
}

impl<C> Default for QueryCallbackProcessor<C> {
    fn default() -> Self {
        Self { callbacks: vec![] }
    }
}

impl<C> QueryCallbackProcessor<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback<Q, T, F>(&mut self, query: Q, callback: F)
    where
        Q: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        F: FnOnce(&mut C, T) + Send + 'static,
    {
        self.callbacks.push(Box::new(QueryCallback {
            task: smol::spawn(query),
            result: None,
            callback,
        }));
    }

    /// Invokes the callback of every query that finished, in the order they were added.
    pub fn process_ready_callbacks(&mut self, context: &mut C) {
        if self.callbacks.is_empty() {
            return;
        }

        let callbacks = std::mem::take(&mut self.callbacks);
        for mut pending in callbacks {
            if pending.poll_ready() {
                pending.invoke(context);
            } else {
                self.callbacks.push(pending);
            }
        }
    }

    /// Takes over callbacks added to `other` while this processor was detached from its owner.
    pub fn append(&mut self, other: &mut Self) {
        self.callbacks.append(&mut other.callbacks);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct Owner {
        results: Vec<u32>,
    }

    fn wait_until_ready(processor: &mut QueryCallbackProcessor<Owner>, owner: &mut Owner, expected: usize) {
        for _ in 0..500 {
            processor.process_ready_callbacks(owner);
            if owner.results.len() >= expected {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("query callbacks never became ready");
    }

    #[test]
    fn test_callback_runs_only_when_processed() {
        let mut processor = QueryCallbackProcessor::new();
        let mut owner = Owner::default();
        processor.add_callback(async { 42u32 }, |owner: &mut Owner, id| owner.results.push(id));

        assert!(owner.results.is_empty());
        wait_until_ready(&mut processor, &mut owner, 1);
        assert_eq!(owner.results, vec![42]);
        assert!(processor.is_empty());
    }

    #[test]
    fn test_unfinished_query_stays_pending() {
        let (sender, receiver) = flume::bounded::<u32>(1);
        let mut processor = QueryCallbackProcessor::new();
        let mut owner = Owner::default();
        processor.add_callback(
            async move { receiver.recv_async().await.unwrap_or_default() },
            |owner: &mut Owner, value| owner.results.push(value),
        );

        processor.process_ready_callbacks(&mut owner);
        assert_eq!(processor.len(), 1);

        sender.send(7).unwrap();
        wait_until_ready(&mut processor, &mut owner, 1);
        assert_eq!(owner.results, vec![7]);
    }

    #[test]
    fn test_append_moves_pending_queries() {
        let mut processor = QueryCallbackProcessor::new();
        let mut detached = QueryCallbackProcessor::new();
        let mut owner = Owner::default();
        processor.add_callback(async { 1u32 }, |owner: &mut Owner, v| owner.results.push(v));
        detached.add_callback(async { 2u32 }, |owner: &mut Owner, v| owner.results.push(v));
        processor.append(&mut detached);

        assert!(detached.is_empty());
        wait_until_ready(&mut processor, &mut owner, 2);
        owner.results.sort();
        assert_eq!(owner.results, vec![1, 2]);
    }
}
