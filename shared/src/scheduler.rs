use std::time::Duration;

/// Passed to a running task so it can re-arm itself.
pub struct TaskContext {
    interval: Duration,
    next: Option<Duration>,
}

impl TaskContext {
    /// Run again after the same interval.
    pub fn repeat(&mut self) {
        self.next = Some(self.interval);
    }

    pub fn repeat_in(&mut self, after: Duration) {
        self.next = Some(after);
    }
}

struct ScheduledTask {
    remaining: Duration,
    interval: Duration,
    task: Box<dyn FnMut(&mut TaskContext) + Send>,
}

/// Tick-driven scheduler. Nothing runs on its own; `update` advances the clock and runs whatever
/// became due, on the caller's thread.
#[derive(Default)]
pub struct TaskScheduler {
    tasks: Vec<ScheduledTask>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, after: Duration, task: impl FnMut(&mut TaskContext) + Send + 'static) {
        self.tasks.push(ScheduledTask {
            remaining: after,
            interval: after,
            task: Box::new(task),
        });
    }

    pub fn update(&mut self, diff: Duration) {
        let tasks = std::mem::take(&mut self.tasks);
        for mut scheduled in tasks {
            scheduled.remaining = scheduled.remaining.saturating_sub(diff);
            if !scheduled.remaining.is_zero() {
                self.tasks.push(scheduled);
                continue;
            }

            let mut context = TaskContext {
                interval: scheduled.interval,
                next: None,
            };
            (scheduled.task)(&mut context);
            if let Some(next) = context.next {
                scheduled.remaining = next;
                self.tasks.push(scheduled);
            }
        }
    }

    pub fn cancel_all(&mut self) {
        self.tasks.clear();
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
