use std::time::{Duration, Instant};

use crate::prelude::*;

const UPDATE_TIME_TABLE_SIZE: usize = 500;

/// Rolling statistics over the last 500 world tick durations, in milliseconds.
pub struct UpdateTime {
    table: [u32; UPDATE_TIME_TABLE_SIZE],
    index: usize,
    total: u32,
    average: u32,
    max: u32,
    max_of_current_table: u32,
    max_of_last_table: u32,

    record_interval: Duration,
    min_recorded_duration: Duration,
    last_record: Duration,
    recorded_at: Instant,
}

impl UpdateTime {
    pub fn new(record_interval: Duration, min_recorded_duration: Duration) -> Self {
        Self {
            table: [0; UPDATE_TIME_TABLE_SIZE],
            index: 0,
            total: 0,
            average: 0,
            max: 0,
            max_of_current_table: 0,
            max_of_last_table: 0,
            record_interval,
            min_recorded_duration,
            last_record: Duration::ZERO,
            recorded_at: Instant::now(),
        }
    }

    pub fn average_update_time(&self) -> u32 {
        self.average
    }

    /// Longer ticks weigh more: sum(d²) / sum(d).
    pub fn time_weighted_average_update_time(&self) -> u32 {
        let (sum, weight_sum) = self
            .table
            .iter()
            .fold((0u64, 0u64), |(sum, weight_sum), &diff| (sum + diff as u64 * diff as u64, weight_sum + diff as u64));
        if weight_sum == 0 {
            return 0;
        }
        (sum / weight_sum) as u32
    }

    pub fn max_update_time(&self) -> u32 {
        self.max
    }

    pub fn max_update_time_of_current_table(&self) -> u32 {
        self.max_of_current_table.max(self.max_of_last_table)
    }

    pub fn last_update_time(&self) -> u32 {
        let index = if self.index != 0 { self.index - 1 } else { UPDATE_TIME_TABLE_SIZE - 1 };
        self.table[index]
    }

    pub fn update_with_diff(&mut self, diff: Duration) {
        let diff = diff.as_millis().min(u32::MAX as u128) as u32;
        self.total = self.total - self.table[self.index] + diff;
        self.table[self.index] = diff;

        self.max = self.max.max(diff);
        self.max_of_current_table = self.max_of_current_table.max(diff);

        self.index += 1;
        if self.index >= UPDATE_TIME_TABLE_SIZE {
            self.index = 0;
            self.max_of_last_table = self.max_of_current_table;
            self.max_of_current_table = 0;
        }

        if self.table[UPDATE_TIME_TABLE_SIZE - 1] != 0 {
            self.average = self.total / UPDATE_TIME_TABLE_SIZE as u32;
        } else if self.index != 0 {
            self.average = self.total / self.index as u32;
        }
    }

    /// Logs the average every record interval. `game_time` is the time since startup.
    pub fn record_update_time(&mut self, game_time: Duration, session_count: usize) {
        if self.record_interval.is_zero() {
            return;
        }
        if game_time.saturating_sub(self.last_record) > self.record_interval {
            info!("Update time diff: {}. Sessions online: {}.", self.average_update_time(), session_count);
            self.last_record = game_time;
        }
    }

    pub fn record_update_time_reset(&mut self) {
        self.recorded_at = Instant::now();
    }

    /// Logs how long the section since the last reset or record took, if it took long enough.
    pub fn record_update_time_duration(&mut self, text: &str) {
        let now = Instant::now();
        let diff = now.duration_since(self.recorded_at);
        if diff > self.min_recorded_duration {
            debug!("Recorded update time of {}: {}ms.", text, diff.as_millis());
        }
        self.recorded_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update_time() -> UpdateTime {
        UpdateTime::new(Duration::from_secs(60), Duration::from_millis(100))
    }

    #[test]
    fn test_average_before_table_is_full() {
        let mut update_time = update_time();
        update_time.update_with_diff(Duration::from_millis(10));
        update_time.update_with_diff(Duration::from_millis(30));

        assert_eq!(update_time.average_update_time(), 20);
        assert_eq!(update_time.last_update_time(), 30);
        assert_eq!(update_time.max_update_time(), 30);
        // (100 + 900) / 40
        assert_eq!(update_time.time_weighted_average_update_time(), 25);
    }

    #[test]
    fn test_ring_wraps_and_keeps_last_table_max() {
        let mut update_time = update_time();
        update_time.update_with_diff(Duration::from_millis(90));
        for _ in 1..UPDATE_TIME_TABLE_SIZE {
            update_time.update_with_diff(Duration::from_millis(10));
        }
        assert_eq!(update_time.last_update_time(), 10);

        update_time.update_with_diff(Duration::from_millis(10));
        // The 90 was overwritten, the table now holds only tens.
        assert_eq!(update_time.average_update_time(), 10);
        assert_eq!(update_time.max_update_time(), 90);
        assert_eq!(update_time.max_update_time_of_current_table(), 90);
    }

    #[test]
    fn test_empty_table() {
        let update_time = update_time();
        assert_eq!(update_time.average_update_time(), 0);
        assert_eq!(update_time.time_weighted_average_update_time(), 0);
        assert_eq!(update_time.last_update_time(), 0);
    }
}
