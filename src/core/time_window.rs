//! The conservative time-window (runahead) synchronization engine.
//!
//! Tracks the observed minimum inter-host latency (via double-checked
//! locking) and the window-advance math together in one engine, since the
//! controller drives both from the same round-completion callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::core::simulation_time::SimulationTime;

const DEFAULT_MIN_JUMP: SimulationTime = SimulationTime::from_millis(10);

struct WindowState {
    min_jump_time: SimulationTime,
    next_min_jump_time: SimulationTime,
    execute_window_start: SimulationTime,
    execute_window_end: SimulationTime,
}

/// Tracks `(windowStart, windowEnd, endTime, minJump, nextMinJump, bootstrapEnd)`
/// and computes the next safe execute window between rounds.
pub struct TimeWindowEngine {
    state: RwLock<WindowState>,
    min_jump_time_config: SimulationTime,
    end_time: SimulationTime,
    bootstrap_end_time: SimulationTime,
    stop_requested: AtomicBool,
}

impl TimeWindowEngine {
    /// Build the engine and compute the initial window: a configured worker
    /// count above zero starts with a single minimum jump; zero workers
    /// (single-threaded) runs the whole simulation in one window.
    pub fn new(
        min_jump_time_config: SimulationTime,
        end_time: SimulationTime,
        bootstrap_end_time: SimulationTime,
        worker_count: usize,
    ) -> Self {
        let engine = TimeWindowEngine {
            state: RwLock::new(WindowState {
                min_jump_time: SimulationTime::ZERO,
                next_min_jump_time: SimulationTime::ZERO,
                execute_window_start: SimulationTime::ZERO,
                execute_window_end: SimulationTime::ZERO,
            }),
            min_jump_time_config,
            end_time,
            bootstrap_end_time,
            stop_requested: AtomicBool::new(false),
        };

        let initial_end = if worker_count > 0 {
            engine.get_min_time_jump()
        } else {
            SimulationTime::MAX
        };
        {
            let mut state = engine.state.write().unwrap();
            state.execute_window_end = initial_end.min(engine.end_time);
        }
        engine
    }

    pub fn end_time(&self) -> SimulationTime {
        self.end_time
    }

    pub fn bootstrap_end_time(&self) -> SimulationTime {
        self.bootstrap_end_time
    }

    pub fn window(&self) -> (SimulationTime, SimulationTime) {
        let state = self.state.read().unwrap();
        (state.execute_window_start, state.execute_window_end)
    }

    /// The current floor on window width.
    pub fn get_min_time_jump(&self) -> SimulationTime {
        let state = self.state.read().unwrap();
        let mut m = if state.min_jump_time.is_zero() {
            DEFAULT_MIN_JUMP
        } else {
            state.min_jump_time
        };
        if !self.min_jump_time_config.is_zero() && m < self.min_jump_time_config {
            m = self.min_jump_time_config;
        }
        m
    }

    /// Called by the topology layer as shorter paths become known. Shrinks
    /// the next-round floor monotonically within (and across) a run; never
    /// grows it.
    pub fn update_min_time_jump(&self, observed: SimulationTime) {
        if observed.is_zero() {
            return;
        }
        // Double-checked locking: cheap read-only check first, write lock
        // only taken when an update is actually needed.
        {
            let state = self.state.read().unwrap();
            if !state.next_min_jump_time.is_zero() && observed >= state.next_min_jump_time {
                return;
            }
        }
        let mut state = self.state.write().unwrap();
        if state.next_min_jump_time.is_zero() || observed < state.next_min_jump_time {
            state.next_min_jump_time = observed;
        }
    }

    /// Request early termination: the next `manager_finished_current_round`
    /// call returns `false` regardless of window math.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Called by the worker at round end. Returns the committed window and
    /// a continuation flag (`false` means the run loop should terminate).
    pub fn manager_finished_current_round(
        &self,
        min_next_event_time: SimulationTime,
    ) -> (SimulationTime, SimulationTime, bool) {
        if self.stop_requested.load(Ordering::SeqCst) {
            let state = self.state.read().unwrap();
            return (state.execute_window_start, state.execute_window_end, false);
        }

        let mut state = self.state.write().unwrap();
        // Promote the observed minimum without resetting it: it keeps
        // shrinking monotonically for the life of the run.
        if !state.next_min_jump_time.is_zero() {
            state.min_jump_time = state.next_min_jump_time;
        }
        drop(state);

        let jump = self.get_min_time_jump();
        let mut state = self.state.write().unwrap();
        let new_start = min_next_event_time;
        let mut new_end = min_next_event_time.saturating_add(jump);
        if new_end > self.end_time {
            new_end = self.end_time;
        }
        state.execute_window_start = new_start;
        state.execute_window_end = new_end;
        let continue_running = new_start < new_end;
        (new_start, new_end, continue_running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> SimulationTime {
        SimulationTime::from_millis(n)
    }

    #[test]
    fn default_jump_no_overrides() {
        let engine = TimeWindowEngine::new(SimulationTime::ZERO, ms(1_000), SimulationTime::ZERO, 1);
        assert_eq!(engine.window(), (SimulationTime::ZERO, ms(10)));

        let (start, end, cont) = engine.manager_finished_current_round(ms(5));
        assert_eq!((start, end), (ms(5), ms(15)));
        assert!(cont);
    }

    #[test]
    fn config_floor_wins_over_small_observation() {
        let engine = TimeWindowEngine::new(ms(20), ms(1_000), SimulationTime::ZERO, 1);
        engine.update_min_time_jump(ms(5));
        let (start, end, _) = engine.manager_finished_current_round(SimulationTime::ZERO);
        assert_eq!((start, end), (SimulationTime::ZERO, ms(20)));
    }

    #[test]
    fn observed_shortening_wins_when_below_default() {
        let engine = TimeWindowEngine::new(SimulationTime::ZERO, ms(1_000), SimulationTime::ZERO, 1);
        engine.update_min_time_jump(ms(3));
        engine.update_min_time_jump(ms(7));
        let (_, end, _) = engine.manager_finished_current_round(SimulationTime::ZERO);
        assert_eq!(end, ms(3));
    }

    #[test]
    fn next_min_jump_is_monotonically_non_increasing() {
        let engine = TimeWindowEngine::new(SimulationTime::ZERO, ms(1_000), SimulationTime::ZERO, 1);
        engine.update_min_time_jump(ms(7));
        engine.update_min_time_jump(ms(10));
        assert_eq!(engine.state.read().unwrap().next_min_jump_time, ms(7));
        engine.update_min_time_jump(ms(2));
        assert_eq!(engine.state.read().unwrap().next_min_jump_time, ms(2));
    }

    #[test]
    fn next_min_jump_is_never_reset_after_promotion() {
        // Pins the open-question decision: once promoted into min_jump_time,
        // next_min_jump_time is not cleared, so later rounds keep comparing
        // new observations against the already-promoted value.
        let engine = TimeWindowEngine::new(SimulationTime::ZERO, ms(1_000), SimulationTime::ZERO, 1);
        engine.update_min_time_jump(ms(3));
        engine.manager_finished_current_round(SimulationTime::ZERO);
        assert_eq!(engine.get_min_time_jump(), ms(3));
        // no further update_min_time_jump call; min stays at the promoted value
        let (_, end, _) = engine.manager_finished_current_round(ms(3));
        assert_eq!(end, ms(6));
    }

    #[test]
    fn end_time_clamp_and_fixed_point() {
        let engine = TimeWindowEngine::new(ms(50), ms(100), SimulationTime::ZERO, 1);
        let (start, end, cont) = engine.manager_finished_current_round(ms(80));
        assert_eq!((start, end), (ms(80), ms(100)));
        assert!(cont);

        let (_, _, cont2) = engine.manager_finished_current_round(ms(100));
        assert!(!cont2);
    }

    #[test]
    fn zero_workers_runs_single_threaded_in_one_window() {
        let engine = TimeWindowEngine::new(SimulationTime::ZERO, ms(500), SimulationTime::ZERO, 0);
        assert_eq!(engine.window(), (SimulationTime::ZERO, ms(500)));
    }

    #[test]
    fn request_stop_short_circuits_next_round() {
        let engine = TimeWindowEngine::new(SimulationTime::ZERO, ms(1_000), SimulationTime::ZERO, 1);
        engine.request_stop();
        let (_, _, cont) = engine.manager_finished_current_round(ms(5));
        assert!(!cont);
    }
}
