//! Machine-wide monotonic clock.
//!
//! Every process on the machine reads the same counter with the same zero
//! reference, so a timestamp written by a recorder worker can be compared
//! directly against one written by the stimulus loop. `std::time::Instant`
//! does not expose its epoch, which is why the OS counter is read directly.

/// High-resolution monotonic clock shared by all processes on one machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock;

impl Clock {
    pub fn new() -> Self {
        Self
    }

    /// Current time in seconds since the machine-wide monotonic epoch.
    pub fn time(&self) -> f64 {
        platform::now_secs()
    }
}

#[cfg(unix)]
mod platform {
    pub fn now_secs() -> f64 {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // CLOCK_MONOTONIC cannot fail with a valid pointer.
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        }
        ts.tv_sec as f64 + ts.tv_nsec as f64 / 1e9
    }
}

#[cfg(target_os = "windows")]
mod platform {
    use std::sync::OnceLock;
    use windows::Win32::System::Performance::{
        QueryPerformanceCounter, QueryPerformanceFrequency,
    };

    fn frequency() -> f64 {
        static FREQ: OnceLock<f64> = OnceLock::new();
        *FREQ.get_or_init(|| {
            let mut freq = 0i64;
            // Always succeeds on Windows XP and later.
            let _ = unsafe { QueryPerformanceFrequency(&mut freq) };
            freq.max(1) as f64
        })
    }

    pub fn now_secs() -> f64 {
        let mut count = 0i64;
        let _ = unsafe { QueryPerformanceCounter(&mut count) };
        count as f64 / frequency()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_is_non_decreasing() {
        let clock = Clock::new();
        let mut last = clock.time();
        for _ in 0..10_000 {
            let now = clock.time();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_time_advances_across_sleep() {
        let clock = Clock::new();
        let before = clock.time();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let elapsed = clock.time() - before;
        assert!(elapsed >= 0.015, "elapsed {elapsed}");
        assert!(elapsed < 1.0, "elapsed {elapsed}");
    }
}
