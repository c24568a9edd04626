//! Host time source.

use std::sync::Arc;

use halite_core::Clock;

/// The clock the host uses for timestamps on this platform.
pub fn platform_clock() -> Arc<dyn Clock> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(MachClock::new())
    }
    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(halite_core::MonotonicClock::new())
    }
}

/// `mach_absolute_time` ticks, the unit of `AudioTimeStamp::host_time`.
#[cfg(target_os = "macos")]
#[derive(Debug, Clone, Copy)]
pub struct MachClock {
    ticks_per_second: f64,
}

#[cfg(target_os = "macos")]
impl MachClock {
    pub fn new() -> Self {
        let mut info = libc::mach_timebase_info_data_t { numer: 0, denom: 0 };
        // SAFETY: `info` is a valid out pointer.
        #[allow(deprecated)]
        let status = unsafe { libc::mach_timebase_info(&mut info) };
        let ticks_per_second = if status == 0 && info.numer != 0 {
            1_000_000_000.0 * f64::from(info.denom) / f64::from(info.numer)
        } else {
            log::warn!("mach_timebase_info failed ({status}), assuming nanosecond ticks");
            1_000_000_000.0
        };
        Self { ticks_per_second }
    }
}

#[cfg(target_os = "macos")]
impl Default for MachClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "macos")]
impl Clock for MachClock {
    fn now(&self) -> u64 {
        // SAFETY: no preconditions.
        #[allow(deprecated)]
        unsafe {
            libc::mach_absolute_time()
        }
    }

    fn ticks_per_second(&self) -> f64 {
        self.ticks_per_second
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_clock_advances() {
        let clock = platform_clock();
        assert!(clock.ticks_per_second() > 0.0);
        let a = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(clock.now() > a);
    }
}
