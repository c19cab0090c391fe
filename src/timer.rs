//! Monotonic periodic timer on top of timerfd. `wait` reports the number of
//! expirations since the previous wait, so a value other than 1 means the
//! loop missed its slot.

use std::os::unix::io::RawFd;

use crate::{Error, Result};

pub struct PeriodicTimer {
    fd: RawFd,
}

impl PeriodicTimer {
    pub fn new() -> Result<PeriodicTimer> {
        let fd = unsafe { libc::timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_CLOEXEC) };
        if fd == -1 {
            return Err(Error::Message("failed to create timer".to_string()));
        }
        Ok(PeriodicTimer { fd })
    }

    pub fn start(&mut self, period_ns: u64) -> Result<()> {
        self.settime(period_ns)
            .map_err(|_| Error::Message("failed to start timer".to_string()))
    }

    pub fn stop(&mut self) -> Result<()> {
        self.settime(0)
            .map_err(|_| Error::Message("failed to stop timer".to_string()))
    }

    fn settime(&mut self, period_ns: u64) -> std::result::Result<(), ()> {
        let spec = libc::itimerspec {
            it_interval: libc::timespec {
                tv_sec: (period_ns / 1_000_000_000) as libc::time_t,
                tv_nsec: (period_ns % 1_000_000_000) as libc::c_long,
            },
            it_value: libc::timespec {
                tv_sec: (period_ns / 1_000_000_000) as libc::time_t,
                tv_nsec: (period_ns % 1_000_000_000) as libc::c_long,
            },
        };
        let res = unsafe { libc::timerfd_settime(self.fd, 0, &spec, std::ptr::null_mut()) };
        if res != 0 {
            return Err(());
        }
        Ok(())
    }

    /// Blocks until the next expiration and returns how many periods passed.
    pub fn wait(&mut self) -> Result<u32> {
        let mut expired: u64 = 0;
        loop {
            let res = unsafe {
                libc::read(
                    self.fd,
                    &mut expired as *mut u64 as *mut libc::c_void,
                    std::mem::size_of::<u64>(),
                )
            };
            if res == -1 && std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            if res != std::mem::size_of::<u64>() as isize {
                return Err(Error::Message("failed to wait for timer".to_string()));
            }
            return Ok(expired as u32);
        }
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        loop {
            let res = unsafe { libc::close(self.fd) };
            if res == -1 && std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn fires_periodically() {
        let mut timer = PeriodicTimer::new().unwrap();
        timer.start(2_000_000).unwrap();
        let begin = Instant::now();
        let mut total = 0;
        while total < 5 {
            total += timer.wait().unwrap();
        }
        let elapsed = begin.elapsed();
        assert!(elapsed.as_millis() >= 9, "elapsed {:?}", elapsed);
        timer.stop().unwrap();
    }
}
