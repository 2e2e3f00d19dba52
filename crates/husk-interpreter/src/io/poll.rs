//! Thin wrapper over poll(2)

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

#[derive(Default)]
pub(crate) struct PollSet {
    fds: Vec<libc::pollfd>,
}

impl PollSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch_read(&mut self, fd: RawFd) {
        self.watch(fd, libc::POLLIN);
    }

    pub fn watch_write(&mut self, fd: RawFd) {
        self.watch(fd, libc::POLLOUT);
    }

    fn watch(&mut self, fd: RawFd, events: libc::c_short) {
        self.fds.push(libc::pollfd { fd, events, revents: 0 });
    }

    /// Block until a watched fd is ready or `timeout` passes. With nothing
    /// watched this is a plain sleep.
    pub fn wait(&mut self, timeout: Duration) -> io::Result<usize> {
        let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
        loop {
            // SAFETY: the pointer and length describe our own initialized pollfd buffer
            let n = unsafe { libc::poll(self.fds.as_mut_ptr(), self.fds.len() as libc::nfds_t, millis) };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// Whether `fd` reported any event, including hangup or error
    pub fn ready(&self, fd: RawFd) -> bool {
        self.fds.iter().any(|p| p.fd == fd && p.revents != 0)
    }
}

/// Whether a write to `fd` would make progress right now
pub(crate) fn writable_now(fd: RawFd) -> bool {
    let mut set = PollSet::new();
    set.watch_write(fd);
    matches!(set.wait(Duration::ZERO), Ok(n) if n > 0)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::fd::AsRawFd;

    use super::*;

    #[test]
    fn test_pipe_readiness() {
        let (reader, mut writer) = std::io::pipe().unwrap();
        assert!(writable_now(writer.as_raw_fd()));

        let mut set = PollSet::new();
        set.watch_read(reader.as_raw_fd());
        assert_eq!(set.wait(Duration::ZERO).unwrap(), 0);

        writer.write_all(b"x").unwrap();
        let mut set = PollSet::new();
        set.watch_read(reader.as_raw_fd());
        assert_eq!(set.wait(Duration::from_millis(100)).unwrap(), 1);
        assert!(set.ready(reader.as_raw_fd()));
    }

    #[test]
    fn test_empty_set_sleeps() {
        let start = std::time::Instant::now();
        PollSet::new().wait(Duration::from_millis(5)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
