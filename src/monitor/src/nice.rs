//! Thin libc wrappers for reading and writing process nice values.

use std::io;

/// Reads the nice value of `pid`. `getpriority` can legitimately return
/// -1, so errno has to be cleared before the call to tell the two cases
/// apart.
pub(crate) fn read_nice(pid: u32) -> Option<i32> {
    unsafe {
        *libc::__errno_location() = 0;
        let nice = libc::getpriority(libc::PRIO_PROCESS as _, pid as libc::id_t);
        if nice == -1 && *libc::__errno_location() != 0 {
            None
        } else {
            Some(nice)
        }
    }
}

pub(crate) fn write_nice(pid: u32, nice: i32) -> io::Result<()> {
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS as _, pid as libc::id_t, nice) };
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_own_nice() {
        let nice = read_nice(std::process::id());
        assert!(nice.is_some());
        assert!((-20..=19).contains(&nice.unwrap()));
    }

    #[test]
    fn read_of_bogus_pid_is_none() {
        assert!(read_nice(u32::MAX - 1).is_none());
    }
}
