/* 📖 # Why not just call umask()?

`umask(2)` can only be read by writing it: `old = umask(0); umask(old)`. Between the
two calls every other thread in the process creates files with mode 0666/0777. The
probe therefore prefers a read-only source (`Umask:` in `/proc/self/status`, Linux
4.7+) and otherwise forks a child that performs the destructive read in its own
address space and reports the value back through a pipe.

The value is captured once per process and never re-read.
*/

use std::io;
use std::sync::OnceLock;

use tracing::debug;

static PROCESS_UMASK: OnceLock<u32> = OnceLock::new();

/// Returns the process umask, probing it on first use.
pub fn process_umask() -> io::Result<u32> {
    if let Some(mask) = PROCESS_UMASK.get() {
        return Ok(*mask);
    }
    let probed = probe_umask()?;
    Ok(*PROCESS_UMASK.get_or_init(|| probed))
}

/// Extracts the `Umask:` field of a `/proc/<pid>/status` document.
pub fn parse_proc_status_umask(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Umask:"))
        .and_then(|value| u32::from_str_radix(value.trim(), 8).ok())
        .map(|mask| mask & 0o777)
}

#[cfg(unix)]
fn probe_umask() -> io::Result<u32> {
    if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
        if let Some(mask) = parse_proc_status_umask(&status) {
            debug!(umask = %format!("{:03o}", mask), "umask read from /proc/self/status");
            return Ok(mask);
        }
    }
    let mask = probe_umask_in_child()?;
    debug!(umask = %format!("{:03o}", mask), "umask probed in child process");
    Ok(mask)
}

#[cfg(not(unix))]
fn probe_umask() -> io::Result<u32> {
    debug!("no umask on this platform");
    Ok(0)
}

#[cfg(unix)]
fn probe_umask_in_child() -> io::Result<u32> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    let [read_fd, write_fd] = fds;

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        let err = io::Error::last_os_error();
        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
        return Err(err);
    }

    if pid == 0 {
        // Child: only async-signal-safe calls from here on.
        unsafe {
            libc::close(read_fd);
            let mask = libc::umask(0) as u32;
            let bytes = mask.to_ne_bytes();
            let written = libc::write(write_fd, bytes.as_ptr().cast(), bytes.len());
            libc::_exit(if written == bytes.len() as isize { 0 } else { 1 });
        }
    }

    unsafe { libc::close(write_fd) };
    let mut bytes = [0u8; 4];
    let mut filled = 0;
    let read_result = loop {
        if filled == bytes.len() {
            break Ok(());
        }
        let res = unsafe {
            libc::read(
                read_fd,
                bytes[filled..].as_mut_ptr().cast(),
                bytes.len() - filled,
            )
        };
        if res < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            break Err(err);
        }
        if res == 0 {
            break Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "umask probe child exited without reporting",
            ));
        }
        filled += res as usize;
    };
    unsafe { libc::close(read_fd) };

    let mut status = 0;
    while unsafe { libc::waitpid(pid, &mut status, 0) } < 0 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }

    read_result?;
    Ok(u32::from_ne_bytes(bytes) & 0o777)
}
