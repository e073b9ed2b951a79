pub mod io;

/// Let a closed output pipe end the process with SIGPIPE, as shell
/// pipelines expect, instead of surfacing EPIPE on the next write. Call it
/// before any output is written.
#[inline]
pub fn reset_sigpipe() {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

/// Text of an I/O error as shown to users: the OS description without the
/// trailing errno that std appends.
pub fn io_error_msg(e: &std::io::Error) -> String {
    let text = e.to_string();
    let Some(code) = e.raw_os_error() else {
        return text;
    };
    let errno = format!(" (os error {})", code);
    match text.strip_suffix(errno.as_str()) {
        Some(bare) => bare.to_string(),
        None => text,
    }
}
