use indicatif::{ProgressBar, ProgressStyle};
use std::borrow::Cow;

/// Copy buffer used when streaming dumps in or out of a client process
pub const COPY_BUFFER_BYTES: usize = 256 * 1024;

/// Byte-count progress bar on stderr, hidden when stderr is not a terminal
pub fn byte_progress(total_bytes: u64, message: impl Into<Cow<'static, str>>) -> ProgressBar {
    let bar = ProgressBar::new(total_bytes);
    let style = ProgressStyle::with_template(
        "{msg} [{elapsed_precise}] [{wide_bar}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ");
    bar.set_style(style);
    bar.set_message(message);
    bar
}
