//! Progress and error text pushed through a caller-supplied sink.

use std::ops::BitOr;

/// Text sink. `None` asks the receiver to flush.
pub type DisplaySink = Box<dyn FnMut(Option<&str>)>;

/// What a session reports through its sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisplayFlags(u8);

impl DisplayFlags {
    pub const NONE: DisplayFlags = DisplayFlags(0);
    /// Phase names: input, sorting, merge, output.
    pub const PHASE: DisplayFlags = DisplayFlags(0x01);
    /// Extra detail: buffer size, work file name, write notices.
    pub const EXTRA: DisplayFlags = DisplayFlags(0x02);
    /// The formatted message of a fatal error.
    pub const ERROR: DisplayFlags = DisplayFlags(0x04);

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        DisplayFlags(bits & 0x07)
    }

    #[inline]
    pub const fn contains(self, other: DisplayFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for DisplayFlags {
    type Output = DisplayFlags;

    fn bitor(self, rhs: DisplayFlags) -> DisplayFlags {
        DisplayFlags(self.0 | rhs.0)
    }
}

/// Clears the current progress line.
pub(crate) const ERASE_LINE: &str = "\r                         ";

pub(crate) struct Display {
    flags: DisplayFlags,
    sink: Option<DisplaySink>,
}

impl Display {
    pub(crate) fn new(flags: DisplayFlags, sink: Option<DisplaySink>) -> Self {
        let flags = if sink.is_some() {
            flags
        } else {
            DisplayFlags::NONE
        };
        Display { flags, sink }
    }

    #[inline]
    pub(crate) fn phase(&self) -> bool {
        self.flags.contains(DisplayFlags::PHASE)
    }

    #[inline]
    pub(crate) fn extra(&self) -> bool {
        self.flags.contains(DisplayFlags::EXTRA)
    }

    fn text(&mut self, text: &str) {
        if let Some(sink) = self.sink.as_mut() {
            sink(Some(text));
        }
    }

    fn flush(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            sink(None);
        }
    }

    fn number(&mut self, n: usize) {
        let mut buf = itoa::Buffer::new();
        self.text(buf.format(n));
    }

    /// Session start. The detailed form also reports the buffer size.
    pub(crate) fn started(&mut self, bytes: usize) {
        if self.extra() {
            self.number(bytes);
            self.text(" bytes of memory allocated for sort buffers\n");
            self.text("Input phase 1");
            self.flush();
        } else if self.phase() {
            self.text("Input phase");
            self.flush();
        }
    }

    /// Input resumed after run `run - 1` was written.
    pub(crate) fn input_phase(&mut self, run: usize) {
        if self.extra() {
            self.text(ERASE_LINE);
            self.text("\rInput phase ");
            self.number(run);
            self.flush();
        }
    }

    pub(crate) fn sorting(&mut self, records: usize) {
        if self.extra() {
            self.text(ERASE_LINE);
            self.text("\rSorting ");
            self.number(records);
            self.text(" records");
            self.flush();
        }
    }

    pub(crate) fn created_work_file(&mut self, name: &str) {
        if self.extra() {
            self.text(ERASE_LINE);
            self.text("\rCreated work file ");
            self.text(name);
            self.text("\n");
            self.flush();
        }
    }

    pub(crate) fn writing(&mut self) {
        if self.extra() {
            self.text(ERASE_LINE);
            self.text("\rWriting to work file\n");
            self.flush();
        }
    }

    pub(crate) fn merge_started(&mut self) {
        if self.phase() && !self.extra() {
            self.text("\rMerge phase");
            self.flush();
        }
    }

    /// Start of write-back pass `pass` (1-based).
    pub(crate) fn merge_pass(&mut self, pass: usize) {
        if self.extra() {
            self.text(ERASE_LINE);
            self.text("\rMerge phase ");
            self.number(pass);
            self.flush();
        }
    }

    pub(crate) fn output_phase(&mut self) {
        if self.phase() || self.extra() {
            if self.extra() {
                self.text(ERASE_LINE);
            }
            self.text("\rOutput phase");
            self.flush();
        }
    }

    pub(crate) fn error(&mut self, message: &str) {
        if self.flags.contains(DisplayFlags::ERROR) {
            if self.phase() || self.extra() {
                self.text("\r");
            }
            self.text(message);
            self.text("\n");
            self.flush();
        }
    }

    pub(crate) fn delete_failed(&mut self, errno: i32) {
        if self.extra() {
            self.text("\nError deleting work file, errno=");
            let mut buf = itoa::Buffer::new();
            self.text(buf.format(errno));
            self.text("\n");
            self.flush();
        }
    }

    /// End the progress line. Nothing more is reported afterwards.
    pub(crate) fn close(&mut self) {
        if self.phase() || self.extra() {
            self.text("\r");
            self.flush();
        }
        self.flags = DisplayFlags::NONE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn capture(flags: DisplayFlags) -> (Display, Rc<RefCell<String>>) {
        let out = Rc::new(RefCell::new(String::new()));
        let sink_out = Rc::clone(&out);
        let sink: DisplaySink = Box::new(move |text: Option<&str>| {
            if let Some(t) = text {
                sink_out.borrow_mut().push_str(t);
            }
        });
        (Display::new(flags, Some(sink)), out)
    }

    #[test]
    fn test_flags_cleared_without_sink() {
        let d = Display::new(DisplayFlags::PHASE | DisplayFlags::EXTRA, None);
        assert!(!d.phase());
        assert!(!d.extra());
    }

    #[test]
    fn test_phase_messages() {
        let (mut d, out) = capture(DisplayFlags::PHASE);
        d.started(99);
        d.input_phase(2);
        d.sorting(1234);
        d.merge_started();
        d.merge_pass(1);
        d.output_phase();
        assert_eq!(
            out.borrow().as_str(),
            "Input phase\rMerge phase\rOutput phase"
        );
    }

    #[test]
    fn test_extra_messages() {
        let (mut d, out) = capture(DisplayFlags::EXTRA);
        d.started(99);
        d.sorting(1234);
        d.input_phase(2);
        d.merge_started();
        d.output_phase();
        assert_eq!(
            out.borrow().as_str(),
            format!(
                "99 bytes of memory allocated for sort buffers\nInput phase 1\
                 {e}\rSorting 1234 records{e}\rInput phase 2{e}\rOutput phase",
                e = ERASE_LINE
            )
        );
    }

    #[test]
    fn test_error_after_progress_starts_new_line() {
        let (mut d, out) = capture(DisplayFlags::EXTRA | DisplayFlags::ERROR);
        d.error("boom");
        assert_eq!(out.borrow().as_str(), "\rboom\n");
    }

    #[test]
    fn test_error_only_with_flag() {
        let (mut d, out) = capture(DisplayFlags::PHASE);
        d.error("boom");
        assert!(!out.borrow().contains("boom"));

        let (mut d, out) = capture(DisplayFlags::ERROR);
        d.error("boom");
        assert_eq!(out.borrow().as_str(), "boom\n");
    }

    #[test]
    fn test_close_silences() {
        let (mut d, out) = capture(DisplayFlags::PHASE | DisplayFlags::EXTRA);
        d.close();
        d.writing();
        assert_eq!(out.borrow().as_str(), "\r");
    }
}
