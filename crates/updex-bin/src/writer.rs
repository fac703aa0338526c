use std::io;

use indicatif::MultiProgress;
use tracing_subscriber::fmt::MakeWriter;

/// A [`MakeWriter`] that writes log lines to stderr while suspending the
/// progress bars of a [`MultiProgress`], so log output does not tear them.
#[derive(Clone)]
pub struct IndicatifWriter {
    progress_bars: MultiProgress,
}

impl IndicatifWriter {
    pub fn new(progress_bars: MultiProgress) -> Self {
        Self { progress_bars }
    }
}

impl io::Write for IndicatifWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.progress_bars.suspend(|| io::Write::write(&mut io::stderr(), buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.progress_bars.suspend(|| io::Write::flush(&mut io::stderr()))
    }
}

impl<'a> MakeWriter<'a> for IndicatifWriter {
    type Writer = IndicatifWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
