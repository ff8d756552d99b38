use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

type Sink = Box<dyn Write + Send>;

/// Rebindable sink shared by every formatting layer of a facade.
///
/// The formatter renders a whole record before asking for a writer, and the
/// writer holds the sink lock until it is dropped, so records never
/// interleave.
#[derive(Clone)]
pub(crate) struct SharedWriter {
    sink: Arc<Mutex<Sink>>,
}

impl SharedWriter {
    pub(crate) fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Swap the sink; records already written stay where they were.
    pub(crate) fn replace<W: Write + Send + 'static>(&self, writer: W) {
        *self.lock() = Box::new(writer);
    }

    fn lock(&self) -> MutexGuard<'_, Sink> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to the sink for one record.
pub(crate) struct SinkGuard<'a>(MutexGuard<'a, Sink>);

impl Write for SinkGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Drop for SinkGuard<'_> {
    fn drop(&mut self) {
        // Nowhere to report a failing sink
        let _ = self.0.flush();
    }
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SinkGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SinkGuard(self.lock())
    }
}
