use std::sync::Mutex;

/// Presentation port for operator-facing text.
///
/// Daemons emit structured records through `tracing`; anything meant for a
/// human terminal (status, dashboards, session summaries) goes through a
/// sink instead, so rendering stays out of the core and tests can capture
/// output.
pub trait TextSink: Send + Sync {
    fn line(&self, text: &str);
}

/// Sink that prints to stdout; the CLI default.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl TextSink for StdoutSink {
    fn line(&self, text: &str) {
        println!("{text}");
    }
}

/// Sink that buffers lines in memory, for tests.
#[derive(Debug, Default)]
pub struct BufferSink {
    lines: Mutex<Vec<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("BufferSink lock poisoned").clone()
    }
}

impl TextSink for BufferSink {
    fn line(&self, text: &str) {
        self.lines
            .lock()
            .expect("BufferSink lock poisoned")
            .push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_sink_captures_lines_in_order() {
        let sink = BufferSink::new();
        sink.line("first");
        sink.line("second");
        assert_eq!(sink.lines(), vec!["first", "second"]);
    }
}
