/// Program log lines, in emission order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LogCollector {
    lines: Vec<String>,
}

impl LogCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&mut self, line: String) {
        tracing::debug!(target: "sbpf_vm::program", "{line}");
        self.lines.push(line);
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}
