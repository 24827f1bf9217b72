use chrono::Local;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
};

/// Write-only sink handed to the reconciliation driver by whoever runs it.
pub trait Logger: Send + Sync {
    fn log(&mut self, message: &str);
    fn debug_log(&mut self, message: &str);
}

#[derive(Debug)]
pub struct FileLogger {
    log_file: String,
    debug: bool,
}

impl FileLogger {
    pub fn new(log_file: &str, debug: bool) -> std::io::Result<Self> {
        let log_file = shellexpand::tilde(log_file).to_string();

        if let Some(parent) = Path::new(&log_file).parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(FileLogger { log_file, debug })
    }

    fn write_to_file(&self, message: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)?;

        writeln!(file, "{}: {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message)
    }
}

impl Logger for FileLogger {
    fn log(&mut self, message: &str) {
        if let Err(e) = self.write_to_file(message) {
            eprintln!("Failed to write to log file: {}", e);
        }
    }

    fn debug_log(&mut self, message: &str) {
        if self.debug {
            if let Err(e) = self.write_to_file(&format!("[DEBUG] {}", message)) {
                eprintln!("Failed to write debug log: {}", e);
            }
        }
    }
}

/// Forwards to the global `tracing` subscriber.
#[derive(Debug, Default, Clone)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&mut self, message: &str) {
        tracing::info!("{}", message);
    }

    fn debug_log(&mut self, message: &str) {
        tracing::debug!("{}", message);
    }
}

// MultiLogger allows logging to multiple destinations
#[derive(Default)]
pub struct MultiLogger {
    loggers: Vec<Box<dyn Logger>>,
}

impl MultiLogger {
    pub fn new(loggers: Vec<Box<dyn Logger>>) -> Self {
        Self { loggers }
    }

    pub fn push(&mut self, logger: Box<dyn Logger>) {
        self.loggers.push(logger);
    }
}

impl Logger for MultiLogger {
    fn log(&mut self, message: &str) {
        for logger in &mut self.loggers {
            logger.log(message);
        }
    }

    fn debug_log(&mut self, message: &str) {
        for logger in &mut self.loggers {
            logger.debug_log(message);
        }
    }
}

/// Keeps lines in memory. Clones share the same buffer, so a caller can keep
/// one handle and box the other.
#[derive(Debug, Default, Clone)]
pub struct MemoryLogger {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }
}

impl Logger for MemoryLogger {
    fn log(&mut self, message: &str) {
        self.push(message.to_string());
    }

    fn debug_log(&mut self, message: &str) {
        self.push(format!("[DEBUG] {}", message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_logger_skips_debug_unless_enabled() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("logs/hook.log");
        let path = path.to_str().unwrap();

        let mut quiet = FileLogger::new(path, false)?;
        quiet.log("minted");
        quiet.debug_log("decision trace");

        let contents = fs::read_to_string(path)?;
        assert!(contents.contains(": minted"));
        assert!(!contents.contains("decision trace"));

        let mut verbose = FileLogger::new(path, true)?;
        verbose.debug_log("decision trace");
        let contents = fs::read_to_string(path)?;
        assert!(contents.contains("[DEBUG] decision trace"));
        Ok(())
    }

    #[test]
    fn multi_logger_fans_out() {
        let first = MemoryLogger::new();
        let second = MemoryLogger::new();
        let mut multi = MultiLogger::new(vec![Box::new(first.clone())]);
        multi.push(Box::new(second.clone()));

        multi.log("hello");
        multi.debug_log("details");

        assert_eq!(first.lines(), vec!["hello", "[DEBUG] details"]);
        assert_eq!(second.lines(), first.lines());
    }
}
