//! Line-oriented terminal over stdin and stdout.

use aidm_core::Terminal;
use std::io::{self, Write};

pub struct Console {
    stdin: io::Stdin,
    stdout: io::Stdout,
}

impl Console {
    pub fn new() -> Self {
        Self {
            stdin: io::stdin(),
            stdout: io::stdout(),
        }
    }
}

impl Terminal for Console {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.stdout, "{prompt}")?;
        self.stdout.flush()?;

        let mut line = String::new();
        if self.stdin.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn show(&mut self, text: &str) {
        // A closed stdout leaves nothing to report to.
        let _ = writeln!(self.stdout, "{text}");
        let _ = self.stdout.flush();
    }
}
