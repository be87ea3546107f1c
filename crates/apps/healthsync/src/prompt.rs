//! Interactive one-time code entry

use std::io::{self, BufRead, IsTerminal, Write};

use health::MfaCodeProvider;

/// Asks for the one-time code on the terminal
pub struct StdinCodePrompt;

impl MfaCodeProvider for StdinCodePrompt {
    fn one_time_code(&self) -> Option<String> {
        if !io::stdin().is_terminal() {
            log::warn!("[AUTH] One-time code required but stdin is not a terminal");
            return None;
        }

        eprint!("Enter the one-time code sent to you: ");
        io::stderr().flush().ok()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).ok()?;
        let code = line.trim();
        (!code.is_empty()).then(|| code.to_string())
    }
}
