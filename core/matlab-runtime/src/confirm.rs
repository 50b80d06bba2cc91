//! Interactive yes/no confirmation before destructive or license-bound steps.
//!
//! ## Answer table
//!
//! | Input              | Default `Yes` | Default `No` |
//! |--------------------|---------------|--------------|
//! | auto-accept        | yes           | no           |
//! | empty line         | yes           | no           |
//! | starts with y / Y  | yes           | yes          |
//! | anything else      | no            | no           |
//! | end of input       | no            | no           |
//!
//! Only auto-accept skips reading; a closed stdin never confirms anything.

use std::io::{BufRead, BufReader, Write};

use crate::errors::{Error, IoContext, Result};

/// The answer assumed when the operator just presses enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
}

impl Answer {
    fn options(self) -> &'static str {
        match self {
            Self::Yes => "([yes]/no)",
            Self::No => "(yes/[no])",
        }
    }

    fn as_bool(self) -> bool {
        matches!(self, Self::Yes)
    }
}

/// Asks yes/no questions on a line-oriented input/output pair.
pub struct ConfirmationGate {
    auto_answer: bool,
    input: Box<dyn BufRead>,
    output: Box<dyn Write>,
}

impl ConfirmationGate {
    /// Creates a gate reading from stdin and writing to stdout.
    ///
    /// With `auto_answer` set every question returns its default without
    /// prompting. **For the license question this means accepting the MATLAB
    /// Runtime license agreement.**
    #[must_use]
    pub fn stdio(auto_answer: bool) -> Self {
        Self::new(
            auto_answer,
            BufReader::new(std::io::stdin()),
            std::io::stdout(),
        )
    }

    /// Creates a gate over arbitrary input and output streams.
    #[must_use]
    pub fn new(
        auto_answer: bool,
        input: impl BufRead + 'static,
        output: impl Write + 'static,
    ) -> Self {
        Self {
            auto_answer,
            input: Box::new(input),
            output: Box::new(output),
        }
    }

    /// Returns whether questions are answered automatically.
    #[must_use]
    pub fn auto_answer(&self) -> bool {
        self.auto_answer
    }

    /// Asks a question and returns the operator's answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt cannot be written or the answer read.
    pub fn ask(&mut self, question: &str, default: Answer) -> Result<bool> {
        if self.auto_answer {
            tracing::debug!(question, answer = default.as_bool(), "auto-answered");
            return Ok(default.as_bool());
        }

        write!(self.output, "{question} {} ", default.options())
            .and_then(|()| self.output.flush())
            .io_context(|| "Failed to write prompt")?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .io_context(|| "Failed to read answer")?;
        if read == 0 {
            // Terminate the prompt line so later output starts on its own.
            let _ = writeln!(self.output);
            tracing::warn!(question, "no answer on closed input, treating as no");
            return Ok(false);
        }

        Ok(interpret(&line, default))
    }

    /// Asks a question whose negative answer aborts the operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UserDeclined`] if the answer is no.
    pub fn require(&mut self, question: &str, default: Answer) -> Result<()> {
        if self.ask(question, default)? {
            Ok(())
        } else {
            Err(Error::user_declined(question))
        }
    }
}

impl std::fmt::Debug for ConfirmationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationGate")
            .field("auto_answer", &self.auto_answer)
            .finish_non_exhaustive()
    }
}

/// Maps a typed line to an answer.
fn interpret(line: &str, default: Answer) -> bool {
    let answer = line.trim();
    if answer.is_empty() {
        return default.as_bool();
    }
    answer.starts_with(['y', 'Y'])
}
