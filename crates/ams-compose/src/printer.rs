#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Printer {
    /// Print the normal per-library status lines.
    Default,
    /// Suppress all output.
    Quiet,
    /// Print everything (debug logging rides on tracing, not this).
    Verbose,
}

impl std::fmt::Write for Printer {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        match self {
            Self::Default | Self::Verbose => {
                anstream::print!("{s}");
            }
            Self::Quiet => {}
        }
        Ok(())
    }
}
