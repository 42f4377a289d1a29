//! Error message formatting with actionable suggestions.

use cachet_core::error::CacheError;
use std::error::Error;

use super::colors::ColorSupport;

/// Error formatter with suggestions
pub struct ErrorFormatter {
    colors: ColorSupport,
}

impl ErrorFormatter {
    pub fn new() -> Self {
        Self {
            colors: ColorSupport::detect(),
        }
    }

    #[cfg(test)]
    fn with_colors(colors: ColorSupport) -> Self {
        Self { colors }
    }

    /// Format an error with its suggestion and source chain
    pub fn format_error(&self, error: &CacheError) -> String {
        let mut output = String::new();

        output.push_str(&self.colors.red("error"));
        output.push_str(": ");
        output.push_str(&error.to_string());
        output.push('\n');

        if let Some(suggestion) = error.suggestion() {
            output.push('\n');
            output.push_str(&self.colors.dim("help"));
            output.push_str(": ");
            output.push_str(suggestion);
            output.push('\n');
        }

        let mut source = error.source();
        while let Some(err) = source {
            output.push('\n');
            output.push_str(&self.colors.dim("caused by"));
            output.push_str(": ");
            output.push_str(&err.to_string());
            source = err.source();
        }

        output
    }

    pub fn format_simple(&self, message: &str) -> String {
        format!("{}: {}", self.colors.red("error"), message)
    }
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_has_help() {
        let formatter = ErrorFormatter::with_colors(ColorSupport::disabled());
        let error = CacheError::validation("Key Validation Error: a,b cannot contain commas.");
        let output = formatter.format_error(&error);

        assert!(output.starts_with("error: Key Validation Error: a,b cannot contain commas.\n"));
        assert!(output.contains("help: Check the cache paths and keys passed to the command"));
    }

    #[test]
    fn test_source_chain_is_listed() {
        let formatter = ErrorFormatter::with_colors(ColorSupport::disabled());
        let error = CacheError::io(
            "Failed to get current directory".to_string(),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let output = formatter.format_error(&error);
        assert!(output.contains("caused by: gone"));
    }
}
