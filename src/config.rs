//! Per-document configuration snapshot
//!
//! The core treats configuration as read-only: parsing config files and wiring
//! keystrokes to operations is external (see crate docs). `DocumentConfig` is the
//! validated snapshot the rest of the core consults.

use crate::error::{EditError, EditResult};

/// Minimum accepted tab width (inclusive)
pub const MIN_TABWIDTH: u8 = 1;
/// Maximum accepted tab width (inclusive)
pub const MAX_TABWIDTH: u8 = 24;

/// File line-ending convention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Unix,
    Windows,
}

impl FileFormat {
    pub fn line_ending(self) -> &'static str {
        match self {
            FileFormat::Unix => "\n",
            FileFormat::Windows => "\r\n",
        }
    }

    /// Parse the user-facing setting string ("unix" or "windows"/"dos")
    pub fn parse(s: &str) -> EditResult<Self> {
        match s {
            "unix" => Ok(FileFormat::Unix),
            "windows" | "dos" => Ok(FileFormat::Windows),
            other => Err(EditError::argument(
                "INVALID_FILE_FORMAT",
                format!("unknown file format '{other}'"),
            )),
        }
    }
}

/// Validated, read-only-from-the-core's-perspective configuration for a Document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentConfig {
    tabwidth: u8,
    pub expand_tab: bool,
    pub auto_indent: bool,
    pub line_wrap: bool,
    color_column: Option<u32>,
    syntax_horizon: u32,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            tabwidth: 8,
            expand_tab: false,
            auto_indent: true,
            line_wrap: true,
            color_column: None,
            syntax_horizon: 40,
        }
    }
}

impl DocumentConfig {
    pub fn tabwidth(&self) -> u8 {
        self.tabwidth
    }

    /// Set tab width, clamping validation to config-set time (not use time),
    /// per the "Tab width clamping" design note.
    pub fn set_tabwidth(&mut self, width: u8) -> EditResult<()> {
        if !(MIN_TABWIDTH..=MAX_TABWIDTH).contains(&width) {
            return Err(EditError::argument(
                "INVALID_TABWIDTH",
                format!("tabwidth must be in {MIN_TABWIDTH}..={MAX_TABWIDTH}, got {width}"),
            ));
        }
        self.tabwidth = width;
        Ok(())
    }

    pub fn color_column(&self) -> Option<u32> {
        self.color_column
    }

    pub fn set_color_column(&mut self, col: Option<u32>) -> EditResult<()> {
        if let Some(c) = col {
            if c == 0 {
                return Err(EditError::argument(
                    "INVALID_COLOR_COLUMN",
                    "color column must be >= 1",
                ));
            }
        }
        self.color_column = col;
        Ok(())
    }

    pub fn syntax_horizon(&self) -> u32 {
        self.syntax_horizon
    }

    pub fn set_syntax_horizon(&mut self, lines: u32) -> EditResult<()> {
        if lines == 0 {
            return Err(EditError::argument(
                "INVALID_SYNTAX_HORIZON",
                "syntax horizon must be >= 1",
            ));
        }
        self.syntax_horizon = lines;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tabwidth_is_valid() {
        let cfg = DocumentConfig::default();
        assert_eq!(cfg.tabwidth(), 8);
    }

    #[test]
    fn set_tabwidth_rejects_out_of_range() {
        let mut cfg = DocumentConfig::default();
        assert!(cfg.set_tabwidth(0).is_err());
        assert!(cfg.set_tabwidth(25).is_err());
        assert!(cfg.set_tabwidth(4).is_ok());
        assert_eq!(cfg.tabwidth(), 4);
    }

    #[test]
    fn file_format_parses_aliases() {
        assert_eq!(FileFormat::parse("windows").unwrap(), FileFormat::Windows);
        assert_eq!(FileFormat::parse("dos").unwrap(), FileFormat::Windows);
        assert_eq!(FileFormat::parse("unix").unwrap(), FileFormat::Unix);
        assert!(FileFormat::parse("bogus").is_err());
    }

    #[test]
    fn color_column_rejects_zero() {
        let mut cfg = DocumentConfig::default();
        assert!(cfg.set_color_column(Some(0)).is_err());
        assert!(cfg.set_color_column(Some(80)).is_ok());
        assert_eq!(cfg.color_column(), Some(80));
    }
}
