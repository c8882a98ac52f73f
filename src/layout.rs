//! Header layouts: which metadata tokens of a block are kept, what they're called in the
//! synthesized header, and the trailing column descriptor.
//!
//! The metadata lines in these datasets are bare whitespace-separated values with no schema in
//! the file itself, so the positions and their meaning have to be supplied from outside. Load
//! them from a TOML file, or use a preset:
//!
//! ```toml
//! indices = [16, 18]
//! labels = ["CCSD(T)/CBS", "MP2/CBS"]
//! marker = "Properties=species:S:1:pos:R:3"
//! ```

use std::{
    fmt::Write as _,
    fs,
    io::{self, ErrorKind},
    path::Path,
};

use serde::Deserialize;

/// Trailing descriptor for plain `species x y z` atom lines.
pub const DEFAULT_MARKER: &str = "Properties=species:S:1:pos:R:3";

fn default_marker() -> String {
    DEFAULT_MARKER.to_owned()
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct HeaderLayout {
    /// 0-based positions into the whitespace-split metadata line, in output order.
    pub indices: Vec<usize>,
    /// One label per index.
    pub labels: Vec<String>,
    #[serde(default = "default_marker")]
    pub marker: String,
}

impl HeaderLayout {
    pub fn new(indices: Vec<usize>, labels: Vec<String>, marker: &str) -> io::Result<Self> {
        let result = Self {
            indices,
            labels,
            marker: marker.to_owned(),
        };
        result.validate()?;

        Ok(result)
    }

    /// The NENCI-2021 intermolecular complex files: reference energies at every other
    /// position of the metadata line, starting at 16.
    pub fn nenci_2021() -> Self {
        let labels = [
            "CCSD(T)/CBS",
            "CCSD(T)/haTZ",
            "MP2/haTZ",
            "MP2/CBS",
            "MP2/aTZ",
            "MP2/aQZ",
            "HF/haTZ",
            "HF/aTZ",
            "HF/aQZ",
            "SAPT2+/aDZTot",
        ];

        Self {
            indices: (16..=34).step_by(2).collect(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            marker: default_marker(),
        }
    }

    pub fn validate(&self) -> io::Result<()> {
        let invalid = |msg: String| Err(io::Error::new(ErrorKind::InvalidInput, msg));

        if self.indices.is_empty() {
            return invalid("Header layout must select at least one token".to_owned());
        }

        if self.indices.len() != self.labels.len() {
            return invalid(format!(
                "Header layout has {} indices but {} labels",
                self.indices.len(),
                self.labels.len()
            ));
        }

        for label in &self.labels {
            if label.is_empty() || label.contains('=') || label.contains(char::is_whitespace) {
                return invalid(format!("Invalid header label: {label:?}"));
            }
        }

        if self.marker.contains(['\n', '\r']) {
            return invalid("Header marker can't span lines".to_owned());
        }

        Ok(())
    }

    /// Largest selected index. A metadata line needs `max_index() + 1` tokens.
    pub fn max_index(&self) -> usize {
        self.indices.iter().copied().max().unwrap_or(0)
    }

    /// Build the header for one block, e.g. `CCSD(T)/CBS=-1.2 MP2/CBS=-1.1 Properties=...`.
    /// Returns `None` if the tokens are too short for this layout.
    pub fn render(&self, tokens: &[&str]) -> Option<String> {
        let values = self
            .indices
            .iter()
            .map(|&i| tokens.get(i).copied())
            .collect::<Option<Vec<_>>>()?;

        let header = match self.render_labeled(&values) {
            Ok(h) => h,
            Err(_) => self.render_fallback(&values),
        };

        Some(header)
    }

    fn render_labeled(&self, values: &[&str]) -> Result<String, std::fmt::Error> {
        if values.len() != self.labels.len() {
            return Err(std::fmt::Error);
        }

        let mut r = String::new();
        for (label, value) in self.labels.iter().zip(values) {
            write!(r, "{label}={value} ")?;
        }
        r.push_str(&self.marker);

        Ok(r)
    }

    /// Used when the labels can't be paired with the values.
    fn render_fallback(&self, values: &[&str]) -> String {
        let mut r = String::new();
        for v in values {
            r.push_str("meta:");
            r.push_str(v);
            r.push(' ');
        }
        r.push_str(&self.marker);

        r
    }

    pub fn from_toml(text: &str) -> io::Result<Self> {
        let result: Self = toml::from_str(text).map_err(|e| {
            io::Error::new(
                ErrorKind::InvalidData,
                format!("Invalid header layout: {e}"),
            )
        })?;
        result.validate()?;

        Ok(result)
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let data_str = fs::read_to_string(path)?;
        Self::from_toml(&data_str)
    }
}

impl Default for HeaderLayout {
    fn default() -> Self {
        Self::nenci_2021()
    }
}
