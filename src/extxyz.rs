//! For opening extended XYZ files: XYZ where the comment line holds `key=value` pairs and a
//! `Properties=` descriptor of the atom columns. This is what the reformatter produces, e.g.
//!
//! ```text
//! 2
//! CCSD(T)/CBS=-0.52 MP2/CBS=-0.49 Properties=species:S:1:pos:R:3
//! O   0.000  0.000  0.000
//! H   0.957  0.000  0.000
//! ```
//!
//! Files may hold many frames back to back.

use std::{
    collections::HashMap,
    fs,
    fs::File,
    io::{self, ErrorKind, Write},
    iter::Peekable,
    path::Path,
    str::Chars,
};

use lin_alg::f64::Vec3;
use log::{info, warn};
use na_seq::Element;
use regex::Regex;

use crate::{AtomGeneric, layout::DEFAULT_MARKER};

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum PropertyKind {
    /// S
    Str,
    /// R
    Real,
    /// I
    Int,
    /// L
    Logical,
}

impl PropertyKind {
    fn from_letter(s: &str) -> Option<Self> {
        match s {
            "S" => Some(Self::Str),
            "R" => Some(Self::Real),
            "I" => Some(Self::Int),
            "L" => Some(Self::Logical),
            _ => None,
        }
    }

    fn to_letter(self) -> &'static str {
        match self {
            Self::Str => "S",
            Self::Real => "R",
            Self::Int => "I",
            Self::Logical => "L",
        }
    }
}

/// One entry of the `Properties=` descriptor, e.g. `pos:R:3`.
#[derive(Clone, PartialEq, Debug)]
pub struct PropertyColumn {
    pub name: String,
    pub kind: PropertyKind,
    pub count: usize,
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg)
}

/// Parse a descriptor such as `species:S:1:pos:R:3:forces:R:3`.
pub fn parse_properties(desc: &str) -> io::Result<Vec<PropertyColumn>> {
    let parts: Vec<&str> = desc.split(':').collect();
    if parts.len() % 3 != 0 {
        return Err(invalid(format!("Malformed Properties descriptor: {desc}")));
    }

    let mut result = Vec::new();
    for chunk in parts.chunks(3) {
        let kind = PropertyKind::from_letter(chunk[1])
            .ok_or_else(|| invalid(format!("Unknown property type '{}' in {desc}", chunk[1])))?;
        let count = chunk[2]
            .parse::<usize>()
            .map_err(|_| invalid(format!("Invalid column count '{}' in {desc}", chunk[2])))?;

        result.push(PropertyColumn {
            name: chunk[0].to_owned(),
            kind,
            count,
        });
    }

    let has_species = result
        .iter()
        .any(|p| p.name == "species" && p.kind == PropertyKind::Str && p.count == 1);
    let has_pos = result
        .iter()
        .any(|p| p.name == "pos" && p.kind == PropertyKind::Real && p.count == 3);
    if !has_species || !has_pos {
        return Err(invalid(format!(
            "Properties descriptor needs species:S:1 and pos:R:3 columns: {desc}"
        )));
    }

    Ok(result)
}

fn properties_to_string(props: &[PropertyColumn]) -> String {
    props
        .iter()
        .map(|p| format!("{}:{}:{}", p.name, p.kind.to_letter(), p.count))
        .collect::<Vec<_>>()
        .join(":")
}

/// Reads a bare or double-quoted token. Bare keys stop at `=`.
fn read_token(chars: &mut Peekable<Chars>, is_key: bool) -> io::Result<String> {
    let mut r = String::new();

    if chars.next_if_eq(&'"').is_some() {
        loop {
            match chars.next() {
                Some('"') => return Ok(r),
                Some(c) => r.push(c),
                None => return Err(invalid("Unterminated quote in header".to_owned())),
            }
        }
    }

    while let Some(c) = chars.next_if(|&c| !c.is_whitespace() && !(is_key && c == '=')) {
        r.push(c);
    }

    Ok(r)
}

/// Split a comment line into `key=value` pairs. A key without `=` gets the value `T`.
pub fn parse_header(line: &str) -> io::Result<Vec<(String, String)>> {
    let mut result = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let key = read_token(&mut chars, true)?;
        if key.is_empty() {
            return Err(invalid(format!("Empty key in header: {line}")));
        }

        if chars.next_if_eq(&'=').is_some() {
            let value = read_token(&mut chars, false)?;
            result.push((key, value));
        } else {
            result.push((key, "T".to_owned()));
        }
    }

    Ok(result)
}

#[derive(Clone, Debug)]
pub struct Frame {
    /// Set when loaded from a file: the file stem.
    pub name: Option<String>,
    /// Header pairs other than `Properties`, in file order.
    pub info: Vec<(String, String)>,
    pub properties: Vec<PropertyColumn>,
    pub atoms: Vec<AtomGeneric>,
    /// Per-atom columns other than species and pos, as raw tokens, `count` per atom.
    pub arrays: HashMap<String, Vec<String>>,
}

impl Frame {
    pub fn info(&self, key: &str) -> Option<&str> {
        self.info
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn info_f64(&self, key: &str) -> Option<f64> {
        self.info(key)?.parse().ok()
    }

    /// A per-atom real column, flattened.
    pub fn array_f64(&self, name: &str) -> Option<Vec<f64>> {
        self.arrays
            .get(name)?
            .iter()
            .map(|v| v.parse().ok())
            .collect()
    }

    fn from_lines(header: &str, atom_lines: &[&str], first_line: usize) -> io::Result<Self> {
        let mut info = Vec::new();
        let mut properties = None;

        for (k, v) in parse_header(header)? {
            if k.eq_ignore_ascii_case("Properties") {
                properties = Some(parse_properties(&v)?);
            } else {
                info.push((k, v));
            }
        }

        let properties = match properties {
            Some(p) => p,
            None => parse_properties(DEFAULT_MARKER.trim_start_matches("Properties="))?,
        };
        let n_cols = properties
            .iter()
            .try_fold(0usize, |acc, p| acc.checked_add(p.count))
            .ok_or_else(|| invalid("Properties column counts are too large".to_owned()))?;

        let mut atoms = Vec::with_capacity(atom_lines.len());
        let mut arrays: HashMap<String, Vec<String>> = HashMap::new();

        for (i, line) in atom_lines.iter().enumerate() {
            let line_num = first_line + i;
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < n_cols {
                return Err(invalid(format!(
                    "Expected {n_cols} columns on atom line {line_num}, found {}",
                    cols.len()
                )));
            }

            let mut element = None;
            let mut posit = None;
            let mut col = 0;

            for prop in &properties {
                let vals = &cols[col..col + prop.count];
                col += prop.count;

                match prop.name.as_str() {
                    "species" => {
                        let symbol = vals.first().ok_or_else(|| {
                            invalid(format!("Missing species on atom line {line_num}"))
                        })?;
                        element = Some(Element::from_letter(symbol)?);
                    }
                    "pos" => {
                        let mut p = [0.; 3];
                        for (dst, v) in p.iter_mut().zip(vals) {
                            *dst = v.parse().map_err(|_| {
                                invalid(format!("Invalid coordinate '{v}' on atom line {line_num}"))
                            })?;
                        }
                        posit = Some(Vec3::new(p[0], p[1], p[2]));
                    }
                    _ => {
                        arrays
                            .entry(prop.name.clone())
                            .or_default()
                            .extend(vals.iter().map(|v| v.to_string()));
                    }
                }
            }

            // Both are guaranteed present by `parse_properties`.
            let (Some(element), Some(posit)) = (element, posit) else {
                return Err(invalid(format!("Missing species or pos on atom line {line_num}")));
            };

            atoms.push(AtomGeneric {
                serial_number: i + 1,
                posit,
                element,
            });
        }

        Ok(Self {
            name: None,
            info,
            properties,
            atoms,
            arrays,
        })
    }

    fn header_line(&self) -> String {
        let mut r = String::new();
        for (k, v) in &self.info {
            if v.is_empty() || v.contains(char::is_whitespace) {
                r.push_str(&format!("{k}=\"{v}\" "));
            } else {
                r.push_str(&format!("{k}={v} "));
            }
        }
        r.push_str("Properties=");
        r.push_str(&properties_to_string(&self.properties));
        r
    }
}

#[derive(Clone, Debug, Default)]
pub struct ExtXyz {
    pub frames: Vec<Frame>,
}

impl ExtXyz {
    pub fn new(text: &str) -> io::Result<Self> {
        let lines: Vec<&str> = text.lines().collect();
        let mut frames = Vec::new();

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i].trim();
            if line.is_empty() {
                i += 1;
                continue;
            }

            let n = line.parse::<usize>().map_err(|_| {
                invalid(format!("Expected atom count on line {}, got '{line}'", i + 1))
            })?;

            let header = lines.get(i + 1).ok_or_else(|| {
                invalid(format!("Missing header line after atom count on line {}", i + 1))
            })?;

            let start = i + 2;
            let end = start
                .checked_add(n)
                .filter(|&end| end <= lines.len())
                .ok_or_else(|| {
                    invalid(format!(
                        "Frame at line {} needs {n} atom lines, only {} remain",
                        i + 1,
                        lines.len() - start
                    ))
                })?;

            frames.push(Frame::from_lines(header, &lines[start..end], start + 1)?);
            i = end;
        }

        Ok(Self { frames })
    }

    /// Frames are named after the file stem.
    pub fn load(path: &Path) -> io::Result<Self> {
        let data_str = fs::read_to_string(path)?;
        let mut result = Self::new(&data_str)?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());
        for frame in &mut result.frames {
            frame.name = stem.clone();
        }

        Ok(result)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut file = File::create(path)?;

        for frame in &self.frames {
            writeln!(file, "{}", frame.atoms.len())?;
            writeln!(file, "{}", frame.header_line())?;

            for (i, atom) in frame.atoms.iter().enumerate() {
                let mut line = String::new();
                for prop in &frame.properties {
                    match prop.name.as_str() {
                        "species" => line.push_str(&format!("{:<2}", atom.element.to_letter())),
                        "pos" => line.push_str(&format!(
                            " {:>17.10} {:>17.10} {:>17.10}",
                            atom.posit.x, atom.posit.y, atom.posit.z
                        )),
                        name => {
                            let vals = frame.arrays.get(name).ok_or_else(|| {
                                invalid(format!("Missing values for property {name}"))
                            })?;
                            for v in vals.iter().skip(i * prop.count).take(prop.count) {
                                line.push(' ');
                                line.push_str(v);
                            }
                        }
                    }
                }
                writeln!(file, "{line}")?;
            }
        }

        Ok(())
    }
}

/// Compile a filename glob (`*` and `?` wildcards) into an anchored regex.
pub fn glob_to_regex(glob: &str) -> io::Result<Regex> {
    let mut pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');

    Regex::new(&pattern).map_err(|e| io::Error::new(ErrorKind::InvalidInput, e.to_string()))
}

/// Load every frame from the files in `dir` whose names match `glob`, in name order. If
/// `elements` isn't empty, every atom must be one of them.
pub fn load_folder(dir: &Path, glob: &str, elements: &[Element]) -> io::Result<Vec<Frame>> {
    let re = glob_to_regex(glob)?;

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| re.is_match(n));
        if matches {
            paths.push(path);
        }
    }
    paths.sort();

    if paths.is_empty() {
        warn!("No files in {} match '{glob}'", dir.display());
    }

    let mut result = Vec::new();
    for path in &paths {
        let xyz = ExtXyz::load(path)?;

        if !elements.is_empty() {
            for frame in &xyz.frames {
                if let Some(atom) = frame.atoms.iter().find(|a| !elements.contains(&a.element)) {
                    return Err(invalid(format!(
                        "Element {} in {} is not in the allowed list",
                        atom.element.to_letter(),
                        path.display()
                    )));
                }
            }
        }

        result.extend(xyz.frames);
    }

    info!("Loaded {} frames from {} files in {}", result.len(), paths.len(), dir.display());

    Ok(result)
}
