//! CDL (network Common Data form Language) text parsing.
//!
//! `ncdump` renders a NetCDF file as CDL: a `dimensions:` section, a
//! `variables:` section with per-variable and global attributes, and an
//! optional `data:` section. Only the classic data model is understood:
//! a `types:` section is skipped and groups are rejected.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{NetCdfError, NetCdfResult};
use crate::{AttrValue, Dataset, DatasetOpener, Dimension, VariableInfo};

const CDL_TYPES: &[&str] = &[
    "char", "byte", "ubyte", "short", "ushort", "int", "uint", "long", "int64", "uint64", "float",
    "real", "double", "string",
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Section(String),
    Punct(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Dimensions,
    Variables,
    Data,
    Skipped,
}

/// Parsed CDL document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CdlDocument {
    pub name: String,
    pub dimensions: Vec<Dimension>,
    pub variables: Vec<VariableInfo>,
    pub global_attributes: BTreeMap<String, AttrValue>,
    /// Numeric values from the `data:` section.
    pub data: BTreeMap<String, Vec<f64>>,
}

impl CdlDocument {
    pub fn parse(text: &str) -> NetCdfResult<Self> {
        let tokens = tokenize(text)?;
        let mut doc = CdlDocument::default();
        let mut section = Section::Preamble;

        for statement in tokens.split(|t| *t == Token::Punct(';')) {
            let mut stmt: &[Token] = statement;
            // Section headers and the `netcdf name {` preamble precede the
            // first statement of a section.
            loop {
                match stmt.first() {
                    Some(Token::Section(name)) => {
                        section = match name.as_str() {
                            "dimensions" => Section::Dimensions,
                            "variables" => Section::Variables,
                            "data" => Section::Data,
                            _ => Section::Skipped,
                        };
                        stmt = &stmt[1..];
                    }
                    Some(Token::Word(w)) if w == "netcdf" && section == Section::Preamble => {
                        if let Some(Token::Word(name)) = stmt.get(1) {
                            doc.name = name.clone();
                        }
                        let open = stmt
                            .iter()
                            .position(|t| *t == Token::Punct('{'))
                            .ok_or_else(|| {
                                NetCdfError::InvalidFormat("missing '{' after netcdf".into())
                            })?;
                        stmt = &stmt[open + 1..];
                    }
                    Some(Token::Punct('}')) => stmt = &stmt[1..],
                    _ => break,
                }
            }
            if stmt.is_empty() {
                continue;
            }

            match section {
                Section::Dimensions => doc.parse_dimensions(stmt)?,
                Section::Variables => doc.parse_variable_statement(stmt)?,
                Section::Data => doc.parse_data(stmt)?,
                Section::Preamble => {
                    return Err(NetCdfError::InvalidFormat(
                        "statement outside of any section".into(),
                    ))
                }
                Section::Skipped => {}
            }
        }

        Ok(doc)
    }

    fn parse_dimensions(&mut self, stmt: &[Token]) -> NetCdfResult<()> {
        for decl in stmt.split(|t| *t == Token::Punct(',')) {
            match decl {
                [Token::Word(name), Token::Punct('='), Token::Word(len)] => {
                    let (len, unlimited) = if len.eq_ignore_ascii_case("unlimited") {
                        (0, true)
                    } else {
                        let len = len.parse().map_err(|_| {
                            NetCdfError::InvalidFormat(format!(
                                "bad length for dimension {}: {}",
                                name, len
                            ))
                        })?;
                        (len, false)
                    };
                    self.dimensions.push(Dimension {
                        name: name.clone(),
                        len,
                        unlimited,
                    });
                }
                [] => {}
                other => {
                    return Err(NetCdfError::InvalidFormat(format!(
                        "bad dimension declaration: {:?}",
                        other
                    )))
                }
            }
        }
        Ok(())
    }

    fn parse_variable_statement(&mut self, stmt: &[Token]) -> NetCdfResult<()> {
        // Attributes: `[type] [var]:name = values`
        if let Some(colon) = stmt.iter().position(|t| *t == Token::Punct(':')) {
            if colon <= 2 && stmt.get(colon + 2) == Some(&Token::Punct('=')) {
                let target = match &stmt[..colon] {
                    [] => None,
                    [Token::Word(ty)] if CDL_TYPES.contains(&ty.as_str()) => None,
                    [Token::Word(var)] => Some(var.clone()),
                    [Token::Word(ty), Token::Word(var)] if CDL_TYPES.contains(&ty.as_str()) => {
                        Some(var.clone())
                    }
                    other => {
                        return Err(NetCdfError::InvalidFormat(format!(
                            "bad attribute target: {:?}",
                            other
                        )))
                    }
                };
                let name = match &stmt[colon + 1] {
                    Token::Word(name) => name.clone(),
                    other => {
                        return Err(NetCdfError::InvalidFormat(format!(
                            "bad attribute name: {:?}",
                            other
                        )))
                    }
                };
                let value = parse_values(&stmt[colon + 3..])?;
                return self.set_attribute(target, name, value);
            }
        }

        // Declarations: `type name(dim, ...), name2(dim) `
        let (dtype, rest) = match stmt {
            [Token::Word(ty), rest @ ..] if CDL_TYPES.contains(&ty.as_str()) => (ty.clone(), rest),
            other => {
                return Err(NetCdfError::InvalidFormat(format!(
                    "bad variable statement: {:?}",
                    other
                )))
            }
        };

        let mut idx = 0;
        while idx < rest.len() {
            let name = match &rest[idx] {
                Token::Word(name) => name.clone(),
                Token::Punct(',') => {
                    idx += 1;
                    continue;
                }
                other => {
                    return Err(NetCdfError::InvalidFormat(format!(
                        "bad variable name: {:?}",
                        other
                    )))
                }
            };
            idx += 1;

            let mut dimensions = Vec::new();
            if rest.get(idx) == Some(&Token::Punct('(')) {
                idx += 1;
                loop {
                    match rest.get(idx) {
                        Some(Token::Word(dim)) => dimensions.push(dim.clone()),
                        Some(Token::Punct(',')) => {}
                        Some(Token::Punct(')')) => {
                            idx += 1;
                            break;
                        }
                        other => {
                            return Err(NetCdfError::InvalidFormat(format!(
                                "unterminated dimension list for {}: {:?}",
                                name, other
                            )))
                        }
                    }
                    idx += 1;
                }
            }

            self.variables.push(VariableInfo {
                name,
                dtype: dtype.clone(),
                dimensions,
                attributes: BTreeMap::new(),
            });
        }
        Ok(())
    }

    fn set_attribute(
        &mut self,
        target: Option<String>,
        name: String,
        value: AttrValue,
    ) -> NetCdfResult<()> {
        match target {
            None => {
                self.global_attributes.insert(name, value);
            }
            Some(var) => {
                let variable = self
                    .variables
                    .iter_mut()
                    .find(|v| v.name == var)
                    .ok_or_else(|| {
                        NetCdfError::InvalidFormat(format!(
                            "attribute {} on undeclared variable {}",
                            name, var
                        ))
                    })?;
                variable.attributes.insert(name, value);
            }
        }
        Ok(())
    }

    fn parse_data(&mut self, stmt: &[Token]) -> NetCdfResult<()> {
        match stmt {
            [Token::Word(name), Token::Punct('='), values @ ..] => {
                if let AttrValue::Numbers(numbers) = parse_values(values)? {
                    self.data.insert(name.clone(), numbers);
                }
                Ok(())
            }
            other => Err(NetCdfError::InvalidFormat(format!(
                "bad data statement: {:?}",
                other
            ))),
        }
    }
}

fn parse_values(tokens: &[Token]) -> NetCdfResult<AttrValue> {
    let mut text: Option<String> = None;
    let mut numbers = Vec::new();
    for token in tokens {
        match token {
            Token::Str(s) => text.get_or_insert_with(String::new).push_str(s),
            Token::Word(w) => numbers.push(parse_number(w)?),
            Token::Punct(',') => {}
            other => {
                return Err(NetCdfError::InvalidFormat(format!(
                    "unexpected token in value list: {:?}",
                    other
                )))
            }
        }
    }
    Ok(match text {
        Some(text) => AttrValue::Text(text),
        None => AttrValue::Numbers(numbers),
    })
}

fn parse_number(word: &str) -> NetCdfResult<f64> {
    let lower = word.to_ascii_lowercase();
    let lower = lower.trim_start_matches('+');
    match lower {
        "_" | "nan" | "nanf" => return Ok(f64::NAN),
        "infinity" | "infinityf" | "inf" => return Ok(f64::INFINITY),
        "-infinity" | "-infinityf" | "-inf" => return Ok(f64::NEG_INFINITY),
        _ => {}
    }
    // Type suffixes: 1.5f, 2s, 3b, 4LL, 5UB, ...
    let trimmed = lower.trim_end_matches(['f', 'b', 's', 'l', 'u']);
    trimmed
        .parse()
        .map_err(|_| NetCdfError::InvalidFormat(format!("bad numeric value '{}'", word)))
}

fn tokenize(text: &str) -> NetCdfResult<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line_start = true;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line_start = true;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '"' => {
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(NetCdfError::InvalidFormat("unterminated string".into()))
                        }
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some('n') => s.push('\n'),
                                Some('t') => s.push('\t'),
                                Some(other) => s.push(*other),
                                None => {}
                            }
                            i += 2;
                        }
                        Some(other) => {
                            s.push(*other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
                line_start = false;
            }
            '=' | ',' | ';' | '(' | ')' | '{' | '}' | ':' => {
                tokens.push(Token::Punct(c));
                line_start = false;
                i += 1;
            }
            _ => {
                let start = i;
                while i < chars.len() && !is_delimiter(chars[i]) {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                let word: String = chars[start..i.min(chars.len())]
                    .iter()
                    .filter(|c| **c != '\\')
                    .collect();
                if line_start && chars.get(i) == Some(&':') && rest_of_line_blank(&chars, i + 1) {
                    tokens.push(Token::Section(word));
                    i += 1;
                } else {
                    tokens.push(Token::Word(word));
                }
                line_start = false;
            }
        }
    }
    Ok(tokens)
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '=' | ',' | ';' | '(' | ')' | '{' | '}' | ':' | '"')
}

fn rest_of_line_blank(chars: &[char], from: usize) -> bool {
    let mut i = from;
    while i < chars.len() && chars[i] != '\n' {
        if chars[i] == '/' && chars.get(i + 1) == Some(&'/') {
            return true;
        }
        if !chars[i].is_whitespace() {
            return false;
        }
        i += 1;
    }
    true
}

/// A dataset backed by a parsed CDL document.
#[derive(Debug, Clone)]
pub struct CdlDataset {
    path: PathBuf,
    doc: CdlDocument,
}

impl CdlDataset {
    pub fn new(path: impl Into<PathBuf>, doc: CdlDocument) -> Self {
        Self {
            path: path.into(),
            doc,
        }
    }

    pub fn document(&self) -> &CdlDocument {
        &self.doc
    }
}

impl Dataset for CdlDataset {
    fn path(&self) -> &Path {
        &self.path
    }

    fn dimensions(&self) -> &[Dimension] {
        &self.doc.dimensions
    }

    fn variables(&self) -> &[VariableInfo] {
        &self.doc.variables
    }

    fn global_attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.doc.global_attributes
    }

    fn read_values(&self, variable: &str) -> NetCdfResult<Vec<f64>> {
        self.doc
            .data
            .get(variable)
            .cloned()
            .ok_or_else(|| NetCdfError::MissingData(format!("data for variable {}", variable)))
    }

    /// Unlimited dimensions report the length of the first variable data
    /// found along them.
    fn dimension_len(&self, name: &str) -> Option<usize> {
        let dim = self.doc.dimensions.iter().find(|d| d.name == name)?;
        if !dim.unlimited {
            return Some(dim.len);
        }
        let along = self
            .doc
            .variables
            .iter()
            .find(|v| v.dimensions.first().map(String::as_str) == Some(name))?;
        let values = self.doc.data.get(&along.name)?;
        let inner: usize = along.dimensions[1..]
            .iter()
            .map(|d| self.dimension_len(d).unwrap_or(1))
            .product();
        Some(values.len() / inner.max(1))
    }
}

/// Opens `.cdl` text files.
#[derive(Debug, Clone, Copy, Default)]
pub struct CdlOpener;

impl DatasetOpener for CdlOpener {
    fn open(&self, path: &Path) -> NetCdfResult<Box<dyn Dataset>> {
        let text = fs::read_to_string(path)?;
        let doc = CdlDocument::parse(&text)?;
        Ok(Box::new(CdlDataset::new(path, doc)))
    }
}
