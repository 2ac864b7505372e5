//! Stata `.dta` reader for the XML-tagged releases 117 (Stata 13) and 118
//! (Stata 14 and later).
//!
//! The file is a sequence of literal ASCII tags (`<stata_dta><header>...`)
//! wrapping fixed-width binary payloads. The reader loads the whole file,
//! walks it once with a byte cursor collecting raw (undecoded) text fields,
//! then decodes all text in a second pass so the encoding-fallback loop
//! never has to re-parse the structure. Release 118 is nominally UTF-8, but
//! files converted from older releases often carry windows-1252 bytes in
//! labels, hence the fallback.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use encoding_rs::Encoding;
use log::debug;

use crate::cursor::Cursor;
use crate::dataset::{CellValue, Column, ColumnKind, Dataset, LabelCode, ValueLabelMap};
use crate::encoding::{ENCODING_CANDIDATES, decode_bytes, decode_padded};
use crate::error::ParseError;

// Variable type codes: 1..=2045 are fixed-width strings.
const TYPE_STRL: u16 = 32768;
const TYPE_DOUBLE: u16 = 65526;
const TYPE_FLOAT: u16 = 65527;
const TYPE_LONG: u16 = 65528;
const TYPE_INT: u16 = 65529;
const TYPE_BYTE: u16 = 65530;

// Largest non-missing value per integer storage type.
const BYTE_MAX: i8 = 100;
const INT_MAX: i16 = 32740;
const LONG_MAX: i32 = 2_147_483_620;

/// Read a `.dta` file into a [`Dataset`].
///
/// With no explicit `encoding`, text is decoded with the first candidate
/// encoding that decodes every text field without error; the last decode
/// error is surfaced if all candidates fail.
pub fn read_dta(path: &Path, encoding: Option<&'static Encoding>) -> Result<Dataset, ParseError> {
    let buffer = fs::read(path)?;
    let raw = RawDta::parse(&buffer)?;

    let candidates: Vec<&'static Encoding> = match encoding {
        Some(enc) => vec![enc],
        None => ENCODING_CANDIDATES.to_vec(),
    };

    let mut last_error = ParseError::malformed("no encoding candidates");
    for enc in candidates {
        match raw.decode(enc) {
            Ok(dataset) => {
                debug!(
                    "parsed release {} dta: {} variable(s), {} row(s), encoding {}",
                    raw.release,
                    dataset.columns.len(),
                    dataset.row_count(),
                    enc.name()
                );
                return Ok(dataset);
            }
            Err(err) => last_error = err,
        }
    }
    Err(last_error)
}

/// A numeric cell or an undecoded text cell.
#[derive(Debug, Clone)]
enum RawCell {
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Strl { v: u32, o: u64 },
    Missing,
}

struct RawLabelTable {
    name: Vec<u8>,
    entries: Vec<(i32, Vec<u8>)>,
}

struct RawDta {
    release: u16,
    var_types: Vec<u16>,
    names: Vec<Vec<u8>>,
    variable_labels: Vec<Vec<u8>>,
    value_label_names: Vec<Vec<u8>>,
    rows: Vec<Vec<RawCell>>,
    strls: HashMap<(u32, u64), Vec<u8>>,
    label_tables: Vec<RawLabelTable>,
}

impl RawDta {
    fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        if !buffer.starts_with(b"<stata_dta>") {
            return Err(ParseError::BadMagic {
                expected: "Stata .dta",
            });
        }

        let mut cursor = Cursor::new(buffer);
        cursor.expect(b"<stata_dta><header><release>")?;
        let release = parse_release(cursor.take(3)?)?;
        cursor.expect(b"</release><byteorder>")?;
        cursor.little_endian = match cursor.take(3)? {
            b"LSF" => true,
            b"MSF" => false,
            other => {
                return Err(ParseError::malformed(format!(
                    "unknown byte order {:?}",
                    String::from_utf8_lossy(other)
                )));
            }
        };
        cursor.expect(b"</byteorder><K>")?;
        let var_count = cursor.u16()? as usize;
        cursor.expect(b"</K><N>")?;
        let row_count = if release == 117 {
            cursor.u32()? as usize
        } else {
            cursor.u64()? as usize
        };
        cursor.expect(b"</N><label>")?;
        let label_len = if release == 117 {
            cursor.u8()? as usize
        } else {
            cursor.u16()? as usize
        };
        cursor.take(label_len)?;
        cursor.expect(b"</label><timestamp>")?;
        let timestamp_len = cursor.u8()? as usize;
        cursor.take(timestamp_len)?;
        cursor.expect(b"</timestamp></header><map>")?;
        cursor.take(14 * 8)?;
        cursor.expect(b"</map><variable_types>")?;
        let mut var_types = Vec::with_capacity(var_count);
        for _ in 0..var_count {
            var_types.push(cursor.u16()?);
        }
        cursor.expect(b"</variable_types><varnames>")?;
        let name_width = if release == 117 { 33 } else { 129 };
        let names = cursor.fixed_fields(var_count, name_width)?;
        cursor.expect(b"</varnames><sortlist>")?;
        cursor.take(2 * (var_count + 1))?;
        cursor.expect(b"</sortlist><formats>")?;
        let format_width = if release == 117 { 49 } else { 57 };
        cursor.take(var_count * format_width)?;
        cursor.expect(b"</formats><value_label_names>")?;
        let value_label_names = cursor.fixed_fields(var_count, name_width)?;
        cursor.expect(b"</value_label_names><variable_labels>")?;
        let label_width = if release == 117 { 81 } else { 321 };
        let variable_labels = cursor.fixed_fields(var_count, label_width)?;
        cursor.expect(b"</variable_labels><characteristics>")?;
        while !cursor.consume_if(b"</characteristics>") {
            cursor.expect(b"<ch>")?;
            let len = cursor.u32()? as usize;
            cursor.take(len)?;
            cursor.expect(b"</ch>")?;
        }

        cursor.expect(b"<data>")?;
        let mut rows = Vec::with_capacity(row_count);
        for _ in 0..row_count {
            let mut row = Vec::with_capacity(var_count);
            for &var_type in &var_types {
                row.push(read_cell(&mut cursor, var_type, release)?);
            }
            rows.push(row);
        }
        cursor.expect(b"</data>")?;

        cursor.expect(b"<strls>")?;
        let mut strls = HashMap::new();
        while !cursor.consume_if(b"</strls>") {
            cursor.expect(b"GSO")?;
            let v = cursor.u32()?;
            let o = if release == 117 {
                u64::from(cursor.u32()?)
            } else {
                cursor.u64()?
            };
            let text_type = cursor.u8()?;
            let len = cursor.u32()? as usize;
            let mut payload = cursor.take(len)?.to_vec();
            // Type 130 payloads are NUL-terminated; 129 is raw binary.
            if text_type == 130 && payload.last() == Some(&0) {
                payload.pop();
            }
            strls.insert((v, o), payload);
        }

        cursor.expect(b"<value_labels>")?;
        let mut label_tables = Vec::new();
        while !cursor.consume_if(b"</value_labels>") {
            cursor.expect(b"<lbl>")?;
            cursor.i32()?; // table length, redundant with the field sizes below
            let name = cursor.take(name_width)?.to_vec();
            cursor.take(3)?; // padding
            let entry_count = cursor.u32()? as usize;
            let text_len = cursor.u32()? as usize;
            let mut offsets = Vec::with_capacity(entry_count);
            for _ in 0..entry_count {
                offsets.push(cursor.u32()? as usize);
            }
            let mut codes = Vec::with_capacity(entry_count);
            for _ in 0..entry_count {
                codes.push(cursor.i32()?);
            }
            let text = cursor.take(text_len)?;
            let mut entries = Vec::with_capacity(entry_count);
            for (offset, code) in offsets.into_iter().zip(codes) {
                if offset > text.len() {
                    return Err(ParseError::malformed(format!(
                        "value label offset {offset} out of bounds"
                    )));
                }
                let rest = &text[offset..];
                let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
                entries.push((code, rest[..end].to_vec()));
            }
            label_tables.push(RawLabelTable { name, entries });
            cursor.expect(b"</lbl>")?;
        }

        cursor.expect(b"</stata_dta>")?;

        Ok(RawDta {
            release,
            var_types,
            names,
            variable_labels,
            value_label_names,
            rows,
            strls,
            label_tables,
        })
    }

    fn decode(&self, enc: &'static Encoding) -> Result<Dataset, ParseError> {
        let names: Vec<String> = self
            .names
            .iter()
            .map(|raw| decode_padded(raw, enc))
            .collect::<Result<_, _>>()?;

        let mut columns = Vec::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            let kind = column_kind(self.var_types[index]);
            let mut values = Vec::with_capacity(self.rows.len());
            for row in &self.rows {
                values.push(self.decode_cell(&row[index], enc)?);
            }
            columns.push(Column::with_values(name.clone(), kind, values));
        }

        let mut dataset = Dataset {
            columns,
            ..Dataset::default()
        };

        for (index, name) in names.iter().enumerate() {
            let label = decode_padded(&self.variable_labels[index], enc)?;
            if !label.is_empty() {
                dataset.variable_labels.insert(name.clone(), label);
            }
        }

        for (index, name) in names.iter().enumerate() {
            let wanted = trim_nul(&self.value_label_names[index]);
            if wanted.is_empty() {
                continue;
            }
            let Some(table) = self
                .label_tables
                .iter()
                .find(|table| trim_nul(&table.name) == wanted)
            else {
                continue;
            };
            let mut mapping = ValueLabelMap::new();
            for (code, raw_label) in &table.entries {
                mapping.insert(
                    LabelCode::Int(i64::from(*code)),
                    decode_bytes(raw_label, enc)?,
                );
            }
            if !mapping.is_empty() {
                dataset.value_labels.insert(name.clone(), mapping);
            }
        }

        Ok(dataset)
    }

    fn decode_cell(&self, cell: &RawCell, enc: &'static Encoding) -> Result<CellValue, ParseError> {
        Ok(match cell {
            RawCell::Int(i) => CellValue::Int(*i),
            RawCell::Float(f) => CellValue::Float(*f),
            RawCell::Missing => CellValue::Missing,
            RawCell::Bytes(raw) => CellValue::Text(decode_padded(raw, enc)?),
            RawCell::Strl { v: 0, o: 0 } => CellValue::Text(String::new()),
            RawCell::Strl { v, o } => match self.strls.get(&(*v, *o)) {
                Some(payload) => CellValue::Text(decode_bytes(payload, enc)?),
                None => CellValue::Text(String::new()),
            },
        })
    }
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

fn parse_release(bytes: &[u8]) -> Result<u16, ParseError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| ParseError::malformed("non-numeric release field"))?;
    let release: u16 = text
        .parse()
        .map_err(|_| ParseError::malformed("non-numeric release field"))?;
    match release {
        117 | 118 => Ok(release),
        other => Err(ParseError::UnsupportedRelease {
            release: u32::from(other),
        }),
    }
}

fn column_kind(var_type: u16) -> ColumnKind {
    match var_type {
        TYPE_BYTE | TYPE_INT | TYPE_LONG => ColumnKind::Integer,
        TYPE_FLOAT | TYPE_DOUBLE => ColumnKind::Float,
        _ => ColumnKind::Text,
    }
}

fn read_cell(cursor: &mut Cursor<'_>, var_type: u16, release: u16) -> Result<RawCell, ParseError> {
    Ok(match var_type {
        width @ 1..=2045 => RawCell::Bytes(cursor.take(width as usize)?.to_vec()),
        TYPE_STRL => {
            let reference = cursor.take(8)?;
            let (v, o) = split_strl_ref(reference, release, cursor.little_endian);
            RawCell::Strl { v, o }
        }
        TYPE_DOUBLE => {
            let value = cursor.f64()?;
            if double_is_missing(value) {
                RawCell::Missing
            } else {
                RawCell::Float(value)
            }
        }
        TYPE_FLOAT => {
            let value = cursor.f32()?;
            if float_is_missing(value) {
                RawCell::Missing
            } else {
                RawCell::Float(f64::from(value))
            }
        }
        TYPE_LONG => {
            let value = cursor.i32()?;
            if value > LONG_MAX {
                RawCell::Missing
            } else {
                RawCell::Int(i64::from(value))
            }
        }
        TYPE_INT => {
            let value = cursor.i16()?;
            if value > INT_MAX {
                RawCell::Missing
            } else {
                RawCell::Int(i64::from(value))
            }
        }
        TYPE_BYTE => {
            let value = cursor.i8()?;
            if value > BYTE_MAX {
                RawCell::Missing
            } else {
                RawCell::Int(i64::from(value))
            }
        }
        other => {
            return Err(ParseError::malformed(format!(
                "unknown variable type code {other}"
            )));
        }
    })
}

// Release 117 packs a strL reference as v:u32 o:u32; 118 as v:u16 o:u48.
fn split_strl_ref(bytes: &[u8], release: u16, little_endian: bool) -> (u32, u64) {
    if release == 117 {
        let (v, o) = if little_endian {
            (
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            )
        } else {
            (
                u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            )
        };
        (v, u64::from(o))
    } else if little_endian {
        let v = u32::from(u16::from_le_bytes([bytes[0], bytes[1]]));
        let mut o = 0u64;
        for (shift, &byte) in bytes[2..8].iter().enumerate() {
            o |= u64::from(byte) << (8 * shift);
        }
        (v, o)
    } else {
        let v = u32::from(u16::from_be_bytes([bytes[0], bytes[1]]));
        let mut o = 0u64;
        for &byte in &bytes[2..8] {
            o = (o << 8) | u64::from(byte);
        }
        (v, o)
    }
}

// Missing numerics occupy the top of the positive range: for doubles
// everything from +0x7fe0... up, for floats from +0x7f00... up.
fn double_is_missing(value: f64) -> bool {
    let bits = value.to_bits();
    bits >= 0x7fe0_0000_0000_0000 && bits < 0x8000_0000_0000_0000
}

fn float_is_missing(value: f32) -> bool {
    let bits = value.to_bits();
    bits >= 0x7f00_0000 && bits < 0x8000_0000
}
