//! SPSS `.sav` reader.
//!
//! A `.sav` file is a 176-byte header followed by a stream of dictionary
//! records (variables, value labels, documents, extensions), a terminator
//! record, and case data that is either plain 8-byte slots or
//! bytecode-compressed against a bias constant. Both endiannesses are
//! handled by probing the header's layout code. Like the Stata reader, the
//! structure is parsed once with text kept as raw bytes, and all text is
//! decoded afterwards: explicit override first, then the file's declared
//! encoding (extension subtype 20), then the fallback candidates.
//!
//! Out of scope: zlib-compressed `.zsav`, reassembly of very-long-string
//! segments (width > 255), and user-defined missing-value semantics (the
//! declarations are parsed past; only system-missing becomes `Missing`).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use encoding_rs::Encoding;
use log::debug;

use crate::cursor::Cursor;
use crate::dataset::{CellValue, Column, ColumnKind, Dataset, LabelCode, ValueLabelMap};
use crate::encoding::{ENCODING_CANDIDATES, decode_bytes};
use crate::error::ParseError;

/// SPSS system-missing: -DBL_MAX.
const SYSMIS: f64 = f64::MIN;

/// Read a `.sav` file into a [`Dataset`].
pub fn read_sav(path: &Path, encoding: Option<&'static Encoding>) -> Result<Dataset, ParseError> {
    let buffer = fs::read(path)?;
    let raw = RawSav::parse(&buffer)?;

    let mut candidates: Vec<&'static Encoding> = Vec::new();
    match encoding {
        Some(enc) => candidates.push(enc),
        None => {
            if let Some(declared) = raw
                .declared_encoding
                .as_deref()
                .and_then(|label| Encoding::for_label(label.as_bytes()))
            {
                candidates.push(declared);
            }
            for &enc in ENCODING_CANDIDATES {
                if !candidates.contains(&enc) {
                    candidates.push(enc);
                }
            }
        }
    }

    let mut last_error = ParseError::malformed("no encoding candidates");
    for enc in candidates {
        match raw.decode(enc) {
            Ok(dataset) => {
                debug!(
                    "parsed sav: {} variable(s), {} case(s), encoding {}",
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

#[derive(Debug, Clone)]
enum RawValue {
    Number(f64),
    Sysmiss,
    Bytes(Vec<u8>),
}

struct RawVar {
    short_name: Vec<u8>,
    /// 0 = numeric, >0 = string byte width.
    width: i32,
    label: Option<Vec<u8>>,
    decimals: u8,
    format_type: u8,
    values: Vec<RawValue>,
}

struct RawLabelSet {
    var_indexes: Vec<usize>,
    entries: Vec<([u8; 8], Vec<u8>)>,
}

struct RawSav {
    little_endian: bool,
    vars: Vec<RawVar>,
    label_sets: Vec<RawLabelSet>,
    long_names: Option<Vec<u8>>,
    declared_encoding: Option<String>,
}

impl RawSav {
    fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        if buffer.starts_with(b"$FL3") {
            // zsav: zlib-compressed case data
            return Err(ParseError::UnsupportedCompression { code: 2 });
        }
        if !buffer.starts_with(b"$FL2") {
            return Err(ParseError::BadMagic {
                expected: "SPSS .sav",
            });
        }

        let mut cursor = Cursor::new(buffer);
        cursor.take(4)?; // magic
        cursor.take(60)?; // product string

        // The layout code is always 2 or 3; reading it with the wrong byte
        // order yields a huge value, which is how endianness is detected.
        let layout = cursor.take(4)?;
        let layout_le = u32::from_le_bytes([layout[0], layout[1], layout[2], layout[3]]);
        let layout_be = u32::from_be_bytes([layout[0], layout[1], layout[2], layout[3]]);
        cursor.little_endian = match (layout_le, layout_be) {
            (2 | 3, _) => true,
            (_, 2 | 3) => false,
            _ => return Err(ParseError::malformed("unrecognized layout code")),
        };

        let _nominal_case_size = cursor.i32()?;
        let compression = cursor.i32()?;
        match compression {
            0 | 1 => {}
            other => return Err(ParseError::UnsupportedCompression { code: other }),
        }
        let _weight_index = cursor.i32()?;
        let declared_cases = cursor.i32()?;
        let bias = cursor.f64()?;
        cursor.take(9 + 8 + 64 + 3)?; // creation date/time, file label, padding

        let mut vars: Vec<RawVar> = Vec::new();
        let mut slot_to_var: Vec<Option<usize>> = Vec::new();
        let mut label_sets = Vec::new();
        let mut long_names = None;
        let mut declared_encoding = None;

        loop {
            let record_type = cursor.i32()?;
            match record_type {
                2 => {
                    let width = cursor.i32()?;
                    let has_label = cursor.i32()?;
                    let missing_count = cursor.i32()?;
                    let print_format = cursor.u32()?;
                    let _write_format = cursor.u32()?;
                    let short_name = trim_spaces(cursor.take(8)?).to_vec();
                    let label = if has_label != 0 {
                        let len = cursor.u32()? as usize;
                        let padded = len.div_ceil(4) * 4;
                        let raw = cursor.take(padded)?;
                        Some(raw[..len].to_vec())
                    } else {
                        None
                    };
                    if missing_count != 0 {
                        let count = missing_count.unsigned_abs() as usize;
                        cursor.take(8 * count)?;
                    }
                    if width == -1 {
                        // continuation slot of a string variable
                        slot_to_var.push(slot_to_var.last().copied().flatten());
                    } else {
                        vars.push(RawVar {
                            short_name,
                            width,
                            label,
                            decimals: (print_format & 0xff) as u8,
                            format_type: ((print_format >> 16) & 0xff) as u8,
                            values: Vec::new(),
                        });
                        slot_to_var.push(Some(vars.len() - 1));
                    }
                }
                3 => {
                    let count = cursor.i32()? as usize;
                    let mut entries = Vec::with_capacity(count);
                    for _ in 0..count {
                        let mut value = [0u8; 8];
                        value.copy_from_slice(cursor.take(8)?);
                        let len = cursor.u8()? as usize;
                        // label plus its length byte are padded to 8 bytes
                        let padded = (len + 1).div_ceil(8) * 8 - 1;
                        let raw = cursor.take(padded)?;
                        entries.push((value, raw[..len].to_vec()));
                    }
                    if cursor.i32()? != 4 {
                        return Err(ParseError::malformed(
                            "value-label record not followed by a variable-index record",
                        ));
                    }
                    let index_count = cursor.i32()? as usize;
                    let mut var_indexes = Vec::with_capacity(index_count);
                    for _ in 0..index_count {
                        let slot = cursor.i32()?;
                        let slot_index = usize::try_from(slot.saturating_sub(1))
                            .map_err(|_| ParseError::malformed("negative dictionary index"))?;
                        if let Some(Some(var_index)) = slot_to_var.get(slot_index) {
                            var_indexes.push(*var_index);
                        }
                    }
                    label_sets.push(RawLabelSet {
                        var_indexes,
                        entries,
                    });
                }
                6 => {
                    let lines = cursor.i32()? as usize;
                    cursor.take(80 * lines)?;
                }
                7 => {
                    let subtype = cursor.i32()?;
                    let size = cursor.i32()? as usize;
                    let count = cursor.i32()? as usize;
                    let total = size
                        .checked_mul(count)
                        .ok_or_else(|| ParseError::malformed("oversized extension record"))?;
                    let payload = cursor.take(total)?;
                    match subtype {
                        13 => long_names = Some(payload.to_vec()),
                        20 => {
                            declared_encoding =
                                Some(String::from_utf8_lossy(payload).trim().to_string());
                        }
                        _ => {}
                    }
                }
                999 => {
                    cursor.i32()?; // filler
                    break;
                }
                other => {
                    return Err(ParseError::malformed(format!(
                        "unexpected dictionary record type {other}"
                    )));
                }
            }
        }

        read_cases(
            &mut cursor,
            &mut vars,
            compression == 1,
            bias,
            declared_cases,
        )?;

        Ok(RawSav {
            little_endian: cursor.little_endian,
            vars,
            label_sets,
            long_names,
            declared_encoding,
        })
    }

    fn decode(&self, enc: &'static Encoding) -> Result<Dataset, ParseError> {
        let mut names: Vec<String> = self
            .vars
            .iter()
            .map(|var| decode_bytes(&var.short_name, enc))
            .collect::<Result<_, _>>()?;

        if let Some(payload) = &self.long_names {
            let text = decode_bytes(payload, enc)?;
            let mut mapping = HashMap::new();
            for pair in text.split('\t') {
                if let Some((short, long)) = pair.split_once('=') {
                    mapping.insert(short.trim().to_string(), long.trim().to_string());
                }
            }
            for name in &mut names {
                if let Some(long) = mapping.get(name.as_str()) {
                    *name = long.clone();
                }
            }
        }

        let mut columns = Vec::with_capacity(self.vars.len());
        for (index, var) in self.vars.iter().enumerate() {
            let column = if var.width > 0 {
                let values = var
                    .values
                    .iter()
                    .map(|value| match value {
                        RawValue::Bytes(raw) => Ok(CellValue::Text(decode_bytes(raw, enc)?)),
                        RawValue::Number(_) | RawValue::Sysmiss => Ok(CellValue::Missing),
                    })
                    .collect::<Result<Vec<_>, ParseError>>()?;
                Column::with_values(names[index].clone(), ColumnKind::Text, values)
            } else {
                let integral = var.decimals == 0
                    && !is_datetime_format(var.format_type)
                    && var.values.iter().all(|value| match value {
                        RawValue::Number(v) => v.fract() == 0.0 && v.abs() < 9.0e15,
                        _ => true,
                    });
                let kind = if integral {
                    ColumnKind::Integer
                } else {
                    ColumnKind::Float
                };
                let values = var
                    .values
                    .iter()
                    .map(|value| match value {
                        RawValue::Number(v) if integral => CellValue::Int(*v as i64),
                        RawValue::Number(v) => CellValue::Float(*v),
                        RawValue::Sysmiss | RawValue::Bytes(_) => CellValue::Missing,
                    })
                    .collect();
                Column::with_values(names[index].clone(), kind, values)
            };
            columns.push(column);
        }

        let mut dataset = Dataset {
            columns,
            ..Dataset::default()
        };

        for (index, var) in self.vars.iter().enumerate() {
            if let Some(raw) = &var.label {
                let label = decode_bytes(raw, enc)?;
                if !label.is_empty() {
                    dataset.variable_labels.insert(names[index].clone(), label);
                }
            }
        }

        for (index, var) in self.vars.iter().enumerate() {
            let mut mapping = ValueLabelMap::new();
            for set in &self.label_sets {
                if !set.var_indexes.contains(&index) {
                    continue;
                }
                for (raw_value, raw_label) in &set.entries {
                    let code = if var.width > 0 {
                        LabelCode::Text(decode_bytes(trim_spaces(raw_value), enc)?)
                    } else {
                        let bits = if self.little_endian {
                            f64::from_le_bytes(*raw_value)
                        } else {
                            f64::from_be_bytes(*raw_value)
                        };
                        LabelCode::from_f64(bits)
                    };
                    mapping.insert(code, decode_bytes(raw_label, enc)?);
                }
            }
            if !mapping.is_empty() {
                dataset.value_labels.insert(names[index].clone(), mapping);
            }
        }

        Ok(dataset)
    }
}

fn read_cases(
    cursor: &mut Cursor<'_>,
    vars: &mut [RawVar],
    compressed: bool,
    bias: f64,
    declared_cases: i32,
) -> Result<(), ParseError> {
    let mut reader = CaseReader {
        cursor,
        compressed,
        bias,
        opcodes: [0u8; 8],
        next_opcode: 8,
    };

    let mut cases_read: usize = 0;
    'cases: loop {
        if declared_cases >= 0 && cases_read >= declared_cases as usize {
            break;
        }
        let mut first_slot = true;
        for index in 0..vars.len() {
            let width = vars[index].width;
            if width == 0 {
                match reader.next_numeric()? {
                    Some(value) => vars[index].values.push(value),
                    None if first_slot && declared_cases < 0 => break 'cases,
                    None => {
                        return Err(ParseError::Truncated {
                            offset: reader.cursor.pos,
                        });
                    }
                }
                first_slot = false;
            } else {
                let slots = (width as usize).div_ceil(8);
                let mut bytes = Vec::with_capacity(slots * 8);
                for slot in 0..slots {
                    match reader.next_string_chunk()? {
                        Some(chunk) => bytes.extend_from_slice(&chunk),
                        None if first_slot && slot == 0 && declared_cases < 0 => break 'cases,
                        None => {
                            return Err(ParseError::Truncated {
                                offset: reader.cursor.pos,
                            });
                        }
                    }
                    first_slot = false;
                }
                bytes.truncate(width as usize);
                vars[index]
                    .values
                    .push(RawValue::Bytes(trim_spaces(&bytes).to_vec()));
            }
        }
        cases_read += 1;
    }
    Ok(())
}

struct CaseReader<'a, 'b> {
    cursor: &'b mut Cursor<'a>,
    compressed: bool,
    bias: f64,
    opcodes: [u8; 8],
    next_opcode: usize,
}

impl CaseReader<'_, '_> {
    /// Next meaningful opcode, skipping padding; `None` at end of data.
    fn take_opcode(&mut self) -> Result<Option<u8>, ParseError> {
        loop {
            if self.next_opcode == 8 {
                if self.cursor.remaining() == 0 {
                    return Ok(None);
                }
                self.opcodes.copy_from_slice(self.cursor.take(8)?);
                self.next_opcode = 0;
            }
            let code = self.opcodes[self.next_opcode];
            self.next_opcode += 1;
            match code {
                0 => continue,             // padding
                252 => return Ok(None),    // end of data
                other => return Ok(Some(other)),
            }
        }
    }

    fn next_numeric(&mut self) -> Result<Option<RawValue>, ParseError> {
        if !self.compressed {
            if self.cursor.remaining() < 8 {
                return Ok(None);
            }
            let value = self.cursor.f64()?;
            return Ok(Some(classify_numeric(value)));
        }
        match self.take_opcode()? {
            None => Ok(None),
            Some(253) => {
                let value = self.cursor.f64()?;
                Ok(Some(classify_numeric(value)))
            }
            Some(254) | Some(255) => Ok(Some(RawValue::Sysmiss)),
            Some(code) => Ok(Some(RawValue::Number(f64::from(code) - self.bias))),
        }
    }

    fn next_string_chunk(&mut self) -> Result<Option<[u8; 8]>, ParseError> {
        if !self.compressed {
            if self.cursor.remaining() < 8 {
                return Ok(None);
            }
            let mut chunk = [0u8; 8];
            chunk.copy_from_slice(self.cursor.take(8)?);
            return Ok(Some(chunk));
        }
        match self.take_opcode()? {
            None => Ok(None),
            Some(253) => {
                let mut chunk = [0u8; 8];
                chunk.copy_from_slice(self.cursor.take(8)?);
                Ok(Some(chunk))
            }
            Some(254) | Some(255) => Ok(Some(*b"        ")),
            Some(code) => Err(ParseError::malformed(format!(
                "unexpected compressed opcode {code} in string data"
            ))),
        }
    }
}

fn classify_numeric(value: f64) -> RawValue {
    if value == SYSMIS {
        RawValue::Sysmiss
    } else {
        RawValue::Number(value)
    }
}

/// SPSS date/time print formats; kept as floats rather than integers.
fn is_datetime_format(format_type: u8) -> bool {
    (20..=39).contains(&format_type)
}

fn trim_spaces(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != b' ' && b != 0)
        .map_or(0, |pos| pos + 1);
    &bytes[..end]
}
