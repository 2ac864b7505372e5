#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("write fixture file");
        path
    }
}

// ---------------------------------------------------------------------------
// Stata .dta fixture builder (releases 117/118, little-endian)
// ---------------------------------------------------------------------------

const DTA_TYPE_STRL: u16 = 32768;
const DTA_TYPE_DOUBLE: u16 = 65526;
const DTA_TYPE_FLOAT: u16 = 65527;
const DTA_TYPE_LONG: u16 = 65528;
const DTA_TYPE_INT: u16 = 65529;
const DTA_TYPE_BYTE: u16 = 65530;

enum DtaCell {
    I8(i8),
    I16(i16),
    I32(i32),
    F32(f32),
    F64(f64),
    Str(String),
    Strl(String),
}

struct DtaVar {
    name: String,
    var_type: u16,
    label: Vec<u8>,
    value_label: String,
    cells: Vec<DtaCell>,
}

struct DtaLabelTable {
    name: String,
    entries: Vec<(i32, Vec<u8>)>,
}

/// Builds minimal but structurally faithful `.dta` bytes.
pub struct DtaBuilder {
    release: u16,
    vars: Vec<DtaVar>,
    label_tables: Vec<DtaLabelTable>,
}

impl DtaBuilder {
    pub fn new() -> Self {
        Self {
            release: 118,
            vars: Vec::new(),
            label_tables: Vec::new(),
        }
    }

    pub fn release(mut self, release: u16) -> Self {
        self.release = release;
        self
    }

    pub fn byte_var(self, name: &str, values: &[i8]) -> Self {
        self.push_var(
            name,
            DTA_TYPE_BYTE,
            values.iter().map(|&v| DtaCell::I8(v)).collect(),
        )
    }

    pub fn int_var(self, name: &str, values: &[i16]) -> Self {
        self.push_var(
            name,
            DTA_TYPE_INT,
            values.iter().map(|&v| DtaCell::I16(v)).collect(),
        )
    }

    pub fn long_var(self, name: &str, values: &[i32]) -> Self {
        self.push_var(
            name,
            DTA_TYPE_LONG,
            values.iter().map(|&v| DtaCell::I32(v)).collect(),
        )
    }

    pub fn float_var(self, name: &str, values: &[f32]) -> Self {
        self.push_var(
            name,
            DTA_TYPE_FLOAT,
            values.iter().map(|&v| DtaCell::F32(v)).collect(),
        )
    }

    pub fn double_var(self, name: &str, values: &[f64]) -> Self {
        self.push_var(
            name,
            DTA_TYPE_DOUBLE,
            values.iter().map(|&v| DtaCell::F64(v)).collect(),
        )
    }

    pub fn str_var(self, name: &str, width: u16, values: &[&str]) -> Self {
        assert!((1..=2045).contains(&width));
        self.push_var(
            name,
            width,
            values.iter().map(|v| DtaCell::Str((*v).to_string())).collect(),
        )
    }

    pub fn strl_var(self, name: &str, values: &[&str]) -> Self {
        self.push_var(
            name,
            DTA_TYPE_STRL,
            values
                .iter()
                .map(|v| DtaCell::Strl((*v).to_string()))
                .collect(),
        )
    }

    fn push_var(mut self, name: &str, var_type: u16, cells: Vec<DtaCell>) -> Self {
        self.vars.push(DtaVar {
            name: name.to_string(),
            var_type,
            label: Vec::new(),
            value_label: String::new(),
            cells,
        });
        self
    }

    pub fn var_label(self, name: &str, label: &str) -> Self {
        self.raw_var_label(name, label.as_bytes())
    }

    /// Raw label bytes, for planting non-UTF-8 text.
    pub fn raw_var_label(mut self, name: &str, label: &[u8]) -> Self {
        let var = self
            .vars
            .iter_mut()
            .find(|v| v.name == name)
            .expect("variable exists");
        var.label = label.to_vec();
        self
    }

    pub fn value_labels(self, name: &str, table: &str, entries: &[(i32, &str)]) -> Self {
        let raw: Vec<(i32, Vec<u8>)> = entries
            .iter()
            .map(|(code, label)| (*code, label.as_bytes().to_vec()))
            .collect();
        self.raw_value_labels(name, table, raw)
    }

    pub fn raw_value_labels(mut self, name: &str, table: &str, entries: Vec<(i32, Vec<u8>)>) -> Self {
        let var = self
            .vars
            .iter_mut()
            .find(|v| v.name == name)
            .expect("variable exists");
        var.value_label = table.to_string();
        self.label_tables.push(DtaLabelTable {
            name: table.to_string(),
            entries,
        });
        self
    }

    /// Attach a value-label table name to a variable without emitting the
    /// table itself.
    pub fn dangling_value_label(mut self, name: &str, table: &str) -> Self {
        let var = self
            .vars
            .iter_mut()
            .find(|v| v.name == name)
            .expect("variable exists");
        var.value_label = table.to_string();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let release = self.release;
        let (name_width, format_width, label_width) = match release {
            117 => (33usize, 49usize, 81usize),
            _ => (129, 57, 321),
        };
        let var_count = self.vars.len();
        let row_count = self.vars.first().map_or(0, |v| v.cells.len());
        for var in &self.vars {
            assert_eq!(var.cells.len(), row_count, "uneven column lengths");
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"<stata_dta><header><release>");
        out.extend_from_slice(release.to_string().as_bytes());
        out.extend_from_slice(b"</release><byteorder>LSF</byteorder><K>");
        out.extend_from_slice(&(var_count as u16).to_le_bytes());
        out.extend_from_slice(b"</K><N>");
        if release == 117 {
            out.extend_from_slice(&(row_count as u32).to_le_bytes());
        } else {
            out.extend_from_slice(&(row_count as u64).to_le_bytes());
        }
        out.extend_from_slice(b"</N><label>");
        if release == 117 {
            out.push(0);
        } else {
            out.extend_from_slice(&0u16.to_le_bytes());
        }
        out.extend_from_slice(b"</label><timestamp>");
        out.push(0);
        out.extend_from_slice(b"</timestamp></header><map>");
        out.extend_from_slice(&[0u8; 14 * 8]);
        out.extend_from_slice(b"</map><variable_types>");
        for var in &self.vars {
            out.extend_from_slice(&var.var_type.to_le_bytes());
        }
        out.extend_from_slice(b"</variable_types><varnames>");
        for var in &self.vars {
            push_nul_padded(&mut out, var.name.as_bytes(), name_width);
        }
        out.extend_from_slice(b"</varnames><sortlist>");
        out.resize(out.len() + 2 * (var_count + 1), 0);
        out.extend_from_slice(b"</sortlist><formats>");
        out.resize(out.len() + var_count * format_width, 0);
        out.extend_from_slice(b"</formats><value_label_names>");
        for var in &self.vars {
            push_nul_padded(&mut out, var.value_label.as_bytes(), name_width);
        }
        out.extend_from_slice(b"</value_label_names><variable_labels>");
        for var in &self.vars {
            push_nul_padded(&mut out, &var.label, label_width);
        }
        out.extend_from_slice(b"</variable_labels><characteristics></characteristics><data>");

        let mut strls: Vec<(u32, u64, Vec<u8>)> = Vec::new();
        for row in 0..row_count {
            for (var_index, var) in self.vars.iter().enumerate() {
                match &var.cells[row] {
                    DtaCell::I8(v) => out.push(*v as u8),
                    DtaCell::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
                    DtaCell::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
                    DtaCell::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
                    DtaCell::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
                    DtaCell::Str(s) => {
                        push_nul_padded(&mut out, s.as_bytes(), var.var_type as usize);
                    }
                    DtaCell::Strl(s) => {
                        let v = (var_index + 1) as u32;
                        let o = (row + 1) as u64;
                        strls.push((v, o, s.as_bytes().to_vec()));
                        if release == 117 {
                            out.extend_from_slice(&v.to_le_bytes());
                            out.extend_from_slice(&(o as u32).to_le_bytes());
                        } else {
                            out.extend_from_slice(&(v as u16).to_le_bytes());
                            out.extend_from_slice(&o.to_le_bytes()[..6]);
                        }
                    }
                }
            }
        }
        out.extend_from_slice(b"</data><strls>");
        for (v, o, payload) in &strls {
            out.extend_from_slice(b"GSO");
            out.extend_from_slice(&v.to_le_bytes());
            if release == 117 {
                out.extend_from_slice(&(*o as u32).to_le_bytes());
            } else {
                out.extend_from_slice(&o.to_le_bytes());
            }
            out.push(130); // NUL-terminated text payload
            out.extend_from_slice(&((payload.len() + 1) as u32).to_le_bytes());
            out.extend_from_slice(payload);
            out.push(0);
        }
        out.extend_from_slice(b"</strls><value_labels>");
        for table in &self.label_tables {
            out.extend_from_slice(b"<lbl>");
            let mut text = Vec::new();
            let mut offsets = Vec::with_capacity(table.entries.len());
            for (_, label) in &table.entries {
                offsets.push(text.len() as u32);
                text.extend_from_slice(label);
                text.push(0);
            }
            let table_len = 8 + 8 * table.entries.len() + text.len();
            out.extend_from_slice(&(table_len as i32).to_le_bytes());
            push_nul_padded(&mut out, table.name.as_bytes(), name_width);
            out.extend_from_slice(&[0u8; 3]);
            out.extend_from_slice(&(table.entries.len() as u32).to_le_bytes());
            out.extend_from_slice(&(text.len() as u32).to_le_bytes());
            for offset in &offsets {
                out.extend_from_slice(&offset.to_le_bytes());
            }
            for (code, _) in &table.entries {
                out.extend_from_slice(&code.to_le_bytes());
            }
            out.extend_from_slice(&text);
            out.extend_from_slice(b"</lbl>");
        }
        out.extend_from_slice(b"</value_labels></stata_dta>");
        out
    }

    pub fn write(&self, workspace: &TestWorkspace, name: &str) -> PathBuf {
        workspace.write(name, &self.build())
    }
}

// ---------------------------------------------------------------------------
// SPSS .sav fixture builder (little-endian)
// ---------------------------------------------------------------------------

const SYSMIS: f64 = f64::MIN;
const COMPRESSION_BIAS: f64 = 100.0;

#[derive(Clone)]
enum SavCell {
    Num(f64),
    Sysmiss,
    Str(String),
}

struct SavVar {
    short_name: String,
    /// 0 = numeric, >0 = string byte width.
    width: i32,
    decimals: u8,
    format_type: u8,
    label: Option<Vec<u8>>,
    values: Vec<SavCell>,
}

impl SavVar {
    fn slots(&self) -> usize {
        if self.width > 0 {
            (self.width as usize).div_ceil(8)
        } else {
            1
        }
    }
}

/// Builds minimal but structurally faithful `.sav` bytes.
pub struct SavBuilder {
    compressed: bool,
    vars: Vec<SavVar>,
    value_labels: Vec<(String, Vec<([u8; 8], Vec<u8>)>)>,
    long_names: Vec<(String, String)>,
    declared_encoding: Option<String>,
}

impl SavBuilder {
    pub fn new() -> Self {
        Self {
            compressed: false,
            vars: Vec::new(),
            value_labels: Vec::new(),
            long_names: Vec::new(),
            declared_encoding: None,
        }
    }

    pub fn compressed(mut self) -> Self {
        self.compressed = true;
        self
    }

    pub fn declared_encoding(mut self, label: &str) -> Self {
        self.declared_encoding = Some(label.to_string());
        self
    }

    /// Numeric variable with an `F8.<decimals>` print format. `None` cells
    /// are system-missing.
    pub fn numeric_var(mut self, name: &str, decimals: u8, values: &[Option<f64>]) -> Self {
        self.vars.push(SavVar {
            short_name: name.to_string(),
            width: 0,
            decimals,
            format_type: 5,
            label: None,
            values: values
                .iter()
                .map(|v| match v {
                    Some(n) => SavCell::Num(*n),
                    None => SavCell::Sysmiss,
                })
                .collect(),
        });
        self
    }

    pub fn string_var(mut self, name: &str, width: i32, values: &[&str]) -> Self {
        assert!(width > 0 && width <= 255);
        self.vars.push(SavVar {
            short_name: name.to_string(),
            width,
            decimals: 0,
            format_type: 1,
            label: None,
            values: values.iter().map(|v| SavCell::Str((*v).to_string())).collect(),
        });
        self
    }

    pub fn var_label(self, name: &str, label: &str) -> Self {
        self.raw_var_label(name, label.as_bytes())
    }

    pub fn raw_var_label(mut self, name: &str, label: &[u8]) -> Self {
        let var = self
            .vars
            .iter_mut()
            .find(|v| v.short_name == name)
            .expect("variable exists");
        var.label = Some(label.to_vec());
        self
    }

    pub fn value_labels(mut self, name: &str, entries: &[(f64, &str)]) -> Self {
        let raw: Vec<([u8; 8], Vec<u8>)> = entries
            .iter()
            .map(|(code, label)| (code.to_le_bytes(), label.as_bytes().to_vec()))
            .collect();
        self.value_labels.push((name.to_string(), raw));
        self
    }

    pub fn long_name(mut self, short: &str, long: &str) -> Self {
        self.long_names.push((short.to_string(), long.to_string()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let case_count = self.vars.first().map_or(0, |v| v.values.len());
        for var in &self.vars {
            assert_eq!(var.values.len(), case_count, "uneven column lengths");
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"$FL2");
        push_space_padded(&mut out, b"@(#) IBM SPSS STATISTICS DATA FILE", 60);
        out.extend_from_slice(&2i32.to_le_bytes()); // layout code
        let total_slots: usize = self.vars.iter().map(SavVar::slots).sum();
        out.extend_from_slice(&(total_slots as i32).to_le_bytes());
        out.extend_from_slice(&(i32::from(self.compressed)).to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes()); // weight index
        out.extend_from_slice(&(case_count as i32).to_le_bytes());
        out.extend_from_slice(&COMPRESSION_BIAS.to_le_bytes());
        out.extend_from_slice(b"01 Jan 25");
        out.extend_from_slice(b"00:00:00");
        push_space_padded(&mut out, b"", 64);
        out.extend_from_slice(&[0u8; 3]);

        // dictionary: variable records, continuations for wide strings
        let mut first_slot: HashMap<&str, usize> = HashMap::new();
        let mut slot = 1usize; // dictionary indexes are 1-based
        for var in &self.vars {
            first_slot.insert(var.short_name.as_str(), slot);
            out.extend_from_slice(&2i32.to_le_bytes());
            out.extend_from_slice(&var.width.to_le_bytes());
            out.extend_from_slice(&i32::from(var.label.is_some()).to_le_bytes());
            out.extend_from_slice(&0i32.to_le_bytes()); // no missing declarations
            let format_width: u32 = if var.width > 0 { var.width as u32 } else { 8 };
            let format = (u32::from(var.format_type) << 16)
                | (format_width << 8)
                | u32::from(var.decimals);
            out.extend_from_slice(&format.to_le_bytes());
            out.extend_from_slice(&format.to_le_bytes());
            push_space_padded(&mut out, var.short_name.as_bytes(), 8);
            if let Some(label) = &var.label {
                out.extend_from_slice(&(label.len() as u32).to_le_bytes());
                let padded = label.len().div_ceil(4) * 4;
                let mut bytes = label.clone();
                bytes.resize(padded, b' ');
                out.extend_from_slice(&bytes);
            }
            slot += 1;
            for _ in 1..var.slots() {
                out.extend_from_slice(&2i32.to_le_bytes());
                out.extend_from_slice(&(-1i32).to_le_bytes());
                out.extend_from_slice(&0i32.to_le_bytes());
                out.extend_from_slice(&0i32.to_le_bytes());
                out.extend_from_slice(&0u32.to_le_bytes());
                out.extend_from_slice(&0u32.to_le_bytes());
                push_space_padded(&mut out, b"", 8);
                slot += 1;
            }
        }

        for (var_name, entries) in &self.value_labels {
            out.extend_from_slice(&3i32.to_le_bytes());
            out.extend_from_slice(&(entries.len() as i32).to_le_bytes());
            for (value, label) in entries {
                out.extend_from_slice(value);
                out.push(label.len() as u8);
                let padded = (label.len() + 1).div_ceil(8) * 8 - 1;
                out.extend_from_slice(label);
                out.resize(out.len() + padded - label.len(), b' ');
            }
            out.extend_from_slice(&4i32.to_le_bytes());
            out.extend_from_slice(&1i32.to_le_bytes());
            let index = first_slot[var_name.as_str()];
            out.extend_from_slice(&(index as i32).to_le_bytes());
        }

        if !self.long_names.is_empty() {
            let payload = self
                .long_names
                .iter()
                .map(|(short, long)| format!("{short}={long}"))
                .collect::<Vec<_>>()
                .join("\t");
            push_extension_record(&mut out, 13, payload.as_bytes());
        }
        if let Some(encoding) = &self.declared_encoding {
            push_extension_record(&mut out, 20, encoding.as_bytes());
        }

        out.extend_from_slice(&999i32.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());

        if self.compressed {
            self.write_compressed_cases(&mut out, case_count);
        } else {
            self.write_plain_cases(&mut out, case_count);
        }
        out
    }

    fn write_plain_cases(&self, out: &mut Vec<u8>, case_count: usize) {
        for case in 0..case_count {
            for var in &self.vars {
                match &var.values[case] {
                    SavCell::Num(v) => out.extend_from_slice(&v.to_le_bytes()),
                    SavCell::Sysmiss => out.extend_from_slice(&SYSMIS.to_le_bytes()),
                    SavCell::Str(s) => {
                        push_space_padded(out, s.as_bytes(), var.slots() * 8);
                    }
                }
            }
        }
    }

    fn write_compressed_cases(&self, out: &mut Vec<u8>, case_count: usize) {
        let mut encoder = OpcodeEncoder::default();
        for case in 0..case_count {
            for var in &self.vars {
                match &var.values[case] {
                    SavCell::Num(v) => {
                        let biased = v + COMPRESSION_BIAS;
                        if v.fract() == 0.0 && biased >= 1.0 && biased <= 251.0 {
                            encoder.push(biased as u8, None);
                        } else {
                            encoder.push(253, Some(v.to_le_bytes()));
                        }
                    }
                    SavCell::Sysmiss => encoder.push(255, None),
                    SavCell::Str(s) => {
                        let mut bytes = s.as_bytes().to_vec();
                        bytes.resize(var.slots() * 8, b' ');
                        for chunk in bytes.chunks(8) {
                            if chunk == b"        " {
                                encoder.push(254, None);
                            } else {
                                let mut literal = [0u8; 8];
                                literal.copy_from_slice(chunk);
                                encoder.push(253, Some(literal));
                            }
                        }
                    }
                }
            }
        }
        encoder.finish(out);
    }

    pub fn write(&self, workspace: &TestWorkspace, name: &str) -> PathBuf {
        workspace.write(name, &self.build())
    }
}

/// Bytecode stream writer: opcodes in blocks of eight, each block followed
/// by its literal values in opcode order.
#[derive(Default)]
struct OpcodeEncoder {
    out: Vec<u8>,
    opcodes: Vec<u8>,
    literals: Vec<u8>,
}

impl OpcodeEncoder {
    fn push(&mut self, opcode: u8, literal: Option<[u8; 8]>) {
        self.opcodes.push(opcode);
        if let Some(bytes) = literal {
            self.literals.extend_from_slice(&bytes);
        }
        if self.opcodes.len() == 8 {
            self.flush_block();
        }
    }

    fn flush_block(&mut self) {
        self.out.extend_from_slice(&self.opcodes);
        self.out.extend_from_slice(&self.literals);
        self.opcodes.clear();
        self.literals.clear();
    }

    fn finish(mut self, out: &mut Vec<u8>) {
        self.push(252, None);
        if !self.opcodes.is_empty() {
            self.opcodes.resize(8, 0);
            self.flush_block();
        }
        out.extend_from_slice(&self.out);
    }
}

fn push_nul_padded(out: &mut Vec<u8>, bytes: &[u8], width: usize) {
    assert!(bytes.len() <= width, "field wider than {width} bytes");
    out.extend_from_slice(bytes);
    out.resize(out.len() + width - bytes.len(), 0);
}

fn push_space_padded(out: &mut Vec<u8>, bytes: &[u8], width: usize) {
    assert!(bytes.len() <= width, "field wider than {width} bytes");
    out.extend_from_slice(bytes);
    out.resize(out.len() + width - bytes.len(), b' ');
}

fn push_extension_record(out: &mut Vec<u8>, subtype: i32, payload: &[u8]) {
    out.extend_from_slice(&7i32.to_le_bytes());
    out.extend_from_slice(&subtype.to_le_bytes());
    out.extend_from_slice(&1i32.to_le_bytes());
    out.extend_from_slice(&(payload.len() as i32).to_le_bytes());
    out.extend_from_slice(payload);
}
