//! Conversion entry points: load a dataset, hold it for inspection, emit the
//! XLSForm workbook.

use std::path::{Path, PathBuf};

use log::info;

use crate::dataset::Dataset;
use crate::encoding::resolve_encoding;
use crate::error::{ConvertError, Result};
use crate::form::{self, ChoiceRow, Settings, SurveyRow, VariableInfo};
use crate::format::{self, FileKind};
use crate::{spss, stata, workbook};

/// Optional knobs for a conversion. All default to "derive it".
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub form_id: Option<String>,
    pub form_title: Option<String>,
    pub kind: Option<FileKind>,
    pub encoding: Option<String>,
}

impl ConvertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_form_id(mut self, form_id: impl Into<String>) -> Self {
        self.form_id = Some(form_id.into());
        self
    }

    pub fn with_form_title(mut self, form_title: impl Into<String>) -> Self {
        self.form_title = Some(form_title.into());
        self
    }

    /// Force the file kind instead of sniffing the extension.
    pub fn with_kind(mut self, kind: FileKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Force a text encoding instead of the automatic fallback.
    pub fn with_encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = Some(label.into());
        self
    }
}

/// A loaded dataset ready for sheet generation and inspection.
#[derive(Debug)]
pub struct Converter {
    source: PathBuf,
    kind: FileKind,
    dataset: Dataset,
    options: ConvertOptions,
}

impl Converter {
    /// Load `input`. Fails with `NotFound` before the file is opened and with
    /// `UnrecognizedFormat` before any parsing when the kind is undecidable.
    pub fn open(input: &Path, options: ConvertOptions) -> Result<Self> {
        if !input.exists() {
            return Err(ConvertError::NotFound {
                path: input.to_path_buf(),
            });
        }
        let kind = match options.kind {
            Some(kind) => kind,
            None => format::detect_kind(input)?,
        };
        let wrap_parse = |source| ConvertError::Parse {
            kind,
            path: input.to_path_buf(),
            source,
        };
        let encoding = match options.encoding.as_deref() {
            Some(label) => Some(resolve_encoding(label).map_err(wrap_parse)?),
            None => None,
        };
        let dataset = match kind {
            FileKind::Stata => stata::read_dta(input, encoding),
            FileKind::Spss => spss::read_sav(input, encoding),
        }
        .map_err(wrap_parse)?;
        info!(
            "loaded {kind} dataset '{}': {} variable(s), {} row(s)",
            input.display(),
            dataset.columns.len(),
            dataset.row_count()
        );
        Ok(Self {
            source: input.to_path_buf(),
            kind,
            dataset,
            options,
        })
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn survey_rows(&self) -> Vec<SurveyRow> {
        form::survey_rows(&self.dataset)
    }

    pub fn choice_rows(&self) -> Vec<ChoiceRow> {
        form::choice_rows(&self.dataset)
    }

    pub fn settings(&self) -> Settings {
        form::settings(
            &self.source,
            self.options.form_id.as_deref(),
            self.options.form_title.as_deref(),
        )
    }

    pub fn variable_info(&self) -> Vec<VariableInfo> {
        form::variable_info(&self.dataset)
    }

    /// Generate all three sheets and write the workbook to `output`.
    ///
    /// If writing fails partway, a partial file may remain at `output`.
    pub fn write_xlsform(&self, output: &Path) -> Result<()> {
        workbook::write_xlsform(
            output,
            &self.survey_rows(),
            &self.choice_rows(),
            &self.settings(),
        )
    }
}

/// One-shot conversion. Returns the [`Converter`] for further inspection.
pub fn convert(input: &Path, output: &Path, options: ConvertOptions) -> Result<Converter> {
    let converter = Converter::open(input, options)?;
    converter.write_xlsform(output)?;
    Ok(converter)
}

/// Convert a Stata `.dta` file, ignoring the extension.
pub fn stata_to_xlsform(input: &Path, output: &Path) -> Result<Converter> {
    convert(input, output, ConvertOptions::new().with_kind(FileKind::Stata))
}

/// Convert an SPSS `.sav` file, ignoring the extension.
pub fn spss_to_xlsform(input: &Path, output: &Path) -> Result<Converter> {
    convert(input, output, ConvertOptions::new().with_kind(FileKind::Spss))
}
