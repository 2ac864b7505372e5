//! XLSForm workbook emission.
//!
//! Writes exactly three tabs, in order: `survey` (`type`, `name`, `label`),
//! `choices` (`list_name`, `name`, `label`), `settings` (`form_title`,
//! `form_id`). Sheet names and headers are fixed; downstream form tools
//! match on them literally. Every cell is written as a string — XLSForm
//! consumers treat choice codes as opaque text.

use std::path::Path;

use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};

use crate::error::ConvertError;
use crate::form::{ChoiceRow, Settings, SurveyRow};

const SURVEY_HEADERS: [&str; 3] = ["type", "name", "label"];
const CHOICES_HEADERS: [&str; 3] = ["list_name", "name", "label"];
const SETTINGS_HEADERS: [&str; 2] = ["form_title", "form_id"];

/// Write the three-sheet workbook to `path`.
///
/// On failure a partially written file may be left behind; callers treat
/// the output as invalid whenever an error is returned.
pub fn write_xlsform(
    path: &Path,
    survey: &[SurveyRow],
    choices: &[ChoiceRow],
    settings: &Settings,
) -> Result<(), ConvertError> {
    write_workbook(path, survey, choices, settings).map_err(|source| ConvertError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn write_workbook(
    path: &Path,
    survey: &[SurveyRow],
    choices: &[ChoiceRow],
    settings: &Settings,
) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name("survey")?;
    write_headers(sheet, &SURVEY_HEADERS)?;
    for (idx, row) in survey.iter().enumerate() {
        let row_num = (idx + 1) as u32;
        sheet.write_string(row_num, 0, row.question_type.to_string())?;
        sheet.write_string(row_num, 1, &row.name)?;
        sheet.write_string(row_num, 2, &row.label)?;
    }

    let sheet = workbook.add_worksheet();
    sheet.set_name("choices")?;
    write_headers(sheet, &CHOICES_HEADERS)?;
    for (idx, row) in choices.iter().enumerate() {
        let row_num = (idx + 1) as u32;
        sheet.write_string(row_num, 0, &row.list_name)?;
        sheet.write_string(row_num, 1, &row.name)?;
        sheet.write_string(row_num, 2, &row.label)?;
    }

    let sheet = workbook.add_worksheet();
    sheet.set_name("settings")?;
    write_headers(sheet, &SETTINGS_HEADERS)?;
    sheet.write_string(1, 0, &settings.form_title)?;
    sheet.write_string(1, 1, &settings.form_id)?;

    workbook.save(path)
}

fn write_headers(sheet: &mut Worksheet, headers: &[&str]) -> Result<(), XlsxError> {
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header)?;
    }
    Ok(())
}
