use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

use crate::error::TransformError;
use crate::process::columns::*;
use crate::process::date_parser::parse_date_cell;
use crate::process::parse::RawRow;
use crate::process::utils::{clean_str, is_blank, non_blank, parse_number, Cell};
use crate::process::validate::ValidatedRow;

/// Identity of a capacity posting: one location, one quantity type, one gas day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NaturalKey {
    pub report_date: NaiveDate,
    pub location_id: String,
    pub capacity_type: String,
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.report_date, self.location_id, self.capacity_type
        )
    }
}

/// A row of `operational_capacity`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityRecord {
    pub report_date: NaiveDate,
    pub location_id: String,
    pub capacity_type: String,
    /// Operationally available capacity.
    pub measurement: Option<f64>,
    pub unit: String,
    pub post_date: Option<NaiveDate>,
    pub zone: Option<String>,
    pub location_name: Option<String>,
    pub location_purpose: Option<String>,
    pub flow_indicator: Option<String>,
    pub design_capacity: Option<f64>,
    pub operating_capacity: Option<f64>,
    pub scheduled_quantity: Option<f64>,
    pub interruptible: Option<String>,
    pub auth_overrun_ind: Option<String>,
    pub nom_cap_exceed_ind: Option<String>,
    pub all_qty_avail: Option<String>,
    pub qty_reason: Option<String>,
}

impl CapacityRecord {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            report_date: self.report_date,
            location_id: self.location_id.clone(),
            capacity_type: self.capacity_type.clone(),
        }
    }
}

/// Map an accepted row onto the destination schema.
pub fn transform(validated: &ValidatedRow) -> Result<CapacityRecord, TransformError> {
    let row = &validated.row;
    if !validated.is_accepted() {
        return Err(TransformError::NotAccepted { line: row.line });
    }

    let report_date = date(row, EFFECTIVE_DATE)?.ok_or(TransformError::MissingField {
        line: row.line,
        column: EFFECTIVE_DATE,
    })?;

    Ok(CapacityRecord {
        report_date,
        location_id: key_text(row, LOC)?,
        capacity_type: key_text(row, LOC_QTI)?,
        measurement: number(row, OAC)?,
        unit: MEASUREMENT_UNIT.to_string(),
        post_date: date(row, POST_DATE)?,
        zone: non_blank(row.get(LOC_ZN)),
        location_name: non_blank(row.get(LOC_NAME)),
        location_purpose: non_blank(row.get(LOC_PURP_DESC)),
        flow_indicator: non_blank(row.get(FLOW_IND)),
        design_capacity: number(row, DC)?,
        operating_capacity: number(row, OPC)?,
        scheduled_quantity: number(row, TSQ)?,
        interruptible: non_blank(row.get(IT)),
        auth_overrun_ind: non_blank(row.get(AUTH_OVERRUN_IND)),
        nom_cap_exceed_ind: non_blank(row.get(NOM_CAP_EXCEED_IND)),
        all_qty_avail: non_blank(row.get(ALL_QTY_AVAIL)),
        qty_reason: non_blank(row.get(QTY_REASON)),
    })
}

fn field<'a>(row: &'a RawRow, column: &'static str) -> Result<&'a str, TransformError> {
    row.get(column).ok_or(TransformError::MissingField {
        line: row.line,
        column,
    })
}

fn key_text(row: &RawRow, column: &'static str) -> Result<String, TransformError> {
    let raw = field(row, column)?;
    if is_blank(raw) {
        return Err(TransformError::MissingField {
            line: row.line,
            column,
        });
    }
    Ok(clean_str(raw).to_string())
}

fn number(row: &RawRow, column: &'static str) -> Result<Option<f64>, TransformError> {
    let raw = field(row, column)?;
    settle(row, column, raw, parse_number(raw))
}

fn date(row: &RawRow, column: &'static str) -> Result<Option<NaiveDate>, TransformError> {
    let raw = field(row, column)?;
    settle(row, column, raw, parse_date_cell(raw))
}

fn settle<T>(
    row: &RawRow,
    column: &'static str,
    raw: &str,
    cell: Cell<T>,
) -> Result<Option<T>, TransformError> {
    match cell {
        Cell::Blank => Ok(None),
        Cell::Value(v) => Ok(Some(v)),
        Cell::Invalid => Err(TransformError::BadValue {
            line: row.line,
            column,
            value: raw.to_string(),
        }),
    }
}
