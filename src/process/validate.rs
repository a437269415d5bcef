use serde::Serialize;
use std::fmt;

use crate::process::columns::{ColumnKind, REQUIRED_COLUMNS};
use crate::process::date_parser::parse_date_cell;
use crate::process::parse::RawRow;
use crate::process::utils::{is_blank, parse_number};

/// Closed set of reasons a row can be turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    MissingColumn,
    WrongType,
    EmptyRequiredField,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingColumn => "missing-column",
            RejectReason::WrongType => "wrong-type",
            RejectReason::EmptyRequiredField => "empty-required-field",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub reason: RejectReason,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRow {
    pub row: RawRow,
    pub verdict: Verdict,
}

impl ValidatedRow {
    pub fn is_accepted(&self) -> bool {
        matches!(self.verdict, Verdict::Accepted)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match &self.verdict {
            Verdict::Accepted => None,
            Verdict::Rejected(r) => Some(r),
        }
    }
}

/// Judge a single row against the column contract.
///
/// Checks run in a fixed order and stop at the first failing one: column
/// presence, then type coercibility, then non-blank key fields.
pub fn validate(row: RawRow) -> ValidatedRow {
    let verdict = match check(&row) {
        Ok(()) => Verdict::Accepted,
        Err(rejection) => Verdict::Rejected(rejection),
    };
    ValidatedRow { row, verdict }
}

fn check(row: &RawRow) -> Result<(), Rejection> {
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !row.contains(c.name))
        .map(|c| c.name)
        .collect();
    if !missing.is_empty() {
        return Err(Rejection {
            reason: RejectReason::MissingColumn,
            detail: format!("missing {}", missing.join(", ")),
        });
    }

    for column in REQUIRED_COLUMNS {
        let value = row.get(column.name).unwrap_or_default();
        let bad = match column.kind {
            ColumnKind::Text => false,
            ColumnKind::Number => parse_number(value).is_invalid(),
            ColumnKind::Date => parse_date_cell(value).is_invalid(),
        };
        if bad {
            let expected = match column.kind {
                ColumnKind::Number => "a number",
                _ => "a date",
            };
            return Err(Rejection {
                reason: RejectReason::WrongType,
                detail: format!("`{}` is not {expected}: {value:?}", column.name),
            });
        }
    }

    let empty: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| c.key && is_blank(row.get(c.name).unwrap_or_default()))
        .map(|c| c.name)
        .collect();
    if !empty.is_empty() {
        return Err(Rejection {
            reason: RejectReason::EmptyRequiredField,
            detail: format!("empty {}", empty.join(", ")),
        });
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::process::columns::*;
    use std::collections::HashMap;

    /// A row that satisfies the whole contract.
    pub(crate) fn good_row() -> RawRow {
        let fields: HashMap<String, String> = [
            (POST_DATE, "10/18/2026"),
            (EFFECTIVE_DATE, "10/17/2026"),
            (LOC, "500123"),
            (LOC_ZN, "WEST"),
            (LOC_NAME, "TW/EL PASO BLANCO"),
            (LOC_PURP_DESC, "Delivery Location"),
            (LOC_QTI, "DPQ"),
            (FLOW_IND, "D"),
            (DC, "1,200,000"),
            (OPC, "1100000"),
            (TSQ, "850000"),
            (OAC, "250000"),
            (IT, "N"),
            (AUTH_OVERRUN_IND, "N"),
            (NOM_CAP_EXCEED_IND, "N"),
            (ALL_QTY_AVAIL, "Y"),
            (QTY_REASON, ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        RawRow::new(2, fields)
    }

    fn reason(row: RawRow) -> Option<RejectReason> {
        validate(row).rejection().map(|r| r.reason)
    }

    #[test]
    fn well_formed_row_is_accepted() {
        assert!(validate(good_row()).is_accepted());
    }

    #[test]
    fn blank_numbers_are_fine() {
        let mut row = good_row();
        row.stamp(OAC, "N/A");
        row.stamp(DC, "");
        assert!(validate(row).is_accepted());
    }

    #[test]
    fn missing_column_is_reported_first() {
        let mut fields: HashMap<String, String> = HashMap::new();
        fields.insert(LOC.to_string(), "".to_string());
        fields.insert(OAC.to_string(), "abc".to_string());
        let v = validate(RawRow::new(3, fields));
        let rejection = v.rejection().unwrap();
        assert_eq!(rejection.reason, RejectReason::MissingColumn);
        assert!(rejection.detail.contains(QTY_REASON));
        let named: Vec<&str> = rejection
            .detail
            .trim_start_matches("missing ")
            .split(", ")
            .collect();
        assert!(!named.contains(&LOC));
        assert!(!named.contains(&OAC));
    }

    #[test]
    fn wrong_type_beats_empty_key() {
        let mut row = good_row();
        row.stamp(TSQ, "lots");
        row.stamp(LOC, "");
        assert_eq!(reason(row), Some(RejectReason::WrongType));

        let mut row = good_row();
        row.stamp(EFFECTIVE_DATE, "31/12/2026");
        assert_eq!(reason(row), Some(RejectReason::WrongType));
    }

    #[test]
    fn each_key_field_must_be_present() {
        for key in [EFFECTIVE_DATE, LOC, LOC_QTI] {
            let mut row = good_row();
            row.stamp(key, " ");
            assert_eq!(
                reason(row),
                Some(RejectReason::EmptyRequiredField),
                "{key}"
            );
        }
    }

    #[test]
    fn non_key_text_may_be_blank() {
        let mut row = good_row();
        row.stamp(LOC_NAME, "");
        row.stamp(POST_DATE, "");
        assert!(validate(row).is_accepted());
    }

    #[test]
    fn reasons_serialize_kebab_case() {
        let json = serde_json::to_string(&RejectReason::EmptyRequiredField).unwrap();
        assert_eq!(json, "\"empty-required-field\"");
    }
}
