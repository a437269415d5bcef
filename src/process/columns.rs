//! Column contract of the operationally-available capacity posting.
//!
//! Names are matched exactly (after trimming) against the CSV header. When the
//! operator changes the posting layout this table is what gets versioned.

pub const POST_DATE: &str = "Post Date";
pub const EFFECTIVE_DATE: &str = "Effective Date";
pub const LOC: &str = "Loc";
pub const LOC_ZN: &str = "Loc Zn";
pub const LOC_NAME: &str = "Loc Name";
pub const LOC_PURP_DESC: &str = "Loc Purp Desc";
pub const LOC_QTI: &str = "Loc/QTI";
pub const FLOW_IND: &str = "Flow Ind";
pub const DC: &str = "DC";
pub const OPC: &str = "OPC";
pub const TSQ: &str = "TSQ";
pub const OAC: &str = "OAC";
pub const IT: &str = "IT";
pub const AUTH_OVERRUN_IND: &str = "Auth Overrun Ind";
pub const NOM_CAP_EXCEED_IND: &str = "Nom Cap Exceed Ind";
pub const ALL_QTY_AVAIL: &str = "All Qty Avail";
pub const QTY_REASON: &str = "Qty Reason";

/// Unit of every quantity column on the posting.
pub const MEASUREMENT_UNIT: &str = "Dth";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Number,
    Date,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Part of the natural key; must be non-blank.
    pub key: bool,
}

const fn col(name: &'static str, kind: ColumnKind, key: bool) -> Column {
    Column { name, kind, key }
}

pub static REQUIRED_COLUMNS: &[Column] = &[
    col(POST_DATE, ColumnKind::Date, false),
    col(EFFECTIVE_DATE, ColumnKind::Date, true),
    col(LOC, ColumnKind::Text, true),
    col(LOC_ZN, ColumnKind::Text, false),
    col(LOC_NAME, ColumnKind::Text, false),
    col(LOC_PURP_DESC, ColumnKind::Text, false),
    col(LOC_QTI, ColumnKind::Text, true),
    col(FLOW_IND, ColumnKind::Text, false),
    col(DC, ColumnKind::Number, false),
    col(OPC, ColumnKind::Number, false),
    col(TSQ, ColumnKind::Number, false),
    col(OAC, ColumnKind::Number, false),
    col(IT, ColumnKind::Text, false),
    col(AUTH_OVERRUN_IND, ColumnKind::Text, false),
    col(NOM_CAP_EXCEED_IND, ColumnKind::Text, false),
    col(ALL_QTY_AVAIL, ColumnKind::Text, false),
    col(QTY_REASON, ColumnKind::Text, false),
];

/// Columns the operator publishes itself; the two dates are stamped on by the pipeline.
pub fn published_columns() -> impl Iterator<Item = &'static str> {
    REQUIRED_COLUMNS
        .iter()
        .map(|c| c.name)
        .filter(|n| *n != POST_DATE && *n != EFFECTIVE_DATE)
}
