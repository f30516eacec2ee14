//! Column names shared by the mapper, merge engine, resolver and sink.
//!
//! Canonical retailer frames use the ASCII names below. The integrated table
//! keeps the Korean headers the back office reads.

use crate::models::Retailer;

pub const DATE: &str = "date";
pub const ISBN: &str = "isbn";
pub const TITLE: &str = "title";
pub const AUTHOR: &str = "author";
pub const PUBLISHER: &str = "publisher";
pub const PUB_DATE: &str = "pub_date";
pub const GENRE: &str = "genre";
pub const PRICE: &str = "price";
pub const UPLOAD_DATE: &str = "upload_date";
pub const UPDATED_AT: &str = "updated_at";

pub const JOIN_KEYS: [&str; 2] = [DATE, ISBN];

pub mod header {
    pub const DATE: &str = "날짜";
    pub const WEEKDAY: &str = "요일";
    pub const ISBN: &str = "ISBN";
    pub const TITLE: &str = "도서명";
    pub const AUTHOR: &str = "저자";
    pub const PUB_DATE: &str = "발행일";
    pub const PUBLISHER: &str = "출판사";
    pub const GENRE: &str = "장르";
    pub const PRICE: &str = "정가";
    pub const GRAND_TOTAL: &str = "일계";
    pub const UPLOAD_DATE: &str = "업로드날짜";
    pub const YES24_UPDATED_AT: &str = "UpdatedAt_yes24";
    pub const GENERATED_AT: &str = "UpdatedAt";
    pub const QUERY_PERIOD: &str = "조회기간";
    pub const SOURCE_UPDATED_AT: &str = "UpdatedAt";
}

/// Quantity column as it appears in a canonical retailer frame and in the
/// integrated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityColumn {
    pub retailer: Retailer,
    pub column: &'static str,
    pub header: &'static str,
}

/// Per-retailer quantity breakdown and totals, in integrated-table order.
pub const QUANTITY_COLUMNS: [QuantityColumn; 7] = [
    QuantityColumn { retailer: Retailer::Kyobo, column: "kyobo_offline", header: "교보_오프" },
    QuantityColumn { retailer: Retailer::Kyobo, column: "kyobo_online", header: "교보_온" },
    QuantityColumn { retailer: Retailer::Kyobo, column: "kyobo_corporate", header: "교보_법인" },
    QuantityColumn { retailer: Retailer::Kyobo, column: "kyobo_total", header: "교보계" },
    QuantityColumn { retailer: Retailer::Yes24, column: "yes24_total", header: "YES24" },
    QuantityColumn { retailer: Retailer::Aladin, column: "aladin_total", header: "알라딘" },
    QuantityColumn { retailer: Retailer::Youngpoong, column: "youngpoong_total", header: "영풍" },
];

/// Fixed column order of the persisted integrated table.
pub const CANONICAL_COLUMNS: [&str; 20] = [
    header::DATE,
    header::WEEKDAY,
    header::ISBN,
    header::TITLE,
    header::AUTHOR,
    header::PUB_DATE,
    header::PUBLISHER,
    header::GENRE,
    header::PRICE,
    "교보_오프",
    "교보_온",
    "교보_법인",
    "교보계",
    "YES24",
    "알라딘",
    "영풍",
    header::GRAND_TOTAL,
    header::UPLOAD_DATE,
    header::YES24_UPDATED_AT,
    header::GENERATED_AT,
];

pub fn is_join_key(column: &str) -> bool {
    JOIN_KEYS.contains(&column)
}
