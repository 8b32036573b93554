use std::fs;
use std::path::Path;

use chrono::Local;
use csv::{ReaderBuilder, StringRecord};
use sea_orm::prelude::DateTime;
use tracing::{debug, info};

use crate::coords::TmConverter;
use crate::encoding::{decode_with_fallback, SourceEncoding};
use crate::error::{ImportError, Result};
use crate::record::FuneralHomeRecord;

/// Header names of the 동물장묘업 open-data export.
pub mod columns {
    pub const NAME: &str = "사업장명";
    pub const ROAD_ADDRESS: &str = "도로명주소";
    pub const LOT_ADDRESS: &str = "지번주소";
    pub const PHONE: &str = "전화번호";
    pub const LOC_CODE: &str = "개방자치단체코드";
    pub const STATUS: &str = "영업상태명";
    pub const X: &str = "좌표정보(X)";
    pub const Y: &str = "좌표정보(Y)";
}

/// Business status value of a facility that is currently operating.
const ACTIVE_STATUS: &str = "영업/정상";

pub struct ParsedCsv {
    pub records: Vec<FuneralHomeRecord>,
    pub encoding: SourceEncoding,
}

/// Reads and normalizes the whole file. Rows without a business name are dropped.
pub fn parse_csv(path: &Path, converter: &TmConverter) -> Result<ParsedCsv> {
    let bytes = fs::read(path)?;
    let (content, encoding) = decode_with_fallback(&bytes).ok_or(ImportError::UnknownEncoding)?;
    info!(path = %path.display(), %encoding, "decoded csv");

    let records = parse_records(&content, converter, Local::now().naive_local())?;

    println!("CSV 파싱 완료: {}건 (인코딩: {})", records.len(), encoding);

    Ok(ParsedCsv { records, encoding })
}

pub fn parse_records(
    content: &str,
    converter: &TmConverter,
    synced_at: DateTime,
) -> Result<Vec<FuneralHomeRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let layout = ColumnLayout::new(reader.headers()?);

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for row in reader.records() {
        let row = row?;

        match layout.to_record(&row, converter, synced_at) {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }

    debug!(parsed = records.len(), skipped, "csv rows processed");

    Ok(records)
}

/// Positions of the columns we read. A column missing from the header reads as
/// empty on every row.
struct ColumnLayout {
    name: Option<usize>,
    road_address: Option<usize>,
    lot_address: Option<usize>,
    phone: Option<usize>,
    loc_code: Option<usize>,
    status: Option<usize>,
    x: Option<usize>,
    y: Option<usize>,
}

impl ColumnLayout {
    fn new(headers: &StringRecord) -> ColumnLayout {
        // duplicated headers resolve to the right-most column
        let find = |name: &str| {
            let idx = headers
                .iter()
                .enumerate()
                .filter(|(_, header)| *header == name)
                .map(|(i, _)| i)
                .last();
            if idx.is_none() {
                debug!(column = name, "column missing from header");
            }
            idx
        };

        ColumnLayout {
            name: find(columns::NAME),
            road_address: find(columns::ROAD_ADDRESS),
            lot_address: find(columns::LOT_ADDRESS),
            phone: find(columns::PHONE),
            loc_code: find(columns::LOC_CODE),
            status: find(columns::STATUS),
            x: find(columns::X),
            y: find(columns::Y),
        }
    }

    fn to_record(
        &self,
        row: &StringRecord,
        converter: &TmConverter,
        synced_at: DateTime,
    ) -> Option<FuneralHomeRecord> {
        let field = |idx: Option<usize>| idx.and_then(|i| row.get(i)).unwrap_or("");

        let name = field(self.name).trim();
        if name.is_empty() {
            return None;
        }

        let road_address = non_empty(field(self.road_address));
        let lot_address = non_empty(field(self.lot_address));
        let loc_name = region_name(road_address.as_deref(), lot_address.as_deref());

        Some(FuneralHomeRecord {
            name: name.to_string(),
            phone: normalize_phone(field(self.phone)),
            loc_code: non_empty(field(self.loc_code)),
            loc_name,
            road_address,
            lot_address,
            has_crematorium: false,
            has_columbarium: false,
            has_funeral: true,
            location: converter.convert(field(self.x), field(self.y)),
            is_active: field(self.status) == ACTIVE_STATUS,
            synced_at,
        })
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();

    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// The dataset drops the leading zero of area codes, e.g. `212345678`.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let phone = raw.trim();

    if phone.is_empty() {
        None
    } else if phone.starts_with('0') {
        Some(phone.to_string())
    } else {
        Some(format!("0{phone}"))
    }
}

/// First token of the road address, falling back to the lot address.
/// For Korean addresses this is the province or metropolitan city.
pub fn region_name(road_address: Option<&str>, lot_address: Option<&str>) -> Option<String> {
    road_address
        .or(lot_address)
        .and_then(|address| address.split_whitespace().next())
        .map(str::to_string)
}
