/// 임포터: 로트 CSV 일괄 등록과 이미지 파일명 → 로트 매칭.
/// CSV는 행 하나라도 오류가 있으면 배치 전체를 거부한다 (로트 미삽입).
/// 이미지 매칭은 행별 결과(matched/unmatched/conflict)를 남긴다.
// region:    --- Imports
use crate::auction::model::AuctionId;
use crate::bidding::model::{LotStatus, NewLot};
use crate::bidding::rules;
use crate::clock::SharedClock;
use crate::error::StoreError;
use crate::importer::model::{
    BatchKind, BatchStatus, ImageMapping, ImportBatch, MappingStatus, NewImageMapping,
    NewImportBatch, RowError,
};
use crate::store::SharedStore;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

// endregion: --- Imports

pub mod model;

// region:    --- Results

/// CSV 임포트 결과: 배치 + (성공 시) 삽입된 로트 수
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvImportResult {
    pub batch: ImportBatch,
    pub inserted_lots: i64,
}

/// 이미지 매칭 결과: 배치 + 파일별 매핑
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMatchResult {
    pub batch: ImportBatch,
    pub mappings: Vec<ImageMapping>,
}

/// 업로드된 이미지 한 건
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedImage {
    pub filename: String,
    pub stored_url: String,
}

// endregion: --- Results

// region:    --- Importer

pub struct Importer {
    store: SharedStore,
    clock: SharedClock,
}

impl Importer {
    pub fn new(store: SharedStore, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// 로트 CSV 임포트. 오류가 하나라도 있으면 배치 상태 rejected로 기록하고
    /// 아무 로트도 삽입하지 않는다.
    pub async fn import_lots_csv(
        &self,
        auction_id: AuctionId,
        csv_bytes: &[u8],
    ) -> Result<CsvImportResult, StoreError> {
        let auction = self.store.fetch_auction(auction_id).await?;
        let existing = self.store.lot_numbers(auction_id).await?;
        let now = self.clock.now();

        let parsed = parse_lot_csv(csv_bytes, &existing);
        let (status, ok_rows, total_rows) = match &parsed {
            Ok(rows) => (BatchStatus::Completed, rows.len() as i64, rows.len() as i64),
            Err(report) => (
                BatchStatus::Rejected,
                report.total_rows - report.errors.len() as i64,
                report.total_rows,
            ),
        };
        let errors = match &parsed {
            Ok(_) => vec![],
            Err(report) => report.errors.clone(),
        };
        let batch = self
            .store
            .insert_import_batch(NewImportBatch {
                auction_id,
                kind: BatchKind::LotsCsv,
                status,
                total_rows,
                ok_rows: ok_rows.max(0),
                error_rows: errors.len() as i64,
                errors,
                created_at: now,
            })
            .await?;

        let inserted = match parsed {
            Ok(rows) => {
                let lots: Vec<NewLot> = rows
                    .into_iter()
                    .map(|row| row.into_new_lot(auction_id, auction.end_at))
                    .collect();
                let count = lots.len() as i64;
                self.store.insert_lots(lots).await?;
                info!(
                    "{:<12} --> 로트 CSV 임포트 성공: auction={}, {}건",
                    "Importer", auction_id, count
                );
                count
            }
            Err(_) => {
                info!(
                    "{:<12} --> 로트 CSV 배치 거부: auction={}, batch={}",
                    "Importer", auction_id, batch.id
                );
                0
            }
        };
        Ok(CsvImportResult {
            batch,
            inserted_lots: inserted,
        })
    }

    /// 업로드 이미지 파일명을 로트에 매칭한다.
    pub async fn match_images(
        &self,
        auction_id: AuctionId,
        files: Vec<UploadedImage>,
    ) -> Result<ImageMatchResult, StoreError> {
        let lot_numbers = self.store.lot_numbers(auction_id).await?;
        let mut occupied = self.store.occupied_photo_orders(auction_id).await?;
        let now = self.clock.now();

        let total = files.len() as i64;
        let mut mappings = Vec::with_capacity(files.len());
        let mut matched_count = 0i64;
        for file in files {
            let mapping = match rules::parse_image_filename(&file.filename) {
                None => NewImageMapping {
                    filename: file.filename,
                    stored_url: file.stored_url,
                    lot_number: None,
                    photo_order: None,
                    lot_id: None,
                    status: MappingStatus::Unmatched,
                    reason: Some("unparseable".to_string()),
                    created_at: now,
                },
                Some((lot_number, photo_order)) => match lot_numbers.get(&lot_number) {
                    None => NewImageMapping {
                        filename: file.filename,
                        stored_url: file.stored_url,
                        lot_number: Some(lot_number),
                        photo_order: Some(photo_order),
                        lot_id: None,
                        status: MappingStatus::Unmatched,
                        reason: Some("no lot".to_string()),
                        created_at: now,
                    },
                    Some(&lot_id) => {
                        // 같은 (로트, 순번)은 선착순; 나중 것은 conflict
                        if occupied.insert((lot_id, photo_order)) {
                            matched_count += 1;
                            NewImageMapping {
                                filename: file.filename,
                                stored_url: file.stored_url,
                                lot_number: Some(lot_number),
                                photo_order: Some(photo_order),
                                lot_id: Some(lot_id),
                                status: MappingStatus::Matched,
                                reason: None,
                                created_at: now,
                            }
                        } else {
                            NewImageMapping {
                                filename: file.filename,
                                stored_url: file.stored_url,
                                lot_number: Some(lot_number),
                                photo_order: Some(photo_order),
                                lot_id: Some(lot_id),
                                status: MappingStatus::Conflict,
                                reason: Some("photo order already taken".to_string()),
                                created_at: now,
                            }
                        }
                    }
                },
            };
            mappings.push(mapping);
        }

        let batch = self
            .store
            .insert_import_batch(NewImportBatch {
                auction_id,
                kind: BatchKind::Images,
                status: BatchStatus::Completed,
                total_rows: total,
                ok_rows: matched_count,
                error_rows: total - matched_count,
                errors: vec![],
                created_at: now,
            })
            .await?;
        let stored = self
            .store
            .insert_image_mappings(batch.id, auction_id, mappings)
            .await?;
        info!(
            "{:<12} --> 이미지 매칭 완료: auction={}, 총 {}건, 매칭 {}건",
            "Importer", auction_id, total, matched_count
        );
        Ok(ImageMatchResult {
            batch,
            mappings: stored,
        })
    }

    /// 관리자 수동 배정
    pub async fn manual_assign(
        &self,
        mapping_id: i64,
        lot_id: i64,
        photo_order: i64,
    ) -> Result<ImageMapping, StoreError> {
        let now = self.clock.now();
        self.store
            .assign_image_mapping(mapping_id, lot_id, photo_order, now)
            .await
    }
}

// endregion: --- Importer

// region:    --- CSV Parsing

/// 검증을 통과한 CSV 행
#[derive(Debug, Clone, PartialEq)]
struct LotCsvRow {
    lot_number: i64,
    title: String,
    description: String,
    category: Option<String>,
    condition: Option<String>,
    quantity: i64,
    location: Option<String>,
    shipping_available: bool,
    tags: Vec<String>,
    starting_bid: i64,
    reserve_price: Option<i64>,
    buy_now_price: Option<i64>,
}

impl LotCsvRow {
    fn into_new_lot(self, auction_id: AuctionId, close_at: chrono::DateTime<chrono::Utc>) -> NewLot {
        NewLot {
            auction_id,
            lot_number: self.lot_number,
            title: self.title,
            description: self.description,
            category: self.category,
            condition: self.condition,
            quantity: self.quantity,
            location: self.location,
            shipping_available: self.shipping_available,
            tags: self.tags,
            starting_bid: self.starting_bid,
            reserve_price: self.reserve_price,
            buy_now_price: self.buy_now_price,
            increment_rules_override: None,
            original_close_at: close_at,
            status: LotStatus::Pending,
            shipping_amount: 0,
        }
    }
}

#[derive(Debug)]
struct CsvReport {
    total_rows: i64,
    errors: Vec<RowError>,
}

/// CSV 전체를 파싱·검증한다. 행 오류, CSV 내 로트 번호 중복,
/// 기존 로트와의 충돌 중 하나라도 있으면 Err (배치 거부).
fn parse_lot_csv(
    bytes: &[u8],
    existing: &HashMap<i64, i64>,
) -> Result<Vec<LotCsvRow>, CsvReport> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) => {
            return Err(CsvReport {
                total_rows: 0,
                errors: vec![RowError {
                    row: 0,
                    field: None,
                    message: "UTF-8이 아닌 입력".to_string(),
                }],
            });
        }
    };
    let records = tokenize_csv(text);
    let Some((header, data)) = records.split_first() else {
        return Err(CsvReport {
            total_rows: 0,
            errors: vec![RowError {
                row: 0,
                field: None,
                message: "빈 CSV".to_string(),
            }],
        });
    };

    let columns: HashMap<String, usize> = header
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().to_ascii_lowercase(), idx))
        .collect();
    let mut errors = Vec::new();
    for required in ["lot_number", "title", "starting_bid"] {
        if !columns.contains_key(required) {
            errors.push(RowError {
                row: 0,
                field: Some(required.to_string()),
                message: "필수 컬럼 누락".to_string(),
            });
        }
    }
    if !errors.is_empty() {
        return Err(CsvReport {
            total_rows: data.len() as i64,
            errors,
        });
    }

    let field = |record: &[String], name: &str| -> Option<String> {
        columns
            .get(name)
            .and_then(|&idx| record.get(idx))
            .map(|value| value.trim().to_string())
    };

    let mut rows = Vec::with_capacity(data.len());
    let mut seen_numbers: HashSet<i64> = HashSet::new();
    for (idx, record) in data.iter().enumerate() {
        let row_no = idx + 1;
        let push_error = |field_name: &str, message: &str, errors: &mut Vec<RowError>| {
            errors.push(RowError {
                row: row_no,
                field: Some(field_name.to_string()),
                message: message.to_string(),
            });
        };

        let lot_number = match field(record, "lot_number").as_deref().map(str::parse::<i64>) {
            Some(Ok(n)) => Some(n),
            Some(Err(_)) => {
                push_error("lot_number", "정수가 아닙니다", &mut errors);
                None
            }
            None => {
                push_error("lot_number", "값이 없습니다", &mut errors);
                None
            }
        };
        let title = match field(record, "title") {
            Some(t) if !t.is_empty() => Some(t),
            _ => {
                push_error("title", "제목이 비어 있습니다", &mut errors);
                None
            }
        };
        let starting_bid = match field(record, "starting_bid")
            .as_deref()
            .map(rules::parse_money_cents)
        {
            Some(Some(v)) if v >= 0 => Some(v),
            Some(Some(_)) => {
                push_error("starting_bid", "음수일 수 없습니다", &mut errors);
                None
            }
            Some(None) => {
                push_error("starting_bid", "숫자가 아닙니다", &mut errors);
                None
            }
            None => {
                push_error("starting_bid", "값이 없습니다", &mut errors);
                None
            }
        };
        let reserve_price =
            parse_optional_money(field(record, "reserve_price"), "reserve_price", row_no, &mut errors);
        let buy_now_price =
            parse_optional_money(field(record, "buy_now_price"), "buy_now_price", row_no, &mut errors);
        let quantity = match field(record, "quantity").filter(|v| !v.is_empty()) {
            None => 1,
            Some(v) => match v.parse::<i64>() {
                Ok(q) if q > 0 => q,
                _ => {
                    push_error("quantity", "양의 정수가 아닙니다", &mut errors);
                    1
                }
            },
        };
        let shipping_available = match field(record, "shipping_available").filter(|v| !v.is_empty())
        {
            None => false,
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    push_error("shipping_available", "true/false/1/0이 아닙니다", &mut errors);
                    false
                }
            },
        };
        let tags = field(record, "tags")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if let Some(n) = lot_number {
            if !seen_numbers.insert(n) {
                push_error("lot_number", "CSV 내 로트 번호 중복", &mut errors);
            } else if existing.contains_key(&n) {
                push_error("lot_number", "기존 로트와 번호 충돌", &mut errors);
            }
        }

        if let (Some(lot_number), Some(title), Some(starting_bid)) =
            (lot_number, title, starting_bid)
        {
            rows.push(LotCsvRow {
                lot_number,
                title,
                description: field(record, "description").unwrap_or_default(),
                category: field(record, "category").filter(|v| !v.is_empty()),
                condition: field(record, "condition").filter(|v| !v.is_empty()),
                quantity,
                location: field(record, "location").filter(|v| !v.is_empty()),
                shipping_available,
                tags,
                starting_bid,
                reserve_price,
                buy_now_price,
            });
        }
    }

    if errors.is_empty() {
        Ok(rows)
    } else {
        Err(CsvReport {
            total_rows: data.len() as i64,
            errors,
        })
    }
}

fn parse_optional_money(
    value: Option<String>,
    field_name: &str,
    row_no: usize,
    errors: &mut Vec<RowError>,
) -> Option<i64> {
    let value = value.filter(|v| !v.is_empty())?;
    match rules::parse_money_cents(&value) {
        Some(v) if v >= 0 => Some(v),
        _ => {
            errors.push(RowError {
                row: row_no,
                field: Some(field_name.to_string()),
                message: "숫자가 아니거나 음수입니다".to_string(),
            });
            None
        }
    }
}

/// 따옴표("")와 CRLF/LF를 처리하는 CSV 토크나이저.
/// 따옴표 안의 쉼표/개행은 필드 내용으로 취급하고, ""는 이스케이프된 따옴표다.
fn tokenize_csv(input: &str) -> Vec<Vec<String>> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut fields = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        fields.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => fields.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut fields)),
            '\r' => {
                // CRLF는 LF 처리에 맡긴다
                if chars.peek() != Some(&'\n') {
                    fields.push('\r');
                }
            }
            '\n' => {
                record.push(std::mem::take(&mut fields));
                records.push(std::mem::take(&mut record));
            }
            _ => fields.push(c),
        }
    }
    if !fields.is_empty() || !record.is_empty() {
        record.push(fields);
        records.push(record);
    }
    // 완전히 빈 행은 버린다
    records
        .into_iter()
        .filter(|r| !(r.len() == 1 && r[0].trim().is_empty()))
        .collect()
}

// endregion: --- CSV Parsing

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_handles_quotes_and_crlf() {
        let input = "a,b,c\r\n\"x,y\",\"he said \"\"hi\"\"\",z\r\n";
        let records = tokenize_csv(input);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], vec!["a", "b", "c"]);
        assert_eq!(records[1], vec!["x,y", "he said \"hi\"", "z"]);
    }

    #[test]
    fn tokenizer_keeps_newline_inside_quotes() {
        let input = "h1,h2\n\"두\n줄\",v\n";
        let records = tokenize_csv(input);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1][0], "두\n줄");
    }

    #[test]
    fn valid_csv_parses_all_rows() {
        let csv = "lot_number,title,starting_bid,reserve_price,tags\n\
                   1,의자,100.00,,\"wood, oak\"\n\
                   2,책상,250.55,300,\n";
        let rows = parse_lot_csv(csv.as_bytes(), &HashMap::new()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].lot_number, 1);
        assert_eq!(rows[0].starting_bid, 10_000);
        assert_eq!(rows[0].tags, vec!["wood".to_string(), "oak".to_string()]);
        assert_eq!(rows[1].starting_bid, 25_055);
        assert_eq!(rows[1].reserve_price, Some(30_000));
    }

    #[test]
    fn missing_required_header_rejects_batch() {
        let csv = "lot_number,starting_bid\n1,100\n";
        let report = parse_lot_csv(csv.as_bytes(), &HashMap::new()).unwrap_err();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].field.as_deref(), Some("title"));
    }

    #[test]
    fn any_row_error_rejects_whole_batch() {
        let csv = "lot_number,title,starting_bid\n\
                   1,의자,100\n\
                   x,책상,50\n";
        let report = parse_lot_csv(csv.as_bytes(), &HashMap::new()).unwrap_err();
        assert_eq!(report.total_rows, 2);
        assert!(report
            .errors
            .iter()
            .any(|e| e.row == 2 && e.field.as_deref() == Some("lot_number")));
    }

    #[test]
    fn negative_starting_bid_is_an_error() {
        let csv = "lot_number,title,starting_bid\n1,의자,-5\n";
        let report = parse_lot_csv(csv.as_bytes(), &HashMap::new()).unwrap_err();
        assert!(report
            .errors
            .iter()
            .any(|e| e.field.as_deref() == Some("starting_bid")));
    }

    #[test]
    fn duplicate_lot_number_in_csv_rejects() {
        let csv = "lot_number,title,starting_bid\n1,의자,100\n1,책상,50\n";
        let report = parse_lot_csv(csv.as_bytes(), &HashMap::new()).unwrap_err();
        assert!(report.errors.iter().any(|e| e.message.contains("중복")));
    }

    #[test]
    fn collision_with_existing_lot_rejects() {
        let csv = "lot_number,title,starting_bid\n7,의자,100\n";
        let mut existing = HashMap::new();
        existing.insert(7i64, 42i64);
        let report = parse_lot_csv(csv.as_bytes(), &existing).unwrap_err();
        assert!(report.errors.iter().any(|e| e.message.contains("충돌")));
    }

    #[test]
    fn shipping_available_accepts_four_spellings() {
        let csv = "lot_number,title,starting_bid,shipping_available\n\
                   1,a,1,true\n2,b,1,false\n3,c,1,1\n4,d,1,0\n";
        let rows = parse_lot_csv(csv.as_bytes(), &HashMap::new()).unwrap();
        assert_eq!(
            rows.iter().map(|r| r.shipping_available).collect::<Vec<_>>(),
            vec![true, false, true, false]
        );
    }

    #[test]
    fn non_utf8_input_is_rejected() {
        let report = parse_lot_csv(&[0xff, 0xfe, 0x00], &HashMap::new()).unwrap_err();
        assert_eq!(report.errors[0].message, "UTF-8이 아닌 입력");
    }
}

// endregion: --- Tests
