use std::fmt;

use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, Statement, TransactionTrait,
};
use tracing::{debug, info};

use crate::batch_insert::BatchInsert;
use crate::entities::funeral_home;
use crate::record::FuneralHomeRecord;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Counts reported at the end of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImportSummary {
    pub deleted: u64,
    pub inserted: u64,
    pub active: u64,
    pub geocoded: u64,
}

impl ImportSummary {
    pub fn without_coordinates(&self) -> u64 {
        self.inserted.saturating_sub(self.geocoded)
    }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Import 완료 ===")?;
        writeln!(f, "총 삽입: {}건", self.inserted)?;
        writeln!(f, "활성 업체: {}건", self.active)?;
        writeln!(f, "좌표 있음: {}건", self.geocoded)?;
        write!(f, "좌표 없음: {}건", self.without_coordinates())
    }
}

/// Replaces the whole `funeral_homes` table with `records`.
///
/// Everything runs in one transaction: the old rows are deleted, the id
/// sequence restarts at 1, the new rows are inserted in batches and the
/// summary counts are read back before committing. On error the transaction
/// is dropped and rolled back, leaving the previous contents in place.
pub async fn import_records(
    db: &DatabaseConnection,
    records: Vec<FuneralHomeRecord>,
    batch_size: usize,
) -> Result<ImportSummary, DbErr> {
    let txn = db.begin().await?;

    let deleted = funeral_home::Entity::delete_many()
        .exec(&txn)
        .await?
        .rows_affected;
    println!("기존 데이터 삭제: {}건", deleted);

    reset_id_sequence(&txn).await?;

    let inserted_at = Local::now().naive_local();
    let mut batcher = BatchInsert::new(&txn, batch_size, insert_progress(records.len()));
    for record in records {
        batcher.insert(record.into_active_model(inserted_at)).await?;
    }
    let inserted = batcher.finish().await? as u64;

    let active = funeral_home::Entity::find()
        .filter(funeral_home::Column::IsActive.eq(true))
        .count(&txn)
        .await?;
    let geocoded = funeral_home::Entity::find()
        .filter(funeral_home::Column::Latitude.is_not_null())
        .count(&txn)
        .await?;

    txn.commit().await?;
    info!(deleted, inserted, active, geocoded, "import committed");

    Ok(ImportSummary {
        deleted,
        inserted,
        active,
        geocoded,
    })
}

async fn reset_id_sequence(txn: &DatabaseTransaction) -> Result<(), DbErr> {
    let backend = txn.get_database_backend();

    match backend {
        DbBackend::Postgres => {
            txn.execute_unprepared("ALTER SEQUENCE funeral_homes_id_seq RESTART WITH 1")
                .await?;
        }
        DbBackend::MySql => {
            txn.execute_unprepared("ALTER TABLE funeral_homes AUTO_INCREMENT = 1")
                .await?;
        }
        DbBackend::Sqlite => {
            // sqlite_sequence only exists once some table uses AUTOINCREMENT
            let has_sequence_table = txn
                .query_one(Statement::from_string(
                    backend,
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
                ))
                .await?
                .is_some();

            if has_sequence_table {
                txn.execute_unprepared("DELETE FROM sqlite_sequence WHERE name = 'funeral_homes'")
                    .await?;
            }
        }
    }

    debug!(?backend, "id sequence restarted");

    Ok(())
}

fn insert_progress(len: usize) -> ProgressBar {
    let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} 삽입 중")
        .unwrap_or_else(|_| ProgressStyle::default_bar());

    ProgressBar::new(len as u64).with_style(style)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use sea_orm::{ConnectOptions, Database, FromQueryResult, QueryOrder, QuerySelect, Schema};

    use super::*;
    use crate::coords::TmConverter;
    use crate::parser::parse_csv;

    const THREE_ROWS: &str = "\
번호,개방자치단체코드,영업상태명,전화번호,지번주소,도로명주소,사업장명,좌표정보(X),좌표정보(Y)
1,3220000,영업/정상,212345678,,서울특별시 중구 세종대로 110,서울 반려동물 장례식장,198000,451900
2,4130000,폐업,0311234567,경기도 수원시 팔달구 1,,수원 펫 장례식장,0,0
3,4130000,영업/정상,0311234567,경기도 수원시 팔달구 2,,,198000,451900
";

    async fn memory_db() -> DatabaseConnection {
        let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
        options
            .max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);
        let db = Database::connect(options).await.unwrap();

        let schema = Schema::new(DbBackend::Sqlite);
        let create = schema.create_table_from_entity(funeral_home::Entity);
        db.execute(db.get_database_backend().build(&create))
            .await
            .unwrap();

        db
    }

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    async fn stored_rows(db: &DatabaseConnection) -> Vec<(i64, String)> {
        funeral_home::Entity::find()
            .select_only()
            .column(funeral_home::Column::Id)
            .column(funeral_home::Column::Name)
            .order_by_asc(funeral_home::Column::Id)
            .into_tuple::<(i64, String)>()
            .all(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn imports_three_row_csv() {
        let db = memory_db().await;
        let file = write_csv(THREE_ROWS);
        let converter = TmConverter::new().unwrap();

        let parsed = parse_csv(file.path(), &converter).unwrap();
        assert_eq!(parsed.records.len(), 2);

        let summary = import_records(&db, parsed.records, DEFAULT_BATCH_SIZE)
            .await
            .unwrap();

        assert_eq!(
            summary,
            ImportSummary {
                deleted: 0,
                inserted: 2,
                active: 1,
                geocoded: 1,
            }
        );
        let report = summary.to_string();
        assert!(report.contains("총 삽입: 2건"));
        assert!(report.contains("좌표 있음: 1건"));
        assert!(report.contains("좌표 없음: 1건"));

        let without_coordinates = funeral_home::Entity::find()
            .filter(funeral_home::Column::Latitude.is_null())
            .filter(funeral_home::Column::Longitude.is_null())
            .count(&db)
            .await
            .unwrap();
        assert_eq!(without_coordinates, 1);

        let rows = stored_rows(&db).await;
        assert_eq!(
            rows,
            vec![
                (1, "서울 반려동물 장례식장".to_string()),
                (2, "수원 펫 장례식장".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn reimport_replaces_rows_and_restarts_ids() {
        #[derive(Clone, Debug, PartialEq, FromQueryResult)]
        struct StoredContent {
            id: i64,
            name: String,
            road_address: Option<String>,
            lot_address: Option<String>,
            phone: Option<String>,
            loc_code: Option<String>,
            loc_name: Option<String>,
            latitude: Option<f64>,
            longitude: Option<f64>,
            is_active: bool,
            has_funeral: bool,
        }

        async fn stored_content(db: &DatabaseConnection) -> Vec<StoredContent> {
            use funeral_home::Column;

            funeral_home::Entity::find()
                .select_only()
                .columns([
                    Column::Id,
                    Column::Name,
                    Column::RoadAddress,
                    Column::LotAddress,
                    Column::Phone,
                    Column::LocCode,
                    Column::LocName,
                    Column::Latitude,
                    Column::Longitude,
                    Column::IsActive,
                    Column::HasFuneral,
                ])
                .order_by_asc(Column::Id)
                .into_model::<StoredContent>()
                .all(db)
                .await
                .unwrap()
        }

        let db = memory_db().await;
        let file = write_csv(THREE_ROWS);
        let converter = TmConverter::new().unwrap();

        let first = parse_csv(file.path(), &converter).unwrap();
        import_records(&db, first.records, DEFAULT_BATCH_SIZE)
            .await
            .unwrap();
        let after_first = stored_content(&db).await;

        let second = parse_csv(file.path(), &converter).unwrap();
        let summary = import_records(&db, second.records, DEFAULT_BATCH_SIZE)
            .await
            .unwrap();
        let after_second = stored_content(&db).await;

        assert_eq!(summary.deleted, 2);
        assert_eq!(summary.inserted, 2);
        assert_eq!(after_first, after_second);

        let ids: Vec<_> = after_second.iter().map(|row| row.id).collect();
        assert_eq!(ids, [1, 2]);

        let seoul = &after_second[0];
        assert_eq!(seoul.name, "서울 반려동물 장례식장");
        assert_eq!(seoul.road_address.as_deref(), Some("서울특별시 중구 세종대로 110"));
        assert_eq!(seoul.lot_address, None);
        assert_eq!(seoul.phone.as_deref(), Some("0212345678"));
        assert_eq!(seoul.loc_code.as_deref(), Some("3220000"));
        assert_eq!(seoul.loc_name.as_deref(), Some("서울특별시"));
        assert!(seoul.latitude.is_some() && seoul.longitude.is_some());
        assert!(seoul.is_active);
        assert!(seoul.has_funeral);

        let suwon = &after_second[1];
        assert_eq!(suwon.road_address, None);
        assert_eq!(suwon.lot_address.as_deref(), Some("경기도 수원시 팔달구 1"));
        assert_eq!(suwon.phone.as_deref(), Some("0311234567"));
        assert_eq!(suwon.loc_name.as_deref(), Some("경기도"));
        assert_eq!((suwon.latitude, suwon.longitude), (None, None));
        assert!(!suwon.is_active);
    }

    #[tokio::test]
    async fn small_batches_insert_every_row() {
        let db = memory_db().await;
        let mut content = String::from("사업장명,영업상태명\n");
        for i in 0..7 {
            content.push_str(&format!("장례식장 {i},영업/정상\n"));
        }
        let converter = TmConverter::new().unwrap();
        let parsed = parse_csv(write_csv(&content).path(), &converter).unwrap();

        let summary = import_records(&db, parsed.records, 3).await.unwrap();

        assert_eq!(summary.inserted, 7);
        assert_eq!(summary.active, 7);
        assert_eq!(summary.geocoded, 0);
        assert_eq!(summary.without_coordinates(), 7);
        assert_eq!(stored_rows(&db).await.len(), 7);
    }

    #[tokio::test]
    async fn failed_import_keeps_previous_rows() {
        let db = memory_db().await;
        let converter = TmConverter::new().unwrap();
        let parsed = parse_csv(write_csv(THREE_ROWS).path(), &converter).unwrap();
        import_records(&db, parsed.records, DEFAULT_BATCH_SIZE)
            .await
            .unwrap();

        db.execute_unprepared(
            "CREATE TRIGGER reject_insert BEFORE INSERT ON funeral_homes \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .await
        .unwrap();

        let parsed = parse_csv(write_csv(THREE_ROWS).path(), &converter).unwrap();
        let result = import_records(&db, parsed.records, DEFAULT_BATCH_SIZE).await;

        assert!(result.is_err());
        assert_eq!(stored_rows(&db).await.len(), 2);
    }
}
